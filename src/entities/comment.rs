use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::Entity;
use crate::core::{CommentId, PostId, UserId};
use crate::error::{AppError, AppResult};

pub const MAX_COMMENT_LEN: usize = 1000;

/// A comment on a post, optionally threaded under a parent comment.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntComment {
    pub id: CommentId,
    pub post_id: PostId,
    pub author_id: UserId,
    pub content: String,
    likes: BTreeSet<UserId>,
    likes_count: u32,
    pub parent_comment: Option<CommentId>,
    pub is_edited: bool,
    pub edited_time: Option<i64>,
    pub created_time: i64,
    pub updated_time: i64,
}

impl EntComment {
    pub fn new(
        id: CommentId,
        post_id: PostId,
        author_id: UserId,
        content: &str,
        parent_comment: Option<CommentId>,
        now: i64,
    ) -> AppResult<Self> {
        validate_comment_content(content)?;

        Ok(Self {
            id,
            post_id,
            author_id,
            content: content.trim().to_string(),
            likes: BTreeSet::new(),
            likes_count: 0,
            parent_comment,
            is_edited: false,
            edited_time: None,
            created_time: now,
            updated_time: now,
        })
    }

    pub fn is_liked_by(&self, user: UserId) -> bool {
        self.likes.contains(&user)
    }

    pub fn toggle_like(&mut self, user: UserId, now: i64) -> bool {
        let now_liked = if self.likes.contains(&user) {
            self.likes.remove(&user);
            false
        } else {
            self.likes.insert(user);
            true
        };
        self.likes_count = self.likes.len() as u32;
        self.updated_time = now;
        now_liked
    }

    pub fn likes_count(&self) -> u32 {
        self.likes_count
    }

    pub fn apply_edit(&mut self, content: &str, now: i64) -> AppResult<()> {
        validate_comment_content(content)?;
        if content.trim() != self.content {
            self.content = content.trim().to_string();
            self.is_edited = true;
            self.edited_time = Some(now);
        }
        self.updated_time = now;
        Ok(())
    }
}

impl Entity for EntComment {
    const ENTITY_TYPE: &'static str = "comment";

    fn entity_id(&self) -> i64 {
        self.id.value()
    }
}

pub fn validate_comment_content(content: &str) -> AppResult<()> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return Err(AppError::Validation(
            "content: comment content is required".to_string(),
        ));
    }
    if trimmed.chars().count() > MAX_COMMENT_LEN {
        return Err(AppError::Validation(format!(
            "content: cannot exceed {} characters",
            MAX_COMMENT_LEN
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn comment_length_bounds() {
        assert!(validate_comment_content("").is_err());
        assert!(validate_comment_content(&"a".repeat(1000)).is_ok());
        assert!(validate_comment_content(&"a".repeat(1001)).is_err());
        assert!(validate_comment_content(&"é".repeat(1000)).is_ok());
    }

    #[test]
    fn comment_like_toggle_round_trips() {
        let mut c = EntComment::new(
            CommentId::new(1),
            PostId::new(2),
            UserId::new(3),
            "nice",
            None,
            0,
        )
        .unwrap();

        assert!(c.toggle_like(UserId::new(9), 1));
        assert_eq!(c.likes_count(), 1);
        assert!(!c.toggle_like(UserId::new(9), 2));
        assert_eq!(c.likes_count(), 0);
    }
}
