use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::Entity;
use crate::core::{PostId, UserId};
use crate::error::{AppError, AppResult};

pub const MAX_CONTENT_LEN: usize = 5000;
pub const MAX_TAGS: usize = 5;

static IMAGE_URL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^https?://.+\.(jpg|jpeg|png|gif|webp)$").expect("valid image url regex")
});

/// Per-post access tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Public,
    Friends,
    Private,
}

impl std::str::FromStr for Visibility {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "public" => Ok(Visibility::Public),
            "friends" => Ok(Visibility::Friends),
            "private" => Ok(Visibility::Private),
            other => Err(AppError::Validation(format!(
                "visibility: invalid value '{}'",
                other
            ))),
        }
    }
}

/// A post. The `likes` set is the source of truth for `likes_count`; both are
/// private so the count can only change together with the set.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntPost {
    pub id: PostId,
    pub author_id: UserId,
    pub content: String,
    pub image: Option<String>,
    pub tags: Vec<String>,
    pub visibility: Visibility,
    likes: BTreeSet<UserId>,
    likes_count: u32,
    comments_count: u32,
    shares_count: u32,
    pub is_edited: bool,
    pub edited_time: Option<i64>,
    pub is_archived: bool,
    pub views: u64,
    pub created_time: i64,
    pub updated_time: i64,
}

impl EntPost {
    pub fn new(
        id: PostId,
        author_id: UserId,
        content: &str,
        image: Option<String>,
        tags: Vec<String>,
        visibility: Visibility,
        now: i64,
    ) -> AppResult<Self> {
        validate_content(content)?;
        if let Some(url) = &image {
            validate_image_url(url)?;
        }
        let tags = normalize_tags(tags)?;

        Ok(Self {
            id,
            author_id,
            content: content.trim().to_string(),
            image,
            tags,
            visibility,
            likes: BTreeSet::new(),
            likes_count: 0,
            comments_count: 0,
            shares_count: 0,
            is_edited: false,
            edited_time: None,
            is_archived: false,
            views: 0,
            created_time: now,
            updated_time: now,
        })
    }

    pub fn is_liked_by(&self, user: UserId) -> bool {
        self.likes.contains(&user)
    }

    /// Flip the user's like. The count is recomputed from the set in the same
    /// step so it can never drift.
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

    pub fn comments_count(&self) -> u32 {
        self.comments_count
    }

    pub fn shares_count(&self) -> u32 {
        self.shares_count
    }

    pub fn increment_comments(&mut self, now: i64) {
        self.comments_count += 1;
        self.updated_time = now;
    }

    /// Clamped at zero: a decrement against an empty count is a no-op.
    pub fn decrement_comments(&mut self, now: i64) {
        self.comments_count = self.comments_count.saturating_sub(1);
        self.updated_time = now;
    }

    pub fn record_share(&mut self, now: i64) {
        self.shares_count += 1;
        self.updated_time = now;
    }

    pub fn record_view(&mut self) {
        self.views += 1;
    }

    /// Weighted engagement used for ranking. Always computed from the live
    /// counters, never stored, so it cannot desynchronize from its inputs.
    pub fn engagement_score(&self) -> i64 {
        2 * self.likes_count as i64 + 3 * self.comments_count as i64 + 4 * self.shares_count as i64
    }

    /// Owner edit. A content change marks the post as edited.
    pub fn apply_edit(
        &mut self,
        content: Option<&str>,
        image: Option<Option<String>>,
        tags: Option<Vec<String>>,
        visibility: Option<Visibility>,
        now: i64,
    ) -> AppResult<()> {
        if let Some(content) = content {
            validate_content(content)?;
            if content.trim() != self.content {
                self.content = content.trim().to_string();
                self.is_edited = true;
                self.edited_time = Some(now);
            }
        }
        if let Some(image) = image {
            if let Some(url) = &image {
                validate_image_url(url)?;
            }
            self.image = image;
        }
        if let Some(tags) = tags {
            self.tags = normalize_tags(tags)?;
        }
        if let Some(visibility) = visibility {
            self.visibility = visibility;
        }
        self.updated_time = now;
        Ok(())
    }

    pub fn archive(&mut self, now: i64) {
        self.is_archived = true;
        self.updated_time = now;
    }
}

impl Entity for EntPost {
    const ENTITY_TYPE: &'static str = "post";

    fn entity_id(&self) -> i64 {
        self.id.value()
    }
}

pub fn validate_content(content: &str) -> AppResult<()> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return Err(AppError::Validation(
            "content: post content is required".to_string(),
        ));
    }
    // Character count, not bytes: multibyte content is measured as typed.
    if trimmed.chars().count() > MAX_CONTENT_LEN {
        return Err(AppError::Validation(format!(
            "content: cannot exceed {} characters",
            MAX_CONTENT_LEN
        )));
    }
    Ok(())
}

pub fn validate_image_url(url: &str) -> AppResult<()> {
    if IMAGE_URL_RE.is_match(url) {
        Ok(())
    } else {
        Err(AppError::Validation(
            "image: must be a valid image URL".to_string(),
        ))
    }
}

/// Trim, lower-case and dedup tags, capping at MAX_TAGS.
pub fn normalize_tags(tags: Vec<String>) -> AppResult<Vec<String>> {
    let mut normalized: Vec<String> = Vec::new();
    for tag in tags {
        let tag = tag.trim().to_lowercase();
        if tag.is_empty() || normalized.contains(&tag) {
            continue;
        }
        normalized.push(tag);
    }
    if normalized.len() > MAX_TAGS {
        return Err(AppError::Validation(format!(
            "tags: maximum {} tags allowed",
            MAX_TAGS
        )));
    }
    Ok(normalized)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn post() -> EntPost {
        EntPost::new(
            PostId::new(1),
            UserId::new(10),
            "hello world",
            None,
            vec![],
            Visibility::Public,
            1_000,
        )
        .unwrap()
    }

    #[test]
    fn engagement_score_formula() {
        let mut p = post();
        p.toggle_like(UserId::new(1), 0);
        p.toggle_like(UserId::new(2), 0);
        p.toggle_like(UserId::new(3), 0);
        p.increment_comments(0);
        p.increment_comments(0);
        p.record_share(0);

        // 2*3 + 3*2 + 4*1
        assert_eq!(p.engagement_score(), 16);
    }

    #[test]
    fn like_count_tracks_set_cardinality() {
        let mut p = post();
        assert_eq!(p.likes_count(), 0);

        let liked = p.toggle_like(UserId::new(5), 0);
        assert!(liked);
        assert_eq!(p.likes_count(), 1);
        assert!(p.is_liked_by(UserId::new(5)));

        // Second toggle from the same user restores the original state
        let liked = p.toggle_like(UserId::new(5), 0);
        assert!(!liked);
        assert_eq!(p.likes_count(), 0);
        assert!(!p.is_liked_by(UserId::new(5)));
    }

    #[test]
    fn comment_count_clamps_at_zero() {
        let mut p = post();
        p.decrement_comments(0);
        assert_eq!(p.comments_count(), 0);
        p.increment_comments(0);
        p.decrement_comments(0);
        p.decrement_comments(0);
        assert_eq!(p.comments_count(), 0);
    }

    #[test]
    fn content_bounds_are_enforced() {
        assert!(validate_content("").is_err());
        assert!(validate_content("   ").is_err());
        assert!(validate_content(&"a".repeat(5000)).is_ok());
        assert!(validate_content(&"a".repeat(5001)).is_err());
    }

    #[test]
    fn content_limit_counts_characters_not_bytes() {
        // 5000 two-byte characters: within the limit despite 10000 bytes.
        assert!(validate_content(&"é".repeat(5000)).is_ok());
        assert!(validate_content(&"é".repeat(5001)).is_err());
    }

    #[test]
    fn image_url_is_validated() {
        assert!(validate_image_url("https://cdn.example.com/a.png").is_ok());
        assert!(validate_image_url("https://cdn.example.com/a.PNG").is_ok());
        assert!(validate_image_url("ftp://cdn.example.com/a.png").is_err());
        assert!(validate_image_url("https://cdn.example.com/a.pdf").is_err());
    }

    #[test]
    fn tags_are_lowercased_and_capped() {
        let tags = normalize_tags(vec![" Rust ".into(), "RUST".into(), "feed".into()]).unwrap();
        assert_eq!(tags, vec!["rust".to_string(), "feed".to_string()]);

        let too_many: Vec<String> = (0..6).map(|i| format!("t{}", i)).collect();
        assert!(normalize_tags(too_many).is_err());
    }

    #[test]
    fn content_edit_sets_edited_flag() {
        let mut p = post();
        p.apply_edit(Some("hello world"), None, None, None, 2_000)
            .unwrap();
        assert!(!p.is_edited, "unchanged content is not an edit");

        p.apply_edit(Some("new text"), None, None, None, 3_000).unwrap();
        assert!(p.is_edited);
        assert_eq!(p.edited_time, Some(3_000));
    }
}
