use serde::{Deserialize, Serialize};

use super::Entity;
use crate::core::UserId;
use crate::error::{AppError, AppResult};

pub const MIN_NAME_LEN: usize = 2;
pub const MAX_NAME_LEN: usize = 50;
pub const MAX_BIO_LEN: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Admin,
    Moderator,
}

/// Profile-level privacy controlling who may browse a user's post history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Privacy {
    Public,
    Private,
    Friends,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntUser {
    pub id: UserId,
    pub name: String,
    pub bio: Option<String>,
    pub avatar: Option<String>,
    pub role: Role,
    /// Soft-deactivation flag. Inactive users drop out of all visibility
    /// computations; their historical posts stay referentially intact.
    pub is_active: bool,
    pub privacy: Privacy,
    pub posts_count: u32,
    pub created_time: i64,
    pub updated_time: i64,
}

impl EntUser {
    pub fn new(id: UserId, name: &str, now: i64) -> AppResult<Self> {
        validate_name(name)?;

        Ok(Self {
            id,
            name: name.trim().to_string(),
            bio: None,
            avatar: None,
            role: Role::User,
            is_active: true,
            privacy: Privacy::Public,
            posts_count: 0,
            created_time: now,
            updated_time: now,
        })
    }

    pub fn with_privacy(mut self, privacy: Privacy) -> Self {
        self.privacy = privacy;
        self
    }

    pub fn with_bio(mut self, bio: &str) -> AppResult<Self> {
        if bio.chars().count() > MAX_BIO_LEN {
            return Err(AppError::Validation(format!(
                "bio: cannot exceed {} characters",
                MAX_BIO_LEN
            )));
        }
        self.bio = Some(bio.to_string());
        Ok(self)
    }

    /// Soft delete. The record stays in the store so historical posts and
    /// comments keep a valid author reference.
    pub fn deactivate(&mut self, now: i64) {
        self.is_active = false;
        self.updated_time = now;
    }

    pub fn record_post_created(&mut self, now: i64) {
        self.posts_count += 1;
        self.updated_time = now;
    }

    pub fn record_post_archived(&mut self, now: i64) {
        self.posts_count = self.posts_count.saturating_sub(1);
        self.updated_time = now;
    }
}

impl Entity for EntUser {
    const ENTITY_TYPE: &'static str = "user";

    fn entity_id(&self) -> i64 {
        self.id.value()
    }
}

pub fn validate_name(name: &str) -> AppResult<()> {
    let trimmed = name.trim();
    let chars = trimmed.chars().count();
    if chars < MIN_NAME_LEN || chars > MAX_NAME_LEN {
        return Err(AppError::Validation(format!(
            "name: must be between {} and {} characters",
            MIN_NAME_LEN, MAX_NAME_LEN
        )));
    }
    Ok(())
}
