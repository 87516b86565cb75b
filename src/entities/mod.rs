// Entity model - users, posts and comments with their derived-counter
// invariants. Entities serialize to JSON payloads inside the entity store.

pub mod comment;
pub mod post;
pub mod user;

pub use comment::EntComment;
pub use post::{EntPost, Visibility};
pub use user::{EntUser, Privacy, Role};

use serde::de::DeserializeOwned;
use serde::Serialize;

/// A typed entity persisted as a JSON object in the entity store.
pub trait Entity: Serialize + DeserializeOwned + Send + Sync + Sized {
    const ENTITY_TYPE: &'static str;

    fn entity_id(&self) -> i64;
}
