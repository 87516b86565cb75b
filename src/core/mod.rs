// Core primitives - ids, time, pagination

pub mod id_generator;
pub mod pagination;
pub mod strong_types;

pub use id_generator::IdGenerator;
pub use pagination::{paginate, Page, PageRequest};
pub use strong_types::{CommentId, PostId, UserId};

/// Current time in milliseconds since Unix epoch.
pub fn current_time_millis() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
