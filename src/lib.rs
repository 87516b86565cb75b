// Nexa Feed - Visibility-aware feed and engagement engine

// Core types and primitives
pub mod core;

// Entity model - users, posts, comments and their invariants
pub mod entities;

// Entity store - object and edge persistence
pub mod store;

// Follow graph manager
pub mod graph;

// Engagement engine - likes and derived counters
pub mod engagement;

// Visibility resolver and user-listing gate
pub mod visibility;

// Feed query engine - filtered, sorted, paginated reads
pub mod feed;

// Popularity ranker - windowed engagement leaderboard
pub mod ranking;

// Outbound event interface
pub mod events;

// HTTP API
pub mod api;

// Common utilities
pub mod config;
pub mod error;
pub mod data_seeder;

// Re-exports for convenience
pub use error::{AppError, AppResult};
