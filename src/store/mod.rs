// Entity store - object persistence with optimistic concurrency plus a
// single edge table for the follow graph. Follower/following sets are
// derived by query, so the symmetric-closure invariant holds by
// construction instead of by dual bookkeeping.

pub mod memory;
pub mod sqlite;
pub mod timed;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use timed::TimedStore;

use async_trait::async_trait;

use crate::entities::Entity;
use crate::error::{AppError, AppResult};

/// Edge type for "id1 follows id2".
pub const EDGE_FOLLOWS: &str = "follows";

/// A persisted object: JSON entity payload plus a version counter used for
/// compare-and-set updates.
#[derive(Debug, Clone)]
pub struct StoredObject {
    pub id: i64,
    pub otype: String,
    pub data: String,
    pub created_time: i64,
    pub updated_time: i64,
    pub version: i64,
}

/// A directed edge between two objects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edge {
    pub id1: i64,
    pub etype: String,
    pub id2: i64,
    pub time: i64,
}

#[async_trait]
pub trait EntityStore: Send + Sync {
    // Object operations
    async fn get(&self, id: i64) -> AppResult<Option<StoredObject>>;
    async fn create(&self, obj: StoredObject) -> AppResult<()>;
    /// Conditional update: applies only when the stored version matches
    /// `expected_version`. Returns false when the caller lost the race.
    async fn update(
        &self,
        id: i64,
        data: String,
        updated_time: i64,
        expected_version: i64,
    ) -> AppResult<bool>;
    async fn scan_type(&self, otype: &str) -> AppResult<Vec<StoredObject>>;

    // Edge operations - each call is a single atomic mutation
    /// Returns false when the edge already exists.
    async fn add_edge(&self, edge: Edge) -> AppResult<bool>;
    /// Returns false when the edge was not present.
    async fn remove_edge(&self, id1: i64, etype: &str, id2: i64) -> AppResult<bool>;
    async fn edge_exists(&self, id1: i64, etype: &str, id2: i64) -> AppResult<bool>;
    async fn count_edges_from(&self, id1: i64, etype: &str) -> AppResult<u64>;
    async fn count_edges_to(&self, id2: i64, etype: &str) -> AppResult<u64>;
    async fn edges_from(&self, id1: i64, etype: &str) -> AppResult<Vec<i64>>;
    async fn edges_to(&self, id2: i64, etype: &str) -> AppResult<Vec<i64>>;
}

/// An entity together with the store version it was read at, for CAS writes.
#[derive(Debug, Clone)]
pub struct Versioned<T> {
    pub entity: T,
    pub version: i64,
}

/// Load an entity by id, returning None when absent or of a different type.
pub async fn load_entity<T: Entity>(store: &dyn EntityStore, id: i64) -> AppResult<Option<T>> {
    Ok(load_versioned(store, id).await?.map(|v| v.entity))
}

pub async fn load_versioned<T: Entity>(
    store: &dyn EntityStore,
    id: i64,
) -> AppResult<Option<Versioned<T>>> {
    match store.get(id).await? {
        Some(obj) if obj.otype == T::ENTITY_TYPE => {
            let entity: T = serde_json::from_str(&obj.data).map_err(|e| {
                AppError::Serialization(format!(
                    "failed to decode {} {}: {}",
                    T::ENTITY_TYPE,
                    id,
                    e
                ))
            })?;
            Ok(Some(Versioned {
                entity,
                version: obj.version,
            }))
        }
        _ => Ok(None),
    }
}

pub async fn insert_entity<T: Entity>(
    store: &dyn EntityStore,
    entity: &T,
    now: i64,
) -> AppResult<()> {
    let data = serde_json::to_string(entity)?;
    store
        .create(StoredObject {
            id: entity.entity_id(),
            otype: T::ENTITY_TYPE.to_string(),
            data,
            created_time: now,
            updated_time: now,
            version: 1,
        })
        .await
}

/// Compare-and-set write. Returns false when the stored version moved on and
/// the caller must re-read and retry.
pub async fn save_entity_cas<T: Entity>(
    store: &dyn EntityStore,
    entity: &T,
    expected_version: i64,
    now: i64,
) -> AppResult<bool> {
    let data = serde_json::to_string(entity)?;
    store
        .update(entity.entity_id(), data, now, expected_version)
        .await
}

/// Load every live entity of a type.
pub async fn scan_entities<T: Entity>(store: &dyn EntityStore) -> AppResult<Vec<T>> {
    let objects = store.scan_type(T::ENTITY_TYPE).await?;
    let mut entities = Vec::with_capacity(objects.len());
    for obj in objects {
        let entity: T = serde_json::from_str(&obj.data).map_err(|e| {
            AppError::Serialization(format!(
                "failed to decode {} {}: {}",
                T::ENTITY_TYPE,
                obj.id,
                e
            ))
        })?;
        entities.push(entity);
    }
    Ok(entities)
}
