// In-memory entity store. Backs unit tests and the zero-setup server
// default; every trait call takes the single lock once, so each mutation is
// atomic with respect to every other.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;

use super::{Edge, EntityStore, StoredObject};
use crate::error::{AppError, AppResult};

#[derive(Default)]
struct Inner {
    objects: HashMap<i64, StoredObject>,
    /// (id1, etype) -> id2 -> edge time
    edges_out: HashMap<(i64, String), BTreeMap<i64, i64>>,
    /// (id2, etype) -> id1 -> edge time
    edges_in: HashMap<(i64, String), BTreeMap<i64, i64>>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EntityStore for MemoryStore {
    async fn get(&self, id: i64) -> AppResult<Option<StoredObject>> {
        let inner = self.inner.read().await;
        Ok(inner.objects.get(&id).cloned())
    }

    async fn create(&self, obj: StoredObject) -> AppResult<()> {
        let mut inner = self.inner.write().await;
        if inner.objects.contains_key(&obj.id) {
            return Err(AppError::DatabaseError(format!(
                "object {} already exists",
                obj.id
            )));
        }
        inner.objects.insert(obj.id, obj);
        Ok(())
    }

    async fn update(
        &self,
        id: i64,
        data: String,
        updated_time: i64,
        expected_version: i64,
    ) -> AppResult<bool> {
        let mut inner = self.inner.write().await;
        match inner.objects.get_mut(&id) {
            Some(obj) if obj.version == expected_version => {
                obj.data = data;
                obj.updated_time = updated_time;
                obj.version += 1;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn scan_type(&self, otype: &str) -> AppResult<Vec<StoredObject>> {
        let inner = self.inner.read().await;
        let mut objects: Vec<StoredObject> = inner
            .objects
            .values()
            .filter(|o| o.otype == otype)
            .cloned()
            .collect();
        objects.sort_by_key(|o| o.id);
        Ok(objects)
    }

    async fn add_edge(&self, edge: Edge) -> AppResult<bool> {
        let mut inner = self.inner.write().await;
        let inner = &mut *inner;
        let out = inner
            .edges_out
            .entry((edge.id1, edge.etype.clone()))
            .or_default();
        if out.contains_key(&edge.id2) {
            return Ok(false);
        }
        out.insert(edge.id2, edge.time);
        inner
            .edges_in
            .entry((edge.id2, edge.etype.clone()))
            .or_default()
            .insert(edge.id1, edge.time);
        Ok(true)
    }

    async fn remove_edge(&self, id1: i64, etype: &str, id2: i64) -> AppResult<bool> {
        let mut inner = self.inner.write().await;
        let removed = inner
            .edges_out
            .get_mut(&(id1, etype.to_string()))
            .map(|m| m.remove(&id2).is_some())
            .unwrap_or(false);
        if removed {
            if let Some(m) = inner.edges_in.get_mut(&(id2, etype.to_string())) {
                m.remove(&id1);
            }
        }
        Ok(removed)
    }

    async fn edge_exists(&self, id1: i64, etype: &str, id2: i64) -> AppResult<bool> {
        let inner = self.inner.read().await;
        Ok(inner
            .edges_out
            .get(&(id1, etype.to_string()))
            .map(|m| m.contains_key(&id2))
            .unwrap_or(false))
    }

    async fn count_edges_from(&self, id1: i64, etype: &str) -> AppResult<u64> {
        let inner = self.inner.read().await;
        Ok(inner
            .edges_out
            .get(&(id1, etype.to_string()))
            .map(|m| m.len() as u64)
            .unwrap_or(0))
    }

    async fn count_edges_to(&self, id2: i64, etype: &str) -> AppResult<u64> {
        let inner = self.inner.read().await;
        Ok(inner
            .edges_in
            .get(&(id2, etype.to_string()))
            .map(|m| m.len() as u64)
            .unwrap_or(0))
    }

    async fn edges_from(&self, id1: i64, etype: &str) -> AppResult<Vec<i64>> {
        let inner = self.inner.read().await;
        Ok(inner
            .edges_out
            .get(&(id1, etype.to_string()))
            .map(|m| m.keys().copied().collect())
            .unwrap_or_default())
    }

    async fn edges_to(&self, id2: i64, etype: &str) -> AppResult<Vec<i64>> {
        let inner = self.inner.read().await;
        Ok(inner
            .edges_in
            .get(&(id2, etype.to_string()))
            .map(|m| m.keys().copied().collect())
            .unwrap_or_default())
    }
}
