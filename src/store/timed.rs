// Timeout decorator. Every store call carries a bounded deadline; expiry
// surfaces as a retryable `AppError::Timeout` instead of hanging a request.

use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;

use super::{Edge, EntityStore, StoredObject};
use crate::error::{AppError, AppResult};

pub struct TimedStore<S> {
    inner: S,
    timeout: Duration,
}

impl<S: EntityStore> TimedStore<S> {
    pub fn new(inner: S, timeout: Duration) -> Self {
        Self { inner, timeout }
    }

    async fn bounded<T, F>(&self, op: &'static str, fut: F) -> AppResult<T>
    where
        F: Future<Output = AppResult<T>> + Send,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(AppError::Timeout(format!(
                "store call '{}' exceeded {}ms",
                op,
                self.timeout.as_millis()
            ))),
        }
    }
}

#[async_trait]
impl<S: EntityStore> EntityStore for TimedStore<S> {
    async fn get(&self, id: i64) -> AppResult<Option<StoredObject>> {
        self.bounded("get", self.inner.get(id)).await
    }

    async fn create(&self, obj: StoredObject) -> AppResult<()> {
        self.bounded("create", self.inner.create(obj)).await
    }

    async fn update(
        &self,
        id: i64,
        data: String,
        updated_time: i64,
        expected_version: i64,
    ) -> AppResult<bool> {
        self.bounded(
            "update",
            self.inner.update(id, data, updated_time, expected_version),
        )
        .await
    }

    async fn scan_type(&self, otype: &str) -> AppResult<Vec<StoredObject>> {
        self.bounded("scan_type", self.inner.scan_type(otype)).await
    }

    async fn add_edge(&self, edge: Edge) -> AppResult<bool> {
        self.bounded("add_edge", self.inner.add_edge(edge)).await
    }

    async fn remove_edge(&self, id1: i64, etype: &str, id2: i64) -> AppResult<bool> {
        self.bounded("remove_edge", self.inner.remove_edge(id1, etype, id2))
            .await
    }

    async fn edge_exists(&self, id1: i64, etype: &str, id2: i64) -> AppResult<bool> {
        self.bounded("edge_exists", self.inner.edge_exists(id1, etype, id2))
            .await
    }

    async fn count_edges_from(&self, id1: i64, etype: &str) -> AppResult<u64> {
        self.bounded(
            "count_edges_from",
            self.inner.count_edges_from(id1, etype),
        )
        .await
    }

    async fn count_edges_to(&self, id2: i64, etype: &str) -> AppResult<u64> {
        self.bounded("count_edges_to", self.inner.count_edges_to(id2, etype))
            .await
    }

    async fn edges_from(&self, id1: i64, etype: &str) -> AppResult<Vec<i64>> {
        self.bounded("edges_from", self.inner.edges_from(id1, etype))
            .await
    }

    async fn edges_to(&self, id2: i64, etype: &str) -> AppResult<Vec<i64>> {
        self.bounded("edges_to", self.inner.edges_to(id2, etype))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    struct StalledStore;

    #[async_trait]
    impl EntityStore for StalledStore {
        async fn get(&self, _id: i64) -> AppResult<Option<StoredObject>> {
            // Simulates a hung backend
            std::future::pending::<()>().await;
            unreachable!()
        }
        async fn create(&self, _obj: StoredObject) -> AppResult<()> {
            unimplemented!()
        }
        async fn update(&self, _: i64, _: String, _: i64, _: i64) -> AppResult<bool> {
            unimplemented!()
        }
        async fn scan_type(&self, _: &str) -> AppResult<Vec<StoredObject>> {
            unimplemented!()
        }
        async fn add_edge(&self, _: Edge) -> AppResult<bool> {
            unimplemented!()
        }
        async fn remove_edge(&self, _: i64, _: &str, _: i64) -> AppResult<bool> {
            unimplemented!()
        }
        async fn edge_exists(&self, _: i64, _: &str, _: i64) -> AppResult<bool> {
            unimplemented!()
        }
        async fn count_edges_from(&self, _: i64, _: &str) -> AppResult<u64> {
            unimplemented!()
        }
        async fn count_edges_to(&self, _: i64, _: &str) -> AppResult<u64> {
            unimplemented!()
        }
        async fn edges_from(&self, _: i64, _: &str) -> AppResult<Vec<i64>> {
            unimplemented!()
        }
        async fn edges_to(&self, _: i64, _: &str) -> AppResult<Vec<i64>> {
            unimplemented!()
        }
    }

    #[tokio::test]
    async fn stalled_call_times_out_as_retryable() {
        let store = TimedStore::new(StalledStore, Duration::from_millis(20));
        let err = store.get(1).await.unwrap_err();
        assert!(matches!(err, AppError::Timeout(_)));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn fast_calls_pass_through() {
        let store = TimedStore::new(MemoryStore::new(), Duration::from_millis(500));
        assert!(store.get(1).await.unwrap().is_none());
    }
}
