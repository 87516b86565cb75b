// SQLite entity store. Objects carry a JSON payload and a version column;
// conditional updates compare the version in the WHERE clause so every
// read-modify-write is a single atomic statement.

use async_trait::async_trait;
use sqlx::{sqlite::SqlitePool, Row};

use super::{Edge, EntityStore, StoredObject};
use crate::error::{AppError, AppResult};

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub async fn connect(url: &str) -> AppResult<Self> {
        let pool = SqlitePool::connect(url)
            .await
            .map_err(|e| AppError::DatabaseError(format!("failed to connect to {}: {}", url, e)))?;
        let store = Self { pool };
        store.initialize().await?;
        Ok(store)
    }

    pub async fn new_in_memory() -> AppResult<Self> {
        Self::connect("sqlite::memory:").await
    }

    async fn initialize(&self) -> AppResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS objects (
                id INTEGER PRIMARY KEY,
                otype TEXT NOT NULL,
                data TEXT NOT NULL,
                created_time INTEGER NOT NULL,
                updated_time INTEGER NOT NULL,
                version INTEGER NOT NULL DEFAULT 1
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(format!("failed to create objects table: {}", e)))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS edges (
                id1 INTEGER NOT NULL,
                etype TEXT NOT NULL,
                id2 INTEGER NOT NULL,
                time INTEGER NOT NULL,
                PRIMARY KEY (id1, etype, id2)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(format!("failed to create edges table: {}", e)))?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_objects_otype ON objects(otype)")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(format!("failed to create otype index: {}", e)))?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_edges_reverse ON edges(id2, etype)")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(format!("failed to create edge index: {}", e)))?;

        Ok(())
    }

    fn row_to_object(row: &sqlx::sqlite::SqliteRow) -> StoredObject {
        StoredObject {
            id: row.get("id"),
            otype: row.get("otype"),
            data: row.get("data"),
            created_time: row.get("created_time"),
            updated_time: row.get("updated_time"),
            version: row.get("version"),
        }
    }
}

#[async_trait]
impl EntityStore for SqliteStore {
    async fn get(&self, id: i64) -> AppResult<Option<StoredObject>> {
        let row = sqlx::query(
            "SELECT id, otype, data, created_time, updated_time, version FROM objects WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(format!("failed to get object {}: {}", id, e)))?;

        Ok(row.as_ref().map(Self::row_to_object))
    }

    async fn create(&self, obj: StoredObject) -> AppResult<()> {
        sqlx::query(
            "INSERT INTO objects (id, otype, data, created_time, updated_time, version) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(obj.id)
        .bind(&obj.otype)
        .bind(&obj.data)
        .bind(obj.created_time)
        .bind(obj.updated_time)
        .bind(obj.version)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(format!("failed to create object {}: {}", obj.id, e)))?;
        Ok(())
    }

    async fn update(
        &self,
        id: i64,
        data: String,
        updated_time: i64,
        expected_version: i64,
    ) -> AppResult<bool> {
        let result = sqlx::query(
            "UPDATE objects SET data = ?, updated_time = ?, version = version + 1 \
             WHERE id = ? AND version = ?",
        )
        .bind(&data)
        .bind(updated_time)
        .bind(id)
        .bind(expected_version)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(format!("failed to update object {}: {}", id, e)))?;

        Ok(result.rows_affected() == 1)
    }

    async fn scan_type(&self, otype: &str) -> AppResult<Vec<StoredObject>> {
        let rows = sqlx::query(
            "SELECT id, otype, data, created_time, updated_time, version \
             FROM objects WHERE otype = ? ORDER BY id",
        )
        .bind(otype)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(format!("failed to scan type {}: {}", otype, e)))?;

        Ok(rows.iter().map(Self::row_to_object).collect())
    }

    async fn add_edge(&self, edge: Edge) -> AppResult<bool> {
        let result =
            sqlx::query("INSERT OR IGNORE INTO edges (id1, etype, id2, time) VALUES (?, ?, ?, ?)")
                .bind(edge.id1)
                .bind(&edge.etype)
                .bind(edge.id2)
                .bind(edge.time)
                .execute(&self.pool)
                .await
                .map_err(|e| AppError::DatabaseError(format!("failed to add edge: {}", e)))?;
        Ok(result.rows_affected() == 1)
    }

    async fn remove_edge(&self, id1: i64, etype: &str, id2: i64) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM edges WHERE id1 = ? AND etype = ? AND id2 = ?")
            .bind(id1)
            .bind(etype)
            .bind(id2)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(format!("failed to remove edge: {}", e)))?;
        Ok(result.rows_affected() == 1)
    }

    async fn edge_exists(&self, id1: i64, etype: &str, id2: i64) -> AppResult<bool> {
        let row = sqlx::query("SELECT 1 FROM edges WHERE id1 = ? AND etype = ? AND id2 = ?")
            .bind(id1)
            .bind(etype)
            .bind(id2)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(format!("failed to check edge: {}", e)))?;
        Ok(row.is_some())
    }

    async fn count_edges_from(&self, id1: i64, etype: &str) -> AppResult<u64> {
        let row = sqlx::query("SELECT COUNT(*) FROM edges WHERE id1 = ? AND etype = ?")
            .bind(id1)
            .bind(etype)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(format!("failed to count edges: {}", e)))?;
        Ok(row.get::<i64, _>(0) as u64)
    }

    async fn count_edges_to(&self, id2: i64, etype: &str) -> AppResult<u64> {
        let row = sqlx::query("SELECT COUNT(*) FROM edges WHERE id2 = ? AND etype = ?")
            .bind(id2)
            .bind(etype)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(format!("failed to count edges: {}", e)))?;
        Ok(row.get::<i64, _>(0) as u64)
    }

    async fn edges_from(&self, id1: i64, etype: &str) -> AppResult<Vec<i64>> {
        let rows = sqlx::query(
            "SELECT id2 FROM edges WHERE id1 = ? AND etype = ? ORDER BY time DESC, id2 DESC",
        )
        .bind(id1)
        .bind(etype)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(format!("failed to list edges: {}", e)))?;
        Ok(rows.iter().map(|r| r.get::<i64, _>(0)).collect())
    }

    async fn edges_to(&self, id2: i64, etype: &str) -> AppResult<Vec<i64>> {
        let rows = sqlx::query(
            "SELECT id1 FROM edges WHERE id2 = ? AND etype = ? ORDER BY time DESC, id1 DESC",
        )
        .bind(id2)
        .bind(etype)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(format!("failed to list edges: {}", e)))?;
        Ok(rows.iter().map(|r| r.get::<i64, _>(0)).collect())
    }
}
