//! SQLite-backed persistence for servers and call history.

use super::model::{HistoryRecord, NewHistoryRecord, ServerRecord};
use super::StorageError;
use crate::connection::ConnectOptions;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use std::path::Path;
use tracing::{debug, info};

/// Schema for the workspace database.
const CREATE_TABLES: &str = r#"
CREATE TABLE IF NOT EXISTS servers (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    address TEXT NOT NULL,
    favorite INTEGER NOT NULL DEFAULT 0,
    use_tls INTEGER NOT NULL DEFAULT 0,
    insecure_skip_verify INTEGER NOT NULL DEFAULT 0,
    reflection_cache TEXT NOT NULL DEFAULT '',
    reflection_cached_at TEXT,
    reflection_access_count INTEGER NOT NULL DEFAULT 0,
    reflection_error TEXT NOT NULL DEFAULT '',
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS history (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    server_id INTEGER NOT NULL,
    service TEXT NOT NULL,
    method TEXT NOT NULL,
    request_json TEXT NOT NULL DEFAULT '',
    response_json TEXT NOT NULL DEFAULT '',
    status_code INTEGER NOT NULL DEFAULT 0,
    execution_time_ms INTEGER NOT NULL DEFAULT 0,
    request_headers_json TEXT NOT NULL DEFAULT '',
    response_headers_json TEXT NOT NULL DEFAULT '',
    context_values_json TEXT NOT NULL DEFAULT '',
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_history_server_id ON history(server_id);
"#;

/// Workspace database: servers (with reflection cache columns) and history.
pub struct SqliteStorage {
    pool: SqlitePool,
}

impl SqliteStorage {
    /// Opens (creating if missing) the database at `path` and ensures the
    /// schema exists.
    pub async fn open(path: &Path) -> Result<Self, StorageError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await.ok();
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let storage = Self { pool };
        storage.initialize_schema().await?;
        Ok(storage)
    }

    async fn initialize_schema(&self) -> Result<(), StorageError> {
        sqlx::query(CREATE_TABLES).execute(&self.pool).await?;
        info!("workspace database schema initialized");
        Ok(())
    }

    // --- Servers ---

    pub async fn create_server(
        &self,
        name: &str,
        address: &str,
        options: &ConnectOptions,
    ) -> Result<i64, StorageError> {
        let result = sqlx::query(
            "INSERT INTO servers (name, address, use_tls, insecure_skip_verify, created_at) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(name)
        .bind(address)
        .bind(options.use_tls)
        .bind(options.insecure_skip_verify)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        let id = result.last_insert_rowid();
        debug!(id, name, address, "server created");
        Ok(id)
    }

    pub async fn get_server(&self, id: i64) -> Result<ServerRecord, StorageError> {
        let row = sqlx::query("SELECT * FROM servers WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StorageError::NotFound {
                entity: "server",
                id,
            })?;
        Ok(server_from_row(&row))
    }

    /// All servers, favorites first, then newest first.
    pub async fn get_servers(&self) -> Result<Vec<ServerRecord>, StorageError> {
        let rows = sqlx::query("SELECT * FROM servers ORDER BY favorite DESC, created_at DESC")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(server_from_row).collect())
    }

    pub async fn update_server(
        &self,
        id: i64,
        name: &str,
        address: &str,
        options: &ConnectOptions,
    ) -> Result<(), StorageError> {
        let result = sqlx::query(
            "UPDATE servers SET name = ?, address = ?, use_tls = ?, insecure_skip_verify = ? \
             WHERE id = ?",
        )
        .bind(name)
        .bind(address)
        .bind(options.use_tls)
        .bind(options.insecure_skip_verify)
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound {
                entity: "server",
                id,
            });
        }
        Ok(())
    }

    pub async fn delete_server(&self, id: i64) -> Result<(), StorageError> {
        sqlx::query("DELETE FROM servers WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn toggle_favorite(&self, id: i64) -> Result<(), StorageError> {
        let result = sqlx::query("UPDATE servers SET favorite = 1 - favorite WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound {
                entity: "server",
                id,
            });
        }
        Ok(())
    }

    // --- Reflection cache ---

    /// Stores a reflection round's result as one atomic update: body,
    /// timestamp, reset access count, and the error slot (empty on success).
    pub async fn update_reflection_cache(
        &self,
        id: i64,
        cache_json: &str,
        error: &str,
    ) -> Result<(), StorageError> {
        sqlx::query(
            "UPDATE servers SET reflection_cache = ?, reflection_cached_at = ?, \
             reflection_access_count = 0, reflection_error = ? WHERE id = ?",
        )
        .bind(cache_json)
        .bind(Utc::now())
        .bind(error)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Counts one read of the cached reflection data. Racy across concurrent
    /// readers, but monotonically advancing, which is all revalidation needs.
    pub async fn bump_reflection_access(&self, id: i64) -> Result<(), StorageError> {
        sqlx::query(
            "UPDATE servers SET reflection_access_count = reflection_access_count + 1 \
             WHERE id = ?",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    // --- History ---

    pub async fn create_history(&self, record: &NewHistoryRecord) -> Result<i64, StorageError> {
        let result = sqlx::query(
            "INSERT INTO history (server_id, service, method, request_json, response_json, \
             status_code, execution_time_ms, request_headers_json, response_headers_json, \
             context_values_json, created_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(record.server_id)
        .bind(&record.service)
        .bind(&record.method)
        .bind(&record.request_json)
        .bind(&record.response_json)
        .bind(record.status_code)
        .bind(record.execution_time_ms)
        .bind(&record.request_headers_json)
        .bind(&record.response_headers_json)
        .bind(&record.context_values_json)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    /// History for one server, newest first.
    pub async fn get_history(
        &self,
        server_id: i64,
        limit: i64,
    ) -> Result<Vec<HistoryRecord>, StorageError> {
        let rows = sqlx::query(
            "SELECT * FROM history WHERE server_id = ? ORDER BY created_at DESC, id DESC LIMIT ?",
        )
        .bind(server_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(history_from_row).collect())
    }

    pub async fn get_history_item(&self, id: i64) -> Result<HistoryRecord, StorageError> {
        let row = sqlx::query("SELECT * FROM history WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StorageError::NotFound {
                entity: "history record",
                id,
            })?;
        Ok(history_from_row(&row))
    }

    pub async fn delete_history_item(&self, id: i64) -> Result<(), StorageError> {
        sqlx::query("DELETE FROM history WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Deletes the oldest records beyond `keep`, retaining the most recent.
    pub async fn prune_history(&self, keep: i64) -> Result<u64, StorageError> {
        let result = sqlx::query(
            "DELETE FROM history WHERE id NOT IN \
             (SELECT id FROM history ORDER BY created_at DESC, id DESC LIMIT ?)",
        )
        .bind(keep)
        .execute(&self.pool)
        .await?;

        let pruned = result.rows_affected();
        if pruned > 0 {
            debug!(pruned, keep, "history pruned");
        }
        Ok(pruned)
    }

    pub async fn history_count(&self) -> Result<i64, StorageError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM history")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

fn server_from_row(row: &SqliteRow) -> ServerRecord {
    ServerRecord {
        id: row.get("id"),
        name: row.get("name"),
        address: row.get("address"),
        favorite: row.get("favorite"),
        use_tls: row.get("use_tls"),
        insecure_skip_verify: row.get("insecure_skip_verify"),
        reflection_cache: row.get("reflection_cache"),
        reflection_cached_at: row.get::<Option<DateTime<Utc>>, _>("reflection_cached_at"),
        reflection_access_count: row.get("reflection_access_count"),
        reflection_error: row.get("reflection_error"),
        created_at: row.get("created_at"),
    }
}

fn history_from_row(row: &SqliteRow) -> HistoryRecord {
    HistoryRecord {
        id: row.get("id"),
        server_id: row.get("server_id"),
        service: row.get("service"),
        method: row.get("method"),
        request_json: row.get("request_json"),
        response_json: row.get("response_json"),
        status_code: row.get("status_code"),
        execution_time_ms: row.get("execution_time_ms"),
        request_headers_json: row.get("request_headers_json"),
        response_headers_json: row.get("response_headers_json"),
        context_values_json: row.get("context_values_json"),
        created_at: row.get("created_at"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn scratch_storage() -> (SqliteStorage, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let storage = SqliteStorage::open(&dir.path().join("test.db")).await.unwrap();
        (storage, dir)
    }

    #[tokio::test]
    async fn test_server_crud() {
        let (storage, _dir) = scratch_storage().await;

        let id = storage
            .create_server("local", "localhost:50051", &ConnectOptions::default())
            .await
            .unwrap();
        assert!(id > 0);

        let server = storage.get_server(id).await.unwrap();
        assert_eq!(server.name, "local");
        assert_eq!(server.address, "localhost:50051");
        assert!(!server.favorite);
        assert!(server.reflection_cache.is_empty());
        assert!(server.reflection_cached_at.is_none());

        storage
            .update_server(id, "prod", "prod:443", &ConnectOptions::new(true, false))
            .await
            .unwrap();
        let server = storage.get_server(id).await.unwrap();
        assert_eq!(server.name, "prod");
        assert!(server.use_tls);

        storage.delete_server(id).await.unwrap();
        assert!(matches!(
            storage.get_server(id).await,
            Err(StorageError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_servers_ordered_favorites_first() {
        let (storage, _dir) = scratch_storage().await;

        let first = storage
            .create_server("first", "a:1", &ConnectOptions::default())
            .await
            .unwrap();
        let second = storage
            .create_server("second", "b:1", &ConnectOptions::default())
            .await
            .unwrap();
        storage.toggle_favorite(first).await.unwrap();

        let servers = storage.get_servers().await.unwrap();
        assert_eq!(servers[0].id, first, "favorite sorts first");
        assert_eq!(servers[1].id, second);

        storage.toggle_favorite(first).await.unwrap();
        let servers = storage.get_servers().await.unwrap();
        assert!(!servers.iter().any(|s| s.favorite));
    }

    #[tokio::test]
    async fn test_reflection_cache_update_resets_access_count() {
        let (storage, _dir) = scratch_storage().await;
        let id = storage
            .create_server("s", "a:1", &ConnectOptions::default())
            .await
            .unwrap();

        storage.bump_reflection_access(id).await.unwrap();
        storage.bump_reflection_access(id).await.unwrap();
        let server = storage.get_server(id).await.unwrap();
        assert_eq!(server.reflection_access_count, 2);

        storage
            .update_reflection_cache(id, r#"{"services":[]}"#, "")
            .await
            .unwrap();
        let server = storage.get_server(id).await.unwrap();
        assert_eq!(server.reflection_access_count, 0);
        assert_eq!(server.reflection_cache, r#"{"services":[]}"#);
        assert!(server.reflection_cached_at.is_some());
        assert!(server.reflection_error.is_empty());

        storage.update_reflection_cache(id, "", "boom").await.unwrap();
        let server = storage.get_server(id).await.unwrap();
        assert!(server.reflection_cache.is_empty());
        assert_eq!(server.reflection_error, "boom");
    }

    #[tokio::test]
    async fn test_history_prune_keeps_newest() {
        let (storage, _dir) = scratch_storage().await;
        let server_id = storage
            .create_server("s", "a:1", &ConnectOptions::default())
            .await
            .unwrap();

        for i in 0..10 {
            storage
                .create_history(&NewHistoryRecord {
                    server_id,
                    service: "svc".into(),
                    method: format!("m{i}"),
                    ..Default::default()
                })
                .await
                .unwrap();
        }

        let pruned = storage.prune_history(4).await.unwrap();
        assert_eq!(pruned, 6);
        assert_eq!(storage.history_count().await.unwrap(), 4);

        let rest = storage.get_history(server_id, 100).await.unwrap();
        let methods: Vec<_> = rest.iter().map(|h| h.method.as_str()).collect();
        assert_eq!(methods, ["m9", "m8", "m7", "m6"], "newest records survive");
    }
}
