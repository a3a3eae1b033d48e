//! # Persistence
//!
//! Periscope keeps its workspace in two places, both under the application
//! data directory:
//!
//! * a SQLite file ([`sqlite::SqliteStorage`]) holding server records (with
//!   their reflection-cache columns) and call history, and
//! * a JSON file ([`tabs::TabStorage`]) holding editor tab state.
//!
//! The rest of the crate consumes only the narrow async interfaces exposed
//! here; locking is delegated to the storage backends.

pub mod model;
pub mod sqlite;
pub mod tabs;

/// Call history is capped at this many records; the oldest are pruned.
pub const MAX_HISTORY_SIZE: i64 = 500;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("{entity} with id {id} not found")]
    NotFound { entity: &'static str, id: i64 },

    #[error("Failed to read tab state file: {0}")]
    TabIo(#[from] std::io::Error),

    #[error("Failed to decode tab state file: {0}")]
    TabFormat(#[from] serde_json::Error),
}
