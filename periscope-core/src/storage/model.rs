//! Persisted records. Field names (camelCase) are part of the shell-facing
//! JSON contract.

use crate::connection::ConnectOptions;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A stored gRPC server, including its reflection cache state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerRecord {
    pub id: i64,
    pub name: String,
    pub address: String,
    pub favorite: bool,
    pub use_tls: bool,
    pub insecure_skip_verify: bool,
    /// Serialized `ServicesInfo` from the last successful reflection round;
    /// empty when never fetched or after a failure.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub reflection_cache: String,
    pub reflection_cached_at: Option<DateTime<Utc>>,
    pub reflection_access_count: i64,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub reflection_error: String,
    pub created_at: DateTime<Utc>,
}

impl ServerRecord {
    pub fn connect_options(&self) -> ConnectOptions {
        ConnectOptions::new(self.use_tls, self.insecure_skip_verify)
    }
}

/// One executed RPC, successful or not.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HistoryRecord {
    pub id: i64,
    pub server_id: i64,
    pub service: String,
    pub method: String,
    pub request_json: String,
    pub response_json: String,
    pub status_code: i32,
    pub execution_time_ms: i64,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub request_headers_json: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub response_headers_json: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub context_values_json: String,
    pub created_at: DateTime<Utc>,
}

/// History fields supplied by the caller; id and timestamp are assigned by
/// the store.
#[derive(Debug, Clone, Default)]
pub struct NewHistoryRecord {
    pub server_id: i64,
    pub service: String,
    pub method: String,
    pub request_json: String,
    pub response_json: String,
    pub status_code: i32,
    pub execution_time_ms: i64,
    pub request_headers_json: String,
    pub response_headers_json: String,
    pub context_values_json: String,
}

/// Editor tab state persisted between sessions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TabState {
    pub tab_id: String,
    pub name: String,
    pub component: String,
    pub props: String,
    pub state: String,
    pub is_active: bool,
    pub order: i32,
}
