//! # Operations Boundary
//!
//! [`App`] is the async facade the surrounding shell calls. It owns storage
//! and the user-visible string table, and wires together the reflection
//! cache, the invoker, and the generators. Every operation here is
//! cancellable; channels and streams are scoped to the operation and released
//! on every exit path.

use crate::cache::{self, REFLECTION_TIMEOUT, ServerWithReflection};
use crate::config::AppPaths;
use crate::connection::{ConnectError, ConnectOptions, open_channel};
use crate::error::{
    ErrorStrings, format_connection_error, format_reflection_error, is_connection_error,
};
use crate::invoke::{self, DynamicCall};
use crate::reflection::client::ReflectionClient;
use crate::schema::example;
use crate::schema::model::MessageInfo;
use crate::storage::model::{HistoryRecord, NewHistoryRecord, ServerRecord, TabState};
use crate::storage::sqlite::SqliteStorage;
use crate::storage::tabs::TabStorage;
use crate::storage::{MAX_HISTORY_SIZE, StorageError};
use serde::{Serialize, Serializer};
use std::collections::{BTreeMap, HashMap};
use tokio::time::{Instant, timeout, timeout_at};
use tonic::Status;
use tracing::warn;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Connect(#[from] ConnectError),

    #[error("Failed to resolve application paths: {0}")]
    Config(#[from] crate::config::ConfigError),
}

/// Outcome of [`App::validate_server_address`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationStatus {
    Ok = 0,
    ConnectionFailed = 1,
    ReflectionNotAvailable = 2,
    NoServices = 3,
}

impl Serialize for ValidationStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i32(*self as i32)
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    pub status: ValidationStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ValidationResult {
    fn ok() -> Self {
        Self {
            status: ValidationStatus::Ok,
            message: None,
        }
    }

    fn failed(status: ValidationStatus, message: String) -> Self {
        Self {
            status,
            message: Some(message),
        }
    }
}

/// What the shell receives for an executed RPC.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GrpcResponse {
    pub response: String,
    pub status_code: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub struct App {
    storage: SqliteStorage,
    tabs: TabStorage,
    strings: ErrorStrings,
}

impl App {
    /// Opens the workspace at the platform data directory.
    pub async fn open() -> Result<Self, AppError> {
        let paths = AppPaths::resolve()?;
        Self::open_at(&paths).await
    }

    /// Opens the workspace at explicit paths (used by tests and portable
    /// installs).
    pub async fn open_at(paths: &AppPaths) -> Result<Self, AppError> {
        let storage = SqliteStorage::open(&paths.database).await?;
        let tabs = TabStorage::new(paths.tabs.clone());
        Ok(Self {
            storage,
            tabs,
            strings: ErrorStrings::default(),
        })
    }

    /// Replaces the user-visible string table (localization hook).
    pub fn set_strings(&mut self, strings: ErrorStrings) {
        self.strings = strings;
    }

    pub fn storage(&self) -> &SqliteStorage {
        &self.storage
    }

    // --- Servers ---

    pub async fn create_server(
        &self,
        name: &str,
        address: &str,
        use_tls: bool,
        insecure: bool,
    ) -> Result<i64, AppError> {
        let options = ConnectOptions::new(use_tls, insecure);
        options.validate()?;
        Ok(self.storage.create_server(name, address, &options).await?)
    }

    pub async fn get_servers(&self) -> Result<Vec<ServerRecord>, AppError> {
        Ok(self.storage.get_servers().await?)
    }

    pub async fn update_server(
        &self,
        id: i64,
        name: &str,
        address: &str,
        use_tls: bool,
        insecure: bool,
    ) -> Result<(), AppError> {
        let options = ConnectOptions::new(use_tls, insecure);
        options.validate()?;
        Ok(self
            .storage
            .update_server(id, name, address, &options)
            .await?)
    }

    pub async fn delete_server(&self, id: i64) -> Result<(), AppError> {
        Ok(self.storage.delete_server(id).await?)
    }

    pub async fn toggle_favorite_server(&self, id: i64) -> Result<(), AppError> {
        Ok(self.storage.toggle_favorite(id).await?)
    }

    // --- Validation ---

    /// Checks whether `address` hosts a reachable gRPC server with usable
    /// reflection, within a 5-second deadline.
    pub async fn validate_server_address(
        &self,
        address: &str,
        use_tls: bool,
        insecure: bool,
    ) -> ValidationResult {
        let options = ConnectOptions::new(use_tls, insecure);

        let channel = match open_channel(address, &options) {
            Ok(channel) => channel,
            Err(err) => {
                return ValidationResult::failed(
                    ValidationStatus::ConnectionFailed,
                    format_connection_error(&self.strings, &err, address, &options),
                );
            }
        };

        let mut client = ReflectionClient::new(channel);
        let services = match timeout(REFLECTION_TIMEOUT, client.services_info()).await {
            Err(_) => {
                let status = Status::deadline_exceeded("validation timed out");
                return ValidationResult::failed(
                    ValidationStatus::ConnectionFailed,
                    format_connection_error(&self.strings, &status, address, &options),
                );
            }
            Ok(Err(err)) => {
                return if is_connection_error(&err) {
                    ValidationResult::failed(
                        ValidationStatus::ConnectionFailed,
                        format_connection_error(&self.strings, &err, address, &options),
                    )
                } else {
                    ValidationResult::failed(
                        ValidationStatus::ReflectionNotAvailable,
                        format_reflection_error(&self.strings, &err),
                    )
                };
            }
            Ok(Ok(services)) => services,
        };

        if services.services.is_empty() {
            return ValidationResult::failed(
                ValidationStatus::NoServices,
                self.strings.no_services.clone(),
            );
        }

        ValidationResult::ok()
    }

    // --- Reflection ---

    /// Reflection for every stored server, served from cache where the policy
    /// allows. All servers share one 5-second deadline.
    pub async fn get_servers_with_reflection(
        &self,
    ) -> Result<Vec<ServerWithReflection>, AppError> {
        let deadline = Instant::now() + REFLECTION_TIMEOUT;
        let servers = self.storage.get_servers().await?;

        let mut results = Vec::with_capacity(servers.len());
        for server in servers {
            let fallback = server.clone();
            match timeout_at(
                deadline,
                cache::server_reflection(&self.storage, &self.strings, server, false),
            )
            .await
            {
                Ok(result) => results.push(result),
                Err(_) => {
                    let status = Status::deadline_exceeded("reflection fetch timed out");
                    let message = format_connection_error(
                        &self.strings,
                        &status,
                        &fallback.address,
                        &fallback.connect_options(),
                    );
                    results.push(ServerWithReflection::empty(fallback, Some(message)));
                }
            }
        }

        Ok(results)
    }

    /// Reflection for one server, always from the wire (force refresh).
    pub async fn get_server_with_reflection(
        &self,
        id: i64,
    ) -> Result<ServerWithReflection, AppError> {
        let server = self.storage.get_server(id).await?;
        let fallback = server.clone();

        match timeout(
            REFLECTION_TIMEOUT,
            cache::server_reflection(&self.storage, &self.strings, server, true),
        )
        .await
        {
            Ok(result) => Ok(result),
            Err(_) => {
                let status = Status::deadline_exceeded("reflection fetch timed out");
                let message = format_connection_error(
                    &self.strings,
                    &status,
                    &fallback.address,
                    &fallback.connect_options(),
                );
                Ok(ServerWithReflection::empty(fallback, Some(message)))
            }
        }
    }

    // --- Generators ---

    pub fn get_json_example(&self, msg: &MessageInfo) -> String {
        example::generate_json_example(msg)
    }

    // --- Invocation ---

    /// Executes one unary RPC and appends it to history, pruning the table to
    /// the newest [`MAX_HISTORY_SIZE`] records.
    #[allow(clippy::too_many_arguments)]
    pub async fn do_grpc_request(
        &self,
        server_id: i64,
        address: &str,
        service: &str,
        method: &str,
        payload: &str,
        request_headers: HashMap<String, String>,
        context_values: HashMap<String, String>,
    ) -> Result<GrpcResponse, AppError> {
        let server = self.storage.get_server(server_id).await?;

        let call = DynamicCall {
            address: address.to_string(),
            service: service.to_string(),
            method: method.to_string(),
            payload_json: payload.to_string(),
            headers: request_headers,
            context_values,
            options: server.connect_options(),
        };

        let outcome = invoke::execute(&call).await;

        let record = NewHistoryRecord {
            server_id,
            service: service.to_string(),
            method: method.to_string(),
            request_json: payload.to_string(),
            response_json: outcome.response_json.clone(),
            status_code: outcome.status as i32,
            execution_time_ms: outcome.execution_ms,
            request_headers_json: encode_map(&call.headers),
            response_headers_json: encode_first_values(&outcome.headers),
            context_values_json: encode_map(&call.context_values),
        };
        self.storage.create_history(&record).await?;

        if let Err(err) = self.storage.prune_history(MAX_HISTORY_SIZE).await {
            warn!(error = %err, "failed to prune history");
        }

        Ok(GrpcResponse {
            response: outcome.response_json,
            status_code: outcome.status as i32,
            error: outcome.error.map(|e| e.to_string()),
        })
    }

    // --- History ---

    pub async fn get_history(
        &self,
        server_id: i64,
        limit: i64,
    ) -> Result<Vec<HistoryRecord>, AppError> {
        Ok(self.storage.get_history(server_id, limit).await?)
    }

    pub async fn get_history_item(&self, id: i64) -> Result<HistoryRecord, AppError> {
        Ok(self.storage.get_history_item(id).await?)
    }

    pub async fn delete_history_item(&self, id: i64) -> Result<(), AppError> {
        Ok(self.storage.delete_history_item(id).await?)
    }

    // --- Tabs ---

    pub async fn save_tab_states(&self, tabs: &[TabState]) -> Result<(), AppError> {
        Ok(self.tabs.save_tabs(tabs).await?)
    }

    pub async fn get_tab_states(&self) -> Result<Vec<TabState>, AppError> {
        Ok(self.tabs.load_tabs().await?)
    }

    pub async fn delete_tab_state(&self, tab_id: &str) -> Result<(), AppError> {
        Ok(self.tabs.delete_tab(tab_id).await?)
    }
}

fn encode_map(map: &HashMap<String, String>) -> String {
    if map.is_empty() {
        return String::new();
    }
    // Sort for stable history documents.
    let ordered: BTreeMap<_, _> = map.iter().collect();
    serde_json::to_string(&ordered).unwrap_or_default()
}

/// History stores only the first value of multi-valued response headers.
fn encode_first_values(headers: &BTreeMap<String, Vec<String>>) -> String {
    if headers.is_empty() {
        return String::new();
    }
    let flattened: BTreeMap<&str, &str> = headers
        .iter()
        .filter_map(|(k, v)| v.first().map(|first| (k.as_str(), first.as_str())))
        .collect();
    serde_json::to_string(&flattened).unwrap_or_default()
}
