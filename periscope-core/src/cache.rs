//! # Reflection Cache Coordinator
//!
//! Reflection rounds are expensive (a bidirectional stream plus descriptor
//! linking per service), so each server's [`ServicesInfo`] is cached inside
//! its record and revalidated by two bounds:
//!
//! * **age**: older than [`REFLECTION_CACHE_TTL`] means refresh,
//! * **use**: more than [`REFLECTION_REFRESH_EVERY`] reads since the last
//!   refresh means refresh.
//!
//! A refresh stores `(body, cached_at, access_count = 0, error)` as one
//! transactional update; failures store an empty body with the formatted
//! error so the shell can explain stale data. A cache body that no longer
//! deserializes is treated as absent and forces a wire round instead of
//! surfacing an error.

use crate::connection::open_channel;
use crate::error::{
    ErrorStrings, format_connection_error, format_reflection_error, is_connection_error,
};
use crate::reflection::client::ReflectionClient;
use crate::schema::model::ServicesInfo;
use crate::storage::model::ServerRecord;
use crate::storage::sqlite::SqliteStorage;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, warn};

/// Cached reflection data is considered fresh for this long.
pub const REFLECTION_CACHE_TTL: Duration = Duration::from_secs(10 * 60);

/// A refresh is forced after this many reads of the cached data.
pub const REFLECTION_REFRESH_EVERY: i64 = 20;

/// Deadline for reflection rounds; shared across all servers in bulk fetches.
pub const REFLECTION_TIMEOUT: Duration = Duration::from_secs(5);

/// One server together with its (possibly cached) reflection result.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerWithReflection {
    pub server: ServerRecord,
    pub reflection: ServicesInfo,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ServerWithReflection {
    pub fn empty(server: ServerRecord, error: Option<String>) -> Self {
        Self {
            server,
            reflection: ServicesInfo::default(),
            error,
        }
    }
}

/// The revalidation policy.
pub fn needs_refresh(server: &ServerRecord, now: DateTime<Utc>, force_refresh: bool) -> bool {
    force_refresh
        || server.reflection_cache.is_empty()
        || cache_expired(server, now)
        || server.reflection_access_count >= REFLECTION_REFRESH_EVERY
}

fn cache_expired(server: &ServerRecord, now: DateTime<Utc>) -> bool {
    match server.reflection_cached_at {
        None => true,
        Some(cached_at) => now
            .signed_duration_since(cached_at)
            .to_std()
            .is_ok_and(|age| age > REFLECTION_CACHE_TTL),
    }
}

/// Returns the reflection data for `server`, from cache when the policy
/// allows it and from the wire otherwise. Wire results (and wire failures)
/// are persisted; cache reads bump the access count.
pub async fn server_reflection(
    storage: &SqliteStorage,
    strings: &ErrorStrings,
    server: ServerRecord,
    force_refresh: bool,
) -> ServerWithReflection {
    if !needs_refresh(&server, Utc::now(), force_refresh) {
        if !server.reflection_error.is_empty() {
            let error = server.reflection_error.clone();
            return ServerWithReflection::empty(server, Some(error));
        }

        match serde_json::from_str::<ServicesInfo>(&server.reflection_cache) {
            Ok(reflection) => {
                if let Err(err) = storage.bump_reflection_access(server.id).await {
                    warn!(server_id = server.id, error = %err, "failed to bump reflection access count");
                }
                return ServerWithReflection {
                    server,
                    reflection,
                    error: None,
                };
            }
            Err(err) => {
                // Corrupt body: fall through to a wire round.
                debug!(server_id = server.id, error = %err, "cached reflection body unreadable, refreshing");
            }
        }
    }

    refresh_reflection(storage, strings, server).await
}

async fn refresh_reflection(
    storage: &SqliteStorage,
    strings: &ErrorStrings,
    server: ServerRecord,
) -> ServerWithReflection {
    let options = server.connect_options();

    let channel = match open_channel(&server.address, &options) {
        Ok(channel) => channel,
        Err(err) => {
            let message = format_connection_error(strings, &err, &server.address, &options);
            record_failure(storage, server.id, &message).await;
            return ServerWithReflection::empty(server, Some(message));
        }
    };

    let mut client = ReflectionClient::new(channel);
    match client.services_info().await {
        Ok(reflection) => {
            match serde_json::to_string(&reflection) {
                Ok(body) => {
                    if let Err(err) = storage.update_reflection_cache(server.id, &body, "").await {
                        warn!(server_id = server.id, error = %err, "failed to store reflection cache");
                    }
                }
                Err(err) => {
                    warn!(server_id = server.id, error = %err, "failed to serialize reflection result");
                }
            }
            debug!(
                server_id = server.id,
                services = reflection.services.len(),
                "reflection refreshed"
            );
            ServerWithReflection {
                server,
                reflection,
                error: None,
            }
        }
        Err(err) => {
            let message = if is_connection_error(&err) {
                format_connection_error(strings, &err, &server.address, &options)
            } else {
                format_reflection_error(strings, &err)
            };
            record_failure(storage, server.id, &message).await;
            ServerWithReflection::empty(server, Some(message))
        }
    }
}

async fn record_failure(storage: &SqliteStorage, server_id: i64, message: &str) {
    if let Err(err) = storage.update_reflection_cache(server_id, "", message).await {
        warn!(server_id, error = %err, "failed to record reflection error");
    }
}
