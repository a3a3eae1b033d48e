//! # Dynamic Invoker
//!
//! Executes a unary RPC described entirely at runtime: the method is resolved
//! through server reflection, the JSON payload is parsed into a dynamic
//! request message, and the response is rendered back to JSON together with
//! the gRPC status, response headers (or trailers on failure), and the
//! measured execution time.
//!
//! The whole operation runs under a single 30-second deadline that starts
//! before the reflection fetch; the reported `execution_ms`, however, covers
//! only the wire call itself.

use crate::connection::{ConnectError, ConnectOptions, open_channel};
use crate::grpc::client::{CallContext, GrpcClient, GrpcRequestError};
use crate::reflection::client::{ReflectionClient, ReflectionError};
use prost_reflect::DynamicMessage;
use serde_json::json;
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use tokio::time::{Instant, timeout_at};
use tonic::Code;
use tonic::metadata::{KeyAndValueRef, MetadataMap};
use tracing::debug;

/// Deadline for the complete invocation, resolution included.
pub const INVOKE_TIMEOUT: Duration = Duration::from_secs(30);

/// Everything needed to execute one dynamic unary call.
#[derive(Debug, Clone, Default)]
pub struct DynamicCall {
    pub address: String,
    pub service: String,
    pub method: String,
    /// JSON document for the request message; empty means an empty message.
    pub payload_json: String,
    /// Metadata attached to the outgoing request.
    pub headers: HashMap<String, String>,
    /// Opaque values accompanying the call; recorded, never transmitted.
    pub context_values: HashMap<String, String>,
    pub options: ConnectOptions,
}

#[derive(Debug, thiserror::Error)]
pub enum CallError {
    #[error("Failed to open a channel to '{address}': {source}")]
    Connect {
        address: String,
        #[source]
        source: ConnectError,
    },

    #[error("Failed to resolve method '{service}/{method}': {source}")]
    MethodResolution {
        service: String,
        method: String,
        #[source]
        source: ReflectionError,
    },

    #[error("Only unary methods can be invoked; '{0}' is streaming")]
    StreamingUnsupported(String),

    #[error("Failed to parse request payload: {0}")]
    PayloadParse(String),

    #[error("Failed to send request: {0}")]
    Request(#[from] GrpcRequestError),

    #[error("RPC failed: {0}")]
    Rpc(#[source] tonic::Status),

    #[error("Failed to serialize the response to JSON: {0}")]
    ResponseMarshal(String),

    #[error("The call did not complete within the {}s deadline", INVOKE_TIMEOUT.as_secs())]
    DeadlineExceeded,
}

impl CallError {
    /// gRPC status code reported for this failure.
    pub fn code(&self) -> Code {
        match self {
            CallError::Connect { .. } => Code::Unavailable,
            CallError::MethodResolution { .. } => Code::NotFound,
            CallError::StreamingUnsupported(_) => Code::Unimplemented,
            CallError::PayloadParse(_) => Code::InvalidArgument,
            CallError::Request(_) => Code::InvalidArgument,
            CallError::Rpc(status) => status.code(),
            CallError::ResponseMarshal(_) => Code::Internal,
            CallError::DeadlineExceeded => Code::DeadlineExceeded,
        }
    }
}

/// Result of one invocation. Partial data (status code, trailers, timing) is
/// reported even when the call failed, so history stays meaningful.
#[derive(Debug)]
pub struct CallOutcome {
    /// Response message as JSON; empty on failure.
    pub response_json: String,
    pub status: Code,
    /// Response headers on success; trailers when the server returned an
    /// error status; empty otherwise.
    pub headers: BTreeMap<String, Vec<String>>,
    /// Wall time of the wire call only, in milliseconds.
    pub execution_ms: i64,
    pub error: Option<CallError>,
}

impl CallOutcome {
    fn failure(error: CallError, execution_ms: i64) -> Self {
        Self {
            response_json: String::new(),
            status: error.code(),
            headers: BTreeMap::new(),
            execution_ms,
            error: Some(error),
        }
    }
}

/// Executes `call` end to end. Never panics on remote faults: every failure
/// becomes a [`CallOutcome`] carrying a gRPC code.
pub async fn execute(call: &DynamicCall) -> CallOutcome {
    let deadline = Instant::now() + INVOKE_TIMEOUT;

    let channel = match open_channel(&call.address, &call.options) {
        Ok(channel) => channel,
        Err(source) => {
            return CallOutcome::failure(
                CallError::Connect {
                    address: call.address.clone(),
                    source,
                },
                0,
            );
        }
    };

    // Resolve the method over reflection, under the shared deadline.
    let mut reflection = ReflectionClient::new(channel.clone());
    let resolved = timeout_at(deadline, reflection.method_descriptor(&call.service, &call.method)).await;
    let method = match resolved {
        Err(_) => return CallOutcome::failure(CallError::DeadlineExceeded, 0),
        Ok(Err(source)) => {
            return CallOutcome::failure(
                CallError::MethodResolution {
                    service: call.service.clone(),
                    method: call.method.clone(),
                    source,
                },
                0,
            );
        }
        Ok(Ok(method)) => method,
    };

    if method.is_client_streaming() || method.is_server_streaming() {
        return CallOutcome::failure(
            CallError::StreamingUnsupported(format!("{}/{}", call.service, call.method)),
            0,
        );
    }

    // An empty payload is an empty request message; anything else must parse
    // against the input schema before we touch the wire.
    let payload = if call.payload_json.trim().is_empty() {
        json!({})
    } else {
        match serde_json::from_str::<serde_json::Value>(&call.payload_json) {
            Ok(value) => value,
            Err(err) => return CallOutcome::failure(CallError::PayloadParse(err.to_string()), 0),
        }
    };
    if let Err(err) = DynamicMessage::deserialize(method.input(), payload.clone()) {
        return CallOutcome::failure(CallError::PayloadParse(err.to_string()), 0);
    }

    let headers: Vec<(String, String)> = call
        .headers
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    let context = CallContext(call.context_values.clone());
    let remaining = deadline.saturating_duration_since(Instant::now());

    debug!(
        service = %call.service,
        method = %call.method,
        address = %call.address,
        "invoking unary method"
    );

    let mut client = GrpcClient::new(channel);
    let started = Instant::now();
    let result = timeout_at(
        deadline,
        client.unary(&method, payload, &headers, Some(remaining), context),
    )
    .await;
    let execution_ms = started.elapsed().as_millis() as i64;

    match result {
        Err(_) => CallOutcome::failure(CallError::DeadlineExceeded, execution_ms),
        Ok(Err(err)) => CallOutcome::failure(CallError::Request(err), execution_ms),
        Ok(Ok(Err(status))) => {
            let headers = metadata_to_map(status.metadata());
            CallOutcome {
                response_json: String::new(),
                status: status.code(),
                headers,
                execution_ms,
                error: Some(CallError::Rpc(status)),
            }
        }
        Ok(Ok(Ok(response))) => {
            let headers = metadata_to_map(response.metadata());
            match serde_json::to_string(&response.into_inner()) {
                Ok(response_json) => CallOutcome {
                    response_json,
                    status: Code::Ok,
                    headers,
                    execution_ms,
                    error: None,
                },
                Err(err) => CallOutcome::failure(
                    CallError::ResponseMarshal(err.to_string()),
                    execution_ms,
                ),
            }
        }
    }
}

/// Flattens ASCII metadata into an ordered multimap; binary entries are
/// skipped because history and the shell only handle text.
fn metadata_to_map(metadata: &MetadataMap) -> BTreeMap<String, Vec<String>> {
    let mut map: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for entry in metadata.iter() {
        if let KeyAndValueRef::Ascii(key, value) = entry
            && let Ok(value) = value.to_str()
        {
            map.entry(key.as_str().to_string())
                .or_default()
                .push(value.to_string());
        }
    }
    map
}
