//! # Generic gRPC Client
//!
//! Wraps a standard `tonic` client to provide a schema-agnostic interface for
//! unary gRPC communication: it constructs the HTTP/2 path
//! (`/package.Service/Method`) at runtime and hands serialization to the
//! [`super::codec::JsonCodec`], so it never needs to know the structure of
//! the data it is sending.
//!
//! The full [`tonic::Response`] is returned on success so callers can observe
//! the response headers; on RPC failure the [`tonic::Status`] carries the
//! trailers.

use super::codec::JsonCodec;
use crate::BoxError;
use http_body::Body as HttpBody;
use prost_reflect::MethodDescriptor;
use std::str::FromStr;
use std::time::Duration;
use tonic::{
    client::GrpcService,
    metadata::{
        MetadataKey, MetadataValue,
        errors::{InvalidMetadataKey, InvalidMetadataValue},
    },
    transport::Channel,
};

#[derive(thiserror::Error, Debug)]
pub enum GrpcRequestError {
    #[error("Internal error, the client was not ready: '{0}'")]
    ClientNotReady(#[source] BoxError),
    #[error("Invalid method path '{0}'")]
    InvalidPath(String),
    #[error("Invalid metadata (header) key '{key}': '{source}'")]
    InvalidMetadataKey {
        key: String,
        source: InvalidMetadataKey,
    },
    #[error("Invalid metadata (header) value for key '{key}': '{source}'")]
    InvalidMetadataValue {
        key: String,
        source: InvalidMetadataValue,
    },
}

/// Opaque per-call values attached to the request as an extension. They
/// accompany the call for bookkeeping but are never transmitted on the wire.
#[derive(Debug, Clone, Default)]
pub struct CallContext(pub std::collections::HashMap<String, String>);

/// A generic client for unary gRPC calls with runtime-resolved schemas.
pub struct GrpcClient<S = Channel> {
    client: tonic::client::Grpc<S>,
}

impl<S> GrpcClient<S>
where
    S: GrpcService<tonic::body::Body>,
    S::Error: Into<BoxError>,
    S::ResponseBody: HttpBody<Data = tonic::codegen::Bytes> + Send + 'static,
    <S::ResponseBody as HttpBody>::Error: Into<BoxError> + Send,
{
    pub fn new(service: S) -> Self {
        let client = tonic::client::Grpc::new(service);
        Self { client }
    }

    /// Performs a unary gRPC call (single request -> single response).
    ///
    /// # Returns
    /// * `Ok(Ok(Response))` - Successful RPC execution, headers included.
    /// * `Ok(Err(Status))` - RPC executed, but the server returned an error;
    ///   trailers travel in the status metadata.
    /// * `Err(GrpcRequestError)` - Failed to prepare or send the request.
    pub async fn unary(
        &mut self,
        method: &MethodDescriptor,
        payload: serde_json::Value,
        headers: &[(String, String)],
        timeout: Option<Duration>,
        context: CallContext,
    ) -> Result<Result<tonic::Response<serde_json::Value>, tonic::Status>, GrpcRequestError> {
        self.client
            .ready()
            .await
            .map_err(|e| GrpcRequestError::ClientNotReady(e.into()))?;

        let codec = JsonCodec::new(method.input(), method.output());
        let path = http_path(method)?;
        let mut request = build_request(payload, headers, timeout)?;
        request.extensions_mut().insert(context);

        match self.client.unary(request, path, codec).await {
            Ok(response) => Ok(Ok(response)),
            Err(status) => Ok(Err(status)),
        }
    }
}

fn http_path(method: &MethodDescriptor) -> Result<http::uri::PathAndQuery, GrpcRequestError> {
    let path = format!("/{}/{}", method.parent_service().full_name(), method.name());
    http::uri::PathAndQuery::from_str(&path).map_err(|_| GrpcRequestError::InvalidPath(path))
}

fn build_request<T>(
    payload: T,
    headers: &[(String, String)],
    timeout: Option<Duration>,
) -> Result<tonic::Request<T>, GrpcRequestError> {
    let mut request = tonic::Request::new(payload);
    if let Some(timeout) = timeout {
        request.set_timeout(timeout);
    }
    for (k, v) in headers {
        let key = MetadataKey::from_str(k).map_err(|source| GrpcRequestError::InvalidMetadataKey {
            key: k.clone(),
            source,
        })?;
        let val = MetadataValue::from_str(v).map_err(|source| {
            GrpcRequestError::InvalidMetadataValue {
                key: k.clone(),
                source,
            }
        })?;
        request.metadata_mut().insert(key, val);
    }
    Ok(request)
}
