//! # Reflection Client
//!
//! Client for the gRPC Server Reflection Protocol (`grpc.reflection.v1`).
//!
//! The [`ReflectionClient`] lets Periscope inspect the schema of a running
//! gRPC server at runtime. It is capable of:
//!
//! 1. **Listing Services**: querying the server for all exposed service names.
//! 2. **Symbol Resolution**: fetching the `FileDescriptorProto`s for a
//!    specific symbol, recursively following imports so the returned set is
//!    self-contained.
//! 3. **Schema Extraction**: turning resolved services into the normalized
//!    [`ServicesInfo`] tree, including the rendered request artifacts.
//! 4. **Method Resolution**: producing a `MethodDescriptor` for dynamic
//!    invocation, falling back to manual linking (see [`super::linker`]) when
//!    the stock pool refuses the server's descriptor set.
//!
//! ## References
//!
//! * [gRPC Server Reflection Protocol](https://github.com/grpc/grpc/blob/master/doc/server-reflection.md)

use super::linker::{self, LinkError};
use crate::BoxError;
use crate::schema::extract;
use crate::schema::model::{ServiceInfo, ServicesInfo};
use http_body::Body as HttpBody;
use prost::Message;
use prost_reflect::{DescriptorPool, MethodDescriptor};
use prost_types::{FileDescriptorProto, FileDescriptorSet};
use std::collections::{HashMap, HashSet};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tonic::transport::Channel;
use tonic::{Streaming, client::GrpcService};
use tonic_reflection::pb::v1::{
    ServerReflectionRequest, ServerReflectionResponse,
    server_reflection_client::ServerReflectionClient, server_reflection_request::MessageRequest,
    server_reflection_response::MessageResponse,
};
use tracing::{debug, warn};

/// Errors that can occur while talking to the reflection service or turning
/// its answers into usable descriptors.
#[derive(Debug, thiserror::Error)]
pub enum ReflectionError {
    #[error(
        "Failed to start a stream request with the reflection server, reflection might not be supported: '{0}'"
    )]
    StreamInitFailed(#[source] tonic::Status),

    #[error("The reflection stream returned an error status: '{0}'")]
    StreamFailure(#[source] tonic::Status),

    #[error("Reflection stream closed unexpectedly")]
    StreamClosed,

    #[error("Internal error: failed to send request to the reflection stream")]
    SendFailed,

    #[error("Server returned reflection error code {code}: {message}")]
    ServerError { code: i32, message: String },

    #[error("Protocol error: received unexpected response type: {0}")]
    UnexpectedResponseType(String),

    #[error("Failed to decode FileDescriptorProto: {0}")]
    Decode(#[from] prost::DecodeError),

    #[error("Failed to build descriptor pool: {0}")]
    Descriptor(#[from] prost_reflect::DescriptorError),

    #[error(transparent)]
    Link(#[from] LinkError),

    #[error("Service '{0}' not found in the server's descriptors")]
    ServiceNotFound(String),

    #[error("Method '{method}' not found in service '{service}'")]
    MethodNotFound { service: String, method: String },
}

// The host field of reflection requests is undocumented and servers ignore
// it, so we never ask the caller for one.
const EMPTY_HOST: &str = "";

/// A client for the gRPC Server Reflection Service of a single server.
pub struct ReflectionClient<T = Channel> {
    client: ServerReflectionClient<T>,
}

impl<S> ReflectionClient<S>
where
    S: GrpcService<tonic::body::Body>,
    S::Error: Into<BoxError>,
    S::ResponseBody: HttpBody<Data = tonic::codegen::Bytes> + Send + 'static,
    <S::ResponseBody as HttpBody>::Error: Into<BoxError> + Send,
{
    /// Creates a new `ReflectionClient` using the provided gRPC service
    /// (e.g., a `Channel`).
    pub fn new(channel: S) -> Self {
        let client = ServerReflectionClient::new(channel);
        Self { client }
    }

    /// Lists all services exposed by the server, including system services.
    pub async fn list_services(&mut self) -> Result<Vec<String>, ReflectionError> {
        let req = ServerReflectionRequest {
            host: EMPTY_HOST.to_string(),
            message_request: Some(MessageRequest::ListServices(String::new())),
        };

        let mut response_stream = self
            .client
            .server_reflection_info(tokio_stream::once(req))
            .await
            .map_err(ReflectionError::StreamInitFailed)?
            .into_inner();

        let response = next_message(&mut response_stream).await?;
        match response.message_response {
            Some(MessageResponse::ListServicesResponse(resp)) => {
                Ok(resp.service.into_iter().map(|s| s.name).collect())
            }
            other => Err(unexpected(other)),
        }
    }

    /// Produces the full user-visible schema tree for the server.
    ///
    /// System services (reflection, health) are filtered out, and a service
    /// that fails to resolve is skipped with a warning rather than failing
    /// the whole round: one broken proto graph should not hide the rest of
    /// the server.
    pub async fn services_info(&mut self) -> Result<ServicesInfo, ReflectionError> {
        let names = self.list_services().await?;

        let mut services = Vec::new();
        for name in names {
            if super::is_system_service(&name) {
                continue;
            }
            match self.resolve_service(&name).await {
                Ok(service) => services.push(service),
                Err(err) => {
                    warn!(service = %name, error = %err, "failed to resolve service, skipping");
                }
            }
        }

        Ok(ServicesInfo { services })
    }

    /// Resolves one service into its [`ServiceInfo`] tree.
    pub async fn resolve_service(&mut self, name: &str) -> Result<ServiceInfo, ReflectionError> {
        let pool = self.descriptor_pool_for_symbol(name).await?;
        let service = pool
            .get_service_by_name(name)
            .ok_or_else(|| ReflectionError::ServiceNotFound(name.to_string()))?;
        Ok(extract::service_info(&service))
    }

    /// Resolves a `service/method` pair into a [`MethodDescriptor`] for
    /// dynamic invocation.
    ///
    /// The high-level path builds a pool from the recursively fetched
    /// descriptor set. If that fails (typically because the graph references
    /// a file the server never serves), the low-level path takes the raw
    /// protos from a single `FileContainingSymbol` exchange and links them
    /// manually with stub injection.
    pub async fn method_descriptor(
        &mut self,
        service: &str,
        method: &str,
    ) -> Result<MethodDescriptor, ReflectionError> {
        match self.method_descriptor_high_level(service, method).await {
            Ok(descriptor) => Ok(descriptor),
            Err(err @ ReflectionError::MethodNotFound { .. }) => Err(err),
            Err(err) => {
                debug!(
                    %service, %method, error = %err,
                    "high-level method resolution failed, falling back to manual linking"
                );
                self.method_descriptor_low_level(service, method).await
            }
        }
    }

    async fn method_descriptor_high_level(
        &mut self,
        service: &str,
        method: &str,
    ) -> Result<MethodDescriptor, ReflectionError> {
        let pool = self.descriptor_pool_for_symbol(service).await?;
        find_method(&pool, service, method)
    }

    async fn method_descriptor_low_level(
        &mut self,
        service: &str,
        method: &str,
    ) -> Result<MethodDescriptor, ReflectionError> {
        let files = self.file_descriptor_protos_by_symbol(service).await?;
        let pool = linker::link(files)?;
        find_method(&pool, service, method)
    }

    /// Builds a descriptor pool covering `symbol`, preferring the stock pool
    /// construction and falling back to the manual linker.
    async fn descriptor_pool_for_symbol(
        &mut self,
        symbol: &str,
    ) -> Result<DescriptorPool, ReflectionError> {
        let fd_set = self.file_descriptor_set_by_symbol(symbol).await?;
        match DescriptorPool::from_file_descriptor_set(fd_set.clone()) {
            Ok(pool) => Ok(pool),
            Err(err) => {
                debug!(%symbol, error = %err, "stock descriptor pool rejected the set, linking manually");
                Ok(linker::link(fd_set.file)?)
            }
        }
    }

    /// Fetches the complete `FileDescriptorSet` containing the definition for
    /// the given symbol.
    ///
    /// This performs a recursive lookup: the file defining `symbol` is
    /// requested first, then every import that has not been fetched yet, until
    /// the set is self-contained.
    pub async fn file_descriptor_set_by_symbol(
        &mut self,
        symbol: &str,
    ) -> Result<FileDescriptorSet, ReflectionError> {
        let (tx, rx) = mpsc::channel(100);

        let mut response_stream = self
            .client
            .server_reflection_info(ReceiverStream::new(rx))
            .await
            .map_err(ReflectionError::StreamInitFailed)?
            .into_inner();

        let req = ServerReflectionRequest {
            host: EMPTY_HOST.to_string(),
            message_request: Some(MessageRequest::FileContainingSymbol(symbol.to_string())),
        };
        tx.send(req).await.map_err(|_| ReflectionError::SendFailed)?;

        let file_map = collect_descriptors(&mut response_stream, tx).await?;

        Ok(FileDescriptorSet {
            file: file_map.into_values().collect(),
        })
    }

    /// Fetches only the protos from a single `FileContainingSymbol` exchange,
    /// without following imports. This is the raw material for the manual
    /// linking fallback.
    pub async fn file_descriptor_protos_by_symbol(
        &mut self,
        symbol: &str,
    ) -> Result<Vec<FileDescriptorProto>, ReflectionError> {
        let req = ServerReflectionRequest {
            host: EMPTY_HOST.to_string(),
            message_request: Some(MessageRequest::FileContainingSymbol(symbol.to_string())),
        };

        let mut response_stream = self
            .client
            .server_reflection_info(tokio_stream::once(req))
            .await
            .map_err(ReflectionError::StreamInitFailed)?
            .into_inner();

        let response = next_message(&mut response_stream).await?;
        match response.message_response {
            Some(MessageResponse::FileDescriptorResponse(res)) => {
                let mut files = Vec::with_capacity(res.file_descriptor_proto.len());
                for raw in res.file_descriptor_proto {
                    files.push(FileDescriptorProto::decode(raw.as_ref())?);
                }
                Ok(files)
            }
            other => Err(unexpected(other)),
        }
    }
}

fn find_method(
    pool: &DescriptorPool,
    service: &str,
    method: &str,
) -> Result<MethodDescriptor, ReflectionError> {
    let service_desc = pool
        .get_service_by_name(service)
        .ok_or_else(|| ReflectionError::ServiceNotFound(service.to_string()))?;

    service_desc
        .methods()
        .find(|m| m.name() == method)
        .ok_or_else(|| ReflectionError::MethodNotFound {
            service: service.to_string(),
            method: method.to_string(),
        })
}

async fn next_message(
    stream: &mut Streaming<ServerReflectionResponse>,
) -> Result<ServerReflectionResponse, ReflectionError> {
    stream
        .message()
        .await
        .map_err(ReflectionError::StreamFailure)?
        .ok_or(ReflectionError::StreamClosed)
}

fn unexpected(response: Option<MessageResponse>) -> ReflectionError {
    match response {
        Some(MessageResponse::ErrorResponse(e)) => ReflectionError::ServerError {
            code: e.error_code,
            message: e.error_message,
        },
        Some(other) => ReflectionError::UnexpectedResponseType(format!("{other:?}")),
        None => ReflectionError::UnexpectedResponseType("Empty Message".into()),
    }
}

/// Drains the response stream, requesting unseen imports as they appear, until
/// every in-flight request has been answered.
async fn collect_descriptors(
    response_stream: &mut Streaming<ServerReflectionResponse>,
    request_channel: mpsc::Sender<ServerReflectionRequest>,
) -> Result<HashMap<String, FileDescriptorProto>, ReflectionError> {
    let mut inflight = 1;
    let mut collected: HashMap<String, FileDescriptorProto> = HashMap::new();
    let mut requested: HashSet<String> = HashSet::new();

    while inflight > 0 {
        let response = next_message(response_stream).await?;
        inflight -= 1;

        let batch = match response.message_response {
            Some(MessageResponse::FileDescriptorResponse(res)) => res.file_descriptor_proto,
            other => return Err(unexpected(other)),
        };

        for raw in batch {
            let fd = FileDescriptorProto::decode(raw.as_ref())?;
            let Some(name) = fd.name.clone() else {
                continue;
            };
            if collected.contains_key(&name) {
                continue;
            }

            for dep in &fd.dependency {
                if !collected.contains_key(dep) && requested.insert(dep.clone()) {
                    let req = ServerReflectionRequest {
                        host: EMPTY_HOST.to_string(),
                        message_request: Some(MessageRequest::FileByFilename(dep.clone())),
                    };
                    request_channel
                        .send(req)
                        .await
                        .map_err(|_| ReflectionError::SendFailed)?;
                    inflight += 1;
                }
            }

            collected.insert(name, fd);
        }
    }

    Ok(collected)
}
