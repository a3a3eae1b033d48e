//! # Periscope Core
//!
//! `periscope-core` is the engine behind the Periscope workspace. It talks to
//! arbitrary gRPC servers through the server-reflection protocol, rebuilds
//! their service/method/message definitions from the file descriptors the
//! server returns, renders editable JSON examples and field-level schemas for
//! every request type, and executes unary RPCs by parsing user JSON into
//! dynamic protobuf messages.
//!
//! ## Key Components
//!
//! * **[`App`]:** The operations boundary consumed by the surrounding shell.
//!   It owns storage and wires the subsystems below together.
//! * **[`ReflectionClient`]:** Speaks `grpc.reflection.v1` over a
//!   bidirectional stream and reconstructs self-contained
//!   `FileDescriptorSet`s, with a manual linker fallback for servers whose
//!   descriptor graphs reference files they never hand out.
//! * **[`ServicesInfo`]:** The normalized, recursion-safe schema tree the
//!   generators and the UI operate on.
//! * **[`invoke`]:** Resolves a `service/method` pair at call time and issues
//!   the RPC through a JSON<->protobuf transcoding codec, so no compiled
//!   message types are ever required.
//!
//! ## Persistence
//!
//! Server records, per-server reflection caches and call history live in a
//! SQLite file; editor tab state lives in a JSON file next to it. See
//! [`storage`].
//!
//! ## Re-exports
//!
//! This crate re-exports `prost`, `prost-reflect`, and `tonic` to ensure that
//! consumers use compatible versions of these underlying dependencies.

pub mod app;
pub mod cache;
pub mod config;
pub mod connection;
pub mod error;
pub mod grpc;
pub mod invoke;
pub mod reflection;
pub mod schema;
pub mod storage;

// Re-exports
pub use prost;
pub use prost_reflect;
pub use tonic;

pub use app::App;
pub use reflection::client::ReflectionClient;
pub use schema::model::{
    EnumValueInfo, FieldInfo, MessageInfo, MethodInfo, ServiceInfo, ServicesInfo,
};

/// Type alias for the standard boxed error used in generic bounds.
type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;
