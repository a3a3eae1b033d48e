//! # Server Reflection
//!
//! This module contains the logic necessary to interact with the gRPC Server
//! Reflection Protocol.
//!
//! It enables the engine to query a server for its own Protobuf schema at
//! runtime, so Periscope can explore and call services without pre-compiled
//! descriptors. [`client`] speaks the wire protocol; [`linker`] assembles the
//! returned file descriptors into a usable pool even when the set is
//! incomplete or out of order.

pub mod client;
pub mod linker;

/// Whether `name` is an infrastructure service (reflection, health) that must
/// never appear in user-visible listings.
pub fn is_system_service(name: &str) -> bool {
    (name.starts_with("grpc.reflection.") && name.ends_with(".ServerReflection"))
        || name.starts_with("grpc.health.")
}
