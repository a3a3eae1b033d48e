//! # Generic gRPC Transport
//!
//! Low-level building blocks for performing gRPC calls with dynamic message
//! types.
//!
//! Unlike standard `tonic` clients which are strongly typed (e.g.,
//! `HelloRequest`), the components here work with generic `serde_json::Value`
//! structures, transcoding them to Protobuf binary format on the fly against
//! descriptors resolved at runtime.

pub mod client;
pub mod codec;
