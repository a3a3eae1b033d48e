//! # Schema Tree & Generators
//!
//! This module turns resolved protobuf descriptors into the normalized,
//! recursion-safe tree the UI operates on ([`model::ServicesInfo`]), and
//! renders the per-method artifacts attached to that tree:
//!
//! * a plain JSON example with type-appropriate zero values,
//! * an annotated example with `// oneof` comments for the editor,
//! * a field-level schema document consumed by UI forms.

pub mod example;
pub mod extract;
pub mod model;
pub mod request_schema;
