//! Object serialization protocol for tessera
//!
//! This crate implements identity-preserving, versioned binary encoding of
//! object graphs:
//! - ByteInputStream/ByteOutputStream: growable byte buffers
//! - DataSerialization/DataDeserialization: fixed-width little-endian primitives
//! - varint: LEB128 and zig-zag helpers
//! - SerializationRegistry: stable type ids mapped to serializers
//! - Serialization/Deserialization: object graphs with back-references,
//!   per-object version tags, skippable bodies and regions
//! - SerdeRegistryExtension: bincode fallback for serde types

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod data;
pub mod deserialization;
pub mod error;
pub mod record;
pub mod registry;
pub mod serde_ext;
pub mod serialization;
pub mod serializer;
pub mod stream;
pub mod varint;

pub use data::{DataDeserialization, DataSerialization, Extensions};
pub use deserialization::Deserialization;
pub use error::{Result, SerializationError};
pub use registry::{
    CompositeSerializationRegistryExtension, SerializationInfo, SerializationRegistrar,
    SerializationRegistry, SerializationRegistryExtension,
};
pub use serde_ext::SerdeRegistryExtension;
pub use serialization::Serialization;
pub use serializer::{downcast, ObjectRef, Serializer, TypeKey};
pub use stream::{ByteInputStream, ByteOutputStream};
