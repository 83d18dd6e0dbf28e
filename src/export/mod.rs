//! Model export and serialization
//!
//! Fitted workflows are persisted as:
//! - Native binary format (bincode, checksummed)
//! - JSON format (portable, human-readable)

mod serializer;

pub use serializer::{ModelArtifact, ModelMetadata, ModelSerializer, SerializationFormat};
