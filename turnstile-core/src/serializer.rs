//! Storage encodings for value sets.
//!
//! Only backends that move values over the wire use a serializer. The
//! in-process table keeps native values and the relational store keeps JSON.

use crate::error::{Error, Result};
use crate::value::ValueSet;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Pluggable encoding of value sets.
pub trait Serializer: Send + Sync {
    /// Name used in logs and configuration.
    fn name(&self) -> &'static str;

    /// Encode a value set into bytes.
    fn encode(&self, values: &ValueSet) -> Result<Vec<u8>>;

    /// Decode bytes previously produced by [`Serializer::encode`].
    fn decode(&self, bytes: &[u8]) -> Result<ValueSet>;
}

/// Compact binary encoding (CBOR). The default.
#[derive(Debug, Clone, Copy, Default)]
pub struct CborSerializer;

impl Serializer for CborSerializer {
    fn name(&self) -> &'static str {
        "cbor"
    }

    fn encode(&self, values: &ValueSet) -> Result<Vec<u8>> {
        let mut bytes = Vec::new();
        ciborium::ser::into_writer(values, &mut bytes)
            .map_err(|e| Error::Serialization(e.to_string()))?;
        Ok(bytes)
    }

    fn decode(&self, bytes: &[u8]) -> Result<ValueSet> {
        ciborium::de::from_reader(bytes).map_err(|e| Error::Deserialization(e.to_string()))
    }
}

/// JSON encoding, readable from other languages.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSerializer;

impl Serializer for JsonSerializer {
    fn name(&self) -> &'static str {
        "json"
    }

    fn encode(&self, values: &ValueSet) -> Result<Vec<u8>> {
        serde_json::to_vec(values).map_err(|e| Error::Serialization(e.to_string()))
    }

    fn decode(&self, bytes: &[u8]) -> Result<ValueSet> {
        serde_json::from_slice(bytes).map_err(|e| Error::Deserialization(e.to_string()))
    }
}

/// Serializer selection for configuration files and environment variables.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SerializerKind {
    #[default]
    Cbor,
    Json,
}

impl SerializerKind {
    /// Parse a serializer name.
    pub fn parse(name: &str) -> Result<Self> {
        match name.trim().to_lowercase().as_str() {
            "cbor" => Ok(Self::Cbor),
            "json" => Ok(Self::Json),
            other => Err(Error::Config(format!("Unknown serializer: {}", other))),
        }
    }

    /// Instantiate the serializer.
    pub fn build(self) -> Arc<dyn Serializer> {
        match self {
            Self::Cbor => Arc::new(CborSerializer),
            Self::Json => Arc::new(JsonSerializer),
        }
    }
}

impl fmt::Display for SerializerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cbor => f.write_str("cbor"),
            Self::Json => f.write_str("json"),
        }
    }
}
