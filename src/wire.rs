//! On-wire encoding of plan fragments.
//!
//! The parallelizer ships each minor fragment as an opaque byte blob:
//! the materialized operator tree and the session options serialized
//! to JSON, optionally compressed. Receivers decode with the codec
//! tag carried in the PlanFragment envelope.

use crate::error::{PlannerError, Result};
use crate::plan::operator::PhysicalOperator;
use crate::workunit::SessionOption;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FragmentCodec {
    #[default]
    None,
    Snappy,
}

/// Serializes operator trees and option lists under a fixed codec.
#[derive(Debug, Clone)]
pub struct PlanWriter {
    codec: FragmentCodec,
}

impl PlanWriter {
    pub fn new(codec: FragmentCodec) -> Self {
        Self { codec }
    }

    pub fn codec(&self) -> FragmentCodec {
        self.codec
    }

    pub fn write_plan(&self, root: &PhysicalOperator) -> Result<Vec<u8>> {
        let raw = serde_json::to_vec(root)
            .map_err(|e| PlannerError::Serialization(format!("plan fragment: {}", e)))?;
        self.encode(raw)
    }

    pub fn write_options(&self, options: &[SessionOption]) -> Result<Vec<u8>> {
        let raw = serde_json::to_vec(options)
            .map_err(|e| PlannerError::Serialization(format!("session options: {}", e)))?;
        self.encode(raw)
    }

    /// Decode a fragment blob back into its operator tree. The
    /// executor side does this with the codec tag from the envelope;
    /// here it backs the round-trip tests.
    pub fn read_plan(&self, bytes: &[u8]) -> Result<PhysicalOperator> {
        let raw = self.decode(bytes)?;
        serde_json::from_slice(&raw)
            .map_err(|e| PlannerError::Serialization(format!("plan fragment: {}", e)))
    }

    fn encode(&self, raw: Vec<u8>) -> Result<Vec<u8>> {
        match self.codec {
            FragmentCodec::None => Ok(raw),
            FragmentCodec::Snappy => snap::raw::Encoder::new()
                .compress_vec(&raw)
                .map_err(|e| PlannerError::Serialization(format!("snappy encode: {}", e))),
        }
    }

    fn decode(&self, bytes: &[u8]) -> Result<Vec<u8>> {
        match self.codec {
            FragmentCodec::None => Ok(bytes.to_vec()),
            FragmentCodec::Snappy => snap::raw::Decoder::new()
                .decompress_vec(bytes)
                .map_err(|e| PlannerError::Serialization(format!("snappy decode: {}", e))),
        }
    }
}
