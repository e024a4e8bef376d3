//! Document model for externally stored detector data.
//!
//! Bulk frames never travel inline. Instead a detector announces the file it
//! writes once per session and then describes newly durable slices of it:
//!
//! - **StreamResource**: the artifact as a whole (path + addressing scheme)
//! - **StreamDatum**: a half-open frame range inside that artifact
//!
//! # Document Flow
//!
//! ```text
//! StreamResource (1 per session, at the first written frame)
//!    │
//!    └── StreamDatum (N, contiguous [start, stop) ranges)
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Addressing scheme for SWMR-readable HDF5 slices.
pub const AD_HDF5_SWMR_SLICE: &str = "AD_HDF5_SWMR_SLICE";

/// Generate a new unique document ID
pub fn new_uid() -> String {
    Uuid::new_v4().to_string()
}

/// Seconds since the Unix epoch, as used for reading timestamps.
pub fn now_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or_default()
}

/// Announces an artifact that chunk descriptors will refer to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamResource {
    /// Unique resource identifier
    pub uid: String,
    /// Addressing scheme, e.g. [`AD_HDF5_SWMR_SLICE`]
    pub spec: String,
    /// Root location the resource path is relative to
    pub root: String,
    /// Path of the artifact
    pub resource_path: String,
    /// Extra reader arguments
    pub resource_kwargs: HashMap<String, serde_json::Value>,
}

impl StreamResource {
    /// A resource with a fresh uid.
    pub fn new(spec: &str, root: &str, resource_path: &str) -> Self {
        Self {
            uid: new_uid(),
            spec: spec.to_string(),
            root: root.to_string(),
            resource_path: resource_path.to_string(),
            resource_kwargs: HashMap::new(),
        }
    }

    /// Compose the datum for block `block_idx` covering `indices`.
    ///
    /// Sequence numbers mirror the indices until rewind is supported.
    pub fn compose_datum(
        &self,
        block_idx: u64,
        data_keys: Vec<String>,
        indices: StreamRange,
    ) -> StreamDatum {
        StreamDatum {
            uid: format!("{}/{}", self.uid, block_idx),
            stream_resource: self.uid.clone(),
            block_idx,
            data_keys,
            seq_nums: indices,
            indices,
        }
    }
}

/// Half-open range `[start, stop)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamRange {
    /// First index (inclusive)
    pub start: u64,
    /// End index (exclusive)
    pub stop: u64,
}

impl StreamRange {
    /// Number of frames covered.
    pub fn len(&self) -> u64 {
        self.stop.saturating_sub(self.start)
    }

    /// True when the range covers no frames.
    pub fn is_empty(&self) -> bool {
        self.stop <= self.start
    }
}

/// A newly available slice of a stream resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamDatum {
    /// `<resource uid>/<block_idx>`
    pub uid: String,
    /// Owning resource uid
    pub stream_resource: String,
    /// Position of this datum in the resource's sequence of blocks
    pub block_idx: u64,
    /// Data keys filled by this slice
    pub data_keys: Vec<String>,
    /// Frame indices inside the artifact
    pub indices: StreamRange,
    /// Event sequence numbers for the same frames
    pub seq_nums: StreamRange,
}

/// Documents yielded by `collect_asset_docs`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "name", content = "doc", rename_all = "snake_case")]
pub enum Asset {
    /// Artifact announcement
    StreamResource(StreamResource),
    /// Chunk descriptor
    StreamDatum(StreamDatum),
}

impl Asset {
    /// Document kind, as used on the wire.
    pub fn kind(&self) -> &'static str {
        match self {
            Asset::StreamResource(_) => "stream_resource",
            Asset::StreamDatum(_) => "stream_datum",
        }
    }
}

/// Schema for a data field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataKey {
    /// Source address, e.g. `sim://DET:AcquireTime_RBV`
    pub source: String,
    /// Data type: "number", "integer", "string", "boolean", "array"
    pub dtype: String,
    /// Shape for arrays (empty for scalars)
    pub shape: Vec<i64>,
    /// Set when the data lives outside the event stream, e.g. "STREAM:"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external: Option<String>,
}

impl DataKey {
    /// Create a scalar data key
    pub fn scalar(source: &str, dtype: &str) -> Self {
        Self {
            source: source.to_string(),
            dtype: dtype.to_string(),
            shape: vec![],
            external: None,
        }
    }

    /// Create an array data key whose frames are stored externally.
    pub fn external_array(source: &str, shape: Vec<i64>, external: &str) -> Self {
        Self {
            source: source.to_string(),
            dtype: "array".to_string(),
            shape,
            external: Some(external.to_string()),
        }
    }
}

/// A value read from a signal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    /// Value as JSON
    pub value: serde_json::Value,
    /// Seconds since the Unix epoch
    pub timestamp: f64,
}
