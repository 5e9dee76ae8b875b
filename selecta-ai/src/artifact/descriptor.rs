//! On-disk bundle format
//!
//! A bundle is a descriptor/blob pair sharing one build timestamp:
//!
//! - `bundle_info_<YYYYMMDD_HHMMSS>.json` holds the schema, the label tree
//!   and a SHA-256 reference to the blob
//! - `bundle_stages_<YYYYMMDD_HHMMSS>.bin` holds the stage parameters

use crate::artifact::stage::StageModel;
use crate::features::schema::FeatureSchema;
use crate::types::NodeId;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Bundle format tag written by this build
pub const BUNDLE_FORMAT_V1: &str = "selecta-bundle/1";

/// Bundle formats this build can load
pub const SUPPORTED_BUNDLE_FORMATS: &[&str] = &[BUNDLE_FORMAT_V1];

/// The only inference strategy defined for v1 bundles
pub const STRATEGY_CASCADE: &str = "cascade";

/// Build timestamp format embedded in file names
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

const DESCRIPTOR_PREFIX: &str = "bundle_info_";
const DESCRIPTOR_SUFFIX: &str = ".json";
const BLOB_PREFIX: &str = "bundle_stages_";
const BLOB_SUFFIX: &str = ".bin";

/// Sidecar descriptor (`bundle_info_<ts>.json`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BundleDescriptor {
    pub format_version: String,
    pub strategy: String,
    /// Build tag, `YYYYMMDD_HHMMSS`
    pub build_timestamp: String,
    /// Must equal `schema.feature_len()`
    pub feature_length: usize,
    pub schema: FeatureSchema,
    pub nodes: Vec<NodeDescriptor>,
    /// Blob file name, relative to the descriptor's directory
    pub blob_file: String,
    /// Lowercase hex SHA-256 of the blob bytes
    pub blob_sha256: String,
}

impl Default for BundleDescriptor {
    fn default() -> Self {
        Self {
            format_version: BUNDLE_FORMAT_V1.to_string(),
            strategy: STRATEGY_CASCADE.to_string(),
            build_timestamp: String::new(),
            feature_length: 0,
            schema: FeatureSchema::default(),
            nodes: Vec::new(),
            blob_file: String::new(),
            blob_sha256: String::new(),
        }
    }
}

/// One hierarchy node as stored in the descriptor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeDescriptor {
    pub id: NodeId,
    pub label: String,
    #[serde(default)]
    pub parent: Option<NodeId>,
    /// Stage id bound to this node
    #[serde(default)]
    pub stage: Option<String>,
    pub threshold: f64,
}

/// Stage blob contents (`bundle_stages_<ts>.bin`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageBlob {
    pub stages: Vec<StageRecord>,
}

/// Serialized stage: output order is `classes`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageRecord {
    pub id: String,
    pub classes: Vec<NodeId>,
    pub model: StageModel,
}

impl StageBlob {
    /// Serialize to blob bytes
    pub fn to_bytes(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes)
    }
}

/// Lowercase hex SHA-256 digest
pub fn sha256_hex(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

pub fn descriptor_file_name(build_timestamp: &str) -> String {
    format!("{}{}{}", DESCRIPTOR_PREFIX, build_timestamp, DESCRIPTOR_SUFFIX)
}

pub fn blob_file_name(build_timestamp: &str) -> String {
    format!("{}{}{}", BLOB_PREFIX, build_timestamp, BLOB_SUFFIX)
}

/// Parse a `YYYYMMDD_HHMMSS` build tag
pub fn parse_build_timestamp(tag: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(tag, TIMESTAMP_FORMAT).ok()
}

/// Build timestamp of a descriptor file name, if it follows the naming scheme
pub fn descriptor_timestamp(file_name: &str) -> Option<NaiveDateTime> {
    let tag = file_name
        .strip_prefix(DESCRIPTOR_PREFIX)?
        .strip_suffix(DESCRIPTOR_SUFFIX)?;
    parse_build_timestamp(tag)
}
