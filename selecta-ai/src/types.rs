//! Core types shared by the extraction, artifact and inference layers

use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Audio Input
// ============================================================================

/// Decoded audio buffer supplied by the caller
///
/// Interleaved PCM samples (f32, normalized to [-1.0, 1.0]). The classifier
/// only reads it.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioSample {
    samples: Vec<f32>,
    sample_rate: u32,
    channels: u16,
}

impl AudioSample {
    /// Create from interleaved samples
    pub fn new(samples: Vec<f32>, sample_rate: u32, channels: u16) -> Self {
        Self {
            samples,
            sample_rate,
            channels,
        }
    }

    /// Create a single-channel buffer
    pub fn mono(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self::new(samples, sample_rate, 1)
    }

    /// Interleaved samples
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Number of frames (samples per channel)
    pub fn frames(&self) -> usize {
        if self.channels == 0 {
            0
        } else {
            self.samples.len() / self.channels as usize
        }
    }

    /// Duration in seconds (0.0 for a buffer without a valid sample rate)
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            0.0
        } else {
            self.frames() as f64 / self.sample_rate as f64
        }
    }
}

// ============================================================================
// Features
// ============================================================================

/// Fixed-length feature vector
///
/// Length and ordering are defined by the bundle's feature schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeatureVector(Vec<f64>);

impl FeatureVector {
    pub fn new(values: Vec<f64>) -> Self {
        Self(values)
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

// ============================================================================
// Hierarchy Identifiers
// ============================================================================

/// Stable hierarchy node identifier
///
/// Ordering is significant: ties between equally probable children are
/// resolved in favor of the lower id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub u32);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// ============================================================================
// Classification Result
// ============================================================================

/// Terminal status of a cascade run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ClassificationStatus {
    /// Cascade reached a leaf node
    FullyClassified,
    /// At least one level was accepted before a threshold rejected descent
    PartiallyClassified,
    /// No level below the root cleared its threshold
    Unclassified,
}

impl fmt::Display for ClassificationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ClassificationStatus::FullyClassified => "fully-classified",
            ClassificationStatus::PartiallyClassified => "partially-classified",
            ClassificationStatus::Unclassified => "unclassified",
        };
        f.write_str(s)
    }
}

/// Probability assigned to one child by a stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelProbability {
    pub node: NodeId,
    pub label: String,
    pub probability: f64,
}

/// One level of the cascade
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathStep {
    /// Node chosen at this level (arg-max child of the previous node)
    pub node: NodeId,
    pub label: String,
    /// Stage probability for `node` (1.0 for a pass-through step)
    pub confidence: f64,
    /// Whether the confidence cleared the parent's threshold
    pub accepted: bool,
    /// Full stage distribution, in stage output order (empty for pass-through)
    pub probabilities: Vec<LabelProbability>,
}

/// Outcome of classifying one sample
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    /// Build tag of the bundle that produced this result
    pub bundle_version: String,
    /// Hierarchy root (not counted as a classification)
    pub root: NodeId,
    /// Accepted steps, from the first level below the root to the deepest accepted node
    pub path: Vec<PathStep>,
    /// Arg-max candidate that failed its threshold, if the cascade stopped early
    pub rejected: Option<PathStep>,
    pub status: ClassificationStatus,
}

impl ClassificationResult {
    /// Deepest accepted step
    pub fn deepest(&self) -> Option<&PathStep> {
        self.path.last()
    }

    /// Slash-joined labels of the accepted path (e.g. `Music/Rock`)
    pub fn label_path(&self) -> Option<String> {
        if self.path.is_empty() {
            return None;
        }
        Some(
            self.path
                .iter()
                .map(|s| s.label.as_str())
                .collect::<Vec<_>>()
                .join("/"),
        )
    }

    pub fn is_classified(&self) -> bool {
        self.status != ClassificationStatus::Unclassified
    }
}
