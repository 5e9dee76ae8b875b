//! selecta-ai: hierarchical audio classification
//!
//! Audio buffer → feature vector → cascade of per-node ensemble stages →
//! `ClassificationResult`. Trained models arrive as versioned artifact
//! bundles; this crate only consumes them.
//!
//! Entry points:
//! - [`InferenceEngine::classify`] for a single buffer
//! - [`BatchClassifier::classify_all`] for bounded concurrent batches
//! - [`ModelArtifactStore`] for loading and hot-reloading bundles

pub mod artifact;
pub mod batch;
pub mod decode;
pub mod engine;
pub mod error;
pub mod features;
pub mod hierarchy;
pub mod threshold;
pub mod types;

pub use crate::artifact::{ModelArtifactBundle, ModelArtifactStore};
pub use crate::batch::{AudioAsset, BatchClassifier, BatchItem, BatchReport};
pub use crate::engine::InferenceEngine;
pub use crate::error::{ClassifyError, Result};
pub use crate::features::{FeatureExtractor, FeatureSchema};
pub use crate::hierarchy::{Hierarchy, HierarchyNode, HierarchyResolver};
pub use crate::threshold::{Decision, ThresholdPolicy};
pub use crate::types::{
    AudioSample, ClassificationResult, ClassificationStatus, FeatureVector, LabelProbability,
    NodeId, PathStep,
};
