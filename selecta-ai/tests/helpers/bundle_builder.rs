//! Bundle Builders
//!
//! Small hand-built bundles with known stage outputs. The genre tree used
//! throughout the tests:
//!
//! ```text
//! root(0) [stage genre]
//! ├── Music(1) [stage music]
//! │   ├── Rock(3)
//! │   └── Jazz(4)
//! └── Speech(2)
//! ```

use selecta_ai::artifact::descriptor::{BundleDescriptor, NodeDescriptor, StageBlob, StageRecord};
use selecta_ai::artifact::stage::{DecisionTree, RandomForest, StageModel, StandardScaler, TreeNode};
use selecta_ai::features::{FeatureBlock, FeatureSchema};
use selecta_ai::{ModelArtifactBundle, NodeId};

pub const BUILD_A: &str = "20250617_155623";
pub const BUILD_B: &str = "20250618_090000";

/// 40-value schema: 10 MFCCs x (mean, std, max, min)
pub fn schema_40() -> FeatureSchema {
    FeatureSchema::with_blocks(vec![FeatureBlock::Mfcc { coefficients: 10 }])
}

/// Stage that ignores its input and outputs `counts` normalized
///
/// Exact ratios such as 4:1 (0.8) or 3:2 (0.6) survive normalization bit-exactly.
pub fn counts_stage(input_len: usize, counts: &[f64]) -> StageModel {
    StageModel::RandomForest(RandomForest {
        scaler: StandardScaler::identity(input_len),
        n_classes: counts.len(),
        trees: vec![DecisionTree {
            nodes: vec![TreeNode::Leaf {
                value: counts.to_vec(),
            }],
        }],
    })
}

/// Stage that outputs `left` when `x[feature] <= threshold`, else `right`
pub fn split_stage(
    input_len: usize,
    feature: usize,
    threshold: f64,
    left: &[f64],
    right: &[f64],
) -> StageModel {
    StageModel::RandomForest(RandomForest {
        scaler: StandardScaler::identity(input_len),
        n_classes: left.len(),
        trees: vec![DecisionTree {
            nodes: vec![
                TreeNode::Split {
                    feature,
                    threshold,
                    left: 1,
                    right: 2,
                },
                TreeNode::Leaf {
                    value: left.to_vec(),
                },
                TreeNode::Leaf {
                    value: right.to_vec(),
                },
            ],
        }],
    })
}

pub fn node(
    id: u32,
    label: &str,
    parent: Option<u32>,
    stage: Option<&str>,
    threshold: f64,
) -> NodeDescriptor {
    NodeDescriptor {
        id: NodeId(id),
        label: label.to_string(),
        parent: parent.map(NodeId),
        stage: stage.map(str::to_string),
        threshold,
    }
}

/// Stage outputs (as counts) and thresholds for the genre tree
#[derive(Debug, Clone)]
pub struct GenreDistributions {
    /// [Music, Speech]
    pub genre: [f64; 2],
    /// [Rock, Jazz]
    pub music: [f64; 2],
    pub root_threshold: f64,
    pub music_threshold: f64,
}

impl Default for GenreDistributions {
    /// Music 0.8, Rock 0.55, thresholds root 0.5 / Music 0.6
    fn default() -> Self {
        Self {
            genre: [4.0, 1.0],
            music: [11.0, 9.0],
            root_threshold: 0.5,
            music_threshold: 0.6,
        }
    }
}

/// Descriptor and blob for the genre tree with constant stages
pub fn genre_parts(build: &str, dist: &GenreDistributions) -> (BundleDescriptor, StageBlob) {
    let schema = schema_40();
    let len = schema.feature_len();

    let descriptor = BundleDescriptor {
        build_timestamp: build.to_string(),
        feature_length: len,
        schema,
        nodes: vec![
            node(0, "root", None, Some("genre"), dist.root_threshold),
            node(1, "Music", Some(0), Some("music"), dist.music_threshold),
            node(2, "Speech", Some(0), None, 0.0),
            node(3, "Rock", Some(1), None, 0.0),
            node(4, "Jazz", Some(1), None, 0.0),
        ],
        ..BundleDescriptor::default()
    };

    let blob = StageBlob {
        stages: vec![
            StageRecord {
                id: "genre".to_string(),
                classes: vec![NodeId(1), NodeId(2)],
                model: counts_stage(len, &dist.genre),
            },
            StageRecord {
                id: "music".to_string(),
                classes: vec![NodeId(3), NodeId(4)],
                model: counts_stage(len, &dist.music),
            },
        ],
    };

    (descriptor, blob)
}

pub fn genre_bundle(build: &str, dist: &GenreDistributions) -> ModelArtifactBundle {
    let (descriptor, blob) = genre_parts(build, dist);
    ModelArtifactBundle::from_parts(descriptor, blob).unwrap()
}
