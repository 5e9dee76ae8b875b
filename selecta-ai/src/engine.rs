//! Cascaded hierarchical inference
//!
//! Starting at the root, each node's stage picks its most probable child
//! (ties go to the lower `NodeId`) and the node's threshold decides whether
//! the cascade descends. The walk is iterative and bounded by the node count.

use crate::artifact::bundle::ModelArtifactBundle;
use crate::artifact::store::ModelArtifactStore;
use crate::error::{ClassifyError, Result};
use crate::features::FeatureExtractor;
use crate::threshold::{Decision, ThresholdPolicy};
use crate::types::{
    AudioSample, ClassificationResult, ClassificationStatus, FeatureVector, LabelProbability,
    NodeId, PathStep,
};
use std::sync::Arc;
use tracing::debug;

/// Runs feature extraction and the cascade against the store's current bundle
#[derive(Debug)]
pub struct InferenceEngine {
    store: Arc<ModelArtifactStore>,
    extractor: FeatureExtractor,
    policy: ThresholdPolicy,
}

impl InferenceEngine {
    pub fn new(store: Arc<ModelArtifactStore>) -> Self {
        Self {
            store,
            extractor: FeatureExtractor::new(),
            policy: ThresholdPolicy::new(),
        }
    }

    pub fn store(&self) -> &Arc<ModelArtifactStore> {
        &self.store
    }

    /// Classify one audio buffer
    ///
    /// The bundle is captured once; a concurrent reload does not affect
    /// this call.
    ///
    /// # Errors
    /// - `UnsupportedAudio` from feature extraction
    /// - `ArtifactConsistency` if a stage misbehaves at runtime
    pub fn classify(&self, audio: &AudioSample) -> Result<ClassificationResult> {
        let bundle = self.store.current();
        let features = self.extractor.extract(audio, bundle.schema())?;
        self.classify_features(&bundle, &features)
    }

    /// Run the cascade on a pre-extracted feature vector
    pub fn classify_features(
        &self,
        bundle: &ModelArtifactBundle,
        features: &FeatureVector,
    ) -> Result<ClassificationResult> {
        let expected = bundle.schema().feature_len();
        if features.len() != expected {
            return Err(ClassifyError::ArtifactConsistency(format!(
                "feature vector has {} values, bundle {} expects {}",
                features.len(),
                bundle.version(),
                expected
            )));
        }

        let resolver = bundle.resolver();
        let root = resolver.root();
        let mut path: Vec<PathStep> = Vec::new();
        let mut rejected = None;
        let mut current = root;
        let mut reached_leaf = false;

        for _ in 0..bundle.hierarchy().len() {
            let node = resolver.node(current).ok_or_else(|| {
                ClassifyError::ArtifactConsistency(format!("cascade reached unknown node {}", current))
            })?;
            let children = resolver.children(current);

            if children.is_empty() {
                reached_leaf = true;
                break;
            }

            let step = match bundle.stage_for(current) {
                Some(stage) => {
                    let distribution = stage.distribution(features.as_slice())?;
                    let (best, confidence) = arg_max(&stage.classes, &distribution).ok_or_else(|| {
                        ClassifyError::ArtifactConsistency(format!(
                            "stage '{}' has no classes",
                            stage.id
                        ))
                    })?;

                    let probabilities = stage
                        .classes
                        .iter()
                        .zip(&distribution)
                        .map(|(id, p)| LabelProbability {
                            node: *id,
                            label: label_of(bundle, *id),
                            probability: *p,
                        })
                        .collect();

                    let accepted = matches!(
                        self.policy.decide(node, best, confidence),
                        Decision::Accept(_)
                    );

                    debug!(
                        bundle = %bundle.version(),
                        node = %current,
                        stage = %stage.id,
                        model = stage.model.kind(),
                        chosen = %best,
                        confidence,
                        accepted,
                        "Cascade step"
                    );

                    PathStep {
                        node: best,
                        label: label_of(bundle, best),
                        confidence,
                        accepted,
                        probabilities,
                    }
                }
                // Pass-through root (validated at load time)
                None if current == root && children.len() == 1 => PathStep {
                    node: children[0],
                    label: label_of(bundle, children[0]),
                    confidence: 1.0,
                    accepted: true,
                    probabilities: Vec::new(),
                },
                None => {
                    return Err(ClassifyError::ArtifactConsistency(format!(
                        "node {} has children but no stage",
                        current
                    )))
                }
            };

            if !step.accepted {
                rejected = Some(step);
                break;
            }

            current = step.node;
            path.push(step);
        }

        if !reached_leaf && rejected.is_none() {
            // A leaf is always reached within node-count steps of a valid tree
            reached_leaf = resolver.children(current).is_empty();
            if !reached_leaf {
                return Err(ClassifyError::ArtifactConsistency(format!(
                    "cascade did not terminate within {} steps",
                    bundle.hierarchy().len()
                )));
            }
        }

        let status = if reached_leaf {
            ClassificationStatus::FullyClassified
        } else if path.is_empty() {
            ClassificationStatus::Unclassified
        } else {
            ClassificationStatus::PartiallyClassified
        };

        Ok(ClassificationResult {
            bundle_version: bundle.version().to_string(),
            root,
            path,
            rejected,
            status,
        })
    }
}

/// Most probable class; ties resolve to the lower `NodeId`
fn arg_max(classes: &[NodeId], distribution: &[f64]) -> Option<(NodeId, f64)> {
    classes
        .iter()
        .copied()
        .zip(distribution.iter().copied())
        .fold(None, |best, (id, p)| match best {
            Some((best_id, best_p)) if best_p > p || (best_p == p && best_id < id) => {
                Some((best_id, best_p))
            }
            _ => Some((id, p)),
        })
}

fn label_of(bundle: &ModelArtifactBundle, id: NodeId) -> String {
    bundle
        .resolver()
        .node(id)
        .map(|n| n.label.clone())
        .unwrap_or_default()
}
