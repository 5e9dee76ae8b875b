//! Trained stage models
//!
//! Each stage maps a feature vector to a probability distribution over its
//! node's children. Concrete ensemble types are chosen once, when the blob
//! is decoded; inference only sees `dyn ClassifierStage`.

use crate::error::{ClassifyError, Result};
use crate::types::NodeId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Trained classifier bound to one hierarchy node
pub trait ClassifierStage: Send + Sync + fmt::Debug {
    /// Model family name (for logs)
    fn kind(&self) -> &'static str;

    /// Expected feature vector length
    fn input_len(&self) -> usize;

    /// Number of classes in the output distribution
    fn output_len(&self) -> usize;

    /// Class probabilities for one feature vector
    fn predict(&self, features: &[f64]) -> Result<Vec<f64>>;

    /// Structural validation of the trained parameters
    fn check(&self) -> Result<()>;
}

fn consistency(msg: String) -> ClassifyError {
    ClassifyError::ArtifactConsistency(msg)
}

// ============================================================================
// Standard Scaler
// ============================================================================

/// Per-feature standardization: `(x - mean) / scale`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    pub mean: Vec<f64>,
    pub scale: Vec<f64>,
}

impl StandardScaler {
    pub fn identity(len: usize) -> Self {
        Self {
            mean: vec![0.0; len],
            scale: vec![1.0; len],
        }
    }

    pub fn len(&self) -> usize {
        self.mean.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mean.is_empty()
    }

    fn check(&self) -> Result<()> {
        if self.mean.len() != self.scale.len() {
            return Err(consistency(format!(
                "scaler mean has {} values but scale has {}",
                self.mean.len(),
                self.scale.len()
            )));
        }
        if self.mean.iter().any(|m| !m.is_finite()) {
            return Err(consistency("scaler mean is not finite".to_string()));
        }
        if self.scale.iter().any(|s| !s.is_finite() || *s == 0.0) {
            return Err(consistency(
                "scaler scale must be finite and non-zero".to_string(),
            ));
        }
        Ok(())
    }

    fn transform(&self, features: &[f64]) -> Vec<f64> {
        features
            .iter()
            .zip(self.mean.iter().zip(&self.scale))
            .map(|(x, (m, s))| (x - m) / s)
            .collect()
    }
}

// ============================================================================
// Decision Tree
// ============================================================================

/// Flattened tree node; index 0 is the root
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TreeNode {
    /// Go left iff `x[feature] <= threshold`
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf { value: Vec<f64> },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionTree {
    pub nodes: Vec<TreeNode>,
}

impl DecisionTree {
    /// Children always point forward, so traversal terminates
    fn check(&self, input_len: usize, leaf_len: usize) -> Result<()> {
        if self.nodes.is_empty() {
            return Err(consistency("decision tree has no nodes".to_string()));
        }
        for (i, node) in self.nodes.iter().enumerate() {
            match node {
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    if *feature >= input_len {
                        return Err(consistency(format!(
                            "tree node {} splits on feature {} of {}",
                            i, feature, input_len
                        )));
                    }
                    if threshold.is_nan() {
                        return Err(consistency(format!("tree node {} threshold is NaN", i)));
                    }
                    for child in [left, right] {
                        if *child <= i || *child >= self.nodes.len() {
                            return Err(consistency(format!(
                                "tree node {} has invalid child index {}",
                                i, child
                            )));
                        }
                    }
                }
                TreeNode::Leaf { value } => {
                    if value.len() != leaf_len {
                        return Err(consistency(format!(
                            "tree leaf {} has {} values, expected {}",
                            i,
                            value.len(),
                            leaf_len
                        )));
                    }
                    if value.iter().any(|v| !v.is_finite()) {
                        return Err(consistency(format!("tree leaf {} is not finite", i)));
                    }
                }
            }
        }
        Ok(())
    }

    /// Leaf reached by `features` (tree must have passed `check`)
    fn leaf(&self, features: &[f64]) -> Result<&[f64]> {
        let mut index = 0;
        // Forward-only children bound the walk by the node count
        for _ in 0..self.nodes.len() {
            match self.nodes.get(index) {
                Some(TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                }) => {
                    let x = features.get(*feature).copied().unwrap_or(f64::NAN);
                    index = if x <= *threshold { *left } else { *right };
                }
                Some(TreeNode::Leaf { value }) => return Ok(value.as_slice()),
                None => break,
            }
        }
        Err(consistency("decision tree walk did not reach a leaf".to_string()))
    }
}

// ============================================================================
// Ensembles
// ============================================================================

/// Averaged class-frequency trees
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomForest {
    pub scaler: StandardScaler,
    pub n_classes: usize,
    pub trees: Vec<DecisionTree>,
}

impl ClassifierStage for RandomForest {
    fn kind(&self) -> &'static str {
        "random_forest"
    }

    fn input_len(&self) -> usize {
        self.scaler.len()
    }

    fn output_len(&self) -> usize {
        self.n_classes
    }

    fn check(&self) -> Result<()> {
        self.scaler.check()?;
        if self.n_classes == 0 {
            return Err(consistency("random forest has no classes".to_string()));
        }
        if self.trees.is_empty() {
            return Err(consistency("random forest has no trees".to_string()));
        }
        for (t, tree) in self.trees.iter().enumerate() {
            tree.check(self.input_len(), self.n_classes)?;
            // Leaves hold class counts
            for (i, node) in tree.nodes.iter().enumerate() {
                if let TreeNode::Leaf { value } = node {
                    if value.iter().any(|v| *v < 0.0) {
                        return Err(consistency(format!(
                            "forest tree {} leaf {} has a negative class count",
                            t, i
                        )));
                    }
                    if value.iter().sum::<f64>() <= 0.0 {
                        return Err(consistency(format!(
                            "forest tree {} leaf {} has no class counts",
                            t, i
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    fn predict(&self, features: &[f64]) -> Result<Vec<f64>> {
        let x = self.scaler.transform(features);
        let mut proba = vec![0.0; self.n_classes];

        for tree in &self.trees {
            let leaf = tree.leaf(&x)?;
            let total: f64 = leaf.iter().sum();
            if total > 0.0 {
                for (p, v) in proba.iter_mut().zip(leaf) {
                    *p += v / total;
                }
            }
        }

        let n = self.trees.len() as f64;
        for p in proba.iter_mut() {
            *p /= n;
        }
        Ok(proba)
    }
}

/// Additive regression trees with a softmax (or sigmoid for two classes) link
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradientBoosting {
    pub scaler: StandardScaler,
    pub n_classes: usize,
    /// Initial raw score per output column
    pub init: Vec<f64>,
    pub learning_rate: f64,
    /// One tree per output column per round; leaves hold a single value
    pub rounds: Vec<Vec<DecisionTree>>,
}

impl GradientBoosting {
    /// Raw score columns: 1 for binary, `n_classes` otherwise
    fn columns(&self) -> usize {
        if self.n_classes == 2 {
            1
        } else {
            self.n_classes
        }
    }
}

impl ClassifierStage for GradientBoosting {
    fn kind(&self) -> &'static str {
        "gradient_boosting"
    }

    fn input_len(&self) -> usize {
        self.scaler.len()
    }

    fn output_len(&self) -> usize {
        self.n_classes
    }

    fn check(&self) -> Result<()> {
        self.scaler.check()?;
        if self.n_classes < 2 {
            return Err(consistency(format!(
                "gradient boosting needs at least 2 classes, got {}",
                self.n_classes
            )));
        }
        if !self.learning_rate.is_finite() || self.learning_rate <= 0.0 {
            return Err(consistency(format!(
                "gradient boosting learning rate {} is invalid",
                self.learning_rate
            )));
        }
        if self.init.len() != self.columns() || self.init.iter().any(|v| !v.is_finite()) {
            return Err(consistency(format!(
                "gradient boosting init must have {} finite values",
                self.columns()
            )));
        }
        for (r, round) in self.rounds.iter().enumerate() {
            if round.len() != self.columns() {
                return Err(consistency(format!(
                    "boosting round {} has {} trees, expected {}",
                    r,
                    round.len(),
                    self.columns()
                )));
            }
            for tree in round {
                tree.check(self.input_len(), 1)?;
            }
        }
        Ok(())
    }

    fn predict(&self, features: &[f64]) -> Result<Vec<f64>> {
        let x = self.scaler.transform(features);
        let mut raw = self.init.clone();

        for round in &self.rounds {
            for (score, tree) in raw.iter_mut().zip(round) {
                let leaf = tree.leaf(&x)?;
                *score += self.learning_rate * leaf.first().copied().unwrap_or(0.0);
            }
        }

        if self.n_classes == 2 {
            let p = 1.0 / (1.0 + (-raw[0]).exp());
            return Ok(vec![1.0 - p, p]);
        }

        let max = raw.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        let exp: Vec<f64> = raw.iter().map(|r| (r - max).exp()).collect();
        let sum: f64 = exp.iter().sum();
        Ok(exp.into_iter().map(|e| e / sum).collect())
    }
}

// ============================================================================
// Serialized Form
// ============================================================================

/// Concrete model as stored in the stage blob
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StageModel {
    RandomForest(RandomForest),
    GradientBoosting(GradientBoosting),
}

impl StageModel {
    pub fn into_stage(self) -> Arc<dyn ClassifierStage> {
        match self {
            StageModel::RandomForest(m) => Arc::new(m),
            StageModel::GradientBoosting(m) => Arc::new(m),
        }
    }
}

/// Stage with its class order, ready for inference
#[derive(Debug, Clone)]
pub struct BoundStage {
    pub id: String,
    /// Output position i is the probability of `classes[i]`
    pub classes: Vec<NodeId>,
    pub model: Arc<dyn ClassifierStage>,
    /// Serialized form, kept so a loaded bundle can be written back out
    pub record: StageModel,
}

impl BoundStage {
    pub fn new(id: String, classes: Vec<NodeId>, record: StageModel) -> Self {
        let model = record.clone().into_stage();
        Self {
            id,
            classes,
            model,
            record,
        }
    }

    /// Run the model and check the output shape
    ///
    /// # Errors
    /// `ArtifactConsistency` if the distribution length differs from the
    /// class count or a value is not a probability in [0, 1].
    pub fn distribution(&self, features: &[f64]) -> Result<Vec<f64>> {
        let proba = self.model.predict(features)?;
        if proba.len() != self.classes.len() {
            return Err(consistency(format!(
                "stage '{}' produced {} probabilities for {} classes",
                self.id,
                proba.len(),
                self.classes.len()
            )));
        }
        if let Some(p) = proba.iter().find(|p| !(0.0..=1.0).contains(*p)) {
            return Err(consistency(format!(
                "stage '{}' produced probability {} outside [0, 1]",
                self.id, p
            )));
        }
        Ok(proba)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Two-feature stump: x[0] <= 0 -> class 0, else class 1
    fn stump(left: Vec<f64>, right: Vec<f64>) -> DecisionTree {
        DecisionTree {
            nodes: vec![
                TreeNode::Split {
                    feature: 0,
                    threshold: 0.0,
                    left: 1,
                    right: 2,
                },
                TreeNode::Leaf { value: left },
                TreeNode::Leaf { value: right },
            ],
        }
    }

    #[test]
    fn test_random_forest_averages_normalized_leaves() {
        let forest = RandomForest {
            scaler: StandardScaler::identity(2),
            n_classes: 2,
            trees: vec![stump(vec![8.0, 2.0], vec![0.0, 5.0]), stump(vec![1.0, 1.0], vec![1.0, 3.0])],
        };
        forest.check().unwrap();

        let left = forest.predict(&[-1.0, 0.0]).unwrap();
        assert!((left[0] - 0.65).abs() < 1e-12);
        assert!((left[1] - 0.35).abs() < 1e-12);

        let right = forest.predict(&[1.0, 0.0]).unwrap();
        assert!((right[0] - 0.125).abs() < 1e-12);
        assert!((right[1] - 0.875).abs() < 1e-12);
    }

    #[test]
    fn test_scaler_applies_before_split() {
        // mean 10 shifts the split point from 0 to 10
        let forest = RandomForest {
            scaler: StandardScaler {
                mean: vec![10.0, 0.0],
                scale: vec![2.0, 1.0],
            },
            n_classes: 2,
            trees: vec![stump(vec![1.0, 0.0], vec![0.0, 1.0])],
        };
        assert_eq!(forest.predict(&[9.0, 0.0]).unwrap(), vec![1.0, 0.0]);
        assert_eq!(forest.predict(&[11.0, 0.0]).unwrap(), vec![0.0, 1.0]);
    }

    #[test]
    fn test_binary_boosting_is_sigmoid() {
        let model = GradientBoosting {
            scaler: StandardScaler::identity(2),
            n_classes: 2,
            init: vec![0.0],
            learning_rate: 1.0,
            rounds: vec![vec![stump(vec![-2.0], vec![2.0])]],
        };
        model.check().unwrap();
        let p = model.predict(&[1.0, 0.0]).unwrap();
        let expected = 1.0 / (1.0 + (-2.0f64).exp());
        assert!((p[1] - expected).abs() < 1e-12);
        assert!((p[0] + p[1] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_multiclass_boosting_sums_to_one() {
        let model = GradientBoosting {
            scaler: StandardScaler::identity(1),
            n_classes: 3,
            init: vec![0.1, 0.2, 0.3],
            learning_rate: 0.5,
            rounds: vec![vec![
                stump(vec![1.0], vec![0.0]),
                stump(vec![0.0], vec![1.0]),
                stump(vec![0.5], vec![0.5]),
            ]],
        };
        model.check().unwrap();
        let p = model.predict(&[-3.0]).unwrap();
        assert_eq!(p.len(), 3);
        assert!((p.iter().sum::<f64>() - 1.0).abs() < 1e-12);
        assert!(p[0] > p[1]);
    }

    #[test]
    fn test_backward_child_index_rejected() {
        let tree = DecisionTree {
            nodes: vec![
                TreeNode::Leaf { value: vec![1.0, 0.0] },
                TreeNode::Split {
                    feature: 0,
                    threshold: 0.0,
                    left: 0,
                    right: 2,
                },
                TreeNode::Leaf { value: vec![1.0, 0.0] },
            ],
        };
        let forest = RandomForest {
            scaler: StandardScaler::identity(1),
            n_classes: 2,
            trees: vec![tree],
        };
        assert!(matches!(
            forest.check(),
            Err(ClassifyError::ArtifactConsistency(_))
        ));
    }

    #[test]
    fn test_split_feature_out_of_range_rejected() {
        let forest = RandomForest {
            scaler: StandardScaler::identity(1),
            n_classes: 2,
            trees: vec![DecisionTree {
                nodes: vec![
                    TreeNode::Split {
                        feature: 5,
                        threshold: 0.0,
                        left: 1,
                        right: 2,
                    },
                    TreeNode::Leaf { value: vec![1.0, 0.0] },
                    TreeNode::Leaf { value: vec![0.0, 1.0] },
                ],
            }],
        };
        assert!(forest.check().is_err());
    }

    #[test]
    fn test_zero_scale_rejected() {
        let forest = RandomForest {
            scaler: StandardScaler {
                mean: vec![0.0],
                scale: vec![0.0],
            },
            n_classes: 1,
            trees: vec![DecisionTree {
                nodes: vec![TreeNode::Leaf { value: vec![1.0] }],
            }],
        };
        assert!(forest.check().is_err());
    }

    #[test]
    fn test_stage_model_tagged_json() {
        let model = StageModel::RandomForest(RandomForest {
            scaler: StandardScaler::identity(1),
            n_classes: 1,
            trees: vec![DecisionTree {
                nodes: vec![TreeNode::Leaf { value: vec![1.0] }],
            }],
        });
        let json = serde_json::to_value(&model).unwrap();
        assert_eq!(json["kind"], "random_forest");
        assert_eq!(json["trees"][0]["nodes"][0]["type"], "leaf");
        let back: StageModel = serde_json::from_value(json).unwrap();
        assert_eq!(back, model);
    }

    #[test]
    fn test_forest_leaf_counts_must_be_nonnegative() {
        let forest = |leaf: Vec<f64>| RandomForest {
            scaler: StandardScaler::identity(1),
            n_classes: 2,
            trees: vec![DecisionTree {
                nodes: vec![TreeNode::Leaf { value: leaf }],
            }],
        };

        for bad in [vec![-1.0, 2.0], vec![0.0, 0.0], vec![-0.5, 0.5]] {
            assert!(
                matches!(forest(bad.clone()).check(), Err(ClassifyError::ArtifactConsistency(_))),
                "accepted leaf {:?}",
                bad
            );
        }
        assert!(forest(vec![0.0, 3.0]).check().is_ok());
    }

    #[test]
    fn test_boosting_leaves_may_be_negative() {
        let model = GradientBoosting {
            scaler: StandardScaler::identity(1),
            n_classes: 2,
            init: vec![0.0],
            learning_rate: 0.1,
            rounds: vec![vec![DecisionTree {
                nodes: vec![TreeNode::Leaf { value: vec![-4.0] }],
            }]],
        };
        assert!(model.check().is_ok());
    }

    /// Stage with a fixed output, bypassing model checks
    #[derive(Debug)]
    struct FixedOutput(Vec<f64>);

    impl ClassifierStage for FixedOutput {
        fn kind(&self) -> &'static str {
            "fixed"
        }
        fn input_len(&self) -> usize {
            1
        }
        fn output_len(&self) -> usize {
            self.0.len()
        }
        fn check(&self) -> Result<()> {
            Ok(())
        }
        fn predict(&self, _features: &[f64]) -> Result<Vec<f64>> {
            Ok(self.0.clone())
        }
    }

    #[test]
    fn test_distribution_rejects_values_outside_unit_range() {
        let record = StageModel::RandomForest(RandomForest {
            scaler: StandardScaler::identity(1),
            n_classes: 2,
            trees: vec![stump(vec![1.0, 0.0], vec![0.0, 1.0])],
        });
        let bound = |output: Vec<f64>| BoundStage {
            id: "genre".to_string(),
            classes: vec![NodeId(1), NodeId(2)],
            model: Arc::new(FixedOutput(output)),
            record: record.clone(),
        };

        for bad in [vec![-1.0, 2.0], vec![0.5, f64::NAN], vec![1.5, 0.0]] {
            assert!(matches!(
                bound(bad).distribution(&[0.0]),
                Err(ClassifyError::ArtifactConsistency(_))
            ));
        }
        assert_eq!(bound(vec![0.0, 1.0]).distribution(&[0.0]).unwrap(), vec![0.0, 1.0]);
    }

    #[test]
    fn test_distribution_length_checked() {
        let stage = BoundStage::new(
            "music".to_string(),
            vec![NodeId(3), NodeId(4), NodeId(5)],
            StageModel::RandomForest(RandomForest {
                scaler: StandardScaler::identity(1),
                n_classes: 2,
                trees: vec![stump(vec![1.0, 0.0], vec![0.0, 1.0])],
            }),
        );
        assert!(matches!(
            stage.distribution(&[0.0]),
            Err(ClassifyError::ArtifactConsistency(_))
        ));
    }
}
