//! Per-node acceptance decision

use crate::hierarchy::HierarchyNode;
use crate::types::NodeId;

/// Outcome of a threshold check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Descend into the predicted child
    Accept(NodeId),
    /// Stop at the current node
    Reject,
}

/// Accepts a predicted child iff its confidence reaches the parent's threshold
///
/// Thresholds are per node; there is no global cutoff. NaN never passes.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThresholdPolicy;

impl ThresholdPolicy {
    pub fn new() -> Self {
        Self
    }

    pub fn decide(&self, node: &HierarchyNode, predicted_child: NodeId, confidence: f64) -> Decision {
        if confidence >= node.threshold {
            Decision::Accept(predicted_child)
        } else {
            Decision::Reject
        }
    }
}
