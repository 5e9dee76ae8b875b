//! Label hierarchy
//!
//! Arena of nodes keyed by `NodeId`, built once when a bundle is loaded and
//! never mutated afterwards. `Hierarchy::build` rejects anything that is not
//! a single-rooted tree.

use crate::artifact::descriptor::NodeDescriptor;
use crate::error::{ClassifyError, Result};
use crate::types::NodeId;
use std::collections::{BTreeMap, HashSet};

/// One label in the tree
#[derive(Debug, Clone, PartialEq)]
pub struct HierarchyNode {
    pub id: NodeId,
    pub label: String,
    pub parent: Option<NodeId>,
    /// Sorted ascending by id
    pub children: Vec<NodeId>,
    /// Stage that chooses among `children`
    pub stage: Option<String>,
    /// Minimum confidence for accepting a child of this node
    pub threshold: f64,
}

impl HierarchyNode {
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }
}

/// Validated label tree
#[derive(Debug, Clone, PartialEq)]
pub struct Hierarchy {
    nodes: BTreeMap<NodeId, HierarchyNode>,
    root: NodeId,
}

impl Hierarchy {
    /// Build and validate the tree from descriptor nodes
    ///
    /// # Errors
    /// `ArtifactConsistency` on duplicate ids, thresholds outside [0, 1],
    /// zero or several roots, unknown parents or cycles. A lone root is a
    /// valid (leaf) tree.
    pub fn build(descriptors: &[NodeDescriptor]) -> Result<Self> {
        let fail = |msg: String| Err(ClassifyError::ArtifactConsistency(msg));

        let mut nodes = BTreeMap::new();
        for d in descriptors {
            if !d.threshold.is_finite() || !(0.0..=1.0).contains(&d.threshold) {
                return fail(format!(
                    "node {} ({}) threshold {} outside [0, 1]",
                    d.id, d.label, d.threshold
                ));
            }
            if d.parent == Some(d.id) {
                return fail(format!("node {} is its own parent", d.id));
            }
            let node = HierarchyNode {
                id: d.id,
                label: d.label.clone(),
                parent: d.parent,
                children: Vec::new(),
                stage: d.stage.clone(),
                threshold: d.threshold,
            };
            if nodes.insert(d.id, node).is_some() {
                return fail(format!("duplicate node id {}", d.id));
            }
        }

        let roots: Vec<NodeId> = nodes
            .values()
            .filter(|n| n.parent.is_none())
            .map(|n| n.id)
            .collect();
        let root = match roots.as_slice() {
            [root] => *root,
            [] => return fail("hierarchy has no root".to_string()),
            many => {
                return fail(format!(
                    "hierarchy has {} roots: {:?}",
                    many.len(),
                    many
                ))
            }
        };

        // BTreeMap iteration is ascending, so children end up sorted
        let edges: Vec<(NodeId, NodeId)> = nodes
            .values()
            .filter_map(|n| n.parent.map(|p| (p, n.id)))
            .collect();
        for (parent, child) in edges {
            match nodes.get_mut(&parent) {
                Some(p) => p.children.push(child),
                None => {
                    return fail(format!(
                        "node {} references unknown parent {}",
                        child, parent
                    ))
                }
            }
        }

        // Every node must reach the root; anything else sits on a cycle
        let mut reachable = HashSet::new();
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            if !reachable.insert(id) {
                continue;
            }
            if let Some(node) = nodes.get(&id) {
                stack.extend(node.children.iter().copied());
            }
        }
        if reachable.len() != nodes.len() {
            let orphaned: Vec<NodeId> = nodes
                .keys()
                .filter(|id| !reachable.contains(id))
                .copied()
                .collect();
            return fail(format!("nodes not reachable from root (cycle): {:?}", orphaned));
        }

        Ok(Self { nodes, root })
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn node(&self, id: NodeId) -> Option<&HierarchyNode> {
        self.nodes.get(&id)
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).and_then(|n| n.parent)
    }

    /// Children sorted ascending (empty for leaves and unknown ids)
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.node(id).map(|n| n.children.as_slice()).unwrap_or(&[])
    }

    /// Distance from the root (root = 0)
    pub fn depth(&self, id: NodeId) -> Option<usize> {
        self.node(id)?;
        Some(self.ancestors(id).len())
    }

    /// Ancestors from the parent up to the root
    pub fn ancestors(&self, id: NodeId) -> Vec<NodeId> {
        let mut chain = Vec::new();
        let mut current = self.parent(id);
        while let Some(p) = current {
            chain.push(p);
            current = self.parent(p);
        }
        chain
    }

    /// Labels from the first level below the root down to `id`, slash-joined
    pub fn label_path(&self, id: NodeId) -> Option<String> {
        let node = self.node(id)?;
        let mut labels: Vec<&str> = self
            .ancestors(id)
            .iter()
            .rev()
            .skip(1)
            .filter_map(|a| self.node(*a).map(|n| n.label.as_str()))
            .collect();
        if node.parent.is_some() {
            labels.push(node.label.as_str());
        }
        Some(labels.join("/"))
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Nodes in ascending id order
    pub fn nodes(&self) -> impl Iterator<Item = &HierarchyNode> {
        self.nodes.values()
    }
}

/// Read-only lookups over a bundle's hierarchy
#[derive(Debug, Clone, Copy)]
pub struct HierarchyResolver<'a> {
    hierarchy: &'a Hierarchy,
}

impl<'a> HierarchyResolver<'a> {
    pub fn new(hierarchy: &'a Hierarchy) -> Self {
        Self { hierarchy }
    }

    pub fn root(&self) -> NodeId {
        self.hierarchy.root()
    }

    pub fn node(&self, id: NodeId) -> Option<&'a HierarchyNode> {
        self.hierarchy.node(id)
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.hierarchy.parent(id)
    }

    pub fn children(&self, id: NodeId) -> &'a [NodeId] {
        self.hierarchy.children(id)
    }

    /// Stage id bound to `id`
    pub fn stage_for(&self, id: NodeId) -> Option<&'a str> {
        self.hierarchy.node(id).and_then(|n| n.stage.as_deref())
    }

    pub fn depth(&self, id: NodeId) -> Option<usize> {
        self.hierarchy.depth(id)
    }

    pub fn ancestors(&self, id: NodeId) -> Vec<NodeId> {
        self.hierarchy.ancestors(id)
    }

    pub fn label_path(&self, id: NodeId) -> Option<String> {
        self.hierarchy.label_path(id)
    }
}
