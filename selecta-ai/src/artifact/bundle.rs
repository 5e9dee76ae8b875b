//! Validated, immutable model artifact bundle

use crate::artifact::descriptor::{
    BundleDescriptor, NodeDescriptor, StageBlob, StageRecord, STRATEGY_CASCADE,
};
use crate::artifact::stage::BoundStage;
use crate::error::{ClassifyError, Result};
use crate::features::schema::FeatureSchema;
use crate::hierarchy::{Hierarchy, HierarchyResolver};
use crate::types::NodeId;
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Schema, label tree and stages of one trained model build
///
/// Shared read-only behind an `Arc`; a reload replaces the whole bundle.
#[derive(Debug, Clone)]
pub struct ModelArtifactBundle {
    format_version: String,
    build_timestamp: String,
    schema: FeatureSchema,
    hierarchy: Hierarchy,
    stages: BTreeMap<String, BoundStage>,
    blob_file: String,
    blob_sha256: String,
}

impl ModelArtifactBundle {
    /// Assemble a bundle from a parsed descriptor and stage blob, then validate it
    ///
    /// # Errors
    /// `ArtifactConsistency` if the parts do not form a usable cascade.
    pub fn from_parts(descriptor: BundleDescriptor, blob: StageBlob) -> Result<Self> {
        descriptor.schema.check()?;

        if descriptor.feature_length != descriptor.schema.feature_len() {
            return Err(ClassifyError::ArtifactConsistency(format!(
                "descriptor feature_length {} differs from schema length {}",
                descriptor.feature_length,
                descriptor.schema.feature_len()
            )));
        }

        let hierarchy = Hierarchy::build(&descriptor.nodes)?;

        let mut stages = BTreeMap::new();
        for record in blob.stages {
            let stage = BoundStage::new(record.id, record.classes, record.model);
            if let Some(dup) = stages.insert(stage.id.clone(), stage) {
                return Err(ClassifyError::ArtifactConsistency(format!(
                    "duplicate stage id '{}'",
                    dup.id
                )));
            }
        }

        let bundle = Self {
            format_version: descriptor.format_version,
            build_timestamp: descriptor.build_timestamp,
            schema: descriptor.schema,
            hierarchy,
            stages,
            blob_file: descriptor.blob_file,
            blob_sha256: descriptor.blob_sha256,
        };
        bundle.validate()?;
        Ok(bundle)
    }

    /// Cross-check schema, tree and stages
    ///
    /// # Errors
    /// `ArtifactConsistency` naming the first defect found.
    pub fn validate(&self) -> Result<()> {
        let fail = |msg: String| Err(ClassifyError::ArtifactConsistency(msg));
        let feature_len = self.schema.feature_len();

        let mut bindings: HashMap<&str, Vec<NodeId>> = HashMap::new();
        for node in self.hierarchy.nodes() {
            if let Some(stage_id) = node.stage.as_deref() {
                if !self.stages.contains_key(stage_id) {
                    return fail(format!(
                        "node {} ({}) references unknown stage '{}'",
                        node.id, node.label, stage_id
                    ));
                }
                bindings.entry(stage_id).or_default().push(node.id);
            }
        }

        for (stage_id, stage) in &self.stages {
            match bindings.get(stage_id.as_str()).map(Vec::as_slice) {
                Some([_]) => {}
                None | Some([]) => return fail(format!("stage '{}' is not bound to any node", stage_id)),
                Some(nodes) => {
                    return fail(format!(
                        "stage '{}' is bound to {} nodes: {:?}",
                        stage_id,
                        nodes.len(),
                        nodes
                    ))
                }
            }

            stage.model.check()?;

            if stage.model.input_len() != feature_len {
                return fail(format!(
                    "stage '{}' expects {} features, schema produces {}",
                    stage_id,
                    stage.model.input_len(),
                    feature_len
                ));
            }
            if stage.model.output_len() != stage.classes.len() {
                return fail(format!(
                    "stage '{}' outputs {} classes but lists {}",
                    stage_id,
                    stage.model.output_len(),
                    stage.classes.len()
                ));
            }
        }

        let root = self.hierarchy.root();
        for node in self.hierarchy.nodes() {
            if node.is_leaf() {
                continue;
            }
            match node.stage.as_deref().and_then(|id| self.stages.get(id)) {
                Some(stage) => {
                    let classes: BTreeSet<NodeId> = stage.classes.iter().copied().collect();
                    let children: BTreeSet<NodeId> = node.children.iter().copied().collect();
                    if classes.len() != stage.classes.len() || classes != children {
                        return fail(format!(
                            "stage '{}' classes {:?} do not match children {:?} of node {}",
                            stage.id, stage.classes, node.children, node.id
                        ));
                    }
                }
                None if node.id == root && node.children.len() == 1 => {}
                None => {
                    return fail(format!(
                        "node {} ({}) has {} children but no stage",
                        node.id,
                        node.label,
                        node.children.len()
                    ))
                }
            }
        }

        Ok(())
    }

    /// Build tag (`YYYYMMDD_HHMMSS`)
    pub fn version(&self) -> &str {
        &self.build_timestamp
    }

    pub fn format_version(&self) -> &str {
        &self.format_version
    }

    pub fn schema(&self) -> &FeatureSchema {
        &self.schema
    }

    pub fn hierarchy(&self) -> &Hierarchy {
        &self.hierarchy
    }

    pub fn resolver(&self) -> HierarchyResolver<'_> {
        HierarchyResolver::new(&self.hierarchy)
    }

    pub fn stage(&self, id: &str) -> Option<&BoundStage> {
        self.stages.get(id)
    }

    /// Stage bound to `node`, if any
    pub fn stage_for(&self, node: NodeId) -> Option<&BoundStage> {
        self.resolver().stage_for(node).and_then(|id| self.stages.get(id))
    }

    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    /// Re-derive the on-disk descriptor (nodes in ascending id order)
    pub fn descriptor(&self) -> BundleDescriptor {
        let nodes = self
            .hierarchy
            .nodes()
            .map(|n| NodeDescriptor {
                id: n.id,
                label: n.label.clone(),
                parent: n.parent,
                stage: n.stage.clone(),
                threshold: n.threshold,
            })
            .collect();

        BundleDescriptor {
            format_version: self.format_version.clone(),
            strategy: STRATEGY_CASCADE.to_string(),
            build_timestamp: self.build_timestamp.clone(),
            feature_length: self.schema.feature_len(),
            schema: self.schema.clone(),
            nodes,
            blob_file: self.blob_file.clone(),
            blob_sha256: self.blob_sha256.clone(),
        }
    }

    /// Re-derive the stage blob (stages in ascending id order)
    pub fn stage_blob(&self) -> StageBlob {
        StageBlob {
            stages: self
                .stages
                .values()
                .map(|s| StageRecord {
                    id: s.id.clone(),
                    classes: s.classes.clone(),
                    model: s.record.clone(),
                })
                .collect(),
        }
    }
}
