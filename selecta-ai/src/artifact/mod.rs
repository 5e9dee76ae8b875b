//! Versioned model artifact bundles

pub mod bundle;
pub mod descriptor;
pub mod stage;
pub mod store;

pub use bundle::ModelArtifactBundle;
pub use descriptor::{BundleDescriptor, NodeDescriptor, StageBlob, StageRecord};
pub use stage::{BoundStage, ClassifierStage, StageModel};
pub use store::{discover_latest, write_bundle, ModelArtifactStore};
