//! Audio feature extraction

pub mod extractor;
pub mod preprocess;
pub mod schema;
pub mod spectral;
pub mod tempo;

pub use extractor::FeatureExtractor;
pub use schema::{FeatureBlock, FeatureSchema, FEATURE_SCHEMA_V1, SUPPORTED_SCHEMA_VERSIONS};
