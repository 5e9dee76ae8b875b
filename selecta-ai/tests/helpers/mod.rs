//! Test Helper Utilities
//!
//! Shared utilities for testing selecta-ai

#![allow(dead_code)]

pub mod audio_generator;
pub mod bundle_builder;

// Re-export commonly used items
pub use audio_generator::{generate_test_sample, generate_test_wav, AudioConfig};
pub use bundle_builder::{
    counts_stage, genre_bundle, genre_parts, node, schema_40, split_stage, GenreDistributions,
    BUILD_A, BUILD_B,
};
