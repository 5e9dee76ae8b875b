//! # Selecta Common Library
//!
//! Shared code for the Selecta crates:
//! - Error types
//! - TOML bootstrap configuration and config file resolution

pub mod config;
pub mod error;

pub use error::{Error, Result};
