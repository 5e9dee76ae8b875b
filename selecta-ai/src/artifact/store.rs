//! Artifact store: bundle loading, validation and hot reload
//!
//! The store owns the "current bundle" reference. Readers clone the `Arc`
//! under a short read lock; a reload loads and validates the new bundle
//! without holding the lock, then swaps the `Arc` under the write lock.
//! In-flight inferences keep the bundle they captured.

use crate::artifact::bundle::ModelArtifactBundle;
use crate::artifact::descriptor::{
    blob_file_name, descriptor_file_name, descriptor_timestamp, parse_build_timestamp,
    sha256_hex, BundleDescriptor, StageBlob, STRATEGY_CASCADE, SUPPORTED_BUNDLE_FORMATS,
    TIMESTAMP_FORMAT,
};
use crate::error::{ClassifyError, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, info, warn};

/// Holder of the active bundle
#[derive(Debug)]
pub struct ModelArtifactStore {
    current: RwLock<Arc<ModelArtifactBundle>>,
}

impl ModelArtifactStore {
    /// Wrap an already validated bundle
    pub fn new(bundle: ModelArtifactBundle) -> Self {
        Self {
            current: RwLock::new(Arc::new(bundle)),
        }
    }

    /// Load `descriptor_path` and make it the current bundle
    pub fn open(descriptor_path: &Path) -> Result<Self> {
        Ok(Self::new(Self::load(descriptor_path)?))
    }

    /// Load and validate a bundle from its descriptor file
    ///
    /// # Errors
    /// - `ArtifactLoad`: missing/unreadable file, unparsable descriptor or
    ///   blob, checksum mismatch, unrecognized format/strategy/schema version,
    ///   a `bundle_info_<ts>.json` name that disagrees with `build_timestamp`
    /// - `ArtifactConsistency`: the bundle parses but is internally malformed
    pub fn load(descriptor_path: &Path) -> Result<ModelArtifactBundle> {
        debug!("Loading bundle descriptor: {}", descriptor_path.display());

        let text = fs::read_to_string(descriptor_path).map_err(|e| {
            ClassifyError::ArtifactLoad(format!(
                "cannot read descriptor {}: {}",
                descriptor_path.display(),
                e
            ))
        })?;

        let descriptor: BundleDescriptor = serde_json::from_str(&text).map_err(|e| {
            ClassifyError::ArtifactLoad(format!(
                "cannot parse descriptor {}: {}",
                descriptor_path.display(),
                e
            ))
        })?;

        check_versions(&descriptor)?;

        // A timestamped file name must agree with the build it describes
        if let Some(named) = descriptor_path
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(descriptor_timestamp)
        {
            if parse_build_timestamp(&descriptor.build_timestamp) != Some(named) {
                return Err(ClassifyError::ArtifactLoad(format!(
                    "descriptor {} is named for build {} but records build {}",
                    descriptor_path.display(),
                    named.format(TIMESTAMP_FORMAT),
                    descriptor.build_timestamp
                )));
            }
        }

        if descriptor.blob_file.contains(['/', '\\']) || descriptor.blob_file.is_empty() {
            return Err(ClassifyError::ArtifactLoad(format!(
                "blob_file '{}' must be a plain file name",
                descriptor.blob_file
            )));
        }

        let blob_path = descriptor_path
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join(&descriptor.blob_file);
        let bytes = fs::read(&blob_path).map_err(|e| {
            ClassifyError::ArtifactLoad(format!(
                "cannot read stage blob {}: {}",
                blob_path.display(),
                e
            ))
        })?;

        let actual = sha256_hex(&bytes);
        if !actual.eq_ignore_ascii_case(&descriptor.blob_sha256) {
            return Err(ClassifyError::ArtifactLoad(format!(
                "stage blob {} checksum mismatch (expected {}, got {})",
                blob_path.display(),
                descriptor.blob_sha256,
                actual
            )));
        }

        let blob = StageBlob::from_bytes(&bytes).map_err(|e| {
            ClassifyError::ArtifactLoad(format!(
                "cannot parse stage blob {}: {}",
                blob_path.display(),
                e
            ))
        })?;

        let bundle = ModelArtifactBundle::from_parts(descriptor, blob)?;

        info!(
            bundle = %bundle.version(),
            nodes = bundle.hierarchy().len(),
            stages = bundle.stage_count(),
            features = bundle.schema().feature_len(),
            "Loaded model bundle"
        );

        Ok(bundle)
    }

    /// Standalone consistency check (also run by `load`)
    pub fn validate(bundle: &ModelArtifactBundle) -> Result<()> {
        bundle.validate()
    }

    /// Snapshot of the current bundle
    pub fn current(&self) -> Arc<ModelArtifactBundle> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Load a new bundle and swap it in
    ///
    /// On failure the current bundle stays in place.
    pub fn reload(&self, descriptor_path: &Path) -> Result<Arc<ModelArtifactBundle>> {
        match Self::load(descriptor_path) {
            Ok(bundle) => Ok(self.replace(bundle)),
            Err(e) => {
                warn!(
                    "Bundle reload from {} failed, keeping {}: {}",
                    descriptor_path.display(),
                    self.current().version(),
                    e
                );
                Err(e)
            }
        }
    }

    /// Swap in an already validated bundle, returning the new snapshot
    pub fn replace(&self, bundle: ModelArtifactBundle) -> Arc<ModelArtifactBundle> {
        let next = Arc::new(bundle);
        let previous = {
            let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
            std::mem::replace(&mut *guard, Arc::clone(&next))
        };
        info!(
            "Model bundle swapped: {} → {}",
            previous.version(),
            next.version()
        );
        next
    }
}

fn check_versions(descriptor: &BundleDescriptor) -> Result<()> {
    if !SUPPORTED_BUNDLE_FORMATS.contains(&descriptor.format_version.as_str()) {
        return Err(ClassifyError::ArtifactLoad(format!(
            "unsupported bundle format '{}' (supported: {:?})",
            descriptor.format_version, SUPPORTED_BUNDLE_FORMATS
        )));
    }
    if descriptor.strategy != STRATEGY_CASCADE {
        return Err(ClassifyError::ArtifactLoad(format!(
            "unsupported inference strategy '{}'",
            descriptor.strategy
        )));
    }
    if !descriptor.schema.is_supported_version() {
        return Err(ClassifyError::ArtifactLoad(format!(
            "unsupported feature schema '{}'",
            descriptor.schema.version
        )));
    }
    if parse_build_timestamp(&descriptor.build_timestamp).is_none() {
        return Err(ClassifyError::ArtifactLoad(format!(
            "build timestamp '{}' is not YYYYMMDD_HHMMSS",
            descriptor.build_timestamp
        )));
    }
    Ok(())
}

/// Newest descriptor in `dir` by the timestamp in its file name
///
/// Files not named `bundle_info_<YYYYMMDD_HHMMSS>.json` are ignored.
pub fn discover_latest(dir: &Path) -> Result<PathBuf> {
    let entries = fs::read_dir(dir).map_err(|e| {
        ClassifyError::ArtifactLoad(format!("cannot list bundle dir {}: {}", dir.display(), e))
    })?;

    let mut newest = None;
    for entry in entries {
        let entry = entry?;
        let name = entry.file_name();
        let Some(ts) = name.to_str().and_then(descriptor_timestamp) else {
            continue;
        };
        if newest.as_ref().map_or(true, |(best, _)| ts > *best) {
            newest = Some((ts, entry.path()));
        }
    }

    match newest {
        Some((ts, path)) => {
            debug!("Latest bundle in {}: {} ({})", dir.display(), path.display(), ts);
            Ok(path)
        }
        None => Err(ClassifyError::ArtifactLoad(format!(
            "no bundle_info_<timestamp>.json found in {}",
            dir.display()
        ))),
    }
}

/// Write a descriptor/blob pair into `dir`
///
/// `blob_file`, `blob_sha256` and `feature_length` are filled in from the
/// blob and schema. Returns the descriptor path.
pub fn write_bundle(dir: &Path, descriptor: &BundleDescriptor, blob: &StageBlob) -> Result<PathBuf> {
    let bytes = blob
        .to_bytes()
        .map_err(|e| ClassifyError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e)))?;

    let mut descriptor = descriptor.clone();
    descriptor.blob_file = blob_file_name(&descriptor.build_timestamp);
    descriptor.blob_sha256 = sha256_hex(&bytes);
    descriptor.feature_length = descriptor.schema.feature_len();

    fs::create_dir_all(dir)?;
    fs::write(dir.join(&descriptor.blob_file), &bytes)?;

    let json = serde_json::to_string_pretty(&descriptor)
        .map_err(|e| ClassifyError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e)))?;
    let path = dir.join(descriptor_file_name(&descriptor.build_timestamp));
    fs::write(&path, json)?;

    debug!("Wrote bundle {} to {}", descriptor.build_timestamp, path.display());
    Ok(path)
}
