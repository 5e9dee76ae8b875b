//! Bounded concurrent batch classification
//!
//! Each asset runs extract + cascade on a blocking worker. Items are isolated:
//! one failure never affects another, and results come back in input order.
//! Cancellation is checked before an item starts; started items complete.

use crate::engine::InferenceEngine;
use crate::error::{ClassifyError, Result};
use crate::types::{AudioSample, ClassificationResult, ClassificationStatus};
use futures::stream::{self, StreamExt};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Upper bound for the default pool size
const MAX_DEFAULT_WORKERS: usize = 16;

/// Audio buffer with a caller-chosen identifier
#[derive(Debug, Clone)]
pub struct AudioAsset {
    pub id: String,
    pub sample: AudioSample,
}

impl AudioAsset {
    pub fn new(id: impl Into<String>, sample: AudioSample) -> Self {
        Self {
            id: id.into(),
            sample,
        }
    }
}

/// Per-asset outcome, at the asset's input position
#[derive(Debug)]
pub struct BatchItem {
    pub index: usize,
    pub asset_id: String,
    pub outcome: Result<ClassificationResult>,
}

/// Outcome counts for one batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub total: usize,
    pub fully_classified: usize,
    pub partially_classified: usize,
    pub unclassified: usize,
    pub failed: usize,
    pub cancelled: usize,
}

impl BatchReport {
    pub fn summarize(items: &[BatchItem]) -> Self {
        let mut report = Self {
            total: items.len(),
            ..Self::default()
        };
        for item in items {
            match &item.outcome {
                Ok(result) => match result.status {
                    ClassificationStatus::FullyClassified => report.fully_classified += 1,
                    ClassificationStatus::PartiallyClassified => report.partially_classified += 1,
                    ClassificationStatus::Unclassified => report.unclassified += 1,
                },
                Err(ClassifyError::Cancelled) => report.cancelled += 1,
                Err(_) => report.failed += 1,
            }
        }
        report
    }
}

/// Fan-out over a fixed number of blocking workers
#[derive(Debug, Clone)]
pub struct BatchClassifier {
    engine: Arc<InferenceEngine>,
    worker_count: usize,
}

impl BatchClassifier {
    pub fn new(engine: Arc<InferenceEngine>) -> Self {
        Self {
            engine,
            worker_count: default_worker_count(),
        }
    }

    /// Override the pool size (minimum 1)
    pub fn with_worker_count(mut self, worker_count: usize) -> Self {
        self.worker_count = worker_count.max(1);
        self
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    /// Classify every asset, returning one item per asset in input order
    pub async fn classify_all(
        &self,
        assets: Vec<AudioAsset>,
        cancel_token: &CancellationToken,
    ) -> Vec<BatchItem> {
        let total = assets.len();
        let completed = Arc::new(AtomicUsize::new(0));

        debug!(
            total,
            workers = self.worker_count,
            "Starting batch classification"
        );

        let mut items: Vec<BatchItem> = stream::iter(assets.into_iter().enumerate())
            .map(|(index, asset)| {
                let engine = Arc::clone(&self.engine);
                let cancel_token = cancel_token.clone();
                let completed = Arc::clone(&completed);

                async move {
                    // Check cancellation before processing
                    if cancel_token.is_cancelled() {
                        return BatchItem {
                            index,
                            asset_id: asset.id,
                            outcome: Err(ClassifyError::Cancelled),
                        };
                    }

                    let asset_id = asset.id.clone();
                    let outcome = tokio::task::spawn_blocking(move || engine.classify(&asset.sample))
                        .await
                        .unwrap_or_else(|e| {
                            Err(ClassifyError::Worker(format!(
                                "classification task failed: {}",
                                e
                            )))
                        });

                    match &outcome {
                        Ok(result) => debug!(
                            asset = %asset_id,
                            status = %result.status,
                            bundle = %result.bundle_version,
                            "Asset classified"
                        ),
                        Err(e) if e.is_per_sample() => {
                            warn!(asset = %asset_id, error = %e, "Asset classification failed")
                        }
                        // Bundle or worker defect
                        Err(e) => error!(asset = %asset_id, error = %e, "Classifier failure"),
                    }

                    let done = completed.fetch_add(1, Ordering::Relaxed) + 1;
                    if done % 10 == 0 || done == total {
                        debug!(progress = format!("{}/{}", done, total), "Batch progress");
                    }

                    BatchItem {
                        index,
                        asset_id,
                        outcome,
                    }
                }
            })
            .buffer_unordered(self.worker_count)
            .collect()
            .await;

        items.sort_by_key(|item| item.index);

        let report = BatchReport::summarize(&items);
        info!(
            total = report.total,
            fully = report.fully_classified,
            partially = report.partially_classified,
            unclassified = report.unclassified,
            failed = report.failed,
            cancelled = report.cancelled,
            "Batch classification completed"
        );

        items
    }
}

/// Logical CPU count clamped to [1, 16]
pub fn default_worker_count() -> usize {
    num_cpus::get().clamp(1, MAX_DEFAULT_WORKERS)
}
