//! Feature extraction: audio buffer → fixed-length feature vector
//!
//! Deterministic for a given buffer and schema. Every block is reduced to
//! per-frame statistics (mean, population std, and for MFCCs max/min) so the
//! vector length depends only on the schema.

use crate::error::{ClassifyError, Result};
use crate::features::preprocess::prepare_mono;
use crate::features::schema::{FeatureBlock, FeatureSchema};
use crate::features::spectral::{self, MelFilterbank, Spectrogram};
use crate::features::tempo;
use crate::types::{AudioSample, FeatureVector};
use tracing::debug;

/// Per-frame series summary
#[derive(Debug, Clone, Copy, PartialEq)]
struct Stats {
    mean: f64,
    std: f64,
    max: f64,
    min: f64,
}

impl Stats {
    fn of(values: impl Iterator<Item = f64> + Clone) -> Self {
        let mut count = 0usize;
        let mut sum = 0.0;
        let mut max = f64::NEG_INFINITY;
        let mut min = f64::INFINITY;
        for v in values.clone() {
            count += 1;
            sum += v;
            max = max.max(v);
            min = min.min(v);
        }
        if count == 0 {
            return Self {
                mean: 0.0,
                std: 0.0,
                max: 0.0,
                min: 0.0,
            };
        }
        let mean = sum / count as f64;
        let var = values.map(|v| (v - mean) * (v - mean)).sum::<f64>() / count as f64;
        Self {
            mean,
            std: var.sqrt(),
            max,
            min,
        }
    }
}

/// Stateless feature extractor
#[derive(Debug, Clone, Default)]
pub struct FeatureExtractor;

impl FeatureExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Extract the feature vector `schema` describes
    ///
    /// # Errors
    /// `UnsupportedAudio` if the buffer is empty, malformed, shorter than the
    /// schema minimum, or yields non-finite features.
    pub fn extract(&self, sample: &AudioSample, schema: &FeatureSchema) -> Result<FeatureVector> {
        let mono = prepare_mono(sample, schema)?;

        let spec = Spectrogram::compute(&mono, schema.sample_rate, schema.n_fft, schema.hop_length)?;

        let needs_mel = schema
            .blocks
            .iter()
            .any(|b| matches!(b, FeatureBlock::Mfcc { .. } | FeatureBlock::Tempo));
        let mel_power = if needs_mel {
            let filterbank = MelFilterbank::new(schema.n_mels, schema.n_fft, schema.sample_rate);
            spec.mel_power(&filterbank)
        } else {
            Vec::new()
        };

        let mut values = Vec::with_capacity(schema.feature_len());

        for block in &schema.blocks {
            match *block {
                FeatureBlock::Mfcc { coefficients } => {
                    let frames = spectral::mfcc(&mel_power, coefficients);
                    let stats: Vec<Stats> = (0..coefficients)
                        .map(|c| Stats::of(frames.iter().map(move |f| f[c])))
                        .collect();
                    values.extend(stats.iter().map(|s| s.mean));
                    values.extend(stats.iter().map(|s| s.std));
                    values.extend(stats.iter().map(|s| s.max));
                    values.extend(stats.iter().map(|s| s.min));
                }
                FeatureBlock::SpectralCentroid => {
                    push_mean_std(&mut values, &spec.centroid());
                }
                FeatureBlock::SpectralRolloff => {
                    push_mean_std(&mut values, &spec.rolloff());
                }
                FeatureBlock::ZeroCrossingRate => {
                    let zcr = spectral::zero_crossing_rate(&mono, schema.n_fft, schema.hop_length);
                    push_mean_std(&mut values, &zcr);
                }
                FeatureBlock::Tempo => {
                    let mel_db = spectral::power_to_db(&mel_power);
                    let envelope = tempo::onset_envelope(&mel_db);
                    let frame_rate = schema.sample_rate as f64 / schema.hop_length as f64;
                    values.push(tempo::estimate_tempo(&envelope, frame_rate));
                }
                FeatureBlock::Chroma => {
                    let chroma = spec.chroma();
                    let stats: Vec<Stats> = (0..12)
                        .map(|pc| Stats::of(chroma.iter().map(move |f| f[pc])))
                        .collect();
                    values.extend(stats.iter().map(|s| s.mean));
                    values.extend(stats.iter().map(|s| s.std));
                }
                FeatureBlock::SpectralContrast { bands } => {
                    let contrast = spec.contrast(bands);
                    let stats: Vec<Stats> = (0..=bands)
                        .map(|b| Stats::of(contrast.iter().map(move |f| f[b])))
                        .collect();
                    values.extend(stats.iter().map(|s| s.mean));
                    values.extend(stats.iter().map(|s| s.std));
                }
            }
        }

        if values.len() != schema.feature_len() {
            return Err(ClassifyError::UnsupportedAudio(format!(
                "extracted {} features, schema expects {}",
                values.len(),
                schema.feature_len()
            )));
        }
        if let Some(pos) = values.iter().position(|v| !v.is_finite()) {
            return Err(ClassifyError::UnsupportedAudio(format!(
                "non-finite feature at index {}",
                pos
            )));
        }

        debug!(
            "Extracted {} features from {} frames ({:.2}s)",
            values.len(),
            spec.num_frames(),
            sample.duration_secs()
        );

        Ok(FeatureVector::new(values))
    }
}

fn push_mean_std(values: &mut Vec<f64>, series: &[f64]) {
    let stats = Stats::of(series.iter().copied());
    values.push(stats.mean);
    values.push(stats.std);
}
