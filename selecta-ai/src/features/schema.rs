//! Feature schema: the length/ordering contract between extractor and stages

use crate::error::{ClassifyError, Result};
use serde::{Deserialize, Serialize};

/// Schema version tag for the block-based layout
pub const FEATURE_SCHEMA_V1: &str = "selecta-features/1";

/// Schema versions this build can extract (whitelist, never inferred)
pub const SUPPORTED_SCHEMA_VERSIONS: &[&str] = &[FEATURE_SCHEMA_V1];

/// Upper bound for spectral contrast bands (octaves above 200 Hz)
pub const MAX_CONTRAST_BANDS: usize = 8;

/// One group of features in the vector, in schema order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FeatureBlock {
    /// mean, std, max, min of each MFCC coefficient (grouped by statistic)
    Mfcc { coefficients: usize },
    /// mean, std of per-frame spectral centroid (Hz)
    SpectralCentroid,
    /// mean, std of per-frame 85% roll-off frequency (Hz)
    SpectralRolloff,
    /// mean, std of per-frame zero-crossing rate
    ZeroCrossingRate,
    /// Global tempo estimate (BPM)
    Tempo,
    /// mean, std of each of the 12 pitch classes
    Chroma,
    /// mean, std of each octave band's peak/valley contrast (bands + 1 rows)
    SpectralContrast { bands: usize },
}

impl FeatureBlock {
    /// Number of values this block contributes
    pub fn width(&self) -> usize {
        match self {
            FeatureBlock::Mfcc { coefficients } => 4 * coefficients,
            FeatureBlock::SpectralCentroid
            | FeatureBlock::SpectralRolloff
            | FeatureBlock::ZeroCrossingRate => 2,
            FeatureBlock::Tempo => 1,
            FeatureBlock::Chroma => 24,
            FeatureBlock::SpectralContrast { bands } => 2 * (bands + 1),
        }
    }

    /// Feature names contributed by this block, in vector order
    pub fn names(&self) -> Vec<String> {
        fn stats(prefix: &str, count: usize, stats: &[&str]) -> Vec<String> {
            stats
                .iter()
                .flat_map(|stat| (0..count).map(move |i| format!("{}_{}_{}", prefix, stat, i)))
                .collect()
        }

        match self {
            FeatureBlock::Mfcc { coefficients } => {
                stats("mfcc", *coefficients, &["mean", "std", "max", "min"])
            }
            FeatureBlock::SpectralCentroid => {
                vec!["centroid_mean".to_string(), "centroid_std".to_string()]
            }
            FeatureBlock::SpectralRolloff => {
                vec!["rolloff_mean".to_string(), "rolloff_std".to_string()]
            }
            FeatureBlock::ZeroCrossingRate => vec!["zcr_mean".to_string(), "zcr_std".to_string()],
            FeatureBlock::Tempo => vec!["tempo_bpm".to_string()],
            FeatureBlock::Chroma => stats("chroma", 12, &["mean", "std"]),
            FeatureBlock::SpectralContrast { bands } => {
                stats("contrast", bands + 1, &["mean", "std"])
            }
        }
    }
}

/// Feature schema recorded in an artifact bundle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureSchema {
    /// Schema version tag
    pub version: String,
    /// Analysis sample rate (input is resampled to this rate)
    pub sample_rate: u32,
    /// Analysis channel count (input is downmixed; only mono is defined)
    pub channels: u16,
    /// Minimum analysis window; shorter input is rejected
    pub min_duration_secs: f64,
    /// Maximum analysis window; longer input is truncated
    pub max_duration_secs: f64,
    /// STFT frame size
    pub n_fft: usize,
    /// STFT hop size
    pub hop_length: usize,
    /// Mel bands used for MFCC and onset analysis
    pub n_mels: usize,
    /// Ordered feature blocks
    pub blocks: Vec<FeatureBlock>,
}

impl Default for FeatureSchema {
    /// 97-value layout: 13 MFCCs (x4 stats), centroid, roll-off, ZCR, tempo,
    /// chroma, 6-band contrast
    fn default() -> Self {
        Self::with_blocks(vec![
            FeatureBlock::Mfcc { coefficients: 13 },
            FeatureBlock::SpectralCentroid,
            FeatureBlock::SpectralRolloff,
            FeatureBlock::ZeroCrossingRate,
            FeatureBlock::Tempo,
            FeatureBlock::Chroma,
            FeatureBlock::SpectralContrast { bands: 6 },
        ])
    }
}

impl FeatureSchema {
    /// Default analysis parameters with a custom block layout
    pub fn with_blocks(blocks: Vec<FeatureBlock>) -> Self {
        Self {
            version: FEATURE_SCHEMA_V1.to_string(),
            sample_rate: 22050,
            channels: 1,
            min_duration_secs: 0.5,
            max_duration_secs: 30.0,
            n_fft: 2048,
            hop_length: 512,
            n_mels: 128,
            blocks,
        }
    }

    /// Total feature vector length
    pub fn feature_len(&self) -> usize {
        self.blocks.iter().map(FeatureBlock::width).sum()
    }

    /// Feature names in vector order
    pub fn feature_names(&self) -> Vec<String> {
        self.blocks.iter().flat_map(FeatureBlock::names).collect()
    }

    pub fn is_supported_version(&self) -> bool {
        SUPPORTED_SCHEMA_VERSIONS.contains(&self.version.as_str())
    }

    /// Structural validation of analysis parameters and blocks
    pub fn check(&self) -> Result<()> {
        let fail = |msg: String| Err(ClassifyError::ArtifactConsistency(msg));

        if self.sample_rate == 0 {
            return fail("feature schema sample_rate must be positive".to_string());
        }
        if self.channels != 1 {
            return fail(format!(
                "feature schema channels must be 1 (mono analysis), got {}",
                self.channels
            ));
        }
        if !self.min_duration_secs.is_finite()
            || !self.max_duration_secs.is_finite()
            || self.min_duration_secs < 0.0
            || self.max_duration_secs <= self.min_duration_secs
        {
            return fail(format!(
                "feature schema durations invalid: min={} max={}",
                self.min_duration_secs, self.max_duration_secs
            ));
        }
        if self.n_fft < 16 || self.hop_length == 0 || self.hop_length > self.n_fft {
            return fail(format!(
                "feature schema STFT parameters invalid: n_fft={} hop_length={}",
                self.n_fft, self.hop_length
            ));
        }
        if self.n_mels == 0 || self.n_mels > self.n_fft / 2 + 1 {
            return fail(format!(
                "feature schema n_mels={} out of range for n_fft={}",
                self.n_mels, self.n_fft
            ));
        }
        if self.blocks.is_empty() {
            return fail("feature schema has no blocks".to_string());
        }

        for block in &self.blocks {
            match *block {
                FeatureBlock::Mfcc { coefficients } => {
                    if coefficients == 0 || coefficients > self.n_mels {
                        return fail(format!(
                            "mfcc coefficients={} must be in 1..={}",
                            coefficients, self.n_mels
                        ));
                    }
                }
                FeatureBlock::SpectralContrast { bands } => {
                    if bands == 0 || bands > MAX_CONTRAST_BANDS {
                        return fail(format!(
                            "spectral contrast bands={} must be in 1..={}",
                            bands, MAX_CONTRAST_BANDS
                        ));
                    }
                }
                _ => {}
            }
        }

        Ok(())
    }
}
