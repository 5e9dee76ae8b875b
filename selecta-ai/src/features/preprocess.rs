//! Input validation, downmix, truncation and resampling ahead of analysis

use crate::error::{ClassifyError, Result};
use crate::features::schema::FeatureSchema;
use crate::types::AudioSample;
use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};
use tracing::debug;

/// Validate a caller-supplied buffer and bring it to the schema's analysis
/// format (mono, `schema.sample_rate`, at most `schema.max_duration_secs`)
pub fn prepare_mono(sample: &AudioSample, schema: &FeatureSchema) -> Result<Vec<f32>> {
    validate_buffer(sample)?;

    let duration = sample.duration_secs();
    if duration < schema.min_duration_secs {
        return Err(ClassifyError::UnsupportedAudio(format!(
            "duration {:.3}s is below the {:.3}s minimum",
            duration, schema.min_duration_secs
        )));
    }

    let mono = downmix(sample.samples(), sample.channels() as usize);

    // Truncate at the source rate so resampling never processes discarded audio
    let max_frames = (schema.max_duration_secs * sample.sample_rate() as f64).floor() as usize;
    let mono = if mono.len() > max_frames {
        debug!(
            "Truncating {} frames to {} ({:.1}s analysis window)",
            mono.len(),
            max_frames,
            schema.max_duration_secs
        );
        mono[..max_frames].to_vec()
    } else {
        mono
    };

    if sample.sample_rate() == schema.sample_rate {
        return Ok(mono);
    }

    resample_mono(mono, sample.sample_rate(), schema.sample_rate)
}

fn validate_buffer(sample: &AudioSample) -> Result<()> {
    if sample.channels() == 0 {
        return Err(ClassifyError::UnsupportedAudio(
            "channel count must be positive".to_string(),
        ));
    }
    if sample.sample_rate() == 0 {
        return Err(ClassifyError::UnsupportedAudio(
            "sample rate must be positive".to_string(),
        ));
    }
    if sample.samples().is_empty() {
        return Err(ClassifyError::UnsupportedAudio("empty buffer".to_string()));
    }
    if sample.samples().len() % sample.channels() as usize != 0 {
        return Err(ClassifyError::UnsupportedAudio(format!(
            "{} samples is not a whole number of {}-channel frames",
            sample.samples().len(),
            sample.channels()
        )));
    }
    if let Some(pos) = sample.samples().iter().position(|s| !s.is_finite()) {
        return Err(ClassifyError::UnsupportedAudio(format!(
            "non-finite sample at index {}",
            pos
        )));
    }
    Ok(())
}

/// Average interleaved channels into one
fn downmix(samples: &[f32], channels: usize) -> Vec<f32> {
    if channels == 1 {
        return samples.to_vec();
    }
    samples
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}

/// Resample mono PCM with a single-pass sinc interpolator
fn resample_mono(samples: Vec<f32>, source_rate: u32, target_rate: u32) -> Result<Vec<f32>> {
    let num_frames = samples.len();

    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };

    let ratio = target_rate as f64 / source_rate as f64;

    // Chunk size = input length for single-pass processing
    let mut resampler = SincFixedIn::<f32>::new(ratio, 2.0, params, num_frames, 1)
        .map_err(|e| ClassifyError::UnsupportedAudio(format!("resampler setup failed: {}", e)))?;

    let input_channels = vec![samples];
    let output = resampler
        .process(&input_channels, None)
        .map_err(|e| ClassifyError::UnsupportedAudio(format!("resampling failed: {}", e)))?;

    let resampled = output.into_iter().next().unwrap_or_default();

    debug!(
        "Resampled {} frames ({} Hz) → {} frames ({} Hz)",
        num_frames,
        source_rate,
        resampled.len(),
        target_rate
    );

    Ok(resampled)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> FeatureSchema {
        FeatureSchema::default()
    }

    #[test]
    fn test_stereo_is_averaged() {
        let sample = AudioSample::new(vec![1.0, 0.0, 0.5, 0.5, -1.0, 1.0], 22050, 2);
        assert_eq!(downmix(sample.samples(), 2), vec![0.5, 0.5, 0.0]);
    }

    #[test]
    fn test_short_buffer_rejected() {
        // 0.25s < 0.5s minimum
        let sample = AudioSample::mono(vec![0.1; 5512], 22050);
        assert!(matches!(
            prepare_mono(&sample, &schema()),
            Err(ClassifyError::UnsupportedAudio(_))
        ));
    }

    #[test]
    fn test_malformed_buffers_rejected() {
        let cases = vec![
            AudioSample::new(vec![], 22050, 1),
            AudioSample::new(vec![0.0; 22050], 0, 1),
            AudioSample::new(vec![0.0; 22050], 22050, 0),
            AudioSample::new(vec![0.0; 22051], 22050, 2),
        ];
        for sample in cases {
            assert!(matches!(
                prepare_mono(&sample, &schema()),
                Err(ClassifyError::UnsupportedAudio(_))
            ));
        }

        let mut samples = vec![0.0; 22050];
        samples[100] = f32::NAN;
        let sample = AudioSample::mono(samples, 22050);
        assert!(prepare_mono(&sample, &schema()).is_err());
    }

    #[test]
    fn test_long_buffer_truncated() {
        let mut schema = schema();
        schema.max_duration_secs = 2.0;
        let sample = AudioSample::mono(vec![0.1; 22050 * 5], 22050);
        let mono = prepare_mono(&sample, &schema).unwrap();
        assert_eq!(mono.len(), 22050 * 2);
    }

    #[test]
    fn test_resampled_to_analysis_rate() {
        let sample = AudioSample::mono(vec![0.0; 44100], 44100);
        let mono = prepare_mono(&sample, &schema()).unwrap();
        // Single-pass sinc output is within a filter length of the ideal count
        let expected = 22050i64;
        assert!((mono.len() as i64 - expected).abs() <= 256, "got {}", mono.len());
    }
}
