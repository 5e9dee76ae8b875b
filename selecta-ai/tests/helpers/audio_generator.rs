//! Audio Test Fixture Generator
//!
//! Utilities for generating test audio buffers and WAV files

use selecta_ai::AudioSample;
use std::path::{Path, PathBuf};

/// Configuration for generated audio
#[derive(Debug, Clone)]
pub struct AudioConfig {
    pub duration_seconds: f64,
    pub sample_rate: u32,
    pub channels: u16,
    pub frequency: f64,
    pub amplitude: f64,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            duration_seconds: 1.0,
            sample_rate: 22050,
            channels: 1,
            frequency: 440.0,
            amplitude: 0.3,
        }
    }
}

fn tone_value(config: &AudioConfig, frame: usize) -> f64 {
    let t = frame as f64 / config.sample_rate as f64;
    config.amplitude * (2.0 * std::f64::consts::PI * config.frequency * t).sin()
}

/// Generate an interleaved sine buffer (same value on every channel)
pub fn generate_test_sample(config: &AudioConfig) -> AudioSample {
    let frames = (config.duration_seconds * config.sample_rate as f64) as usize;
    let mut samples = Vec::with_capacity(frames * config.channels as usize);
    for i in 0..frames {
        let v = tone_value(config, i) as f32;
        for _ in 0..config.channels {
            samples.push(v);
        }
    }
    AudioSample::new(samples, config.sample_rate, config.channels)
}

/// Generate a 16-bit PCM WAV file with the configured tone
pub fn generate_test_wav(path: &Path, config: &AudioConfig) -> anyhow::Result<PathBuf> {
    let spec = hound::WavSpec {
        channels: config.channels,
        sample_rate: config.sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut writer = hound::WavWriter::create(path, spec)?;
    let frames = (config.duration_seconds * config.sample_rate as f64) as usize;

    for i in 0..frames {
        let sample = (tone_value(config, i) * i16::MAX as f64) as i16;
        for _ in 0..config.channels {
            writer.write_sample(sample)?;
        }
    }

    writer.finalize()?;
    Ok(path.to_path_buf())
}
