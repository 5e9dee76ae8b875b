//! Audio file decoding for the command-line front end
//!
//! Produces interleaved f32 PCM at the file's native rate and channel count.
//! Downmixing and resampling happen later, in feature extraction.

use crate::error::{ClassifyError, Result};
use crate::types::AudioSample;
use std::path::Path;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::debug;

/// Decode the default audio track of `path`
pub fn decode_file(path: &Path) -> Result<AudioSample> {
    let decode_err = |what: &str, e: SymphoniaError| {
        ClassifyError::Decode(format!("{} ({}): {}", what, path.display(), e))
    };

    let file = std::fs::File::open(path)?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| decode_err("failed to probe audio format", e))?;

    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| ClassifyError::Decode(format!("no audio tracks in {}", path.display())))?;

    let track_id = track.id;
    let codec_params = track.codec_params.clone();

    let mut decoder = symphonia::default::get_codecs()
        .make(&codec_params, &DecoderOptions::default())
        .map_err(|e| decode_err("failed to create decoder", e))?;

    let mut samples = Vec::new();
    let mut sample_rate = codec_params.sample_rate.unwrap_or(0);
    let mut channels = codec_params.channels.map(|c| c.count() as u16).unwrap_or(0);
    let mut sample_buf: Option<SampleBuffer<f32>> = None;

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break;
            }
            Err(e) => return Err(decode_err("failed to read packet", e)),
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            // Corrupt packet: skip it, as symphonia recommends
            Err(SymphoniaError::DecodeError(e)) => {
                debug!("Skipping undecodable packet in {}: {}", path.display(), e);
                continue;
            }
            Err(e) => return Err(decode_err("failed to decode packet", e)),
        };

        let spec = *decoded.spec();
        sample_rate = spec.rate;
        channels = spec.channels.count() as u16;

        let buf = sample_buf
            .get_or_insert_with(|| SampleBuffer::new(decoded.capacity() as u64, spec));
        if buf.capacity() < decoded.capacity() * spec.channels.count() {
            *buf = SampleBuffer::new(decoded.capacity() as u64, spec);
        }
        buf.copy_interleaved_ref(decoded);
        samples.extend_from_slice(buf.samples());
    }

    if samples.is_empty() {
        return Err(ClassifyError::Decode(format!(
            "no audio decoded from {}",
            path.display()
        )));
    }

    debug!(
        "Decoded {}: {} samples, {} Hz, {} channels",
        path.display(),
        samples.len(),
        sample_rate,
        channels
    );

    Ok(AudioSample::new(samples, sample_rate, channels))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_decode_stereo_wav() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("tone.wav");

        let spec = hound::WavSpec {
            channels: 2,
            sample_rate: 44100,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        for i in 0..44100 {
            let t = i as f32 / 44100.0;
            let v = ((2.0 * std::f32::consts::PI * 440.0 * t).sin() * 16000.0) as i16;
            writer.write_sample(v).unwrap();
            writer.write_sample(v).unwrap();
        }
        writer.finalize().unwrap();

        let sample = decode_file(&path).unwrap();
        assert_eq!(sample.sample_rate(), 44100);
        assert_eq!(sample.channels(), 2);
        assert_eq!(sample.frames(), 44100);
        assert!(sample.samples().iter().all(|s| s.abs() <= 1.0));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let result = decode_file(Path::new("/nonexistent/selecta/missing.wav"));
        assert!(matches!(result, Err(ClassifyError::Io(_))));
    }

    #[test]
    fn test_garbage_file_is_decode_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("noise.wav");
        std::fs::write(&path, b"definitely not a wav file").unwrap();
        assert!(matches!(decode_file(&path), Err(ClassifyError::Decode(_))));
    }
}
