//! Short-time spectral analysis
//!
//! All per-frame descriptors are derived from one centered STFT. Frame-major
//! layout throughout: `frames[t][bin]`.

use crate::error::{ClassifyError, Result};
use realfft::RealFftPlanner;

/// Power floor used before taking logarithms
const AMIN: f64 = 1e-10;

/// Dynamic range kept by `power_to_db`
const TOP_DB: f64 = 80.0;

/// Lowest octave edge for spectral contrast
const CONTRAST_FMIN: f64 = 200.0;

/// Fraction of each band used for peak/valley estimates
const CONTRAST_QUANTILE: f64 = 0.02;

/// Energy fraction for spectral roll-off
const ROLLOFF_PERCENT: f64 = 0.85;

/// Lowest frequency assigned a pitch class (C1)
const CHROMA_FMIN: f64 = 32.703;

/// Magnitude spectrogram of a mono signal
#[derive(Debug, Clone)]
pub struct Spectrogram {
    /// |X(t, k)| per frame
    pub magnitude: Vec<Vec<f64>>,
    pub sample_rate: u32,
    pub n_fft: usize,
}

impl Spectrogram {
    /// Centered STFT with a periodic Hann window
    ///
    /// The signal is zero-padded by `n_fft / 2` on both sides so frame `t`
    /// is centered on sample `t * hop`.
    pub fn compute(signal: &[f32], sample_rate: u32, n_fft: usize, hop: usize) -> Result<Self> {
        let pad = n_fft / 2;
        let mut padded = vec![0.0f64; signal.len() + 2 * pad];
        for (dst, &src) in padded[pad..].iter_mut().zip(signal) {
            *dst = src as f64;
        }

        let num_frames = (padded.len() - n_fft) / hop + 1;

        let mut planner = RealFftPlanner::<f64>::new();
        let fft = planner.plan_fft_forward(n_fft);

        let window = hann_window(n_fft);

        let mut scratch = fft.make_scratch_vec();
        let mut frame_buf = vec![0.0f64; n_fft];
        let mut spectrum = fft.make_output_vec();
        let mut magnitude = Vec::with_capacity(num_frames);

        for frame_idx in 0..num_frames {
            let start = frame_idx * hop;

            for i in 0..n_fft {
                frame_buf[i] = padded[start + i] * window[i];
            }

            fft.process_with_scratch(&mut frame_buf, &mut spectrum, &mut scratch)
                .map_err(|e| ClassifyError::UnsupportedAudio(format!("FFT failed: {:?}", e)))?;

            magnitude.push(spectrum.iter().map(|c| c.norm()).collect());
        }

        Ok(Self {
            magnitude,
            sample_rate,
            n_fft,
        })
    }

    pub fn num_frames(&self) -> usize {
        self.magnitude.len()
    }

    pub fn num_bins(&self) -> usize {
        self.n_fft / 2 + 1
    }

    /// Center frequency of each bin in Hz
    pub fn bin_frequencies(&self) -> Vec<f64> {
        let step = self.sample_rate as f64 / self.n_fft as f64;
        (0..self.num_bins()).map(|k| k as f64 * step).collect()
    }

    /// Mel band energies per frame from the power spectrum
    pub fn mel_power(&self, filterbank: &MelFilterbank) -> Vec<Vec<f64>> {
        self.magnitude
            .iter()
            .map(|frame| filterbank.apply_power(frame))
            .collect()
    }

    /// Magnitude-weighted mean frequency per frame (0 for silent frames)
    pub fn centroid(&self) -> Vec<f64> {
        let freqs = self.bin_frequencies();
        self.magnitude
            .iter()
            .map(|frame| {
                let total: f64 = frame.iter().sum();
                if total <= 0.0 {
                    return 0.0;
                }
                frame.iter().zip(&freqs).map(|(m, f)| m * f).sum::<f64>() / total
            })
            .collect()
    }

    /// Lowest frequency below which 85% of the magnitude lies (0 for silent frames)
    pub fn rolloff(&self) -> Vec<f64> {
        let freqs = self.bin_frequencies();
        self.magnitude
            .iter()
            .map(|frame| {
                let total: f64 = frame.iter().sum();
                if total <= 0.0 {
                    return 0.0;
                }
                let target = ROLLOFF_PERCENT * total;
                let mut cumulative = 0.0;
                for (m, f) in frame.iter().zip(&freqs) {
                    cumulative += m;
                    if cumulative >= target {
                        return *f;
                    }
                }
                freqs.last().copied().unwrap_or(0.0)
            })
            .collect()
    }

    /// 12-bin pitch class energy per frame, scaled so each frame's peak is 1
    pub fn chroma(&self) -> Vec<[f64; 12]> {
        let pitch_classes: Vec<Option<usize>> = self
            .bin_frequencies()
            .iter()
            .map(|&f| {
                if f < CHROMA_FMIN {
                    None
                } else {
                    // C = 0 ... B = 11, A4 = 440 Hz
                    let semitone = (12.0 * (f / 440.0).log2()).round() as i64 + 9;
                    Some(semitone.rem_euclid(12) as usize)
                }
            })
            .collect();

        self.magnitude
            .iter()
            .map(|frame| {
                let mut bins = [0.0f64; 12];
                for (m, pc) in frame.iter().zip(&pitch_classes) {
                    if let Some(pc) = pc {
                        bins[*pc] += m * m;
                    }
                }
                let peak = bins.iter().cloned().fold(0.0, f64::max);
                if peak > 0.0 {
                    for b in bins.iter_mut() {
                        *b /= peak;
                    }
                }
                bins
            })
            .collect()
    }

    /// Octave-band peak/valley contrast in dB, `bands + 1` rows per frame
    ///
    /// Band 0 covers [0, 200) Hz; band k covers [200*2^(k-1), 200*2^k); the
    /// last band extends to Nyquist. Bands without bins report 0.
    pub fn contrast(&self, bands: usize) -> Vec<Vec<f64>> {
        let freqs = self.bin_frequencies();

        let mut edges = Vec::with_capacity(bands + 2);
        edges.push(0.0);
        for k in 0..=bands {
            edges.push(CONTRAST_FMIN * 2f64.powi(k as i32));
        }

        let band_bins: Vec<Vec<usize>> = (0..=bands)
            .map(|b| {
                let low = edges[b];
                let high = if b == bands { f64::INFINITY } else { edges[b + 1] };
                freqs
                    .iter()
                    .enumerate()
                    .filter(|(_, &f)| f >= low && f < high)
                    .map(|(k, _)| k)
                    .collect()
            })
            .collect();

        self.magnitude
            .iter()
            .map(|frame| {
                band_bins
                    .iter()
                    .map(|bins| {
                        if bins.is_empty() {
                            return 0.0;
                        }
                        let mut values: Vec<f64> = bins.iter().map(|&k| frame[k]).collect();
                        values.sort_by(f64::total_cmp);

                        let n = ((CONTRAST_QUANTILE * values.len() as f64).round() as usize)
                            .max(1)
                            .min(values.len());
                        let valley = values[..n].iter().sum::<f64>() / n as f64;
                        let peak = values[values.len() - n..].iter().sum::<f64>() / n as f64;

                        10.0 * peak.max(AMIN).log10() - 10.0 * valley.max(AMIN).log10()
                    })
                    .collect()
            })
            .collect()
    }
}

/// Periodic Hann window
pub fn hann_window(size: usize) -> Vec<f64> {
    (0..size)
        .map(|i| {
            let phase = 2.0 * std::f64::consts::PI * i as f64 / size as f64;
            0.5 * (1.0 - phase.cos())
        })
        .collect()
}

fn hz_to_mel(hz: f64) -> f64 {
    2595.0 * (1.0 + hz / 700.0).log10()
}

fn mel_to_hz(mel: f64) -> f64 {
    700.0 * (10f64.powf(mel / 2595.0) - 1.0)
}

/// Triangular mel filterbank over [0, Nyquist], stored sparsely
#[derive(Debug, Clone)]
pub struct MelFilterbank {
    /// (first bin, weights) per band
    filters: Vec<(usize, Vec<f64>)>,
}

impl MelFilterbank {
    pub fn new(n_mels: usize, n_fft: usize, sample_rate: u32) -> Self {
        let n_bins = n_fft / 2 + 1;
        let sr = sample_rate as f64;
        let mel_max = hz_to_mel(sr / 2.0);

        let bin_points: Vec<f64> = (0..n_mels + 2)
            .map(|i| mel_to_hz(mel_max * i as f64 / (n_mels + 1) as f64) * n_fft as f64 / sr)
            .collect();

        let filters = (0..n_mels)
            .map(|band| {
                let left = bin_points[band];
                let center = bin_points[band + 1];
                let right = bin_points[band + 2];

                let first = left.ceil().max(0.0) as usize;
                let last = (right.floor() as usize).min(n_bins - 1);

                let weights = (first..=last)
                    .map(|bin| {
                        let x = bin as f64;
                        if x <= center && center > left {
                            (x - left) / (center - left)
                        } else if x > center && right > center {
                            (right - x) / (right - center)
                        } else {
                            0.0
                        }
                    })
                    .collect();
                (first, weights)
            })
            .collect();

        Self { filters }
    }

    pub fn n_mels(&self) -> usize {
        self.filters.len()
    }

    /// Band energies of one magnitude frame (weights applied to |X|^2)
    pub fn apply_power(&self, magnitude: &[f64]) -> Vec<f64> {
        self.filters
            .iter()
            .map(|(first, weights)| {
                weights
                    .iter()
                    .enumerate()
                    .filter_map(|(i, w)| magnitude.get(first + i).map(|m| w * m * m))
                    .sum()
            })
            .collect()
    }
}

/// Convert power values to dB, clipped to `TOP_DB` below the global peak
pub fn power_to_db(frames: &[Vec<f64>]) -> Vec<Vec<f64>> {
    let mut db: Vec<Vec<f64>> = frames
        .iter()
        .map(|frame| frame.iter().map(|p| 10.0 * p.max(AMIN).log10()).collect())
        .collect();

    let peak = db
        .iter()
        .flatten()
        .cloned()
        .fold(f64::NEG_INFINITY, f64::max);
    let floor = peak - TOP_DB;
    for v in db.iter_mut().flatten() {
        if *v < floor {
            *v = floor;
        }
    }
    db
}

/// Orthonormal DCT-II, first `n_out` coefficients
pub fn dct_ortho(input: &[f64], n_out: usize) -> Vec<f64> {
    let n = input.len() as f64;
    (0..n_out)
        .map(|k| {
            let sum: f64 = input
                .iter()
                .enumerate()
                .map(|(i, x)| x * (std::f64::consts::PI * k as f64 * (i as f64 + 0.5) / n).cos())
                .sum();
            let scale = if k == 0 { (1.0 / n).sqrt() } else { (2.0 / n).sqrt() };
            sum * scale
        })
        .collect()
}

/// MFCC frames from mel band power
pub fn mfcc(mel_power: &[Vec<f64>], coefficients: usize) -> Vec<Vec<f64>> {
    power_to_db(mel_power)
        .iter()
        .map(|frame| dct_ortho(frame, coefficients))
        .collect()
}

/// Fraction of sign changes per centered frame (zero counts as positive)
pub fn zero_crossing_rate(signal: &[f32], frame_length: usize, hop: usize) -> Vec<f64> {
    if signal.is_empty() {
        return Vec::new();
    }

    let pad = frame_length / 2;
    let len = signal.len();
    // Edge padding so boundary frames do not gain spurious crossings
    let at = |i: usize| -> f32 {
        if i < pad {
            signal[0]
        } else if i - pad >= len {
            signal[len - 1]
        } else {
            signal[i - pad]
        }
    };

    let padded_len = len + 2 * pad;
    let num_frames = (padded_len.saturating_sub(frame_length)) / hop + 1;

    (0..num_frames)
        .map(|t| {
            let start = t * hop;
            let crossings = (start + 1..start + frame_length)
                .filter(|&i| (at(i - 1) >= 0.0) != (at(i) >= 0.0))
                .count();
            crossings as f64 / frame_length as f64
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(freq: f64, sample_rate: u32, secs: f64) -> Vec<f32> {
        let n = (sample_rate as f64 * secs) as usize;
        (0..n)
            .map(|i| (2.0 * std::f64::consts::PI * freq * i as f64 / sample_rate as f64).sin() as f32)
            .collect()
    }

    #[test]
    fn test_frame_count_is_centered() {
        let signal = vec![0.0f32; 22050];
        let spec = Spectrogram::compute(&signal, 22050, 2048, 512).unwrap();
        assert_eq!(spec.num_frames(), 1 + 22050 / 512);
        assert_eq!(spec.magnitude[0].len(), 1025);
    }

    #[test]
    fn test_centroid_tracks_pure_tone() {
        let signal = sine(1000.0, 22050, 1.0);
        let spec = Spectrogram::compute(&signal, 22050, 2048, 512).unwrap();
        let centroid = spec.centroid();
        let mid = centroid[centroid.len() / 2];
        assert!((mid - 1000.0).abs() < 50.0, "centroid {}", mid);
    }

    #[test]
    fn test_silence_descriptors_are_zero() {
        let signal = vec![0.0f32; 22050];
        let spec = Spectrogram::compute(&signal, 22050, 2048, 512).unwrap();
        assert!(spec.centroid().iter().all(|&c| c == 0.0));
        assert!(spec.rolloff().iter().all(|&r| r == 0.0));
        assert!(spec.chroma().iter().all(|c| c.iter().all(|&v| v == 0.0)));
    }

    #[test]
    fn test_chroma_peaks_at_a() {
        let signal = sine(440.0, 22050, 1.0);
        let spec = Spectrogram::compute(&signal, 22050, 2048, 512).unwrap();
        let chroma = spec.chroma();
        let frame = chroma[chroma.len() / 2];
        let argmax = frame
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i);
        assert_eq!(argmax, Some(9));
        assert!((frame[9] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_contrast_rows() {
        let signal = sine(440.0, 22050, 1.0);
        let spec = Spectrogram::compute(&signal, 22050, 2048, 512).unwrap();
        let contrast = spec.contrast(6);
        assert_eq!(contrast[0].len(), 7);
        assert!(contrast.iter().flatten().all(|v| v.is_finite()));
    }

    #[test]
    fn test_dct_of_constant_has_only_dc() {
        let coeffs = dct_ortho(&[2.0; 8], 4);
        assert!((coeffs[0] - 2.0 * 8f64.sqrt()).abs() < 1e-9);
        for c in &coeffs[1..] {
            assert!(c.abs() < 1e-9);
        }
    }

    #[test]
    fn test_power_to_db_clamps_range() {
        let db = power_to_db(&[vec![1.0, 1e-20]]);
        assert_eq!(db[0][0], 0.0);
        assert_eq!(db[0][1], -80.0);
    }

    #[test]
    fn test_mel_filterbank_shape() {
        let fb = MelFilterbank::new(128, 2048, 22050);
        assert_eq!(fb.n_mels(), 128);
        let energies = fb.apply_power(&vec![1.0; 1025]);
        assert!(energies.iter().all(|e| *e >= 0.0));
    }

    #[test]
    fn test_zcr_alternating_signal() {
        let signal: Vec<f32> = (0..4096).map(|i| if i % 2 == 0 { 1.0 } else { -1.0 }).collect();
        let zcr = zero_crossing_rate(&signal, 2048, 512);
        let mid = zcr[zcr.len() / 2];
        assert!(mid > 0.99, "zcr {}", mid);

        let dc = zero_crossing_rate(&vec![0.5f32; 4096], 2048, 512);
        assert!(dc.iter().all(|&z| z == 0.0));
    }
}
