//! Global tempo estimate from onset strength autocorrelation

/// Tempo search range (BPM)
const MIN_BPM: f64 = 30.0;
const MAX_BPM: f64 = 300.0;

/// Center of the log-normal tempo prior
const PRIOR_BPM: f64 = 120.0;

/// Width of the prior in octaves
const PRIOR_OCTAVES: f64 = 1.0;

/// Onset strength per frame: mean positive change across mel bands (dB)
pub fn onset_envelope(mel_db: &[Vec<f64>]) -> Vec<f64> {
    let mut envelope = Vec::with_capacity(mel_db.len());
    if mel_db.is_empty() {
        return envelope;
    }
    envelope.push(0.0);
    for pair in mel_db.windows(2) {
        let (prev, cur) = (&pair[0], &pair[1]);
        let bands = cur.len().max(1) as f64;
        let flux: f64 = cur
            .iter()
            .zip(prev)
            .map(|(c, p)| (c - p).max(0.0))
            .sum();
        envelope.push(flux / bands);
    }
    envelope
}

/// Estimate tempo in BPM, or 0.0 when the envelope has no periodicity
pub fn estimate_tempo(envelope: &[f64], frame_rate: f64) -> f64 {
    if envelope.len() < 4 || frame_rate <= 0.0 {
        return 0.0;
    }

    let mean = envelope.iter().sum::<f64>() / envelope.len() as f64;
    let centered: Vec<f64> = envelope.iter().map(|v| v - mean).collect();

    let min_lag = ((60.0 * frame_rate / MAX_BPM).floor() as usize).max(1);
    let max_lag = ((60.0 * frame_rate / MIN_BPM).ceil() as usize).min(centered.len() - 1);
    if min_lag > max_lag {
        return 0.0;
    }

    let mut best: Option<(usize, f64)> = None;
    for lag in min_lag..=max_lag {
        let ac: f64 = centered
            .iter()
            .zip(&centered[lag..])
            .map(|(a, b)| a * b)
            .sum();
        if ac <= 0.0 {
            continue;
        }

        let bpm = 60.0 * frame_rate / lag as f64;
        let octaves = (bpm / PRIOR_BPM).log2() / PRIOR_OCTAVES;
        let score = ac * (-0.5 * octaves * octaves).exp();

        // Strict comparison keeps the shortest lag on ties
        if best.map_or(true, |(_, s)| score > s) {
            best = Some((lag, score));
        }
    }

    best.map_or(0.0, |(lag, _)| 60.0 * frame_rate / lag as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flat_envelope_has_no_tempo() {
        assert_eq!(estimate_tempo(&[1.0; 500], 43.066), 0.0);
        assert_eq!(estimate_tempo(&[], 43.066), 0.0);
    }

    #[test]
    fn test_impulse_train_tempo() {
        // Impulse every 21 frames at ~43 frames/s ≈ 123 BPM
        let frame_rate = 22050.0 / 512.0;
        let envelope: Vec<f64> = (0..1000).map(|i| if i % 21 == 0 { 1.0 } else { 0.0 }).collect();
        let bpm = estimate_tempo(&envelope, frame_rate);
        let expected = 60.0 * frame_rate / 21.0;
        assert!((bpm - expected).abs() < 1e-9, "bpm {}", bpm);
    }

    #[test]
    fn test_onset_envelope_ignores_decreases() {
        let mel_db = vec![vec![0.0, 0.0], vec![10.0, -10.0], vec![0.0, 0.0]];
        let env = onset_envelope(&mel_db);
        assert_eq!(env, vec![0.0, 5.0, 5.0]);
    }
}
