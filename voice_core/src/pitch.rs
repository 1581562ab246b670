//! Parabolic-interpolated peak picking over a magnitude spectrogram.

use ndarray::Array2;

use crate::spectrum::fft_frequencies;
use crate::stats;

/// Lowest frequency considered a pitch candidate
pub const PITCH_FMIN_HZ: f64 = 150.0;
/// Upper bound (exclusive) for pitch candidates, capped at Nyquist
pub const PITCH_FMAX_HZ: f64 = 4000.0;
/// Candidates must exceed this fraction of their frame's maximum
pub const PEAK_THRESHOLD: f64 = 0.1;
/// Only candidates louder than this percentile of all magnitudes vote on f0
pub const MAGNITUDE_PERCENTILE: f64 = 90.0;

/// Pitch and magnitude matrices, both shaped like the input spectrogram.
/// Non-candidate cells are zero in both.
#[derive(Debug, Clone)]
pub struct PitchTrack {
    pub pitches: Array2<f64>,
    pub magnitudes: Array2<f64>,
}

/// Track pitch candidates in a `(bins, frames)` magnitude spectrogram.
pub fn piptrack(spec: &Array2<f64>, sample_rate: u32, n_fft: usize) -> PitchTrack {
    let (bins, frames) = spec.dim();
    let freqs = fft_frequencies(sample_rate, n_fft);
    let fmax = PITCH_FMAX_HZ.min(sample_rate as f64 / 2.0);

    let mut pitches = Array2::<f64>::zeros((bins, frames));
    let mut magnitudes = Array2::<f64>::zeros((bins, frames));

    for m in 0..frames {
        let frame = spec.column(m);
        let frame_max = frame.iter().cloned().fold(0.0f64, f64::max);
        let floor = PEAK_THRESHOLD * frame_max;
        let gated = |k: usize| if frame[k] > floor { frame[k] } else { 0.0 };

        for k in 1..bins.saturating_sub(1) {
            if freqs[k] < PITCH_FMIN_HZ || freqs[k] >= fmax {
                continue;
            }
            let (left, here, right) = (gated(k - 1), gated(k), gated(k + 1));
            if !(here > left && here >= right) {
                continue;
            }

            let avg = 0.5 * (frame[k + 1] - frame[k - 1]);
            let curvature = 2.0 * frame[k] - frame[k + 1] - frame[k - 1];
            let shift = if curvature.abs() < f64::MIN_POSITIVE {
                avg
            } else {
                avg / curvature
            };

            pitches[[k, m]] = (k as f64 + shift) * sample_rate as f64 / n_fft as f64;
            magnitudes[[k, m]] = frame[k] + 0.5 * avg * shift;
        }
    }

    PitchTrack {
        pitches,
        magnitudes,
    }
}

/// Median pitch of the strongest candidates, `None` when nothing qualifies.
pub fn fundamental(track: &PitchTrack) -> Option<f64> {
    let all: Vec<f64> = track.magnitudes.iter().copied().collect();
    let cutoff = stats::percentile(&all, MAGNITUDE_PERCENTILE)?;

    let voted: Vec<f64> = track
        .pitches
        .iter()
        .zip(track.magnitudes.iter())
        .filter(|(_, &mag)| mag > cutoff)
        .map(|(&p, _)| p)
        .collect();
    stats::median(&voted)
}
