//! Short-time Fourier analysis shared by the feature extractor.
//!
//! Frames are centered: the signal is zero padded by `n_fft / 2` on both
//! sides before framing, so frame `m` is centered on sample `m * hop`.

use ndarray::Array2;
use num_complex::Complex;
use rustfft::FftPlanner;

/// FFT size used for every analysis in the extractor
pub const N_FFT: usize = 2048;
/// Hop between consecutive analysis frames
pub const HOP: usize = 512;

/// Periodic Hann window of length `n`
pub fn hann(n: usize) -> Vec<f64> {
    (0..n)
        .map(|i| 0.5 - 0.5 * (2.0 * std::f64::consts::PI * i as f64 / n as f64).cos())
        .collect()
}

/// Center frequency in Hz of each of the `n_fft / 2 + 1` STFT bins
pub fn fft_frequencies(sample_rate: u32, n_fft: usize) -> Vec<f64> {
    let bin_hz = sample_rate as f64 / n_fft as f64;
    (0..=n_fft / 2).map(|k| k as f64 * bin_hz).collect()
}

fn frame_count(len: usize, hop: usize) -> usize {
    // padded length is len + n_fft, never shorter than one frame
    1 + len / hop
}

/// Complex STFT, shape `(n_fft / 2 + 1, frames)`
pub fn stft(signal: &[f64], n_fft: usize, hop: usize) -> Array2<Complex<f64>> {
    let pad = n_fft / 2;
    let frames = frame_count(signal.len(), hop);
    let bins = n_fft / 2 + 1;
    let window = hann(n_fft);

    let mut padded = vec![0.0f64; signal.len() + 2 * pad];
    padded[pad..pad + signal.len()].copy_from_slice(signal);

    let mut planner = FftPlanner::<f64>::new();
    let fft = planner.plan_fft_forward(n_fft);
    let mut buffer = vec![Complex::new(0.0, 0.0); n_fft];
    let mut out = Array2::<Complex<f64>>::zeros((bins, frames));

    for m in 0..frames {
        let start = m * hop;
        for (i, slot) in buffer.iter_mut().enumerate() {
            let s = padded.get(start + i).copied().unwrap_or(0.0);
            *slot = Complex::new(s * window[i], 0.0);
        }
        fft.process(&mut buffer);
        for k in 0..bins {
            out[[k, m]] = buffer[k];
        }
    }
    out
}

/// Magnitude STFT, shape `(n_fft / 2 + 1, frames)`
pub fn magnitude(signal: &[f64], n_fft: usize, hop: usize) -> Array2<f64> {
    stft(signal, n_fft, hop).mapv(|c| c.norm())
}

/// Inverse of [`stft`] by weighted overlap-add, trimmed to `length` samples.
pub fn istft(spec: &Array2<Complex<f64>>, n_fft: usize, hop: usize, length: usize) -> Vec<f64> {
    let (bins, frames) = spec.dim();
    let pad = n_fft / 2;
    let window = hann(n_fft);
    let total = n_fft + hop * frames.saturating_sub(1);

    let mut planner = FftPlanner::<f64>::new();
    let ifft = planner.plan_fft_inverse(n_fft);
    let mut buffer = vec![Complex::new(0.0, 0.0); n_fft];
    let mut y = vec![0.0f64; total];
    let mut win_sq = vec![0.0f64; total];

    for m in 0..frames {
        // rebuild the full spectrum from the one-sided bins
        for k in 0..n_fft {
            buffer[k] = if k < bins {
                spec[[k, m]]
            } else {
                spec[[n_fft - k, m]].conj()
            };
        }
        buffer[0].im = 0.0;
        if n_fft % 2 == 0 {
            buffer[n_fft / 2].im = 0.0;
        }
        ifft.process(&mut buffer);

        let start = m * hop;
        for i in 0..n_fft {
            let s = buffer[i].re / n_fft as f64;
            y[start + i] += s * window[i];
            win_sq[start + i] += window[i] * window[i];
        }
    }

    for (v, w) in y.iter_mut().zip(&win_sq) {
        if *w > f64::MIN_POSITIVE {
            *v /= *w;
        }
    }

    let mut out: Vec<f64> = y.into_iter().skip(pad).take(length).collect();
    out.resize(length, 0.0);
    out
}
