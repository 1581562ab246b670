//! Mel spectrogram frames and cepstral coefficients.

use mel_spec::prelude::*;
use ndarray::Array1;
use num_complex::Complex;

/// Number of mel bands fed into the DCT
pub const N_MELS: usize = 128;
/// Cepstral coefficients kept per frame
pub const N_CEPSTRA: usize = 13;
/// Substitute for non-finite log-mel values (silent bands)
const LOG_MEL_FLOOR: f64 = -10.0;

/// Compute log-mel frames from audio, one frame per `hop_size` samples.
///
/// Frames that the STFT cannot produce yet (warm-up) are skipped.
pub fn audio_to_mel(
    samples: &[f32],
    sample_rate: f32,
    frame_size: usize,
    hop_size: usize,
    n_mels: usize,
) -> Vec<Vec<f64>> {
    let mut stft = Spectrogram::new(frame_size, hop_size);
    let mut mel = MelSpectrogram::new(frame_size, sample_rate as f64, n_mels);

    let mut frames: Vec<Vec<f64>> = Vec::new();
    let mut offset = 0usize;
    while offset + hop_size <= samples.len() {
        let slice = &samples[offset..offset + hop_size];

        if let Some(fft_frame) = stft.add(slice) {
            let arr_f64: Array1<Complex<f64>> =
                Array1::from_iter(fft_frame.into_iter().map(|c: Complex<f64>| c));
            let (flat, _off) = mel.add(&arr_f64).into_raw_vec_and_offset();
            let frame = flat
                .into_iter()
                .map(|v| if v.is_finite() { v } else { LOG_MEL_FLOOR })
                .collect();
            frames.push(frame);
        }
        offset += hop_size;
    }

    frames
}

/// Orthonormal DCT-II of `input`, first `n_out` coefficients.
pub fn dct_ii(input: &[f64], n_out: usize) -> Vec<f64> {
    let n = input.len();
    if n == 0 {
        return vec![0.0; n_out];
    }
    let nf = n as f64;
    (0..n_out)
        .map(|k| {
            let sum: f64 = input
                .iter()
                .enumerate()
                .map(|(i, &x)| {
                    x * (std::f64::consts::PI * k as f64 * (2.0 * i as f64 + 1.0) / (2.0 * nf)).cos()
                })
                .sum();
            let scale = if k == 0 { (1.0 / nf).sqrt() } else { (2.0 / nf).sqrt() };
            scale * sum
        })
        .collect()
}

/// Per-frame cepstra averaged over time. `None` when no frame was produced.
pub fn cepstral_means(
    samples: &[f32],
    sample_rate: u32,
    frame_size: usize,
    hop_size: usize,
) -> Option<Vec<f64>> {
    // pad so that short clips still yield at least one full analysis frame
    let mut padded = samples.to_vec();
    let min_len = 2 * frame_size;
    if padded.len() < min_len {
        padded.resize(min_len, 0.0);
    }

    let frames = audio_to_mel(&padded, sample_rate as f32, frame_size, hop_size, N_MELS);
    if frames.is_empty() {
        return None;
    }

    let mut sums = vec![0.0f64; N_CEPSTRA];
    for frame in &frames {
        for (acc, c) in sums.iter_mut().zip(dct_ii(frame, N_CEPSTRA)) {
            *acc += c;
        }
    }
    let count = frames.len() as f64;
    Some(sums.into_iter().map(|s| s / count).collect())
}
