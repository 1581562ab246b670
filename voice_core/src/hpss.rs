//! Median-filtering harmonic/percussive separation.
//!
//! The input is treated as a time signal: it is transformed with the
//! analysis STFT, the magnitude is median filtered across time (harmonic)
//! and across frequency (percussive), and a soft mask built from the two
//! filtered magnitudes is applied before resynthesis.

use ndarray::{Array2, Axis};

use crate::spectrum::{istft, stft, HOP, N_FFT};
use crate::stats::median_in_place;

/// Width of both median filters
pub const KERNEL: usize = 31;
/// Exponent of the soft mask
const MASK_POWER: i32 = 2;

/// Index into `0..len` with half-sample symmetric reflection at both ends.
fn reflect(index: isize, len: usize) -> usize {
    let len = len as isize;
    let period = 2 * len;
    let mut i = index.rem_euclid(period);
    if i >= len {
        i = period - 1 - i;
    }
    i as usize
}

/// Median filter along one axis of a 2-D array, reflect boundary.
fn median_filter(input: &Array2<f64>, axis: Axis, kernel: usize) -> Array2<f64> {
    let mut out = Array2::<f64>::zeros(input.dim());
    let half = (kernel / 2) as isize;
    let mut window = vec![0.0f64; kernel];

    for (lane_in, mut lane_out) in input.lanes(axis).into_iter().zip(out.lanes_mut(axis)) {
        let n = lane_in.len();
        for i in 0..n {
            for (j, slot) in window.iter_mut().enumerate() {
                let src = reflect(i as isize + j as isize - half, n);
                *slot = lane_in[src];
            }
            lane_out[i] = median_in_place(&mut window);
        }
    }
    out
}

/// Soft mask `x^p / (x^p + r^p)`, zero where both are (near) zero.
fn softmask(x: f64, reference: f64) -> f64 {
    let z = x.max(reference);
    if z <= f64::MIN_POSITIVE {
        return 0.0;
    }
    let m = (x / z).powi(MASK_POWER);
    let r = (reference / z).powi(MASK_POWER);
    m / (m + r)
}

/// Harmonic component of `signal`, same length as the input.
pub fn harmonic(signal: &[f64]) -> Vec<f64> {
    let spec = stft(signal, N_FFT, HOP);
    let mag = spec.mapv(|c| c.norm());

    // frequency is axis 0, time is axis 1
    let harm = median_filter(&mag, Axis(1), KERNEL);
    let perc = median_filter(&mag, Axis(0), KERNEL);

    let mut masked = spec;
    for ((c, &h), &p) in masked.iter_mut().zip(harm.iter()).zip(perc.iter()) {
        *c *= softmask(h, p);
    }
    istft(&masked, N_FFT, HOP, signal.len())
}
