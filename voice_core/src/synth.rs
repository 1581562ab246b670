//! Additive harmonic synthesis driven by a [`FeatureRecord`].

use std::f64::consts::TAU;

use thiserror::Error;
use tracing::{info, warn};

use crate::features::{FeatureRecord, DEFAULT_FORMANTS_HZ, DEFAULT_FUNDAMENTAL_HZ};

/// Estimated speaking time per word
pub const SECONDS_PER_WORD: f64 = 0.5;
/// Peak absolute amplitude after normalization
pub const TARGET_PEAK: f32 = 0.8;

const FUNDAMENTAL_GAIN: f64 = 0.3;
const HARMONIC_GAIN: f64 = 0.1;
const FORMANT_GAIN: f64 = 0.05;
const JITTER_DEPTH: f64 = 0.02;
const JITTER_RATE_HZ: f64 = 5.0;
const FALLBACK_GAIN: f64 = 0.3;

#[derive(Debug, Error, PartialEq)]
pub enum SynthesisError {
    #[error("fundamental frequency must be finite and positive, got {0}")]
    InvalidFundamental(f64),

    #[error("formant frequency must be finite, got {0}")]
    InvalidFormant(f64),

    #[error("synthesized waveform contains non-finite samples")]
    NonFiniteOutput,
}

/// A rendered waveform and its nominal duration
#[derive(Debug, Clone)]
pub struct Synthesis {
    pub samples: Vec<f32>,
    pub duration_secs: f64,
}

pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Duration in seconds and sample count estimated from the word count
pub fn estimate_length(text: &str, sample_rate: u32) -> (f64, usize) {
    let duration = word_count(text) as f64 * SECONDS_PER_WORD;
    let samples = (duration * sample_rate as f64).round() as usize;
    (duration, samples)
}

/// `n` evenly spaced points covering `[0, duration]`, both ends included
fn time_axis(n: usize, duration: f64) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![0.0],
        _ => {
            let step = duration / (n - 1) as f64;
            (0..n).map(|i| i as f64 * step).collect()
        }
    }
}

/// Render `text` with the given voice characteristics.
///
/// Missing characteristics fall back to a 150 Hz voice with formants at
/// 800, 1200 and 2400 Hz. Rendering failures degrade to a plain 150 Hz
/// tone of the same duration instead of propagating.
pub fn synthesize(text: &str, features: Option<&FeatureRecord>, sample_rate: u32) -> Synthesis {
    let (duration_secs, sample_count) = estimate_length(text, sample_rate);
    if sample_count == 0 {
        return Synthesis {
            samples: Vec::new(),
            duration_secs,
        };
    }

    let t = time_axis(sample_count, duration_secs);
    let samples = match render(&t, duration_secs, features, sample_rate) {
        Ok(samples) => {
            info!(samples = samples.len(), duration_secs, "generated speech");
            samples
        }
        Err(e) => {
            warn!(stage = "synthesis", error = %e, "falling back to default tone");
            fallback_tone(&t)
        }
    };

    Synthesis {
        samples,
        duration_secs,
    }
}

fn render(
    t: &[f64],
    duration: f64,
    features: Option<&FeatureRecord>,
    sample_rate: u32,
) -> Result<Vec<f32>, SynthesisError> {
    let f0 = features
        .map(|f| f.fundamental_freq_hz)
        .unwrap_or(DEFAULT_FUNDAMENTAL_HZ);
    if !f0.is_finite() || f0 <= 0.0 {
        return Err(SynthesisError::InvalidFundamental(f0));
    }

    let formants: &[f64] = match features {
        Some(f) if !f.formant_freqs_hz.is_empty() => f.formant_freqs_hz.as_slice(),
        _ => &DEFAULT_FORMANTS_HZ[..],
    };
    if let Some(&bad) = formants.iter().find(|f| !f.is_finite()) {
        return Err(SynthesisError::InvalidFormant(bad));
    }

    let mut audio: Vec<f64> = t
        .iter()
        .map(|&t| {
            let mut v = FUNDAMENTAL_GAIN * (TAU * f0 * t).sin();
            for i in 2..=5 {
                let i = i as f64;
                v += HARMONIC_GAIN / i * (TAU * f0 * i * t).sin();
            }
            for &formant in formants {
                v += FORMANT_GAIN * (TAU * formant * t).sin();
            }
            v * (-t / duration).exp()
        })
        .collect();

    normalize(&mut audio, TARGET_PEAK as f64);

    for (i, v) in audio.iter_mut().enumerate() {
        *v *= 1.0 + JITTER_DEPTH * (TAU * JITTER_RATE_HZ * i as f64 / sample_rate as f64).sin();
    }

    if audio.iter().any(|v| !v.is_finite()) {
        return Err(SynthesisError::NonFiniteOutput);
    }
    Ok(audio.into_iter().map(|v| v as f32).collect())
}

/// Scale so the peak absolute value equals `peak`; silent input is left as is.
pub fn normalize(audio: &mut [f64], peak: f64) {
    let max = audio.iter().fold(0.0f64, |m, v| m.max(v.abs()));
    if max > 0.0 && max.is_finite() {
        let gain = peak / max;
        audio.iter_mut().for_each(|v| *v *= gain);
    }
}

fn fallback_tone(t: &[f64]) -> Vec<f32> {
    t.iter()
        .map(|&t| (FALLBACK_GAIN * (TAU * DEFAULT_FUNDAMENTAL_HZ * t).sin()) as f32)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SR: u32 = 22050;

    fn peak(samples: &[f32]) -> f32 {
        samples.iter().fold(0.0f32, |m, v| m.max(v.abs()))
    }

    #[test]
    fn test_duration_follows_word_count() {
        for (text, words) in [("one", 1), ("Hello Nicolette", 2), ("a b  c\td\ne", 5)] {
            let out = synthesize(text, None, SR);
            let expected = words as f64 * SECONDS_PER_WORD;
            assert!((out.duration_secs - expected).abs() < 1e-12);
            assert_eq!(out.samples.len(), (expected * SR as f64).round() as usize);
        }
    }

    #[test]
    fn test_hello_nicolette_is_one_second() {
        let out = synthesize("Hello Nicolette", None, SR);
        assert_eq!(out.duration_secs, 1.0);
        assert_eq!(out.samples.len(), 22050);
    }

    #[test]
    fn test_empty_text_yields_empty_waveform() {
        let out = synthesize("   ", None, SR);
        assert_eq!(out.duration_secs, 0.0);
        assert!(out.samples.is_empty());
    }

    #[test]
    fn test_peak_is_normalized_within_jitter_band() {
        let features = FeatureRecord {
            fundamental_freq_hz: 120.0,
            formant_freqs_hz: vec![700.0, 1100.0, 2500.0],
            cepstral_means: vec![0.0; 13],
            spectral_centroid_mean: 900.0,
            duration_secs: 3.0,
        };
        let out = synthesize("the quick brown fox", Some(&features), SR);
        let p = peak(&out.samples);
        let jitter = (TARGET_PEAK as f64 * JITTER_DEPTH) as f32;
        assert!(p >= TARGET_PEAK - jitter - 1e-4 && p <= TARGET_PEAK + jitter + 1e-4, "peak {p}");
    }

    #[test]
    fn test_normalize_hits_exact_peak() {
        let mut audio = vec![0.1, -0.5, 0.25];
        normalize(&mut audio, 0.8);
        assert!((audio[1] + 0.8).abs() < 1e-12);
        let mut silent = vec![0.0; 4];
        normalize(&mut silent, 0.8);
        assert!(silent.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_invalid_fundamental_falls_back_to_tone() {
        let mut features = FeatureRecord::fallback(1.0);
        features.fundamental_freq_hz = f64::NAN;
        let out = synthesize("two words", Some(&features), SR);
        assert_eq!(out.samples.len(), 22050);
        assert!((peak(&out.samples) - 0.3).abs() < 1e-3);
    }

    #[test]
    fn test_empty_formants_use_defaults() {
        let mut features = FeatureRecord::fallback(1.0);
        features.formant_freqs_hz.clear();
        let with_empty = synthesize("hi there", Some(&features), SR);
        let with_defaults = synthesize("hi there", None, SR);
        assert_eq!(with_empty.samples, with_defaults.samples);
    }

    #[test]
    fn test_time_axis_includes_endpoints() {
        let t = time_axis(5, 2.0);
        assert_eq!(t, vec![0.0, 0.5, 1.0, 1.5, 2.0]);
        assert_eq!(time_axis(1, 2.0), vec![0.0]);
    }
}
