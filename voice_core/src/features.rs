//! Voice characteristics measured from a reference waveform.

use ndarray::Axis;
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use crate::spectrum::{fft_frequencies, magnitude, HOP, N_FFT};
use crate::{hpss, mel, pitch, stats};

/// Fundamental used whenever no pitch can be measured
pub const DEFAULT_FUNDAMENTAL_HZ: f64 = 150.0;
/// Formants used whenever none are available
pub const DEFAULT_FORMANTS_HZ: [f64; 3] = [800.0, 1200.0, 2400.0];
/// Number of spectral peaks reported as formants
pub const FORMANT_COUNT: usize = 3;

#[derive(Debug, Error, PartialEq)]
pub enum ExtractionError {
    #[error("reference waveform is empty")]
    EmptyWaveform,

    #[error("invalid sample rate: {0}")]
    InvalidSampleRate(u32),

    #[error("no cepstral frames could be computed")]
    NoCepstralFrames,
}

/// Coarse acoustic summary of a reference recording
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureRecord {
    pub fundamental_freq_hz: f64,
    pub formant_freqs_hz: Vec<f64>,
    pub cepstral_means: Vec<f64>,
    pub spectral_centroid_mean: f64,
    pub duration_secs: f64,
}

impl FeatureRecord {
    /// Default characteristics for a reference that could not be analysed
    pub fn fallback(duration_secs: f64) -> Self {
        Self {
            fundamental_freq_hz: DEFAULT_FUNDAMENTAL_HZ,
            formant_freqs_hz: DEFAULT_FORMANTS_HZ.to_vec(),
            cepstral_means: vec![0.0; mel::N_CEPSTRA],
            spectral_centroid_mean: 0.0,
            duration_secs,
        }
    }
}

/// Derive a [`FeatureRecord`] from a mono waveform.
pub fn extract(samples: &[f32], sample_rate: u32) -> Result<FeatureRecord, ExtractionError> {
    if sample_rate == 0 {
        return Err(ExtractionError::InvalidSampleRate(sample_rate));
    }
    if samples.is_empty() {
        return Err(ExtractionError::EmptyWaveform);
    }

    let signal: Vec<f64> = samples.iter().map(|&s| s as f64).collect();
    let spec = magnitude(&signal, N_FFT, HOP);
    let freqs = fft_frequencies(sample_rate, N_FFT);

    let track = pitch::piptrack(&spec, sample_rate, N_FFT);
    let fundamental_freq_hz = pitch::fundamental(&track).unwrap_or(DEFAULT_FUNDAMENTAL_HZ);

    let formant_freqs_hz = formants(&spec, &freqs);

    let cepstral_means = mel::cepstral_means(samples, sample_rate, N_FFT, HOP)
        .ok_or(ExtractionError::NoCepstralFrames)?;

    let centroids: Vec<f64> = spec
        .axis_iter(Axis(1))
        .map(|frame| {
            let total: f64 = frame.sum();
            if total <= f64::MIN_POSITIVE {
                0.0
            } else {
                frame.iter().zip(&freqs).map(|(s, f)| s * f).sum::<f64>() / total
            }
        })
        .collect();
    let spectral_centroid_mean = stats::mean(&centroids).unwrap_or(0.0);

    let record = FeatureRecord {
        fundamental_freq_hz,
        formant_freqs_hz,
        cepstral_means,
        spectral_centroid_mean,
        duration_secs: samples.len() as f64 / sample_rate as f64,
    };
    debug!(?record, "extracted voice characteristics");
    Ok(record)
}

/// Frequencies of the strongest bins of the harmonic part of the
/// time-averaged spectrum, weakest of the three first.
fn formants(spec: &ndarray::Array2<f64>, freqs: &[f64]) -> Vec<f64> {
    let envelope = match spec.mean_axis(Axis(1)) {
        Some(env) => env.to_vec(),
        None => return DEFAULT_FORMANTS_HZ.to_vec(),
    };
    let peaks = hpss::harmonic(&envelope);

    let mut order: Vec<usize> = (0..peaks.len()).collect();
    order.sort_by(|&a, &b| peaks[a].total_cmp(&peaks[b]));
    order
        .iter()
        .skip(order.len().saturating_sub(FORMANT_COUNT))
        .map(|&k| freqs[k])
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tone(freq: f32, secs: f32, sr: u32) -> Vec<f32> {
        let n = (secs * sr as f32) as usize;
        (0..n)
            .map(|i| 0.3 * (2.0 * std::f32::consts::PI * freq * i as f32 / sr as f32).sin())
            .collect()
    }

    #[test]
    fn test_extract_pure_150hz_tone() {
        let record = extract(&tone(150.0, 3.0, 22050), 22050).unwrap();
        assert!(
            (record.fundamental_freq_hz - 150.0).abs() < 10.0,
            "f0 = {}",
            record.fundamental_freq_hz
        );
        assert_eq!(record.formant_freqs_hz.len(), FORMANT_COUNT);
        assert_eq!(record.cepstral_means.len(), mel::N_CEPSTRA);
        assert!((record.duration_secs - 3.0).abs() < 1e-9);
        assert!(record.spectral_centroid_mean > 0.0);
    }

    #[test]
    fn test_duration_matches_sample_count() {
        let samples = tone(300.0, 0.75, 22050);
        let record = extract(&samples, 22050).unwrap();
        assert_eq!(record.duration_secs, samples.len() as f64 / 22050.0);
    }

    #[test]
    fn test_empty_waveform_is_an_error() {
        assert_eq!(extract(&[], 22050), Err(ExtractionError::EmptyWaveform));
    }

    #[test]
    fn test_zero_sample_rate_is_an_error() {
        assert_eq!(
            extract(&[0.1, 0.2], 0),
            Err(ExtractionError::InvalidSampleRate(0))
        );
    }

    #[test]
    fn test_silence_defaults_fundamental() {
        let record = extract(&vec![0.0; 22050], 22050).unwrap();
        assert_eq!(record.fundamental_freq_hz, DEFAULT_FUNDAMENTAL_HZ);
        assert_eq!(record.spectral_centroid_mean, 0.0);
    }

    #[test]
    fn test_fallback_record() {
        let record = FeatureRecord::fallback(2.0);
        assert_eq!(record.fundamental_freq_hz, 150.0);
        assert_eq!(record.formant_freqs_hz, vec![800.0, 1200.0, 2400.0]);
        assert_eq!(record.duration_secs, 2.0);
    }
}
