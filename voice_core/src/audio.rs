//! WAV decoding/encoding and sample-rate conversion.

use std::fs::File;
use std::io::{BufWriter, Cursor, Seek, Write};
use std::path::Path;

use thiserror::Error;
use tracing::warn;

/// Length of the synthetic reference used when no recording is available
pub const PLACEHOLDER_SECS: f64 = 3.0;
/// Frequency of the synthetic reference
pub const PLACEHOLDER_HZ: f64 = 150.0;
const PLACEHOLDER_GAIN: f64 = 0.3;

/// Lowest source rate accepted for a reference recording
pub const MIN_SOURCE_RATE: u32 = 1000;
/// Longest reference recording accepted, in seconds
pub const MAX_REFERENCE_SECS: f64 = 120.0;

#[derive(Debug, Error)]
pub enum AudioError {
    #[error("could not decode WAV data: {0}")]
    Decode(#[from] hound::Error),

    #[error("unsupported sample format: {bits}-bit {format}")]
    UnsupportedFormat { bits: u16, format: &'static str },

    #[error("WAV data declares zero channels")]
    NoChannels,

    #[error("unsupported sample rate {0} Hz (minimum {min} Hz)", min = MIN_SOURCE_RATE)]
    UnsupportedSampleRate(u32),

    #[error("reference is {secs:.1} s long (maximum {max} s)", max = MAX_REFERENCE_SECS)]
    ReferenceTooLong { secs: f64 },

    #[error("could not write WAV file: {0}")]
    Write(hound::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Mono samples and the rate they were recorded at
#[derive(Debug, Clone)]
pub struct DecodedAudio {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl DecodedAudio {
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            0.0
        } else {
            self.samples.len() as f64 / self.sample_rate as f64
        }
    }
}

/// Decode an in-memory WAV file, averaging all channels down to mono.
pub fn decode_wav(bytes: &[u8]) -> Result<DecodedAudio, AudioError> {
    let mut reader = hound::WavReader::new(Cursor::new(bytes))?;
    let spec = reader.spec();
    if spec.channels == 0 {
        return Err(AudioError::NoChannels);
    }

    let interleaved: Vec<f32> = match (spec.sample_format, spec.bits_per_sample) {
        (hound::SampleFormat::Float, 32) => reader.samples::<f32>().collect::<Result<_, _>>()?,
        (hound::SampleFormat::Int, bits @ 8..=32) => {
            let scale = (1i64 << (bits - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<Result<_, _>>()?
        }
        (hound::SampleFormat::Float, bits) => {
            return Err(AudioError::UnsupportedFormat {
                bits,
                format: "float",
            })
        }
        (hound::SampleFormat::Int, bits) => {
            return Err(AudioError::UnsupportedFormat {
                bits,
                format: "integer",
            })
        }
    };

    let channels = spec.channels as usize;
    let samples = if channels > 1 {
        interleaved
            .chunks_exact(channels)
            .map(|frame| frame.iter().sum::<f32>() / channels as f32)
            .collect()
    } else {
        interleaved
    };

    Ok(DecodedAudio {
        samples,
        sample_rate: spec.sample_rate,
    })
}

/// Resample with windowed sinc interpolation, falling back to linear
/// interpolation if the resampler cannot be built or run.
pub fn resample(samples: &[f32], src_rate: u32, target_rate: u32) -> Vec<f32> {
    if src_rate == target_rate || samples.is_empty() || src_rate == 0 {
        return samples.to_vec();
    }

    use rubato::{
        Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
    };

    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Cubic,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };
    let ratio = target_rate as f64 / src_rate as f64;

    let mut resampler = match SincFixedIn::<f32>::new(ratio, 2.0, params, samples.len(), 1) {
        Ok(r) => r,
        Err(e) => {
            warn!(error = %e, "sinc resampler unavailable, using linear interpolation");
            return resample_linear(samples, src_rate, target_rate);
        }
    };

    let input = vec![samples.to_vec()];
    match resampler.process(&input, None) {
        Ok(mut output) if !output.is_empty() => output.swap_remove(0),
        Ok(_) => resample_linear(samples, src_rate, target_rate),
        Err(e) => {
            warn!(error = %e, "sinc resampling failed, using linear interpolation");
            resample_linear(samples, src_rate, target_rate)
        }
    }
}

fn resample_linear(samples: &[f32], src_rate: u32, target_rate: u32) -> Vec<f32> {
    let ratio = src_rate as f64 / target_rate as f64;
    let out_len = (samples.len() as f64 / ratio).ceil() as usize;
    let last = samples.len() - 1;

    (0..out_len)
        .map(|i| {
            let pos = i as f64 * ratio;
            let idx = (pos.floor() as usize).min(last);
            let next = (idx + 1).min(last);
            let frac = (pos - idx as f64).clamp(0.0, 1.0) as f32;
            samples[idx] * (1.0 - frac) + samples[next] * frac
        })
        .collect()
}

/// Decode uploaded audio and bring it to `target_rate` mono.
///
/// The source rate and duration are checked before resampling so the
/// converted buffer stays bounded.
pub fn load_reference(bytes: &[u8], target_rate: u32) -> Result<Vec<f32>, AudioError> {
    let decoded = decode_wav(bytes)?;
    if decoded.sample_rate < MIN_SOURCE_RATE {
        return Err(AudioError::UnsupportedSampleRate(decoded.sample_rate));
    }
    let secs = decoded.duration_secs();
    if secs > MAX_REFERENCE_SECS {
        return Err(AudioError::ReferenceTooLong { secs });
    }
    Ok(resample(&decoded.samples, decoded.sample_rate, target_rate))
}

/// Read a reference recording from disk at `target_rate` mono.
pub fn load_reference_file<P: AsRef<Path>>(
    path: P,
    target_rate: u32,
) -> Result<Vec<f32>, AudioError> {
    let bytes = std::fs::read(path.as_ref())?;
    load_reference(&bytes, target_rate)
}

/// Stand-in reference: a steady 150 Hz tone, endpoints included.
pub fn placeholder_tone(sample_rate: u32) -> Vec<f32> {
    let n = (sample_rate as f64 * PLACEHOLDER_SECS) as usize;
    let step = if n > 1 {
        PLACEHOLDER_SECS / (n - 1) as f64
    } else {
        0.0
    };
    (0..n)
        .map(|i| {
            let t = i as f64 * step;
            (PLACEHOLDER_GAIN * (std::f64::consts::TAU * PLACEHOLDER_HZ * t).sin()) as f32
        })
        .collect()
}

fn write_samples<W: Write + Seek>(
    writer: W,
    samples: &[f32],
    sample_rate: u32,
) -> Result<(), AudioError> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::new(writer, spec).map_err(AudioError::Write)?;

    const I16_MAX_F32: f32 = i16::MAX as f32;
    for &s in samples {
        let v = (s.clamp(-1.0, 1.0) * I16_MAX_F32) as i16;
        writer.write_sample(v).map_err(AudioError::Write)?;
    }
    writer.finalize().map_err(AudioError::Write)
}

/// Write mono samples as 16-bit PCM, clamped to [-1, 1].
pub fn write_wav<P: AsRef<Path>>(
    path: P,
    samples: &[f32],
    sample_rate: u32,
) -> Result<(), AudioError> {
    let file = BufWriter::new(File::create(path)?);
    write_samples(file, samples, sample_rate)
}

/// Encode mono samples as an in-memory 16-bit PCM WAV file.
pub fn encode_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>, AudioError> {
    let mut cursor = Cursor::new(Vec::<u8>::with_capacity(44 + samples.len() * 2));
    write_samples(&mut cursor, samples, sample_rate)?;
    Ok(cursor.into_inner())
}
