pub mod audio;
pub mod features;
mod hpss;
pub mod mel;
pub mod pitch;
pub mod reference;
pub mod spectrum;
pub mod stats;
pub mod synth;

use std::{
    fs,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use thiserror::Error;
use tracing::{error, info, warn};

pub use audio::AudioError;
pub use features::{extract, ExtractionError, FeatureRecord};
pub use reference::{Reference, ReferenceSlot, ReferenceSource};
pub use synth::{synthesize, Synthesis, SynthesisError};

/// Sample rate of every waveform handled by the pipeline
pub const SAMPLE_RATE: u32 = 22050;

#[derive(Debug, Error)]
pub enum InitializationError {
    #[error("could not create audio output directory {path}: {source}")]
    AudioDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("sample rate must be positive")]
    ZeroSampleRate,
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("voice cloning system not ready")]
    NotReady,

    #[error("failed to extract voice characteristics: {0}")]
    Extraction(#[from] ExtractionError),

    #[error("failed to write synthesized audio: {0}")]
    Output(#[from] AudioError),
}

/// What to do when the reference cannot be analysed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeaturePolicy {
    /// Report the extraction failure to the caller
    Strict,
    /// Synthesize with [`FeatureRecord::fallback`] characteristics
    FallbackToDefaults,
}

#[derive(Debug, Clone)]
pub struct ClonerOptions {
    /// Recording loaded at startup; a placeholder tone is used if unreadable
    pub reference_path: PathBuf,
    /// Directory generated audio files are written to and served from
    pub audio_dir: PathBuf,
    pub sample_rate: u32,
}

impl Default for ClonerOptions {
    fn default() -> Self {
        Self {
            reference_path: PathBuf::from("reference_voice.wav"),
            audio_dir: std::env::temp_dir().join("voice-clone-audio"),
            sample_rate: SAMPLE_RATE,
        }
    }
}

/// Summary of a freshly installed reference
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReferenceInfo {
    pub duration_secs: f64,
    pub sample_rate: u32,
    pub sample_count: usize,
}

/// A generated audio file ready to be served
#[derive(Debug, Clone)]
pub struct SynthesisOutput {
    pub file_name: String,
    pub path: PathBuf,
    pub duration_secs: f64,
    pub sample_count: usize,
    /// Set when the reference could not be analysed and default
    /// characteristics were used instead
    pub used_default_features: bool,
}

/// Reference-driven synthesis pipeline: owns the live reference and the
/// directory generated audio lands in.
#[derive(Debug)]
pub struct VoiceCloner {
    reference: ReferenceSlot,
    audio_dir: PathBuf,
    sample_rate: u32,
    ready: AtomicBool,
}

impl VoiceCloner {
    /// Load the reference and prepare the output directory.
    ///
    /// Never fails: an initialization problem is logged and leaves the
    /// cloner in the not-ready state.
    pub fn initialize(options: ClonerOptions) -> Self {
        info!("Initializing voice cloning system...");
        let sample_rate = if options.sample_rate == 0 {
            SAMPLE_RATE
        } else {
            options.sample_rate
        };
        let reference = Self::load_startup_reference(&options.reference_path, sample_rate);
        let cloner = Self {
            reference: ReferenceSlot::new(reference),
            audio_dir: options.audio_dir.clone(),
            sample_rate,
            ready: AtomicBool::new(false),
        };

        match Self::prepare(&options) {
            Ok(()) => {
                cloner.ready.store(true, Ordering::Release);
                info!(audio_dir = %cloner.audio_dir.display(), "voice cloning system ready");
            }
            Err(e) => {
                error!(stage = "initialization", error = %e, "voice cloning system not ready");
            }
        }
        cloner
    }

    fn prepare(options: &ClonerOptions) -> Result<(), InitializationError> {
        if options.sample_rate == 0 {
            return Err(InitializationError::ZeroSampleRate);
        }
        fs::create_dir_all(&options.audio_dir).map_err(|source| InitializationError::AudioDir {
            path: options.audio_dir.clone(),
            source,
        })
    }

    fn load_startup_reference(path: &Path, sample_rate: u32) -> Reference {
        if !path.exists() {
            warn!(path = %path.display(), "reference audio not found, creating placeholder");
            return Self::placeholder(sample_rate);
        }
        match audio::load_reference_file(path, sample_rate) {
            Ok(samples) => {
                info!(samples = samples.len(), path = %path.display(), "loaded reference audio");
                Reference {
                    samples,
                    source: ReferenceSource::File(path.to_path_buf()),
                }
            }
            Err(e) => {
                error!(stage = "reference", error = %e, "could not load reference audio, creating placeholder");
                Self::placeholder(sample_rate)
            }
        }
    }

    fn placeholder(sample_rate: u32) -> Reference {
        Reference {
            samples: audio::placeholder_tone(sample_rate),
            source: ReferenceSource::Placeholder,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    /// Compute device label; all processing runs on the CPU
    pub fn device(&self) -> &'static str {
        "cpu"
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn audio_dir(&self) -> &Path {
        &self.audio_dir
    }

    pub fn reference(&self) -> Arc<Reference> {
        self.reference.snapshot()
    }

    pub fn reference_loaded(&self) -> bool {
        !self.reference.snapshot().samples.is_empty()
    }

    /// Install already-decoded samples (at the pipeline rate) as the reference.
    pub fn replace_reference(&self, samples: Vec<f32>, source: ReferenceSource) -> ReferenceInfo {
        let info = ReferenceInfo {
            duration_secs: samples.len() as f64 / self.sample_rate as f64,
            sample_rate: self.sample_rate,
            sample_count: samples.len(),
        };
        self.reference.replace(Reference { samples, source });
        info!(samples = info.sample_count, "reference audio replaced");
        info
    }

    /// Decode an uploaded WAV file and make it the live reference.
    pub fn replace_reference_bytes(&self, bytes: &[u8]) -> Result<ReferenceInfo, AudioError> {
        let samples = audio::load_reference(bytes, self.sample_rate)?;
        Ok(self.replace_reference(samples, ReferenceSource::Upload))
    }

    /// Analyse the current reference.
    pub fn extract_features(&self) -> Result<FeatureRecord, ExtractionError> {
        let reference = self.reference.snapshot();
        features::extract(&reference.samples, self.sample_rate)
    }

    /// Run extraction and synthesis for `text`, writing the result to a
    /// uniquely named WAV file in the audio directory.
    pub fn clone_to_file(
        &self,
        text: &str,
        policy: FeaturePolicy,
    ) -> Result<SynthesisOutput, PipelineError> {
        if !self.is_ready() {
            return Err(PipelineError::NotReady);
        }

        let mut used_default_features = false;
        let features = match (self.extract_features(), policy) {
            (Ok(record), _) => record,
            (Err(e), FeaturePolicy::Strict) => {
                error!(stage = "extraction", error = %e, "error extracting voice characteristics");
                return Err(e.into());
            }
            (Err(e), FeaturePolicy::FallbackToDefaults) => {
                warn!(stage = "extraction", error = %e, "using default voice characteristics");
                used_default_features = true;
                let reference = self.reference.snapshot();
                FeatureRecord::fallback(reference.duration_secs(self.sample_rate))
            }
        };

        info!(text_len = text.len(), "synthesizing speech");
        let Synthesis {
            samples,
            duration_secs,
        } = synth::synthesize(text, Some(&features), self.sample_rate);

        let file_name = format!("{}.wav", uuid::Uuid::new_v4());
        let path = self.audio_dir.join(&file_name);
        audio::write_wav(&path, &samples, self.sample_rate)?;
        info!(file = %file_name, duration_secs, "speech synthesized");

        Ok(SynthesisOutput {
            file_name,
            path,
            duration_secs,
            sample_count: samples.len(),
            used_default_features,
        })
    }

    /// Resolve a generated file by bare name. Anything that could escape
    /// the audio directory never resolves.
    pub fn audio_file(&self, file_name: &str) -> Option<PathBuf> {
        let is_bare = !file_name.is_empty()
            && file_name != "."
            && file_name != ".."
            && !file_name.contains(['/', '\\'])
            && !file_name.contains("..");
        if !is_bare {
            return None;
        }
        let path = self.audio_dir.join(file_name);
        path.is_file().then_some(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cloner_in(dir: &Path) -> VoiceCloner {
        VoiceCloner::initialize(ClonerOptions {
            reference_path: dir.join("missing.wav"),
            audio_dir: dir.join("audio"),
            sample_rate: SAMPLE_RATE,
        })
    }

    #[test]
    fn test_missing_reference_uses_placeholder() {
        let dir = tempfile::tempdir().unwrap();
        let cloner = cloner_in(dir.path());
        assert!(cloner.is_ready());
        assert!(cloner.reference_loaded());
        let reference = cloner.reference();
        assert_eq!(reference.source, ReferenceSource::Placeholder);
        assert_eq!(reference.samples.len(), 66150);
    }

    #[test]
    fn test_reference_file_is_loaded_at_startup() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ref.wav");
        audio::write_wav(&path, &vec![0.25; 11025], SAMPLE_RATE).unwrap();
        let cloner = VoiceCloner::initialize(ClonerOptions {
            reference_path: path.clone(),
            audio_dir: dir.path().join("audio"),
            sample_rate: SAMPLE_RATE,
        });
        let reference = cloner.reference();
        assert_eq!(reference.source, ReferenceSource::File(path));
        assert_eq!(reference.samples.len(), 11025);
    }

    #[test]
    fn test_unreadable_reference_falls_back_to_placeholder() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.wav");
        fs::write(&path, b"definitely not audio").unwrap();
        let cloner = VoiceCloner::initialize(ClonerOptions {
            reference_path: path,
            audio_dir: dir.path().join("audio"),
            sample_rate: SAMPLE_RATE,
        });
        assert!(cloner.is_ready());
        assert_eq!(cloner.reference().source, ReferenceSource::Placeholder);
    }

    #[test]
    fn test_unusable_audio_dir_leaves_cloner_not_ready() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        fs::write(&blocker, b"x").unwrap();
        let cloner = VoiceCloner::initialize(ClonerOptions {
            reference_path: dir.path().join("missing.wav"),
            audio_dir: blocker.join("audio"),
            sample_rate: SAMPLE_RATE,
        });
        assert!(!cloner.is_ready());
        assert!(matches!(
            cloner.clone_to_file("hello", FeaturePolicy::Strict),
            Err(PipelineError::NotReady)
        ));
    }

    #[test]
    fn test_clone_to_file_writes_expected_length() {
        let dir = tempfile::tempdir().unwrap();
        let cloner = cloner_in(dir.path());
        let out = cloner
            .clone_to_file("Hello Nicolette", FeaturePolicy::Strict)
            .unwrap();
        assert_eq!(out.duration_secs, 1.0);
        assert_eq!(out.sample_count, 22050);
        assert!(out.path.is_file());
        assert_eq!(cloner.audio_file(&out.file_name), Some(out.path.clone()));

        let written = audio::load_reference_file(&out.path, SAMPLE_RATE).unwrap();
        assert_eq!(written.len(), 22050);
    }

    #[test]
    fn test_uploaded_reference_drives_next_extraction() {
        let dir = tempfile::tempdir().unwrap();
        let cloner = cloner_in(dir.path());
        let before = cloner.extract_features().unwrap();
        assert!((before.fundamental_freq_hz - 150.0).abs() < 10.0);

        let tone: Vec<f32> = (0..SAMPLE_RATE as usize * 2)
            .map(|i| 0.3 * (std::f32::consts::TAU * 300.0 * i as f32 / SAMPLE_RATE as f32).sin())
            .collect();
        let bytes = audio::encode_wav(&tone, SAMPLE_RATE).unwrap();
        let info = cloner.replace_reference_bytes(&bytes).unwrap();
        assert_eq!(info.sample_count, tone.len());
        assert_eq!(info.duration_secs, 2.0);

        let after = cloner.extract_features().unwrap();
        assert!((after.fundamental_freq_hz - 300.0).abs() < 10.0);
        assert_eq!(after.duration_secs, 2.0);
    }

    #[test]
    fn test_empty_reference_fails_softly() {
        let dir = tempfile::tempdir().unwrap();
        let cloner = cloner_in(dir.path());
        cloner.replace_reference(Vec::new(), ReferenceSource::Upload);
        assert!(!cloner.reference_loaded());

        assert!(matches!(
            cloner.clone_to_file("two words", FeaturePolicy::Strict),
            Err(PipelineError::Extraction(ExtractionError::EmptyWaveform))
        ));
        let out = cloner
            .clone_to_file("two words", FeaturePolicy::FallbackToDefaults)
            .unwrap();
        assert_eq!(out.sample_count, 22050);
        assert!(out.used_default_features);
    }

    #[test]
    fn test_audio_file_rejects_path_escapes() {
        let dir = tempfile::tempdir().unwrap();
        let cloner = cloner_in(dir.path());
        fs::write(dir.path().join("secret.wav"), b"x").unwrap();
        assert_eq!(cloner.audio_file("../secret.wav"), None);
        assert_eq!(cloner.audio_file(".."), None);
        assert_eq!(cloner.audio_file(""), None);
        assert_eq!(cloner.audio_file("missing.wav"), None);
    }
}
