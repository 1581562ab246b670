// Configuration constants for the server

use std::path::PathBuf;
use std::time::Duration;

use voice_core::ClonerOptions;

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub port: u16,
    pub rate_limit_per_minute: u32,
    pub request_timeout_secs: u64,
    pub cors_allowed_origins: Option<Vec<String>>,
    pub reference_path: PathBuf,
    pub audio_dir: PathBuf,
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8000,
            rate_limit_per_minute: 60,
            request_timeout_secs: 60,
            cors_allowed_origins: None,
            reference_path: PathBuf::from("reference_voice.wav"),
            audio_dir: default_audio_dir(),
            max_upload_bytes: 25 * 1024 * 1024,
        }
    }
}

fn default_audio_dir() -> PathBuf {
    std::env::temp_dir().join("voice-clone-audio")
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

impl ServerConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let port = env_parse("PORT").unwrap_or(defaults.port);

        let rate_limit_per_minute =
            env_parse("RATE_LIMIT_PER_MINUTE").unwrap_or(defaults.rate_limit_per_minute);

        let request_timeout_secs =
            env_parse("REQUEST_TIMEOUT_SECS").unwrap_or(defaults.request_timeout_secs);

        let cors_allowed_origins = std::env::var("CORS_ALLOWED_ORIGINS")
            .ok()
            .map(|origins| {
                origins
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            });

        let reference_path = std::env::var("REFERENCE_AUDIO_PATH")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or(defaults.reference_path);

        let audio_dir = std::env::var("AUDIO_OUTPUT_DIR")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or(defaults.audio_dir);

        let max_upload_bytes = env_parse("MAX_UPLOAD_BYTES").unwrap_or(defaults.max_upload_bytes);

        Self {
            port,
            rate_limit_per_minute,
            request_timeout_secs,
            cors_allowed_origins,
            reference_path,
            audio_dir,
            max_upload_bytes,
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn cloner_options(&self) -> ClonerOptions {
        ClonerOptions {
            reference_path: self.reference_path.clone(),
            audio_dir: self.audio_dir.clone(),
            sample_rate: voice_core::SAMPLE_RATE,
        }
    }
}
