use std::sync::atomic::Ordering;
use std::time::Instant;

use axum::{
    body::Bytes,
    extract::{rejection::JsonRejection, Multipart, Path, State},
    http::header,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use voice_core::{FeaturePolicy, PipelineError, SynthesisOutput};

use crate::error::ApiError;
use crate::metrics::{DetailedMetricsResponse, EndpointMetricsResponse, SystemMetrics};
use crate::validation::{validate_audio_file_name, validate_text, validate_text_length};
use crate::AppState;

/// Sentence synthesized by the self-test endpoint
pub const TEST_SENTENCE: &str = "Hello Nicolette! This is a test of the voice cloning server.";

fn default_voice_id() -> String {
    "reference".to_string()
}

fn default_rate() -> f32 {
    1.0
}

/// Body of `/clone-voice` and `/generate-speech`. Only `text` drives the
/// output; the rest is accepted for client compatibility.
#[derive(Debug, Deserialize)]
pub struct VoiceCloneRequest {
    pub text: Option<String>,
    #[serde(default = "default_voice_id")]
    pub voice_id: String,
    #[serde(default = "default_rate")]
    pub speed: f32,
    #[serde(default = "default_rate")]
    pub pitch: f32,
}

#[derive(Debug, Serialize)]
pub struct SpeechResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    pub message: String,
}

impl SpeechResponse {
    fn generated(output: &SynthesisOutput) -> Self {
        Self {
            success: true,
            audio_url: Some(audio_url(output)),
            duration: Some(output.duration_secs),
            message: "Voice cloned successfully".to_string(),
        }
    }

    fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            audio_url: None,
            duration: None,
            message: message.into(),
        }
    }
}

#[derive(Serialize)]
pub struct RootResponse {
    pub message: &'static str,
    pub status: &'static str,
    pub ready: bool,
}

#[derive(Serialize)]
pub struct StatusResponse {
    pub status: &'static str,
    pub device: &'static str,
    pub sample_rate: u32,
    pub reference_loaded: bool,
}

#[derive(Serialize)]
pub struct UploadResponse {
    pub success: bool,
    pub message: String,
    pub duration: f64,
    pub sample_rate: u32,
}

#[derive(Serialize)]
pub struct TestResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<&'static str>,
}

fn audio_url(output: &SynthesisOutput) -> String {
    format!("/audio/{}", output.file_name)
}

/// Run the CPU-bound pipeline off the async runtime, recording the outcome.
async fn run_pipeline(
    state: &AppState,
    text: String,
    policy: FeaturePolicy,
) -> Result<SynthesisOutput, ApiError> {
    let cloner = state.cloner.clone();
    let result = tokio::task::spawn_blocking(move || cloner.clone_to_file(&text, policy))
        .await
        .map_err(|e| {
            error!(stage = "synthesis", "Task join error: {e}");
            ApiError::InternalError(format!("Task join error: {e}"))
        })?;

    let synthesis = &state.metrics.synthesis;
    match result {
        Ok(output) => {
            synthesis.record_synthesis(output.sample_count);
            if output.used_default_features {
                synthesis.record_default_fallback();
            }
            Ok(output)
        }
        Err(e) => {
            if matches!(e, PipelineError::Extraction(_)) {
                synthesis.record_extraction_failure();
            }
            Err(e.into())
        }
    }
}

pub async fn root(State(state): State<AppState>) -> Json<RootResponse> {
    Json(RootResponse {
        message: "Voice Cloning API",
        status: "running",
        ready: state.cloner.is_ready(),
    })
}

pub async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    let cloner = &state.cloner;
    Json(StatusResponse {
        status: if cloner.is_ready() { "ready" } else { "initializing" },
        device: cloner.device(),
        sample_rate: cloner.sample_rate(),
        reference_loaded: cloner.reference_loaded(),
    })
}

pub async fn health_check() -> &'static str {
    "ok"
}

/// Not-ready and extraction failures are real HTTP errors; everything else
/// is reported in a 200 body with `success: false`. Blank text is not an
/// error: it synthesizes an empty clip with duration 0.
pub async fn clone_voice(
    State(state): State<AppState>,
    payload: Result<Json<VoiceCloneRequest>, JsonRejection>,
) -> Result<Json<SpeechResponse>, ApiError> {
    state.request_count.fetch_add(1, Ordering::Relaxed);
    let start = Instant::now();
    let endpoint = &state.metrics.synthesis_endpoints;

    let outcome = match payload {
        Err(rejection) => Ok(SpeechResponse::failed(rejection.body_text())),
        Ok(Json(req)) => clone_voice_inner(&state, req).await,
    };

    endpoint.record_request(start.elapsed().as_millis() as u64);
    match outcome {
        Ok(response) => {
            if !response.success {
                endpoint.record_error();
            }
            Ok(Json(response))
        }
        Err(e) => {
            endpoint.record_error();
            Err(e)
        }
    }
}

async fn clone_voice_inner(
    state: &AppState,
    req: VoiceCloneRequest,
) -> Result<SpeechResponse, ApiError> {
    let Some(text) = req.text else {
        return Ok(SpeechResponse::failed("No text provided"));
    };
    if let Err(e) = validate_text_length(&text) {
        return Ok(SpeechResponse::failed(e.to_string()));
    }
    if !state.cloner.is_ready() {
        return Err(ApiError::NotReady);
    }
    info!(
        voice_id = %req.voice_id,
        speed = req.speed,
        pitch = req.pitch,
        "clone-voice request"
    );

    match run_pipeline(state, text, FeaturePolicy::Strict).await {
        Ok(output) => Ok(SpeechResponse::generated(&output)),
        Err(e @ (ApiError::NotReady | ApiError::Extraction(_))) => Err(e),
        Err(e) => {
            error!(stage = "synthesis", error = %e, "error cloning voice");
            Ok(SpeechResponse::failed(e.to_string()))
        }
    }
}

/// Lenient variant of `/clone-voice`: the body is parsed by hand and every
/// failure is reported as `success: false` with HTTP 200.
pub async fn generate_speech(State(state): State<AppState>, body: Bytes) -> Json<SpeechResponse> {
    state.request_count.fetch_add(1, Ordering::Relaxed);
    let start = Instant::now();
    let endpoint = &state.metrics.synthesis_endpoints;

    let response = match generate_speech_inner(&state, &body).await {
        Ok(output) => SpeechResponse::generated(&output),
        Err(e) => {
            warn!(stage = "generate-speech", error = %e, "speech generation failed");
            endpoint.record_error();
            SpeechResponse::failed(e.to_string())
        }
    };
    endpoint.record_request(start.elapsed().as_millis() as u64);
    Json(response)
}

async fn generate_speech_inner(state: &AppState, body: &[u8]) -> Result<SynthesisOutput, ApiError> {
    let req: VoiceCloneRequest = serde_json::from_slice(body)
        .map_err(|e| ApiError::InvalidInput(format!("Invalid JSON body: {e}")))?;
    let text = req
        .text
        .ok_or_else(|| ApiError::InvalidInput("No text provided".to_string()))?;
    validate_text(&text)?;
    run_pipeline(state, text, FeaturePolicy::Strict).await
}

pub async fn upload_reference(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    state.request_count.fetch_add(1, Ordering::Relaxed);
    let start = Instant::now();
    let endpoint = &state.metrics.upload_endpoint;

    let result = upload_reference_inner(&state, &mut multipart).await;
    endpoint.record_request(start.elapsed().as_millis() as u64);
    if result.is_err() {
        endpoint.record_error();
    }
    result.map(Json)
}

async fn upload_reference_inner(
    state: &AppState,
    multipart: &mut Multipart,
) -> Result<UploadResponse, ApiError> {
    let mut upload = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::InvalidInput(format!("Malformed multipart body: {e}")))?
    {
        if field.name() == Some("file") {
            let bytes = field
                .bytes()
                .await
                .map_err(|e| ApiError::InvalidInput(format!("Could not read upload: {e}")))?;
            upload = Some(bytes);
            break;
        }
    }
    let bytes = upload.ok_or_else(|| ApiError::InvalidInput("No file provided".to_string()))?;
    info!(bytes = bytes.len(), "reference upload received");

    let cloner = state.cloner.clone();
    let info = tokio::task::spawn_blocking(move || cloner.replace_reference_bytes(&bytes))
        .await
        .map_err(|e| ApiError::InternalError(format!("Task join error: {e}")))??;
    state.metrics.synthesis.record_upload();

    Ok(UploadResponse {
        success: true,
        message: "Reference audio uploaded successfully".to_string(),
        duration: info.duration_secs,
        sample_rate: info.sample_rate,
    })
}

pub async fn audio(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    validate_audio_file_name(&filename)?;
    let path = state
        .cloner
        .audio_file(&filename)
        .ok_or_else(|| ApiError::NotFound("Audio file not found".to_string()))?;
    let bytes = tokio::fs::read(&path).await.map_err(|e| {
        warn!(file = %filename, error = %e, "could not read generated audio");
        ApiError::NotFound("Audio file not found".to_string())
    })?;
    Ok(([(header::CONTENT_TYPE, "audio/wav")], bytes))
}

/// End-to-end self check. Synthesizes with default characteristics when the
/// reference cannot be analysed; any failure is a `success: false` body.
pub async fn test_synthesis(State(state): State<AppState>) -> Json<TestResponse> {
    state.request_count.fetch_add(1, Ordering::Relaxed);
    let start = Instant::now();
    let result = run_pipeline(&state, TEST_SENTENCE.to_string(), FeaturePolicy::FallbackToDefaults).await;

    let endpoint = &state.metrics.synthesis_endpoints;
    endpoint.record_request(start.elapsed().as_millis() as u64);
    let response = match result {
        Ok(output) => TestResponse {
            success: true,
            message: "Test successful".to_string(),
            audio_url: Some(audio_url(&output)),
            duration: Some(output.duration_secs),
            text: Some(TEST_SENTENCE),
        },
        Err(e) => {
            endpoint.record_error();
            warn!(stage = "test", error = %e, "self test failed");
            TestResponse {
                success: false,
                message: e.to_string(),
                audio_url: None,
                duration: None,
                text: None,
            }
        }
    };
    Json(response)
}

pub async fn metrics_endpoint(State(state): State<AppState>) -> Json<DetailedMetricsResponse> {
    let mut system = sysinfo::System::new();
    system.refresh_cpu();
    system.refresh_memory();

    let cpu_usage = system.global_cpu_info().cpu_usage();
    let memory_used = system.used_memory();
    let memory_total = system.total_memory();
    let memory_usage_percent = if memory_total > 0 {
        (memory_used as f64 / memory_total as f64 * 100.0) as f32
    } else {
        0.0
    };

    Json(DetailedMetricsResponse {
        timestamp: chrono::Utc::now(),
        system: SystemMetrics {
            cpu_usage_percent: cpu_usage,
            memory_used_mb: memory_used / 1024 / 1024,
            memory_total_mb: memory_total / 1024 / 1024,
            memory_usage_percent,
            request_count: state.request_count.load(Ordering::Relaxed),
            uptime_seconds: state.started_at.elapsed().as_secs(),
        },
        endpoints: EndpointMetricsResponse {
            synthesis: state.metrics.synthesis_endpoints.stats(),
            upload: state.metrics.upload_endpoint.stats(),
        },
        synthesis: state.metrics.synthesis.stats(),
    })
}
