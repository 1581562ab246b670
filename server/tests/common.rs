//! Common utilities for integration tests

#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;
use voice_core::{audio, ClonerOptions, VoiceCloner, SAMPLE_RATE};
use voice_server::{config::ServerConfig, router, AppState};

pub const BOUNDARY: &str = "voice-test-boundary";

pub struct TestApp {
    pub app: Router,
    pub cloner: Arc<VoiceCloner>,
    pub dir: TempDir,
}

fn build(audio_dir: &Path, reference_path: &Path) -> (Router, Arc<VoiceCloner>) {
    let config = ServerConfig {
        reference_path: reference_path.to_path_buf(),
        audio_dir: audio_dir.to_path_buf(),
        ..ServerConfig::default()
    };
    let cloner = Arc::new(VoiceCloner::initialize(ClonerOptions {
        reference_path: config.reference_path.clone(),
        audio_dir: config.audio_dir.clone(),
        sample_rate: SAMPLE_RATE,
    }));
    let app = router(AppState::new(cloner.clone(), config)).expect("router builds");
    (app, cloner)
}

/// App with no reference file, so the placeholder tone is loaded
pub fn create_test_app() -> TestApp {
    let dir = tempfile::tempdir().unwrap();
    let (app, cloner) = build(&dir.path().join("audio"), &dir.path().join("missing.wav"));
    TestApp { app, cloner, dir }
}

/// App whose audio directory cannot be created
pub fn create_unready_app() -> TestApp {
    let dir = tempfile::tempdir().unwrap();
    let blocker = dir.path().join("not-a-dir");
    std::fs::write(&blocker, b"x").unwrap();
    let (app, cloner) = build(&blocker.join("audio"), &dir.path().join("missing.wav"));
    TestApp { app, cloner, dir }
}

pub fn tone_wav(freq: f32, seconds: f32) -> Vec<u8> {
    let n = (SAMPLE_RATE as f32 * seconds) as usize;
    let samples: Vec<f32> = (0..n)
        .map(|i| 0.3 * (std::f32::consts::TAU * freq * i as f32 / SAMPLE_RATE as f32).sin())
        .collect();
    audio::encode_wav(&samples, SAMPLE_RATE).unwrap()
}

pub fn multipart_body(field: &str, bytes: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"reference.wav\"\r\nContent-Type: audio/wav\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
    body
}

pub fn upload_request(field: &str, bytes: &[u8]) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/upload-reference")
        .header(
            "content-type",
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(multipart_body(field, bytes)))
        .unwrap()
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

pub fn post_json(uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Vec<u8>) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, body.to_vec())
}

pub async fn send_json(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let (status, body) = send(app, request).await;
    (status, serde_json::from_slice(&body).unwrap())
}
