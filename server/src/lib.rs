pub mod config;
pub mod error;
pub mod metrics;
pub mod routes;
pub mod validation;

use std::{
    sync::{atomic::AtomicU64, Arc},
    time::Instant,
};

use axum::{
    extract::{DefaultBodyLimit, Request},
    http::{HeaderValue, Method},
    middleware::Next,
    response::Response,
    routing::{get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_governor::{governor::GovernorConfigBuilder, key_extractor::GlobalKeyExtractor, GovernorLayer};
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    limit::RequestBodyLimitLayer,
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::{info, warn};
use voice_core::VoiceCloner;

use crate::config::ServerConfig;
use crate::metrics::AppMetrics;

#[derive(Clone)]
pub struct AppState {
    pub cloner: Arc<VoiceCloner>,
    pub metrics: AppMetrics,
    pub request_count: Arc<AtomicU64>,
    pub config: ServerConfig,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(cloner: Arc<VoiceCloner>, config: ServerConfig) -> Self {
        Self {
            cloner,
            metrics: AppMetrics::new(),
            request_count: Arc::new(AtomicU64::new(0)),
            config,
            started_at: Instant::now(),
        }
    }
}

fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(routes::root))
        .route("/status", get(routes::status))
        .route("/clone-voice", post(routes::clone_voice))
        .route("/generate-speech", post(routes::generate_speech))
        .route("/upload-reference", post(routes::upload_reference))
        .route("/audio/{filename}", get(routes::audio))
        .route("/test", get(routes::test_synthesis))
        .route("/health", get(routes::health_check))
        .route("/metrics", get(routes::metrics_endpoint))
}

async fn add_request_id(mut request: Request, next: Next) -> Response {
    let request_id = uuid::Uuid::new_v4().to_string();
    let header = HeaderValue::from_str(&request_id).ok();
    if let Some(value) = header.clone() {
        request.headers_mut().insert("x-request-id", value);
    }
    let mut response = next.run(request).await;
    if let Some(value) = header {
        response.headers_mut().insert("x-request-id", value);
    }
    response
}

fn cors_layer(config: &ServerConfig) -> CorsLayer {
    let methods = [Method::GET, Method::POST, Method::OPTIONS];
    let origins: Vec<HeaderValue> = config
        .cors_allowed_origins
        .iter()
        .flatten()
        .filter_map(|origin| origin.parse::<HeaderValue>().ok())
        .collect();

    if origins.is_empty() {
        if config.cors_allowed_origins.is_some() {
            warn!("CORS_ALLOWED_ORIGINS has no usable origins, falling back to permissive CORS");
        } else {
            warn!("CORS_ALLOWED_ORIGINS not set, allowing all origins (development mode)");
        }
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(methods)
            .allow_headers(Any)
    } else {
        info!("CORS configured for {} origin(s)", origins.len());
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_methods(methods)
            .allow_headers(Any)
    }
}

/// Build the application with every route served both at the root and
/// under `/api`, wrapped in the tracing, rate limit, timeout, CORS and
/// body limit middleware.
pub fn router(state: AppState) -> anyhow::Result<Router> {
    let config = state.config.clone();

    // Global limit shared by all callers; one token every 60/n seconds
    let rate = u64::from(config.rate_limit_per_minute.max(1));
    let governor_conf = Arc::new(
        GovernorConfigBuilder::default()
            .per_millisecond((60_000 / rate).max(1))
            .burst_size(config.rate_limit_per_minute.max(1))
            .key_extractor(GlobalKeyExtractor)
            .finish()
            .ok_or_else(|| anyhow::anyhow!("invalid rate limit configuration"))?,
    );
    info!("Rate limiting: {} requests per minute", config.rate_limit_per_minute);

    let middleware_stack = ServiceBuilder::new()
        .layer(TraceLayer::new_for_http())
        .layer(GovernorLayer::new(governor_conf))
        .layer(TimeoutLayer::new(config.request_timeout()))
        .layer(cors_layer(&config))
        .into_inner();

    let api = api_routes();
    Ok(Router::new()
        .merge(api.clone())
        .nest("/api", api)
        .layer(DefaultBodyLimit::max(config.max_upload_bytes))
        .layer(RequestBodyLimitLayer::new(config.max_upload_bytes))
        .layer(axum::middleware::from_fn(add_request_id))
        .layer(middleware_stack)
        .with_state(state))
}
