// Metrics collection and tracking

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Latency samples kept for percentile estimates
const MAX_LATENCY_SAMPLES: usize = 1000;

/// Request/latency counters for one group of endpoints
#[derive(Debug, Clone)]
pub struct EndpointMetrics {
    request_count: Arc<AtomicU64>,
    error_count: Arc<AtomicU64>,
    total_latency_ms: Arc<AtomicU64>,
    max_latency_ms: Arc<AtomicU64>,
    latency_samples: Arc<Mutex<Vec<u64>>>,
}

impl EndpointMetrics {
    pub fn new() -> Self {
        Self {
            request_count: Arc::new(AtomicU64::new(0)),
            error_count: Arc::new(AtomicU64::new(0)),
            total_latency_ms: Arc::new(AtomicU64::new(0)),
            max_latency_ms: Arc::new(AtomicU64::new(0)),
            latency_samples: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn record_request(&self, latency_ms: u64) {
        self.request_count.fetch_add(1, Ordering::Relaxed);
        self.total_latency_ms.fetch_add(latency_ms, Ordering::Relaxed);
        self.max_latency_ms.fetch_max(latency_ms, Ordering::Relaxed);

        if let Ok(mut samples) = self.latency_samples.lock() {
            if samples.len() == MAX_LATENCY_SAMPLES {
                samples.remove(0);
            }
            samples.push(latency_ms);
        }
    }

    pub fn record_error(&self) {
        self.error_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn avg_latency_ms(&self) -> f64 {
        let count = self.request_count.load(Ordering::Relaxed);
        if count == 0 {
            return 0.0;
        }
        self.total_latency_ms.load(Ordering::Relaxed) as f64 / count as f64
    }

    fn percentile(&self, p: usize) -> u64 {
        match self.latency_samples.lock() {
            Ok(samples) if !samples.is_empty() => {
                let mut sorted = samples.clone();
                sorted.sort_unstable();
                let index = (sorted.len() * p / 100).min(sorted.len() - 1);
                sorted[index]
            }
            _ => 0,
        }
    }

    pub fn stats(&self) -> EndpointStats {
        EndpointStats {
            request_count: self.request_count.load(Ordering::Relaxed),
            error_count: self.error_count.load(Ordering::Relaxed),
            avg_latency_ms: self.avg_latency_ms(),
            max_latency_ms: self.max_latency_ms.load(Ordering::Relaxed),
            p50_latency_ms: self.percentile(50),
            p95_latency_ms: self.percentile(95),
            p99_latency_ms: self.percentile(99),
        }
    }
}

impl Default for EndpointMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Pipeline outcome counters
#[derive(Debug, Clone, Default)]
pub struct SynthesisMetrics {
    synthesis_count: Arc<AtomicU64>,
    extraction_failures: Arc<AtomicU64>,
    default_feature_fallbacks: Arc<AtomicU64>,
    total_samples: Arc<AtomicU64>,
    reference_uploads: Arc<AtomicU64>,
}

impl SynthesisMetrics {
    pub fn record_synthesis(&self, samples: usize) {
        self.synthesis_count.fetch_add(1, Ordering::Relaxed);
        self.total_samples.fetch_add(samples as u64, Ordering::Relaxed);
    }

    pub fn record_extraction_failure(&self) {
        self.extraction_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_default_fallback(&self) {
        self.default_feature_fallbacks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_upload(&self) {
        self.reference_uploads.fetch_add(1, Ordering::Relaxed);
    }

    pub fn stats(&self) -> SynthesisStats {
        SynthesisStats {
            synthesis_count: self.synthesis_count.load(Ordering::Relaxed),
            extraction_failures: self.extraction_failures.load(Ordering::Relaxed),
            default_feature_fallbacks: self.default_feature_fallbacks.load(Ordering::Relaxed),
            total_samples: self.total_samples.load(Ordering::Relaxed),
            reference_uploads: self.reference_uploads.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct AppMetrics {
    pub synthesis_endpoints: EndpointMetrics,
    pub upload_endpoint: EndpointMetrics,
    pub synthesis: SynthesisMetrics,
}

impl AppMetrics {
    pub fn new() -> Self {
        Self::default()
    }
}

#[derive(Serialize)]
pub struct DetailedMetricsResponse {
    pub timestamp: DateTime<Utc>,
    pub system: SystemMetrics,
    pub endpoints: EndpointMetricsResponse,
    pub synthesis: SynthesisStats,
}

#[derive(Serialize)]
pub struct SystemMetrics {
    pub cpu_usage_percent: f32,
    pub memory_used_mb: u64,
    pub memory_total_mb: u64,
    pub memory_usage_percent: f32,
    pub request_count: u64,
    pub uptime_seconds: u64,
}

#[derive(Serialize)]
pub struct EndpointMetricsResponse {
    pub synthesis: EndpointStats,
    pub upload: EndpointStats,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct EndpointStats {
    pub request_count: u64,
    pub error_count: u64,
    pub avg_latency_ms: f64,
    pub max_latency_ms: u64,
    pub p50_latency_ms: u64,
    pub p95_latency_ms: u64,
    pub p99_latency_ms: u64,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct SynthesisStats {
    pub synthesis_count: u64,
    pub extraction_failures: u64,
    pub default_feature_fallbacks: u64,
    pub total_samples: u64,
    pub reference_uploads: u64,
}
