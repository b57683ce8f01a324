pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod validation;

use std::sync::atomic::AtomicU64;
use std::sync::{Arc, OnceLock};
use std::time::Instant;

use axum::{
    extract::{DefaultBodyLimit, Request},
    http::HeaderValue,
    middleware::Next,
    response::Response,
    routing::{get, post},
    Router,
};
use tts_core::JobScheduler;

use crate::config::ServerConfig;
use crate::metrics::AppMetrics;

/// Request bodies carry base64 reference clips.
pub const MAX_REQUEST_BYTES: usize = 16 * 1024 * 1024;

pub static START_TIME: OnceLock<Instant> = OnceLock::new();

#[derive(Clone)]
pub struct AppState {
    pub scheduler: JobScheduler,
    pub metrics: AppMetrics,
    pub request_count: Arc<AtomicU64>,
    pub config: ServerConfig,
}

impl AppState {
    pub fn new(scheduler: JobScheduler, config: ServerConfig) -> Self {
        Self {
            scheduler,
            metrics: AppMetrics::new(),
            request_count: Arc::new(AtomicU64::new(0)),
            config,
        }
    }
}

pub fn uptime_seconds() -> u64 {
    START_TIME
        .get()
        .map(|start| start.elapsed().as_secs())
        .unwrap_or(0)
}

// Request ID middleware for tracing
async fn add_request_id(mut request: Request, next: Next) -> Response {
    let request_id = HeaderValue::from_str(&uuid::Uuid::new_v4().to_string())
        .unwrap_or_else(|_| HeaderValue::from_static("unknown"));
    request.headers_mut().insert("x-request-id", request_id.clone());
    let mut response = next.run(request).await;
    response.headers_mut().insert("x-request-id", request_id);
    response
}

/// All routes, served at the root and again under `/api`.
///
/// Rate limiting, timeouts and CORS are layered on by the binary.
pub fn build_router(state: AppState) -> Router {
    let _ = START_TIME.get_or_init(Instant::now);

    let public_api = Router::new()
        .route("/health", get(handlers::health_check))
        .route("/healthz", get(handlers::health_check))
        .route("/languages", get(handlers::list_languages))
        .route("/presets", get(handlers::list_presets))
        .route("/jobs", post(handlers::submit_job).get(handlers::list_jobs))
        .route("/jobs/{id}", get(handlers::get_job))
        .route("/jobs/{id}/audio", get(handlers::get_job_audio))
        .route("/unload", post(handlers::unload_model));

    // Metrics endpoint - consider adding authentication in production
    let metrics_api = Router::new().route("/metrics", get(handlers::metrics_endpoint));

    let api = Router::new().merge(public_api).merge(metrics_api);

    Router::new()
        .merge(api.clone()) // root paths
        .nest("/api", api) // /api prefix
        .layer(DefaultBodyLimit::max(MAX_REQUEST_BYTES))
        .layer(axum::middleware::from_fn(add_request_id))
        .with_state(state)
}
