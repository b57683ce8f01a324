use std::sync::atomic::Ordering;
use std::time::Instant;

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use tts_core::{
    Job, JobId, JobMetrics, JobStatus, Language, ModelStatus, Preset, SynthesisSettings,
    TtsRequest, LANGUAGES, PRESETS,
};

use crate::error::ApiError;
use crate::metrics::{DetailedMetricsResponse, EndpointMetrics, SystemMetrics};
use crate::validation::{decode_reference_audio, history_limit, validate_job_id};
use crate::{uptime_seconds, AppState};

#[derive(Deserialize)]
pub struct SubmitJobRequest {
    pub text: String,
    pub language: Option<String>,
    pub preset: Option<String>,
    pub exaggeration: Option<f32>,
    pub cfg_weight: Option<f32>,
    pub seed: Option<i64>,
    pub reference_audio_base64: Option<String>,
}

#[derive(Serialize)]
pub struct SubmitJobResponse {
    pub job_id: JobId,
    pub status: JobStatus,
}

#[derive(Serialize)]
pub struct ArtifactView {
    pub file_name: String,
    pub duration_ms: u64,
    pub sample_rate: u32,
    pub chunk_count: usize,
    pub audio_url: String,
}

/// Public view of a job; server paths are not exposed.
#[derive(Serialize)]
pub struct JobView {
    pub job_id: JobId,
    pub status: JobStatus,
    pub progress: u8,
    pub text_length: usize,
    pub preset: Option<String>,
    pub has_reference_audio: bool,
    pub settings: SynthesisSettings,
    pub result: Option<ArtifactView>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Job> for JobView {
    fn from(job: &Job) -> Self {
        Self {
            job_id: job.id,
            status: job.status,
            progress: job.progress,
            text_length: job.request.text.chars().count(),
            preset: job.request.preset.clone(),
            has_reference_audio: job.request.reference_audio.is_some(),
            settings: job.request.settings.clone(),
            result: job.result.as_ref().map(|artifact| ArtifactView {
                file_name: artifact.file_name.clone(),
                duration_ms: artifact.duration_ms,
                sample_rate: artifact.sample_rate,
                chunk_count: artifact.chunk_count,
                audio_url: format!("/jobs/{}/audio", job.id),
            }),
            error: job.error.clone(),
            created_at: job.created_at,
            updated_at: job.updated_at,
        }
    }
}

#[derive(Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<usize>,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub model: ModelStatus,
    pub queue_depth: usize,
    pub uptime_seconds: u64,
}

#[derive(Serialize)]
pub struct UnloadResponse {
    pub unloaded: bool,
    pub model: ModelStatus,
}

/// Record latency (and failures) of one endpoint call.
fn track<T>(metrics: &EndpointMetrics, started: Instant, result: &Result<T, ApiError>) {
    if result.is_err() {
        metrics.record_error();
    }
    metrics.record_request(started.elapsed().as_millis() as u64);
}

pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        model: state.scheduler.model_status(),
        queue_depth: state.scheduler.queue_depth(),
        uptime_seconds: uptime_seconds(),
    })
}

pub async fn list_languages() -> Json<&'static [Language]> {
    Json(LANGUAGES)
}

pub async fn list_presets() -> Json<&'static [Preset]> {
    Json(PRESETS)
}

pub async fn submit_job(
    State(state): State<AppState>,
    Json(req): Json<SubmitJobRequest>,
) -> Result<(StatusCode, Json<SubmitJobResponse>), ApiError> {
    state.request_count.fetch_add(1, Ordering::Relaxed);
    let started = Instant::now();
    let result = enqueue(&state, req);
    track(&state.metrics.submit, started, &result);

    let job_id = result?;
    Ok((
        StatusCode::ACCEPTED,
        Json(SubmitJobResponse {
            job_id,
            status: JobStatus::Queued,
        }),
    ))
}

fn enqueue(state: &AppState, req: SubmitJobRequest) -> Result<JobId, ApiError> {
    let reference_audio = req
        .reference_audio_base64
        .as_deref()
        .filter(|s| !s.trim().is_empty())
        .map(decode_reference_audio)
        .transpose()?;

    let job_id = state.scheduler.submit(TtsRequest {
        text: req.text,
        language: req.language,
        preset: req.preset,
        exaggeration: req.exaggeration,
        cfg_weight: req.cfg_weight,
        seed: req.seed,
        reference_audio,
    })?;
    Ok(job_id)
}

pub async fn get_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<JobView>, ApiError> {
    state.request_count.fetch_add(1, Ordering::Relaxed);
    let started = Instant::now();
    let result = validate_job_id(&id)
        .and_then(|id| state.scheduler.get_status(&id).map_err(ApiError::from))
        .map(|job| JobView::from(job.as_ref()));
    track(&state.metrics.status, started, &result);
    Ok(Json(result?))
}

pub async fn get_job_audio(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    state.request_count.fetch_add(1, Ordering::Relaxed);
    let started = Instant::now();
    let result = validate_job_id(&id).and_then(|id| {
        state
            .scheduler
            .get_artifact(&id)
            .map(|bytes| (id, bytes))
            .map_err(ApiError::from)
    });
    track(&state.metrics.audio, started, &result);

    let (id, bytes) = result?;
    Ok((
        [
            (header::CONTENT_TYPE, "audio/wav".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}.wav\"", id),
            ),
        ],
        bytes,
    )
        .into_response())
}

pub async fn list_jobs(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> Json<Vec<JobView>> {
    state.request_count.fetch_add(1, Ordering::Relaxed);
    let jobs = state.scheduler.list_history(history_limit(query.limit));
    Json(jobs.iter().map(|job| JobView::from(job.as_ref())).collect())
}

pub async fn unload_model(State(state): State<AppState>) -> Json<UnloadResponse> {
    state.request_count.fetch_add(1, Ordering::Relaxed);
    let unloaded = state.scheduler.force_unload_model().await;
    info!("Manual model unload requested (unloaded: {})", unloaded);
    Json(UnloadResponse {
        unloaded,
        model: state.scheduler.model_status(),
    })
}

pub async fn metrics_endpoint(State(state): State<AppState>) -> Json<DetailedMetricsResponse> {
    let mut system = sysinfo::System::new();
    system.refresh_cpu();
    system.refresh_memory();

    // Average across all cores
    let cpu_usage = system.global_cpu_info().cpu_usage();

    let memory_used = system.used_memory();
    let memory_total = system.total_memory();
    let memory_usage_percent = if memory_total > 0 {
        (memory_used as f64 / memory_total as f64 * 100.0) as f32
    } else {
        0.0
    };

    // Unix-like systems only
    let system_load = {
        #[cfg(unix)]
        {
            std::fs::read_to_string("/proc/loadavg")
                .ok()
                .and_then(|loadavg| loadavg.split_whitespace().next().and_then(|s| s.parse::<f64>().ok()))
        }
        #[cfg(not(unix))]
        None
    };

    let jobs: JobMetrics = state.scheduler.metrics();
    Json(DetailedMetricsResponse {
        timestamp: Utc::now(),
        system: SystemMetrics {
            cpu_usage_percent: cpu_usage,
            memory_used_mb: memory_used / 1024 / 1024,
            memory_total_mb: memory_total / 1024 / 1024,
            memory_usage_percent,
            request_count: state.request_count.load(Ordering::Relaxed),
            uptime_seconds: uptime_seconds(),
            system_load,
        },
        endpoints: state.metrics.endpoints(),
        jobs,
        model: state.scheduler.model_status(),
    })
}
