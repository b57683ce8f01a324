//! Common utilities for integration tests

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use tempfile::TempDir;
use tower::ServiceExt;

use server::config::ServerConfig;
use server::{build_router, AppState};
use tts_core::{
    EngineLoader, JobScheduler, JobStore, ModelManager, PipelineConfig, SpeechEngine,
    SynthesisSettings,
};

/// Emits a short tone per chunk; fails every chunk containing `fail_marker`.
pub struct ToneEngine {
    pub fail_marker: Option<String>,
}

impl SpeechEngine for ToneEngine {
    fn sample_rate(&self) -> u32 {
        16_000
    }

    fn synthesize(
        &self,
        text: &str,
        _reference_audio: Option<&Path>,
        _settings: &SynthesisSettings,
    ) -> anyhow::Result<Vec<f32>> {
        if let Some(marker) = &self.fail_marker {
            if text.contains(marker.as_str()) {
                anyhow::bail!("engine rejected chunk");
            }
        }
        Ok((0..3_200)
            .map(|i| (2.0 * std::f32::consts::PI * 220.0 * i as f32 / 16_000.0).sin() * 0.4)
            .collect())
    }
}

pub struct ToneLoader {
    pub fail_marker: Option<String>,
    pub loads: AtomicUsize,
}

impl EngineLoader for ToneLoader {
    fn load(&self) -> anyhow::Result<Arc<dyn SpeechEngine>> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(ToneEngine {
            fail_marker: self.fail_marker.clone(),
        }))
    }
}

pub struct TestApp {
    pub router: Router,
    pub scheduler: JobScheduler,
    pub loader: Arc<ToneLoader>,
    _outputs: TempDir,
}

/// Create a test app instance backed by a fake engine
pub fn create_test_app(fail_marker: Option<&str>) -> TestApp {
    let outputs = tempfile::tempdir().unwrap();
    let loader = Arc::new(ToneLoader {
        fail_marker: fail_marker.map(str::to_string),
        loads: AtomicUsize::new(0),
    });
    let models = ModelManager::new(
        Arc::clone(&loader) as Arc<dyn EngineLoader>,
        Duration::from_secs(600),
    );
    let store = Arc::new(JobStore::open(outputs.path()).unwrap());
    let pipeline = PipelineConfig {
        max_chunk_chars: 40,
        ..PipelineConfig::default()
    };
    let scheduler = JobScheduler::start(store, models, pipeline.clone());

    let config = ServerConfig {
        outputs_dir: outputs.path().to_path_buf(),
        pipeline,
        ..ServerConfig::default()
    };
    let router = build_router(AppState::new(scheduler.clone(), config));

    TestApp {
        router,
        scheduler,
        loader,
        _outputs: outputs,
    }
}

impl TestApp {
    pub async fn send(&self, request: Request<Body>) -> (StatusCode, axum::http::HeaderMap, Vec<u8>) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, headers, body.to_vec())
    }

    pub async fn get(&self, uri: &str) -> (StatusCode, serde_json::Value) {
        let (status, _, body) = self
            .send(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await;
        (status, serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null))
    }

    pub async fn post_json(&self, uri: &str, body: serde_json::Value) -> (StatusCode, serde_json::Value) {
        let (status, _, body) = self
            .send(
                Request::builder()
                    .method("POST")
                    .uri(uri)
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await;
        (status, serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null))
    }

    /// Poll a job until it is completed or failed.
    pub async fn wait_for_job(&self, job_id: &str) -> serde_json::Value {
        let deadline = Instant::now() + Duration::from_secs(10);
        loop {
            let (status, job) = self.get(&format!("/jobs/{}", job_id)).await;
            assert_eq!(status, StatusCode::OK);
            let state = job["status"].as_str().unwrap_or_default().to_string();
            if state == "completed" || state == "failed" {
                return job;
            }
            assert!(Instant::now() < deadline, "job {} stuck in {}", job_id, state);
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}
