//! Job submission and the single worker lane.
//!
//! Submissions are validated and recorded synchronously, then queued on an
//! unbounded FIFO channel. One worker task drains the channel and runs each
//! job to a terminal state before looking at the next one.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::audio::{AudioConfig, AudioProcessor};
use crate::chunker;
use crate::engine::SynthesisSettings;
use crate::error::{Result, TtsError};
use crate::job::{Job, JobArtifact, JobId, JobRequest};
use crate::model::{ModelManager, ModelStatus};
use crate::normalizer;
use crate::presets::DEFAULT_LANGUAGE;
use crate::reference;
use crate::store::JobStore;
use crate::validation::{self, MAX_TEXT_LENGTH};

pub const DEFAULT_MAX_CHUNK_CHARS: usize = 200;
pub const DEFAULT_EXAGGERATION: f32 = 0.5;
pub const DEFAULT_CFG_WEIGHT: f32 = 0.5;

/// Language whose text goes through the number/date normalizer.
const NORMALIZED_LANGUAGE: &str = "tr";

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub max_chunk_chars: usize,
    pub max_text_chars: usize,
    pub audio: AudioConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_chunk_chars: DEFAULT_MAX_CHUNK_CHARS,
            max_text_chars: MAX_TEXT_LENGTH,
            audio: AudioConfig::default(),
        }
    }
}

/// What a caller asks for. Unset fields fall back to defaults; a preset
/// overrides `exaggeration` and `cfg_weight`; a missing or negative seed is
/// replaced by a random one.
#[derive(Debug, Clone, Default)]
pub struct TtsRequest {
    pub text: String,
    pub language: Option<String>,
    pub preset: Option<String>,
    pub exaggeration: Option<f32>,
    pub cfg_weight: Option<f32>,
    pub seed: Option<i64>,
    /// Raw bytes of a reference voice clip (WAV, MP3, FLAC, ...).
    pub reference_audio: Option<Vec<u8>>,
}

#[derive(Default)]
struct JobCounters {
    submitted: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    chunks: AtomicU64,
    synthesis_ms: AtomicU64,
}

#[derive(Debug, Clone, Serialize)]
pub struct JobMetrics {
    pub submitted: u64,
    pub completed: u64,
    pub failed: u64,
    pub chunks_synthesized: u64,
    pub synthesis_ms_total: u64,
    pub queue_depth: usize,
}

struct Shared {
    store: Arc<JobStore>,
    models: ModelManager,
    max_text_chars: usize,
    queue: mpsc::UnboundedSender<JobId>,
    depth: Arc<AtomicUsize>,
    counters: Arc<JobCounters>,
}

/// Handle to the queue. Cheap to clone; the worker stops once every handle
/// is dropped and the queue is drained.
#[derive(Clone)]
pub struct JobScheduler {
    shared: Arc<Shared>,
}

impl JobScheduler {
    /// Spawn the worker lane on the current tokio runtime.
    pub fn start(store: Arc<JobStore>, models: ModelManager, config: PipelineConfig) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let depth = Arc::new(AtomicUsize::new(0));
        let counters = Arc::new(JobCounters::default());

        let worker = Worker {
            store: Arc::clone(&store),
            models: models.clone(),
            processor: AudioProcessor::new(config.audio.clone()),
            max_chunk_chars: config.max_chunk_chars.max(1),
            depth: Arc::clone(&depth),
            counters: Arc::clone(&counters),
        };
        tokio::spawn(worker.run(rx));

        info!(
            "Job scheduler started (max chunk {} chars, max text {} chars)",
            config.max_chunk_chars, config.max_text_chars
        );
        Self {
            shared: Arc::new(Shared {
                store,
                models,
                max_text_chars: config.max_text_chars,
                queue: tx,
                depth,
                counters,
            }),
        }
    }

    /// Validate, record and enqueue a job. Only validation and storage
    /// errors are returned here; everything later is recorded on the job.
    pub fn submit(&self, request: TtsRequest) -> Result<JobId> {
        let shared = &self.shared;
        validation::validate_text(&request.text, shared.max_text_chars)?;

        let language = request
            .language
            .filter(|l| !l.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_LANGUAGE.to_string());
        validation::validate_language(&language)?;
        validation::validate_settings(request.exaggeration, request.cfg_weight)?;

        let preset = request.preset.filter(|p| !p.trim().is_empty());
        let (exaggeration, cfg_weight) = match preset.as_deref() {
            Some(key) => {
                let preset = validation::validate_preset(key)?;
                (preset.exaggeration, preset.cfg_weight)
            }
            None => (
                request.exaggeration.unwrap_or(DEFAULT_EXAGGERATION),
                request.cfg_weight.unwrap_or(DEFAULT_CFG_WEIGHT),
            ),
        };

        let reference = match &request.reference_audio {
            Some(bytes) => {
                let info = reference::probe_reference(bytes)?;
                debug!(
                    "Reference clip: {} ({:?} Hz, {:?} ch, {:?} ms)",
                    info.extension, info.sample_rate, info.channels, info.duration_ms
                );
                Some((bytes, info.extension))
            }
            None => None,
        };

        let char_count = request.text.chars().count();
        let mut job = Job::new(JobRequest {
            text: request.text,
            preset,
            reference_audio: None,
            settings: SynthesisSettings {
                language,
                exaggeration,
                cfg_weight,
                seed: resolve_seed(request.seed),
            },
        });
        if let Some((bytes, extension)) = reference {
            job.request.reference_audio = Some(shared.store.save_upload(&job.id, bytes, extension)?);
        }

        let id = job.id;
        let upload = job.request.reference_audio.clone();
        if let Err(e) = shared.store.create(job) {
            if let Some(path) = &upload {
                shared.store.remove_upload(path);
            }
            return Err(e);
        }

        shared.depth.fetch_add(1, Ordering::SeqCst);
        if shared.queue.send(id).is_err() {
            shared.depth.fetch_sub(1, Ordering::SeqCst);
            let message = "job queue is closed";
            if let Err(e) = shared.store.update(&id, |job| job.fail(message)) {
                warn!("Failed to mark job {} as failed: {}", id, e);
            }
            if let Some(path) = &upload {
                shared.store.remove_upload(path);
            }
            return Err(TtsError::Storage(message.to_string()));
        }

        shared.counters.submitted.fetch_add(1, Ordering::Relaxed);
        info!("Job {} queued ({} chars)", id, char_count);
        Ok(id)
    }

    pub fn get_status(&self, id: &JobId) -> Result<Arc<Job>> {
        self.shared
            .store
            .get(id)
            .ok_or_else(|| TtsError::NotFound(id.to_string()))
    }

    /// WAV bytes of a completed job; `NotFound` for anything else.
    pub fn get_artifact(&self, id: &JobId) -> Result<Vec<u8>> {
        self.shared.store.read_artifact(id)
    }

    pub fn list_history(&self, limit: usize) -> Vec<Arc<Job>> {
        self.shared.store.list_recent(limit)
    }

    /// Evict the model now, waiting for an in-flight chunk to finish.
    pub async fn force_unload_model(&self) -> bool {
        self.shared.models.force_unload().await
    }

    pub fn model_status(&self) -> ModelStatus {
        self.shared.models.status()
    }

    /// Jobs submitted but not yet picked up by the worker.
    pub fn queue_depth(&self) -> usize {
        self.shared.depth.load(Ordering::SeqCst)
    }

    pub fn metrics(&self) -> JobMetrics {
        let c = &self.shared.counters;
        JobMetrics {
            submitted: c.submitted.load(Ordering::Relaxed),
            completed: c.completed.load(Ordering::Relaxed),
            failed: c.failed.load(Ordering::Relaxed),
            chunks_synthesized: c.chunks.load(Ordering::Relaxed),
            synthesis_ms_total: c.synthesis_ms.load(Ordering::Relaxed),
            queue_depth: self.queue_depth(),
        }
    }
}

fn resolve_seed(requested: Option<i64>) -> u64 {
    match requested {
        Some(seed) if seed >= 0 => seed as u64,
        _ => rand::random::<u32>() as u64,
    }
}

struct Worker {
    store: Arc<JobStore>,
    models: ModelManager,
    processor: AudioProcessor,
    max_chunk_chars: usize,
    depth: Arc<AtomicUsize>,
    counters: Arc<JobCounters>,
}

impl Worker {
    async fn run(self, mut rx: mpsc::UnboundedReceiver<JobId>) {
        while let Some(id) = rx.recv().await {
            self.depth.fetch_sub(1, Ordering::SeqCst);
            let started = Instant::now();
            match self.execute(&id).await {
                Ok(artifact) => {
                    self.counters.completed.fetch_add(1, Ordering::Relaxed);
                    info!(
                        "Job {} completed: {} chunks, {} ms of audio in {:.2?}",
                        id,
                        artifact.chunk_count,
                        artifact.duration_ms,
                        started.elapsed()
                    );
                }
                Err(e) => {
                    self.counters.failed.fetch_add(1, Ordering::Relaxed);
                    error!("Job {} failed: {}", id, e);
                    let message = e.to_string();
                    if let Err(update_err) = self.update_job(id, move |job| job.fail(message)).await {
                        warn!("Failed to record failure of job {}: {}", id, update_err);
                    }
                }
            }
            if let Some(path) = self
                .store
                .get(&id)
                .and_then(|job| job.request.reference_audio.clone())
            {
                self.store.remove_upload(&path);
            }
        }
        info!("Job queue closed; worker exiting");
    }

    async fn execute(&self, id: &JobId) -> Result<JobArtifact> {
        let job = self.update_job(*id, |job| job.start()).await?;
        let request = &job.request;

        let text = if request.settings.language == NORMALIZED_LANGUAGE {
            normalizer::normalize_text(&request.text)
        } else {
            request.text.clone()
        };
        let chunks = chunker::split(&text, self.max_chunk_chars);
        if chunks.is_empty() {
            return Err(TtsError::Validation("text has nothing to synthesize".to_string()));
        }

        let total = chunks.len();
        let mut processed: Vec<Vec<f32>> = Vec::with_capacity(total);
        let mut sample_rate = 0;
        for (index, chunk) in chunks.into_iter().enumerate() {
            debug!("Job {} chunk {}/{}: {} chars", id, index + 1, total, chunk.chars().count());
            let (raw, rate) = self
                .synthesize_chunk(chunk, request.reference_audio.clone(), &request.settings, index)
                .await
                .map_err(|e| match e {
                    TtsError::Synthesis(msg) => {
                        TtsError::Synthesis(format!("chunk {}/{}: {}", index + 1, total, msg))
                    }
                    other => other,
                })?;
            sample_rate = rate;
            processed.push(self.processor.process(&raw, sample_rate)?);
            self.update_job(*id, move |job| job.advance(index + 1, total)).await?;
        }

        let store = Arc::clone(&self.store);
        let processor = self.processor.clone();
        let id = *id;
        tokio::task::spawn_blocking(move || {
            let audio = processor.assemble(&processed, sample_rate);
            store.complete_with_artifact(&id, &audio, sample_rate, total)
        })
        .await
        .map_err(|e| TtsError::Storage(format!("artifact task failed: {e}")))?
    }

    /// Run a store update on the blocking pool; it writes the job record.
    async fn update_job<F>(&self, id: JobId, f: F) -> Result<Arc<Job>>
    where
        F: FnOnce(&mut Job) -> Result<()> + Send + 'static,
    {
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || store.update(&id, f))
            .await
            .map_err(|e| TtsError::Storage(format!("store task failed: {e}")))?
    }

    /// Lease the model and run one chunk on the blocking pool.
    async fn synthesize_chunk(
        &self,
        text: String,
        reference_audio: Option<PathBuf>,
        settings: &SynthesisSettings,
        index: usize,
    ) -> Result<(Vec<f32>, u32)> {
        let lease = self.models.acquire().await?;
        let settings = SynthesisSettings {
            seed: settings.seed.wrapping_add(index as u64),
            ..settings.clone()
        };

        let started = Instant::now();
        let result = tokio::task::spawn_blocking(move || {
            let engine = lease.engine();
            let sample_rate = engine.sample_rate();
            let samples = engine.synthesize(&text, reference_audio.as_deref(), &settings);
            lease.release();
            samples.map(|s| (s, sample_rate))
        })
        .await
        .map_err(|e| TtsError::Synthesis(format!("synthesis task failed: {e}")))?
        .map_err(|e| TtsError::Synthesis(format!("{e:#}")))?;

        self.counters.chunks.fetch_add(1, Ordering::Relaxed);
        self.counters
            .synthesis_ms
            .fetch_add(started.elapsed().as_millis() as u64, Ordering::Relaxed);
        Ok(result)
    }
}
