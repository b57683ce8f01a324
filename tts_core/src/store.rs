//! Durable job records.
//!
//! Layout under the outputs directory:
//!
//! ```text
//! jobs/<id>.json     job metadata, rewritten on every update
//! audio/<id>.wav     final artifact of a completed job
//! uploads/<id>.<ext> reference clip, removed once the job is terminal
//! ```
//!
//! Readers get `Arc<Job>` snapshots. An update clones the current record,
//! mutates the clone, persists it and only then swaps it in.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use tracing::{info, warn};

use crate::error::{Result, TtsError};
use crate::job::{Job, JobArtifact, JobId, JobStatus};
use crate::wav;

const RESTART_ERROR: &str = "interrupted by restart";

pub struct JobStore {
    jobs_dir: PathBuf,
    audio_dir: PathBuf,
    uploads_dir: PathBuf,
    jobs: DashMap<JobId, Arc<Job>>,
}

impl JobStore {
    /// Open (or create) a store rooted at `dir` and load existing records.
    ///
    /// Jobs that were still queued or processing when the previous process
    /// stopped are marked failed; nothing is resumed.
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let root = dir.as_ref();
        let store = Self {
            jobs_dir: root.join("jobs"),
            audio_dir: root.join("audio"),
            uploads_dir: root.join("uploads"),
            jobs: DashMap::new(),
        };
        fs::create_dir_all(&store.jobs_dir)?;
        fs::create_dir_all(&store.audio_dir)?;
        fs::create_dir_all(&store.uploads_dir)?;

        let mut interrupted = 0usize;
        for entry in fs::read_dir(&store.jobs_dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let mut job: Job = match fs::read(&path)
                .map_err(TtsError::from)
                .and_then(|bytes| serde_json::from_slice(&bytes).map_err(TtsError::from))
            {
                Ok(job) => job,
                Err(e) => {
                    warn!("Skipping unreadable job record {}: {}", path.display(), e);
                    continue;
                }
            };
            if !job.status.is_terminal() {
                job.fail(RESTART_ERROR)?;
                store.persist(&job)?;
                interrupted += 1;
            }
            store.jobs.insert(job.id, Arc::new(job));
        }

        // Every loaded job is terminal now, so no upload is still needed.
        for entry in fs::read_dir(&store.uploads_dir)? {
            let path = entry?.path();
            if let Err(e) = fs::remove_file(&path) {
                warn!("Failed to remove stale upload {}: {}", path.display(), e);
            }
        }

        info!(
            "Job store opened at {} ({} jobs, {} interrupted)",
            root.display(),
            store.jobs.len(),
            interrupted
        );
        Ok(store)
    }

    /// Persist and register a new job.
    pub fn create(&self, job: Job) -> Result<Arc<Job>> {
        if self.jobs.contains_key(&job.id) {
            return Err(TtsError::Storage(format!("job {} already exists", job.id)));
        }
        self.persist(&job)?;
        let job = Arc::new(job);
        self.jobs.insert(job.id, Arc::clone(&job));
        Ok(job)
    }

    pub fn get(&self, id: &JobId) -> Option<Arc<Job>> {
        self.jobs.get(id).map(|entry| Arc::clone(entry.value()))
    }

    /// Apply `f` to a copy of the job, persist it, then publish it.
    ///
    /// If `f` or the write fails the stored record is left untouched. Each
    /// job has a single writer at a time (the worker, or `submit` before the
    /// job is queued), so no map lock is held while the record is written.
    pub fn update<F>(&self, id: &JobId, f: F) -> Result<Arc<Job>>
    where
        F: FnOnce(&mut Job) -> Result<()>,
    {
        let current = self
            .get(id)
            .ok_or_else(|| TtsError::NotFound(id.to_string()))?;
        let mut next = Job::clone(&current);
        f(&mut next)?;
        self.persist(&next)?;
        let next = Arc::new(next);
        self.jobs.insert(next.id, Arc::clone(&next));
        Ok(next)
    }

    /// Most recently created jobs first.
    pub fn list_recent(&self, limit: usize) -> Vec<Arc<Job>> {
        let mut jobs: Vec<Arc<Job>> = self.jobs.iter().map(|e| Arc::clone(e.value())).collect();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        jobs.truncate(limit);
        jobs
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn artifact_path(&self, id: &JobId) -> PathBuf {
        self.audio_dir.join(format!("{id}.wav"))
    }

    /// Write the final audio of a job as WAV and describe it.
    pub fn save_artifact(
        &self,
        id: &JobId,
        samples: &[f32],
        sample_rate: u32,
        chunk_count: usize,
    ) -> Result<JobArtifact> {
        let path = self.artifact_path(id);
        wav::write_wav(&path, samples, sample_rate)?;
        Ok(JobArtifact {
            file_name: format!("{id}.wav"),
            path,
            duration_ms: crate::audio::duration_ms(samples.len(), sample_rate),
            sample_rate,
            chunk_count,
        })
    }

    /// Write the artifact and mark the job completed. If the record cannot
    /// be updated the WAV is removed again.
    pub fn complete_with_artifact(
        &self,
        id: &JobId,
        samples: &[f32],
        sample_rate: u32,
        chunk_count: usize,
    ) -> Result<JobArtifact> {
        let artifact = self.save_artifact(id, samples, sample_rate, chunk_count)?;
        if let Err(e) = self.update(id, |job| job.complete(artifact.clone())) {
            self.remove_artifact(id);
            return Err(e);
        }
        Ok(artifact)
    }

    /// Best effort; a missing file is not an error.
    pub fn remove_artifact(&self, id: &JobId) {
        remove_quietly(&self.artifact_path(id));
    }

    /// WAV bytes of a completed job.
    pub fn read_artifact(&self, id: &JobId) -> Result<Vec<u8>> {
        let job = self
            .get(id)
            .ok_or_else(|| TtsError::NotFound(id.to_string()))?;
        let artifact = match (&job.status, &job.result) {
            (JobStatus::Completed, Some(artifact)) => artifact,
            _ => {
                return Err(TtsError::NotFound(format!(
                    "job {id} has no audio (status {:?})",
                    job.status
                )))
            }
        };
        fs::read(&artifact.path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => TtsError::NotFound(format!("audio file for job {id} is missing")),
            _ => TtsError::Io(e),
        })
    }

    /// Store a reference clip for a job that is about to be created.
    pub fn save_upload(&self, id: &JobId, bytes: &[u8], extension: &str) -> Result<PathBuf> {
        let path = self.uploads_dir.join(format!("{id}.{extension}"));
        fs::write(&path, bytes)?;
        Ok(path)
    }

    /// Best effort; a missing file is not an error.
    pub fn remove_upload(&self, path: &Path) {
        remove_quietly(path);
    }

    fn persist(&self, job: &Job) -> Result<()> {
        let path = self.jobs_dir.join(format!("{}.json", job.id));
        let tmp = self.jobs_dir.join(format!("{}.json.tmp", job.id));
        let bytes = serde_json::to_vec_pretty(job)?;
        fs::write(&tmp, bytes)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }
}

fn remove_quietly(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to remove {}: {}", path.display(), e),
    }
}
