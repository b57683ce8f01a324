//! Job record and its state machine.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::engine::SynthesisSettings;
use crate::error::{Result, TtsError};

pub type JobId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

/// Immutable snapshot of what was asked for, with presets and seeds resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRequest {
    pub text: String,
    pub preset: Option<String>,
    pub reference_audio: Option<PathBuf>,
    pub settings: SynthesisSettings,
}

/// The finished audio file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobArtifact {
    pub file_name: String,
    pub path: PathBuf,
    pub duration_ms: u64,
    pub sample_rate: u32,
    pub chunk_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub status: JobStatus,
    pub progress: u8,
    pub request: JobRequest,
    pub result: Option<JobArtifact>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    pub fn new(request: JobRequest) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            status: JobStatus::Queued,
            progress: 0,
            request,
            result: None,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// `queued -> processing`
    pub fn start(&mut self) -> Result<()> {
        self.expect(JobStatus::Queued, "start")?;
        self.status = JobStatus::Processing;
        self.touch();
        Ok(())
    }

    /// Record `done` of `total` chunks. Progress never moves backwards and
    /// stays below 100 until the artifact is persisted.
    pub fn advance(&mut self, done: usize, total: usize) -> Result<()> {
        self.expect(JobStatus::Processing, "advance")?;
        let pct = if total == 0 {
            0
        } else {
            (done.min(total) * 100 / total).min(99) as u8
        };
        self.progress = self.progress.max(pct);
        self.touch();
        Ok(())
    }

    /// `processing -> completed`
    pub fn complete(&mut self, artifact: JobArtifact) -> Result<()> {
        self.expect(JobStatus::Processing, "complete")?;
        self.status = JobStatus::Completed;
        self.progress = 100;
        self.result = Some(artifact);
        self.error = None;
        self.touch();
        Ok(())
    }

    /// `queued | processing -> failed`
    pub fn fail(&mut self, message: impl Into<String>) -> Result<()> {
        if self.status.is_terminal() {
            return Err(self.transition_error("fail"));
        }
        self.status = JobStatus::Failed;
        self.result = None;
        self.error = Some(message.into());
        self.touch();
        Ok(())
    }

    fn expect(&self, status: JobStatus, action: &str) -> Result<()> {
        if self.status == status {
            Ok(())
        } else {
            Err(self.transition_error(action))
        }
    }

    fn transition_error(&self, action: &str) -> TtsError {
        TtsError::InvalidTransition(format!(
            "cannot {action} job {} in state {:?}",
            self.id, self.status
        ))
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}
