//! Queued text-to-speech jobs over a single lazily loaded voice model.
//!
//! Text is normalized, chunked, synthesized one chunk at a time through a
//! leased engine, filtered, stitched and written out as a WAV artifact. Jobs
//! are tracked in a [`JobStore`] and executed strictly in submission order by
//! the [`JobScheduler`].

pub mod audio;
pub mod chunker;
pub mod engine;
pub mod error;
pub mod job;
pub mod model;
pub mod normalizer;
pub mod piper;
pub mod presets;
pub mod reference;
pub mod scheduler;
pub mod store;
pub mod validation;
pub mod wav;

pub use audio::{AudioConfig, AudioProcessor};
pub use engine::{EngineLoader, SpeechEngine, SynthesisSettings};
pub use error::{Result, TtsError};
pub use job::{Job, JobArtifact, JobId, JobRequest, JobStatus};
pub use model::{ModelLease, ModelManager, ModelPhase, ModelStatus};
pub use piper::PiperLoader;
pub use presets::{Language, Preset, LANGUAGES, PRESETS};
pub use scheduler::{JobMetrics, JobScheduler, PipelineConfig, TtsRequest};
pub use store::JobStore;
