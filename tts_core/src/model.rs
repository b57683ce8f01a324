//! Lifecycle of the single loaded inference engine.
//!
//! The engine moves through `unloaded -> loading -> ready -> unloading ->
//! unloaded`. Every transition happens while holding `transition`, so at most
//! one load or unload is ever in flight; callers that arrive mid-transition
//! queue on that lock and re-check the state when they get it.
//!
//! Synthesis only happens through a [`ModelLease`]. Leases are counted, and
//! neither the idle reaper nor a forced unload frees the engine while one is
//! outstanding.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{Mutex as AsyncMutex, Notify};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{error, info, warn};

use crate::engine::{EngineLoader, SpeechEngine};
use crate::error::{Result, TtsError};

enum ModelState {
    Unloaded,
    Loading,
    Ready(Arc<dyn SpeechEngine>),
    Unloading,
}

impl ModelState {
    fn phase(&self) -> ModelPhase {
        match self {
            ModelState::Unloaded => ModelPhase::Unloaded,
            ModelState::Loading => ModelPhase::Loading,
            ModelState::Ready(_) => ModelPhase::Ready,
            ModelState::Unloading => ModelPhase::Unloading,
        }
    }
}

/// Observable lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelPhase {
    Unloaded,
    Loading,
    Ready,
    Unloading,
}

struct Slot {
    state: ModelState,
    leases: usize,
    last_used_at: Option<Instant>,
}

struct Inner {
    loader: Arc<dyn EngineLoader>,
    slot: Mutex<Slot>,
    transition: AsyncMutex<()>,
    released: Notify,
    idle_timeout: Duration,
    loads: AtomicU64,
    unloads: AtomicU64,
}

impl Inner {
    // Never held across an await point.
    fn slot(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Health snapshot of the model slot.
#[derive(Debug, Clone, Serialize)]
pub struct ModelStatus {
    pub state: ModelPhase,
    pub loaded: bool,
    pub active_leases: usize,
    pub idle_seconds: Option<u64>,
    pub timeout_seconds: u64,
    pub remaining_seconds: Option<u64>,
    pub load_count: u64,
    pub unload_count: u64,
}

/// Owns the process-wide engine instance. Cheap to clone.
#[derive(Clone)]
pub struct ModelManager {
    inner: Arc<Inner>,
}

impl ModelManager {
    /// `idle_timeout` of zero disables idle eviction.
    pub fn new(loader: Arc<dyn EngineLoader>, idle_timeout: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                loader,
                slot: Mutex::new(Slot {
                    state: ModelState::Unloaded,
                    leases: 0,
                    last_used_at: None,
                }),
                transition: AsyncMutex::new(()),
                released: Notify::new(),
                idle_timeout,
                loads: AtomicU64::new(0),
                unloads: AtomicU64::new(0),
            }),
        }
    }

    pub fn idle_timeout(&self) -> Duration {
        self.inner.idle_timeout
    }

    pub fn phase(&self) -> ModelPhase {
        self.inner.slot().state.phase()
    }

    /// Wait until the engine is ready and lease it, loading it if needed.
    ///
    /// A load failure leaves the slot `unloaded`; the next call tries again.
    pub async fn acquire(&self) -> Result<ModelLease> {
        if let Some(lease) = self.try_lease() {
            return Ok(lease);
        }

        let _transition = self.inner.transition.lock().await;
        if let Some(lease) = self.try_lease() {
            return Ok(lease);
        }

        // Loading and Unloading only exist while `transition` is held.
        let mut guard = LoadingGuard::arm(&self.inner);

        info!("Loading TTS model...");
        let started = std::time::Instant::now();
        let loader = Arc::clone(&self.inner.loader);
        let engine = match tokio::task::spawn_blocking(move || loader.load()).await {
            Ok(Ok(engine)) => engine,
            Ok(Err(e)) => {
                error!("Failed to load TTS model: {e:#}");
                return Err(TtsError::ModelLoad(format!("{e:#}")));
            }
            Err(join_err) => {
                error!("Model loader task failed: {join_err}");
                return Err(TtsError::ModelLoad(format!("loader task failed: {join_err}")));
            }
        };

        let mut slot = self.inner.slot();
        slot.state = ModelState::Ready(Arc::clone(&engine));
        slot.leases += 1;
        slot.last_used_at = Some(Instant::now());
        drop(slot);
        guard.disarm();

        self.inner.loads.fetch_add(1, Ordering::Relaxed);
        info!(
            "TTS model loaded in {} ms ({} Hz)",
            started.elapsed().as_millis(),
            engine.sample_rate()
        );
        Ok(ModelLease {
            inner: Arc::clone(&self.inner),
            engine,
        })
    }

    fn try_lease(&self) -> Option<ModelLease> {
        let mut slot = self.inner.slot();
        let engine = match &slot.state {
            ModelState::Ready(engine) => Arc::clone(engine),
            _ => return None,
        };
        slot.leases += 1;
        Some(ModelLease {
            inner: Arc::clone(&self.inner),
            engine,
        })
    }

    /// Unload the engine if it has sat unused for longer than `idle_timeout`.
    ///
    /// Returns `true` when an unload happened. Skips quietly while a lease is
    /// outstanding or another transition is in flight.
    pub async fn reap(&self, idle_timeout: Duration) -> bool {
        if idle_timeout.is_zero() {
            return false;
        }
        let Ok(_transition) = self.inner.transition.try_lock() else {
            return false;
        };

        let (engine, idle) = {
            let mut slot = self.inner.slot();
            let idle = match (&slot.state, slot.last_used_at) {
                (ModelState::Ready(_), Some(last_used)) => last_used.elapsed(),
                _ => return false,
            };
            if slot.leases > 0 || idle <= idle_timeout {
                return false;
            }
            match std::mem::replace(&mut slot.state, ModelState::Unloading) {
                ModelState::Ready(engine) => (engine, idle),
                other => {
                    slot.state = other;
                    return false;
                }
            }
        };

        info!(
            "TTS model idle for {}s (timeout {}s), unloading",
            idle.as_secs(),
            idle_timeout.as_secs()
        );
        self.finish_unload(engine).await;
        true
    }

    /// Evict the engine now, waiting for outstanding leases to be released.
    ///
    /// New leases are refused from the moment this starts. Returns `false`
    /// when nothing was loaded. The unload runs on its own task, so dropping
    /// the returned future does not leave the slot half-transitioned.
    pub async fn force_unload(&self) -> bool {
        let manager = self.clone();
        match tokio::spawn(async move { manager.force_unload_inner().await }).await {
            Ok(unloaded) => unloaded,
            Err(join_err) => {
                error!("Forced unload task failed: {join_err}");
                false
            }
        }
    }

    async fn force_unload_inner(&self) -> bool {
        let _transition = self.inner.transition.lock().await;
        let engine = {
            let mut slot = self.inner.slot();
            match std::mem::replace(&mut slot.state, ModelState::Unloading) {
                ModelState::Ready(engine) => engine,
                other => {
                    slot.state = other;
                    return false;
                }
            }
        };

        loop {
            let released = self.inner.released.notified();
            tokio::pin!(released);
            released.as_mut().enable();
            let leases = self.inner.slot().leases;
            if leases == 0 {
                break;
            }
            info!("Waiting for {leases} active lease(s) before unloading");
            released.await;
        }

        info!("Unloading TTS model on request");
        self.finish_unload(engine).await;
        true
    }

    /// Caller holds `transition` and has already moved the slot to `Unloading`.
    async fn finish_unload(&self, engine: Arc<dyn SpeechEngine>) {
        let outcome = tokio::task::spawn_blocking(move || engine.unload()).await;
        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("Engine unload reported an error: {e:#}"),
            Err(join_err) => warn!("Engine unload task failed: {join_err}"),
        }

        let mut slot = self.inner.slot();
        slot.state = ModelState::Unloaded;
        slot.last_used_at = None;
        drop(slot);

        self.inner.unloads.fetch_add(1, Ordering::Relaxed);
        info!("TTS model unloaded");
    }

    /// Periodically evict the engine once it has been idle for the configured
    /// timeout. Returns `None` when idle eviction is disabled.
    ///
    /// The task stops on its own once every manager handle is dropped.
    pub fn spawn_reaper(&self, interval: Duration) -> Option<JoinHandle<()>> {
        let idle_timeout = self.inner.idle_timeout;
        if idle_timeout.is_zero() {
            info!("Model idle eviction disabled");
            return None;
        }
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        info!(
            "Model idle eviction after {}s, checked every {}s",
            idle_timeout.as_secs(),
            interval.as_secs()
        );

        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                ModelManager { inner }.reap(idle_timeout).await;
            }
        }))
    }

    pub fn status(&self) -> ModelStatus {
        let slot = self.inner.slot();
        let timeout_seconds = self.inner.idle_timeout.as_secs();
        let loaded = matches!(slot.state, ModelState::Ready(_));
        let idle_seconds = if loaded {
            slot.last_used_at.map(|t| t.elapsed().as_secs())
        } else {
            None
        };
        let remaining_seconds = match idle_seconds {
            Some(idle) if timeout_seconds > 0 => Some(timeout_seconds.saturating_sub(idle)),
            _ => None,
        };
        ModelStatus {
            state: slot.state.phase(),
            loaded,
            active_leases: slot.leases,
            idle_seconds,
            timeout_seconds,
            remaining_seconds,
            load_count: self.inner.loads.load(Ordering::Relaxed),
            unload_count: self.inner.unloads.load(Ordering::Relaxed),
        }
    }
}

/// Puts the slot in `Loading` and reverts it to `Unloaded` unless disarmed.
struct LoadingGuard<'a> {
    inner: &'a Inner,
    armed: bool,
}

impl<'a> LoadingGuard<'a> {
    fn arm(inner: &'a Inner) -> Self {
        inner.slot().state = ModelState::Loading;
        Self { inner, armed: true }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.inner.slot().state = ModelState::Unloaded;
        }
    }
}

/// Shared access to the ready engine. Dropping it is the release.
pub struct ModelLease {
    inner: Arc<Inner>,
    engine: Arc<dyn SpeechEngine>,
}

impl ModelLease {
    pub fn engine(&self) -> &dyn SpeechEngine {
        self.engine.as_ref()
    }

    /// Record the use and give the lease back.
    pub fn release(self) {}
}

impl Drop for ModelLease {
    fn drop(&mut self) {
        let mut slot = self.inner.slot();
        slot.leases = slot.leases.saturating_sub(1);
        slot.last_used_at = Some(Instant::now());
        drop(slot);
        self.inner.released.notify_waiters();
    }
}
