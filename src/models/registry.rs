//! Model registry: public facade for loading, sharing, and evicting models.
//!
//! The registry owns the authoritative state behind an async lock and
//! exposes the lifecycle operations: coalesced loads, borrow accounting,
//! explicit unloads, policy evaluation, and resource statistics. Physical
//! loads run on detached tasks so they complete even if the initiating
//! caller loses interest; duplicate callers for the same key attach to the
//! one load in flight.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, info, warn};

use crate::monitor::{ResourceMonitor, SystemMonitor};
use crate::telemetry;

use super::handle::{ModelHandle, ModelId, ModelKey, ModelKind};
use super::inflight::{Attach, LoadOutcome};
use super::janitor::{self, MaintenanceHandle};
use super::loader::{default_loaders, LoadError, LoadedArtifact, ModelLoader};
use super::policy::{select_candidates, UnloadingPolicy};
use super::state::RegistryState;

#[derive(Error, Debug, Clone)]
pub enum ModelError {
    #[error("model not found: {0}")]
    NotFound(ModelId),

    #[error("model {id} is in use ({ref_count} active borrows)")]
    InUse { id: ModelId, ref_count: u32 },

    #[error("load failed: {0}")]
    LoadFailed(#[source] Arc<LoadError>),

    #[error("insufficient memory: {required} bytes required, {available} available")]
    InsufficientMemory { required: u64, available: u64 },

    #[error("no loader registered for {0} artifacts")]
    NoLoader(ModelKind),
}

impl From<LoadError> for ModelError {
    fn from(err: LoadError) -> Self {
        Self::LoadFailed(Arc::new(err))
    }
}

/// How a `load` call was satisfied. Coalescing is an informational
/// outcome, never an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadDisposition {
    /// A new physical load was performed.
    Fresh,
    /// The artifact was already resident; only the borrow count moved.
    CachedHit,
    /// The call attached to a load already in flight for the same key.
    Coalesced,
}

/// Registry construction parameters.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    pub policy: UnloadingPolicy,
    /// Upper bound on a single loader invocation. `None` leaves it
    /// unbounded.
    pub load_timeout: Option<Duration>,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            policy: UnloadingPolicy::LeastRecentlyUsed {
                max_age: Duration::from_secs(24 * 3600),
            },
            load_timeout: None,
        }
    }
}

/// Summary of one maintenance sweep.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SweepSummary {
    pub evicted: Vec<ModelId>,
    pub freed_bytes: u64,
}

/// Combined system and registry memory statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceUsageStats {
    pub used_bytes: u64,
    pub total_bytes: u64,
    pub percent: f64,
    pub loaded_count: usize,
    pub loaded_bytes: u64,
}

struct RegistryInner {
    state: RwLock<RegistryState>,
    loaders: HashMap<ModelKind, Arc<dyn ModelLoader>>,
    monitor: Arc<dyn ResourceMonitor>,
    policy: parking_lot::RwLock<UnloadingPolicy>,
    load_timeout: Option<Duration>,
}

/// Resource-aware cache of loaded model artifacts.
///
/// Cheap to clone; clones share one cache.
#[derive(Clone)]
pub struct ModelRegistry {
    inner: Arc<RegistryInner>,
}

impl ModelRegistry {
    pub fn new(
        loaders: HashMap<ModelKind, Arc<dyn ModelLoader>>,
        monitor: Arc<dyn ResourceMonitor>,
        config: RegistryConfig,
    ) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                state: RwLock::new(RegistryState::default()),
                loaders,
                monitor,
                policy: parking_lot::RwLock::new(config.policy),
                load_timeout: config.load_timeout,
            }),
        }
    }

    /// Registry with the stock per-family loaders and the sysinfo-backed
    /// monitor.
    pub fn with_defaults(config: RegistryConfig) -> Self {
        Self::new(default_loaders(), Arc::new(SystemMonitor::new()), config)
    }

    /// Load the artifact at `path`, or share the one already resident.
    ///
    /// At most one physical load per `(path, kind)` key is ever in
    /// progress; duplicate callers attach to it and observe the same
    /// outcome. Every successful return counts as one borrow that must be
    /// paired with [`release`](Self::release).
    pub async fn load(
        &self,
        path: impl AsRef<Path>,
        kind: ModelKind,
    ) -> Result<ModelHandle, ModelError> {
        self.load_with_disposition(path, kind).await.map(|(h, _)| h)
    }

    /// [`load`](Self::load), also reporting how the call was satisfied.
    pub async fn load_with_disposition(
        &self,
        path: impl AsRef<Path>,
        kind: ModelKind,
    ) -> Result<(ModelHandle, LoadDisposition), ModelError> {
        let key = ModelKey::new(path.as_ref(), kind);
        loop {
            let attach = {
                let mut state = self.inner.state.write().await;
                if let Some(handle) = state.borrow_by_key(&key) {
                    debug!(id = %handle.id, ref_count = handle.ref_count, "cache hit");
                    return Ok((handle, LoadDisposition::CachedHit));
                }
                state.in_flight.attach(&key)
            };

            let (rx, disposition) = match attach {
                Attach::Leader(rx) => {
                    let registry = self.clone();
                    let task_key = key.clone();
                    // Detached: the physical load runs to completion even
                    // if every caller drops interest, since late waiters
                    // may still attach to it.
                    tokio::spawn(async move {
                        registry.run_physical_load(&task_key).await;
                    });
                    (rx, LoadDisposition::Fresh)
                }
                Attach::Joined(rx) => {
                    telemetry::record_coalesced_load(key.kind.as_str());
                    (rx, LoadDisposition::Coalesced)
                }
            };

            match self.await_outcome(rx).await? {
                Some(handle) => return Ok((handle, disposition)),
                // The handle was evicted between completion and our
                // borrow; start over with a fresh load.
                None => continue,
            }
        }
    }

    async fn await_outcome(
        &self,
        mut rx: broadcast::Receiver<LoadOutcome>,
    ) -> Result<Option<ModelHandle>, ModelError> {
        match rx.recv().await {
            Ok(Ok(id)) => {
                let mut state = self.inner.state.write().await;
                Ok(state.borrow(id))
            }
            Ok(Err(err)) => Err(err),
            Err(_) => Err(LoadError::Interrupted.into()),
        }
    }

    /// Perform the one physical load for `key` and publish the outcome to
    /// every attached caller.
    async fn run_physical_load(&self, key: &ModelKey) {
        let result = self.materialize(key).await;

        let mut state = self.inner.state.write().await;
        let outcome: LoadOutcome = match result {
            Ok((artifact, size_bytes)) => {
                let memory_bytes = artifact.memory_bytes;
                let handle = ModelHandle::new(key.path.clone(), key.kind, size_bytes, memory_bytes);
                let id = handle.id;
                state.insert(handle, artifact);
                telemetry::update_loaded(state.len(), state.loaded_bytes());
                info!(
                    %id,
                    path = %key.path.display(),
                    kind = %key.kind,
                    memory_bytes,
                    "model loaded"
                );
                Ok(id)
            }
            Err(err) => {
                telemetry::record_load_failure(key.kind.as_str());
                warn!(path = %key.path.display(), kind = %key.kind, error = %err, "model load failed");
                Err(err)
            }
        };

        let waiters = state.in_flight.complete(key, outcome);
        debug!(path = %key.path.display(), waiters, "load outcome published");
    }

    /// Estimate, capacity-check, and invoke the loader.
    async fn materialize(&self, key: &ModelKey) -> Result<(LoadedArtifact, u64), ModelError> {
        let loader = self
            .inner
            .loaders
            .get(&key.kind)
            .ok_or(ModelError::NoLoader(key.kind))?;

        let estimate = loader.estimate_memory(&key.path)?;
        self.ensure_capacity(estimate).await?;

        let started = Instant::now();
        let artifact = match self.inner.load_timeout {
            Some(timeout) => tokio::time::timeout(timeout, loader.load(&key.path))
                .await
                .map_err(|_| LoadError::Timeout(timeout))??,
            None => loader.load(&key.path).await?,
        };
        telemetry::record_model_loaded(
            key.kind.as_str(),
            artifact.memory_bytes,
            started.elapsed().as_millis() as u64,
        );

        // On-disk size; falls back to the estimate when the source is
        // gone already.
        let size_bytes = std::fs::metadata(&key.path)
            .map(|m| m.len())
            .unwrap_or(estimate);
        Ok((artifact, size_bytes))
    }

    /// Pre-load capacity check: when the projected footprint does not fit
    /// the system or the policy's memory budget, run one best-effort
    /// eviction pass before deciding.
    async fn ensure_capacity(&self, estimate: u64) -> Result<(), ModelError> {
        let snapshot = self.inner.monitor.snapshot();
        let loaded = self.inner.state.read().await.loaded_bytes();

        let over_system = snapshot.used_bytes.saturating_add(estimate) > snapshot.total_bytes;
        let over_budget = self
            .current_policy()
            .memory_threshold()
            .is_some_and(|cap| loaded.saturating_add(estimate) > cap);
        if !over_system && !over_budget {
            return Ok(());
        }

        debug!(estimate, over_system, over_budget, "capacity check triggered eviction pass");
        self.sweep_with_pending(estimate).await;

        // The policy budget is a soft target; only the system reading is
        // a hard failure after the pass.
        let snapshot = self.inner.monitor.snapshot();
        if snapshot.used_bytes.saturating_add(estimate) > snapshot.total_bytes {
            return Err(ModelError::InsufficientMemory {
                required: estimate,
                available: snapshot.available_bytes(),
            });
        }
        Ok(())
    }

    /// Drop one borrow of `id`. Returns the remaining count.
    ///
    /// Never evicts: a handle at zero borrows is merely eligible for
    /// eviction, not scheduled for it.
    pub async fn release(&self, id: ModelId) -> Result<u32, ModelError> {
        let mut state = self.inner.state.write().await;
        state.release(id).ok_or(ModelError::NotFound(id))
    }

    /// Unload `id` immediately. Fails with [`ModelError::InUse`] while
    /// borrows are active; a repeat unload reports
    /// [`ModelError::NotFound`].
    pub async fn unload(&self, id: ModelId) -> Result<(), ModelError> {
        let entry = {
            let mut state = self.inner.state.write().await;
            let kind = state
                .get(id)
                .map(|e| e.handle.kind)
                .ok_or(ModelError::NotFound(id))?;
            if !self.inner.loaders.contains_key(&kind) {
                return Err(ModelError::NoLoader(kind));
            }
            let entry = state.remove_idle(id)?;
            telemetry::update_loaded(state.len(), state.loaded_bytes());
            entry
        };

        let freed = entry.handle.memory_bytes;
        let kind = entry.handle.kind;
        // The loaders map is immutable after construction, so the kind
        // checked above is still present.
        if let Some(loader) = self.inner.loaders.get(&kind) {
            loader.unload(entry.artifact).await?;
        }
        telemetry::record_model_unloaded(freed);
        info!(%id, freed_bytes = freed, "model unloaded");
        Ok(())
    }

    /// Force-unload everything, active borrows included. Shutdown only.
    pub async fn unload_all(&self) {
        let entries = {
            let mut state = self.inner.state.write().await;
            let entries = state.drain_all();
            telemetry::update_loaded(0, 0);
            entries
        };
        for entry in entries {
            if let Some(loader) = self.inner.loaders.get(&entry.handle.kind) {
                if let Err(err) = loader.unload(entry.artifact).await {
                    warn!(id = %entry.handle.id, error = %err, "release failed during shutdown");
                }
            }
        }
        info!("all models unloaded");
    }

    /// Snapshot of all loaded handles in insertion order. Not a live
    /// view, and never refreshes recency.
    pub async fn list_loaded(&self) -> Vec<ModelHandle> {
        self.inner.state.read().await.snapshot()
    }

    /// Handle metadata for `id`, without touching recency.
    pub async fn get(&self, id: ModelId) -> Option<ModelHandle> {
        self.inner.state.read().await.get(id).map(|e| e.handle.clone())
    }

    pub async fn contains(&self, id: ModelId) -> bool {
        self.inner.state.read().await.get(id).is_some()
    }

    /// System snapshot combined with registry totals.
    pub async fn resource_usage_stats(&self) -> ResourceUsageStats {
        let snapshot = self.inner.monitor.snapshot();
        let state = self.inner.state.read().await;
        ResourceUsageStats {
            used_bytes: snapshot.used_bytes,
            total_bytes: snapshot.total_bytes,
            percent: snapshot.percent(),
            loaded_count: state.len(),
            loaded_bytes: state.loaded_bytes(),
        }
    }

    /// Dry run of the current policy: the handles it would evict right
    /// now, in eviction order, without evicting them.
    pub async fn evaluate_policy(&self) -> Vec<ModelId> {
        self.evaluate_policy_with_pending(0).await
    }

    async fn evaluate_policy_with_pending(&self, pending_bytes: u64) -> Vec<ModelId> {
        let handles = self.inner.state.read().await.snapshot();
        let policy = self.current_policy();
        select_candidates(&handles, Instant::now(), &policy, pending_bytes)
    }

    /// One maintenance cycle: evaluate the policy, unload each candidate,
    /// and keep going past per-candidate failures.
    pub async fn sweep(&self) -> SweepSummary {
        self.sweep_with_pending(0).await
    }

    async fn sweep_with_pending(&self, pending_bytes: u64) -> SweepSummary {
        let candidates = self.evaluate_policy_with_pending(pending_bytes).await;
        let mut summary = SweepSummary::default();
        for id in candidates {
            let freed = self.get(id).await.map(|h| h.memory_bytes).unwrap_or(0);
            match self.unload(id).await {
                Ok(()) => {
                    summary.evicted.push(id);
                    summary.freed_bytes += freed;
                }
                // A candidate may be re-borrowed or already gone between
                // evaluation and action; both are expected races.
                Err(ModelError::NotFound(_)) | Err(ModelError::InUse { .. }) => {
                    debug!(%id, "eviction candidate skipped");
                }
                Err(err) => {
                    warn!(%id, error = %err, "eviction failed");
                }
            }
        }
        if !summary.evicted.is_empty() {
            info!(
                evicted = summary.evicted.len(),
                freed_bytes = summary.freed_bytes,
                "sweep complete"
            );
        }
        telemetry::record_sweep(summary.evicted.len(), summary.freed_bytes);
        summary
    }

    pub fn current_policy(&self) -> UnloadingPolicy {
        self.inner.policy.read().clone()
    }

    pub fn set_policy(&self, policy: UnloadingPolicy) {
        info!(?policy, "unloading policy updated");
        *self.inner.policy.write() = policy;
    }

    /// Start the periodic janitor. Dropping or cancelling the returned
    /// handle stops future cycles without interrupting one in progress.
    pub fn start_background_maintenance(&self, interval: Duration) -> MaintenanceHandle {
        janitor::spawn(self.clone(), interval)
    }
}
