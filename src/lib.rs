//! Resource-aware lifecycle cache for machine-learning model artifacts.
//!
//! Loading a multi-gigabyte model is expensive; loading it twice because
//! two requests raced is worse. This crate provides a [`ModelRegistry`]
//! that guarantees at most one physical load per artifact, shares loaded
//! models through reference-counted handles, and evicts idle models under
//! a configurable policy driven by actual system memory pressure.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use modelcache::{ModelKind, ModelRegistry, RegistryConfig, UnloadingPolicy};
//!
//! # async fn demo() -> Result<(), modelcache::ModelError> {
//! let registry = ModelRegistry::with_defaults(RegistryConfig {
//!     policy: UnloadingPolicy::Hybrid {
//!         max_age: Duration::from_secs(1800),
//!         max_total_bytes: 8 * 1024 * 1024 * 1024,
//!     },
//!     load_timeout: Some(Duration::from_secs(120)),
//! });
//! let _janitor = registry.start_background_maintenance(Duration::from_secs(300));
//!
//! let handle = registry.load("/models/llama.gguf", ModelKind::Gguf).await?;
//! // ... use the artifact ...
//! registry.release(handle.id).await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod models;
pub mod monitor;
pub mod telemetry;

pub use models::{
    default_loaders, select_candidates, ArtifactPayload, HeapLoader, LoadDisposition, LoadError,
    LoadedArtifact, MaintenanceHandle, MmapLoader, ModelError, ModelHandle, ModelId, ModelKey,
    ModelKind, ModelLoader, ModelRegistry, RegistryConfig, ResourceUsageStats, SweepSummary,
    UnloadingPolicy,
};
pub use monitor::{FixedMonitor, ResourceMonitor, ResourceSnapshot, SystemMonitor};
