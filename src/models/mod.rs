//! Model lifecycle management: loading, sharing, eviction, maintenance.

mod handle;
mod inflight;
mod janitor;
mod loader;
mod policy;
mod registry;
mod state;

pub use handle::{ModelHandle, ModelId, ModelKey, ModelKind};
pub use janitor::MaintenanceHandle;
pub use loader::{
    default_loaders, ArtifactPayload, HeapLoader, LoadError, LoadedArtifact, MmapLoader,
    ModelLoader,
};
pub use policy::{select_candidates, UnloadingPolicy};
pub use registry::{
    LoadDisposition, ModelError, ModelRegistry, RegistryConfig, ResourceUsageStats, SweepSummary,
};
