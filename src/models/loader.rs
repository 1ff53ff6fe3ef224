//! Loader capability for materializing model artifacts.
//!
//! The registry treats loaders as opaque capabilities: one implementation
//! per artifact family, dispatched by [`ModelKind`]. Format validation
//! belongs here, never in the registry.

use std::collections::HashMap;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use memmap2::Mmap;
use thiserror::Error;
use tracing::debug;

use super::handle::ModelKind;

#[derive(Error, Debug)]
pub enum LoadError {
    #[error("model file not found: {0}")]
    NotFound(PathBuf),

    #[error("invalid model format: {0}")]
    InvalidFormat(String),

    #[error("load timed out after {0:?}")]
    Timeout(Duration),

    #[error("load abandoned before completion")]
    Interrupted,

    #[error("release failed: {0}")]
    ReleaseFailed(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Payload of a materialized artifact.
pub enum ArtifactPayload {
    /// Zero-copy read-only mapping of the on-disk file.
    Mapped(Mmap),
    /// Fully buffered in heap memory.
    Buffered(Vec<u8>),
}

impl std::fmt::Debug for ArtifactPayload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Mapped(m) => f.debug_tuple("Mapped").field(&m.len()).finish(),
            Self::Buffered(b) => f.debug_tuple("Buffered").field(&b.len()).finish(),
        }
    }
}

/// A materialized artifact together with its resident footprint.
#[derive(Debug)]
pub struct LoadedArtifact {
    pub memory_bytes: u64,
    pub payload: ArtifactPayload,
}

impl LoadedArtifact {
    pub fn as_bytes(&self) -> &[u8] {
        match &self.payload {
            ArtifactPayload::Mapped(m) => m,
            ArtifactPayload::Buffered(b) => b,
        }
    }
}

/// Capability for materializing and releasing artifacts of one family.
///
/// Implementations own their partial-state cleanup: if the returned future
/// is dropped (for example on timeout), no resources may leak.
#[async_trait]
pub trait ModelLoader: Send + Sync {
    /// Materialize the artifact at `path` into memory.
    async fn load(&self, path: &Path) -> Result<LoadedArtifact, LoadError>;

    /// Release a previously materialized artifact.
    async fn unload(&self, artifact: LoadedArtifact) -> Result<(), LoadError>;

    /// Estimated resident footprint before loading.
    ///
    /// Defaults to the on-disk size, which is exact for mapped loaders and
    /// a lower bound for formats with expansion overhead.
    fn estimate_memory(&self, path: &Path) -> Result<u64, LoadError> {
        let meta = std::fs::metadata(path).map_err(|_| LoadError::NotFound(path.to_path_buf()))?;
        Ok(meta.len())
    }
}

fn validate_path(path: &Path, kind: ModelKind) -> Result<(), LoadError> {
    if !path.is_file() {
        return Err(LoadError::NotFound(path.to_path_buf()));
    }
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case(kind.extension()) => Ok(()),
        Some(ext) => Err(LoadError::InvalidFormat(format!(
            "expected .{} for {} artifact, got .{}",
            kind.extension(),
            kind,
            ext
        ))),
        None => Err(LoadError::InvalidFormat(format!(
            "expected .{} for {} artifact, got no extension",
            kind.extension(),
            kind
        ))),
    }
}

/// Zero-copy loader backed by read-only memory mapping.
pub struct MmapLoader {
    kind: ModelKind,
}

impl MmapLoader {
    pub fn new(kind: ModelKind) -> Self {
        Self { kind }
    }
}

#[async_trait]
impl ModelLoader for MmapLoader {
    async fn load(&self, path: &Path) -> Result<LoadedArtifact, LoadError> {
        validate_path(path, self.kind)?;
        let file = File::open(path)?;
        // SAFETY: read-only mapping; artifact files are not modified while loaded.
        let mmap = unsafe { Mmap::map(&file)? };
        let memory_bytes = mmap.len() as u64;
        debug!(path = %path.display(), memory_bytes, "mapped artifact");
        Ok(LoadedArtifact {
            memory_bytes,
            payload: ArtifactPayload::Mapped(mmap),
        })
    }

    async fn unload(&self, artifact: LoadedArtifact) -> Result<(), LoadError> {
        debug!(memory_bytes = artifact.memory_bytes, "unmapping artifact");
        drop(artifact);
        Ok(())
    }
}

/// Loader that reads the whole artifact into heap memory.
pub struct HeapLoader {
    kind: ModelKind,
}

impl HeapLoader {
    pub fn new(kind: ModelKind) -> Self {
        Self { kind }
    }
}

#[async_trait]
impl ModelLoader for HeapLoader {
    async fn load(&self, path: &Path) -> Result<LoadedArtifact, LoadError> {
        validate_path(path, self.kind)?;
        let bytes = tokio::fs::read(path).await?;
        let memory_bytes = bytes.len() as u64;
        debug!(path = %path.display(), memory_bytes, "buffered artifact");
        Ok(LoadedArtifact {
            memory_bytes,
            payload: ArtifactPayload::Buffered(bytes),
        })
    }

    async fn unload(&self, artifact: LoadedArtifact) -> Result<(), LoadError> {
        debug!(memory_bytes = artifact.memory_bytes, "releasing buffered artifact");
        drop(artifact);
        Ok(())
    }
}

/// Stock loader wiring: one implementation per supported family.
pub fn default_loaders() -> HashMap<ModelKind, Arc<dyn ModelLoader>> {
    let mut loaders: HashMap<ModelKind, Arc<dyn ModelLoader>> = HashMap::new();
    loaders.insert(ModelKind::Gguf, Arc::new(MmapLoader::new(ModelKind::Gguf)));
    loaders.insert(
        ModelKind::SafeTensors,
        Arc::new(MmapLoader::new(ModelKind::SafeTensors)),
    );
    loaders.insert(ModelKind::Onnx, Arc::new(HeapLoader::new(ModelKind::Onnx)));
    loaders
}
