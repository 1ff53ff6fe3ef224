//! Model identity and handle types.
//!
//! A [`ModelHandle`] is the registry's public view of one loaded artifact:
//! identity, provenance, resident footprint, and the bookkeeping the
//! eviction policies read (recency and borrow count). Handles returned by
//! the registry are snapshots; the registry owns the live copy.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Instant;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identity of one loaded model instance.
///
/// Reloading the same artifact after an unload yields a new id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModelId(Uuid);

impl ModelId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for ModelId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ModelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Supported artifact families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelKind {
    Gguf,
    Onnx,
    SafeTensors,
}

impl ModelKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Gguf => "gguf",
            Self::Onnx => "onnx",
            Self::SafeTensors => "safetensors",
        }
    }

    /// Expected file extension for this family.
    pub fn extension(&self) -> &'static str {
        self.as_str()
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cache identity of an artifact: same path and kind means same model.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ModelKey {
    pub path: PathBuf,
    pub kind: ModelKind,
}

impl ModelKey {
    pub fn new(path: impl AsRef<Path>, kind: ModelKind) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            kind,
        }
    }
}

/// Metadata for one loaded model.
#[derive(Debug, Clone)]
pub struct ModelHandle {
    pub id: ModelId,
    pub path: PathBuf,
    pub kind: ModelKind,
    /// On-disk size of the source artifact.
    pub size_bytes: u64,
    /// Resident footprint while loaded.
    pub memory_bytes: u64,
    pub loaded_at: Instant,
    pub last_used_at: Instant,
    /// Active borrows. Non-zero pins the model against eviction.
    pub ref_count: u32,
}

impl ModelHandle {
    pub fn new(
        path: impl Into<PathBuf>,
        kind: ModelKind,
        size_bytes: u64,
        memory_bytes: u64,
    ) -> Self {
        let now = Instant::now();
        Self {
            id: ModelId::new(),
            path: path.into(),
            kind,
            size_bytes,
            memory_bytes,
            loaded_at: now,
            last_used_at: now,
            ref_count: 0,
        }
    }

    pub fn key(&self) -> ModelKey {
        ModelKey::new(&self.path, self.kind)
    }

    /// Refresh recency. Called on every borrow.
    pub(crate) fn touch(&mut self) {
        self.last_used_at = Instant::now();
    }

    pub fn is_pinned(&self) -> bool {
        self.ref_count > 0
    }
}
