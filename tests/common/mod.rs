//! Shared test support: an instrumented loader and registry builders.

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use modelcache::{
    ArtifactPayload, FixedMonitor, LoadError, LoadedArtifact, ModelKind, ModelLoader,
    ModelRegistry, RegistryConfig, ResourceMonitor,
};

/// Loader that fabricates artifacts without touching the filesystem and
/// counts every call, so tests can assert exactly how many physical loads
/// happened.
pub struct MockLoader {
    /// Resident footprint reported for every artifact.
    pub memory_bytes: u64,
    /// Artificial latency per load, to hold loads open for coalescing.
    pub load_delay: Duration,
    /// Artificial latency per unload.
    pub unload_delay: Duration,
    /// When set, every load fails with an invalid-format error.
    pub fail_loads: AtomicBool,
    pub load_calls: AtomicUsize,
    pub unload_calls: AtomicUsize,
    pub active_unloads: AtomicUsize,
    /// High-water mark of unloads running at once.
    pub max_concurrent_unloads: AtomicUsize,
}

impl Default for MockLoader {
    fn default() -> Self {
        Self {
            memory_bytes: 1024,
            load_delay: Duration::ZERO,
            unload_delay: Duration::ZERO,
            fail_loads: AtomicBool::new(false),
            load_calls: AtomicUsize::new(0),
            unload_calls: AtomicUsize::new(0),
            active_unloads: AtomicUsize::new(0),
            max_concurrent_unloads: AtomicUsize::new(0),
        }
    }
}

impl MockLoader {
    pub fn with_memory(memory_bytes: u64) -> Self {
        Self {
            memory_bytes,
            ..Self::default()
        }
    }

    pub fn loads(&self) -> usize {
        self.load_calls.load(Ordering::SeqCst)
    }

    pub fn unloads(&self) -> usize {
        self.unload_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ModelLoader for MockLoader {
    async fn load(&self, path: &Path) -> Result<LoadedArtifact, LoadError> {
        self.load_calls.fetch_add(1, Ordering::SeqCst);
        if !self.load_delay.is_zero() {
            tokio::time::sleep(self.load_delay).await;
        }
        if self.fail_loads.load(Ordering::SeqCst) {
            return Err(LoadError::InvalidFormat(format!(
                "corrupt artifact: {}",
                path.display()
            )));
        }
        Ok(LoadedArtifact {
            memory_bytes: self.memory_bytes,
            payload: ArtifactPayload::Buffered(vec![0u8; 16]),
        })
    }

    async fn unload(&self, artifact: LoadedArtifact) -> Result<(), LoadError> {
        let active = self.active_unloads.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_concurrent_unloads
            .fetch_max(active, Ordering::SeqCst);
        if !self.unload_delay.is_zero() {
            tokio::time::sleep(self.unload_delay).await;
        }
        self.active_unloads.fetch_sub(1, Ordering::SeqCst);
        self.unload_calls.fetch_add(1, Ordering::SeqCst);
        drop(artifact);
        Ok(())
    }

    fn estimate_memory(&self, _path: &Path) -> Result<u64, LoadError> {
        Ok(self.memory_bytes)
    }
}

/// Monitor with effectively unlimited headroom.
pub fn roomy_monitor() -> Arc<FixedMonitor> {
    Arc::new(FixedMonitor::new(0, 1 << 40))
}

/// Registry serving GGUF loads through the given mock loader.
pub fn registry_with(
    loader: Arc<MockLoader>,
    monitor: Arc<dyn ResourceMonitor>,
    config: RegistryConfig,
) -> Arc<ModelRegistry> {
    let mut loaders: HashMap<ModelKind, Arc<dyn ModelLoader>> = HashMap::new();
    loaders.insert(ModelKind::Gguf, loader);
    Arc::new(ModelRegistry::new(loaders, monitor, config))
}

/// Registry with a fresh default mock loader and unlimited memory.
pub fn simple_registry() -> (Arc<ModelRegistry>, Arc<MockLoader>) {
    let loader = Arc::new(MockLoader::default());
    let registry = registry_with(
        Arc::clone(&loader),
        roomy_monitor(),
        RegistryConfig::default(),
    );
    (registry, loader)
}
