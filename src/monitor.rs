//! System memory observation.
//!
//! The registry consults a monitor before admitting new loads; swapping in
//! a fixed monitor makes capacity behavior deterministic under test.

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use sysinfo::{MemoryRefreshKind, RefreshKind, System};

/// Point-in-time memory reading.
#[derive(Debug, Clone, Copy)]
pub struct ResourceSnapshot {
    pub used_bytes: u64,
    pub total_bytes: u64,
}

impl ResourceSnapshot {
    /// Utilization as a percentage of total. Zero-total readings report 0.
    pub fn percent(&self) -> f64 {
        if self.total_bytes == 0 {
            return 0.0;
        }
        (self.used_bytes as f64 / self.total_bytes as f64) * 100.0
    }

    pub fn available_bytes(&self) -> u64 {
        self.total_bytes.saturating_sub(self.used_bytes)
    }
}

/// Source of memory readings.
pub trait ResourceMonitor: Send + Sync {
    fn snapshot(&self) -> ResourceSnapshot;
}

/// Monitor backed by the host's actual memory counters.
pub struct SystemMonitor {
    system: Mutex<System>,
}

impl SystemMonitor {
    pub fn new() -> Self {
        let system = System::new_with_specifics(
            RefreshKind::new().with_memory(MemoryRefreshKind::everything()),
        );
        Self {
            system: Mutex::new(system),
        }
    }
}

impl Default for SystemMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceMonitor for SystemMonitor {
    fn snapshot(&self) -> ResourceSnapshot {
        let mut system = self.system.lock();
        system.refresh_memory();
        ResourceSnapshot {
            used_bytes: system.used_memory(),
            total_bytes: system.total_memory(),
        }
    }
}

/// Monitor returning a programmable reading. Test and bench support.
pub struct FixedMonitor {
    used_bytes: AtomicU64,
    total_bytes: u64,
}

impl FixedMonitor {
    pub fn new(used_bytes: u64, total_bytes: u64) -> Self {
        Self {
            used_bytes: AtomicU64::new(used_bytes),
            total_bytes,
        }
    }

    pub fn set_used(&self, used_bytes: u64) {
        self.used_bytes.store(used_bytes, Ordering::Relaxed);
    }
}

impl ResourceMonitor for FixedMonitor {
    fn snapshot(&self) -> ResourceSnapshot {
        ResourceSnapshot {
            used_bytes: self.used_bytes.load(Ordering::Relaxed),
            total_bytes: self.total_bytes,
        }
    }
}
