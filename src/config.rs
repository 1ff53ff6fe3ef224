//! Runtime configuration loading from environment variables.
//!
//! All configuration values are loaded from `MODELCACHE_*` environment
//! variables with sensible defaults. Invalid values fall back to defaults
//! without crashing.
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |---|---|---|
//! | `MODELCACHE_POLICY` | `lru` | Eviction policy (`lru`, `memory`, `age`, `hybrid`) |
//! | `MODELCACHE_MAX_AGE_SECS` | 86400 | Idle/age cutoff for age-based policies (secs) |
//! | `MODELCACHE_MAX_TOTAL_BYTES` | 8589934592 | Memory budget for threshold policies (bytes) |
//! | `MODELCACHE_SWEEP_INTERVAL_SECS` | 300 | Maintenance sweep interval (secs) |
//! | `MODELCACHE_LOAD_TIMEOUT_SECS` | 0 | Per-load timeout (secs, 0 = unbounded) |
//! | `MODELCACHE_LOG_FORMAT` | `json` | Log output format (`json`, `pretty`) |
//! | `MODELCACHE_LOG_LEVEL` | `info` | Log filter directives |

use std::time::Duration;

use crate::models::{RegistryConfig, UnloadingPolicy};
use crate::telemetry::LogConfig;

/// All runtime configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct EnvConfig {
    pub policy: UnloadingPolicy,
    pub sweep_interval: Duration,
    pub load_timeout: Option<Duration>,
    pub log: LogConfig,
}

/// Parse a `u64` env var, returning `default` on missing or invalid.
fn parse_u64(key: &str, default: u64) -> u64 {
    match std::env::var(key) {
        Ok(val) => val.parse::<u64>().unwrap_or(default),
        Err(_) => default,
    }
}

/// Load the eviction policy from environment. Unrecognized names fall
/// back to LRU.
fn load_policy() -> UnloadingPolicy {
    let max_age_secs = parse_u64("MODELCACHE_MAX_AGE_SECS", 24 * 3600);
    let max_age_secs = max_age_secs.max(1);
    let max_age = Duration::from_secs(max_age_secs);
    let max_total_bytes = parse_u64("MODELCACHE_MAX_TOTAL_BYTES", 8 * 1024 * 1024 * 1024);
    let max_total_bytes = max_total_bytes.max(1024 * 1024); // floor: 1MB

    let name = std::env::var("MODELCACHE_POLICY").unwrap_or_default();
    match name.to_ascii_lowercase().as_str() {
        "memory" => UnloadingPolicy::MemoryThreshold { max_total_bytes },
        "age" => UnloadingPolicy::TimeBased { max_age },
        "hybrid" => UnloadingPolicy::Hybrid { max_age, max_total_bytes },
        _ => UnloadingPolicy::LeastRecentlyUsed { max_age },
    }
}

/// Load all configuration from environment variables.
///
/// Missing or invalid values fall back to safe defaults without panicking.
pub fn load() -> EnvConfig {
    let sweep_secs = parse_u64("MODELCACHE_SWEEP_INTERVAL_SECS", 300);
    let sweep_secs = sweep_secs.max(1);
    let timeout_secs = parse_u64("MODELCACHE_LOAD_TIMEOUT_SECS", 0);

    EnvConfig {
        policy: load_policy(),
        sweep_interval: Duration::from_secs(sweep_secs),
        load_timeout: (timeout_secs > 0).then(|| Duration::from_secs(timeout_secs)),
        log: LogConfig::from_env(),
    }
}

/// Serializes env-mutating tests across the crate.
#[cfg(test)]
pub(crate) static ENV_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());

impl EnvConfig {
    /// Registry construction parameters derived from this configuration.
    pub fn registry_config(&self) -> RegistryConfig {
        RegistryConfig {
            policy: self.policy.clone(),
            load_timeout: self.load_timeout,
        }
    }
}
