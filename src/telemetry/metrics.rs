//! Cache metrics recorded through the `metrics` facade.
//!
//! The crate never installs a recorder; embedding applications choose one
//! (or none, in which case every call is a no-op).

use metrics::{counter, gauge, histogram};

/// A physical load completed.
pub fn record_model_loaded(kind: &str, memory_bytes: u64, latency_ms: u64) {
    counter!("modelcache_loads_total", "kind" => kind.to_string()).increment(1);
    histogram!("modelcache_load_bytes").record(memory_bytes as f64);
    histogram!("modelcache_load_latency_ms").record(latency_ms as f64);
}

/// A physical load failed.
pub fn record_load_failure(kind: &str) {
    counter!("modelcache_load_failures_total", "kind" => kind.to_string()).increment(1);
}

/// A caller attached to a load already in flight.
pub fn record_coalesced_load(kind: &str) {
    counter!("modelcache_coalesced_loads_total", "kind" => kind.to_string()).increment(1);
}

/// A model was unloaded, freeing `freed_bytes` of resident memory.
pub fn record_model_unloaded(freed_bytes: u64) {
    counter!("modelcache_unloads_total").increment(1);
    histogram!("modelcache_unload_bytes").record(freed_bytes as f64);
}

/// A maintenance sweep finished.
pub fn record_sweep(evicted: usize, freed_bytes: u64) {
    counter!("modelcache_sweeps_total").increment(1);
    if evicted > 0 {
        counter!("modelcache_evictions_total").increment(evicted as u64);
        histogram!("modelcache_sweep_freed_bytes").record(freed_bytes as f64);
    }
}

/// Refresh the resident-set gauges after any mutation.
pub fn update_loaded(count: usize, bytes: u64) {
    gauge!("modelcache_loaded_models").set(count as f64);
    gauge!("modelcache_loaded_bytes").set(bytes as f64);
}
