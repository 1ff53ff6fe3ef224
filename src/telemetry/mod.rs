//! Telemetry: structured logging and metrics for the cache.
//!
//! Logging goes through `tracing`; metrics go through the `metrics` facade
//! so the embedding application controls the sink.

mod logging;
mod metrics;

pub use logging::{init_logging, LogConfig, LogError, LogFormat};
pub use metrics::{
    record_coalesced_load, record_load_failure, record_model_loaded, record_model_unloaded,
    record_sweep, update_loaded,
};
