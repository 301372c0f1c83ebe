//! Dispatcher configuration, grounded on the teacher's `ServerConfig`
//! (`service/config.rs`).

/// Tunables for the dispatch pipeline.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Default per-call timeout, overridable per method in the future.
    pub default_call_timeout_ms: u64,
    /// Outer concurrency ceiling across the whole server (the
    /// `LoadShedLayer` bound) — distinct from the worker pool size below
    /// (SPEC_FULL.md open-question decision).
    pub max_concurrent_operations: u32,
    /// Size of the per-batch worker pool ("size P", spec.md §5) used to
    /// execute one batch's topologically-ordered method calls.
    pub worker_pool_size: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            default_call_timeout_ms: 30_000,
            max_concurrent_operations: 1000,
            worker_pool_size: 8,
        }
    }
}
