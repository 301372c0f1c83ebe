//! Tower middleware layers for the dispatch pipeline.
//!
//! - [`timeout`]: per-call timeout enforcement
//! - [`metrics`]: call timing and counting via `tracing` spans
//! - [`load_shed`]: semaphore-based concurrency limiting
//! - [`pipeline`]: composes all layers into a single service stack

pub mod load_shed;
pub mod metrics;
pub mod pipeline;
pub mod timeout;

pub use load_shed::LoadShedLayer;
pub use metrics::MetricsLayer;
pub use pipeline::build_dispatch_pipeline;
pub use timeout::TimeoutLayer;
