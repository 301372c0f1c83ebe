//! Pipeline composition: wraps the method router with the middleware
//! stack. Grounded on the teacher's `build_operation_pipeline`
//! (`service/middleware/pipeline.rs`).

use tower::ServiceBuilder;

use super::load_shed::LoadShedLayer;
use super::metrics::MetricsLayer;
use super::timeout::TimeoutLayer;
use crate::dispatch::config::DispatcherConfig;
use crate::dispatch::operation::{Operation, OperationError, OperationResponse};
use crate::dispatch::router::MethodRouter;

/// Builds the dispatch pipeline: `LoadShedLayer` (outermost, fail fast)
/// -> `TimeoutLayer` -> `MetricsLayer` (innermost, closest to the actual
/// handler) wrapping the [`MethodRouter`].
#[must_use]
pub fn build_dispatch_pipeline(
    router: MethodRouter,
    config: &DispatcherConfig,
) -> impl tower::Service<Operation, Response = OperationResponse, Error = OperationError> {
    ServiceBuilder::new()
        .layer(LoadShedLayer::new(config.max_concurrent_operations))
        .layer(TimeoutLayer)
        .layer(MetricsLayer)
        .service(router)
}
