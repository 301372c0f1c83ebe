//! Method routing: validates a call against the plugin registry (method
//! exists, capability supported, caller permitted), then dispatches it to
//! the handler registered for that method name.
//!
//! Grounded on the teacher's `OperationRouter` (`service/router.rs`): a
//! `tower::Service<Operation>` keyed by name with a type-erased
//! `BoxedService`, generalized from `service_name` lookup to JMAP method
//! name lookup plus a registry permission check ahead of dispatch.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use async_trait::async_trait;
use tower::Service;

use jmap_core::MethodError;

use super::operation::{Operation, OperationError, OperationResponse};
use crate::registry::RegistryHandle;

/// A single JMAP method's business logic.
#[async_trait]
pub trait MethodHandler: Send + Sync {
    async fn call(&self, args: serde_json::Value, ctx: &super::operation::OperationContext) -> Result<OperationResponse, MethodError>;
}

type BoxedFuture = Pin<Box<dyn Future<Output = Result<OperationResponse, OperationError>> + Send>>;

/// Routes a [`Operation`] to its registered [`MethodHandler`], after
/// checking the method against the current registry snapshot.
///
/// `Clone` so [`crate::dispatch::worker::execute_batch`]'s
/// `pipeline_factory` can hand out an owned pipeline per dispatched call;
/// every field is an `Arc`/cheap map of `Arc`s, so cloning is shallow.
#[derive(Clone)]
pub struct MethodRouter {
    handlers: HashMap<String, Arc<dyn MethodHandler>>,
    registry: Arc<RegistryHandle>,
}

impl MethodRouter {
    #[must_use]
    pub fn new(registry: Arc<RegistryHandle>) -> Self {
        Self { handlers: HashMap::new(), registry }
    }

    pub fn register(&mut self, method_name: impl Into<String>, handler: Arc<dyn MethodHandler>) {
        self.handlers.insert(method_name.into(), handler);
    }
}

impl Service<Operation> for MethodRouter {
    type Response = OperationResponse;
    type Error = OperationError;
    type Future = BoxedFuture;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, op: Operation) -> Self::Future {
        let snapshot = self.registry.snapshot();
        let Some(record) = snapshot.method_target(&op.call.name) else {
            return Box::pin(async { Err(MethodError::UnknownMethod.into()) });
        };
        if !snapshot.has_capability(&record.capability) {
            return Box::pin(async { Err(MethodError::UnknownCapability.into()) });
        }
        let allowed = op
            .ctx
            .auth
            .iam_principal()
            .is_none_or(|principal| snapshot.is_allowed_principal(record, principal));
        if !allowed {
            return Box::pin(async { Err(MethodError::Forbidden.into()) });
        }
        let Some(handler) = self.handlers.get(&op.call.name).cloned() else {
            return Box::pin(async { Err(MethodError::UnknownMethod.into()) });
        };
        Box::pin(async move { handler.call(op.call.args, &op.ctx).await.map_err(OperationError::Method) })
    }
}
