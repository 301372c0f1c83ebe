//! Request dispatch: method-call parsing, intra-batch result-reference
//! resolution, registry-checked routing, and bounded-parallelism
//! topological execution (spec.md §2, §5).
//!
//! Renamed/repurposed from the teacher's `service/` module (operation
//! routing + Tower middleware pipeline), generalized from a closed
//! `Operation` enum keyed by `service_name` to JMAP's open-ended
//! `(methodName, args, callId)` triples keyed by the plugin registry.

pub mod blob_methods;
pub mod config;
pub mod middleware;
pub mod operation;
pub mod resolver;
pub mod router;
pub mod worker;

pub use blob_methods::{BlobAllocateHandler, BlobCompleteHandler};
pub use config::DispatcherConfig;
pub use operation::{parse_method_calls, MethodCall, Operation, OperationContext, OperationError, OperationResponse};
pub use router::{MethodHandler, MethodRouter};
pub use worker::{execute_batch, MethodResponse};
