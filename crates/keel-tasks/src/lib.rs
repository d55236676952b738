//! keel tasks - the task executor
//!
//! Work is dispatched as named tasks with a string payload. Callers keep the
//! returned [`TaskSignature`] and later query its state, wait on it, or purge
//! it. Timeouts are advisory and computed client-side from creation time.

pub mod backend;
pub mod executor;
pub mod kind;
pub mod local;
pub mod reporter;

pub use backend::{handler_fn, TaskBackend, TaskHandler, TaskRecord, TaskStatus};
pub use executor::{TaskExecutor, TaskState};
pub use keel_core::models::TaskSignature;
pub use kind::TaskKind;
pub use local::LocalTaskBackend;
pub use reporter::{CollectingReporter, TaskEvent, TaskReporter, TracingReporter};
