//! keel sync - the cache reconciler
//!
//! [`Reconciler::resync`] compares the chart engine's releases and the
//! cluster's release configs with the three cache collections and repairs the
//! difference in one optimistic transaction. [`Reconciler::start`] runs it at
//! startup and then on a fixed interval until shut down.

mod plan;
mod reconciler;

pub use plan::SyncPlan;
pub use reconciler::{Reconciler, SyncOptions, SyncReport};
