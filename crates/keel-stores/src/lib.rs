//! Cache store for keel
//!
//! The cache is a set of hash collections (release records, release task
//! pointers, project task pointers) with optimistic watch + pipeline
//! transactions. [`CacheStore`] is the backend seam; [`ReleaseCache`] and
//! [`ProjectCache`] are typed views over it.

pub mod codec;
pub mod memory;
pub mod project_cache;
pub mod release_cache;
pub mod traits;

pub use memory::MemoryCacheStore;
pub use project_cache::ProjectCache;
pub use release_cache::ReleaseCache;
pub use traits::{CacheStore, PipelineOp, WatchToken};
