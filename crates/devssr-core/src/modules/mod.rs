//! In-process module cache for the server render bundle.
//!
//! The loader fills the caches, the invalidator empties them after every
//! server rebuild, and the registry's gate keeps the two apart.

pub mod invalidate;
pub mod loader;
pub mod registry;
pub mod resolve;

pub use invalidate::{InvalidationReport, Invalidator};
pub use loader::{ModuleBundle, ModuleLoader};
pub use registry::{CachedModule, ModuleCache, ModuleRegistry, PathCache};
