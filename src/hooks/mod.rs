//! Resource hooks
//!
//! User logic attaches to resource types through [`ResourceDefinition`]s,
//! registered in a [`HookContainerRegistry`]. The [`ResourceHookExecutor`]
//! fires them over the entity graph of a request.

pub mod collections;
pub mod definition;
pub mod discovery;
pub mod executor;
pub mod traversal;

pub use collections::{DiffableResourceHashSet, RelationshipsDictionary, ResourceDiffPair, ResourceHashSet};
pub use definition::{HookManifest, ResourceDefinition, ResourceHook};
pub use discovery::{HookContainerRegistry, HookDiscovery};
pub use executor::ResourceHookExecutor;
