//! # This-JSONAPI
//!
//! Resource hooks and a relationship-tracking repository for JSON:API
//! services built on entity-relationship models.
//!
//! ## Features
//!
//! - **Resource Hooks**: Per-type lifecycle hooks fired in a fixed order for
//!   every create, read, update and delete
//! - **Graph Traversal**: Relationship hooks reach every resource touched by a
//!   request, layer by layer, terminating on cyclic graphs
//! - **Implicit Changes**: Resources that lose a relationship as a side effect of
//!   a write are discovered, loaded and handed to their hooks
//! - **Complete Replacement**: To-one, to-many and many-to-many assignments
//!   replace the stored value instead of appending to it
//! - **Configuration-Based**: Resources and relationships defined in YAML
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use jsonapi::prelude::*;
//!
//! let config = ResourcesConfig::from_yaml_file("config/resources.yaml")?;
//! let registry = Arc::new(ResourceRegistry::from_config(&config)?);
//!
//! let hooks = Arc::new(
//!     HookContainerRegistry::new(registry.clone())
//!         .with_definition(Arc::new(ArticleDefinition))?,
//! );
//!
//! let store = InMemoryStore::new(registry);
//! let service = DefaultResourceService::new(hooks, Arc::new(store.session()));
//!
//! let article = Resource::new("articles", "")
//!     .with_attribute("title", "Hello")
//!     .with_to_one("author", Some(ResourceKey::new("people", "1")));
//! let targeted = TargetedFields::from_resource(&article);
//! let created = service.create(article, targeted).await?;
//! ```

pub mod config;
pub mod core;
pub mod data;
pub mod graph;
pub mod hooks;
pub mod storage;

/// Re-exports of commonly used types and traits
pub mod prelude {
    // === Core ===
    pub use crate::core::{
        error::{
            ConfigError, HookError, JsonApiError, JsonApiResult, QueryError, ResourceError,
            StorageError,
        },
        pipeline::{ResourcePipeline, TargetedFields},
        query::{PaginationMeta, QueryParams},
        resource::{Identifiable, Relation, Resource, ResourceKey},
        service::{ResourceDocument, ResourceService},
    };

    // === Resource Graph ===
    pub use crate::graph::{EntityGraph, RelationshipAttribute, RelationshipKind, ResourceRegistry};

    // === Hooks ===
    pub use crate::hooks::{
        DiffableResourceHashSet, HookContainerRegistry, HookManifest, RelationshipsDictionary,
        ResourceDefinition, ResourceDiffPair, ResourceHashSet, ResourceHook, ResourceHookExecutor,
    };

    // === Data ===
    pub use crate::data::{
        CancellationSignal, CancellationSource, DefaultResourceService, EntryState,
        PersistenceSession, ResourceRepository,
    };

    // === Storage ===
    #[cfg(feature = "in-memory")]
    pub use crate::storage::{InMemorySession, InMemoryStore};

    // === Config ===
    pub use crate::config::{HookOptions, ResourcesConfig};

    // === External dependencies ===
    pub use anyhow::Result;
    pub use async_trait::async_trait;
    pub use serde::{Deserialize, Serialize};
    pub use std::sync::Arc;
}
