//! Core module containing fundamental traits and types for the framework

pub mod error;
pub mod pipeline;
pub mod query;
pub mod resource;
pub mod service;

pub use error::{JsonApiError, JsonApiResult};
pub use pipeline::{ResourcePipeline, TargetedFields};
pub use query::{PaginationMeta, QueryParams};
pub use resource::{Identifiable, Relation, Resource, ResourceKey};
pub use service::{ResourceDocument, ResourceService};
