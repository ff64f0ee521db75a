//! The resource graph: relationship metadata, the resource registry and the
//! per-request entity arena

pub mod entity_graph;
pub mod registry;
pub mod relationship;

pub use entity_graph::EntityGraph;
pub use registry::{ResourceContext, ResourceRegistry};
pub use relationship::{RelationshipAttribute, RelationshipKind, ThroughJoin};
