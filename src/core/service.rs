//! Service trait for resource operations

use crate::core::pipeline::TargetedFields;
use crate::core::query::{PaginationMeta, QueryParams};
use crate::core::resource::{Relation, Resource, ResourceKey};
use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;

/// The primary data of a response plus the resources reached through its
/// include chains
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ResourceDocument {
    pub data: Vec<Resource>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub included: Vec<Resource>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<PaginationMeta>,
}

impl ResourceDocument {
    /// The single primary resource, if the document holds exactly one
    pub fn single(&self) -> Option<&Resource> {
        match self.data.as_slice() {
            [resource] => Some(resource),
            _ => None,
        }
    }
}

/// Service trait for the resources of one unit of work
///
/// Every operation runs the resource hooks of its pipeline around the
/// repository call. Implementations are agnostic to the storage mechanism.
#[async_trait]
pub trait ResourceService: Send + Sync {
    /// Create a resource. An empty id is replaced with a generated one.
    async fn create(&self, resource: Resource, targeted: TargetedFields) -> Result<Resource>;

    /// Get one resource with the requested include chains
    async fn get_single(&self, key: &ResourceKey, query: &QueryParams) -> Result<ResourceDocument>;

    /// List one page of resources of a type
    async fn list(&self, resource_type: &str, query: &QueryParams) -> Result<ResourceDocument>;

    /// Get the value of one relationship of a resource
    async fn get_relationship(&self, key: &ResourceKey, relationship: &str) -> Result<Relation>;

    /// Write the targeted fields of a resource
    async fn update(&self, resource: Resource, targeted: TargetedFields) -> Result<Resource>;

    /// Replace one relationship of a resource
    async fn update_relationships(
        &self,
        key: &ResourceKey,
        relationship: &str,
        rights: Vec<ResourceKey>,
    ) -> Result<()>;

    /// Delete a resource
    async fn delete(&self, key: &ResourceKey) -> Result<()>;
}
