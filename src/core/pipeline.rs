//! Request pipeline tags and the set of fields a request targets

use serde::{Deserialize, Serialize};
use std::fmt;

/// The calling context of a hook.
///
/// Every hook receives the pipeline so that implementations can branch on the
/// kind of request that triggered them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourcePipeline {
    /// GET /{resources}
    Get,
    /// GET /{resources}/{id}
    GetSingle,
    /// GET /{resources}/{id}/relationships/{relationship}
    GetRelationship,
    /// POST /{resources} (create)
    Post,
    /// PATCH /{resources}/{id}
    Patch,
    /// PATCH /{resources}/{id}/relationships/{relationship}
    PatchRelationship,
    /// DELETE /{resources}/{id}
    Delete,
    /// Bulk create
    BulkPost,
    /// Bulk update
    BulkPatch,
    /// Bulk delete
    BulkDelete,
}

impl ResourcePipeline {
    /// Whether the pipeline creates new resources.
    ///
    /// Creation can never displace a pre-existing relationship of the created
    /// resource, so implicit relationship hooks are skipped for these pipelines.
    pub fn is_create(&self) -> bool {
        matches!(self, ResourcePipeline::Post | ResourcePipeline::BulkPost)
    }
}

impl fmt::Display for ResourcePipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Attributes and relationships the client actually supplied in the request.
///
/// Only targeted fields are copied onto the stored resource during an update and
/// only targeted relationships are reconciled by the repository.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetedFields {
    /// Public attribute names
    #[serde(default)]
    pub attributes: Vec<String>,

    /// Public relationship names
    #[serde(default)]
    pub relationships: Vec<String>,
}

impl TargetedFields {
    /// Create an empty set of targeted fields
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a targeted attribute
    pub fn with_attribute(mut self, name: impl Into<String>) -> Self {
        self.attributes.push(name.into());
        self
    }

    /// Add a targeted relationship
    pub fn with_relationship(mut self, name: impl Into<String>) -> Self {
        self.relationships.push(name.into());
        self
    }

    /// Derive the targeted fields from what an incoming resource carries
    pub fn from_resource(resource: &crate::core::resource::Resource) -> Self {
        Self {
            attributes: resource.attributes.keys().cloned().collect(),
            relationships: resource.relationships.keys().cloned().collect(),
        }
    }

    pub fn targets_relationship(&self, name: &str) -> bool {
        self.relationships.iter().any(|r| r == name)
    }

    pub fn targets_attribute(&self, name: &str) -> bool {
        self.attributes.iter().any(|a| a == name)
    }
}
