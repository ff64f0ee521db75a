//! Hook identifiers and the resource definition contract
//!
//! A resource definition is the per-type container of user hook logic. Which
//! hooks a definition implements is declared explicitly through its
//! [`HookManifest`]; the engine never probes for overridden methods.

use crate::core::pipeline::ResourcePipeline;
use crate::core::resource::Resource;
use crate::hooks::collections::{DiffableResourceHashSet, RelationshipsDictionary, ResourceHashSet};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// A named lifecycle extension point
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceHook {
    BeforeCreate,
    BeforeRead,
    BeforeUpdate,
    BeforeDelete,
    BeforeUpdateRelationship,
    BeforeImplicitUpdateRelationship,
    OnReturn,
    AfterCreate,
    AfterRead,
    AfterUpdate,
    AfterDelete,
    AfterUpdateRelationship,
}

impl ResourceHook {
    /// Every hook, in declaration order
    pub const ALL: [ResourceHook; 12] = [
        ResourceHook::BeforeCreate,
        ResourceHook::BeforeRead,
        ResourceHook::BeforeUpdate,
        ResourceHook::BeforeDelete,
        ResourceHook::BeforeUpdateRelationship,
        ResourceHook::BeforeImplicitUpdateRelationship,
        ResourceHook::OnReturn,
        ResourceHook::AfterCreate,
        ResourceHook::AfterRead,
        ResourceHook::AfterUpdate,
        ResourceHook::AfterDelete,
        ResourceHook::AfterUpdateRelationship,
    ];

    /// Whether a definition may override database value loading for this hook
    pub fn allows_database_values(&self) -> bool {
        matches!(
            self,
            ResourceHook::BeforeUpdate
                | ResourceHook::BeforeUpdateRelationship
                | ResourceHook::BeforeDelete
        )
    }
}

impl fmt::Display for ResourceHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Declaration of the hooks a definition implements
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HookManifest {
    implemented: Vec<ResourceHook>,
    database_values: Vec<(ResourceHook, bool)>,
}

impl HookManifest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a hook as implemented
    pub fn implement(mut self, hook: ResourceHook) -> Self {
        if !self.implemented.contains(&hook) {
            self.implemented.push(hook);
        }
        self
    }

    /// Declare several hooks as implemented
    pub fn implement_all(self, hooks: impl IntoIterator<Item = ResourceHook>) -> Self {
        hooks.into_iter().fold(self, |manifest, hook| manifest.implement(hook))
    }

    /// Override whether database values are loaded for `hook`
    pub fn load_database_values(mut self, hook: ResourceHook, enabled: bool) -> Self {
        self.database_values.retain(|(h, _)| *h != hook);
        self.database_values.push((hook, enabled));
        self
    }

    pub fn implemented(&self) -> &[ResourceHook] {
        &self.implemented
    }

    pub fn implements(&self, hook: ResourceHook) -> bool {
        self.implemented.contains(&hook)
    }

    /// Declared database value overrides
    pub fn database_value_overrides(&self) -> &[(ResourceHook, bool)] {
        &self.database_values
    }
}

/// Container of user hook logic for one resource type.
///
/// Every hook has a passthrough default so a definition only writes the hooks
/// it declares in [`manifest`](ResourceDefinition::manifest). Errors returned
/// from a hook reach the caller of the service untouched.
pub trait ResourceDefinition: Send + Sync {
    /// The resource type this definition belongs to
    fn resource_type(&self) -> &str;

    /// The hooks this definition implements
    fn manifest(&self) -> HookManifest;

    /// Before a read. `string_id` is set for single resource reads.
    fn before_read(
        &self,
        _pipeline: ResourcePipeline,
        _is_included: bool,
        _string_id: Option<&str>,
    ) -> Result<()> {
        Ok(())
    }

    /// Before resources are created. Returns the resources allowed through.
    fn before_create(
        &self,
        resources: ResourceHashSet,
        _pipeline: ResourcePipeline,
    ) -> Result<Vec<Resource>> {
        Ok(resources.into_vec())
    }

    /// Before resources are updated. Returns the resources allowed through.
    fn before_update(
        &self,
        resources: DiffableResourceHashSet,
        _pipeline: ResourcePipeline,
    ) -> Result<Vec<Resource>> {
        Ok(resources.into_vec())
    }

    /// Before resources are deleted. Returns the resources allowed through.
    fn before_delete(
        &self,
        resources: ResourceHashSet,
        _pipeline: ResourcePipeline,
    ) -> Result<Vec<Resource>> {
        Ok(resources.into_vec())
    }

    /// Before resources of this type get a relationship assigned by a write on
    /// another resource. Returns the ids allowed through.
    fn before_update_relationship(
        &self,
        ids: HashSet<String>,
        _relationships: &RelationshipsDictionary,
        _pipeline: ResourcePipeline,
    ) -> Result<HashSet<String>> {
        Ok(ids)
    }

    /// Before resources of this type lose a relationship as a side effect of a
    /// write elsewhere
    fn before_implicit_update_relationship(
        &self,
        _relationships: &RelationshipsDictionary,
        _pipeline: ResourcePipeline,
    ) -> Result<()> {
        Ok(())
    }

    /// Before resources are returned to the client. Returns the resources to return.
    fn on_return(
        &self,
        resources: ResourceHashSet,
        _pipeline: ResourcePipeline,
    ) -> Result<Vec<Resource>> {
        Ok(resources.into_vec())
    }

    fn after_create(&self, _resources: &ResourceHashSet, _pipeline: ResourcePipeline) -> Result<()> {
        Ok(())
    }

    fn after_read(
        &self,
        _resources: &ResourceHashSet,
        _pipeline: ResourcePipeline,
        _is_included: bool,
    ) -> Result<()> {
        Ok(())
    }

    fn after_update(&self, _resources: &ResourceHashSet, _pipeline: ResourcePipeline) -> Result<()> {
        Ok(())
    }

    fn after_delete(
        &self,
        _resources: &ResourceHashSet,
        _pipeline: ResourcePipeline,
        _succeeded: bool,
    ) -> Result<()> {
        Ok(())
    }

    fn after_update_relationship(
        &self,
        _relationships: &RelationshipsDictionary,
        _pipeline: ResourcePipeline,
    ) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manifest_deduplicates_hooks() {
        let manifest = HookManifest::new()
            .implement(ResourceHook::BeforeCreate)
            .implement_all([ResourceHook::BeforeCreate, ResourceHook::AfterCreate]);

        assert_eq!(manifest.implemented().len(), 2);
        assert!(manifest.implements(ResourceHook::AfterCreate));
        assert!(!manifest.implements(ResourceHook::OnReturn));
    }

    #[test]
    fn test_last_database_value_override_wins() {
        let manifest = HookManifest::new()
            .load_database_values(ResourceHook::BeforeUpdate, true)
            .load_database_values(ResourceHook::BeforeUpdate, false);

        assert_eq!(
            manifest.database_value_overrides(),
            &[(ResourceHook::BeforeUpdate, false)]
        );
    }

    #[test]
    fn test_database_values_allowed_hooks() {
        let allowed: Vec<_> = ResourceHook::ALL
            .into_iter()
            .filter(ResourceHook::allows_database_values)
            .collect();
        assert_eq!(
            allowed,
            vec![
                ResourceHook::BeforeUpdate,
                ResourceHook::BeforeDelete,
                ResourceHook::BeforeUpdateRelationship
            ]
        );
    }
}
