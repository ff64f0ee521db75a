//! Hook discovery and container resolution
//!
//! Definitions are registered explicitly at setup. The hooks a definition
//! implements are resolved once, on first access, and cached for the lifetime
//! of the registry.

use crate::core::error::ConfigError;
use crate::graph::registry::ResourceRegistry;
use crate::hooks::definition::{HookManifest, ResourceDefinition, ResourceHook};
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

/// Resolved hook capabilities of one resource type
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HookDiscovery {
    /// Hooks the definition implements
    pub implemented_hooks: Vec<ResourceHook>,

    /// Hooks that always receive database values
    pub database_values_enabled_hooks: Vec<ResourceHook>,

    /// Hooks that never receive database values
    pub database_values_disabled_hooks: Vec<ResourceHook>,
}

impl HookDiscovery {
    /// Check the database value overrides of a manifest
    pub fn validate(resource_type: &str, manifest: &HookManifest) -> Result<(), ConfigError> {
        for (hook, _) in manifest.database_value_overrides() {
            if !hook.allows_database_values() {
                return Err(ConfigError::DatabaseValuesNotAllowed {
                    resource_type: resource_type.to_string(),
                    hook: *hook,
                });
            }
        }
        Ok(())
    }

    /// Resolve the capabilities declared by a validated manifest
    pub fn from_manifest(manifest: &HookManifest) -> Self {
        let mut enabled = vec![ResourceHook::BeforeImplicitUpdateRelationship];
        let mut disabled = Vec::new();

        for (hook, load) in manifest.database_value_overrides() {
            if !hook.allows_database_values() {
                continue;
            }
            if *load {
                enabled.push(*hook);
            } else {
                disabled.push(*hook);
            }
        }

        Self {
            implemented_hooks: manifest.implemented().to_vec(),
            database_values_enabled_hooks: enabled,
            database_values_disabled_hooks: disabled,
        }
    }

    pub fn implements(&self, hook: ResourceHook) -> bool {
        self.implemented_hooks.contains(&hook)
    }
}

struct ContainerSlot {
    definition: Arc<dyn ResourceDefinition>,
    discovery: OnceLock<HookDiscovery>,
}

/// Registry of resource definitions, one per resource type
pub struct HookContainerRegistry {
    resources: Arc<ResourceRegistry>,
    slots: HashMap<String, ContainerSlot>,
}

impl HookContainerRegistry {
    pub fn new(resources: Arc<ResourceRegistry>) -> Self {
        Self {
            resources,
            slots: HashMap::new(),
        }
    }

    /// Register the definition of a resource type.
    ///
    /// Fails when the type is unknown, when a definition is already registered
    /// for it, or when its manifest places database value overrides on hooks
    /// that cannot use them.
    pub fn register(&mut self, definition: Arc<dyn ResourceDefinition>) -> Result<(), ConfigError> {
        let resource_type = definition.resource_type().to_string();

        if self.resources.context(&resource_type).is_none() {
            return Err(ConfigError::UnknownResourceDefinition { resource_type });
        }
        if self.slots.contains_key(&resource_type) {
            return Err(ConfigError::AmbiguousHookContainer { resource_type });
        }
        HookDiscovery::validate(&resource_type, &definition.manifest())?;

        tracing::debug!(resource_type = %resource_type, "resource definition registered");
        self.slots.insert(
            resource_type,
            ContainerSlot {
                definition,
                discovery: OnceLock::new(),
            },
        );
        Ok(())
    }

    /// Builder variant of [`register`](Self::register)
    pub fn with_definition(mut self, definition: Arc<dyn ResourceDefinition>) -> Result<Self, ConfigError> {
        self.register(definition)?;
        Ok(self)
    }

    pub fn resource_registry(&self) -> &ResourceRegistry {
        &self.resources
    }

    /// Hook capabilities of a type, resolved on first access
    pub fn discovery(&self, resource_type: &str) -> Option<&HookDiscovery> {
        self.slots.get(resource_type).map(|slot| {
            slot.discovery
                .get_or_init(|| HookDiscovery::from_manifest(&slot.definition.manifest()))
        })
    }

    /// The definition of a type, only if it implements `hook`
    pub fn container(&self, resource_type: &str, hook: ResourceHook) -> Option<&dyn ResourceDefinition> {
        self.container_for_any(resource_type, &[hook])
    }

    /// The definition of a type, only if it implements any of `hooks`
    pub fn container_for_any(
        &self,
        resource_type: &str,
        hooks: &[ResourceHook],
    ) -> Option<&dyn ResourceDefinition> {
        let discovery = self.discovery(resource_type)?;
        if hooks.iter().any(|hook| discovery.implements(*hook)) {
            self.slots.get(resource_type).map(|slot| slot.definition.as_ref())
        } else {
            None
        }
    }

    /// Whether database values are loaded for `hook` on `resource_type`.
    ///
    /// A definition's override wins over the global option.
    pub fn should_load_db_values(&self, resource_type: &str, hook: ResourceHook) -> bool {
        if let Some(discovery) = self.discovery(resource_type) {
            if discovery.database_values_disabled_hooks.contains(&hook) {
                return false;
            }
            if discovery.database_values_enabled_hooks.contains(&hook) {
                return true;
            }
        }
        self.resources.options().load_database_values
    }

    /// Registered resource types
    pub fn resource_types(&self) -> Vec<&str> {
        self.slots.keys().map(String::as_str).collect()
    }
}
