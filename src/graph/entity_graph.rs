//! Entity arena
//!
//! An [`EntityGraph`] owns every resource of one request, keyed by identity,
//! plus the ordered list of primary (root) resources. Relationship values hold
//! [`ResourceKey`]s into the arena, so cyclic graphs need no shared ownership.

use crate::core::resource::{Identifiable, Relation, Resource, ResourceKey};
use indexmap::IndexMap;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntityGraph {
    root_type: String,
    roots: Vec<ResourceKey>,
    resources: IndexMap<ResourceKey, Resource>,
}

impl EntityGraph {
    /// An empty graph whose primary resources are of `root_type`
    pub fn new(root_type: impl Into<String>) -> Self {
        Self {
            root_type: root_type.into(),
            ..Default::default()
        }
    }

    /// A graph whose primary resources are `roots`.
    ///
    /// Repeated identities are kept once, the last instance wins.
    pub fn with_roots(root_type: impl Into<String>, roots: impl IntoIterator<Item = Resource>) -> Self {
        let mut graph = Self::new(root_type);
        for resource in roots {
            graph.push_root(resource);
        }
        graph
    }

    pub fn root_type(&self) -> &str {
        &self.root_type
    }

    /// Add a primary resource
    pub fn push_root(&mut self, resource: Resource) {
        let key = resource.key();
        if !self.roots.contains(&key) {
            self.roots.push(key.clone());
        }
        self.resources.insert(key, resource);
    }

    /// Insert or overwrite a resource
    pub fn insert(&mut self, resource: Resource) -> ResourceKey {
        let key = resource.key();
        self.resources.insert(key.clone(), resource);
        key
    }

    /// Insert a resource unless its identity is already present
    pub fn insert_if_absent(&mut self, resource: Resource) -> ResourceKey {
        let key = resource.key();
        self.resources.entry(key.clone()).or_insert(resource);
        key
    }

    /// Write a (possibly mutated) instance back into the arena
    pub fn replace(&mut self, resource: Resource) {
        self.insert(resource);
    }

    pub fn get(&self, key: &ResourceKey) -> Option<&Resource> {
        self.resources.get(key)
    }

    pub fn get_mut(&mut self, key: &ResourceKey) -> Option<&mut Resource> {
        self.resources.get_mut(key)
    }

    pub fn contains(&self, key: &ResourceKey) -> bool {
        self.resources.contains_key(key)
    }

    /// The resource behind `key`, or an identity-only pointer when the arena
    /// does not hold it
    pub fn resolve(&self, key: &ResourceKey) -> Resource {
        self.get(key).cloned().unwrap_or_else(|| Resource::pointer(key))
    }

    pub fn root_keys(&self) -> &[ResourceKey] {
        &self.roots
    }

    /// The primary resources, in order
    pub fn roots(&self) -> Vec<Resource> {
        self.roots.iter().map(|key| self.resolve(key)).collect()
    }

    /// Resources that are not primary
    pub fn included(&self) -> impl Iterator<Item = &Resource> {
        self.resources
            .iter()
            .filter(|(key, _)| !self.roots.contains(key))
            .map(|(_, resource)| resource)
    }

    /// Keep only the primary resources accepted by `keep`, dropping the others
    /// from the arena
    pub fn retain_roots(&mut self, mut keep: impl FnMut(&ResourceKey) -> bool) {
        let (kept, dropped): (Vec<_>, Vec<_>) = self.roots.drain(..).partition(|key| keep(key));
        self.roots = kept;
        for key in dropped {
            self.resources.shift_remove(&key);
        }
    }

    /// Identities of every held resource of a type
    pub fn keys_of_type(&self, resource_type: &str) -> Vec<ResourceKey> {
        self.resources
            .keys()
            .filter(|key| key.resource_type == resource_type)
            .cloned()
            .collect()
    }

    /// Drop a non-primary resource from the arena
    pub fn remove_included(&mut self, key: &ResourceKey) -> Option<Resource> {
        if self.roots.contains(key) {
            return None;
        }
        self.resources.shift_remove(key)
    }

    /// Value of a relationship on the resource behind `key`
    pub fn relation_value(&self, key: &ResourceKey, name: &str) -> Option<&Relation> {
        self.get(key).and_then(|resource| resource.relation(name))
    }

    /// Assign a relationship on the resource behind `key`.
    ///
    /// A pointer resource is materialized first when the arena does not hold it.
    pub fn set_relation(&mut self, key: &ResourceKey, name: impl Into<String>, value: Relation) {
        self.resources
            .entry(key.clone())
            .or_insert_with(|| Resource::pointer(key))
            .set_relation(name, value);
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Consume the graph, returning the primary resources
    pub fn into_roots(mut self) -> Vec<Resource> {
        self.roots
            .iter()
            .map(|key| {
                self.resources
                    .shift_remove(key)
                    .unwrap_or_else(|| Resource::pointer(key))
            })
            .collect()
    }
}
