//! Resource collections handed to hooks

use crate::core::resource::{Identifiable, Resource, ResourceKey};
use crate::graph::relationship::RelationshipAttribute;
use indexmap::IndexMap;

/// Unique set of resources of one type, together with the relationships
/// through which the resources were affected by the current request
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResourceHashSet {
    resources: IndexMap<ResourceKey, Resource>,
    relationships: IndexMap<RelationshipAttribute, Vec<ResourceKey>>,
}

impl ResourceHashSet {
    /// Build a set; repeated identities are kept once
    pub fn new(
        resources: impl IntoIterator<Item = Resource>,
        relationships: IndexMap<RelationshipAttribute, Vec<ResourceKey>>,
    ) -> Self {
        Self {
            resources: resources.into_iter().map(|r| (r.key(), r)).collect(),
            relationships,
        }
    }

    /// A set without affected relationships
    pub fn from_resources(resources: impl IntoIterator<Item = Resource>) -> Self {
        Self::new(resources, IndexMap::new())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Resource> {
        self.resources.values()
    }

    pub fn keys(&self) -> impl Iterator<Item = &ResourceKey> {
        self.resources.keys()
    }

    pub fn get(&self, key: &ResourceKey) -> Option<&Resource> {
        self.resources.get(key)
    }

    pub fn contains(&self, key: &ResourceKey) -> bool {
        self.resources.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Relationships through which members of this set were affected
    pub fn affected_relationships(&self) -> impl Iterator<Item = &RelationshipAttribute> {
        self.relationships.keys()
    }

    /// Members whose relationship `name` was affected by the request
    pub fn by_relationship(&self, name: &str) -> Vec<&Resource> {
        let mut keys: Vec<&ResourceKey> = Vec::new();
        for (attr, affected) in &self.relationships {
            if attr.public_name != name {
                continue;
            }
            for key in affected {
                if !keys.contains(&key) {
                    keys.push(key);
                }
            }
        }
        keys.into_iter().filter_map(|k| self.resources.get(k)).collect()
    }

    pub fn into_vec(self) -> Vec<Resource> {
        self.resources.into_values().collect()
    }
}

/// A requested resource paired with its stored counterpart
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceDiffPair {
    /// The resource as supplied by the request
    pub resource: Resource,

    /// The resource as stored before the write, when database values were loaded
    pub database_value: Option<Resource>,
}

/// Resources about to be updated, with access to their stored values for diffing
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DiffableResourceHashSet {
    set: ResourceHashSet,
    database_values: Option<IndexMap<ResourceKey, Resource>>,
    targeted_attributes: Vec<String>,
}

impl DiffableResourceHashSet {
    pub fn new(
        set: ResourceHashSet,
        database_values: Option<Vec<Resource>>,
        targeted_attributes: Vec<String>,
    ) -> Self {
        Self {
            set,
            database_values: database_values
                .map(|values| values.into_iter().map(|r| (r.key(), r)).collect()),
            targeted_attributes,
        }
    }

    /// The requested resources
    pub fn resources(&self) -> &ResourceHashSet {
        &self.set
    }

    pub fn iter(&self) -> impl Iterator<Item = &Resource> {
        self.set.iter()
    }

    pub fn len(&self) -> usize {
        self.set.len()
    }

    pub fn is_empty(&self) -> bool {
        self.set.is_empty()
    }

    /// Whether stored values were loaded for this hook
    pub fn has_database_values(&self) -> bool {
        self.database_values.is_some()
    }

    /// Stored value of one resource
    pub fn database_value(&self, key: &ResourceKey) -> Option<&Resource> {
        self.database_values.as_ref().and_then(|values| values.get(key))
    }

    /// Requested and stored value per identity
    pub fn diffs(&self) -> Vec<ResourceDiffPair> {
        self.set
            .iter()
            .map(|resource| ResourceDiffPair {
                resource: resource.clone(),
                database_value: self.database_value(&resource.key()).cloned(),
            })
            .collect()
    }

    /// Members whose attribute `name` is written by the request
    pub fn affected_attribute(&self, name: &str) -> Vec<&Resource> {
        if self.targeted_attributes.iter().any(|a| a == name) {
            self.set.iter().collect()
        } else {
            Vec::new()
        }
    }

    /// Members whose relationship `name` was affected by the request
    pub fn by_relationship(&self, name: &str) -> Vec<&Resource> {
        self.set.by_relationship(name)
    }

    pub fn into_vec(self) -> Vec<Resource> {
        self.set.into_vec()
    }
}

/// Affected resources grouped by the relationship through which they were affected
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RelationshipsDictionary {
    entries: IndexMap<RelationshipAttribute, Vec<Resource>>,
}

impl RelationshipsDictionary {
    pub fn new(entries: IndexMap<RelationshipAttribute, Vec<Resource>>) -> Self {
        Self { entries }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&RelationshipAttribute, &Vec<Resource>)> {
        self.entries.iter()
    }

    pub fn relationships(&self) -> impl Iterator<Item = &RelationshipAttribute> {
        self.entries.keys()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Resources affected through the relationship called `name`
    pub fn get_by_relationship(&self, name: &str) -> Vec<&Resource> {
        self.entries
            .iter()
            .filter(|(attr, _)| attr.public_name == name)
            .flat_map(|(_, resources)| resources.iter())
            .collect()
    }

    /// Entries whose relationship is declared on `left_type`
    pub fn get_by_left_type(&self, left_type: &str) -> Vec<(&RelationshipAttribute, &Vec<Resource>)> {
        self.entries
            .iter()
            .filter(|(attr, _)| attr.principal_type == left_type)
            .collect()
    }

    /// Every affected resource, each identity once
    pub fn resources(&self) -> Vec<&Resource> {
        let mut seen: Vec<ResourceKey> = Vec::new();
        let mut result = Vec::new();
        for resource in self.entries.values().flatten() {
            let key = resource.key();
            if !seen.contains(&key) {
                seen.push(key);
                result.push(resource);
            }
        }
        result
    }

    pub fn contains(&self, key: &ResourceKey) -> bool {
        self.entries.values().flatten().any(|r| &r.key() == key)
    }
}
