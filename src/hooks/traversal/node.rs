//! Traversal nodes
//!
//! A node holds the unique resources of one type at one depth of the
//! breadth-first walk, plus the relationships that lead to the next depth.

use crate::core::resource::{Identifiable, Resource, ResourceKey};
use crate::graph::entity_graph::EntityGraph;
use crate::graph::relationship::RelationshipAttribute;
use crate::hooks::traversal::proxy::RelationshipProxy;
use indexmap::IndexMap;

/// Anything the next layer can be built from
pub trait ResourceNode {
    fn resource_type(&self) -> &str;

    /// Identities of the unique resources of this node
    fn unique_keys(&self) -> Vec<ResourceKey>;

    /// Populated relationships leading to the next layer
    fn relationships_to_next_layer(&self) -> &[RelationshipProxy];

    /// The unique resources of this node, resolved against the graph
    fn unique_resources(&self, graph: &EntityGraph) -> Vec<Resource> {
        self.unique_keys().iter().map(|key| graph.resolve(key)).collect()
    }
}

/// Resources reached through one relationship from the previous layer
#[derive(Debug, Clone, PartialEq)]
pub struct RelationshipGroup {
    pub proxy: RelationshipProxy,

    /// Previous layer resources holding the relationship
    pub lefts: Vec<ResourceKey>,

    /// Resources of this layer they point to
    pub rights: Vec<ResourceKey>,
}

/// Layer 0: the primary resources of a request
#[derive(Debug, Clone)]
pub struct RootNode {
    resource_type: String,
    unique: Vec<ResourceKey>,
    relationships_to_next_layer: Vec<RelationshipProxy>,
    all_relationships_to_next_layer: Vec<RelationshipProxy>,
    excluded: Vec<ResourceKey>,
    adopted: Vec<Resource>,
}

impl RootNode {
    pub fn new(
        resource_type: impl Into<String>,
        unique: Vec<ResourceKey>,
        populated: Vec<RelationshipProxy>,
        all: Vec<RelationshipProxy>,
    ) -> Self {
        Self {
            resource_type: resource_type.into(),
            unique,
            relationships_to_next_layer: populated,
            all_relationships_to_next_layer: all,
            excluded: Vec::new(),
            adopted: Vec::new(),
        }
    }

    /// Narrow the unique set to the resources a hook returned.
    ///
    /// Returned instances replace the ones in the graph on [`reassign`](Self::reassign),
    /// so hooks may mutate the resources they let through.
    pub fn update_unique(&mut self, returned: Vec<Resource>) {
        let returned: IndexMap<ResourceKey, Resource> =
            returned.into_iter().map(|r| (r.key(), r)).collect();

        let (kept, excluded): (Vec<_>, Vec<_>) = self
            .unique
            .drain(..)
            .partition(|key| returned.contains_key(key));
        self.unique = kept;
        self.excluded.extend(excluded);
        self.adopted = returned
            .into_iter()
            .filter(|(key, _)| self.unique.contains(key))
            .map(|(_, resource)| resource)
            .collect();
    }

    /// Apply the narrowed set to the graph's primary resources
    pub fn reassign(&mut self, graph: &mut EntityGraph) {
        let excluded = std::mem::take(&mut self.excluded);
        graph.retain_roots(|key| !excluded.contains(key));
        for resource in self.adopted.drain(..) {
            graph.replace(resource);
        }
    }

    /// Populated relationships mapped to the unique resources that hold them
    pub fn lefts_to_next_layer(&self, graph: &EntityGraph) -> IndexMap<RelationshipAttribute, Vec<ResourceKey>> {
        self.relationships_to_next_layer
            .iter()
            .map(|proxy| {
                let lefts = self
                    .unique
                    .iter()
                    .filter(|key| {
                        proxy.is_context_relation
                            || graph.get(key).is_some_and(|r| proxy.is_populated_on(r))
                    })
                    .cloned()
                    .collect();
                (proxy.attribute.clone(), lefts)
            })
            .collect()
    }

    /// Every relationship of the root type grouped by right type, each mapped
    /// to all unique resources
    pub fn lefts_to_next_layer_by_relationships(
        &self,
    ) -> IndexMap<String, IndexMap<RelationshipAttribute, Vec<ResourceKey>>> {
        let mut grouped: IndexMap<String, IndexMap<RelationshipAttribute, Vec<ResourceKey>>> =
            IndexMap::new();
        for proxy in &self.all_relationships_to_next_layer {
            grouped
                .entry(proxy.right_type().to_string())
                .or_default()
                .insert(proxy.attribute.clone(), self.unique.clone());
        }
        grouped
    }
}

impl ResourceNode for RootNode {
    fn resource_type(&self) -> &str {
        &self.resource_type
    }

    fn unique_keys(&self) -> Vec<ResourceKey> {
        self.unique.clone()
    }

    fn relationships_to_next_layer(&self) -> &[RelationshipProxy] {
        &self.relationships_to_next_layer
    }
}

/// A node below the root: the resources of one type reached from the previous layer
#[derive(Debug, Clone)]
pub struct ChildNode {
    resource_type: String,
    relationships_to_next_layer: Vec<RelationshipProxy>,
    relationships_from_previous_layer: Vec<RelationshipGroup>,
    excluded: Vec<ResourceKey>,
}

impl ChildNode {
    pub fn new(
        resource_type: impl Into<String>,
        populated: Vec<RelationshipProxy>,
        groups: Vec<RelationshipGroup>,
    ) -> Self {
        Self {
            resource_type: resource_type.into(),
            relationships_to_next_layer: populated,
            relationships_from_previous_layer: groups,
            excluded: Vec::new(),
        }
    }

    pub fn relationships_from_previous_layer(&self) -> &[RelationshipGroup] {
        &self.relationships_from_previous_layer
    }

    /// Right resources of this node per relationship from the previous layer
    pub fn rights_by_relationship(&self) -> IndexMap<RelationshipAttribute, Vec<ResourceKey>> {
        self.group_by(|group| &group.rights)
    }

    /// Previous layer resources per relationship leading into this node
    pub fn lefts_by_relationship(&self) -> IndexMap<RelationshipAttribute, Vec<ResourceKey>> {
        self.group_by(|group| &group.lefts)
    }

    fn group_by(
        &self,
        side: impl Fn(&RelationshipGroup) -> &Vec<ResourceKey>,
    ) -> IndexMap<RelationshipAttribute, Vec<ResourceKey>> {
        let mut grouped: IndexMap<RelationshipAttribute, Vec<ResourceKey>> = IndexMap::new();
        for group in &self.relationships_from_previous_layer {
            let keys = grouped.entry(group.proxy.attribute.clone()).or_default();
            for key in side(group) {
                if !keys.contains(key) {
                    keys.push(key.clone());
                }
            }
        }
        grouped
    }

    /// Narrow every group to the allowed resources
    pub fn update_unique(&mut self, allowed: &[ResourceKey]) {
        for group in &mut self.relationships_from_previous_layer {
            for key in &group.rights {
                if !allowed.contains(key) && !self.excluded.contains(key) {
                    self.excluded.push(key.clone());
                }
            }
            group.rights.retain(|key| allowed.contains(key));
        }
    }

    /// Remove excluded resources from every relationship of the previous layer
    /// leading to them (to-many filtered, to-one nulled)
    pub fn reassign(&mut self, graph: &mut EntityGraph) {
        let excluded = std::mem::take(&mut self.excluded);
        if excluded.is_empty() {
            return;
        }
        for group in &self.relationships_from_previous_layer {
            let attr = &group.proxy.attribute;
            for left in graph.keys_of_type(attr.left_type()) {
                if let Some(resource) = graph.get_mut(&left) {
                    if let Some(value) = resource.relationships.get_mut(&attr.public_name) {
                        value.retain(|key| !excluded.contains(key));
                    }
                }
            }
        }
        for key in &excluded {
            graph.remove_included(key);
        }
    }
}

impl ResourceNode for ChildNode {
    fn resource_type(&self) -> &str {
        &self.resource_type
    }

    fn unique_keys(&self) -> Vec<ResourceKey> {
        let mut unique: Vec<ResourceKey> = Vec::new();
        for group in &self.relationships_from_previous_layer {
            for key in &group.rights {
                if !unique.contains(key) {
                    unique.push(key.clone());
                }
            }
        }
        unique
    }

    fn relationships_to_next_layer(&self) -> &[RelationshipProxy] {
        &self.relationships_to_next_layer
    }
}

/// The nodes at one depth of the traversal
#[derive(Debug, Clone, Default)]
pub struct NodeLayer {
    nodes: Vec<ChildNode>,
}

impl NodeLayer {
    pub fn new(nodes: Vec<ChildNode>) -> Self {
        Self { nodes }
    }

    /// Whether any node of the layer holds resources
    pub fn any_entities(&self) -> bool {
        self.nodes.iter().any(|node| !node.unique_keys().is_empty())
    }

    pub fn iter(&self) -> impl Iterator<Item = &ChildNode> {
        self.nodes.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut ChildNode> {
        self.nodes.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}
