//! Breadth-first traversal of an entity graph
//!
//! The [`TraversalHelper`] splits the resources of a request into layers of
//! nodes. Layer 0 holds the primary resources; every next layer holds the
//! resources reached through the populated relationships of the previous one,
//! grouped by type. A resource is visited at most once per traversal, which
//! keeps the walk finite on cyclic graphs.

pub mod node;
pub mod proxy;

pub use node::{ChildNode, NodeLayer, RelationshipGroup, ResourceNode, RootNode};
pub use proxy::RelationshipProxy;

use crate::core::pipeline::TargetedFields;
use crate::core::resource::ResourceKey;
use crate::graph::entity_graph::EntityGraph;
use crate::graph::registry::ResourceRegistry;
use indexmap::IndexMap;
use std::collections::{HashMap, HashSet};

pub struct TraversalHelper<'a> {
    registry: &'a ResourceRegistry,
    targeted: &'a TargetedFields,
    root_type: String,
    processed: HashMap<String, HashSet<ResourceKey>>,
}

impl<'a> TraversalHelper<'a> {
    pub fn new(registry: &'a ResourceRegistry, targeted: &'a TargetedFields) -> Self {
        Self {
            registry,
            targeted,
            root_type: String::new(),
            processed: HashMap::new(),
        }
    }

    /// Start a traversal at the primary resources of `graph`
    pub fn create_root_node(&mut self, graph: &EntityGraph) -> RootNode {
        self.processed.clear();
        self.root_type = graph.root_type().to_string();

        let unique = self.unique_in_tree(graph.root_keys().iter().cloned(), graph.root_type());
        let all = self.proxies(graph.root_type(), true);
        let populated = populated_relationships(&all, &unique, graph);

        RootNode::new(graph.root_type(), unique, populated, all)
    }

    /// Build the layer reached from `nodes`
    pub fn create_next_layer<'n, N>(
        &mut self,
        nodes: impl IntoIterator<Item = &'n N>,
        graph: &EntityGraph,
    ) -> NodeLayer
    where
        N: ResourceNode + 'n,
    {
        let mut rights_by_proxy: IndexMap<RelationshipProxy, Vec<ResourceKey>> = IndexMap::new();
        let mut lefts_by_proxy: IndexMap<RelationshipProxy, Vec<ResourceKey>> = IndexMap::new();

        for node in nodes {
            let lefts = node.unique_keys();
            for proxy in node.relationships_to_next_layer() {
                for left in &lefts {
                    let value = graph.get(left).and_then(|resource| proxy.get_value(resource));
                    let rights = match value {
                        Some(rights) => rights,
                        None if proxy.is_context_relation => Vec::new(),
                        None => continue,
                    };

                    let unique_rights = self.unique_in_tree(rights, proxy.right_type());
                    if proxy.is_context_relation || !unique_rights.is_empty() {
                        rights_by_proxy.entry(proxy.clone()).or_default().extend(unique_rights);
                        lefts_by_proxy.entry(proxy.clone()).or_default().push(left.clone());
                    }
                }
            }
        }

        let mut groups_by_type: IndexMap<String, Vec<RelationshipGroup>> = IndexMap::new();
        for (proxy, rights) in rights_by_proxy {
            let lefts = lefts_by_proxy.shift_remove(&proxy).unwrap_or_default();
            groups_by_type
                .entry(proxy.right_type().to_string())
                .or_default()
                .push(RelationshipGroup { proxy, lefts, rights });
        }

        let nodes = groups_by_type
            .into_iter()
            .map(|(resource_type, groups)| {
                let mut unique: Vec<ResourceKey> = Vec::new();
                for key in groups.iter().flat_map(|group| &group.rights) {
                    if !unique.contains(key) {
                        unique.push(key.clone());
                    }
                }
                let all = self.proxies(&resource_type, false);
                let populated = populated_relationships(&all, &unique, graph);
                ChildNode::new(resource_type, populated, groups)
            })
            .collect();

        NodeLayer::new(nodes)
    }

    /// Relationships of a type as traversal proxies.
    ///
    /// Only relationships leaving the primary resources can be context
    /// relations; deeper layers are never written by the request.
    fn proxies(&self, resource_type: &str, from_root: bool) -> Vec<RelationshipProxy> {
        self.registry
            .relationships(resource_type)
            .iter()
            .map(|attr| {
                let is_context = from_root
                    && attr.principal_type == self.root_type
                    && self.targeted.targets_relationship(&attr.public_name);
                RelationshipProxy::new(attr.clone(), is_context)
            })
            .collect()
    }

    /// The keys not seen yet for their type, each registered as seen
    fn unique_in_tree(
        &mut self,
        keys: impl IntoIterator<Item = ResourceKey>,
        resource_type: &str,
    ) -> Vec<ResourceKey> {
        let processed = self.processed.entry(resource_type.to_string()).or_default();
        keys.into_iter().filter(|key| processed.insert(key.clone())).collect()
    }
}

fn populated_relationships(
    proxies: &[RelationshipProxy],
    keys: &[ResourceKey],
    graph: &EntityGraph,
) -> Vec<RelationshipProxy> {
    proxies
        .iter()
        .filter(|proxy| {
            proxy.is_context_relation
                || keys
                    .iter()
                    .any(|key| graph.get(key).is_some_and(|resource| proxy.is_populated_on(resource)))
        })
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ResourcesConfig;
    use crate::core::resource::Resource;

    fn registry() -> ResourceRegistry {
        let config = ResourcesConfig::from_yaml_str(
            r#"
resources:
  - name: people
    relationships:
      - name: friends
        kind: has_many
        target: people
      - name: articles
        kind: has_many
        target: articles
        inverse: author
  - name: articles
    relationships:
      - name: author
        kind: has_one
        target: people
        inverse: articles
"#,
        )
        .unwrap();
        ResourceRegistry::from_config(&config).unwrap()
    }

    fn key(t: &str, id: &str) -> ResourceKey {
        ResourceKey::new(t, id)
    }

    #[test]
    fn test_layers_follow_populated_relationships() {
        let registry = registry();
        let targeted = TargetedFields::new();
        let mut helper = TraversalHelper::new(&registry, &targeted);

        let mut graph = EntityGraph::with_roots(
            "people",
            vec![Resource::new("people", "1").with_to_many("articles", vec![key("articles", "10")])],
        );
        graph.insert(Resource::new("articles", "10").with_to_one("author", Some(key("people", "1"))));

        let root = helper.create_root_node(&graph);
        assert_eq!(root.relationships_to_next_layer().len(), 1);

        let layer = helper.create_next_layer([&root], &graph);
        assert_eq!(layer.len(), 1);
        let node = layer.iter().next().unwrap();
        assert_eq!(node.resource_type(), "articles");
        assert_eq!(node.unique_keys(), vec![key("articles", "10")]);

        // the author was already visited as a root
        let next = helper.create_next_layer(layer.iter(), &graph);
        assert!(!next.any_entities());
    }

    #[test]
    fn test_cycle_terminates() {
        let registry = registry();
        let targeted = TargetedFields::new();
        let mut helper = TraversalHelper::new(&registry, &targeted);

        let mut graph = EntityGraph::with_roots(
            "people",
            vec![Resource::new("people", "a").with_to_many("friends", vec![key("people", "b")])],
        );
        graph.insert(Resource::new("people", "b").with_to_many("friends", vec![key("people", "a")]));

        let root = helper.create_root_node(&graph);
        let first = helper.create_next_layer([&root], &graph);
        assert_eq!(first.iter().next().unwrap().unique_keys(), vec![key("people", "b")]);

        let second = helper.create_next_layer(first.iter(), &graph);
        assert!(!second.any_entities());
    }

    #[test]
    fn test_context_relation_without_value_keeps_lefts() {
        let registry = registry();
        let targeted = TargetedFields::new().with_relationship("articles");
        let mut helper = TraversalHelper::new(&registry, &targeted);

        let graph = EntityGraph::with_roots(
            "people",
            vec![Resource::new("people", "1").with_to_many("articles", vec![])],
        );

        let root = helper.create_root_node(&graph);
        let layer = helper.create_next_layer([&root], &graph);
        let node = layer.iter().next().unwrap();

        assert!(node.unique_keys().is_empty());
        let lefts = node.lefts_by_relationship();
        assert_eq!(lefts.values().next().unwrap(), &vec![key("people", "1")]);
    }

    #[test]
    fn test_repeated_rights_are_visited_once() {
        let registry = registry();
        let targeted = TargetedFields::new();
        let mut helper = TraversalHelper::new(&registry, &targeted);

        let graph = EntityGraph::with_roots(
            "articles",
            vec![
                Resource::new("articles", "1").with_to_one("author", Some(key("people", "7"))),
                Resource::new("articles", "2").with_to_one("author", Some(key("people", "7"))),
            ],
        );

        let root = helper.create_root_node(&graph);
        let layer = helper.create_next_layer([&root], &graph);
        let node = layer.iter().next().unwrap();
        assert_eq!(node.unique_keys(), vec![key("people", "7")]);
        assert_eq!(node.relationships_from_previous_layer()[0].lefts, vec![key("articles", "1")]);
    }
}
