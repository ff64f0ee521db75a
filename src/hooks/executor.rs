//! Hook execution over an entity graph
//!
//! The [`ResourceHookExecutor`] fires the hooks of one request. Before hooks
//! may narrow or mutate the graph they are handed; the narrowed graph is what
//! the repository persists. Relationship hooks fire for every layer of the
//! graph reached from the primary resources, and implicit relationship hooks
//! fire for resources that lose a relationship as a side effect of the write.

use crate::core::error::{HookError, StorageError};
use crate::core::pipeline::{ResourcePipeline, TargetedFields};
use crate::core::resource::{Identifiable, Resource, ResourceKey};
use crate::data::session::PersistenceSession;
use crate::graph::entity_graph::EntityGraph;
use crate::graph::registry::ResourceRegistry;
use crate::graph::relationship::RelationshipAttribute;
use crate::hooks::collections::{DiffableResourceHashSet, RelationshipsDictionary, ResourceHashSet};
use crate::hooks::definition::{ResourceDefinition, ResourceHook};
use crate::hooks::discovery::HookContainerRegistry;
use crate::hooks::traversal::{NodeLayer, ResourceNode, TraversalHelper};
use anyhow::Result;
use indexmap::IndexMap;
use std::collections::HashSet;
use std::sync::Mutex;

/// Fires the resource hooks of one request
pub struct ResourceHookExecutor<'a> {
    hooks: &'a HookContainerRegistry,
    session: &'a dyn PersistenceSession,
    targeted: TargetedFields,
    includes: Vec<Vec<RelationshipAttribute>>,

    /// Resources that lost a relationship during the before phase, per type
    implicitly_affected: Mutex<Vec<(String, RelationshipsDictionary)>>,
}

impl<'a> ResourceHookExecutor<'a> {
    pub fn new(hooks: &'a HookContainerRegistry, session: &'a dyn PersistenceSession) -> Self {
        Self {
            hooks,
            session,
            targeted: TargetedFields::default(),
            includes: Vec::new(),
            implicitly_affected: Mutex::new(Vec::new()),
        }
    }

    /// Fields the client supplied in the request
    pub fn with_targeted_fields(mut self, targeted: TargetedFields) -> Self {
        self.targeted = targeted;
        self
    }

    /// Include chains of a read request
    pub fn with_includes(mut self, includes: Vec<Vec<RelationshipAttribute>>) -> Self {
        self.includes = includes;
        self
    }

    fn registry(&self) -> &'a ResourceRegistry {
        self.hooks.resource_registry()
    }

    fn container(&self, resource_type: &str, hook: ResourceHook) -> Option<&'a dyn ResourceDefinition> {
        if !self.registry().options().enable_resource_hooks {
            return None;
        }
        self.hooks.container(resource_type, hook)
    }

    /// Fire `BeforeRead` for the primary type, then once for every other type
    /// named by the include chains
    pub fn before_read(
        &self,
        resource_type: &str,
        pipeline: ResourcePipeline,
        string_id: Option<&str>,
    ) -> Result<()> {
        if let Some(container) = self.container(resource_type, ResourceHook::BeforeRead) {
            trace_hook(ResourceHook::BeforeRead, resource_type, 1);
            container.before_read(pipeline, false, string_id)?;
        }

        let mut called: Vec<&str> = vec![resource_type];
        for chain in &self.includes {
            for attr in chain {
                let right_type = attr.right_type();
                if called.contains(&right_type) {
                    continue;
                }
                called.push(right_type);
                if let Some(container) = self.container(right_type, ResourceHook::BeforeRead) {
                    trace_hook(ResourceHook::BeforeRead, right_type, 0);
                    container.before_read(pipeline, true, None)?;
                }
            }
        }
        Ok(())
    }

    /// Fire `BeforeCreate` on the primary resources, then the relationship
    /// hooks of the resources they point to
    pub async fn before_create(&self, graph: &mut EntityGraph, pipeline: ResourcePipeline) -> Result<()> {
        let mut helper = TraversalHelper::new(self.registry(), &self.targeted);
        let mut node = helper.create_root_node(graph);
        let root_type = graph.root_type().to_string();

        if let Some(container) = self.container(&root_type, ResourceHook::BeforeCreate) {
            let set = ResourceHashSet::new(node.unique_resources(graph), node.lefts_to_next_layer(graph));
            trace_hook(ResourceHook::BeforeCreate, &root_type, set.len());
            let returned = container.before_create(set, pipeline)?;
            node.update_unique(returned);
            node.reassign(graph);
        }

        let layer = helper.create_next_layer([&node], graph);
        self.fire_nested_before_update_hooks(&mut helper, layer, graph, pipeline)
            .await
    }

    /// Fire `BeforeUpdate` on the primary resources, with their stored values
    /// when enabled, then the relationship hooks of the resources they point to
    pub async fn before_update(&self, graph: &mut EntityGraph, pipeline: ResourcePipeline) -> Result<()> {
        let mut helper = TraversalHelper::new(self.registry(), &self.targeted);
        let mut node = helper.create_root_node(graph);
        let root_type = graph.root_type().to_string();

        if let Some(container) = self.container(&root_type, ResourceHook::BeforeUpdate) {
            let database_values = if self
                .hooks
                .should_load_db_values(&root_type, ResourceHook::BeforeUpdate)
            {
                let includes = relationship_names(node.relationships_to_next_layer());
                Some(self.load_db_values(&root_type, &node.unique_keys(), &includes).await?)
            } else {
                None
            };

            let set = DiffableResourceHashSet::new(
                ResourceHashSet::new(node.unique_resources(graph), node.lefts_to_next_layer(graph)),
                database_values,
                self.targeted.attributes.clone(),
            );
            trace_hook(ResourceHook::BeforeUpdate, &root_type, set.len());
            let returned = container.before_update(set, pipeline)?;
            node.update_unique(returned);
            node.reassign(graph);
        }

        let layer = helper.create_next_layer([&node], graph);
        self.fire_nested_before_update_hooks(&mut helper, layer, graph, pipeline)
            .await
    }

    /// Fire `BeforeDelete` on the primary resources, then the implicit
    /// relationship hooks of every resource related to them
    pub async fn before_delete(&self, graph: &mut EntityGraph, pipeline: ResourcePipeline) -> Result<()> {
        let mut helper = TraversalHelper::new(self.registry(), &self.targeted);
        let mut node = helper.create_root_node(graph);
        let root_type = graph.root_type().to_string();

        if let Some(container) = self.container(&root_type, ResourceHook::BeforeDelete) {
            let targets = if self
                .hooks
                .should_load_db_values(&root_type, ResourceHook::BeforeDelete)
            {
                let includes = relationship_names(node.relationships_to_next_layer());
                self.load_db_values(&root_type, &node.unique_keys(), &includes).await?
            } else {
                node.unique_resources(graph)
            };

            let set = ResourceHashSet::new(targets, node.lefts_to_next_layer(graph));
            trace_hook(ResourceHook::BeforeDelete, &root_type, set.len());
            let returned = container.before_delete(set, pipeline)?;
            node.update_unique(returned);
            node.reassign(graph);
        }

        for (right_type, targets) in node.lefts_to_next_layer_by_relationships() {
            self.fire_for_affected_implicits(&right_type, targets, pipeline, &[])
                .await?;
        }
        Ok(())
    }

    /// Walk the layers below the primary resources of a write.
    ///
    /// Per node: `BeforeUpdateRelationship` narrows the resources getting a
    /// relationship assigned; outside create pipelines the resources the
    /// previous layer held before the write are implicitly affected; resources
    /// already holding a to-one inverse elsewhere lose it.
    async fn fire_nested_before_update_hooks(
        &self,
        helper: &mut TraversalHelper<'_>,
        mut layer: NodeLayer,
        graph: &mut EntityGraph,
        pipeline: ResourcePipeline,
    ) -> Result<()> {
        while !layer.is_empty() {
            for node in layer.iter_mut() {
                let resource_type = node.resource_type().to_string();
                let unique = node.unique_keys();

                if !unique.is_empty() {
                    if let Some(container) =
                        self.container(&resource_type, ResourceHook::BeforeUpdateRelationship)
                    {
                        let database_values = if self
                            .hooks
                            .should_load_db_values(&resource_type, ResourceHook::BeforeUpdateRelationship)
                        {
                            let includes = relationship_names(node.relationships_to_next_layer());
                            Some(self.load_db_values(&resource_type, &unique, &includes).await?)
                        } else {
                            None
                        };

                        let dictionary = self.dictionary(
                            node.rights_by_relationship(),
                            graph,
                            database_values.as_deref(),
                        );
                        let ids: HashSet<String> = unique.iter().map(|key| key.id.clone()).collect();

                        trace_hook(ResourceHook::BeforeUpdateRelationship, &resource_type, ids.len());
                        let allowed_ids = container.before_update_relationship(ids, &dictionary, pipeline)?;
                        let allowed: Vec<ResourceKey> = unique
                            .iter()
                            .filter(|key| allowed_ids.contains(&key.id))
                            .cloned()
                            .collect();
                        node.update_unique(&allowed);
                        node.reassign(graph);
                    }
                }

                if !pipeline.is_create() {
                    let lefts = node.lefts_by_relationship();
                    if lefts.values().any(|keys| !keys.is_empty()) {
                        let existing = node.unique_keys();
                        self.fire_for_affected_implicits(&resource_type, lefts, pipeline, &existing)
                            .await?;
                    }
                }

                let previous: Vec<ResourceKey> =
                    node.lefts_by_relationship().into_values().flatten().collect();
                let mut by_left_type: IndexMap<String, IndexMap<RelationshipAttribute, Vec<ResourceKey>>> =
                    IndexMap::new();
                for (attr, rights) in node.rights_by_relationship() {
                    let to_one_inverse = self
                        .registry()
                        .inverse(&attr)
                        .is_some_and(|inverse| !inverse.is_to_many());
                    if to_one_inverse && !rights.is_empty() {
                        let inverse = self.replace_keys_with_inverse(IndexMap::from([(attr.clone(), rights)]));
                        by_left_type
                            .entry(attr.left_type().to_string())
                            .or_default()
                            .extend(inverse);
                    }
                }
                for (left_type, targets) in by_left_type {
                    self.fire_for_affected_implicits(&left_type, targets, pipeline, &previous)
                        .await?;
                }
            }

            layer = helper.create_next_layer(layer.iter(), graph);
        }
        Ok(())
    }

    /// Fire `BeforeImplicitUpdateRelationship` on `resource_type` for the
    /// resources currently related to `targets`, minus `existing`.
    ///
    /// The affected resources are remembered so that `AfterUpdateRelationship`
    /// reaches them once the write succeeded.
    async fn fire_for_affected_implicits(
        &self,
        resource_type: &str,
        targets: IndexMap<RelationshipAttribute, Vec<ResourceKey>>,
        pipeline: ResourcePipeline,
        existing: &[ResourceKey],
    ) -> Result<()> {
        let before = self.container(resource_type, ResourceHook::BeforeImplicitUpdateRelationship);
        let after = self.container(resource_type, ResourceHook::AfterUpdateRelationship);
        if before.is_none() && after.is_none() {
            return Ok(());
        }

        let affected = self.load_implicitly_affected(&targets, existing).await?;
        let inverse = self.replace_keys_with_inverse(affected);
        if inverse.is_empty() {
            return Ok(());
        }

        let dictionary = RelationshipsDictionary::new(inverse);
        if let Some(container) = before {
            trace_hook(
                ResourceHook::BeforeImplicitUpdateRelationship,
                resource_type,
                dictionary.resources().len(),
            );
            container.before_implicit_update_relationship(&dictionary, pipeline)?;
        }

        self.implicitly_affected
            .lock()
            .map_err(|e| StorageError::LockPoisoned { message: e.to_string() })?
            .push((resource_type.to_string(), dictionary));
        Ok(())
    }

    /// Load the resources currently related to each left resource, excluding
    /// `existing`, grouped by relationship
    pub async fn load_implicitly_affected(
        &self,
        lefts_by_relationship: &IndexMap<RelationshipAttribute, Vec<ResourceKey>>,
        existing: &[ResourceKey],
    ) -> Result<IndexMap<RelationshipAttribute, Vec<Resource>>> {
        let mut affected = IndexMap::new();

        for (attr, lefts) in lefts_by_relationship {
            if lefts.is_empty() {
                continue;
            }
            let ids: Vec<String> = lefts.iter().map(|key| key.id.clone()).collect();
            let loaded = self
                .session
                .find_many(attr.left_type(), &ids, std::slice::from_ref(&attr.public_name))
                .await?;

            let mut rights: Vec<ResourceKey> = Vec::new();
            for left in &loaded {
                for key in attr.get_keys(left) {
                    if !existing.contains(&key) && !rights.contains(&key) {
                        rights.push(key);
                    }
                }
            }
            if rights.is_empty() {
                continue;
            }

            let ids: Vec<String> = rights.iter().map(|key| key.id.clone()).collect();
            let resources = self.session.find_many(attr.right_type(), &ids, &[]).await?;
            if !resources.is_empty() {
                affected.insert(attr.clone(), resources);
            }
        }
        Ok(affected)
    }

    /// Fire `AfterCreate` on the primary resources, then
    /// `AfterUpdateRelationship` per layer
    pub fn after_create(&self, graph: &EntityGraph, pipeline: ResourcePipeline) -> Result<()> {
        self.after_write(graph, pipeline, ResourceHook::AfterCreate)
    }

    /// Fire `AfterUpdate` on the primary resources, then
    /// `AfterUpdateRelationship` per layer
    pub fn after_update(&self, graph: &EntityGraph, pipeline: ResourcePipeline) -> Result<()> {
        self.after_write(graph, pipeline, ResourceHook::AfterUpdate)
    }

    fn after_write(&self, graph: &EntityGraph, pipeline: ResourcePipeline, hook: ResourceHook) -> Result<()> {
        let mut helper = TraversalHelper::new(self.registry(), &self.targeted);
        let node = helper.create_root_node(graph);

        if let Some(container) = self.container(graph.root_type(), hook) {
            let set = ResourceHashSet::new(node.unique_resources(graph), node.lefts_to_next_layer(graph));
            trace_hook(hook, graph.root_type(), set.len());
            if hook == ResourceHook::AfterCreate {
                container.after_create(&set, pipeline)?;
            } else {
                container.after_update(&set, pipeline)?;
            }
        }

        let mut layer = helper.create_next_layer([&node], graph);
        while layer.any_entities() {
            for node in layer.iter() {
                let Some(container) =
                    self.container(node.resource_type(), ResourceHook::AfterUpdateRelationship)
                else {
                    continue;
                };
                let rights = self.replace_keys_with_inverse(node.rights_by_relationship());
                let dictionary = self.dictionary(rights, graph, None);
                if dictionary.is_empty() {
                    continue;
                }
                trace_hook(
                    ResourceHook::AfterUpdateRelationship,
                    node.resource_type(),
                    dictionary.resources().len(),
                );
                container.after_update_relationship(&dictionary, pipeline)?;
            }
            layer = helper.create_next_layer(layer.iter(), graph);
        }

        self.fire_recorded_implicits(pipeline)
    }

    /// Fire `AfterRead` on the primary resources, then on the included
    /// resources of every layer
    pub fn after_read(&self, graph: &EntityGraph, pipeline: ResourcePipeline) -> Result<()> {
        let mut helper = TraversalHelper::new(self.registry(), &self.targeted);
        let node = helper.create_root_node(graph);

        if let Some(container) = self.container(graph.root_type(), ResourceHook::AfterRead) {
            let set = ResourceHashSet::from_resources(node.unique_resources(graph));
            trace_hook(ResourceHook::AfterRead, graph.root_type(), set.len());
            container.after_read(&set, pipeline, false)?;
        }

        let mut layer = helper.create_next_layer([&node], graph);
        while layer.any_entities() {
            for node in layer.iter() {
                if let Some(container) = self.container(node.resource_type(), ResourceHook::AfterRead) {
                    let set = ResourceHashSet::from_resources(node.unique_resources(graph));
                    trace_hook(ResourceHook::AfterRead, node.resource_type(), set.len());
                    container.after_read(&set, pipeline, true)?;
                }
            }
            layer = helper.create_next_layer(layer.iter(), graph);
        }
        Ok(())
    }

    /// Fire `AfterDelete` on the primary resources; when the delete went
    /// through, the resources that lost a relationship get
    /// `AfterUpdateRelationship`
    pub fn after_delete(&self, graph: &EntityGraph, pipeline: ResourcePipeline, succeeded: bool) -> Result<()> {
        let mut helper = TraversalHelper::new(self.registry(), &self.targeted);
        let node = helper.create_root_node(graph);

        if let Some(container) = self.container(graph.root_type(), ResourceHook::AfterDelete) {
            let set = ResourceHashSet::from_resources(node.unique_resources(graph));
            trace_hook(ResourceHook::AfterDelete, graph.root_type(), set.len());
            container.after_delete(&set, pipeline, succeeded)?;
        }

        if succeeded {
            self.fire_recorded_implicits(pipeline)
        } else {
            Ok(())
        }
    }

    /// Fire `OnReturn` on the primary resources and every layer below,
    /// narrowing the graph to what the hooks return
    pub fn on_return(&self, graph: &mut EntityGraph, pipeline: ResourcePipeline) -> Result<()> {
        if pipeline == ResourcePipeline::GetRelationship {
            return Ok(());
        }

        let mut helper = TraversalHelper::new(self.registry(), &self.targeted);
        let mut node = helper.create_root_node(graph);
        let root_type = graph.root_type().to_string();

        if let Some(container) = self.container(&root_type, ResourceHook::OnReturn) {
            let set = ResourceHashSet::from_resources(node.unique_resources(graph));
            trace_hook(ResourceHook::OnReturn, &root_type, set.len());
            let returned = container.on_return(set, pipeline)?;
            if pipeline == ResourcePipeline::GetSingle && returned.len() > 1 {
                return Err(HookError::TooManyResults {
                    hook: ResourceHook::OnReturn,
                    pipeline,
                    count: returned.len(),
                }
                .into());
            }
            node.update_unique(returned);
            node.reassign(graph);
        }

        let mut layer = helper.create_next_layer([&node], graph);
        while layer.any_entities() {
            for child in layer.iter_mut() {
                let Some(container) = self.container(child.resource_type(), ResourceHook::OnReturn) else {
                    continue;
                };
                let set = ResourceHashSet::from_resources(child.unique_resources(graph));
                trace_hook(ResourceHook::OnReturn, child.resource_type(), set.len());
                let returned = container.on_return(set, pipeline)?;

                let allowed: Vec<ResourceKey> = returned.iter().map(Identifiable::key).collect();
                child.update_unique(&allowed);
                child.reassign(graph);
                for resource in returned {
                    if graph.contains(&resource.key()) {
                        graph.replace(resource);
                    }
                }
            }
            layer = helper.create_next_layer(layer.iter(), graph);
        }
        Ok(())
    }

    fn fire_recorded_implicits(&self, pipeline: ResourcePipeline) -> Result<()> {
        let recorded = std::mem::take(
            &mut *self
                .implicitly_affected
                .lock()
                .map_err(|e| StorageError::LockPoisoned { message: e.to_string() })?,
        );
        for (resource_type, dictionary) in recorded {
            if let Some(container) = self.container(&resource_type, ResourceHook::AfterUpdateRelationship) {
                trace_hook(
                    ResourceHook::AfterUpdateRelationship,
                    &resource_type,
                    dictionary.resources().len(),
                );
                container.after_update_relationship(&dictionary, pipeline)?;
            }
        }
        Ok(())
    }

    async fn load_db_values(
        &self,
        resource_type: &str,
        keys: &[ResourceKey],
        includes: &[String],
    ) -> Result<Vec<Resource>> {
        let ids: Vec<String> = keys.iter().map(|key| key.id.clone()).collect();
        self.session.find_many(resource_type, &ids, includes).await
    }

    /// Re-key a relationship map by the inverse of each relationship, dropping
    /// relationships without one
    fn replace_keys_with_inverse<V>(
        &self,
        entries: IndexMap<RelationshipAttribute, V>,
    ) -> IndexMap<RelationshipAttribute, V> {
        entries
            .into_iter()
            .filter_map(|(attr, value)| self.registry().inverse(&attr).map(|inverse| (inverse.clone(), value)))
            .collect()
    }

    /// Resolve keys to resources: stored values first, then tracked instances,
    /// then whatever the graph holds
    fn dictionary(
        &self,
        entries: IndexMap<RelationshipAttribute, Vec<ResourceKey>>,
        graph: &EntityGraph,
        database_values: Option<&[Resource]>,
    ) -> RelationshipsDictionary {
        let resolved = entries
            .into_iter()
            .map(|(attr, keys)| {
                let resources = keys
                    .iter()
                    .map(|key| {
                        database_values
                            .and_then(|values| values.iter().find(|r| &r.key() == key))
                            .cloned()
                            .or_else(|| graph.get(key).cloned())
                            .or_else(|| self.session.tracked(key))
                            .unwrap_or_else(|| Resource::pointer(key))
                    })
                    .collect();
                (attr, resources)
            })
            .collect();
        RelationshipsDictionary::new(resolved)
    }
}

fn relationship_names(proxies: &[crate::hooks::traversal::RelationshipProxy]) -> Vec<String> {
    proxies
        .iter()
        .map(|proxy| proxy.attribute.public_name.clone())
        .collect()
}

fn trace_hook(hook: ResourceHook, resource_type: &str, count: usize) {
    tracing::debug!(hook = %hook, resource_type = %resource_type, count, "firing resource hook");
}
