//! Relationship-tracking repository
//!
//! Writes go through the persistence session's change tracker. Relationship
//! pointers supplied by a request are reconciled against the instances the
//! session already tracks, so the same identity is never attached twice, and
//! the current value of every replaced relationship is loaded first so that
//! an assignment replaces it instead of appending to it.

use crate::core::error::{ResourceError, StorageError};
use crate::core::pipeline::TargetedFields;
use crate::core::resource::{Identifiable, Relation, Resource, ResourceKey};
use crate::data::session::{CancellationSignal, EntryState, PersistenceSession};
use crate::graph::entity_graph::EntityGraph;
use crate::graph::registry::ResourceRegistry;
use crate::graph::relationship::RelationshipAttribute;
use anyhow::Result;
use std::sync::Arc;

/// A relationship value resolved against the tracked instances of a session
#[derive(Debug, Clone, PartialEq)]
pub struct TrackedRelationship {
    /// The relationship value, shaped by cardinality
    pub value: Relation,

    /// Whether any referenced identity was already tracked
    pub was_already_tracked: bool,
}

/// Repository over one persistence session
#[derive(Clone)]
pub struct ResourceRepository {
    session: Arc<dyn PersistenceSession>,
}

impl ResourceRepository {
    pub fn new(session: Arc<dyn PersistenceSession>) -> Self {
        Self { session }
    }

    pub fn session(&self) -> &Arc<dyn PersistenceSession> {
        &self.session
    }

    fn registry(&self) -> &ResourceRegistry {
        self.session.registry()
    }

    /// The tracked instance of `pointer`'s identity, attaching the pointer as
    /// unchanged when the identity is not tracked yet.
    ///
    /// The flag is `true` when a tracked instance was found.
    pub fn attach_or_get_tracked(&self, pointer: &Resource) -> Result<(Resource, bool)> {
        let key = pointer.key();
        if let Some(tracked) = self.session.tracked(&key) {
            return Ok((tracked, true));
        }
        self.session.attach(pointer.clone(), EntryState::Unchanged)?;
        Ok((pointer.clone(), false))
    }

    /// Resolve the value of `attr` on `entity` against tracked instances.
    ///
    /// `None` when the relationship is not populated on `entity`.
    pub fn get_tracked_relationship_value(
        &self,
        attr: &RelationshipAttribute,
        entity: &Resource,
    ) -> Result<Option<TrackedRelationship>> {
        let Some(value) = attr.get_value(entity) else {
            return Ok(None);
        };

        let mut keys: Vec<ResourceKey> = Vec::new();
        let mut was_already_tracked = false;
        for key in value.keys() {
            if keys.contains(&key) {
                continue;
            }
            let (_, tracked) = self.attach_or_get_tracked(&Resource::pointer(&key))?;
            was_already_tracked |= tracked;
            keys.push(key);
        }

        Ok(Some(TrackedRelationship {
            value: attr.shape(keys),
            was_already_tracked,
        }))
    }

    /// Load the inverse navigation of `attr` on every resource `value` refers to
    pub async fn load_inverse_relationships(&self, value: &Relation, attr: &RelationshipAttribute) -> Result<()> {
        let Some(inverse) = self.registry().inverse(attr) else {
            return Ok(());
        };
        let inverse = inverse.public_name.clone();
        for key in value.keys() {
            self.session.load_navigation(&key, &inverse).await?;
        }
        Ok(())
    }

    /// Replace the join resources of a many-to-many relationship with a fresh
    /// collection linking `principal` to each of `rights`
    pub fn assign_through(
        &self,
        principal: &mut Resource,
        attr: &RelationshipAttribute,
        rights: &[ResourceKey],
    ) -> Result<()> {
        let join = attr.through().ok_or_else(|| StorageError::TransactionError {
            message: format!("{} is not a many-to-many relationship", attr.public_name),
        })?;
        let left = principal.key();

        let mut join_keys: Vec<ResourceKey> = Vec::with_capacity(rights.len());
        let mut assigned: Vec<ResourceKey> = Vec::with_capacity(rights.len());
        for right in rights {
            if assigned.contains(right) {
                continue;
            }
            let row = join.join_resource(&left, right);
            let key = row.key();
            if self.session.entry_state(&key) == EntryState::Detached {
                self.session.add(row)?;
            }
            join_keys.push(key);
            assigned.push(right.clone());
        }

        principal.set_relation(join.through_property.clone(), Relation::ToMany(join_keys));
        principal.set_relation(attr.public_name.clone(), Relation::ToMany(assigned));
        Ok(())
    }

    /// Stop tracking every resource `resource` refers to, except itself
    pub fn detach_relationships(&self, resource: &Resource) {
        let own = resource.key();
        for value in resource.relationships.values() {
            for key in value.keys() {
                if key == own {
                    continue;
                }
                self.session.detach(&key);
            }
        }
    }

    /// Insert `entity`, reconciling its targeted relationships
    pub async fn create(
        &self,
        entity: Resource,
        targeted: &TargetedFields,
        cancel: &CancellationSignal,
    ) -> Result<Resource> {
        cancel.check()?;
        let relationships = self
            .registry()
            .require_context(&entity.resource_type)?
            .relationships
            .clone();

        let mut entity = entity;
        for attr in &relationships {
            if !targeted.targets_relationship(&attr.public_name) {
                entity.clear_relation(&attr.public_name);
                continue;
            }
            let Some(tracked) = self.get_tracked_relationship_value(attr, &entity)? else {
                continue;
            };
            cancel.check()?;
            self.load_inverse_relationships(&tracked.value, attr).await?;

            if attr.is_through() {
                self.assign_through(&mut entity, attr, &tracked.value.keys())?;
            } else if tracked.was_already_tracked {
                entity.set_relation(attr.public_name.clone(), tracked.value);
            }
        }

        let key = entity.key();
        self.session.add(entity.clone())?;
        self.session.save_changes(cancel).await?;
        tracing::debug!(resource = %key, "resource created");

        let created = self.session.tracked(&key).unwrap_or(entity);
        // related values are reloaded on the next read
        self.detach_relationships(&created);
        Ok(self.public_view(created))
    }

    /// Write the targeted fields of `entity` onto the stored resource.
    ///
    /// Only targeted attributes are copied; every targeted relationship is
    /// replaced completely. `None` when no resource with that identity exists.
    pub async fn update(
        &self,
        entity: &Resource,
        targeted: &TargetedFields,
        cancel: &CancellationSignal,
    ) -> Result<Option<Resource>> {
        cancel.check()?;
        let key = entity.key();
        let relationships = self
            .registry()
            .require_context(&key.resource_type)?
            .relationships
            .clone();

        let Some(mut stored) = self.session.find(&key, &[]).await? else {
            return Ok(None);
        };

        for name in &targeted.attributes {
            if let Some(value) = entity.attribute(name) {
                stored.attributes.insert(name.clone(), value.clone());
            }
        }

        for attr in &relationships {
            if !targeted.targets_relationship(&attr.public_name) {
                continue;
            }
            let Some(tracked) = self.get_tracked_relationship_value(attr, entity)? else {
                continue;
            };
            cancel.check()?;
            self.load_current_value(&mut stored, attr).await?;
            self.load_inverse_relationships(&tracked.value, attr).await?;

            if attr.is_through() {
                self.assign_through(&mut stored, attr, &tracked.value.keys())?;
            } else {
                stored.set_relation(attr.public_name.clone(), tracked.value);
            }
        }

        self.session.update(stored)?;
        self.session.save_changes(cancel).await?;
        tracing::debug!(resource = %key, "resource updated");

        let Some(updated) = self.session.tracked(&key) else {
            return Ok(None);
        };
        self.detach_relationships(&updated);
        Ok(Some(self.public_view(updated)))
    }

    /// Replace one relationship of `parent` with `rights`, inside the open
    /// transaction or a new one
    pub async fn update_relationships(
        &self,
        parent: &ResourceKey,
        attr: &RelationshipAttribute,
        rights: Vec<ResourceKey>,
        cancel: &CancellationSignal,
    ) -> Result<()> {
        let transaction = self.session.current_or_begin_transaction().await?;
        match self.replace_relationship(parent, attr, rights, cancel).await {
            Ok(()) => transaction.commit().await,
            Err(err) => {
                transaction.rollback().await?;
                Err(err)
            }
        }
    }

    async fn replace_relationship(
        &self,
        parent: &ResourceKey,
        attr: &RelationshipAttribute,
        rights: Vec<ResourceKey>,
        cancel: &CancellationSignal,
    ) -> Result<()> {
        cancel.check()?;
        let Some(mut stored) = self.session.find(parent, &[]).await? else {
            return Err(ResourceError::NotFound {
                resource_type: parent.resource_type.clone(),
                id: parent.id.clone(),
            }
            .into());
        };

        let mut request = Resource::pointer(parent);
        request.set_relation(attr.public_name.clone(), attr.shape(rights));
        let tracked = self
            .get_tracked_relationship_value(attr, &request)?
            .unwrap_or_else(|| TrackedRelationship {
                value: attr.empty_value(),
                was_already_tracked: false,
            });

        self.load_current_value(&mut stored, attr).await?;
        self.load_inverse_relationships(&tracked.value, attr).await?;
        if attr.is_through() {
            self.assign_through(&mut stored, attr, &tracked.value.keys())?;
        } else {
            stored.set_relation(attr.public_name.clone(), tracked.value);
        }

        self.session.update(stored)?;
        self.session.save_changes(cancel).await?;
        tracing::debug!(resource = %parent, relationship = %attr.public_name, "relationship replaced");

        if let Some(updated) = self.session.tracked(parent) {
            self.detach_relationships(&updated);
        }
        Ok(())
    }

    /// Remove a resource. `false` when it does not exist.
    pub async fn delete(&self, key: &ResourceKey, cancel: &CancellationSignal) -> Result<bool> {
        cancel.check()?;
        if self.session.find(key, &[]).await?.is_none() {
            return Ok(false);
        }
        self.session.remove(key)?;
        self.session.save_changes(cancel).await?;
        tracing::debug!(resource = %key, "resource deleted");
        Ok(true)
    }

    /// One resource with the given include chains loaded into its graph
    pub async fn get(
        &self,
        key: &ResourceKey,
        includes: &[Vec<RelationshipAttribute>],
    ) -> Result<Option<EntityGraph>> {
        let Some(found) = self.session.find(key, &[]).await? else {
            return Ok(None);
        };
        let mut graph = EntityGraph::with_roots(key.resource_type.clone(), [bare(found)]);
        self.load_includes(&mut graph, includes).await?;
        Ok(Some(graph))
    }

    /// Every resource of a type, paged, with the given include chains loaded
    pub async fn list(
        &self,
        resource_type: &str,
        includes: &[Vec<RelationshipAttribute>],
        size: usize,
        number: i64,
    ) -> Result<EntityGraph> {
        let all = self.session.find_all(resource_type, &[]).await?;
        let selected = Self::page(all, size, number);
        let mut graph = EntityGraph::with_roots(resource_type, selected.into_iter().map(bare));
        self.load_includes(&mut graph, includes).await?;
        Ok(graph)
    }

    /// Select one page of resources, see [`crate::core::query::page`]
    pub fn page(items: Vec<Resource>, size: usize, number: i64) -> Vec<Resource> {
        crate::core::query::page(items, size, number)
    }

    /// Number of stored resources of a type
    pub async fn count(&self, resource_type: &str) -> Result<usize> {
        self.session.count(resource_type).await
    }

    /// Walk every include chain from the primary resources, loading each hop
    /// into the graph
    async fn load_includes(&self, graph: &mut EntityGraph, includes: &[Vec<RelationshipAttribute>]) -> Result<()> {
        for chain in includes {
            let mut current: Vec<ResourceKey> = graph.root_keys().to_vec();

            for attr in chain {
                let ids: Vec<String> = current
                    .iter()
                    .filter(|key| key.resource_type == attr.principal_type)
                    .map(|key| key.id.clone())
                    .collect();
                if ids.is_empty() {
                    break;
                }

                let holders = self
                    .session
                    .find_many(&attr.principal_type, &ids, std::slice::from_ref(&attr.public_name))
                    .await?;

                let mut next: Vec<ResourceKey> = Vec::new();
                for holder in &holders {
                    let value = attr.get_value(holder).cloned().unwrap_or_else(|| attr.empty_value());
                    for key in value.keys() {
                        if !next.contains(&key) {
                            next.push(key);
                        }
                    }
                    graph.set_relation(&holder.key(), attr.public_name.clone(), value);
                }

                let next_ids: Vec<String> = next.iter().map(|key| key.id.clone()).collect();
                for related in self.session.find_many(&attr.dependent_type, &next_ids, &[]).await? {
                    graph.insert_if_absent(bare(related));
                }
                current = next;
            }
        }
        Ok(())
    }

    /// Materialize the stored value of `attr` on the tracked resource and on
    /// `stored`, so that assigning it replaces rather than appends
    async fn load_current_value(&self, stored: &mut Resource, attr: &RelationshipAttribute) -> Result<()> {
        let key = stored.key();
        let name = match attr.through() {
            Some(join) => join.through_property.clone(),
            None => attr.public_name.clone(),
        };
        let current = self.session.load_navigation(&key, &name).await?;
        stored.set_relation(name, current);
        Ok(())
    }

    /// Strip join navigations, which are storage detail
    fn public_view(&self, mut resource: Resource) -> Resource {
        let join_properties: Vec<String> = self
            .registry()
            .relationships(&resource.resource_type)
            .iter()
            .filter_map(|attr| attr.through().map(|join| join.through_property.clone()))
            .collect();
        for name in join_properties {
            resource.clear_relation(&name);
        }
        resource
    }
}

/// A loaded resource without its navigations
fn bare(mut resource: Resource) -> Resource {
    resource.relationships.clear();
    resource
}
