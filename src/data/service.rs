//! Default resource service
//!
//! Sequences the resource hooks of each pipeline around the repository. One
//! service serves one unit of work: it owns the repository of a single
//! persistence session.

use crate::core::error::{HookError, ResourceError};
use crate::core::pipeline::{ResourcePipeline, TargetedFields};
use crate::core::query::{PaginationMeta, QueryParams};
use crate::core::resource::{Identifiable, Relation, Resource, ResourceKey};
use crate::core::service::{ResourceDocument, ResourceService};
use crate::data::repository::ResourceRepository;
use crate::data::session::{CancellationSignal, PersistenceSession};
use crate::graph::entity_graph::EntityGraph;
use crate::graph::registry::ResourceRegistry;
use crate::graph::relationship::RelationshipAttribute;
use crate::hooks::definition::ResourceHook;
use crate::hooks::discovery::HookContainerRegistry;
use crate::hooks::executor::ResourceHookExecutor;
use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use uuid::Uuid;

/// [`ResourceService`] over a [`ResourceRepository`]
pub struct DefaultResourceService {
    hooks: Arc<HookContainerRegistry>,
    repository: ResourceRepository,
    cancel: CancellationSignal,
}

impl DefaultResourceService {
    pub fn new(hooks: Arc<HookContainerRegistry>, session: Arc<dyn PersistenceSession>) -> Self {
        Self {
            hooks,
            repository: ResourceRepository::new(session),
            cancel: CancellationSignal::none(),
        }
    }

    /// Cancel writes when `cancel` fires
    pub fn with_cancellation(mut self, cancel: CancellationSignal) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn repository(&self) -> &ResourceRepository {
        &self.repository
    }

    fn registry(&self) -> &ResourceRegistry {
        self.hooks.resource_registry()
    }

    fn executor(&self) -> ResourceHookExecutor<'_> {
        ResourceHookExecutor::new(&self.hooks, self.repository.session().as_ref())
    }

    fn includes(&self, resource_type: &str, query: &QueryParams) -> Result<Vec<Vec<RelationshipAttribute>>> {
        self.registry().require_context(resource_type)?;
        match query.include() {
            Some(raw) => Ok(self.registry().parse_includes(resource_type, raw)?),
            None => Ok(Vec::new()),
        }
    }

    /// Not found unless `key` is stored; checked before any hook fires
    async fn require_stored(&self, key: &ResourceKey) -> Result<()> {
        match self.repository.session().find(key, &[]).await? {
            Some(_) => Ok(()),
            None => Err(not_found(key)),
        }
    }

    fn relationship(&self, key: &ResourceKey, name: &str) -> Result<RelationshipAttribute> {
        self.registry().require_context(&key.resource_type)?;
        self.registry()
            .relationship(&key.resource_type, name)
            .cloned()
            .ok_or_else(|| {
                ResourceError::RelationshipNotFound {
                    resource_type: key.resource_type.clone(),
                    id: key.id.clone(),
                    relationship: name.to_string(),
                }
                .into()
            })
    }
}

/// The single primary resource left in `graph` after `hook` ran
fn take_primary(graph: EntityGraph, hook: ResourceHook, pipeline: ResourcePipeline) -> Result<Resource> {
    graph
        .into_roots()
        .into_iter()
        .next()
        .ok_or_else(|| HookError::PrimaryResourceExcluded { hook, pipeline }.into())
}

fn not_found(key: &ResourceKey) -> anyhow::Error {
    ResourceError::NotFound {
        resource_type: key.resource_type.clone(),
        id: key.id.clone(),
    }
    .into()
}

fn document(graph: &EntityGraph, meta: Option<PaginationMeta>) -> ResourceDocument {
    ResourceDocument {
        data: graph.roots(),
        included: graph.included().cloned().collect(),
        meta,
    }
}

#[async_trait]
impl ResourceService for DefaultResourceService {
    async fn create(&self, resource: Resource, targeted: TargetedFields) -> Result<Resource> {
        let pipeline = ResourcePipeline::Post;
        self.registry().require_context(&resource.resource_type)?;

        let mut resource = resource;
        if resource.id.is_empty() {
            resource.id = Uuid::new_v4().to_string();
        }
        tracing::debug!(resource = %resource.key(), %pipeline, "running pipeline");

        let executor = self.executor().with_targeted_fields(targeted.clone());
        let mut graph = EntityGraph::with_roots(resource.resource_type.clone(), [resource]);
        executor.before_create(&mut graph, pipeline).await?;
        let resource = take_primary(graph, ResourceHook::BeforeCreate, pipeline)?;

        let created = self.repository.create(resource, &targeted, &self.cancel).await?;

        let mut graph = EntityGraph::with_roots(created.resource_type.clone(), [created]);
        executor.after_create(&graph, pipeline)?;
        executor.on_return(&mut graph, pipeline)?;
        take_primary(graph, ResourceHook::OnReturn, pipeline)
    }

    async fn get_single(&self, key: &ResourceKey, query: &QueryParams) -> Result<ResourceDocument> {
        let pipeline = ResourcePipeline::GetSingle;
        let includes = self.includes(&key.resource_type, query)?;
        tracing::debug!(resource = %key, %pipeline, "running pipeline");

        let executor = self.executor().with_includes(includes.clone());
        executor.before_read(&key.resource_type, pipeline, Some(&key.id))?;

        let mut graph = self
            .repository
            .get(key, &includes)
            .await?
            .ok_or_else(|| not_found(key))?;

        executor.after_read(&graph, pipeline)?;
        executor.on_return(&mut graph, pipeline)?;
        Ok(document(&graph, None))
    }

    async fn list(&self, resource_type: &str, query: &QueryParams) -> Result<ResourceDocument> {
        let pipeline = ResourcePipeline::Get;
        let includes = self.includes(resource_type, query)?;
        let options = self.registry().options().clone();
        let size = query.page_size(options.default_page_size);
        tracing::debug!(resource_type = %resource_type, %pipeline, page = query.page, size, "running pipeline");

        let executor = self.executor().with_includes(includes.clone());
        executor.before_read(resource_type, pipeline, None)?;

        let mut graph = self.repository.list(resource_type, &includes, size, query.page).await?;
        executor.after_read(&graph, pipeline)?;
        executor.on_return(&mut graph, pipeline)?;

        let meta = if options.include_total_record_count {
            let total = self.repository.count(resource_type).await?;
            Some(PaginationMeta::new(query.page, size, total))
        } else {
            None
        };
        Ok(document(&graph, meta))
    }

    async fn get_relationship(&self, key: &ResourceKey, relationship: &str) -> Result<Relation> {
        let pipeline = ResourcePipeline::GetRelationship;
        let attr = self.relationship(key, relationship)?;
        tracing::debug!(resource = %key, relationship, %pipeline, "running pipeline");

        let includes = vec![vec![attr.clone()]];
        let executor = self.executor().with_includes(includes.clone());
        executor.before_read(&key.resource_type, pipeline, Some(&key.id))?;

        let mut graph = self
            .repository
            .get(key, &includes)
            .await?
            .ok_or_else(|| not_found(key))?;

        executor.after_read(&graph, pipeline)?;
        executor.on_return(&mut graph, pipeline)?;

        Ok(graph
            .relation_value(key, &attr.public_name)
            .cloned()
            .unwrap_or_else(|| attr.empty_value()))
    }

    async fn update(&self, resource: Resource, targeted: TargetedFields) -> Result<Resource> {
        let pipeline = ResourcePipeline::Patch;
        self.registry().require_context(&resource.resource_type)?;
        let key = resource.key();
        tracing::debug!(resource = %key, %pipeline, "running pipeline");
        self.require_stored(&key).await?;

        let executor = self.executor().with_targeted_fields(targeted.clone());
        let mut graph = EntityGraph::with_roots(key.resource_type.clone(), [resource]);
        executor.before_update(&mut graph, pipeline).await?;
        let resource = take_primary(graph, ResourceHook::BeforeUpdate, pipeline)?;

        let mut updated = self
            .repository
            .update(&resource, &targeted, &self.cancel)
            .await?
            .ok_or_else(|| not_found(&key))?;

        // only what the request wrote takes part in the after hooks
        updated
            .relationships
            .retain(|name, _| targeted.targets_relationship(name));

        let mut graph = EntityGraph::with_roots(key.resource_type.clone(), [updated]);
        executor.after_update(&graph, pipeline)?;
        executor.on_return(&mut graph, pipeline)?;
        take_primary(graph, ResourceHook::OnReturn, pipeline)
    }

    async fn update_relationships(
        &self,
        key: &ResourceKey,
        relationship: &str,
        rights: Vec<ResourceKey>,
    ) -> Result<()> {
        let pipeline = ResourcePipeline::PatchRelationship;
        let attr = self.relationship(key, relationship)?;
        tracing::debug!(resource = %key, relationship, %pipeline, "running pipeline");

        self.require_stored(key).await?;

        let targeted = TargetedFields::new().with_relationship(attr.public_name.clone());
        let executor = self.executor().with_targeted_fields(targeted);

        let mut parent = Resource::pointer(key);
        parent.set_relation(attr.public_name.clone(), attr.shape(rights));
        let mut graph = EntityGraph::with_roots(key.resource_type.clone(), [parent]);
        executor.before_update(&mut graph, pipeline).await?;

        let parent = graph
            .roots()
            .into_iter()
            .next()
            .ok_or(HookError::PrimaryResourceExcluded {
                hook: ResourceHook::BeforeUpdate,
                pipeline,
            })?;
        let rights = attr.get_keys(&parent);

        self.repository
            .update_relationships(key, &attr, rights, &self.cancel)
            .await?;

        executor.after_update(&graph, pipeline)
    }

    async fn delete(&self, key: &ResourceKey) -> Result<()> {
        let pipeline = ResourcePipeline::Delete;
        self.registry().require_context(&key.resource_type)?;
        tracing::debug!(resource = %key, %pipeline, "running pipeline");
        self.require_stored(key).await?;

        let executor = self.executor();
        let mut graph = EntityGraph::with_roots(key.resource_type.clone(), [Resource::pointer(key)]);
        executor.before_delete(&mut graph, pipeline).await?;
        if graph.root_keys().is_empty() {
            return Err(HookError::PrimaryResourceExcluded {
                hook: ResourceHook::BeforeDelete,
                pipeline,
            }
            .into());
        }

        let succeeded = self.repository.delete(key, &self.cancel).await?;
        if !succeeded {
            return Err(not_found(key));
        }
        executor.after_delete(&graph, pipeline, succeeded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_take_primary_of_emptied_graph() {
        let mut graph = EntityGraph::with_roots("people", [Resource::new("people", "1")]);
        graph.retain_roots(|_| false);

        let err = take_primary(graph, ResourceHook::BeforeUpdate, ResourcePipeline::Patch).unwrap_err();
        assert_eq!(
            err.downcast_ref::<HookError>(),
            Some(&HookError::PrimaryResourceExcluded {
                hook: ResourceHook::BeforeUpdate,
                pipeline: ResourcePipeline::Patch,
            })
        );
    }

    #[test]
    fn test_document_splits_primary_and_included() {
        let mut graph = EntityGraph::with_roots("people", [Resource::new("people", "1")]);
        graph.insert(Resource::new("articles", "a1"));

        let document = document(&graph, None);
        assert_eq!(document.single().map(|r| r.id.as_str()), Some("1"));
        assert_eq!(document.included.len(), 1);
    }
}
