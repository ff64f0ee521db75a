//! Shared test harness for hook and repository testing
//!
//! Provides a fixture resource graph (people, articles, passports, tags), a
//! `RecordingDefinition` that logs every hook call into a shared log, and a
//! seeded in-memory store.
//!
//! # Usage
//!
//! From any integration test file in `tests/`:
//! ```rust,ignore
//! mod hooks_harness;
//! use hooks_harness::*;
//! ```

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use jsonapi::prelude::*;

// ---------------------------------------------------------------------------
// Resource graph
// ---------------------------------------------------------------------------

pub const RESOURCES_YAML: &str = r#"
resources:
  - name: people
    attributes: [name]
    relationships:
      - name: articles
        kind: has_many
        target: articles
        inverse: author
      - name: passport
        kind: has_one
        target: passports
        inverse: owner
  - name: articles
    attributes: [title]
    relationships:
      - name: author
        kind: has_one
        target: people
        inverse: articles
      - name: tags
        kind: has_many_through
        target: tags
        through:
          join_type: article-tags
          property: article-tags
          left: article
          right: tag
  - name: passports
    attributes: [number]
    relationships:
      - name: owner
        kind: has_one
        target: people
        inverse: passport
  - name: tags
    attributes: [name]
"#;

/// The fixture registry with default options
pub fn registry() -> Arc<ResourceRegistry> {
    registry_with_options(HookOptions::default())
}

/// The fixture registry with the given options
pub fn registry_with_options(options: HookOptions) -> Arc<ResourceRegistry> {
    let mut config = ResourcesConfig::from_yaml_str(RESOURCES_YAML).unwrap();
    config.options = options;
    Arc::new(ResourceRegistry::from_config(&config).unwrap())
}

pub fn key(resource_type: &str, id: &str) -> ResourceKey {
    ResourceKey::new(resource_type, id)
}

/// Sorted ids of a relation, for order independent comparison
pub fn ids(relation: Option<Relation>) -> Vec<String> {
    let mut ids: Vec<String> = relation
        .map(|r| r.keys().into_iter().map(|k| k.id).collect())
        .unwrap_or_default();
    ids.sort();
    ids
}

/// A store holding:
///
/// - people 1, 2, 3
/// - articles a1 (author 1, tags t1 t2), a2 (author 2), a3 (no author)
/// - passports p1 (owner 1), p2 (owner 2)
/// - tags t1, t2, t3
pub fn seeded_store(registry: Arc<ResourceRegistry>) -> InMemoryStore {
    let store = InMemoryStore::new(registry);
    store
        .seed([
            Resource::new("people", "1").with_attribute("name", "Alice"),
            Resource::new("people", "2").with_attribute("name", "Bob"),
            Resource::new("people", "3").with_attribute("name", "Carol"),
            Resource::new("tags", "t1").with_attribute("name", "rust"),
            Resource::new("tags", "t2").with_attribute("name", "async"),
            Resource::new("tags", "t3").with_attribute("name", "serde"),
            Resource::new("articles", "a1")
                .with_attribute("title", "First")
                .with_to_one("author", Some(key("people", "1")))
                .with_to_many("tags", vec![key("tags", "t1"), key("tags", "t2")]),
            Resource::new("articles", "a2")
                .with_attribute("title", "Second")
                .with_to_one("author", Some(key("people", "2"))),
            Resource::new("articles", "a3").with_attribute("title", "Third"),
            Resource::new("passports", "p1")
                .with_attribute("number", "X-1")
                .with_to_one("owner", Some(key("people", "1"))),
            Resource::new("passports", "p2")
                .with_attribute("number", "X-2")
                .with_to_one("owner", Some(key("people", "2"))),
        ])
        .unwrap();
    store
}

// ---------------------------------------------------------------------------
// Recording definitions
// ---------------------------------------------------------------------------

/// One recorded hook call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HookCall {
    pub hook: ResourceHook,
    pub resource_type: String,
    /// Sorted ids of the resources handed to the hook
    pub ids: Vec<String>,
    /// Relationship names of the dictionary, for relationship hooks
    pub relationships: Vec<String>,
    pub pipeline: ResourcePipeline,
}

pub type HookLog = Arc<Mutex<Vec<HookCall>>>;

/// Error returned by a failing hook
#[derive(Debug, thiserror::Error)]
#[error("hook {0} vetoed the request")]
pub struct HookVeto(pub ResourceHook);

/// A definition implementing the given hooks, recording every call
pub struct RecordingDefinition {
    resource_type: String,
    hooks: Vec<ResourceHook>,
    rejected: Vec<String>,
    extra_on_return: Option<Resource>,
    failing: Option<ResourceHook>,
    database_values: Vec<ResourceHook>,
    log: HookLog,
}

impl RecordingDefinition {
    /// A definition implementing every hook
    pub fn new(resource_type: &str) -> Self {
        Self::implementing(resource_type, ResourceHook::ALL)
    }

    pub fn implementing(resource_type: &str, hooks: impl IntoIterator<Item = ResourceHook>) -> Self {
        Self {
            resource_type: resource_type.to_string(),
            hooks: hooks.into_iter().collect(),
            rejected: Vec::new(),
            extra_on_return: None,
            failing: None,
            database_values: Vec::new(),
            log: HookLog::default(),
        }
    }

    /// Drop the resource with `id` from every hook that can narrow its input
    pub fn rejecting(mut self, id: &str) -> Self {
        self.rejected.push(id.to_string());
        self
    }

    /// Append `resource` to what `OnReturn` returns
    pub fn returning_extra(mut self, resource: Resource) -> Self {
        self.extra_on_return = Some(resource);
        self
    }

    /// Fail with [`HookVeto`] when `hook` fires
    pub fn failing_on(mut self, hook: ResourceHook) -> Self {
        self.failing = Some(hook);
        self
    }

    /// Load database values for `hook`
    pub fn with_database_values(mut self, hook: ResourceHook) -> Self {
        self.database_values.push(hook);
        self
    }

    fn record<'r>(
        &self,
        hook: ResourceHook,
        resources: impl IntoIterator<Item = &'r Resource>,
        relationships: Vec<String>,
        pipeline: ResourcePipeline,
    ) -> Result<()> {
        let mut ids: Vec<String> = resources.into_iter().map(|r| r.id.clone()).collect();
        ids.sort();
        self.log.lock().unwrap().push(HookCall {
            hook,
            resource_type: self.resource_type.clone(),
            ids,
            relationships,
            pipeline,
        });
        if self.failing == Some(hook) {
            return Err(HookVeto(hook).into());
        }
        Ok(())
    }

    fn allowed(&self, resources: Vec<Resource>) -> Vec<Resource> {
        resources
            .into_iter()
            .filter(|r| !self.rejected.contains(&r.id))
            .collect()
    }
}

fn relationship_names(dictionary: &RelationshipsDictionary) -> Vec<String> {
    let mut names: Vec<String> = dictionary
        .relationships()
        .map(|attr| attr.public_name.clone())
        .collect();
    names.sort();
    names
}

impl ResourceDefinition for RecordingDefinition {
    fn resource_type(&self) -> &str {
        &self.resource_type
    }

    fn manifest(&self) -> HookManifest {
        self.database_values.iter().fold(
            HookManifest::new().implement_all(self.hooks.iter().copied()),
            |manifest, hook| manifest.load_database_values(*hook, true),
        )
    }

    fn before_read(&self, pipeline: ResourcePipeline, _is_included: bool, string_id: Option<&str>) -> Result<()> {
        let resources: Vec<Resource> = string_id
            .map(|id| Resource::new(self.resource_type.clone(), id))
            .into_iter()
            .collect();
        self.record(ResourceHook::BeforeRead, &resources, Vec::new(), pipeline)
    }

    fn before_create(&self, resources: ResourceHashSet, pipeline: ResourcePipeline) -> Result<Vec<Resource>> {
        self.record(ResourceHook::BeforeCreate, resources.iter(), Vec::new(), pipeline)?;
        Ok(self.allowed(resources.into_vec()))
    }

    fn before_update(
        &self,
        resources: DiffableResourceHashSet,
        pipeline: ResourcePipeline,
    ) -> Result<Vec<Resource>> {
        self.record(ResourceHook::BeforeUpdate, resources.iter(), Vec::new(), pipeline)?;
        Ok(self.allowed(resources.into_vec()))
    }

    fn before_delete(&self, resources: ResourceHashSet, pipeline: ResourcePipeline) -> Result<Vec<Resource>> {
        self.record(ResourceHook::BeforeDelete, resources.iter(), Vec::new(), pipeline)?;
        Ok(self.allowed(resources.into_vec()))
    }

    fn before_update_relationship(
        &self,
        ids: HashSet<String>,
        relationships: &RelationshipsDictionary,
        pipeline: ResourcePipeline,
    ) -> Result<HashSet<String>> {
        let resources: Vec<Resource> = ids
            .iter()
            .map(|id| Resource::new(self.resource_type.clone(), id.clone()))
            .collect();
        self.record(
            ResourceHook::BeforeUpdateRelationship,
            &resources,
            relationship_names(relationships),
            pipeline,
        )?;
        Ok(ids.into_iter().filter(|id| !self.rejected.contains(id)).collect())
    }

    fn before_implicit_update_relationship(
        &self,
        relationships: &RelationshipsDictionary,
        pipeline: ResourcePipeline,
    ) -> Result<()> {
        self.record(
            ResourceHook::BeforeImplicitUpdateRelationship,
            relationships.resources(),
            relationship_names(relationships),
            pipeline,
        )
    }

    fn on_return(&self, resources: ResourceHashSet, pipeline: ResourcePipeline) -> Result<Vec<Resource>> {
        self.record(ResourceHook::OnReturn, resources.iter(), Vec::new(), pipeline)?;
        let mut returned = self.allowed(resources.into_vec());
        returned.extend(self.extra_on_return.clone());
        Ok(returned)
    }

    fn after_create(&self, resources: &ResourceHashSet, pipeline: ResourcePipeline) -> Result<()> {
        self.record(ResourceHook::AfterCreate, resources.iter(), Vec::new(), pipeline)
    }

    fn after_read(&self, resources: &ResourceHashSet, pipeline: ResourcePipeline, _is_included: bool) -> Result<()> {
        self.record(ResourceHook::AfterRead, resources.iter(), Vec::new(), pipeline)
    }

    fn after_update(&self, resources: &ResourceHashSet, pipeline: ResourcePipeline) -> Result<()> {
        self.record(ResourceHook::AfterUpdate, resources.iter(), Vec::new(), pipeline)
    }

    fn after_delete(&self, resources: &ResourceHashSet, pipeline: ResourcePipeline, _succeeded: bool) -> Result<()> {
        self.record(ResourceHook::AfterDelete, resources.iter(), Vec::new(), pipeline)
    }

    fn after_update_relationship(
        &self,
        relationships: &RelationshipsDictionary,
        pipeline: ResourcePipeline,
    ) -> Result<()> {
        self.record(
            ResourceHook::AfterUpdateRelationship,
            relationships.resources(),
            relationship_names(relationships),
            pipeline,
        )
    }
}

// ---------------------------------------------------------------------------
// Fixture
// ---------------------------------------------------------------------------

/// A seeded store plus hook definitions sharing one call log
pub struct Fixture {
    pub store: InMemoryStore,
    pub hooks: Arc<HookContainerRegistry>,
    pub log: HookLog,
}

/// Route `tracing` output to the test writer; set `RUST_LOG` to see it
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

impl Fixture {
    pub fn new(definitions: impl IntoIterator<Item = RecordingDefinition>) -> Self {
        Self::with_registry(registry(), definitions)
    }

    pub fn with_registry(
        registry: Arc<ResourceRegistry>,
        definitions: impl IntoIterator<Item = RecordingDefinition>,
    ) -> Self {
        init_tracing();
        let log = HookLog::default();
        let mut hooks = HookContainerRegistry::new(registry.clone());
        for mut definition in definitions {
            definition.log = log.clone();
            hooks.register(Arc::new(definition)).unwrap();
        }
        Self {
            store: seeded_store(registry),
            hooks: Arc::new(hooks),
            log,
        }
    }

    /// A service over a fresh unit of work
    pub fn service(&self) -> DefaultResourceService {
        DefaultResourceService::new(self.hooks.clone(), Arc::new(self.store.session()))
    }

    pub fn calls(&self) -> Vec<HookCall> {
        self.log.lock().unwrap().clone()
    }

    /// `(hook, resource type)` of every call, in order
    pub fn sequence(&self) -> Vec<(ResourceHook, String)> {
        self.calls()
            .into_iter()
            .map(|call| (call.hook, call.resource_type))
            .collect()
    }

    /// Calls of one hook on one type
    pub fn calls_of(&self, hook: ResourceHook, resource_type: &str) -> Vec<HookCall> {
        self.calls()
            .into_iter()
            .filter(|call| call.hook == hook && call.resource_type == resource_type)
            .collect()
    }

    pub fn clear(&self) {
        self.log.lock().unwrap().clear();
    }
}

pub fn step(hook: ResourceHook, resource_type: &str) -> (ResourceHook, String) {
    (hook, resource_type.to_string())
}
