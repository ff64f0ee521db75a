//! In-memory persistence backend for testing and development
//!
//! [`InMemoryStore`] holds the rows, shared behind an `RwLock`. Each request
//! opens an [`InMemorySession`], a change tracker that behaves like an ORM
//! context:
//!
//! - every tracked entry keeps a snapshot of its values when it was loaded;
//! - on save, relationship changes are computed against that snapshot, and only
//!   for navigations that were loaded. An unloaded to-many navigation counts as
//!   empty, so assigning it appends rather than replaces;
//! - both sides of a relationship with an inverse are kept consistent;
//! - many-to-many relationships are stored as join rows only.

use crate::core::error::{ResourceError, StorageError};
use crate::core::resource::{Relation, Resource, ResourceKey};
use crate::data::session::{CancellationSignal, EntryState, PersistenceSession, Transaction};
use crate::graph::registry::ResourceRegistry;
use crate::graph::relationship::{RelationshipAttribute, ThroughJoin};
use anyhow::Result;
use async_trait::async_trait;
use indexmap::IndexMap;
use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// How a relationship name of a type is stored
enum Navigation<'a> {
    /// Stored on the row, kept in sync with its inverse
    Plain(&'a RelationshipAttribute),
    /// Public side of a many-to-many relationship, derived from join rows
    Through(&'a RelationshipAttribute),
    /// The join rows of a many-to-many relationship
    Join(&'a RelationshipAttribute),
}

fn navigation<'a>(registry: &'a ResourceRegistry, resource_type: &str, name: &str) -> Option<Navigation<'a>> {
    registry.relationships(resource_type).iter().find_map(|attr| {
        if attr.public_name == name {
            Some(if attr.is_through() {
                Navigation::Through(attr)
            } else {
                Navigation::Plain(attr)
            })
        } else if attr.through().is_some_and(|join| join.through_property == name) {
            Some(Navigation::Join(attr))
        } else {
            None
        }
    })
}

fn is_join_type(registry: &ResourceRegistry, resource_type: &str) -> bool {
    registry
        .all_relationships()
        .filter_map(RelationshipAttribute::through)
        .any(|join| join.through_type == resource_type)
}

fn to_one(relation: Option<&Relation>) -> Option<ResourceKey> {
    match relation {
        Some(Relation::ToOne(Some(key))) => Some(key.clone()),
        _ => None,
    }
}

/// Rows of every resource type
#[derive(Debug, Clone, Default)]
struct StoreData {
    tables: IndexMap<String, IndexMap<String, Resource>>,
}

impl StoreData {
    fn row(&self, key: &ResourceKey) -> Option<&Resource> {
        self.tables.get(&key.resource_type)?.get(&key.id)
    }

    fn row_mut(&mut self, key: &ResourceKey) -> Option<&mut Resource> {
        self.tables.get_mut(&key.resource_type)?.get_mut(&key.id)
    }

    fn contains(&self, key: &ResourceKey) -> bool {
        self.row(key).is_some()
    }

    fn insert_row(&mut self, resource: Resource) {
        self.tables
            .entry(resource.resource_type.clone())
            .or_default()
            .insert(resource.id.clone(), resource);
    }

    fn require(&self, key: &ResourceKey, attr: &RelationshipAttribute) -> Result<(), StorageError> {
        if self.contains(key) {
            Ok(())
        } else {
            Err(StorageError::MissingReference {
                resource_type: key.resource_type.clone(),
                id: key.id.clone(),
                relationship: attr.public_name.clone(),
            })
        }
    }

    fn join_rows<'a>(
        &'a self,
        join: &'a ThroughJoin,
        left: &'a ResourceKey,
    ) -> impl Iterator<Item = &'a Resource> + 'a {
        self.tables
            .get(&join.through_type)
            .into_iter()
            .flat_map(|table| table.values())
            .filter(move |row| join.left_of(row).as_ref() == Some(left))
    }

    /// Stored value of a navigation, `None` when the type has no such navigation
    fn read_relation(&self, registry: &ResourceRegistry, key: &ResourceKey, name: &str) -> Option<Relation> {
        let value = match navigation(registry, &key.resource_type, name)? {
            Navigation::Plain(attr) => self
                .row(key)
                .and_then(|row| row.relation(name))
                .cloned()
                .unwrap_or_else(|| attr.empty_value()),
            Navigation::Through(attr) => {
                let join = attr.through()?;
                Relation::ToMany(self.join_rows(join, key).filter_map(|row| join.right_of(row)).collect())
            }
            Navigation::Join(attr) => {
                let join = attr.through()?;
                Relation::ToMany(
                    self.join_rows(join, key)
                        .map(|row| ResourceKey::new(row.resource_type.clone(), row.id.clone()))
                        .collect(),
                )
            }
        };
        Some(value)
    }

    /// A row with only the requested navigations populated
    fn materialize(&self, registry: &ResourceRegistry, key: &ResourceKey, includes: &[String]) -> Option<Resource> {
        let row = self.row(key)?;
        let mut resource = Resource::new(row.resource_type.clone(), row.id.clone());
        resource.attributes = row.attributes.clone();
        for name in includes {
            if let Some(value) = self.read_relation(registry, key, name) {
                resource.set_relation(name.clone(), value);
            }
        }
        Some(resource)
    }

    fn relation_mut(&mut self, key: &ResourceKey, attr: &RelationshipAttribute) -> Option<&mut Relation> {
        let row = self.row_mut(key)?;
        Some(
            row.relationships
                .entry(attr.public_name.clone())
                .or_insert_with(|| attr.empty_value()),
        )
    }

    fn remove_key(&mut self, key: &ResourceKey, attr: &RelationshipAttribute, target: &ResourceKey) {
        if let Some(relation) = self.relation_mut(key, attr) {
            relation.retain(|k| k != target);
        }
    }

    fn link(
        &mut self,
        registry: &ResourceRegistry,
        attr: &RelationshipAttribute,
        left: &ResourceKey,
        right: &ResourceKey,
    ) -> Result<(), StorageError> {
        self.require(left, attr)?;
        self.require(right, attr)?;

        if attr.is_to_many() {
            if let Some(Relation::ToMany(keys)) = self.relation_mut(left, attr) {
                if !keys.contains(right) {
                    keys.push(right.clone());
                }
            }
        } else {
            let previous = to_one(self.row(left).and_then(|row| row.relation(&attr.public_name)));
            if previous.as_ref() == Some(right) {
                return Ok(());
            }
            if let Some(previous) = previous {
                self.unlink(registry, attr, left, &previous);
            }
            if let Some(relation) = self.relation_mut(left, attr) {
                *relation = Relation::ToOne(Some(right.clone()));
            }
        }

        let Some(inverse) = registry.inverse(attr) else {
            return Ok(());
        };
        if inverse.is_to_many() {
            if let Some(Relation::ToMany(keys)) = self.relation_mut(right, inverse) {
                if !keys.contains(left) {
                    keys.push(left.clone());
                }
            }
        } else {
            let holder = to_one(self.row(right).and_then(|row| row.relation(&inverse.public_name)));
            if holder.as_ref() != Some(left) {
                // the right side moves away from its previous principal
                if let Some(holder) = holder {
                    self.remove_key(&holder, attr, right);
                }
                if let Some(relation) = self.relation_mut(right, inverse) {
                    *relation = Relation::ToOne(Some(left.clone()));
                }
            }
        }
        Ok(())
    }

    fn unlink(
        &mut self,
        registry: &ResourceRegistry,
        attr: &RelationshipAttribute,
        left: &ResourceKey,
        right: &ResourceKey,
    ) {
        self.remove_key(left, attr, right);
        if let Some(inverse) = registry.inverse(attr) {
            self.remove_key(right, inverse, left);
        }
    }

    fn link_through(
        &mut self,
        attr: &RelationshipAttribute,
        join: &ThroughJoin,
        left: &ResourceKey,
        right: &ResourceKey,
    ) -> Result<(), StorageError> {
        self.require(left, attr)?;
        self.require(right, attr)?;
        let key = join.join_key(left, right);
        if !self.contains(&key) {
            self.insert_row(join.join_resource(left, right));
        }
        Ok(())
    }

    fn remove_join_row(&mut self, key: &ResourceKey) {
        if let Some(table) = self.tables.get_mut(&key.resource_type) {
            table.shift_remove(&key.id);
        }
    }

    /// Remove a row, its join rows and every reference to it
    fn remove_row(&mut self, registry: &ResourceRegistry, key: &ResourceKey) -> bool {
        let removed = self
            .tables
            .get_mut(&key.resource_type)
            .and_then(|table| table.shift_remove(&key.id))
            .is_some();
        if !removed {
            return false;
        }

        let join_types: Vec<String> = registry
            .all_relationships()
            .filter_map(RelationshipAttribute::through)
            .map(|join| join.through_type.clone())
            .collect();
        for join_type in join_types {
            if let Some(table) = self.tables.get_mut(&join_type) {
                table.retain(|_, row| !row.relationships.values().any(|rel| rel.contains(key)));
            }
        }

        for row in self.tables.values_mut().flat_map(|table| table.values_mut()) {
            for relation in row.relationships.values_mut() {
                relation.retain(|k| k != key);
            }
        }
        true
    }
}

/// Shared in-memory storage
#[derive(Debug, Clone)]
pub struct InMemoryStore {
    registry: Arc<ResourceRegistry>,
    data: Arc<RwLock<StoreData>>,
}

impl InMemoryStore {
    pub fn new(registry: Arc<ResourceRegistry>) -> Self {
        Self {
            registry,
            data: Arc::new(RwLock::new(StoreData::default())),
        }
    }

    pub fn registry(&self) -> &Arc<ResourceRegistry> {
        &self.registry
    }

    /// Open a unit of work
    pub fn session(&self) -> InMemorySession {
        InMemorySession::new(self.clone())
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, StoreData>, StorageError> {
        self.data.read().map_err(|e| StorageError::LockPoisoned {
            message: e.to_string(),
        })
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, StoreData>, StorageError> {
        self.data.write().map_err(|e| StorageError::LockPoisoned {
            message: e.to_string(),
        })
    }

    /// Write rows directly, bypassing change tracking.
    ///
    /// Relationship values on the given resources are linked with the same
    /// consistency rules a save applies.
    pub fn seed(&self, resources: impl IntoIterator<Item = Resource>) -> Result<()> {
        let resources: Vec<Resource> = resources.into_iter().collect();
        let mut data = self.write()?;

        for resource in &resources {
            let mut row = Resource::new(resource.resource_type.clone(), resource.id.clone());
            row.attributes = resource.attributes.clone();
            data.insert_row(row);
        }

        for resource in &resources {
            let left = ResourceKey::new(resource.resource_type.clone(), resource.id.clone());
            for (name, value) in &resource.relationships {
                match navigation(&self.registry, &resource.resource_type, name) {
                    Some(Navigation::Plain(attr)) => {
                        for right in value.keys() {
                            data.link(&self.registry, attr, &left, &right)?;
                        }
                    }
                    Some(Navigation::Through(attr)) => {
                        if let Some(join) = attr.through() {
                            for right in value.keys() {
                                data.link_through(attr, join, &left, &right)?;
                            }
                        }
                    }
                    _ => {}
                }
            }
        }
        Ok(())
    }

    /// A stored resource with every declared relationship populated
    pub fn get(&self, key: &ResourceKey) -> Result<Option<Resource>> {
        let data = self.read()?;
        let names: Vec<String> = self
            .registry
            .relationships(&key.resource_type)
            .iter()
            .map(|attr| attr.public_name.clone())
            .collect();
        Ok(data.materialize(&self.registry, key, &names))
    }

    /// Stored value of one relationship
    pub fn relation(&self, key: &ResourceKey, name: &str) -> Result<Option<Relation>> {
        let data = self.read()?;
        if !data.contains(key) {
            return Ok(None);
        }
        Ok(data.read_relation(&self.registry, key, name))
    }

    /// Ids of the stored rows of a type, in insertion order
    pub fn ids(&self, resource_type: &str) -> Result<Vec<String>> {
        let data = self.read()?;
        Ok(data
            .tables
            .get(resource_type)
            .map(|table| table.keys().cloned().collect())
            .unwrap_or_default())
    }
}

#[derive(Debug)]
struct Entry {
    current: Resource,
    original: Resource,
    state: EntryState,
}

impl Entry {
    fn new(resource: Resource, state: EntryState) -> Self {
        let original = if state == EntryState::Added {
            Resource::new(resource.resource_type.clone(), resource.id.clone())
        } else {
            resource.clone()
        };
        Self {
            current: resource,
            original,
            state,
        }
    }
}

#[derive(Debug, Default)]
struct SessionState {
    entries: IndexMap<ResourceKey, Entry>,
    snapshot: Option<StoreData>,
}

/// Change tracker over an [`InMemoryStore`]
#[derive(Debug, Clone)]
pub struct InMemorySession {
    store: InMemoryStore,
    state: Arc<Mutex<SessionState>>,
}

impl InMemorySession {
    pub fn new(store: InMemoryStore) -> Self {
        Self {
            store,
            state: Arc::new(Mutex::new(SessionState::default())),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, SessionState>, StorageError> {
        lock_state(&self.state)
    }

    /// Number of tracked entries
    pub fn tracked_count(&self) -> usize {
        self.lock().map(|state| state.entries.len()).unwrap_or_default()
    }
}

fn lock_state(state: &Mutex<SessionState>) -> Result<MutexGuard<'_, SessionState>, StorageError> {
    state.lock().map_err(|e| StorageError::LockPoisoned {
        message: e.to_string(),
    })
}

fn not_tracked(key: &ResourceKey) -> StorageError {
    StorageError::NotTracked {
        resource_type: key.resource_type.clone(),
        id: key.id.clone(),
    }
}

fn apply_relation(
    data: &mut StoreData,
    registry: &ResourceRegistry,
    attr: &RelationshipAttribute,
    left: &ResourceKey,
    value: &Relation,
    original: Option<&Relation>,
) -> Result<(), StorageError> {
    match value {
        Relation::ToOne(Some(right)) => data.link(registry, attr, left, right),
        Relation::ToOne(None) => {
            if let Some(right) = to_one(data.read_relation(registry, left, &attr.public_name).as_ref()) {
                data.unlink(registry, attr, left, &right);
            }
            Ok(())
        }
        Relation::ToMany(desired) => {
            let original = original.map(Relation::keys).unwrap_or_default();
            for removed in original.iter().filter(|k| !desired.contains(k)) {
                data.unlink(registry, attr, left, removed);
            }
            for added in desired.iter().filter(|k| !original.contains(k)) {
                data.link(registry, attr, left, added)?;
            }
            Ok(())
        }
    }
}

fn apply_changes(
    data: &mut StoreData,
    registry: &ResourceRegistry,
    entries: &IndexMap<ResourceKey, Entry>,
) -> Result<usize> {
    let mut written = 0;

    for (key, entry) in entries.iter().filter(|(_, e)| e.state == EntryState::Added) {
        if data.contains(key) {
            if is_join_type(registry, &key.resource_type) {
                continue;
            }
            return Err(ResourceError::AlreadyExists {
                resource_type: key.resource_type.clone(),
                id: key.id.clone(),
            }
            .into());
        }
        let mut row = Resource::new(key.resource_type.clone(), key.id.clone());
        row.attributes = entry.current.attributes.clone();
        data.insert_row(row);
        written += 1;
    }

    let live = |e: &&Entry| {
        matches!(
            e.state,
            EntryState::Added | EntryState::Unchanged | EntryState::Modified
        )
    };

    for (key, entry) in entries.iter().filter(|(_, e)| e.state != EntryState::Added && live(e)) {
        let changed: Vec<_> = entry
            .current
            .attributes
            .iter()
            .filter(|(name, value)| entry.original.attributes.get(*name) != Some(*value))
            .collect();
        if changed.is_empty() {
            continue;
        }
        let row = data.row_mut(key).ok_or_else(|| ResourceError::NotFound {
            resource_type: key.resource_type.clone(),
            id: key.id.clone(),
        })?;
        for (name, value) in changed {
            row.attributes.insert(name.clone(), value.clone());
        }
        written += 1;
    }

    for (key, entry) in entries.iter().filter(|(_, e)| live(e)) {
        for (name, value) in &entry.current.relationships {
            let original = entry.original.relation(name);
            if original == Some(value) {
                continue;
            }
            match navigation(registry, &key.resource_type, name) {
                Some(Navigation::Plain(attr)) => {
                    apply_relation(data, registry, attr, key, value, original)?;
                }
                Some(Navigation::Join(_)) => {
                    // rows dropped from a loaded join collection are deleted
                    let desired = value.keys();
                    for removed in original.map(Relation::keys).unwrap_or_default() {
                        if !desired.contains(&removed) {
                            data.remove_join_row(&removed);
                        }
                    }
                }
                Some(Navigation::Through(_)) | None => {}
            }
        }
    }

    for (key, _) in entries.iter().filter(|(_, e)| e.state == EntryState::Deleted) {
        if !data.remove_row(registry, key) {
            return Err(ResourceError::NotFound {
                resource_type: key.resource_type.clone(),
                id: key.id.clone(),
            }
            .into());
        }
        written += 1;
    }

    Ok(written)
}

#[async_trait]
impl PersistenceSession for InMemorySession {
    fn registry(&self) -> &ResourceRegistry {
        &self.store.registry
    }

    async fn find(&self, key: &ResourceKey, includes: &[String]) -> Result<Option<Resource>> {
        let mut found = self
            .find_many(&key.resource_type, std::slice::from_ref(&key.id), includes)
            .await?;
        Ok(found.pop())
    }

    async fn find_many(
        &self,
        resource_type: &str,
        ids: &[String],
        includes: &[String],
    ) -> Result<Vec<Resource>> {
        let registry = &self.store.registry;
        let mut state = self.lock()?;
        let data = self.store.read()?;
        let mut found = Vec::with_capacity(ids.len());

        for id in ids {
            let key = ResourceKey::new(resource_type, id.clone());
            if let Some(entry) = state.entries.get_mut(&key) {
                if entry.state == EntryState::Deleted {
                    continue;
                }
                // identity-only entries attached as relationship targets
                if entry.state == EntryState::Unchanged && entry.current.attributes.is_empty() {
                    if let Some(row) = data.row(&key) {
                        entry.current.attributes = row.attributes.clone();
                        entry.original.attributes = row.attributes.clone();
                    }
                }
                for name in includes {
                    if entry.current.relation(name).is_some() {
                        continue;
                    }
                    let Some(value) = data.read_relation(registry, &key, name) else {
                        continue;
                    };
                    if entry.original.relation(name).is_none() {
                        entry.original.set_relation(name.clone(), value.clone());
                    }
                    entry.current.set_relation(name.clone(), value);
                }
                found.push(entry.current.clone());
            } else if let Some(resource) = data.materialize(registry, &key, includes) {
                state
                    .entries
                    .insert(key, Entry::new(resource.clone(), EntryState::Unchanged));
                found.push(resource);
            }
        }

        Ok(found)
    }

    async fn find_all(&self, resource_type: &str, includes: &[String]) -> Result<Vec<Resource>> {
        let ids = self.store.ids(resource_type)?;
        self.find_many(resource_type, &ids, includes).await
    }

    async fn count(&self, resource_type: &str) -> Result<usize> {
        let data = self.store.read()?;
        Ok(data.tables.get(resource_type).map(IndexMap::len).unwrap_or(0))
    }

    fn tracked(&self, key: &ResourceKey) -> Option<Resource> {
        self.lock()
            .ok()
            .and_then(|state| state.entries.get(key).map(|entry| entry.current.clone()))
    }

    fn entry_state(&self, key: &ResourceKey) -> EntryState {
        self.lock()
            .ok()
            .and_then(|state| state.entries.get(key).map(|entry| entry.state))
            .unwrap_or(EntryState::Detached)
    }

    fn attach(&self, resource: Resource, state: EntryState) -> Result<()> {
        let key = ResourceKey::new(resource.resource_type.clone(), resource.id.clone());
        let mut session = self.lock()?;
        if session.entries.contains_key(&key) {
            return Err(StorageError::IdentityConflict {
                resource_type: key.resource_type,
                id: key.id,
            }
            .into());
        }
        if state != EntryState::Detached {
            session.entries.insert(key, Entry::new(resource, state));
        }
        Ok(())
    }

    fn add(&self, resource: Resource) -> Result<()> {
        self.attach(resource, EntryState::Added)
    }

    fn update(&self, resource: Resource) -> Result<()> {
        let key = ResourceKey::new(resource.resource_type.clone(), resource.id.clone());
        let mut session = self.lock()?;
        let entry = session.entries.get_mut(&key).ok_or_else(|| not_tracked(&key))?;
        entry.current = resource;
        if entry.state == EntryState::Unchanged {
            entry.state = EntryState::Modified;
        }
        Ok(())
    }

    fn remove(&self, key: &ResourceKey) -> Result<()> {
        let mut session = self.lock()?;
        let entry = session.entries.get_mut(key).ok_or_else(|| not_tracked(key))?;
        if entry.state == EntryState::Added {
            session.entries.shift_remove(key);
        } else {
            entry.state = EntryState::Deleted;
        }
        Ok(())
    }

    fn set_state(&self, key: &ResourceKey, state: EntryState) -> Result<()> {
        let mut session = self.lock()?;
        if state == EntryState::Detached {
            session.entries.shift_remove(key);
            return Ok(());
        }
        let entry = session.entries.get_mut(key).ok_or_else(|| not_tracked(key))?;
        entry.state = state;
        Ok(())
    }

    async fn load_navigation(&self, key: &ResourceKey, relationship: &str) -> Result<Relation> {
        let registry = &self.store.registry;
        let mut state = self.lock()?;
        let data = self.store.read()?;
        let entry = state.entries.get_mut(key).ok_or_else(|| not_tracked(key))?;

        let stored = if entry.state == EntryState::Added {
            None
        } else {
            data.read_relation(registry, key, relationship)
        };
        let stored = match stored {
            Some(value) => value,
            None => match navigation(registry, &key.resource_type, relationship) {
                Some(Navigation::Plain(attr)) | Some(Navigation::Through(attr)) => attr.empty_value(),
                Some(Navigation::Join(_)) => Relation::ToMany(Vec::new()),
                None => {
                    return Err(StorageError::MissingReference {
                        resource_type: key.resource_type.clone(),
                        id: key.id.clone(),
                        relationship: relationship.to_string(),
                    }
                    .into());
                }
            },
        };

        if entry.original.relation(relationship).is_none() {
            entry.original.set_relation(relationship.to_string(), stored.clone());
        }
        if entry.current.relation(relationship).is_none() {
            entry.current.set_relation(relationship.to_string(), stored);
        }
        Ok(entry
            .current
            .relation(relationship)
            .cloned()
            .unwrap_or_else(|| Relation::ToMany(Vec::new())))
    }

    async fn save_changes(&self, cancel: &CancellationSignal) -> Result<usize> {
        if let Err(err) = cancel.check() {
            tracing::warn!("save cancelled, tracked changes were not written");
            return Err(err.into());
        }

        let registry = &self.store.registry;
        let mut state = self.lock()?;
        let mut data = self.store.write()?;

        let mut working = data.clone();
        let written = apply_changes(&mut working, registry, &state.entries)?;
        *data = working;

        state
            .entries
            .retain(|_, entry| !matches!(entry.state, EntryState::Deleted | EntryState::Detached));
        for (key, entry) in state.entries.iter_mut() {
            let loaded: Vec<String> = entry.current.relationships.keys().cloned().collect();
            for name in loaded {
                if let Some(value) = data.read_relation(registry, key, &name) {
                    entry.current.set_relation(name, value);
                }
            }
            entry.state = EntryState::Unchanged;
            entry.original = entry.current.clone();
        }

        tracing::debug!(written, "changes saved");
        Ok(written)
    }

    async fn current_or_begin_transaction(&self) -> Result<Box<dyn Transaction>> {
        let mut state = self.lock()?;
        if state.snapshot.is_some() {
            return Ok(Box::new(InMemoryTransaction {
                store: self.store.clone(),
                state: self.state.clone(),
                owner: false,
            }));
        }

        let snapshot = self.store.read()?.clone();
        state.snapshot = Some(snapshot);
        tracing::debug!("transaction started");
        Ok(Box::new(InMemoryTransaction {
            store: self.store.clone(),
            state: self.state.clone(),
            owner: true,
        }))
    }
}

/// Snapshot transaction of an [`InMemorySession`]
struct InMemoryTransaction {
    store: InMemoryStore,
    state: Arc<Mutex<SessionState>>,
    owner: bool,
}

#[async_trait]
impl Transaction for InMemoryTransaction {
    fn is_owner(&self) -> bool {
        self.owner
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        if !self.owner {
            return Ok(());
        }
        lock_state(&self.state)?.snapshot = None;
        tracing::info!("transaction committed");
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        if !self.owner {
            return Ok(());
        }
        let mut state = lock_state(&self.state)?;
        if let Some(snapshot) = state.snapshot.take() {
            *self.store.write()? = snapshot;
        }
        // tracked values may reflect rolled back writes
        state.entries.clear();
        tracing::warn!("transaction rolled back");
        Ok(())
    }
}
