//! Persistence session contract
//!
//! A session is the unit of work of one request: it tracks the resources it
//! loaded or was handed, and writes their changes in a single atomic
//! [`save_changes`](PersistenceSession::save_changes).

use crate::core::error::StorageError;
use crate::core::resource::{Relation, Resource, ResourceKey};
use crate::graph::registry::ResourceRegistry;
use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::watch;

/// Tracking state of a resource within a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryState {
    /// Not tracked
    Detached,
    /// Tracked, assumed to match storage
    Unchanged,
    /// Tracked, inserted on save
    Added,
    /// Tracked, written on save
    Modified,
    /// Tracked, removed on save
    Deleted,
}

/// Cooperative cancellation of a unit of work
#[derive(Debug, Clone)]
pub struct CancellationSignal {
    receiver: watch::Receiver<bool>,
}

/// The cancelling side of a [`CancellationSignal`]
#[derive(Debug)]
pub struct CancellationSource {
    sender: watch::Sender<bool>,
}

impl CancellationSource {
    pub fn cancel(&self) {
        self.sender.send_replace(true);
    }
}

impl CancellationSignal {
    /// A connected source and signal
    pub fn channel() -> (CancellationSource, CancellationSignal) {
        let (sender, receiver) = watch::channel(false);
        (CancellationSource { sender }, CancellationSignal { receiver })
    }

    /// A signal that never fires.
    ///
    /// The sender is dropped at once; the receiver keeps reading the initial
    /// `false` for its whole lifetime.
    pub fn none() -> Self {
        let (_, receiver) = watch::channel(false);
        Self { receiver }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.receiver.borrow()
    }

    /// Fail with [`StorageError::Cancelled`] once cancellation was requested
    pub fn check(&self) -> Result<(), StorageError> {
        if self.is_cancelled() {
            Err(StorageError::Cancelled)
        } else {
            Ok(())
        }
    }
}

impl Default for CancellationSignal {
    fn default() -> Self {
        Self::none()
    }
}

/// Handle on the transaction of a session.
///
/// Handles obtained while a transaction is already open do not own it: their
/// commit and rollback are no-ops and the outermost handle decides.
#[async_trait]
pub trait Transaction: Send {
    /// Whether this handle opened the transaction
    fn is_owner(&self) -> bool;

    async fn commit(self: Box<Self>) -> Result<()>;

    async fn rollback(self: Box<Self>) -> Result<()>;
}

/// Change tracking persistence backend
///
/// Loaded resources carry only the navigations that were asked for; a
/// relationship absent from a loaded resource is "not loaded". Queries resolve
/// identities against tracked entries, so every identity has at most one
/// tracked instance.
#[async_trait]
pub trait PersistenceSession: Send + Sync {
    /// The resource graph the session persists
    fn registry(&self) -> &ResourceRegistry;

    /// Load one resource with the given navigations
    async fn find(&self, key: &ResourceKey, includes: &[String]) -> Result<Option<Resource>>;

    /// Load resources of a type by id with the given navigations
    async fn find_many(
        &self,
        resource_type: &str,
        ids: &[String],
        includes: &[String],
    ) -> Result<Vec<Resource>>;

    /// Load every resource of a type
    async fn find_all(&self, resource_type: &str, includes: &[String]) -> Result<Vec<Resource>>;

    /// Number of stored resources of a type
    async fn count(&self, resource_type: &str) -> Result<usize>;

    /// The tracked instance of an identity
    fn tracked(&self, key: &ResourceKey) -> Option<Resource>;

    fn entry_state(&self, key: &ResourceKey) -> EntryState;

    /// Start tracking a resource in the given state.
    ///
    /// Fails with [`StorageError::IdentityConflict`] when the identity is
    /// already tracked.
    fn attach(&self, resource: Resource, state: EntryState) -> Result<()>;

    /// Track a new resource for insertion
    fn add(&self, resource: Resource) -> Result<()>;

    /// Replace the tracked instance of an identity with `resource`
    fn update(&self, resource: Resource) -> Result<()>;

    /// Mark a tracked resource for removal
    fn remove(&self, key: &ResourceKey) -> Result<()>;

    /// Move a tracked identity to `state`; `Detached` stops tracking it
    fn set_state(&self, key: &ResourceKey, state: EntryState) -> Result<()>;

    /// Stop tracking an identity
    fn detach(&self, key: &ResourceKey) {
        if let Err(err) = self.set_state(key, EntryState::Detached) {
            tracing::warn!(resource = %key, error = %err, "failed to detach resource");
        }
    }

    /// Load the stored value of a navigation into the tracked instance
    async fn load_navigation(&self, key: &ResourceKey, relationship: &str) -> Result<Relation>;

    /// Write every tracked change atomically
    async fn save_changes(&self, cancel: &CancellationSignal) -> Result<usize>;

    /// Join the open transaction, or open one
    async fn current_or_begin_transaction(&self) -> Result<Box<dyn Transaction>>;
}
