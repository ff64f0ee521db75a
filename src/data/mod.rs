//! Unit of work: the persistence session contract, the relationship-tracking
//! repository and the default resource service

pub mod repository;
pub mod service;
pub mod session;

pub use repository::{ResourceRepository, TrackedRelationship};
pub use service::DefaultResourceService;
pub use session::{CancellationSignal, CancellationSource, EntryState, PersistenceSession, Transaction};
