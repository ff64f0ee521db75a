//! Storage implementations for different backends

#[cfg(feature = "in-memory")]
pub mod in_memory;

#[cfg(feature = "in-memory")]
pub use in_memory::{InMemorySession, InMemoryStore};
