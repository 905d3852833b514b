//! Storage backends for deepfin.
//!
//! The durable backends are external collaborators; this crate ships
//! in-memory implementations of the `deepfin_core::store` traits for tests
//! and single-process deployments.

pub mod in_memory;

pub use in_memory::{InMemoryStreamRegistry, InMemoryThreadStore};
