//! Shared accumulation store and remote ontology registry.
//!
//! The accumulation store is an append-only Turtle definition file plus
//! mirrored entries in a remote registry. The remote commit stage is the
//! only writer of the definition file; this module reads counts, resets
//! the file to its skeleton on cleanup, and talks to the registry.

pub mod registry;
pub mod store;

pub use registry::{Clock, MockRegistry, Registry, RegistryCache, RegistryClient, RegistryError, SystemClock};
pub use store::{AccumulationStore, OntologyError};
