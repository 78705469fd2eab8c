//! Orchestration and verification for LLM-driven extraction of structured
//! ontologies from engineering-ethics case texts.
//!
//! The heavy lifting (prompting, parsing, committing to the shared
//! accumulation store) lives in remote services; this crate sequences
//! them, keeps the relational bookkeeping, audits the results, and
//! exposes the whole thing as a CLI.

pub mod audit;
pub mod cli;
pub mod config;
pub mod db;
pub mod models;
pub mod ontology;
pub mod pipeline;
pub mod stage;
