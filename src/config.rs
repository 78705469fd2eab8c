//! Application constants, data-directory layout, and pipeline configuration.
//!
//! All remote endpoints and tunables come from environment variables with
//! conservative defaults, so a local run against a dev extraction service
//! needs no configuration at all.

use std::path::PathBuf;
use std::time::Duration;

use crate::models::InjectionMode;

/// Application-level constants
pub const APP_NAME: &str = "ethicore";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Model identifier recorded on entities produced without an LLM call
/// (exact-match reconciliation merges). Excluded from the V8 audit check.
pub const ALGORITHMIC_MODEL: &str = "algorithmic";

/// Default log filter when RUST_LOG is unset.
pub fn default_log_filter() -> String {
    format!("{}=info", APP_NAME)
}

/// Application data directory: ~/.ethicore/ on all platforms.
pub fn app_data_dir() -> PathBuf {
    let home = dirs::home_dir().expect("Cannot determine home directory");
    home.join(".ethicore")
}

/// Default path of the relational store.
pub fn default_db_path() -> PathBuf {
    app_data_dir().join("ethicore.db")
}

/// Default directory holding the shared accumulation store's Turtle files.
pub fn default_ontology_dir() -> PathBuf {
    app_data_dir().join("ontology")
}

/// Runtime configuration for the orchestrator.
///
/// Built once in `main` and passed down; nothing reads the environment
/// after construction.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Base URL of the remote extraction service (streaming + blocking stages).
    pub extraction_base_url: String,
    /// Base URL of the remote ontology registry.
    pub registry_base_url: String,
    /// Path of the SQLite relational store.
    pub db_path: PathBuf,
    /// Directory of the shared accumulation store (definition file + per-case files).
    pub ontology_dir: PathBuf,
    /// Per-remote-call timeout. A timeout is a transport error, not a retry.
    pub request_timeout: Duration,
    /// TTL for the registry namespace cache.
    pub registry_cache_ttl: Duration,
    /// How much ontology context is supplied to extraction stages.
    /// Passed through to the service, never interpreted here.
    pub injection_mode: InjectionMode,
}

impl PipelineConfig {
    /// Read configuration from the environment, falling back to defaults.
    pub fn from_env() -> Self {
        let extraction_base_url = std::env::var("ETHICORE_EXTRACTION_URL")
            .unwrap_or_else(|_| "http://localhost:8501".to_string());
        let registry_base_url = std::env::var("ETHICORE_REGISTRY_URL")
            .unwrap_or_else(|_| "http://localhost:8502".to_string());
        let db_path = std::env::var("ETHICORE_DB")
            .map(PathBuf::from)
            .unwrap_or_else(|_| default_db_path());
        let ontology_dir = std::env::var("ETHICORE_ONTOLOGY_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| default_ontology_dir());
        let timeout_secs = std::env::var("ETHICORE_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(600);

        Self {
            extraction_base_url,
            registry_base_url,
            db_path,
            ontology_dir,
            request_timeout: Duration::from_secs(timeout_secs),
            registry_cache_ttl: Duration::from_secs(300),
            injection_mode: InjectionMode::Full,
        }
    }
}
