//! Remote ontology registry client and its namespace cache.
//!
//! The registry mirrors committed knowledge-class definitions under one
//! namespace per case (`case-<id>`). The cache is an explicit service
//! object with an injected clock and TTL, constructed once at process
//! start — never global state.

use std::cell::RefCell;
use std::time::{Duration, Instant};

use serde::Deserialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Cannot reach ontology registry at {0}")]
    Connection(String),

    #[error("Registry call timed out: {0}")]
    Timeout(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Registry returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("Failed to decode registry payload: {0}")]
    Decode(String),
}

/// Narrow registry interface, mocked in tests.
pub trait Registry {
    /// All registered namespaces.
    fn list_namespaces(&self) -> Result<Vec<String>, RegistryError>;

    /// Remove one namespace and its entries. Returns false when the
    /// namespace did not exist (tolerated, not an error).
    fn delete_namespace(&self, namespace: &str) -> Result<bool, RegistryError>;

    /// Trigger the registry to rebuild its cached view of the
    /// accumulation store.
    fn refresh(&self) -> Result<(), RegistryError>;
}

/// Blocking HTTP client for the registry service.
pub struct RegistryClient {
    base_url: String,
    client: reqwest::blocking::Client,
}

#[derive(Deserialize)]
struct NamespaceListBody {
    namespaces: Vec<String>,
}

impl RegistryClient {
    pub fn new(base_url: &str, timeout: Duration) -> Self {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .expect("Failed to create HTTP client");

        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        }
    }

    fn classify(&self, e: reqwest::Error) -> RegistryError {
        if e.is_timeout() {
            RegistryError::Timeout(e.to_string())
        } else if e.is_connect() {
            RegistryError::Connection(self.base_url.clone())
        } else {
            RegistryError::Transport(e.to_string())
        }
    }
}

impl Registry for RegistryClient {
    fn list_namespaces(&self) -> Result<Vec<String>, RegistryError> {
        let url = format!("{}/namespaces", self.base_url);
        let response = self.client.get(&url).send().map_err(|e| self.classify(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(RegistryError::Http { status: status.as_u16(), body });
        }

        let parsed: NamespaceListBody = response
            .json()
            .map_err(|e| RegistryError::Decode(e.to_string()))?;
        Ok(parsed.namespaces)
    }

    fn delete_namespace(&self, namespace: &str) -> Result<bool, RegistryError> {
        let url = format!("{}/namespaces/{}", self.base_url, namespace);
        let response = self
            .client
            .delete(&url)
            .send()
            .map_err(|e| self.classify(e))?;

        let status = response.status();
        if status.as_u16() == 404 {
            return Ok(false);
        }
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(RegistryError::Http { status: status.as_u16(), body });
        }
        Ok(true)
    }

    fn refresh(&self) -> Result<(), RegistryError> {
        let url = format!("{}/refresh", self.base_url);
        let response = self.client.post(&url).send().map_err(|e| self.classify(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(RegistryError::Http { status: status.as_u16(), body });
        }
        Ok(())
    }
}

// ═══════════════════════════════════════════
// Namespace cache
// ═══════════════════════════════════════════

/// Injectable time source so the cache expiry is testable.
pub trait Clock {
    fn now(&self) -> Instant;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Time-expiring cache of the registry namespace list.
pub struct RegistryCache {
    ttl: Duration,
    clock: Box<dyn Clock>,
    cached: RefCell<Option<(Instant, Vec<String>)>>,
}

impl RegistryCache {
    pub fn new(ttl: Duration, clock: Box<dyn Clock>) -> Self {
        Self { ttl, clock, cached: RefCell::new(None) }
    }

    /// Cached namespace list, refetched from the registry once the TTL
    /// has elapsed.
    pub fn namespaces(&self, registry: &dyn Registry) -> Result<Vec<String>, RegistryError> {
        let now = self.clock.now();

        if let Some((fetched_at, list)) = self.cached.borrow().as_ref() {
            if now.duration_since(*fetched_at) < self.ttl {
                return Ok(list.clone());
            }
        }

        let list = registry.list_namespaces()?;
        *self.cached.borrow_mut() = Some((now, list.clone()));
        Ok(list)
    }

    /// Drop the cached list; the next read refetches.
    pub fn invalidate(&self) {
        *self.cached.borrow_mut() = None;
    }
}

/// In-memory registry double for tests.
pub struct MockRegistry {
    pub namespaces: RefCell<Vec<String>>,
    pub refresh_calls: RefCell<u32>,
    pub list_calls: RefCell<u32>,
}

impl MockRegistry {
    pub fn new(namespaces: Vec<String>) -> Self {
        Self {
            namespaces: RefCell::new(namespaces),
            refresh_calls: RefCell::new(0),
            list_calls: RefCell::new(0),
        }
    }
}

impl Registry for MockRegistry {
    fn list_namespaces(&self) -> Result<Vec<String>, RegistryError> {
        *self.list_calls.borrow_mut() += 1;
        Ok(self.namespaces.borrow().clone())
    }

    fn delete_namespace(&self, namespace: &str) -> Result<bool, RegistryError> {
        let mut list = self.namespaces.borrow_mut();
        let before = list.len();
        list.retain(|n| n != namespace);
        Ok(list.len() < before)
    }

    fn refresh(&self) -> Result<(), RegistryError> {
        *self.refresh_calls.borrow_mut() += 1;
        Ok(())
    }
}
