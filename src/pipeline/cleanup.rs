//! Cleanup manager: returns the shared accumulation store, the registry,
//! and the run bookkeeping to a known-empty baseline.
//!
//! Step order matters. The on-disk store is wiped before the registry so
//! a crash mid-cleanup leaves the registry pointing at nothing rather
//! than the disk holding entries the registry has already forgotten.

use rusqlite::Connection;
use thiserror::Error;

use crate::db::{self, DatabaseError};
use crate::ontology::{AccumulationStore, OntologyError, Registry, RegistryCache, RegistryError};

#[derive(Error, Debug)]
pub enum CleanupError {
    #[error(transparent)]
    Ontology(#[from] OntologyError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Database(#[from] DatabaseError),
}

/// What a cleanup pass actually removed.
#[derive(Debug, Default)]
pub struct CleanupReport {
    pub case_files_removed: u32,
    pub namespaces_deleted: u32,
    pub entities_unpublished: u32,
    pub run_records_cleared: u32,
}

pub struct CleanupManager<'a> {
    store: &'a AccumulationStore,
    registry: &'a dyn Registry,
    cache: &'a RegistryCache,
}

impl<'a> CleanupManager<'a> {
    pub fn new(
        store: &'a AccumulationStore,
        registry: &'a dyn Registry,
        cache: &'a RegistryCache,
    ) -> Self {
        Self { store, registry, cache }
    }

    /// Run the full cleanup sequence. Idempotent: a second pass over an
    /// already-clean environment removes nothing and still succeeds.
    pub fn run(&self, conn: &Connection) -> Result<CleanupReport, CleanupError> {
        let mut report = CleanupReport::default();

        // 1. Definition file back to the empty skeleton.
        self.store.write_skeleton()?;

        // 2. Per-case derivative files.
        report.case_files_removed = self.store.remove_case_files()?;

        // 3. Registry namespaces, case namespaces only. Other services
        //    may register namespaces of their own here. A cached list may
        //    predate this pass, so drop it and read fresh before deleting.
        self.cache.invalidate();
        for namespace in self.cache.namespaces(self.registry)? {
            if namespace.starts_with("case-") && self.registry.delete_namespace(&namespace)? {
                report.namespaces_deleted += 1;
            }
        }

        // 4. Published flags, so the next run re-derives publish state.
        report.entities_unpublished = db::reset_published_flags(conn)?;

        // 5. Run bookkeeping.
        report.run_records_cleared = db::clear_run_bookkeeping(conn)?;

        // 6. The cached namespace list is now stale; drop it and make the
        //    registry rebuild its own view of the emptied store.
        self.cache.invalidate();
        self.registry.refresh()?;

        tracing::info!(
            case_files = report.case_files_removed,
            namespaces = report.namespaces_deleted,
            unpublished = report.entities_unpublished,
            runs = report.run_records_cleared,
            "Cleanup complete"
        );

        Ok(report)
    }
}
