//! The on-disk half of the shared accumulation store.

use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum OntologyError {
    #[error("Ontology I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Main definition file holding all knowledge-class definitions discovered
/// across cases.
const DEFINITION_FILE: &str = "ethics-derived.ttl";

/// Empty skeleton the definition file is reset to on cleanup: prefixes
/// only, no class definitions.
const SKELETON: &str = "\
@prefix owl: <http://www.w3.org/2002/07/owl#> .
@prefix rdfs: <http://www.w3.org/2000/01/rdf-schema#> .
@prefix eth: <http://ethicore.local/derived#> .

eth: a owl:Ontology ;
    rdfs:comment \"Knowledge classes discovered across processed cases.\" .
";

/// Directory of Turtle files: the append-only definition file plus one
/// derivative file per committed case (`case-<id>.ttl`).
pub struct AccumulationStore {
    dir: PathBuf,
}

impl AccumulationStore {
    pub fn new(dir: &Path) -> Self {
        Self { dir: dir.to_path_buf() }
    }

    pub fn definition_file(&self) -> PathBuf {
        self.dir.join(DEFINITION_FILE)
    }

    fn io_err(&self, path: &Path, source: std::io::Error) -> OntologyError {
        OntologyError::Io { path: path.to_path_buf(), source }
    }

    /// Count knowledge-class definitions in the main definition file.
    ///
    /// A missing file counts as zero: a fresh environment has accumulated
    /// nothing yet.
    pub fn definition_count(&self) -> Result<u32, OntologyError> {
        let path = self.definition_file();
        let text = match std::fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(self.io_err(&path, e)),
        };
        Ok(text
            .lines()
            .filter(|line| line.contains("a owl:Class"))
            .count() as u32)
    }

    /// Rewrite the definition file to the empty skeleton.
    pub fn write_skeleton(&self) -> Result<(), OntologyError> {
        std::fs::create_dir_all(&self.dir).map_err(|e| self.io_err(&self.dir, e))?;
        let path = self.definition_file();
        std::fs::write(&path, SKELETON).map_err(|e| self.io_err(&path, e))
    }

    /// Delete every per-case derivative file. Returns how many were removed.
    pub fn remove_case_files(&self) -> Result<u32, OntologyError> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(self.io_err(&self.dir, e)),
        };

        let mut removed = 0;
        for entry in entries {
            let entry = entry.map_err(|e| self.io_err(&self.dir, e))?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name.starts_with("case-") && name.ends_with(".ttl") {
                std::fs::remove_file(entry.path())
                    .map_err(|e| self.io_err(&entry.path(), e))?;
                removed += 1;
            }
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, AccumulationStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = AccumulationStore::new(dir.path());
        (dir, store)
    }

    fn write_definitions(store: &AccumulationStore, classes: &[&str]) {
        let mut text = String::from(SKELETON);
        for class in classes {
            text.push_str(&format!(
                "\neth:{class} a owl:Class ;\n    rdfs:label \"{class}\" .\n"
            ));
        }
        std::fs::write(store.definition_file(), text).unwrap();
    }

    #[test]
    fn missing_file_counts_zero() {
        let (_dir, store) = store();
        assert_eq!(store.definition_count().unwrap(), 0);
    }

    #[test]
    fn skeleton_has_no_definitions() {
        let (_dir, store) = store();
        store.write_skeleton().unwrap();
        assert_eq!(store.definition_count().unwrap(), 0);
    }

    #[test]
    fn counts_class_declarations() {
        let (_dir, store) = store();
        store.write_skeleton().unwrap();
        write_definitions(&store, &["PublicSafetyDuty", "DisclosureObligation"]);
        assert_eq!(store.definition_count().unwrap(), 2);
    }

    #[test]
    fn skeleton_rewrite_is_idempotent() {
        let (_dir, store) = store();
        write_definitions(&store, &["Something"]);
        store.write_skeleton().unwrap();
        let after_once = std::fs::read_to_string(store.definition_file()).unwrap();
        store.write_skeleton().unwrap();
        let after_twice = std::fs::read_to_string(store.definition_file()).unwrap();
        assert_eq!(after_once, after_twice);
        assert_eq!(store.definition_count().unwrap(), 0);
    }

    #[test]
    fn removes_only_case_files() {
        let (dir, store) = store();
        store.write_skeleton().unwrap();
        std::fs::write(dir.path().join("case-24-1.ttl"), "").unwrap();
        std::fs::write(dir.path().join("case-23-7.ttl"), "").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "").unwrap();

        let removed = store.remove_case_files().unwrap();
        assert_eq!(removed, 2);
        assert!(dir.path().join("notes.txt").exists());
        assert!(store.definition_file().exists());
    }
}
