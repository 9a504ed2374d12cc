//! Local-directory store backend.
//!
//! One JSON file per config name under a configured directory. The same
//! push protocol applies as for the remote backends: even on a local disk,
//! two processes can race, and the version/identity check is what keeps one
//! of them from silently clobbering the other.

use std::fs;
use std::path::PathBuf;

use super::{PushDecision, StoreAdapter, decide_push, parse_remote_config, write_atomic};
use crate::models::{MutationResult, PullOutcome, PushOutcome, RdcConfig};
use crate::{Error, Result};

pub struct LocalFileStore {
    dir: PathBuf,
}

impl LocalFileStore {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    fn file_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}.json", name))
    }

    fn read_existing(&self, name: &str) -> Result<Option<String>> {
        let path = self.file_path(name);
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(fs::read_to_string(path)?))
    }
}

impl StoreAdapter for LocalFileStore {
    fn verify(&self) -> Result<bool> {
        // The directory must exist or be creatable; anything else means the
        // configured path is unusable.
        if self.dir.is_dir() {
            return Ok(true);
        }
        fs::create_dir_all(&self.dir)
            .map_err(|e| Error::Other(format!("Store path {} is unusable: {}", self.dir.display(), e)))?;
        Ok(true)
    }

    fn push(&self, config: &RdcConfig, name: &str) -> Result<PushOutcome> {
        self.verify()?;

        let remote = match self.read_existing(name)? {
            Some(raw) => match parse_remote_config(name, &raw) {
                Ok(config) => Some(config),
                // An unparseable remote snapshot must not be silently
                // overwritten; surface it as a push failure.
                Err(pull) => return Ok(PushOutcome::failed(pull.error.unwrap_or_default())),
            },
            None => None,
        };

        match decide_push(config, name, remote.as_ref()) {
            PushDecision::Reject(outcome) => Ok(outcome),
            PushDecision::Create | PushDecision::Overwrite => {
                let json = serde_json::to_string_pretty(config)?;
                write_atomic(&self.file_path(name), json.as_bytes())?;
                Ok(PushOutcome::ok(config.version))
            }
        }
    }

    fn pull(&self, name: &str) -> Result<PullOutcome> {
        match self.read_existing(name)? {
            None => Ok(PullOutcome::failed(format!("Config \"{}\" not found", name))),
            Some(raw) => match parse_remote_config(name, &raw) {
                Ok(config) => Ok(PullOutcome::ok(config)),
                Err(outcome) => Ok(outcome),
            },
        }
    }

    fn list(&self) -> Result<Vec<String>> {
        if !self.dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let file_name = entry.file_name();
            let file_name = file_name.to_string_lossy();
            if let Some(name) = file_name.strip_suffix(".json") {
                names.push(name.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    fn delete(&self, name: &str) -> Result<MutationResult> {
        let path = self.file_path(name);
        if !path.exists() {
            return Ok(MutationResult::failed(format!(
                "Config \"{}\" not found",
                name
            )));
        }
        fs::remove_file(path)?;
        Ok(MutationResult::ok())
    }

    fn store_type(&self) -> &'static str {
        "local-file"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ConfigPayload;
    use tempfile::TempDir;

    fn store() -> (TempDir, LocalFileStore) {
        let dir = TempDir::new().unwrap();
        let store = LocalFileStore::new(dir.path().join("snapshots"));
        (dir, store)
    }

    fn config(id: &str, version: u64) -> RdcConfig {
        RdcConfig {
            id: id.to_string(),
            version,
            secrets_ref: None,
            payload: ConfigPayload::Plain {
                resources: Default::default(),
            },
        }
    }

    #[test]
    fn test_push_to_empty_store_succeeds() {
        let (_dir, store) = store();
        let outcome = store.push(&config("u1", 3), "alpha").unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.remote_version, Some(3));
    }

    #[test]
    fn test_pull_round_trip() {
        let (_dir, store) = store();
        store.push(&config("u1", 3), "alpha").unwrap();

        let outcome = store.pull("alpha").unwrap();
        assert!(outcome.success);
        let pulled = outcome.config.unwrap();
        assert_eq!(pulled.id, "u1");
        assert_eq!(pulled.version, 3);
    }

    #[test]
    fn test_push_guid_mismatch() {
        let (_dir, store) = store();
        store.push(&config("u2", 1), "alpha").unwrap();

        let outcome = store.push(&config("u1", 3), "alpha").unwrap();
        assert!(!outcome.success);
        assert!(outcome.error.unwrap().contains("GUID mismatch"));
    }

    #[test]
    fn test_push_version_conflict() {
        let (_dir, store) = store();
        store.push(&config("u1", 10), "alpha").unwrap();

        let outcome = store.push(&config("u1", 3), "alpha").unwrap();
        assert!(!outcome.success);
        assert!(outcome.error.unwrap().contains("Version conflict"));
    }

    #[test]
    fn test_push_overwrites_older_remote() {
        let (_dir, store) = store();
        store.push(&config("u1", 2), "alpha").unwrap();

        let outcome = store.push(&config("u1", 5), "alpha").unwrap();
        assert!(outcome.success);
        assert_eq!(store.pull("alpha").unwrap().config.unwrap().version, 5);
    }

    #[test]
    fn test_pull_missing_reports_not_found() {
        let (_dir, store) = store();
        let outcome = store.pull("missing").unwrap();
        assert!(!outcome.success);
        assert!(outcome.error.unwrap().contains("not found"));
    }

    #[test]
    fn test_pull_invalid_json_is_reported() {
        let (_dir, store) = store();
        store.verify().unwrap();
        fs::write(store.file_path("broken"), "not json").unwrap();

        let outcome = store.pull("broken").unwrap();
        assert!(!outcome.success);
        assert!(outcome.error.unwrap().contains("invalid JSON"));
    }

    #[test]
    fn test_list_is_sorted() {
        let (_dir, store) = store();
        store.push(&config("u1", 1), "staging").unwrap();
        store.push(&config("u2", 1), "production").unwrap();
        store.push(&config("u3", 1), "rediacc").unwrap();

        assert_eq!(store.list().unwrap(), ["production", "rediacc", "staging"]);
    }

    #[test]
    fn test_delete_missing_reports_failure() {
        let (_dir, store) = store();
        let result = store.delete("nope").unwrap();
        assert!(!result.success);
        assert!(result.message.unwrap().contains("not found"));
    }

    #[test]
    fn test_delete_then_pull_not_found() {
        let (_dir, store) = store();
        store.push(&config("u1", 1), "alpha").unwrap();
        assert!(store.delete("alpha").unwrap().success);
        assert!(!store.pull("alpha").unwrap().success);
    }
}
