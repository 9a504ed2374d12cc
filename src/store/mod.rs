//! Store adapter trait and registry.
//!
//! A store is a remote (or remote-ish) location holding whole-config
//! snapshots. This module provides the shared contract plus its backends:
//! - `LocalFileStore` - directory of `<name>.json` files
//! - `S3Store` - objects in an S3-compatible bucket
//! - `SecretManagerStore` - Bitwarden-compatible CLI used as a blob store
//!
//! All backends implement the same optimistic-concurrency push protocol;
//! none of them takes a distributed lock. The version/identity check on push
//! is the sole defense against concurrent writers.

pub mod local_file;
pub mod s3;
pub mod secret_manager;

pub use local_file::LocalFileStore;
pub use s3::S3Store;
pub use secret_manager::SecretManagerStore;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::models::{ConfigPayload, PullOutcome, PushOutcome, RdcConfig};
use crate::{Error, Result};

/// Trait for store backends that hold whole-config snapshots.
///
/// Expected failures (not found, version conflict, GUID mismatch, invalid
/// JSON) are reported through the outcome values. `Err` means the backend
/// itself is unavailable: unreachable, locked, not authenticated, or the
/// driving CLI is missing.
pub trait StoreAdapter {
    /// Check backend reachability and authentication.
    ///
    /// Returns `Ok(false)` when the backend answered but is not usable
    /// (e.g. locked vault); `Err` carries the specific cause.
    fn verify(&self) -> Result<bool>;

    /// Push a config under `name`, enforcing identity and version checks.
    fn push(&self, config: &RdcConfig, name: &str) -> Result<PushOutcome>;

    /// Pull the config stored under `name`.
    fn pull(&self, name: &str) -> Result<PullOutcome>;

    /// List stored config names, sorted.
    fn list(&self) -> Result<Vec<String>>;

    /// Delete the config stored under `name`. Not-found is a reported
    /// failure, so repeated deletes stay scriptable.
    fn delete(&self, name: &str) -> Result<crate::models::MutationResult>;

    /// Get the store type name.
    fn store_type(&self) -> &'static str;
}

/// Decide a push against whatever currently exists remotely.
///
/// This is the shared state machine: the remote record under the target
/// name either does not exist (create), belongs to an unrelated config
/// (GUID mismatch), is at or past the local version (version conflict), or
/// is strictly behind (overwrite). The `>=` comparison is deliberate: the
/// version being pushed is the value the caller already advanced to
/// locally, so a remote at that same value did not produce this edit.
pub(crate) enum PushDecision {
    Create,
    Overwrite,
    Reject(PushOutcome),
}

pub(crate) fn decide_push(local: &RdcConfig, name: &str, remote: Option<&RdcConfig>) -> PushDecision {
    match remote {
        None => PushDecision::Create,
        Some(remote) if remote.id != local.id => PushDecision::Reject(PushOutcome::failed(format!(
            "GUID mismatch: \"{}\" already holds an unrelated config (remote id {}, local id {})",
            name, remote.id, local.id
        ))),
        Some(remote) if remote.version >= local.version => {
            PushDecision::Reject(PushOutcome::failed(format!(
                "Version conflict: remote \"{}\" is at version {} but local is at {}; pull before pushing",
                name, remote.version, local.version
            )))
        }
        Some(_) => PushDecision::Overwrite,
    }
}

/// Parse a remote payload into a config, mapping parse failures to the
/// "invalid JSON" reported error. Corruption must be visible, never
/// defaulted to an empty config.
pub(crate) fn parse_remote_config(name: &str, raw: &str) -> std::result::Result<RdcConfig, PullOutcome> {
    serde_json::from_str(raw)
        .map_err(|_| PullOutcome::failed(format!("Config \"{}\" holds invalid JSON", name)))
}

/// Available store backend types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StoreType {
    /// Directory of `<name>.json` files
    LocalFile,
    /// S3-compatible bucket
    S3,
    /// Bitwarden-compatible secret-manager CLI
    Bitwarden,
}

impl StoreType {
    /// Parse a store type from a string.
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "local-file" | "local" | "file" => Some(Self::LocalFile),
            "s3" => Some(Self::S3),
            "bitwarden" | "bw" => Some(Self::Bitwarden),
            _ => None,
        }
    }

    /// Get the string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LocalFile => "local-file",
            Self::S3 => "s3",
            Self::Bitwarden => "bitwarden",
        }
    }
}

impl std::fmt::Display for StoreType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A registered store and its backend-specific settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreEntry {
    pub name: String,

    #[serde(rename = "type")]
    pub store_type: StoreType,

    /// Local-file: directory holding the snapshots
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_path: Option<String>,

    /// S3: connection settings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub s3: Option<crate::context::S3Settings>,

    /// Bitwarden: restrict items to this folder id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bw_folder_id: Option<String>,
}

/// Top-level shape of `stores.json`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct StoresFile {
    #[serde(default)]
    stores: BTreeMap<String, StoreEntry>,
}

/// CRUD over the `stores.json` registry.
pub struct StoreRegistry {
    path: PathBuf,
}

impl StoreRegistry {
    pub fn open() -> Result<Self> {
        Ok(Self::at(&crate::context::config_dir()?))
    }

    pub fn at(config_dir: &Path) -> Self {
        Self {
            path: config_dir.join("stores.json"),
        }
    }

    fn load(&self) -> Result<StoresFile> {
        if !self.path.exists() {
            return Ok(StoresFile::default());
        }
        let raw = fs::read_to_string(&self.path)?;
        serde_json::from_str(&raw)
            .map_err(|e| Error::Corrupt(self.path.display().to_string(), e.to_string()))
    }

    fn save(&self, file: &StoresFile) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(file)?;
        write_atomic(&self.path, json.as_bytes())
    }

    pub fn list(&self) -> Result<Vec<StoreEntry>> {
        Ok(self.load()?.stores.into_values().collect())
    }

    pub fn get(&self, name: &str) -> Result<Option<StoreEntry>> {
        Ok(self.load()?.stores.get(name).cloned())
    }

    pub fn add(&self, entry: StoreEntry) -> Result<()> {
        let mut file = self.load()?;
        if file.stores.contains_key(&entry.name) {
            return Err(Error::InvalidInput(format!(
                "Store \"{}\" already exists",
                entry.name
            )));
        }
        file.stores.insert(entry.name.clone(), entry);
        self.save(&file)
    }

    pub fn remove(&self, name: &str) -> Result<()> {
        let mut file = self.load()?;
        if file.stores.remove(name).is_none() {
            return Err(Error::InvalidInput(format!("Store \"{}\" not found", name)));
        }
        self.save(&file)
    }
}

/// Construct the adapter for a store entry.
pub fn create_store_adapter(entry: &StoreEntry) -> Result<Box<dyn StoreAdapter>> {
    match entry.store_type {
        StoreType::LocalFile => {
            let path = entry.local_path.as_deref().ok_or_else(|| {
                Error::InvalidInput(format!("Store \"{}\" has no local path", entry.name))
            })?;
            Ok(Box::new(LocalFileStore::new(PathBuf::from(path))))
        }
        StoreType::S3 => {
            let settings = entry.s3.as_ref().ok_or_else(|| {
                Error::InvalidInput(format!("Store \"{}\" has no S3 configuration", entry.name))
            })?;
            Ok(Box::new(S3Store::new(settings.clone())))
        }
        StoreType::Bitwarden => Ok(Box::new(SecretManagerStore::new(
            entry.bw_folder_id.clone(),
        ))),
    }
}

/// Summarize a config for display without exposing secrets.
pub fn describe_config(config: &RdcConfig) -> serde_json::Value {
    let resources = match &config.payload {
        ConfigPayload::Plain { resources } => serde_json::json!({
            "machines": resources.machines.len(),
            "storages": resources.storages.len(),
            "repositories": resources.repositories.len(),
        }),
        ConfigPayload::Encrypted { .. } => serde_json::json!("encrypted"),
    };
    serde_json::json!({
        "id": config.id,
        "version": config.version,
        "encrypted": matches!(config.payload, ConfigPayload::Encrypted { .. }),
        "resources": resources,
    })
}

/// Write a file through a temporary sibling and an atomic rename, so
/// readers never observe a half-written document.
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let dir = path
        .parent()
        .ok_or_else(|| Error::Other(format!("No parent directory for {}", path.display())))?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(contents)?;
    tmp.persist(path)
        .map_err(|e| Error::Io(e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

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
    fn test_decide_push_creates_on_empty_remote() {
        assert!(matches!(
            decide_push(&config("u1", 3), "alpha", None),
            PushDecision::Create
        ));
    }

    #[test]
    fn test_decide_push_rejects_guid_mismatch_regardless_of_version() {
        for remote_version in [1, 3, 10] {
            let remote = config("u2", remote_version);
            match decide_push(&config("u1", 3), "alpha", Some(&remote)) {
                PushDecision::Reject(outcome) => {
                    assert!(outcome.error.unwrap().contains("GUID mismatch"));
                }
                _ => panic!("expected rejection"),
            }
        }
    }

    #[test]
    fn test_decide_push_rejects_stale_local() {
        // remote.version >= local.version means the local copy is stale
        for remote_version in [3, 10] {
            let remote = config("u1", remote_version);
            match decide_push(&config("u1", 3), "alpha", Some(&remote)) {
                PushDecision::Reject(outcome) => {
                    assert!(outcome.error.unwrap().contains("Version conflict"));
                }
                _ => panic!("expected rejection"),
            }
        }
    }

    #[test]
    fn test_decide_push_overwrites_older_remote() {
        let remote = config("u1", 2);
        assert!(matches!(
            decide_push(&config("u1", 3), "alpha", Some(&remote)),
            PushDecision::Overwrite
        ));
    }

    #[test]
    fn test_parse_remote_config_flags_invalid_json() {
        let outcome = parse_remote_config("broken", "not json").unwrap_err();
        assert!(!outcome.success);
        assert!(outcome.error.unwrap().contains("invalid JSON"));
    }

    #[test]
    fn test_store_type_parsing() {
        assert_eq!(StoreType::from_str("s3"), Some(StoreType::S3));
        assert_eq!(StoreType::from_str("local-file"), Some(StoreType::LocalFile));
        assert_eq!(StoreType::from_str("BW"), Some(StoreType::Bitwarden));
        assert_eq!(StoreType::from_str("git"), None);
    }

    #[test]
    fn test_registry_round_trip() {
        let dir = tempfile::TempDir::new().unwrap();
        let reg = StoreRegistry::at(dir.path());

        reg.add(StoreEntry {
            name: "backup".into(),
            store_type: StoreType::LocalFile,
            local_path: Some("/tmp/rdc-backup".into()),
            s3: None,
            bw_folder_id: None,
        })
        .unwrap();

        let entry = reg.get("backup").unwrap().unwrap();
        assert_eq!(entry.store_type, StoreType::LocalFile);
        assert!(reg.add(entry).is_err(), "duplicate add must fail");

        reg.remove("backup").unwrap();
        assert!(reg.get("backup").unwrap().is_none());
        assert!(reg.remove("backup").is_err());
    }
}
