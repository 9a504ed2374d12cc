//! Local file state backend.
//!
//! All resources of a context live in one JSON document
//! (`state/<context>.json` under the rdc config directory). Every mutation
//! is a read-modify-write of the whole file under a single-writer
//! assumption; there is no cross-process locking, and concurrent external
//! edits are undefined behavior rather than a supported mode.
//!
//! When the context is encrypted, the resource maps are held as one
//! vault-codec ciphertext (`ConfigPayload::Encrypted`); the file keeps a
//! readable `id`/`version` envelope either way so store adapters can apply
//! the push protocol without a password.

use std::fs;
use std::path::{Path, PathBuf};

use super::{StateProvider, not_found_message, vault_conflict_message};
use crate::models::{
    ConfigPayload, Fields, MutationResult, QueueItem, RdcConfig, ResourceKind, ResourceSet,
    VaultRecord,
};
use crate::store::write_atomic;
use crate::{Error, Result, vault};

/// Field carrying a resource's vault payload inside its record.
const VAULT_CONTENT_FIELD: &str = "vaultContent";

/// Field carrying a resource's vault version inside its record.
const VAULT_VERSION_FIELD: &str = "vaultVersion";

pub struct LocalState {
    path: PathBuf,
    master_password: Option<String>,
    config: RdcConfig,
    resources: ResourceSet,
}

impl LocalState {
    /// Load (or create) the state file for a context.
    ///
    /// An encrypted file demands a password and is verified against the
    /// `secretsRef` canary before any resource data is parsed, so a wrong
    /// password fails here with the decrypt-failed error and nowhere else.
    pub fn load(path: PathBuf, master_password: Option<String>) -> Result<Self> {
        let config = if path.exists() {
            let raw = fs::read_to_string(&path)?;
            serde_json::from_str(&raw)
                .map_err(|e| Error::Corrupt(path.display().to_string(), e.to_string()))?
        } else {
            let config = new_document(master_password.as_deref())?;
            save_document(&path, &config)?;
            config
        };

        let resources = match &config.payload {
            ConfigPayload::Plain { resources } => resources.clone(),
            ConfigPayload::Encrypted { encrypted } => {
                let password = master_password
                    .as_deref()
                    .ok_or(Error::MasterPasswordRequired)?;
                if let Some(secrets_ref) = &config.secrets_ref {
                    vault::verify_secrets_ref(secrets_ref, password)?;
                }
                let plaintext = vault::decrypt(encrypted, password)?;
                serde_json::from_str(&plaintext)
                    .map_err(|e| Error::Corrupt(path.display().to_string(), e.to_string()))?
            }
        };

        Ok(Self {
            path,
            master_password,
            config,
            resources,
        })
    }

    /// The loaded config envelope (id, version).
    pub fn config(&self) -> &RdcConfig {
        &self.config
    }

    /// Persist the working copy, advancing the version by one.
    fn save_bump(&mut self) -> Result<()> {
        self.config.version += 1;
        self.config.payload = match &self.master_password {
            Some(password) => ConfigPayload::Encrypted {
                encrypted: vault::encrypt(&serde_json::to_string(&self.resources)?, password)?,
            },
            None => ConfigPayload::Plain {
                resources: self.resources.clone(),
            },
        };
        save_document(&self.path, &self.config)
    }

    fn available(&self, kind: ResourceKind) -> Vec<String> {
        self.resources.map(kind).keys().cloned().collect()
    }
}

/// Build a fresh state document, encrypted from the start when a password
/// is configured.
fn new_document(master_password: Option<&str>) -> Result<RdcConfig> {
    let mut config = RdcConfig::new();
    if let Some(password) = master_password {
        config.secrets_ref = Some(vault::make_secrets_ref(password)?);
        config.payload = ConfigPayload::Encrypted {
            encrypted: vault::encrypt(
                &serde_json::to_string(&ResourceSet::default())?,
                password,
            )?,
        };
    }
    Ok(config)
}

/// Read the raw config document without decrypting. Store adapters use this
/// as the local copy for push/pull; secrets stay ciphertext end to end.
pub fn load_document(path: &Path) -> Result<RdcConfig> {
    let raw = fs::read_to_string(path)?;
    serde_json::from_str(&raw)
        .map_err(|e| Error::Corrupt(path.display().to_string(), e.to_string()))
}

/// Read the config document, creating an empty one when the file is absent.
pub fn load_or_init_document(path: &Path) -> Result<RdcConfig> {
    if !path.exists() {
        let config = RdcConfig::new();
        save_document(path, &config)?;
        return Ok(config);
    }
    load_document(path)
}

/// Write a config document atomically.
pub fn save_document(path: &Path, config: &RdcConfig) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    write_atomic(path, serde_json::to_string_pretty(config)?.as_bytes())
}

impl StateProvider for LocalState {
    fn mode(&self) -> &'static str {
        "local"
    }

    fn list(&mut self, kind: ResourceKind, _scope: Option<&str>) -> Result<Vec<(String, Fields)>> {
        Ok(self
            .resources
            .map(kind)
            .iter()
            .map(|(name, fields)| (name.clone(), fields.clone()))
            .collect())
    }

    fn get(&mut self, kind: ResourceKind, name: &str) -> Result<Option<Fields>> {
        Ok(self.resources.map(kind).get(name).cloned())
    }

    fn create(&mut self, kind: ResourceKind, name: &str, fields: Fields) -> Result<MutationResult> {
        if self.resources.map(kind).contains_key(name) {
            return Ok(MutationResult::failed(format!(
                "{} \"{}\" already exists",
                kind.title(),
                name
            )));
        }
        self.resources.map_mut(kind).insert(name.to_string(), fields);
        self.save_bump()?;
        Ok(MutationResult::ok())
    }

    fn rename(
        &mut self,
        kind: ResourceKind,
        old_name: &str,
        new_name: &str,
    ) -> Result<MutationResult> {
        if !self.resources.map(kind).contains_key(old_name) {
            let available = self.available(kind);
            return Ok(MutationResult::failed(not_found_message(
                kind, old_name, &available,
            )));
        }
        if self.resources.map(kind).contains_key(new_name) {
            return Ok(MutationResult::failed(format!(
                "{} \"{}\" already exists",
                kind.title(),
                new_name
            )));
        }
        let fields = self
            .resources
            .map_mut(kind)
            .remove(old_name)
            .expect("checked above");
        self.resources.map_mut(kind).insert(new_name.to_string(), fields);
        self.save_bump()?;
        Ok(MutationResult::ok())
    }

    fn delete(&mut self, kind: ResourceKind, name: &str) -> Result<MutationResult> {
        if self.resources.map_mut(kind).remove(name).is_none() {
            let available = self.available(kind);
            return Ok(MutationResult::failed(not_found_message(
                kind, name, &available,
            )));
        }
        self.save_bump()?;
        Ok(MutationResult::ok())
    }

    fn get_vault(&mut self, kind: ResourceKind, name: &str) -> Result<Option<VaultRecord>> {
        let Some(fields) = self.resources.map(kind).get(name) else {
            return Ok(None);
        };
        let Some(content) = fields.get(VAULT_CONTENT_FIELD) else {
            return Ok(None);
        };
        let version = fields
            .get(VAULT_VERSION_FIELD)
            .and_then(serde_json::Value::as_u64)
            .unwrap_or(1);
        Ok(Some(VaultRecord {
            vault_version: version,
            vault_content: content.clone(),
        }))
    }

    fn update_vault(
        &mut self,
        kind: ResourceKind,
        name: &str,
        content: serde_json::Value,
        expected_version: u64,
    ) -> Result<MutationResult> {
        let available = self.available(kind);
        let Some(fields) = self.resources.map_mut(kind).get_mut(name) else {
            return Ok(MutationResult::failed(not_found_message(
                kind, name, &available,
            )));
        };

        let current = fields
            .get(VAULT_VERSION_FIELD)
            .and_then(serde_json::Value::as_u64)
            .unwrap_or(0);
        if expected_version != current {
            return Ok(MutationResult::failed(vault_conflict_message(
                kind, name, current,
            )));
        }

        fields.insert(VAULT_CONTENT_FIELD.to_string(), content);
        fields.insert(
            VAULT_VERSION_FIELD.to_string(),
            serde_json::Value::from(current + 1),
        );
        self.save_bump()?;
        Ok(MutationResult::ok())
    }

    fn enqueue(
        &mut self,
        function_name: &str,
        machine_name: Option<&str>,
        team_name: Option<&str>,
    ) -> Result<String> {
        let item = QueueItem::new(function_name, machine_name, team_name);
        let task_id = item.task_id.clone();
        self.resources.queue.insert(task_id.clone(), item);
        self.save_bump()?;
        Ok(task_id)
    }

    fn queue_list(&mut self, limit: Option<usize>) -> Result<Vec<QueueItem>> {
        let mut items: Vec<QueueItem> = self.resources.queue.values().cloned().collect();
        items.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        if let Some(limit) = limit {
            items.truncate(limit);
        }
        Ok(items)
    }

    fn queue_trace(&mut self, task_id: &str) -> Result<Option<QueueItem>> {
        Ok(self.resources.queue.get(task_id).cloned())
    }
}
