//! S3 state backend.
//!
//! One JSON object per resource instance, keyed by a deterministic path
//! (`machines/<name>.json`, `storages/<name>.json`, …). Machine vault
//! payloads live in separate `vaults/machines/<name>.json.enc` objects so
//! listing resource metadata never requires decryption; other resources
//! keep their vault inline as a ciphertext field. A `_meta.json` object
//! records the schema version and creation timestamp for the bucket.
//!
//! Rename is write-new-object followed by delete-old-object. If the process
//! dies between the two, both objects transiently exist; a concurrent list
//! may observe either state but never a silently merged one.

use serde::{Deserialize, Serialize};

use super::{StateProvider, not_found_message, vault_conflict_message};
use crate::models::{Fields, MutationResult, QueueItem, ResourceKind, VaultRecord};
use crate::s3::S3Client;
use crate::{Error, Result, vault};

const META_KEY: &str = "_meta.json";
const QUEUE_PREFIX: &str = "queue/";
const MACHINE_VAULT_PREFIX: &str = "vaults/machines/";

const VAULT_CONTENT_FIELD: &str = "vaultContent";
const VAULT_VERSION_FIELD: &str = "vaultVersion";

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BucketMeta {
    schema_version: u32,
    created_at: String,
}

/// On-object shape of a machine vault. `vault_content` is a ciphertext
/// string for encrypted contexts and plain JSON otherwise; the owning
/// context's encryption state decides which, never the reader.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VaultObject {
    vault_version: u64,
    vault_content: serde_json::Value,
}

pub struct S3State {
    client: S3Client,
    master_password: Option<String>,
}

impl S3State {
    /// Connect to the bucket, writing `_meta.json` on first use.
    pub fn load(client: S3Client, master_password: Option<String>) -> Result<Self> {
        let state = Self {
            client,
            master_password,
        };
        if state.client.get_json::<BucketMeta>(META_KEY)?.is_none() {
            state.client.put_json(
                META_KEY,
                &BucketMeta {
                    schema_version: 1,
                    created_at: chrono::Utc::now().to_rfc3339(),
                },
            )?;
        }
        Ok(state)
    }

    fn record_key(kind: ResourceKind, name: &str) -> String {
        format!("{}/{}.json", kind.plural(), name)
    }

    fn machine_vault_key(name: &str) -> String {
        format!("{}{}.json.enc", MACHINE_VAULT_PREFIX, name)
    }

    fn names(&self, kind: ResourceKind) -> Result<Vec<String>> {
        let prefix = format!("{}/", kind.plural());
        let mut names: Vec<String> = self
            .client
            .list_keys(&prefix)?
            .into_iter()
            .filter_map(|key| {
                key.strip_prefix(&prefix)
                    .and_then(|rest| rest.strip_suffix(".json"))
                    .filter(|rest| !rest.contains('/'))
                    .map(str::to_string)
            })
            .collect();
        names.sort();
        Ok(names)
    }

    /// Encrypt a vault payload if the context is encrypted, otherwise pass
    /// the plaintext JSON through.
    fn seal(&self, content: &serde_json::Value) -> Result<serde_json::Value> {
        match &self.master_password {
            Some(password) => Ok(serde_json::Value::String(vault::encrypt_json(
                content, password,
            )?)),
            None => Ok(content.clone()),
        }
    }

    /// Inverse of [`Self::seal`].
    fn unseal(&self, stored: &serde_json::Value) -> Result<serde_json::Value> {
        match (&self.master_password, stored) {
            (Some(password), serde_json::Value::String(ciphertext)) => {
                vault::decrypt_json(ciphertext, password)
            }
            (Some(_), other) => Ok(other.clone()),
            (None, other) => Ok(other.clone()),
        }
    }

    fn read_machine_vault(&self, name: &str) -> Result<Option<VaultObject>> {
        self.client.get_json(&Self::machine_vault_key(name))
    }
}

impl StateProvider for S3State {
    fn mode(&self) -> &'static str {
        "s3"
    }

    fn list(&mut self, kind: ResourceKind, _scope: Option<&str>) -> Result<Vec<(String, Fields)>> {
        let mut records = Vec::new();
        for name in self.names(kind)? {
            if let Some(fields) = self.client.get_json::<Fields>(&Self::record_key(kind, &name))? {
                records.push((name, fields));
            }
        }
        Ok(records)
    }

    fn get(&mut self, kind: ResourceKind, name: &str) -> Result<Option<Fields>> {
        self.client.get_json(&Self::record_key(kind, name))
    }

    fn create(&mut self, kind: ResourceKind, name: &str, mut fields: Fields) -> Result<MutationResult> {
        let key = Self::record_key(kind, name);
        if self.client.get_object(&key)?.is_some() {
            return Ok(MutationResult::failed(format!(
                "{} \"{}\" already exists",
                kind.title(),
                name
            )));
        }
        let now = chrono::Utc::now().to_rfc3339();
        fields.insert("createdAt".to_string(), serde_json::Value::from(now.clone()));
        fields.insert("updatedAt".to_string(), serde_json::Value::from(now));
        self.client.put_json(&key, &fields)?;
        Ok(MutationResult::ok())
    }

    fn rename(
        &mut self,
        kind: ResourceKind,
        old_name: &str,
        new_name: &str,
    ) -> Result<MutationResult> {
        let Some(mut fields) = self
            .client
            .get_json::<Fields>(&Self::record_key(kind, old_name))?
        else {
            let available = self.names(kind)?;
            return Ok(MutationResult::failed(not_found_message(
                kind, old_name, &available,
            )));
        };
        if self
            .client
            .get_object(&Self::record_key(kind, new_name))?
            .is_some()
        {
            return Ok(MutationResult::failed(format!(
                "{} \"{}\" already exists",
                kind.title(),
                new_name
            )));
        }

        fields.insert(
            "updatedAt".to_string(),
            serde_json::Value::from(chrono::Utc::now().to_rfc3339()),
        );
        self.client.put_json(&Self::record_key(kind, new_name), &fields)?;
        self.client.delete_object(&Self::record_key(kind, old_name))?;

        // Move the detached vault object with the machine, same write-new
        // then delete-old order.
        if kind == ResourceKind::Machine {
            if let Some(vault_obj) = self.read_machine_vault(old_name)? {
                self.client
                    .put_json(&Self::machine_vault_key(new_name), &vault_obj)?;
                self.client.delete_object(&Self::machine_vault_key(old_name))?;
            }
        }

        Ok(MutationResult::ok())
    }

    fn delete(&mut self, kind: ResourceKind, name: &str) -> Result<MutationResult> {
        let key = Self::record_key(kind, name);
        if self.client.get_object(&key)?.is_none() {
            let available = self.names(kind)?;
            return Ok(MutationResult::failed(not_found_message(
                kind, name, &available,
            )));
        }
        self.client.delete_object(&key)?;
        if kind == ResourceKind::Machine {
            self.client.delete_object(&Self::machine_vault_key(name))?;
        }
        Ok(MutationResult::ok())
    }

    fn get_vault(&mut self, kind: ResourceKind, name: &str) -> Result<Option<VaultRecord>> {
        if kind == ResourceKind::Machine {
            let Some(vault_obj) = self.read_machine_vault(name)? else {
                return Ok(None);
            };
            return Ok(Some(VaultRecord {
                vault_version: vault_obj.vault_version,
                vault_content: self.unseal(&vault_obj.vault_content)?,
            }));
        }

        let Some(fields) = self
            .client
            .get_json::<Fields>(&Self::record_key(kind, name))?
        else {
            return Ok(None);
        };
        let Some(stored) = fields.get(VAULT_CONTENT_FIELD) else {
            return Ok(None);
        };
        Ok(Some(VaultRecord {
            vault_version: fields
                .get(VAULT_VERSION_FIELD)
                .and_then(serde_json::Value::as_u64)
                .unwrap_or(1),
            vault_content: self.unseal(stored)?,
        }))
    }

    fn update_vault(
        &mut self,
        kind: ResourceKind,
        name: &str,
        content: serde_json::Value,
        expected_version: u64,
    ) -> Result<MutationResult> {
        if self
            .client
            .get_object(&Self::record_key(kind, name))?
            .is_none()
        {
            let available = self.names(kind)?;
            return Ok(MutationResult::failed(not_found_message(
                kind, name, &available,
            )));
        }

        if kind == ResourceKind::Machine {
            let current = self
                .read_machine_vault(name)?
                .map(|v| v.vault_version)
                .unwrap_or(0);
            if expected_version != current {
                return Ok(MutationResult::failed(vault_conflict_message(
                    kind, name, current,
                )));
            }
            self.client.put_json(
                &Self::machine_vault_key(name),
                &VaultObject {
                    vault_version: current + 1,
                    vault_content: self.seal(&content)?,
                },
            )?;
            return Ok(MutationResult::ok());
        }

        let key = Self::record_key(kind, name);
        let mut fields: Fields = self
            .client
            .get_json(&key)?
            .ok_or_else(|| Error::Other(format!("{} \"{}\" vanished mid-update", kind.title(), name)))?;
        let current = fields
            .get(VAULT_VERSION_FIELD)
            .and_then(serde_json::Value::as_u64)
            .unwrap_or(0);
        if expected_version != current {
            return Ok(MutationResult::failed(vault_conflict_message(
                kind, name, current,
            )));
        }
        fields.insert(VAULT_CONTENT_FIELD.to_string(), self.seal(&content)?);
        fields.insert(
            VAULT_VERSION_FIELD.to_string(),
            serde_json::Value::from(current + 1),
        );
        fields.insert(
            "updatedAt".to_string(),
            serde_json::Value::from(chrono::Utc::now().to_rfc3339()),
        );
        self.client.put_json(&key, &fields)?;
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
        self.client
            .put_json(&format!("{}{}.json", QUEUE_PREFIX, task_id), &item)?;
        Ok(task_id)
    }

    fn queue_list(&mut self, limit: Option<usize>) -> Result<Vec<QueueItem>> {
        let mut items = Vec::new();
        for key in self.client.list_keys(QUEUE_PREFIX)? {
            if !key.ends_with(".json") {
                continue;
            }
            if let Some(item) = self.client.get_json::<QueueItem>(&key)? {
                items.push(item);
            }
        }
        items.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        if let Some(limit) = limit {
            items.truncate(limit);
        }
        Ok(items)
    }

    fn queue_trace(&mut self, task_id: &str) -> Result<Option<QueueItem>> {
        self.client
            .get_json(&format!("{}{}.json", QUEUE_PREFIX, task_id))
    }
}
