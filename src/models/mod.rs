//! Data models for rdc entities.
//!
//! This module defines the core data structures:
//! - `RdcConfig` - The versioned, identity-bearing unit of synchronization
//! - `ResourceSet` - Named maps of machines / storages / repositories
//! - `QueueItem` - A queued task visible through the queue capability group
//! - `VaultRecord` - An encrypted-or-plaintext secret payload bound to a resource
//! - `MutationResult` / `PushOutcome` / `PullOutcome` - Reported operation results
//!
//! Wire JSON uses camelCase field names: these documents are shared with
//! remote stores and other tooling, so the serialized shape is a contract.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Arbitrary key-value fields of a resource record.
pub type Fields = serde_json::Map<String, serde_json::Value>;

/// The three resource types managed per context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Machine,
    Storage,
    Repository,
}

impl ResourceKind {
    /// Singular display name ("machine").
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Machine => "machine",
            Self::Storage => "storage",
            Self::Repository => "repository",
        }
    }

    /// Plural form, which doubles as the object-storage key prefix.
    pub fn plural(&self) -> &'static str {
        match self {
            Self::Machine => "machines",
            Self::Storage => "storages",
            Self::Repository => "repositories",
        }
    }

    /// Capitalized singular, used in user-facing messages.
    pub fn title(&self) -> &'static str {
        match self {
            Self::Machine => "Machine",
            Self::Storage => "Storage",
            Self::Repository => "Repository",
        }
    }

    /// Parse a resource kind from a string.
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "machine" | "machines" => Some(Self::Machine),
            "storage" | "storages" => Some(Self::Storage),
            "repository" | "repositories" | "repo" | "repos" => Some(Self::Repository),
            _ => None,
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Status of a queued task.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QueueStatus {
    #[default]
    Pending,
    Active,
    Completed,
    Failed,
    Cancelled,
}

/// A queued task. Mutation beyond enqueue lives server-side (cloud mode);
/// self-hosted backends only enqueue, list and trace.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueItem {
    /// Unique task identifier (UUID v4, assigned at enqueue time)
    pub task_id: String,

    /// Function to run
    pub function_name: String,

    /// Target machine, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub machine_name: Option<String>,

    /// Owning team, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team_name: Option<String>,

    /// Current status
    #[serde(default)]
    pub status: QueueStatus,

    /// Priority (lower is more urgent)
    #[serde(default = "default_priority")]
    pub priority: u8,

    /// Number of retries so far
    #[serde(default)]
    pub retry_count: u32,

    /// Captured console output, if the task has run
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub console_output: Option<String>,

    /// Failure reason, if the task failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,

    /// Creation timestamp (ISO 8601)
    pub created_at: String,

    /// Last update timestamp (ISO 8601)
    pub updated_at: String,
}

fn default_priority() -> u8 {
    3
}

impl QueueItem {
    /// Create a new pending queue item.
    pub fn new(function_name: &str, machine_name: Option<&str>, team_name: Option<&str>) -> Self {
        let now = chrono::Utc::now().to_rfc3339();
        Self {
            task_id: uuid::Uuid::new_v4().to_string(),
            function_name: function_name.to_string(),
            machine_name: machine_name.map(str::to_string),
            team_name: team_name.map(str::to_string),
            status: QueueStatus::default(),
            priority: default_priority(),
            retry_count: 0,
            console_output: None,
            error_message: None,
            created_at: now.clone(),
            updated_at: now,
        }
    }
}

/// A secret payload bound to one resource, as seen by callers after any
/// decryption has happened.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VaultRecord {
    /// Incremented on every successful write. A write must supply the
    /// version it believes is current; backends that track versions reject
    /// mismatches so racing writers are detected, not merged.
    pub vault_version: u64,

    /// Decrypted vault payload (arbitrary JSON)
    pub vault_content: serde_json::Value,
}

/// The named resource maps of one config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceSet {
    #[serde(default)]
    pub machines: BTreeMap<String, Fields>,

    #[serde(default)]
    pub storages: BTreeMap<String, Fields>,

    #[serde(default)]
    pub repositories: BTreeMap<String, Fields>,

    /// Queued tasks, keyed by task id
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub queue: BTreeMap<String, QueueItem>,
}

impl ResourceSet {
    /// The map for a resource kind.
    pub fn map(&self, kind: ResourceKind) -> &BTreeMap<String, Fields> {
        match kind {
            ResourceKind::Machine => &self.machines,
            ResourceKind::Storage => &self.storages,
            ResourceKind::Repository => &self.repositories,
        }
    }

    /// The mutable map for a resource kind.
    pub fn map_mut(&mut self, kind: ResourceKind) -> &mut BTreeMap<String, Fields> {
        match kind {
            ResourceKind::Machine => &mut self.machines,
            ResourceKind::Storage => &mut self.storages,
            ResourceKind::Repository => &mut self.repositories,
        }
    }
}

/// Resource maps, either in the clear or as a single vault-codec ciphertext.
///
/// Making the distinction part of the type means the codec is only reachable
/// when encryption is actually configured: code holding a `Plain` payload
/// cannot accidentally double-decrypt, and code holding an `Encrypted` one
/// cannot read resources without going through the codec.
///
/// Variant order matters for deserialization: a document with an `encrypted`
/// string field is the ciphertext form.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConfigPayload {
    /// Vault-codec ciphertext of the serialized [`ResourceSet`]
    Encrypted { encrypted: String },
    /// Plaintext resource maps
    Plain {
        #[serde(flatten)]
        resources: ResourceSet,
    },
}

/// The unit synchronized wholesale between a local copy and a remote store.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RdcConfig {
    /// Opaque identity token, assigned once at creation, immutable for the
    /// life of the config. Two configs sharing a name but not an id are
    /// unrelated and are never merged or implicitly overwritten.
    pub id: String,

    /// Monotonically increasing, starts at 1. Bumped on every successful
    /// local mutation so the push protocol's staleness check reflects real
    /// edit history.
    pub version: u64,

    /// Encrypted master-password canary, or `None` when the config is
    /// unencrypted. Decrypting this verifies a supplied password before any
    /// resource data is touched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secrets_ref: Option<String>,

    #[serde(flatten)]
    pub payload: ConfigPayload,
}

impl RdcConfig {
    /// Create a fresh plaintext config with a new identity.
    pub fn new() -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            version: 1,
            secrets_ref: None,
            payload: ConfigPayload::Plain {
                resources: ResourceSet::default(),
            },
        }
    }
}

impl Default for RdcConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Result of a resource mutation (create / rename / delete / vault update).
///
/// "Not found" and "already exists" are reported failures, not errors, so
/// batch operations stay scriptable.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MutationResult {
    pub success: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl MutationResult {
    pub fn ok() -> Self {
        Self {
            success: true,
            message: None,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
        }
    }
}

/// Result of a whole-config push.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushOutcome {
    pub success: bool,

    /// Version now held remotely (on success)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_version: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PushOutcome {
    pub fn ok(remote_version: u64) -> Self {
        Self {
            success: true,
            remote_version: Some(remote_version),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            remote_version: None,
            error: Some(error.into()),
        }
    }
}

/// Result of a whole-config pull.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PullOutcome {
    pub success: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<RdcConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PullOutcome {
    pub fn ok(config: RdcConfig) -> Self {
        Self {
            success: true,
            config: Some(config),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            config: None,
            error: Some(error.into()),
        }
    }
}
