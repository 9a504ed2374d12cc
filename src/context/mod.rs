//! Named contexts and their on-disk registry.
//!
//! A context is an operator-facing profile selecting exactly one backend
//! mode (cloud / local / s3) plus mode-specific settings. All contexts live
//! in a single `contexts.json` under the rdc config directory; the per-context
//! resource state lives elsewhere (`state/<name>.json` for local mode, the
//! bucket for s3 mode, the server for cloud mode).

pub mod resolver;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::{Error, Result};

/// Environment variable overriding the rdc config directory (used by tests).
pub const CONFIG_DIR_ENV: &str = "RDC_CONFIG_DIR";

/// Environment variable selecting the active context.
pub const CONTEXT_ENV: &str = "RDC_CONTEXT";

/// Name used when neither the `--context` flag nor `RDC_CONTEXT` is set.
pub const DEFAULT_CONTEXT: &str = "default";

/// SSH key locations for self-hosted modes. Key material itself is never
/// stored here, only paths.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SshSettings {
    pub private_key_path: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_key_path: Option<String>,
}

/// Connection settings for an S3-compatible bucket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct S3Settings {
    pub endpoint: String,
    pub bucket: String,

    #[serde(default = "default_region")]
    pub region: String,

    pub access_key_id: String,

    /// Stored vault-encrypted when the context is encrypted, plaintext
    /// otherwise.
    pub secret_access_key: String,

    /// Optional key prefix inside the bucket
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
}

fn default_region() -> String {
    "auto".to_string()
}

/// Backend mode plus its settings, dispatched once at provider construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum ContextMode {
    /// Thin pass-through to a remote HTTP API
    #[serde(rename_all = "camelCase")]
    Cloud {
        api_url: String,

        #[serde(default, skip_serializing_if = "Option::is_none")]
        token: Option<String>,

        #[serde(default, skip_serializing_if = "Option::is_none")]
        user_email: Option<String>,
    },

    /// All resources in one encrypted-or-plaintext file on this machine
    #[serde(rename_all = "camelCase")]
    Local {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        ssh: Option<SshSettings>,

        #[serde(default)]
        encrypted: bool,
    },

    /// One JSON object per resource in a shared bucket
    #[serde(rename_all = "camelCase")]
    S3 {
        s3: S3Settings,

        #[serde(default, skip_serializing_if = "Option::is_none")]
        ssh: Option<SshSettings>,

        #[serde(default)]
        encrypted: bool,
    },
}

impl ContextMode {
    /// Mode name as shown to the user.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cloud { .. } => "cloud",
            Self::Local { .. } => "local",
            Self::S3 { .. } => "s3",
        }
    }

    /// Whether resources for this mode are vault-encrypted at rest.
    pub fn encrypted(&self) -> bool {
        match self {
            Self::Cloud { .. } => false,
            Self::Local { encrypted, .. } | Self::S3 { encrypted, .. } => *encrypted,
        }
    }
}

/// One named context profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NamedContext {
    pub name: String,

    #[serde(flatten)]
    pub mode: ContextMode,

    // Per-context defaults, overridable via RDC_TEAM / RDC_REGION /
    // RDC_BRIDGE / RDC_MACHINE.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bridge: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub machine: Option<String>,
}

/// Top-level shape of `contexts.json`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct ContextsFile {
    #[serde(default)]
    contexts: BTreeMap<String, NamedContext>,
}

/// Resolve the rdc config directory: `RDC_CONFIG_DIR` env override first,
/// then the platform config dir.
pub fn config_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var(CONFIG_DIR_ENV) {
        if !dir.is_empty() {
            return Ok(PathBuf::from(dir));
        }
    }
    dirs::config_dir()
        .map(|d| d.join("rdc"))
        .ok_or_else(|| Error::Other("Could not determine config directory".to_string()))
}

/// Path of the per-context local state file.
pub fn state_file_path(config_dir: &Path, context_name: &str) -> PathBuf {
    config_dir.join("state").join(format!("{}.json", context_name))
}

/// CRUD over the `contexts.json` registry.
///
/// Every operation is a read-modify-write of the whole file under a
/// single-writer assumption; concurrent external edits are undefined
/// behavior, not a supported mode.
pub struct ContextRegistry {
    path: PathBuf,
}

impl ContextRegistry {
    /// Open the registry in the default config directory.
    pub fn open() -> Result<Self> {
        Ok(Self::at(&config_dir()?))
    }

    /// Open the registry rooted at an explicit config directory.
    pub fn at(config_dir: &Path) -> Self {
        Self {
            path: config_dir.join("contexts.json"),
        }
    }

    fn load(&self) -> Result<ContextsFile> {
        if !self.path.exists() {
            return Ok(ContextsFile::default());
        }
        let raw = fs::read_to_string(&self.path)?;
        serde_json::from_str(&raw)
            .map_err(|e| Error::Corrupt(self.path.display().to_string(), e.to_string()))
    }

    fn save(&self, file: &ContextsFile) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(file)?;
        crate::store::write_atomic(&self.path, json.as_bytes())
    }

    /// List all contexts, sorted by name.
    pub fn list(&self) -> Result<Vec<NamedContext>> {
        Ok(self.load()?.contexts.into_values().collect())
    }

    /// Get a context by name.
    pub fn get(&self, name: &str) -> Result<Option<NamedContext>> {
        Ok(self.load()?.contexts.get(name).cloned())
    }

    /// Create a new context. Fails if the name is taken.
    pub fn create(&self, context: NamedContext) -> Result<()> {
        let mut file = self.load()?;
        if file.contexts.contains_key(&context.name) {
            return Err(Error::InvalidInput(format!(
                "Context \"{}\" already exists",
                context.name
            )));
        }
        file.contexts.insert(context.name.clone(), context);
        self.save(&file)
    }

    /// Replace an existing context.
    pub fn update(&self, context: NamedContext) -> Result<()> {
        let mut file = self.load()?;
        if !file.contexts.contains_key(&context.name) {
            return Err(Error::ContextNotFound(context.name));
        }
        file.contexts.insert(context.name.clone(), context);
        self.save(&file)
    }

    /// Delete a context by name.
    pub fn delete(&self, name: &str) -> Result<()> {
        let mut file = self.load()?;
        if file.contexts.remove(name).is_none() {
            return Err(Error::ContextNotFound(name.to_string()));
        }
        self.save(&file)
    }

    /// Rename a context. Fails if `old_name` is missing or `new_name` taken.
    pub fn rename(&self, old_name: &str, new_name: &str) -> Result<()> {
        let mut file = self.load()?;
        if file.contexts.contains_key(new_name) {
            return Err(Error::InvalidInput(format!(
                "Context \"{}\" already exists",
                new_name
            )));
        }
        let Some(mut context) = file.contexts.remove(old_name) else {
            return Err(Error::ContextNotFound(old_name.to_string()));
        };
        context.name = new_name.to_string();
        file.contexts.insert(new_name.to_string(), context);
        self.save(&file)
    }
}
