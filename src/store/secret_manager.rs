//! Secret-manager store backend.
//!
//! Uses a Bitwarden-compatible CLI (`bw`) as a remote blob store: each
//! config is one type-2 secure-note item named `rdc:<name>` whose notes
//! field holds the serialized config JSON. An optional folder id scopes
//! which items this store sees, so unrelated vault content stays invisible.
//!
//! Session handling: `BW_SESSION` is used when set; otherwise `bw status`
//! decides between the three distinguishable failure causes (locked /
//! not logged in / CLI missing), since the operator's recovery action
//! differs for each.

use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use serde::{Deserialize, Serialize};
use std::process::Command;

use super::{PushDecision, StoreAdapter, decide_push, parse_remote_config};
use crate::models::{MutationResult, PullOutcome, PushOutcome, RdcConfig};
use crate::{Error, Result};

/// Item-name prefix distinguishing rdc configs from unrelated vault items.
const ITEM_PREFIX: &str = "rdc:";

/// Environment variable carrying an unlocked session token.
pub const SESSION_ENV: &str = "BW_SESSION";

/// Environment variable overriding the CLI binary (used by tests).
pub const CLI_ENV: &str = "RDC_BW_PATH";

const DEFAULT_CLI: &str = "bw";

/// A secret-manager item, reduced to the fields rdc reads and writes.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct BwItem {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<String>,

    name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    notes: Option<String>,

    #[serde(rename = "type")]
    item_type: u8,

    #[serde(
        rename = "secureNote",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    secure_note: Option<serde_json::Value>,

    #[serde(rename = "folderId", default, skip_serializing_if = "Option::is_none")]
    folder_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BwStatus {
    status: String,
}

pub struct SecretManagerStore {
    folder_id: Option<String>,
}

impl SecretManagerStore {
    pub fn new(folder_id: Option<String>) -> Self {
        Self { folder_id }
    }

    fn cli() -> String {
        std::env::var(CLI_ENV).unwrap_or_else(|_| DEFAULT_CLI.to_string())
    }

    /// Run the CLI, capturing stdout. A missing binary maps to the
    /// CLI-not-found cause; any non-zero exit is surfaced with stderr.
    fn run(args: &[&str]) -> Result<String> {
        let cli = Self::cli();
        let output = Command::new(&cli).args(args).output().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::CliNotFound(cli.clone())
            } else {
                Error::Other(format!("Failed to run {}: {}", cli, e))
            }
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::Other(format!(
                "{} {} failed: {}",
                cli,
                args.first().unwrap_or(&""),
                stderr.trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// Resolve a usable session: the env token when present, otherwise a
    /// status check that turns "locked" and "unauthenticated" into their
    /// distinguishable errors.
    fn session(&self) -> Result<Option<String>> {
        if let Ok(token) = std::env::var(SESSION_ENV) {
            if !token.is_empty() {
                return Ok(Some(token));
            }
        }

        let raw = Self::run(&["status"])?;
        let status: BwStatus = serde_json::from_str(&raw)
            .map_err(|e| Error::Corrupt("bw status output".to_string(), e.to_string()))?;
        match status.status.as_str() {
            "unlocked" => Ok(None),
            "locked" => Err(Error::VaultLocked),
            "unauthenticated" => Err(Error::NotLoggedIn),
            other => Err(Error::Other(format!(
                "Unexpected secret-manager status \"{}\"",
                other
            ))),
        }
    }

    fn run_with_session(session: &Option<String>, args: &[&str]) -> Result<String> {
        match session {
            Some(token) => {
                let mut full: Vec<&str> = args.to_vec();
                full.push("--session");
                full.push(token);
                Self::run(&full)
            }
            None => Self::run(args),
        }
    }

    /// All rdc config items visible to this store, folder filter applied.
    fn config_items(&self, session: &Option<String>) -> Result<Vec<BwItem>> {
        let raw = Self::run_with_session(session, &["list", "items"])?;
        let items: Vec<BwItem> = serde_json::from_str(&raw)
            .map_err(|e| Error::Corrupt("bw item listing".to_string(), e.to_string()))?;
        Ok(filter_config_items(items, self.folder_id.as_deref()))
    }

    fn find_item(&self, session: &Option<String>, name: &str) -> Result<Option<BwItem>> {
        let wanted = format!("{}{}", ITEM_PREFIX, name);
        Ok(self
            .config_items(session)?
            .into_iter()
            .find(|item| item.name == wanted))
    }

    fn encode_item(item: &BwItem) -> Result<String> {
        Ok(BASE64.encode(serde_json::to_string(item)?))
    }
}

/// Keep only type-2 items carrying the rdc prefix, scoped to `folder_id`
/// when one is configured.
fn filter_config_items(items: Vec<BwItem>, folder_id: Option<&str>) -> Vec<BwItem> {
    items
        .into_iter()
        .filter(|item| item.item_type == 2 && item.name.starts_with(ITEM_PREFIX))
        .filter(|item| match folder_id {
            Some(folder) => item.folder_id.as_deref() == Some(folder),
            None => true,
        })
        .collect()
}

impl StoreAdapter for SecretManagerStore {
    fn verify(&self) -> Result<bool> {
        match self.session().and_then(|s| self.config_items(&s)) {
            Ok(_) => Ok(true),
            Err(Error::VaultLocked | Error::NotLoggedIn | Error::CliNotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn push(&self, config: &RdcConfig, name: &str) -> Result<PushOutcome> {
        let session = self.session()?;
        let existing = self.find_item(&session, name)?;

        let remote = match &existing {
            Some(item) => match item.notes.as_deref() {
                Some(notes) => match parse_remote_config(name, notes) {
                    Ok(config) => Some(config),
                    Err(pull) => return Ok(PushOutcome::failed(pull.error.unwrap_or_default())),
                },
                None => {
                    return Ok(PushOutcome::failed(format!(
                        "Config \"{}\" holds invalid JSON",
                        name
                    )));
                }
            },
            None => None,
        };

        match decide_push(config, name, remote.as_ref()) {
            PushDecision::Reject(outcome) => Ok(outcome),
            decision => {
                let notes = serde_json::to_string(config)?;
                match decision {
                    PushDecision::Create => {
                        let item = BwItem {
                            id: None,
                            name: format!("{}{}", ITEM_PREFIX, name),
                            notes: Some(notes),
                            item_type: 2,
                            secure_note: Some(serde_json::json!({ "type": 0 })),
                            folder_id: self.folder_id.clone(),
                        };
                        let encoded = Self::encode_item(&item)?;
                        Self::run_with_session(&session, &["create", "item", &encoded])?;
                    }
                    PushDecision::Overwrite => {
                        let mut item = existing.expect("overwrite implies an existing item");
                        let id = item
                            .id
                            .clone()
                            .ok_or_else(|| Error::Other("Item has no id".to_string()))?;
                        item.notes = Some(notes);
                        let encoded = Self::encode_item(&item)?;
                        Self::run_with_session(&session, &["edit", "item", &id, &encoded])?;
                    }
                    PushDecision::Reject(_) => unreachable!(),
                }
                Ok(PushOutcome::ok(config.version))
            }
        }
    }

    fn pull(&self, name: &str) -> Result<PullOutcome> {
        let session = self.session()?;
        match self.find_item(&session, name)? {
            None => Ok(PullOutcome::failed(format!("Config \"{}\" not found", name))),
            Some(item) => {
                let notes = item.notes.unwrap_or_default();
                match parse_remote_config(name, &notes) {
                    Ok(config) => Ok(PullOutcome::ok(config)),
                    Err(outcome) => Ok(outcome),
                }
            }
        }
    }

    fn list(&self) -> Result<Vec<String>> {
        let session = self.session()?;
        let mut names: Vec<String> = self
            .config_items(&session)?
            .into_iter()
            .filter_map(|item| {
                item.name
                    .strip_prefix(ITEM_PREFIX)
                    .map(str::to_string)
            })
            .collect();
        names.sort();
        Ok(names)
    }

    fn delete(&self, name: &str) -> Result<MutationResult> {
        let session = self.session()?;
        match self.find_item(&session, name)? {
            None => Ok(MutationResult::failed(format!(
                "Config \"{}\" not found",
                name
            ))),
            Some(item) => {
                let id = item
                    .id
                    .ok_or_else(|| Error::Other("Item has no id".to_string()))?;
                Self::run_with_session(&session, &["delete", "item", &id])?;
                Ok(MutationResult::ok())
            }
        }
    }

    fn store_type(&self) -> &'static str {
        "bitwarden"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(id: &str, name: &str, folder_id: Option<&str>) -> BwItem {
        BwItem {
            id: Some(id.to_string()),
            name: name.to_string(),
            notes: Some("{}".to_string()),
            item_type: 2,
            secure_note: Some(serde_json::json!({ "type": 0 })),
            folder_id: folder_id.map(str::to_string),
        }
    }

    #[test]
    fn test_filter_keeps_only_prefixed_secure_notes() {
        let items = vec![
            item("1", "rdc:staging", None),
            item("2", "rdc:production", None),
            item("3", "rdc:rediacc", None),
            item("4", "unrelated-item", None),
        ];

        let mut names: Vec<String> = filter_config_items(items, None)
            .into_iter()
            .filter_map(|i| i.name.strip_prefix(ITEM_PREFIX).map(str::to_string))
            .collect();
        names.sort();
        assert_eq!(names, ["production", "rediacc", "staging"]);
    }

    #[test]
    fn test_filter_by_folder_id() {
        let items = vec![
            item("1", "rdc:in-folder", Some("folder-1")),
            item("2", "rdc:other-folder", Some("folder-2")),
            item("3", "rdc:no-folder", None),
        ];

        let filtered = filter_config_items(items, Some("folder-1"));
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].name, "rdc:in-folder");
    }

    #[test]
    fn test_filter_ignores_non_note_types() {
        let mut login = item("1", "rdc:login-shaped", None);
        login.item_type = 1;
        assert!(filter_config_items(vec![login], None).is_empty());
    }

    #[test]
    fn test_status_parse() {
        let status: BwStatus =
            serde_json::from_str(r#"{"status":"locked","userEmail":"x@example.com"}"#).unwrap();
        assert_eq!(status.status, "locked");
    }

    #[test]
    fn test_item_encoding_round_trip() {
        let original = item("abc", "rdc:alpha", Some("f1"));
        let encoded = SecretManagerStore::encode_item(&original).unwrap();
        let decoded: BwItem =
            serde_json::from_slice(&BASE64.decode(encoded).unwrap()).unwrap();
        assert_eq!(decoded.name, "rdc:alpha");
        assert_eq!(decoded.item_type, 2);
        assert_eq!(decoded.folder_id.as_deref(), Some("f1"));
    }
}
