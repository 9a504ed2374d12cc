//! Resource state providers.
//!
//! A state provider exposes CRUD over the resources of one context
//! (machines, storages, repositories, queue items and their vaults) against
//! one backend:
//! - `LocalState` - everything in one encrypted-or-plaintext file
//! - `S3State` - one JSON object per resource in a bucket
//! - `CloudState` - thin pass-through to the HTTP API
//!
//! The backend is picked once, at context resolution time; callers hold a
//! `Box<dyn StateProvider>` and never re-check the mode per call.

pub mod cloud;
pub mod local;
pub mod s3;

pub use cloud::CloudState;
pub use local::LocalState;
pub use s3::S3State;

use crate::Result;
use crate::models::{Fields, MutationResult, QueueItem, ResourceKind, VaultRecord};

/// CRUD over the resources of one context.
///
/// Contracts shared by all backends:
/// - `list` never fails on zero results; it fails only when the backend is
///   unreachable or refuses authentication.
/// - `create` reports failure when the name is taken.
/// - `rename` and `delete` report not-found instead of raising, so repeated
///   invocations stay scriptable.
/// - `update_vault` takes the vault version the caller believes is current
///   and reports failure on mismatch; lost updates are detected, not merged.
pub trait StateProvider {
    /// Backend mode name ("local", "s3", "cloud").
    fn mode(&self) -> &'static str;

    /// All resources of a kind, as (name, fields) pairs sorted by name.
    /// `scope` narrows to a team where the backend supports it.
    fn list(&mut self, kind: ResourceKind, scope: Option<&str>) -> Result<Vec<(String, Fields)>>;

    /// One resource by name.
    fn get(&mut self, kind: ResourceKind, name: &str) -> Result<Option<Fields>>;

    /// Create a resource. Fails (as a result) if the name already exists.
    fn create(&mut self, kind: ResourceKind, name: &str, fields: Fields) -> Result<MutationResult>;

    /// Rename a resource, keeping all fields intact. From the caller's
    /// perspective this is atomic: on failure the old name remains valid.
    fn rename(&mut self, kind: ResourceKind, old_name: &str, new_name: &str)
    -> Result<MutationResult>;

    /// Delete a resource. Not-found is a reported failure.
    fn delete(&mut self, kind: ResourceKind, name: &str) -> Result<MutationResult>;

    /// Read the vault attached to a resource, decrypted per the owning
    /// context's encryption state.
    fn get_vault(&mut self, kind: ResourceKind, name: &str) -> Result<Option<VaultRecord>>;

    /// Write the vault attached to a resource. `expected_version` is the
    /// version the caller believes is current (0 when no vault exists yet).
    fn update_vault(
        &mut self,
        kind: ResourceKind,
        name: &str,
        content: serde_json::Value,
        expected_version: u64,
    ) -> Result<MutationResult>;

    /// Enqueue a task, returning its id. Further queue mutation lives
    /// server-side and is out of scope for self-hosted backends.
    fn enqueue(
        &mut self,
        function_name: &str,
        machine_name: Option<&str>,
        team_name: Option<&str>,
    ) -> Result<String>;

    /// List queued tasks, newest first.
    fn queue_list(&mut self, limit: Option<usize>) -> Result<Vec<QueueItem>>;

    /// Trace one queued task by id.
    fn queue_trace(&mut self, task_id: &str) -> Result<Option<QueueItem>>;
}

/// "Machine \"X\" not found. Available: a, b, c": every not-found failure
/// names the resource and what the operator could have meant.
pub(crate) fn not_found_message(kind: ResourceKind, name: &str, available: &[String]) -> String {
    let listed = if available.is_empty() {
        "none".to_string()
    } else {
        available.join(", ")
    };
    format!(
        "{} \"{}\" not found. Available: {}",
        kind.title(),
        name,
        listed
    )
}

/// Failure message for a vault write whose expected version is stale.
pub(crate) fn vault_conflict_message(kind: ResourceKind, name: &str, current: u64) -> String {
    format!(
        "Vault version conflict on {} \"{}\": current version is {}; re-read the vault and retry",
        kind.as_str(),
        name,
        current
    )
}
