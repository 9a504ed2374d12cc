//! Command implementations for the rdc CLI.
//!
//! Each function maps one CLI command onto the context / state / store
//! layers and returns a JSON value for the output layer to render. Expected
//! failures come back as `{"success": false, ...}` payloads; `Err` is
//! reserved for conditions that abort the whole command.

use std::io::IsTerminal;

use crate::cli::{ContextCommands, QueueCommands, ResourceCommands, StoreCommands, VaultCommands};
use crate::context::resolver::Resolver;
use crate::context::{ContextMode, NamedContext, S3Settings, SshSettings};
use crate::models::{Fields, ResourceKind};
use crate::state::local::{load_or_init_document, save_document};
use crate::store::{
    StoreEntry, StoreRegistry, StoreType, create_store_adapter, describe_config,
};
use crate::{Error, Result, vault};

/// Keys accepted by `context set` / `context unset`.
const CONTEXT_DEFAULT_KEYS: [&str; 4] = ["team", "region", "bridge", "machine"];

// ============================================================================
// Context commands
// ============================================================================

pub fn context(resolver: &mut Resolver, command: ContextCommands) -> Result<serde_json::Value> {
    match command {
        ContextCommands::Create {
            name,
            mode,
            encrypt,
            api_url,
            token,
            ssh_key,
            s3_endpoint,
            s3_bucket,
            s3_region,
            s3_access_key_id,
            s3_secret_access_key,
            s3_prefix,
        } => {
            let ssh = ssh_key.map(|path| SshSettings {
                public_key_path: Some(format!("{}.pub", path)),
                private_key_path: path,
            });

            let mode = match mode.as_str() {
                "cloud" => {
                    let api_url = api_url.ok_or_else(|| {
                        Error::InvalidInput("Cloud mode requires --api-url".to_string())
                    })?;
                    ContextMode::Cloud {
                        api_url,
                        token,
                        user_email: None,
                    }
                }
                "local" => ContextMode::Local {
                    ssh,
                    encrypted: encrypt,
                },
                "s3" => {
                    let (Some(endpoint), Some(bucket), Some(access_key_id)) =
                        (s3_endpoint, s3_bucket, s3_access_key_id)
                    else {
                        return Err(Error::InvalidInput(
                            "S3 mode requires --s3-endpoint, --s3-bucket and --s3-access-key-id"
                                .to_string(),
                        ));
                    };
                    let mut secret_access_key = match s3_secret_access_key {
                        Some(secret) => secret,
                        None => prompt_secret("S3 secret access key: ")?,
                    };
                    if encrypt {
                        let password = resolver.master_password()?.to_string();
                        secret_access_key = vault::encrypt(&secret_access_key, &password)?;
                    }
                    ContextMode::S3 {
                        s3: S3Settings {
                            endpoint,
                            bucket,
                            region: s3_region,
                            access_key_id,
                            secret_access_key,
                            prefix: s3_prefix,
                        },
                        ssh,
                        encrypted: encrypt,
                    }
                }
                other => {
                    return Err(Error::InvalidInput(format!(
                        "Unknown mode \"{}\": expected local, s3 or cloud",
                        other
                    )));
                }
            };

            resolver.registry().create(NamedContext {
                name: name.clone(),
                mode,
                team: None,
                region: None,
                bridge: None,
                machine: None,
            })?;
            Ok(serde_json::json!({ "success": true, "context": name }))
        }

        ContextCommands::List => {
            let contexts: Vec<serde_json::Value> = resolver
                .registry()
                .list()?
                .into_iter()
                .map(|ctx| {
                    serde_json::json!({
                        "name": ctx.name,
                        "mode": ctx.mode.as_str(),
                        "encrypted": ctx.mode.encrypted(),
                        "team": ctx.team,
                    })
                })
                .collect();
            Ok(serde_json::json!({ "contexts": contexts }))
        }

        ContextCommands::Show { name } => {
            let name = name.unwrap_or_else(|| resolver.current_name());
            let context = resolver
                .registry()
                .get(&name)?
                .ok_or(Error::ContextNotFound(name))?;
            // Redact the one field that may hold key material.
            let mut value = serde_json::to_value(&context)?;
            if let Some(s3) = value.get_mut("s3") {
                if let Some(secret) = s3.get_mut("secretAccessKey") {
                    *secret = serde_json::Value::String("[REDACTED]".to_string());
                }
            }
            Ok(value)
        }

        ContextCommands::Rename { old_name, new_name } => {
            resolver.registry().rename(&old_name, &new_name)?;
            Ok(serde_json::json!({ "success": true, "context": new_name }))
        }

        ContextCommands::Remove { name } => {
            resolver.registry().delete(&name)?;
            Ok(serde_json::json!({ "success": true }))
        }

        ContextCommands::Set { key, value } => {
            if !CONTEXT_DEFAULT_KEYS.contains(&key.as_str()) {
                return Err(Error::InvalidInput(format!(
                    "Unknown default \"{}\": expected one of {}",
                    key,
                    CONTEXT_DEFAULT_KEYS.join(", ")
                )));
            }
            let mut context = resolver.current()?;
            match key.as_str() {
                "team" => context.team = Some(value),
                "region" => context.region = Some(value),
                "bridge" => context.bridge = Some(value),
                _ => context.machine = Some(value),
            }
            resolver.registry().update(context)?;
            Ok(serde_json::json!({ "success": true }))
        }

        ContextCommands::Unset { key } => {
            if !CONTEXT_DEFAULT_KEYS.contains(&key.as_str()) {
                return Err(Error::InvalidInput(format!(
                    "Unknown default \"{}\": expected one of {}",
                    key,
                    CONTEXT_DEFAULT_KEYS.join(", ")
                )));
            }
            let mut context = resolver.current()?;
            match key.as_str() {
                "team" => context.team = None,
                "region" => context.region = None,
                "bridge" => context.bridge = None,
                _ => context.machine = None,
            }
            resolver.registry().update(context)?;
            Ok(serde_json::json!({ "success": true }))
        }
    }
}

// ============================================================================
// Resource commands (machine / storage / repo)
// ============================================================================

pub fn resource(
    resolver: &mut Resolver,
    kind: ResourceKind,
    command: ResourceCommands,
) -> Result<serde_json::Value> {
    match command {
        ResourceCommands::Create { name, fields } => {
            let fields = parse_fields(&fields)?;
            let result = resolver.provider()?.create(kind, &name, fields)?;
            Ok(serde_json::to_value(result)?)
        }

        ResourceCommands::List { team } => {
            let team = team.or_else(|| resolver.team());
            let records = resolver.provider()?.list(kind, team.as_deref())?;
            let listed: Vec<serde_json::Value> = records
                .into_iter()
                .map(|(name, fields)| {
                    serde_json::json!({ "name": name, "fields": fields })
                })
                .collect();
            Ok(serde_json::json!({ (kind.plural()): listed }))
        }

        ResourceCommands::Show { name } => {
            match resolver.provider()?.get(kind, &name)? {
                Some(fields) => Ok(serde_json::json!({ "name": name, "fields": fields })),
                None => Ok(serde_json::json!({
                    "success": false,
                    "message": format!("{} \"{}\" not found", kind.title(), name),
                })),
            }
        }

        ResourceCommands::Rename { old_name, new_name } => {
            let result = resolver.provider()?.rename(kind, &old_name, &new_name)?;
            Ok(serde_json::to_value(result)?)
        }

        ResourceCommands::Remove { name } => {
            let result = resolver.provider()?.delete(kind, &name)?;
            Ok(serde_json::to_value(result)?)
        }
    }
}

/// Parse repeated `key=value` arguments into resource fields. Values that
/// parse as JSON keep their type; everything else is a string.
fn parse_fields(pairs: &[String]) -> Result<Fields> {
    let mut fields = Fields::new();
    for pair in pairs {
        let Some((key, value)) = pair.split_once('=') else {
            return Err(Error::InvalidInput(format!(
                "Invalid field \"{}\": expected key=value",
                pair
            )));
        };
        let value = serde_json::from_str(value)
            .unwrap_or_else(|_| serde_json::Value::String(value.to_string()));
        fields.insert(key.to_string(), value);
    }
    Ok(fields)
}

// ============================================================================
// Vault commands
// ============================================================================

pub fn vault_command(resolver: &mut Resolver, command: VaultCommands) -> Result<serde_json::Value> {
    match command {
        VaultCommands::Get { kind, name } => {
            let kind = parse_kind(&kind)?;
            match resolver.provider()?.get_vault(kind, &name)? {
                Some(record) => Ok(serde_json::to_value(record)?),
                None => Ok(serde_json::json!({
                    "success": false,
                    "message": format!("No vault for {} \"{}\"", kind.as_str(), name),
                })),
            }
        }

        VaultCommands::Set {
            kind,
            name,
            content,
            base_version,
        } => {
            let kind = parse_kind(&kind)?;
            let content: serde_json::Value = serde_json::from_str(&content)
                .map_err(|e| Error::InvalidInput(format!("Vault payload is not valid JSON: {}", e)))?;
            let result = resolver
                .provider()?
                .update_vault(kind, &name, content, base_version)?;
            Ok(serde_json::to_value(result)?)
        }
    }
}

fn parse_kind(kind: &str) -> Result<ResourceKind> {
    ResourceKind::from_str(kind).ok_or_else(|| {
        Error::InvalidInput(format!(
            "Unknown resource type \"{}\": expected machine, storage or repository",
            kind
        ))
    })
}

// ============================================================================
// Queue commands
// ============================================================================

pub fn queue(resolver: &mut Resolver, command: QueueCommands) -> Result<serde_json::Value> {
    match command {
        QueueCommands::Add {
            function,
            machine,
            team,
        } => {
            let team = team.or_else(|| resolver.team());
            let task_id =
                resolver
                    .provider()?
                    .enqueue(&function, machine.as_deref(), team.as_deref())?;
            Ok(serde_json::json!({ "success": true, "taskId": task_id }))
        }

        QueueCommands::List { limit } => {
            let items = resolver.provider()?.queue_list(limit)?;
            Ok(serde_json::json!({ "queue": items }))
        }

        QueueCommands::Trace { task_id } => match resolver.provider()?.queue_trace(&task_id)? {
            Some(item) => Ok(serde_json::to_value(item)?),
            None => Ok(serde_json::json!({
                "success": false,
                "message": format!("Task \"{}\" not found", task_id),
            })),
        },
    }
}

// ============================================================================
// Store commands
// ============================================================================

pub fn store(resolver: &mut Resolver, command: StoreCommands) -> Result<serde_json::Value> {
    let registry = StoreRegistry::at(resolver.config_dir());
    match command {
        StoreCommands::Add {
            name,
            store_type,
            local_path,
            s3_endpoint,
            s3_bucket,
            s3_region,
            s3_access_key_id,
            s3_secret_access_key,
            s3_prefix,
            bw_folder_id,
        } => {
            let store_type = StoreType::from_str(&store_type).ok_or_else(|| {
                Error::InvalidInput(format!(
                    "Invalid store type \"{}\": expected local-file, s3 or bitwarden",
                    store_type
                ))
            })?;

            let entry = match store_type {
                StoreType::LocalFile => {
                    let local_path = local_path.ok_or_else(|| {
                        Error::InvalidInput("local-file stores require --local-path".to_string())
                    })?;
                    StoreEntry {
                        name: name.clone(),
                        store_type,
                        local_path: Some(local_path),
                        s3: None,
                        bw_folder_id: None,
                    }
                }
                StoreType::S3 => {
                    let (Some(endpoint), Some(bucket), Some(access_key_id)) =
                        (s3_endpoint, s3_bucket, s3_access_key_id)
                    else {
                        return Err(Error::InvalidInput(
                            "S3 stores require --s3-endpoint, --s3-bucket and --s3-access-key-id"
                                .to_string(),
                        ));
                    };
                    let secret_access_key = match s3_secret_access_key {
                        Some(secret) => secret,
                        None => prompt_secret("S3 secret access key: ")?,
                    };
                    StoreEntry {
                        name: name.clone(),
                        store_type,
                        local_path: None,
                        s3: Some(S3Settings {
                            endpoint,
                            bucket,
                            region: s3_region,
                            access_key_id,
                            secret_access_key,
                            prefix: s3_prefix,
                        }),
                        bw_folder_id: None,
                    }
                }
                StoreType::Bitwarden => StoreEntry {
                    name: name.clone(),
                    store_type,
                    local_path: None,
                    s3: None,
                    bw_folder_id,
                },
            };

            registry.add(entry.clone())?;

            let verified = create_store_adapter(&entry)?.verify().unwrap_or(false);
            Ok(serde_json::json!({
                "success": true,
                "store": name,
                "type": store_type.as_str(),
                "verified": verified,
            }))
        }

        StoreCommands::List => {
            let stores: Vec<serde_json::Value> = registry
                .list()?
                .into_iter()
                .map(|entry| {
                    serde_json::json!({
                        "name": entry.name,
                        "type": entry.store_type.as_str(),
                    })
                })
                .collect();
            Ok(serde_json::json!({ "stores": stores }))
        }

        StoreCommands::Remove { name } => {
            registry.remove(&name)?;
            Ok(serde_json::json!({ "success": true }))
        }

        StoreCommands::Push { store, all } => {
            let config_name = resolver.current_name();
            let config = load_or_init_document(&resolver.state_path())?;
            let mut outcomes = Vec::new();
            for entry in select_stores(&registry, store.as_deref(), all)? {
                let outcome = match create_store_adapter(&entry)
                    .and_then(|adapter| adapter.push(&config, &config_name))
                {
                    Ok(outcome) => serde_json::to_value(outcome)?,
                    Err(e) => serde_json::json!({ "success": false, "error": e.to_string() }),
                };
                outcomes.push(annotate(outcome, &entry.name));
            }
            Ok(batch_result(outcomes))
        }

        StoreCommands::Pull { store } => {
            let entry = require_store(&registry, &store)?;
            let config_name = resolver.current_name();
            let outcome = create_store_adapter(&entry)?.pull(&config_name)?;
            if let Some(config) = &outcome.config {
                save_document(&resolver.state_path(), config)?;
            }
            Ok(serde_json::to_value(outcome)?)
        }

        StoreCommands::Sync { store, all } => {
            let config_name = resolver.current_name();
            let state_path = resolver.state_path();
            let mut outcomes = Vec::new();
            for entry in select_stores(&registry, store.as_deref(), all)? {
                let outcome = match sync_single_store(&entry, &config_name, &state_path) {
                    Ok(outcome) => outcome,
                    Err(e) => serde_json::json!({ "success": false, "error": e.to_string() }),
                };
                outcomes.push(annotate(outcome, &entry.name));
            }
            Ok(batch_result(outcomes))
        }

        StoreCommands::Configs { store } => {
            let entry = require_store(&registry, &store)?;
            let names = create_store_adapter(&entry)?.list()?;
            Ok(serde_json::json!({ "configs": names }))
        }

        StoreCommands::Delete { store, name } => {
            let entry = require_store(&registry, &store)?;
            let result = create_store_adapter(&entry)?.delete(&name)?;
            Ok(serde_json::to_value(result)?)
        }
    }
}

/// Pull (when the remote is strictly newer) then push (when the local copy
/// is strictly ahead) against one store. A remote already at the local
/// version with the same identity is up to date, not a conflict.
fn sync_single_store(
    entry: &StoreEntry,
    config_name: &str,
    state_path: &std::path::Path,
) -> Result<serde_json::Value> {
    let adapter = create_store_adapter(entry)?;
    let mut local = load_or_init_document(state_path)?;

    let mut pulled = false;
    let mut remote_version = None;
    let mut same_id = false;
    let pull = adapter.pull(config_name)?;
    if let Some(remote) = pull.config {
        remote_version = Some(remote.version);
        same_id = remote.id == local.id;
        if same_id && remote.version > local.version {
            save_document(state_path, &remote)?;
            local = remote;
            pulled = true;
        }
    }

    // After a pull, or when the remote already matches the local version
    // with the same identity, there is nothing to push. An unrelated remote
    // id still goes through push so the GUID mismatch is reported.
    if same_id && remote_version.is_some_and(|v| v >= local.version) {
        return Ok(serde_json::json!({
            "success": true,
            "pulled": pulled,
            "upToDate": true,
            "remoteVersion": remote_version,
            "config": describe_config(&local),
        }));
    }

    let push = adapter.push(&local, config_name)?;
    Ok(serde_json::json!({
        "success": push.success,
        "pulled": pulled,
        "remoteVersion": push.remote_version,
        "error": push.error,
        "config": describe_config(&local),
    }))
}

fn require_store(registry: &StoreRegistry, name: &str) -> Result<StoreEntry> {
    registry
        .get(name)?
        .ok_or_else(|| Error::InvalidInput(format!("Store \"{}\" not found", name)))
}

/// Resolve which stores to operate on based on --store and --all.
fn select_stores(
    registry: &StoreRegistry,
    store: Option<&str>,
    all: bool,
) -> Result<Vec<StoreEntry>> {
    if let Some(name) = store {
        if all {
            return Err(Error::InvalidInput(
                "--store and --all are mutually exclusive".to_string(),
            ));
        }
        return Ok(vec![require_store(registry, name)?]);
    }
    let stores = registry.list()?;
    if stores.is_empty() {
        return Err(Error::InvalidInput(
            "No stores registered: run `rdc store add` first".to_string(),
        ));
    }
    Ok(stores)
}

fn annotate(mut outcome: serde_json::Value, store_name: &str) -> serde_json::Value {
    if let Some(map) = outcome.as_object_mut() {
        map.insert(
            "store".to_string(),
            serde_json::Value::String(store_name.to_string()),
        );
    }
    outcome
}

/// Collapse per-store outcomes into one batch payload whose success flag is
/// the conjunction, so one failing store fails the command without hiding
/// the stores that worked.
fn batch_result(outcomes: Vec<serde_json::Value>) -> serde_json::Value {
    let success = outcomes
        .iter()
        .all(|o| o.get("success").and_then(serde_json::Value::as_bool) == Some(true));
    serde_json::json!({ "success": success, "results": outcomes })
}

fn prompt_secret(prompt: &str) -> Result<String> {
    if !std::io::stdin().is_terminal() {
        return Err(Error::InvalidInput(format!(
            "Missing secret ({}) and no terminal to prompt on",
            prompt.trim_end_matches(": ")
        )));
    }
    let secret = rpassword::prompt_password(prompt)
        .map_err(|e| Error::Other(format!("Could not read secret: {}", e)))?;
    if secret.is_empty() {
        return Err(Error::InvalidInput("Secret must not be empty".to_string()));
    }
    Ok(secret)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_fields_types() {
        let fields = parse_fields(&[
            "ip=10.0.0.1".to_string(),
            "port=22".to_string(),
            "labels=[\"a\",\"b\"]".to_string(),
        ])
        .unwrap();
        assert_eq!(fields["ip"], serde_json::json!("10.0.0.1"));
        assert_eq!(fields["port"], serde_json::json!(22));
        assert_eq!(fields["labels"], serde_json::json!(["a", "b"]));
    }

    #[test]
    fn test_parse_fields_rejects_bare_words() {
        assert!(parse_fields(&["not-a-pair".to_string()]).is_err());
    }

    #[test]
    fn test_batch_result_conjunction() {
        let all_ok = batch_result(vec![
            serde_json::json!({"success": true}),
            serde_json::json!({"success": true}),
        ]);
        assert_eq!(all_ok["success"], serde_json::json!(true));

        let one_failed = batch_result(vec![
            serde_json::json!({"success": true}),
            serde_json::json!({"success": false}),
        ]);
        assert_eq!(one_failed["success"], serde_json::json!(false));
    }

    #[test]
    fn test_parse_kind_rejects_unknown() {
        assert!(parse_kind("machine").is_ok());
        assert!(parse_kind("bridge").is_err());
    }
}
