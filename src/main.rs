//! rdc CLI - versioned configuration and secret synchronization.

use clap::Parser;
use rdc::cli::{Cli, Commands};
use rdc::context::resolver::Resolver;
use rdc::models::ResourceKind;
use rdc::{action_log, commands};
use std::process;
use std::time::Instant;

fn main() {
    let cli = Cli::parse();
    let human = cli.human_readable;

    let mut resolver = match Resolver::open() {
        Ok(resolver) => resolver,
        Err(e) => {
            print_error(&e.to_string(), human);
            process::exit(1);
        }
    };
    resolver.set_context(cli.context.clone());

    let (cmd_name, args_json) = serialize_command(&cli.command);
    let context_name = resolver.current_name();
    let start = Instant::now();

    let result = run_command(cli.command, &mut resolver);
    let duration = start.elapsed().as_millis() as u64;

    // A command "fails" both on hard errors and on reported failures, so
    // the log and the exit code agree with what the operator saw.
    let (success, error) = match &result {
        Ok(output) => (output_success(output), None),
        Err(e) => (false, Some(e.to_string())),
    };

    action_log::log_action(
        resolver.config_dir(),
        &context_name,
        &cmd_name,
        args_json,
        success,
        error,
        duration,
    );

    match result {
        Ok(output) => {
            print_output(&output, human);
            if !success {
                process::exit(1);
            }
        }
        Err(e) => {
            print_error(&e.to_string(), human);
            process::exit(1);
        }
    }
}

fn run_command(command: Commands, resolver: &mut Resolver) -> rdc::Result<serde_json::Value> {
    match command {
        Commands::Context { command } => commands::context(resolver, command),
        Commands::Machine { command } => commands::resource(resolver, ResourceKind::Machine, command),
        Commands::Storage { command } => commands::resource(resolver, ResourceKind::Storage, command),
        Commands::Repo { command } => {
            commands::resource(resolver, ResourceKind::Repository, command)
        }
        Commands::Vault { command } => commands::vault_command(resolver, command),
        Commands::Queue { command } => commands::queue(resolver, command),
        Commands::Store { command } => commands::store(resolver, command),
    }
}

/// A command output is successful unless it carries `"success": false`.
fn output_success(output: &serde_json::Value) -> bool {
    output
        .get("success")
        .and_then(serde_json::Value::as_bool)
        .unwrap_or(true)
}

fn print_output(output: &serde_json::Value, human: bool) {
    if !human {
        println!("{}", serde_json::to_string_pretty(output).unwrap_or_default());
        return;
    }
    print_human(output, 0);
}

/// Plain key/value rendering for -H. JSON stays the primary surface.
fn print_human(value: &serde_json::Value, indent: usize) {
    let pad = "  ".repeat(indent);
    match value {
        serde_json::Value::Object(map) => {
            for (key, value) in map {
                match value {
                    serde_json::Value::Object(_) | serde_json::Value::Array(_) => {
                        println!("{}{}:", pad, key);
                        print_human(value, indent + 1);
                    }
                    other => println!("{}{}: {}", pad, key, display_scalar(other)),
                }
            }
        }
        serde_json::Value::Array(items) => {
            for item in items {
                match item {
                    serde_json::Value::Object(_) | serde_json::Value::Array(_) => {
                        println!("{}-", pad);
                        print_human(item, indent + 1);
                    }
                    other => println!("{}- {}", pad, display_scalar(other)),
                }
            }
        }
        other => println!("{}{}", pad, display_scalar(other)),
    }
}

fn display_scalar(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn print_error(message: &str, human: bool) {
    if human {
        eprintln!("Error: {}", message);
    } else {
        eprintln!(
            "{}",
            serde_json::json!({ "error": message })
        );
    }
}

/// Name and argument summary for the action log. Only resource names land
/// here; secrets and vault payloads never do.
fn serialize_command(command: &Commands) -> (String, serde_json::Value) {
    use rdc::cli::{ContextCommands, QueueCommands, ResourceCommands, StoreCommands, VaultCommands};

    fn resource(group: &str, command: &ResourceCommands) -> (String, serde_json::Value) {
        match command {
            ResourceCommands::Create { name, .. } => {
                (format!("{} create", group), serde_json::json!({ "name": name }))
            }
            ResourceCommands::List { .. } => (format!("{} list", group), serde_json::json!({})),
            ResourceCommands::Show { name } => {
                (format!("{} show", group), serde_json::json!({ "name": name }))
            }
            ResourceCommands::Rename { old_name, new_name } => (
                format!("{} rename", group),
                serde_json::json!({ "oldName": old_name, "newName": new_name }),
            ),
            ResourceCommands::Remove { name } => {
                (format!("{} remove", group), serde_json::json!({ "name": name }))
            }
        }
    }

    match command {
        Commands::Context { command } => {
            let verb = match command {
                ContextCommands::Create { .. } => "create",
                ContextCommands::List => "list",
                ContextCommands::Show { .. } => "show",
                ContextCommands::Rename { .. } => "rename",
                ContextCommands::Remove { .. } => "remove",
                ContextCommands::Set { .. } => "set",
                ContextCommands::Unset { .. } => "unset",
            };
            (format!("context {}", verb), serde_json::json!({}))
        }
        Commands::Machine { command } => resource("machine", command),
        Commands::Storage { command } => resource("storage", command),
        Commands::Repo { command } => resource("repo", command),
        Commands::Vault { command } => {
            let (verb, name) = match command {
                VaultCommands::Get { name, .. } => ("get", name),
                VaultCommands::Set { name, .. } => ("set", name),
            };
            (format!("vault {}", verb), serde_json::json!({ "name": name }))
        }
        Commands::Queue { command } => {
            let verb = match command {
                QueueCommands::Add { .. } => "add",
                QueueCommands::List { .. } => "list",
                QueueCommands::Trace { .. } => "trace",
            };
            (format!("queue {}", verb), serde_json::json!({}))
        }
        Commands::Store { command } => {
            let verb = match command {
                StoreCommands::Add { .. } => "add",
                StoreCommands::List => "list",
                StoreCommands::Remove { .. } => "remove",
                StoreCommands::Push { .. } => "push",
                StoreCommands::Pull { .. } => "pull",
                StoreCommands::Sync { .. } => "sync",
                StoreCommands::Configs { .. } => "configs",
                StoreCommands::Delete { .. } => "delete",
            };
            (format!("store {}", verb), serde_json::json!({}))
        }
    }
}
