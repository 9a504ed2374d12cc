//! CLI argument definitions for rdc.

use clap::{Parser, Subcommand};

/// rdc - keep machine, storage and repository configuration in sync across
/// local, S3 and secret-manager backends.
#[derive(Parser, Debug)]
#[command(name = "rdc")]
#[command(author, about = "Versioned configuration and secret synchronization", long_about = None)]
#[command(version = concat!(env!("CARGO_PKG_VERSION"), " (", env!("RDC_GIT_COMMIT"), ", built ", env!("RDC_BUILD_TIMESTAMP"), ")"))]
pub struct Cli {
    /// Output in human-readable format instead of JSON
    #[arg(short = 'H', long = "human", global = true)]
    pub human_readable: bool,

    /// Context to operate on. Can also be set via RDC_CONTEXT; defaults to
    /// "default".
    #[arg(short = 'c', long = "context", global = true, env = "RDC_CONTEXT")]
    pub context: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Context management commands
    Context {
        #[command(subcommand)]
        command: ContextCommands,
    },

    /// Machine management commands
    Machine {
        #[command(subcommand)]
        command: ResourceCommands,
    },

    /// Storage management commands
    Storage {
        #[command(subcommand)]
        command: ResourceCommands,
    },

    /// Repository management commands
    Repo {
        #[command(subcommand)]
        command: ResourceCommands,
    },

    /// Vault read/write for a resource's secret payload
    Vault {
        #[command(subcommand)]
        command: VaultCommands,
    },

    /// Queue commands (enqueue, list, trace)
    Queue {
        #[command(subcommand)]
        command: QueueCommands,
    },

    /// Store management and whole-config synchronization
    Store {
        #[command(subcommand)]
        command: StoreCommands,
    },
}

/// Context subcommands
#[derive(Subcommand, Debug)]
pub enum ContextCommands {
    /// Create a new context
    Create {
        /// Context name
        name: String,

        /// Backend mode: local, s3 or cloud
        #[arg(long, default_value = "local")]
        mode: String,

        /// Encrypt resources at rest with a master password (local/s3)
        #[arg(long)]
        encrypt: bool,

        /// API URL (cloud mode)
        #[arg(long)]
        api_url: Option<String>,

        /// API token (cloud mode)
        #[arg(long)]
        token: Option<String>,

        /// SSH private key path (local/s3 modes)
        #[arg(long)]
        ssh_key: Option<String>,

        /// S3 endpoint URL (s3 mode)
        #[arg(long)]
        s3_endpoint: Option<String>,

        /// S3 bucket name (s3 mode)
        #[arg(long)]
        s3_bucket: Option<String>,

        /// S3 region (s3 mode)
        #[arg(long, default_value = "auto")]
        s3_region: String,

        /// S3 access key id (s3 mode)
        #[arg(long)]
        s3_access_key_id: Option<String>,

        /// S3 secret access key (s3 mode; prompted when omitted)
        #[arg(long)]
        s3_secret_access_key: Option<String>,

        /// Key prefix inside the bucket (s3 mode)
        #[arg(long)]
        s3_prefix: Option<String>,
    },

    /// List all contexts
    List,

    /// Show one context (defaults to the active one)
    Show {
        /// Context name
        name: Option<String>,
    },

    /// Rename a context
    Rename {
        /// Current name
        old_name: String,

        /// New name
        new_name: String,
    },

    /// Delete a context
    #[command(alias = "rm")]
    Remove {
        /// Context name
        name: String,
    },

    /// Set a context default (team, region, bridge, machine)
    Set {
        /// One of: team, region, bridge, machine
        key: String,

        /// Value to set
        value: String,
    },

    /// Clear a context default
    Unset {
        /// One of: team, region, bridge, machine
        key: String,
    },
}

/// Shared subcommands for machine / storage / repo resources
#[derive(Subcommand, Debug)]
pub enum ResourceCommands {
    /// Create a resource
    Create {
        /// Resource name
        name: String,

        /// Field to set, as key=value (repeatable)
        #[arg(short = 's', long = "set", value_name = "KEY=VALUE")]
        fields: Vec<String>,
    },

    /// List resources
    #[command(alias = "ls")]
    List {
        /// Restrict to a team (cloud mode)
        #[arg(long)]
        team: Option<String>,
    },

    /// Show one resource
    Show {
        /// Resource name
        name: String,
    },

    /// Rename a resource, keeping all fields intact
    Rename {
        /// Current name
        old_name: String,

        /// New name
        new_name: String,
    },

    /// Delete a resource
    #[command(alias = "rm")]
    Remove {
        /// Resource name
        name: String,
    },
}

/// Vault subcommands
#[derive(Subcommand, Debug)]
pub enum VaultCommands {
    /// Read the vault attached to a resource
    Get {
        /// Resource type: machine, storage or repository
        kind: String,

        /// Resource name
        name: String,
    },

    /// Write the vault attached to a resource
    Set {
        /// Resource type: machine, storage or repository
        kind: String,

        /// Resource name
        name: String,

        /// Vault payload as JSON
        content: String,

        /// Vault version this write is based on (0 when no vault exists yet)
        #[arg(long, default_value_t = 0)]
        base_version: u64,
    },
}

/// Queue subcommands
#[derive(Subcommand, Debug)]
pub enum QueueCommands {
    /// Enqueue a task
    Add {
        /// Function to run
        function: String,

        /// Target machine
        #[arg(long)]
        machine: Option<String>,

        /// Owning team
        #[arg(long)]
        team: Option<String>,
    },

    /// List queued tasks, newest first
    #[command(alias = "ls")]
    List {
        /// Maximum number of tasks to show
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Trace one task by id
    Trace {
        /// Task id
        task_id: String,
    },
}

/// Store subcommands
#[derive(Subcommand, Debug)]
pub enum StoreCommands {
    /// Register a store
    Add {
        /// Store name
        name: String,

        /// Store type: local-file, s3 or bitwarden
        #[arg(long = "type")]
        store_type: String,

        /// Directory holding snapshots (local-file)
        #[arg(long)]
        local_path: Option<String>,

        /// S3 endpoint URL
        #[arg(long)]
        s3_endpoint: Option<String>,

        /// S3 bucket name
        #[arg(long)]
        s3_bucket: Option<String>,

        /// S3 region
        #[arg(long, default_value = "auto")]
        s3_region: String,

        /// S3 access key id
        #[arg(long)]
        s3_access_key_id: Option<String>,

        /// S3 secret access key (prompted when omitted)
        #[arg(long)]
        s3_secret_access_key: Option<String>,

        /// Key prefix inside the bucket
        #[arg(long)]
        s3_prefix: Option<String>,

        /// Restrict secret-manager items to this folder id (bitwarden)
        #[arg(long)]
        bw_folder_id: Option<String>,
    },

    /// List registered stores
    #[command(alias = "ls")]
    List,

    /// Remove a store registration
    #[command(alias = "rm")]
    Remove {
        /// Store name
        name: String,
    },

    /// Push the active config to stores
    Push {
        /// Push to this store only
        #[arg(long)]
        store: Option<String>,

        /// Push to all registered stores
        #[arg(long)]
        all: bool,
    },

    /// Pull the active config from a store
    Pull {
        /// Store to pull from
        #[arg(long)]
        store: String,
    },

    /// Pull (if the remote is newer) then push, per store
    Sync {
        /// Sync against this store only
        #[arg(long)]
        store: Option<String>,

        /// Sync against all registered stores
        #[arg(long)]
        all: bool,
    },

    /// List config names held by a store
    Configs {
        /// Store to enumerate
        #[arg(long)]
        store: String,
    },

    /// Delete a config snapshot from a store
    Delete {
        /// Store to delete from
        #[arg(long)]
        store: String,

        /// Config name to delete
        name: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli() {
        // This will panic if the CLI is misconfigured
        Cli::command().debug_assert();
    }
}
