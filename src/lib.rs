//! rdc - versioned configuration and secret synchronization.
//!
//! This library provides the core functionality for the `rdc` CLI tool:
//! named contexts, resource state providers (local file / S3 bucket / cloud
//! API), whole-config store adapters with optimistic concurrency, and the
//! password-based vault codec.

pub mod action_log;
pub mod cli;
pub mod commands;
pub mod context;
pub mod models;
pub mod s3;
pub mod state;
pub mod store;
pub mod vault;

/// Library-level error type for rdc operations.
///
/// Expected per-resource failures (not found, already exists, version
/// conflict, GUID mismatch) are reported through result values such as
/// [`models::MutationResult`] and [`models::PushOutcome`], not through this
/// enum. `Error` is reserved for conditions that abort the whole operation:
/// unreachable or unauthenticated backends, I/O failures, and corruption.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Context \"{0}\" not found")]
    ContextNotFound(String),

    #[error("No active context: run `rdc context create` first")]
    NoActiveContext,

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Decryption failed: wrong master password or corrupted data")]
    DecryptFailed,

    #[error("Context is encrypted but no master password was provided")]
    MasterPasswordRequired,

    // The three backend-unavailable causes must stay distinguishable: the
    // recovery action differs (unlock vs. log in vs. install).
    #[error("Secret-manager vault is locked: run `bw unlock` or set BW_SESSION")]
    VaultLocked,

    #[error("Secret-manager is not logged in: run `bw login`")]
    NotLoggedIn,

    #[error("Secret-manager CLI not found: is `{0}` installed and on PATH?")]
    CliNotFound(String),

    #[error("Corrupt data in {0}: {1}")]
    Corrupt(String, String),

    #[error("{0}")]
    Other(String),
}

/// Result type alias for rdc operations.
pub type Result<T> = std::result::Result<T, Error>;
