//! Common test utilities for rdc integration tests.
//!
//! Provides `TestEnv` for isolated test environments that don't pollute
//! the user's real rdc config directory.

#![allow(dead_code)]

use assert_cmd::Command;
pub use tempfile::TempDir;

/// A test environment with an isolated config directory.
///
/// The `rdc()` method returns a `Command` that sets `RDC_CONFIG_DIR`
/// per-invocation, making tests parallel-safe. Action logging is disabled
/// so assertions on stdout stay clean.
pub struct TestEnv {
    pub config_dir: TempDir,
}

impl TestEnv {
    /// Create a new test environment with an isolated config directory.
    pub fn new() -> Self {
        Self {
            config_dir: TempDir::new().unwrap(),
        }
    }

    /// Create a new test environment with a local-mode "default" context.
    pub fn with_local_context() -> Self {
        let env = Self::new();
        env.rdc()
            .args(["context", "create", "default", "--mode", "local"])
            .assert()
            .success();
        env
    }

    /// Get a Command for the rdc binary with an isolated config directory.
    pub fn rdc(&self) -> Command {
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_rdc"));
        cmd.env("RDC_CONFIG_DIR", self.config_dir.path());
        cmd.env("RDC_DISABLE_ACTION_LOG", "1");
        cmd.env_remove("RDC_CONTEXT");
        cmd.env_remove("RDC_MASTER_PASSWORD");
        cmd.env_remove("RDC_TEAM");
        cmd.env_remove("BW_SESSION");
        cmd
    }

    /// Get the path to the config directory.
    pub fn config_path(&self) -> &std::path::Path {
        self.config_dir.path()
    }
}

impl Default for TestEnv {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse JSON output from a command.
pub fn parse_json(output: &[u8]) -> serde_json::Value {
    serde_json::from_slice(output).expect("Failed to parse JSON output")
}
