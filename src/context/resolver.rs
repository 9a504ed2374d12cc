//! Active-context resolution and provider construction.
//!
//! The resolver selects the current context (`--context` flag >
//! `RDC_CONTEXT` env > "default"), constructs the matching state provider
//! lazily, and caches it for the rest of the process. Switching the active
//! context invalidates the cache instead of mutating the provider in place.
//!
//! The master password is resolved at most once per process: from
//! `RDC_MASTER_PASSWORD` when set, otherwise by prompting on a terminal.
//! It lives only in this struct's memory and is never written anywhere.

use std::io::IsTerminal;
use std::path::PathBuf;

use super::{
    CONTEXT_ENV, ContextMode, ContextRegistry, DEFAULT_CONTEXT, NamedContext, config_dir,
    state_file_path,
};
use crate::s3::S3Client;
use crate::state::{CloudState, LocalState, S3State, StateProvider};
use crate::{Error, Result, vault};

/// Environment variable supplying the master password non-interactively.
pub const MASTER_PASSWORD_ENV: &str = "RDC_MASTER_PASSWORD";

pub struct Resolver {
    config_dir: PathBuf,
    registry: ContextRegistry,
    runtime_override: Option<String>,
    provider: Option<Box<dyn StateProvider>>,
    master_password: Option<String>,
}

impl Resolver {
    /// Resolver over the default config directory.
    pub fn open() -> Result<Self> {
        let dir = config_dir()?;
        Ok(Self::at(dir))
    }

    /// Resolver rooted at an explicit config directory.
    pub fn at(config_dir: PathBuf) -> Self {
        let registry = ContextRegistry::at(&config_dir);
        Self {
            config_dir,
            registry,
            runtime_override: None,
            provider: None,
            master_password: None,
        }
    }

    /// Set the runtime context override (from the `--context` flag).
    /// Resets the cached provider so the next access re-resolves.
    pub fn set_context(&mut self, name: Option<String>) {
        self.runtime_override = name;
        self.provider = None;
    }

    /// The effective context name: flag > env > "default".
    pub fn current_name(&self) -> String {
        if let Some(name) = &self.runtime_override {
            return name.clone();
        }
        if let Ok(name) = std::env::var(CONTEXT_ENV) {
            if !name.is_empty() {
                return name;
            }
        }
        DEFAULT_CONTEXT.to_string()
    }

    /// The context registry.
    pub fn registry(&self) -> &ContextRegistry {
        &self.registry
    }

    /// The rdc config directory this resolver works under.
    pub fn config_dir(&self) -> &std::path::Path {
        &self.config_dir
    }

    /// The active context, or an error naming what is missing.
    pub fn current(&self) -> Result<NamedContext> {
        let name = self.current_name();
        self.registry
            .get(&name)?
            .ok_or(Error::ContextNotFound(name))
    }

    /// Path of the active context's local config document (the unit store
    /// adapters push and pull).
    pub fn state_path(&self) -> PathBuf {
        state_file_path(&self.config_dir, &self.current_name())
    }

    /// Effective default team: env override first, then the context.
    pub fn team(&self) -> Option<String> {
        if let Ok(team) = std::env::var("RDC_TEAM") {
            if !team.is_empty() {
                return Some(team);
            }
        }
        self.current().ok().and_then(|ctx| ctx.team)
    }

    /// The state provider for the active context, constructed on first use
    /// and cached for the process lifetime.
    pub fn provider(&mut self) -> Result<&mut dyn StateProvider> {
        if self.provider.is_none() {
            let context = self.current()?;
            let provider = self.build_provider(&context)?;
            self.provider = Some(provider);
        }
        Ok(self
            .provider
            .as_deref_mut()
            .expect("provider was just constructed"))
    }

    fn build_provider(&mut self, context: &NamedContext) -> Result<Box<dyn StateProvider>> {
        match &context.mode {
            ContextMode::Cloud { api_url, token, .. } => {
                let token = token
                    .clone()
                    .or_else(|| std::env::var("RDC_TOKEN").ok().filter(|t| !t.is_empty()))
                    .ok_or_else(|| {
                        Error::Other(format!(
                            "Context \"{}\" has no API token: log in first",
                            context.name
                        ))
                    })?;
                Ok(Box::new(CloudState::new(
                    api_url.clone(),
                    token,
                    self.team(),
                )))
            }
            ContextMode::Local { encrypted, .. } => {
                let password = if *encrypted {
                    Some(self.master_password()?.to_string())
                } else {
                    None
                };
                let path = state_file_path(&self.config_dir, &context.name);
                Ok(Box::new(LocalState::load(path, password)?))
            }
            ContextMode::S3 { s3, encrypted, .. } => {
                let mut settings = s3.clone();
                let password = if *encrypted {
                    let password = self.master_password()?.to_string();
                    // The stored secret key doubles as the password check:
                    // a wrong password fails here, before any bucket call.
                    settings.secret_access_key =
                        vault::decrypt(&settings.secret_access_key, &password)?;
                    Some(password)
                } else {
                    None
                };
                Ok(Box::new(S3State::load(S3Client::new(settings), password)?))
            }
        }
    }

    /// The master password, resolved once: env var first, then a prompt
    /// when stdin is a terminal, otherwise a hard failure. Never silently
    /// falls back to plaintext.
    pub fn master_password(&mut self) -> Result<&str> {
        if self.master_password.is_none() {
            let password = match std::env::var(MASTER_PASSWORD_ENV) {
                Ok(password) if !password.is_empty() => password,
                _ => {
                    if !std::io::stdin().is_terminal() {
                        return Err(Error::MasterPasswordRequired);
                    }
                    rpassword::prompt_password("Master password: ")
                        .map_err(|e| Error::Other(format!("Could not read password: {}", e)))?
                }
            };
            self.master_password = Some(password);
        }
        Ok(self.master_password.as_deref().expect("just set"))
    }
}
