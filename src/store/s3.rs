//! S3 store backend.
//!
//! Whole-config snapshots live as bucket objects under `configs/<name>.json`
//! (after the entry's optional key prefix). Object storage offers no
//! compare-and-swap here, so the read-then-write push protocol is the same
//! optimistic check as everywhere else: good enough to detect racing
//! writers, not a lock.

use super::{PushDecision, StoreAdapter, decide_push, parse_remote_config};
use crate::context::S3Settings;
use crate::models::{MutationResult, PullOutcome, PushOutcome, RdcConfig};
use crate::s3::S3Client;
use crate::{Error, Result};

const CONFIG_PREFIX: &str = "configs/";

pub struct S3Store {
    client: S3Client,
}

impl S3Store {
    pub fn new(settings: S3Settings) -> Self {
        Self {
            client: S3Client::new(settings),
        }
    }

    fn key_for(name: &str) -> String {
        format!("{}{}.json", CONFIG_PREFIX, name)
    }
}

impl StoreAdapter for S3Store {
    fn verify(&self) -> Result<bool> {
        self.client.verify()
    }

    fn push(&self, config: &RdcConfig, name: &str) -> Result<PushOutcome> {
        if !self.verify()? {
            return Err(Error::Http(
                "S3 authentication failed: check access key and secret".to_string(),
            ));
        }

        let key = Self::key_for(name);
        let remote = match self.client.get_object(&key)? {
            Some(raw) => match parse_remote_config(name, &raw) {
                Ok(config) => Some(config),
                Err(pull) => return Ok(PushOutcome::failed(pull.error.unwrap_or_default())),
            },
            None => None,
        };

        match decide_push(config, name, remote.as_ref()) {
            PushDecision::Reject(outcome) => Ok(outcome),
            PushDecision::Create | PushDecision::Overwrite => {
                self.client.put_json(&key, config)?;
                Ok(PushOutcome::ok(config.version))
            }
        }
    }

    fn pull(&self, name: &str) -> Result<PullOutcome> {
        match self.client.get_object(&Self::key_for(name))? {
            None => Ok(PullOutcome::failed(format!("Config \"{}\" not found", name))),
            Some(raw) => match parse_remote_config(name, &raw) {
                Ok(config) => Ok(PullOutcome::ok(config)),
                Err(outcome) => Ok(outcome),
            },
        }
    }

    fn list(&self) -> Result<Vec<String>> {
        let mut names: Vec<String> = self
            .client
            .list_keys(CONFIG_PREFIX)?
            .into_iter()
            .filter_map(|key| {
                key.strip_prefix(CONFIG_PREFIX)
                    .and_then(|rest| rest.strip_suffix(".json"))
                    .map(str::to_string)
            })
            .collect();
        names.sort();
        Ok(names)
    }

    fn delete(&self, name: &str) -> Result<MutationResult> {
        let key = Self::key_for(name);
        // S3 deletes are idempotent at the protocol level; probe first so
        // not-found is visible to the caller.
        if self.client.get_object(&key)?.is_none() {
            return Ok(MutationResult::failed(format!(
                "Config \"{}\" not found",
                name
            )));
        }
        self.client.delete_object(&key)?;
        Ok(MutationResult::ok())
    }

    fn store_type(&self) -> &'static str {
        "s3"
    }
}
