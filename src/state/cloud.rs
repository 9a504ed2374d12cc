//! Cloud state backend.
//!
//! Thin pass-through to the remote HTTP API. The server owns all the
//! interesting logic (team scoping, queue execution, vault storage); this
//! provider only establishes the shared interface so callers never care
//! which mode a context is in.

use super::StateProvider;
use crate::models::{Fields, MutationResult, QueueItem, ResourceKind, VaultRecord};
use crate::{Error, Result};

/// User-Agent header sent with every API request.
const USER_AGENT: &str = "rdc-cli";

pub struct CloudState {
    api_url: String,
    token: String,
    team: Option<String>,
}

impl CloudState {
    pub fn new(api_url: String, token: String, team: Option<String>) -> Self {
        Self {
            api_url: api_url.trim_end_matches('/').to_string(),
            token,
            team,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.api_url, path)
    }

    fn request(&self, method: &str, path: &str) -> ureq::Request {
        ureq::request(method, &self.url(path))
            .set("Authorization", &format!("Bearer {}", self.token))
            .set("Accept", "application/json")
            .set("User-Agent", USER_AGENT)
    }

    /// Send a request, treating 404 as `None` and mapping auth failures to
    /// descriptive errors.
    fn send(
        &self,
        method: &str,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> Result<Option<serde_json::Value>> {
        let request = self.request(method, path);
        let response = match body {
            Some(body) => request.send_json(body),
            None => request.call(),
        };

        match response {
            Ok(resp) => resp
                .into_json()
                .map(Some)
                .map_err(|e| Error::Corrupt(path.to_string(), e.to_string())),
            Err(ureq::Error::Status(404, _)) => Ok(None),
            Err(ureq::Error::Status(401, _)) => {
                Err(Error::Http("API authentication failed: token rejected".to_string()))
            }
            Err(ureq::Error::Status(code, resp)) => {
                let detail = resp.into_string().unwrap_or_default();
                Err(Error::Http(format!("{} from API: {}", code, detail.trim())))
            }
            Err(e) => Err(Error::Http(e.to_string())),
        }
    }

    fn scope_query(&self, scope: Option<&str>) -> String {
        match scope.or(self.team.as_deref()) {
            Some(team) => format!("?team={}", team),
            None => String::new(),
        }
    }

    fn mutation_from(value: Option<serde_json::Value>) -> MutationResult {
        match value {
            Some(value) => serde_json::from_value(value).unwrap_or_else(|_| MutationResult::ok()),
            None => MutationResult::failed("not found"),
        }
    }
}

impl StateProvider for CloudState {
    fn mode(&self) -> &'static str {
        "cloud"
    }

    fn list(&mut self, kind: ResourceKind, scope: Option<&str>) -> Result<Vec<(String, Fields)>> {
        let path = format!("resources/{}{}", kind.plural(), self.scope_query(scope));
        let Some(value) = self.send("GET", &path, None)? else {
            return Ok(Vec::new());
        };
        let records: Vec<serde_json::Value> = serde_json::from_value(value)
            .map_err(|e| Error::Corrupt(path.clone(), e.to_string()))?;
        Ok(records
            .into_iter()
            .filter_map(|record| {
                let name = record.get("name")?.as_str()?.to_string();
                let fields = record.as_object()?.clone();
                Some((name, fields))
            })
            .collect())
    }

    fn get(&mut self, kind: ResourceKind, name: &str) -> Result<Option<Fields>> {
        let path = format!("resources/{}/{}", kind.plural(), name);
        match self.send("GET", &path, None)? {
            None => Ok(None),
            Some(value) => serde_json::from_value(value)
                .map(Some)
                .map_err(|e| Error::Corrupt(path, e.to_string())),
        }
    }

    fn create(&mut self, kind: ResourceKind, name: &str, fields: Fields) -> Result<MutationResult> {
        let mut body = serde_json::Map::new();
        body.insert("name".to_string(), serde_json::Value::from(name));
        body.insert("fields".to_string(), serde_json::Value::Object(fields));
        if let Some(team) = &self.team {
            body.insert("team".to_string(), serde_json::Value::from(team.clone()));
        }
        let value = self.send(
            "POST",
            &format!("resources/{}", kind.plural()),
            Some(serde_json::Value::Object(body)),
        )?;
        Ok(Self::mutation_from(value))
    }

    fn rename(
        &mut self,
        kind: ResourceKind,
        old_name: &str,
        new_name: &str,
    ) -> Result<MutationResult> {
        let value = self.send(
            "POST",
            &format!("resources/{}/{}/rename", kind.plural(), old_name),
            Some(serde_json::json!({ "newName": new_name })),
        )?;
        match value {
            None => Ok(MutationResult::failed(format!(
                "{} \"{}\" not found",
                kind.title(),
                old_name
            ))),
            some => Ok(Self::mutation_from(some)),
        }
    }

    fn delete(&mut self, kind: ResourceKind, name: &str) -> Result<MutationResult> {
        let value = self.send(
            "DELETE",
            &format!("resources/{}/{}", kind.plural(), name),
            None,
        )?;
        match value {
            None => Ok(MutationResult::failed(format!(
                "{} \"{}\" not found",
                kind.title(),
                name
            ))),
            some => Ok(Self::mutation_from(some)),
        }
    }

    fn get_vault(&mut self, kind: ResourceKind, name: &str) -> Result<Option<VaultRecord>> {
        let path = format!("resources/{}/{}/vault", kind.plural(), name);
        match self.send("GET", &path, None)? {
            None => Ok(None),
            Some(value) => serde_json::from_value(value)
                .map(Some)
                .map_err(|e| Error::Corrupt(path, e.to_string())),
        }
    }

    fn update_vault(
        &mut self,
        kind: ResourceKind,
        name: &str,
        content: serde_json::Value,
        expected_version: u64,
    ) -> Result<MutationResult> {
        // The server tracks vault versions independently and rejects
        // writes whose version does not match.
        let value = self.send(
            "PUT",
            &format!("resources/{}/{}/vault", kind.plural(), name),
            Some(serde_json::json!({
                "vaultVersion": expected_version,
                "vaultContent": content,
            })),
        )?;
        match value {
            None => Ok(MutationResult::failed(format!(
                "{} \"{}\" not found",
                kind.title(),
                name
            ))),
            some => Ok(Self::mutation_from(some)),
        }
    }

    fn enqueue(
        &mut self,
        function_name: &str,
        machine_name: Option<&str>,
        team_name: Option<&str>,
    ) -> Result<String> {
        let value = self
            .send(
                "POST",
                "queue",
                Some(serde_json::json!({
                    "functionName": function_name,
                    "machineName": machine_name,
                    "teamName": team_name.or(self.team.as_deref()),
                })),
            )?
            .ok_or_else(|| Error::Http("Queue endpoint returned no body".to_string()))?;
        value
            .get("taskId")
            .and_then(serde_json::Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| Error::Corrupt("queue response".to_string(), "missing taskId".to_string()))
    }

    fn queue_list(&mut self, limit: Option<usize>) -> Result<Vec<QueueItem>> {
        let path = match limit {
            Some(limit) => format!("queue?limit={}", limit),
            None => "queue".to_string(),
        };
        let Some(value) = self.send("GET", &path, None)? else {
            return Ok(Vec::new());
        };
        serde_json::from_value(value).map_err(|e| Error::Corrupt(path, e.to_string()))
    }

    fn queue_trace(&mut self, task_id: &str) -> Result<Option<QueueItem>> {
        let path = format!("queue/{}", task_id);
        match self.send("GET", &path, None)? {
            None => Ok(None),
            Some(value) => serde_json::from_value(value)
                .map(Some)
                .map_err(|e| Error::Corrupt(path, e.to_string())),
        }
    }
}
