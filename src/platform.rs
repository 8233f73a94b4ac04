//! Platform API access.
//!
//! The driver talks to the platform through the [`Platform`] trait:
//! provisioning the shared volume, resolving the execution's display name,
//! and uploading files to platform storage. [`LatchPlatform`] is the HTTP
//! implementation used in production.

use serde::Deserialize;
use serde_json::{Value, json};
use std::path::Path;
use tracing::{debug, info};

use crate::config::RuntimeConfig;
use crate::error::{Result, WorkflowError};

/// Authorization scheme for execution tokens
pub const TOKEN_SCHEME: &str = "Latch-Execution-Token";

const EXECUTION_NAME_QUERY: &str = "query executionCreatorsByToken($token: String!) {
  executionCreatorByToken(token: $token) {
    flytedbId
    info {
      displayName
    }
  }
}";

/// Operations the workflow needs from the compute platform.
pub trait Platform {
    /// Provision a shared volume of `storage_gib` GiB and return its name.
    fn provision_storage(&self, token: &str, storage_gib: u32) -> Result<String>;

    /// Display name of the current execution, `None` if the platform has none.
    fn execution_name(&self, token: &str) -> Result<Option<String>>;

    /// Upload a local file to a `latch://` destination.
    fn upload(&self, token: &str, local: &Path, remote: &str) -> Result<()>;
}

#[derive(Debug, Deserialize)]
struct ProvisionResponse {
    name: String,
}

#[derive(Debug, Deserialize)]
struct StartUploadResponse {
    data: StartUploadData,
}

#[derive(Debug, Deserialize)]
struct StartUploadData {
    upload_id: String,
    urls: Vec<String>,
}

/// HTTP client for the Latch platform APIs
pub struct LatchPlatform {
    agent: ureq::Agent,
    provision_url: String,
    graphql_url: String,
    data_api_url: String,
}

impl LatchPlatform {
    pub fn from_config(config: &RuntimeConfig) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(config.http_timeout())
            .build();
        Self {
            agent,
            provision_url: config.provision_url.clone(),
            graphql_url: config.graphql_url.clone(),
            data_api_url: config.data_api_url.trim_end_matches('/').to_string(),
        }
    }

    fn post_json(&self, url: &str, token: &str, body: Value) -> std::result::Result<ureq::Response, String> {
        self.agent
            .post(url)
            .set("Authorization", &format!("{} {}", TOKEN_SCHEME, token))
            .send_json(body)
            .map_err(describe)
    }
}

/// Human-readable form of a failed request, including the body of HTTP errors
fn describe(err: ureq::Error) -> String {
    match err {
        ureq::Error::Status(code, response) => {
            let body = response.into_string().unwrap_or_default();
            format!("HTTP {}: {}", code, body.trim())
        }
        ureq::Error::Transport(transport) => transport.to_string(),
    }
}

impl Platform for LatchPlatform {
    fn provision_storage(&self, token: &str, storage_gib: u32) -> Result<String> {
        info!("Provisioning shared storage volume ({} GiB)...", storage_gib);
        let response = self
            .post_json(&self.provision_url, token, json!({ "storage_gib": storage_gib }))
            .map_err(WorkflowError::provisioning)?;

        let body: ProvisionResponse = response
            .into_json()
            .map_err(|e| WorkflowError::provisioning(format!("invalid response body: {}", e)))?;
        info!("Provisioned storage volume {}", body.name);
        Ok(body.name)
    }

    fn execution_name(&self, token: &str) -> Result<Option<String>> {
        let response = self
            .post_json(
                &self.graphql_url,
                token,
                json!({ "query": EXECUTION_NAME_QUERY, "variables": { "token": token } }),
            )
            .map_err(WorkflowError::platform)?;

        let body: Value = response
            .into_json()
            .map_err(|e| WorkflowError::platform(format!("invalid response body: {}", e)))?;
        let name = body
            .pointer("/data/executionCreatorByToken/info/displayName")
            .and_then(Value::as_str)
            .filter(|name| !name.is_empty())
            .map(str::to_string);
        debug!("Resolved execution name: {:?}", name);
        Ok(name)
    }

    fn upload(&self, token: &str, local: &Path, remote: &str) -> Result<()> {
        let bytes = std::fs::read(local)?;

        let start: StartUploadResponse = self
            .post_json(
                &format!("{}/ldata/start-upload", self.data_api_url),
                token,
                json!({ "path": remote, "content_type": "text/plain", "part_count": 1 }),
            )
            .map_err(WorkflowError::platform)?
            .into_json()
            .map_err(|e| WorkflowError::platform(format!("invalid start-upload response: {}", e)))?;

        let part_url = start.data.urls.first().ok_or_else(|| {
            WorkflowError::platform("start-upload returned no part URLs")
        })?;

        let put = self
            .agent
            .put(part_url)
            .send_bytes(&bytes)
            .map_err(|e| WorkflowError::platform(describe(e)))?;
        let etag = put
            .header("ETag")
            .ok_or_else(|| WorkflowError::platform("part upload returned no ETag"))?
            .to_string();

        self.post_json(
            &format!("{}/ldata/end-upload", self.data_api_url),
            token,
            json!({
                "path": remote,
                "upload_id": start.data.upload_id,
                "parts": [{ "ETag": etag, "PartNumber": 1 }],
            }),
        )
        .map_err(WorkflowError::platform)?;

        debug!("Uploaded {} bytes to {}", bytes.len(), remote);
        Ok(())
    }
}
