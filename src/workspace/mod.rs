//! REST client for the workspace that hosts clusters and runs mount scripts.
//!
//! [`WorkspaceClient`] implements [`crate::ClusterApi`],
//! [`crate::CommandExecutor`], and [`crate::InstanceProfileApi`] against the
//! workspace's JSON endpoints using bearer token authentication.

use std::time::Duration;

use reqwest::{Client, Response};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::trace;

use crate::config::WorkspaceConfig;

mod clusters;
mod commands;
mod error;
mod instance_profiles;
mod types;

pub use error::WorkspaceError;

use types::ApiErrorBody;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
const COMMAND_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Authenticated client for a single workspace.
#[derive(Clone, Debug)]
pub struct WorkspaceClient {
    http: Client,
    base_url: String,
    token: String,
    command_timeout: Duration,
    command_poll_interval: Duration,
}

impl WorkspaceClient {
    /// Builds a client from validated configuration.
    ///
    /// # Errors
    ///
    /// Returns [`WorkspaceError::Client`] when the HTTP client cannot be
    /// constructed.
    pub fn from_config(config: &WorkspaceConfig) -> Result<Self, WorkspaceError> {
        Self::new(config.base_url(), &config.token, config.command_timeout())
    }

    /// Builds a client for `base_url` authenticated with `token`.
    ///
    /// # Errors
    ///
    /// Returns [`WorkspaceError::Client`] when the HTTP client cannot be
    /// constructed.
    pub fn new(
        base_url: &str,
        token: &str,
        command_timeout: Duration,
    ) -> Result<Self, WorkspaceError> {
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|err| WorkspaceError::Client(err.to_string()))?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_owned(),
            token: token.to_owned(),
            command_timeout,
            command_poll_interval: COMMAND_POLL_INTERVAL,
        })
    }

    /// Overrides the delay between command status polls.
    #[must_use]
    pub const fn with_command_poll_interval(mut self, interval: Duration) -> Self {
        self.command_poll_interval = interval;
        self
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}{endpoint}", self.base_url)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        query: &[(&str, &str)],
    ) -> Result<T, WorkspaceError> {
        trace!(endpoint, "GET");
        let response = self
            .http
            .get(self.url(endpoint))
            .bearer_auth(&self.token)
            .query(query)
            .send()
            .await
            .map_err(|err| WorkspaceError::Transport {
                endpoint: endpoint.to_owned(),
                message: err.to_string(),
            })?;
        decode(endpoint, response).await
    }

    async fn post_json<B: Serialize + Sync, T: DeserializeOwned>(
        &self,
        endpoint: &str,
        body: &B,
    ) -> Result<T, WorkspaceError> {
        trace!(endpoint, "POST");
        let response = self
            .http
            .post(self.url(endpoint))
            .bearer_auth(&self.token)
            .json(body)
            .send()
            .await
            .map_err(|err| WorkspaceError::Transport {
                endpoint: endpoint.to_owned(),
                message: err.to_string(),
            })?;
        decode(endpoint, response).await
    }
}

async fn decode<T: DeserializeOwned>(
    endpoint: &str,
    response: Response,
) -> Result<T, WorkspaceError> {
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|err| WorkspaceError::Transport {
            endpoint: endpoint.to_owned(),
            message: err.to_string(),
        })?;

    if !status.is_success() {
        let parsed: ApiErrorBody = serde_json::from_str(&body).unwrap_or_default();
        let message = if parsed.message.is_empty() {
            body
        } else {
            parsed.message
        };
        return Err(WorkspaceError::Api {
            endpoint: endpoint.to_owned(),
            status: status.as_u16(),
            error_code: parsed.error_code,
            message,
        });
    }

    let payload = if body.trim().is_empty() { "{}" } else { body.as_str() };
    serde_json::from_str(payload).map_err(|err| WorkspaceError::Decode {
        endpoint: endpoint.to_owned(),
        message: err.to_string(),
    })
}
