//! Remote command execution through execution contexts.
//!
//! Each script runs in a fresh Python context that is destroyed afterwards,
//! so no interpreter state leaks between mount operations.

use std::time::{Duration, Instant};

use tokio::time::sleep;
use tracing::{debug, warn};

use crate::backend::BackendFuture;
use crate::command::{CommandError, CommandExecutor};

use super::types::{
    ContextBody, CreateContextBody, Empty, ExecuteBody, IdResponse, StatusResponse,
};
use super::{WorkspaceClient, WorkspaceError};

const LANGUAGE: &str = "python";
const CONTEXT_CREATE: &str = "/api/1.2/contexts/create";
const CONTEXT_STATUS: &str = "/api/1.2/contexts/status";
const CONTEXT_DESTROY: &str = "/api/1.2/contexts/destroy";
const COMMAND_EXECUTE: &str = "/api/1.2/commands/execute";
const COMMAND_STATUS: &str = "/api/1.2/commands/status";

impl CommandExecutor for WorkspaceClient {
    fn execute<'a>(
        &'a self,
        cluster_id: &'a str,
        script: &'a str,
    ) -> BackendFuture<'a, String, CommandError> {
        Box::pin(async move {
            // A timeout past the end of the clock means polling without a deadline.
            let deadline = Instant::now().checked_add(self.command_timeout);
            let context_id = self.create_context(cluster_id).await?;
            let outcome = self
                .run_when_ready(cluster_id, &context_id, script, deadline)
                .await;
            self.destroy_context(cluster_id, &context_id).await;
            outcome
        })
    }
}

impl WorkspaceClient {
    async fn create_context(&self, cluster_id: &str) -> Result<String, CommandError> {
        let created: IdResponse = self
            .post_json(
                CONTEXT_CREATE,
                &CreateContextBody {
                    cluster_id,
                    language: LANGUAGE,
                },
            )
            .await?;
        debug!(cluster_id, context_id = %created.id, "execution context created");
        Ok(created.id)
    }

    async fn run_when_ready(
        &self,
        cluster_id: &str,
        context_id: &str,
        script: &str,
        deadline: Option<Instant>,
    ) -> Result<String, CommandError> {
        self.wait_for_context(cluster_id, context_id, deadline).await?;
        self.run_in_context(cluster_id, context_id, script, deadline).await
    }

    async fn wait_for_context(
        &self,
        cluster_id: &str,
        context_id: &str,
        deadline: Option<Instant>,
    ) -> Result<(), CommandError> {
        loop {
            let status: StatusResponse = self
                .get_json(
                    CONTEXT_STATUS,
                    &[("clusterId", cluster_id), ("contextId", context_id)],
                )
                .await?;
            match status.status.as_str() {
                "Running" => return Ok(()),
                "Error" => {
                    return Err(CommandError::new(format!(
                        "execution context {context_id} failed to start"
                    )));
                }
                _ => {}
            }
            self.pause_until(deadline, "execution context").await?;
        }
    }

    async fn destroy_context(&self, cluster_id: &str, context_id: &str) {
        let body = ContextBody {
            cluster_id,
            context_id,
        };
        if let Err(err) = self.post_json::<_, Empty>(CONTEXT_DESTROY, &body).await {
            warn!(cluster_id, context_id, error = %err, "failed to destroy context");
        }
    }

    async fn run_in_context(
        &self,
        cluster_id: &str,
        context_id: &str,
        script: &str,
        deadline: Option<Instant>,
    ) -> Result<String, CommandError> {
        let submitted: IdResponse = self
            .post_json(
                COMMAND_EXECUTE,
                &ExecuteBody {
                    cluster_id,
                    context_id,
                    language: LANGUAGE,
                    command: script,
                },
            )
            .await?;
        debug!(cluster_id, command_id = %submitted.id, "command submitted");

        loop {
            let status: StatusResponse = self
                .get_json(
                    COMMAND_STATUS,
                    &[
                        ("clusterId", cluster_id),
                        ("contextId", context_id),
                        ("commandId", submitted.id.as_str()),
                    ],
                )
                .await?;
            match status.status.as_str() {
                "Finished" | "Error" => {
                    return status
                        .results
                        .unwrap_or_default()
                        .into_output()
                        .map_err(CommandError::new);
                }
                "Cancelled" | "Cancelling" => {
                    return Err(CommandError::new(format!(
                        "command {} was cancelled",
                        submitted.id
                    )));
                }
                _ => {}
            }
            self.pause_until(deadline, "remote command").await?;
        }
    }

    async fn pause_until(
        &self,
        deadline: Option<Instant>,
        what: &str,
    ) -> Result<(), WorkspaceError> {
        let remaining = deadline.map_or(Duration::MAX, |until| {
            until.saturating_duration_since(Instant::now())
        });
        if remaining.is_zero() {
            return Err(WorkspaceError::Timeout {
                what: what.to_owned(),
                waited_secs: self.command_timeout.as_secs(),
            });
        }
        sleep(self.command_poll_interval.min(remaining)).await;
        Ok(())
    }
}
