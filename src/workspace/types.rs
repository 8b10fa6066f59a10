//! Wire types for the workspace REST API.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::cluster::{ClusterAttributes, ClusterInfo, ClusterRequest, ClusterState};

#[derive(Debug, Default, Deserialize)]
pub(super) struct ApiErrorBody {
    #[serde(default)]
    pub error_code: String,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Default, Deserialize)]
pub(super) struct Empty {}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub(super) struct AwsAttributes {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance_profile_arn: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(super) struct ClusterDetails {
    pub cluster_id: String,
    #[serde(default)]
    pub cluster_name: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub state_message: String,
    #[serde(default)]
    pub aws_attributes: Option<AwsAttributes>,
}

impl From<ClusterDetails> for ClusterInfo {
    fn from(details: ClusterDetails) -> Self {
        Self {
            state: ClusterState::from_api(&details.state),
            cluster_id: details.cluster_id,
            cluster_name: details.cluster_name,
            state_message: details.state_message,
            attributes: ClusterAttributes {
                instance_profile_arn: details
                    .aws_attributes
                    .and_then(|attributes| attributes.instance_profile_arn),
            },
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub(super) struct ListClustersResponse {
    #[serde(default)]
    pub clusters: Vec<ClusterDetails>,
}

#[derive(Debug, Serialize)]
pub(super) struct CreateClusterBody<'a> {
    pub cluster_name: &'a str,
    pub spark_version: &'a str,
    pub node_type_id: &'a str,
    pub num_workers: u32,
    pub autotermination_minutes: u32,
    pub spark_conf: &'a BTreeMap<String, String>,
    pub custom_tags: &'a BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aws_attributes: Option<AwsAttributes>,
}

impl<'a> From<&'a ClusterRequest> for CreateClusterBody<'a> {
    fn from(request: &'a ClusterRequest) -> Self {
        Self {
            cluster_name: &request.cluster_name,
            spark_version: &request.spark_version,
            node_type_id: &request.node_type_id,
            num_workers: request.num_workers,
            autotermination_minutes: request.autotermination_minutes,
            spark_conf: &request.spark_conf,
            custom_tags: &request.custom_tags,
            aws_attributes: request.attributes.instance_profile_arn.as_ref().map(|arn| {
                AwsAttributes {
                    instance_profile_arn: Some(arn.clone()),
                }
            }),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(super) struct ClusterIdResponse {
    pub cluster_id: String,
}

#[derive(Debug, Serialize)]
pub(super) struct ClusterIdBody<'a> {
    pub cluster_id: &'a str,
}

#[derive(Debug, Serialize)]
pub(super) struct InstanceProfileBody<'a> {
    pub instance_profile_arn: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct CreateContextBody<'a> {
    pub cluster_id: &'a str,
    pub language: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct ContextBody<'a> {
    pub cluster_id: &'a str,
    pub context_id: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct ExecuteBody<'a> {
    pub cluster_id: &'a str,
    pub context_id: &'a str,
    pub language: &'static str,
    pub command: &'a str,
}

#[derive(Debug, Deserialize)]
pub(super) struct IdResponse {
    pub id: String,
}

#[derive(Debug, Deserialize)]
pub(super) struct StatusResponse {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub results: Option<CommandResults>,
}

#[derive(Debug, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub(super) struct CommandResults {
    #[serde(default)]
    pub result_type: String,
    #[serde(default)]
    pub data: Value,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub cause: Option<String>,
}

impl CommandResults {
    /// Converts the command results into output text or an error message.
    pub(super) fn into_output(self) -> Result<String, String> {
        if self.result_type == "error" {
            let message = self
                .summary
                .filter(|summary| !summary.trim().is_empty())
                .or(self.cause)
                .unwrap_or_else(|| String::from("remote command failed without a message"));
            return Err(message);
        }
        Ok(match self.data {
            Value::Null => String::new(),
            Value::String(text) => text,
            other => other.to_string(),
        })
    }
}
