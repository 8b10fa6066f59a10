//! Cluster endpoints.

use tracing::debug;

use crate::backend::{BackendFuture, ClusterApi, ClusterApiError};
use crate::cluster::{ClusterInfo, ClusterRequest};

use super::WorkspaceClient;
use super::types::{
    ClusterDetails, ClusterIdBody, ClusterIdResponse, CreateClusterBody, Empty,
    ListClustersResponse,
};

const GET: &str = "/api/2.0/clusters/get";
const LIST: &str = "/api/2.0/clusters/list";
const CREATE: &str = "/api/2.0/clusters/create";
const START: &str = "/api/2.0/clusters/start";
const PERMANENT_DELETE: &str = "/api/2.0/clusters/permanent-delete";

impl ClusterApi for WorkspaceClient {
    fn get<'a>(&'a self, cluster_id: &'a str) -> BackendFuture<'a, ClusterInfo, ClusterApiError> {
        Box::pin(async move {
            self.get_json::<ClusterDetails>(GET, &[("cluster_id", cluster_id)])
                .await
                .map(ClusterInfo::from)
                .map_err(|err| {
                    if err.is_not_found() {
                        ClusterApiError::NotFound {
                            cluster_id: cluster_id.to_owned(),
                        }
                    } else {
                        err.into()
                    }
                })
        })
    }

    fn list(&self) -> BackendFuture<'_, Vec<ClusterInfo>, ClusterApiError> {
        Box::pin(async move {
            let response: ListClustersResponse = self.get_json(LIST, &[]).await?;
            Ok(response
                .clusters
                .into_iter()
                .map(ClusterInfo::from)
                .collect())
        })
    }

    fn create<'a>(
        &'a self,
        request: &'a ClusterRequest,
    ) -> BackendFuture<'a, String, ClusterApiError> {
        Box::pin(async move {
            let response: ClusterIdResponse = self
                .post_json(CREATE, &CreateClusterBody::from(request))
                .await?;
            debug!(cluster_id = %response.cluster_id, "cluster create accepted");
            Ok(response.cluster_id)
        })
    }

    fn start<'a>(&'a self, cluster_id: &'a str) -> BackendFuture<'a, (), ClusterApiError> {
        Box::pin(async move {
            self.post_json::<_, Empty>(START, &ClusterIdBody { cluster_id })
                .await?;
            debug!(cluster_id, "cluster start accepted");
            Ok(())
        })
    }

    fn permanent_delete<'a>(
        &'a self,
        cluster_id: &'a str,
    ) -> BackendFuture<'a, (), ClusterApiError> {
        Box::pin(async move {
            self.post_json::<_, Empty>(PERMANENT_DELETE, &ClusterIdBody { cluster_id })
                .await?;
            Ok(())
        })
    }
}
