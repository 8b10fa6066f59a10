//! Instance profile registration endpoints.

use tracing::debug;

use crate::backend::{BackendFuture, IdentityError, InstanceProfileApi};
use crate::credentials::InstanceProfileArn;

use super::WorkspaceClient;
use super::types::{Empty, InstanceProfileBody};

const ADD: &str = "/api/2.0/instance-profiles/add";
const REMOVE: &str = "/api/2.0/instance-profiles/remove";

impl InstanceProfileApi for WorkspaceClient {
    fn create<'a>(&'a self, arn: &'a InstanceProfileArn) -> BackendFuture<'a, (), IdentityError> {
        Box::pin(async move {
            let body = InstanceProfileBody {
                instance_profile_arn: arn.as_str(),
            };
            match self.post_json::<_, Empty>(ADD, &body).await {
                Ok(_) => Ok(()),
                Err(err) if err.is_already_exists() => {
                    debug!(%arn, "instance profile already registered");
                    Ok(())
                }
                Err(err) => Err(err.into_identity_error(arn.as_str())),
            }
        })
    }
    fn delete<'a>(&'a self, arn: &'a InstanceProfileArn) -> BackendFuture<'a, (), IdentityError> {
        Box::pin(async move {
            let body = InstanceProfileBody {
                instance_profile_arn: arn.as_str(),
            };
            match self.post_json::<_, Empty>(REMOVE, &body).await {
                Ok(_) => Ok(()),
                Err(err) if err.is_not_found() => {
                    debug!(%arn, "instance profile already removed");
                    Ok(())
                }
                Err(err) => Err(err.into_identity_error(arn.as_str())),
            }
        })
    }
}
