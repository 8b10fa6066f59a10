//! REST adapter behaviour exercised against a local stub of the workspace API.

use std::time::Duration;

use lakemount::{CommandExecutor, InstanceProfileApi, InstanceProfileArn, WorkspaceClient};
use mockito::{Matcher, Mock, Server, ServerGuard};
use rstest::rstest;

const CLUSTER: &str = "0101-abc";

async fn stub(
    server: &mut ServerGuard,
    method: &str,
    path: &str,
    status: usize,
    body: &str,
) -> Mock {
    server
        .mock(method, path)
        .match_query(Matcher::Any)
        .with_status(status)
        .with_header("content-type", "application/json")
        .with_body(body)
        .create_async()
        .await
}

async fn context_created(server: &mut ServerGuard) -> Mock {
    stub(
        server,
        "POST",
        "/api/1.2/contexts/create",
        200,
        r#"{"id":"ctx-1"}"#,
    )
    .await
}

async fn context_destroyed(server: &mut ServerGuard) -> Mock {
    server
        .mock("POST", "/api/1.2/contexts/destroy")
        .match_body(Matcher::PartialJsonString(String::from(
            r#"{"clusterId":"0101-abc","contextId":"ctx-1"}"#,
        )))
        .with_status(200)
        .with_body("{}")
        .expect(1)
        .create_async()
        .await
}

fn client(server: &ServerGuard, timeout: Duration) -> WorkspaceClient {
    WorkspaceClient::new(&server.url(), "dapi-test", timeout)
        .expect("client builds")
        .with_command_poll_interval(Duration::from_millis(5))
}

#[rstest]
#[tokio::test]
async fn failed_context_start_still_destroys_context() {
    let mut server = Server::new_async().await;
    let _create = context_created(&mut server).await;
    let _status = stub(
        &mut server,
        "GET",
        "/api/1.2/contexts/status",
        200,
        r#"{"status":"Error"}"#,
    )
    .await;
    let destroy = context_destroyed(&mut server).await;

    let err = client(&server, Duration::from_secs(5))
        .execute(CLUSTER, "print(1)")
        .await
        .expect_err("context never starts");

    assert_eq!(err.message, "execution context ctx-1 failed to start");
    destroy.assert_async().await;
}

#[rstest]
#[tokio::test]
async fn context_status_api_error_still_destroys_context() {
    let mut server = Server::new_async().await;
    let _create = context_created(&mut server).await;
    let _status = stub(
        &mut server,
        "GET",
        "/api/1.2/contexts/status",
        500,
        r#"{"error_code":"INTERNAL_ERROR","message":"status lookup failed"}"#,
    )
    .await;
    let destroy = context_destroyed(&mut server).await;

    let err = client(&server, Duration::from_secs(5))
        .execute(CLUSTER, "print(1)")
        .await
        .expect_err("status lookup fails");

    assert_eq!(err.message, "status lookup failed");
    destroy.assert_async().await;
}

#[rstest]
#[tokio::test]
async fn pending_context_times_out_and_is_destroyed() {
    let mut server = Server::new_async().await;
    let _create = context_created(&mut server).await;
    let _status = stub(
        &mut server,
        "GET",
        "/api/1.2/contexts/status",
        200,
        r#"{"status":"Pending"}"#,
    )
    .await;
    let destroy = context_destroyed(&mut server).await;

    let err = client(&server, Duration::from_millis(50))
        .execute(CLUSTER, "print(1)")
        .await
        .expect_err("context stays pending");

    assert!(
        err.message.contains("waiting for execution context"),
        "{}",
        err.message
    );
    destroy.assert_async().await;
}

#[rstest]
#[tokio::test]
async fn cancelled_command_is_an_error_and_context_is_destroyed() {
    let mut server = Server::new_async().await;
    let _create = context_created(&mut server).await;
    let _context = stub(
        &mut server,
        "GET",
        "/api/1.2/contexts/status",
        200,
        r#"{"status":"Running"}"#,
    )
    .await;
    let _execute = stub(
        &mut server,
        "POST",
        "/api/1.2/commands/execute",
        200,
        r#"{"id":"cmd-1"}"#,
    )
    .await;
    let _command = stub(
        &mut server,
        "GET",
        "/api/1.2/commands/status",
        200,
        r#"{"status":"Cancelled"}"#,
    )
    .await;
    let destroy = context_destroyed(&mut server).await;

    let err = client(&server, Duration::from_secs(5))
        .execute(CLUSTER, "print(1)")
        .await
        .expect_err("command was cancelled");

    assert_eq!(err.message, "command cmd-1 was cancelled");
    destroy.assert_async().await;
}

#[rstest]
#[tokio::test]
async fn unbounded_timeout_runs_command_to_completion() {
    let mut server = Server::new_async().await;
    let _create = context_created(&mut server).await;
    let _context = stub(
        &mut server,
        "GET",
        "/api/1.2/contexts/status",
        200,
        r#"{"status":"Running"}"#,
    )
    .await;
    let _execute = stub(
        &mut server,
        "POST",
        "/api/1.2/commands/execute",
        200,
        r#"{"id":"cmd-1"}"#,
    )
    .await;
    let _command = stub(
        &mut server,
        "GET",
        "/api/1.2/commands/status",
        200,
        r#"{"status":"Finished","results":{"resultType":"text","data":"s3a://test-s3-bucket"}}"#,
    )
    .await;
    let destroy = context_destroyed(&mut server).await;

    let output = client(&server, Duration::from_secs(u64::MAX))
        .execute(CLUSTER, "print(1)")
        .await
        .expect("command finishes");

    assert_eq!(output, "s3a://test-s3-bucket");
    destroy.assert_async().await;
}

fn profile() -> InstanceProfileArn {
    InstanceProfileArn::parse("arn:aws:iam::123456789012:instance-profile/mounts")
        .expect("valid arn")
}

#[rstest]
#[tokio::test]
async fn registering_a_known_profile_succeeds() {
    let mut server = Server::new_async().await;
    let add = stub(
        &mut server,
        "POST",
        "/api/2.0/instance-profiles/add",
        400,
        r#"{"error_code":"INVALID_PARAMETER_VALUE","message":"Instance profile already exists"}"#,
    )
    .await;

    client(&server, Duration::from_secs(5))
        .create(&profile())
        .await
        .expect("already registered counts as success");
    add.assert_async().await;
}

#[rstest]
#[tokio::test]
async fn removing_an_unknown_profile_succeeds() {
    let mut server = Server::new_async().await;
    let remove = stub(
        &mut server,
        "POST",
        "/api/2.0/instance-profiles/remove",
        404,
        r#"{"error_code":"RESOURCE_DOES_NOT_EXIST","message":"no such profile"}"#,
    )
    .await;

    client(&server, Duration::from_secs(5))
        .delete(&profile())
        .await
        .expect("already removed counts as success");
    remove.assert_async().await;
}

#[rstest]
#[tokio::test]
async fn removal_failure_names_the_profile() {
    let mut server = Server::new_async().await;
    let _remove = stub(
        &mut server,
        "POST",
        "/api/2.0/instance-profiles/remove",
        403,
        r#"{"error_code":"PERMISSION_DENIED","message":"admin only"}"#,
    )
    .await;

    let err = client(&server, Duration::from_secs(5))
        .delete(&profile())
        .await
        .expect_err("permission denied");
    assert_eq!(err.arn, "arn:aws:iam::123456789012:instance-profile/mounts");
    assert!(err.message.contains("admin only"), "{}", err.message);
}
