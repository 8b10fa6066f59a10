//! End-to-end mount workflows against in-memory collaborators.
//!
//! The cluster API, identity API, and remote command channel are replaced by
//! the doubles in `lakemount::test_support`; the command double interprets the
//! generated scripts against a per-cluster mount table.

use std::sync::Arc;
use std::time::Duration;

use lakemount::test_support::{InMemoryMountTable, RecordingInstanceProfiles, ScriptedClusterApi};
use lakemount::{
    ClusterDefaults, ClusterResolver, ClusterState, InstanceProfileArn, MountError, MountName,
    MountOrchestrator, MountRequest, MountSource, MountSpec, ReadOutcome, SharedResourceGuard,
    ValidationError, WaitPolicy,
};
use lakemount::mount::S3Credentials;
use rstest::{fixture, rstest};

const PROFILE: &str = "arn:aws:iam::123456789012:instance-profile/mounts";

type Orchestrator =
    MountOrchestrator<ScriptedClusterApi, InMemoryMountTable, RecordingInstanceProfiles>;

struct Harness {
    clusters: ScriptedClusterApi,
    table: InMemoryMountTable,
    profiles: RecordingInstanceProfiles,
    orchestrator: Orchestrator,
}

#[fixture]
fn harness() -> Harness {
    let clusters = ScriptedClusterApi::new();
    let table = InMemoryMountTable::new();
    let profiles = RecordingInstanceProfiles::new();
    let defaults = ClusterDefaults {
        spark_version: String::from("15.4.x-scala2.12"),
        node_type_id: String::from("i3.xlarge"),
        autotermination_minutes: 10,
    };
    let resolver = ClusterResolver::new(clusters.clone(), defaults).with_wait_policy(
        WaitPolicy::new(
            Duration::from_millis(200),
            Duration::from_millis(1),
            Duration::from_millis(4),
        ),
    );
    let orchestrator = MountOrchestrator::new(resolver, table.clone(), profiles.clone())
        .with_guard(Arc::new(SharedResourceGuard::new()));
    Harness {
        clusters,
        table,
        profiles,
        orchestrator,
    }
}

fn s3_request(name: &str, bucket: &str, profile: Option<&str>) -> MountRequest {
    MountRequest::new(
        MountName::new(name).expect("valid mount name"),
        MountSpec::new(MountSource::S3 {
            bucket: bucket.to_owned(),
            credentials: S3Credentials::InstanceProfile(profile.map(str::to_owned)),
        }),
    )
}

fn gcs_request(name: &str, cluster_id: &str) -> MountRequest {
    MountRequest::new(
        MountName::new(name).expect("valid mount name"),
        MountSpec::new(MountSource::Gcs {
            bucket: String::from("analytics"),
        }),
    )
    .with_cluster_id(cluster_id)
}

#[rstest]
#[tokio::test]
async fn s3_instance_profile_mount_provisions_a_credentialed_cluster(harness: Harness) {
    let request = s3_request("this_mount", "test-s3-bucket", Some(PROFILE));

    let record = harness
        .orchestrator
        .create(&request)
        .await
        .expect("create succeeds");

    assert_eq!(record.mount_point(), "/mnt/this_mount");
    assert_eq!(record.source, "s3a://test-s3-bucket");
    assert_eq!(record.cluster_id, "cluster-1");
    assert_eq!(harness.profiles.create_calls(), 1);

    let created = harness.clusters.created();
    assert_eq!(created.len(), 1);
    assert_eq!(
        created
            .first()
            .and_then(|cluster| cluster.attributes.instance_profile_arn.as_deref()),
        Some(PROFILE)
    );

    let invocations = harness.table.invocations();
    let script = &invocations.first().expect("one script ran").script;
    assert!(script.contains("s3a://test-s3-bucket"), "script: {script}");
    assert!(script.contains("{}"), "script: {script}");
    assert!(script.contains(r#""/mnt/this_mount""#), "script: {script}");
}

#[rstest]
#[tokio::test]
async fn mount_without_credential_mechanism_is_rejected_locally(harness: Harness) {
    let request = s3_request("this_mount", "test-s3-bucket", None);

    let err = harness
        .orchestrator
        .create(&request)
        .await
        .expect_err("validation fails");

    assert_eq!(
        err,
        MountError::Validation(ValidationError::MissingCredentialMechanism)
    );
    assert_eq!(
        err.to_string(),
        "Either cluster_id or instance_profile must be specified"
    );
    assert!(harness.table.invocations().is_empty());
    assert!(harness.clusters.created().is_empty());
    assert_eq!(harness.profiles.create_calls(), 0);
}

#[rstest]
#[tokio::test]
async fn malformed_instance_profile_is_rejected_locally(harness: Harness) {
    let request = s3_request("this_mount", "test-s3-bucket", Some("abc"));

    let err = harness
        .orchestrator
        .create(&request)
        .await
        .expect_err("validation fails");

    assert!(matches!(err, MountError::Validation(_)), "{err:?}");
    assert_eq!(err.to_string(), "arn: invalid prefix");
    assert!(harness.table.invocations().is_empty());
    assert!(harness.clusters.created().is_empty());
    assert_eq!(harness.clusters.get_calls(), 0);
}

#[rstest]
#[tokio::test]
async fn read_of_unknown_mount_is_not_found(harness: Harness) {
    harness
        .clusters
        .insert_cluster("existing", ClusterState::Running, None);
    harness
        .table
        .insert("existing", "/mnt/other", "gs://other");

    let outcome = harness
        .orchestrator
        .read(&gcs_request("missing", "existing"))
        .await
        .expect("read succeeds");

    assert_eq!(outcome, ReadOutcome::NotFound);
}

#[rstest]
#[tokio::test]
async fn transport_failure_on_create_keeps_message_and_records_nothing(harness: Harness) {
    harness
        .clusters
        .insert_cluster("existing", ClusterState::Running, None);
    harness
        .table
        .fail_next("HTTP 503: upstream connect error");

    let err = harness
        .orchestrator
        .create(&gcs_request("gcs", "existing"))
        .await
        .expect_err("create fails");

    assert_eq!(
        err,
        MountError::CreateFailed {
            message: String::from("HTTP 503: upstream connect error"),
        }
    );
    assert_eq!(harness.table.source("existing", "/mnt/gcs"), None);
}

#[rstest]
#[tokio::test]
async fn create_then_read_returns_the_same_source(harness: Harness) {
    harness
        .clusters
        .insert_cluster("existing", ClusterState::Running, None);
    let request = gcs_request("gcs", "existing");

    let record = harness
        .orchestrator
        .create(&request)
        .await
        .expect("create succeeds");
    let outcome = harness
        .orchestrator
        .read(&request)
        .await
        .expect("read succeeds");

    assert_eq!(
        outcome,
        ReadOutcome::Mounted {
            source: record.source
        }
    );
}

#[rstest]
#[tokio::test]
async fn delete_then_read_is_not_found_and_delete_is_idempotent(harness: Harness) {
    harness
        .clusters
        .insert_cluster("existing", ClusterState::Running, None);
    let request = gcs_request("gcs", "existing");
    harness
        .orchestrator
        .create(&request)
        .await
        .expect("create succeeds");

    harness
        .orchestrator
        .delete(&request)
        .await
        .expect("first delete succeeds");
    harness
        .orchestrator
        .delete(&request)
        .await
        .expect("second delete succeeds");

    let outcome = harness
        .orchestrator
        .read(&request)
        .await
        .expect("read succeeds");
    assert_eq!(outcome, ReadOutcome::NotFound);
}

#[rstest]
#[tokio::test]
async fn existing_mount_at_the_path_is_reported_unchanged(harness: Harness) {
    harness
        .clusters
        .insert_cluster("existing", ClusterState::Running, None);
    harness
        .table
        .insert("existing", "/mnt/gcs", "gs://previous");

    let record = harness
        .orchestrator
        .create(&gcs_request("gcs", "existing"))
        .await
        .expect("create succeeds");

    assert_eq!(record.source, "gs://previous");
}

#[rstest]
#[tokio::test]
async fn reuses_a_running_cluster_with_the_declared_profile(harness: Harness) {
    let arn = InstanceProfileArn::parse(PROFILE).expect("valid arn");
    harness
        .clusters
        .insert_cluster("shared", ClusterState::Running, Some(&arn));

    let record = harness
        .orchestrator
        .create(&s3_request("reuse", "bucket", Some(PROFILE)))
        .await
        .expect("create succeeds");

    assert_eq!(record.cluster_id, "shared");
    assert!(harness.clusters.created().is_empty());
}

#[rstest]
#[tokio::test]
async fn named_cluster_that_is_not_running_is_unavailable(harness: Harness) {
    harness
        .clusters
        .insert_cluster("stopped", ClusterState::Terminated, None);

    let err = harness
        .orchestrator
        .create(&gcs_request("gcs", "stopped"))
        .await
        .expect_err("cluster is unavailable");

    let MountError::ClusterUnavailable { ref cluster_id, .. } = err else {
        panic!("expected an unavailable cluster, got {err:?}");
    };
    assert_eq!(cluster_id, "stopped");
    assert!(harness.table.invocations().is_empty());
}

#[rstest]
#[tokio::test]
async fn failed_registration_is_memoized_per_profile(harness: Harness) {
    harness.profiles.fail_with("access denied");
    let request = s3_request("denied", "bucket", Some(PROFILE));

    for _ in 0..2 {
        let err = harness
            .orchestrator
            .create(&request)
            .await
            .expect_err("registration fails");
        assert_eq!(
            err,
            MountError::SharedResourceUnavailable {
                identity: String::from(PROFILE),
            }
        );
    }

    assert_eq!(harness.profiles.create_calls(), 1);
    assert!(harness.clusters.created().is_empty());
}

#[rstest]
#[tokio::test]
async fn registration_can_be_disabled(harness: Harness) {
    let orchestrator = harness.orchestrator.with_instance_profile_registration(false);

    orchestrator
        .create(&s3_request("unregistered", "bucket", Some(PROFILE)))
        .await
        .expect("create succeeds");

    assert_eq!(harness.profiles.create_calls(), 0);
}

#[rstest]
#[tokio::test]
async fn unregistering_a_profile_reaches_the_identity_api(harness: Harness) {
    let arn = InstanceProfileArn::parse(PROFILE).expect("valid arn");

    harness
        .orchestrator
        .unregister_instance_profile(&arn)
        .await
        .expect("unregister succeeds");

    assert_eq!(harness.profiles.delete_calls(), 1);
    assert_eq!(harness.profiles.create_calls(), 0);
}

#[rstest]
#[tokio::test]
async fn autoterminated_mounting_cluster_is_restarted(harness: Harness) {
    let arn = InstanceProfileArn::parse(PROFILE).expect("valid arn");
    harness
        .clusters
        .insert_cluster("lakemount-mounts", ClusterState::Terminated, Some(&arn));

    let record = harness
        .orchestrator
        .create(&s3_request("restarted", "test-s3-bucket", Some(PROFILE)))
        .await
        .expect("create succeeds");

    assert_eq!(record.cluster_id, "lakemount-mounts");
    assert_eq!(
        harness.clusters.started(),
        vec![String::from("lakemount-mounts")]
    );
    assert!(harness.clusters.created().is_empty());
}
