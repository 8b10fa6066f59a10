//! Tests for workspace configuration and mount declaration loading.

use std::time::Duration;

use camino::Utf8PathBuf;
use cap_std::{ambient_authority, fs_utf8::Dir};
use lakemount::{
    ConfigError, CredentialRequirement, DeclarationError, InstanceProfileArn, MountSource,
    ValidationError, WorkspaceConfig, load_declaration,
};
use rstest::*;
use tempfile::TempDir;

#[fixture]
fn valid_config() -> WorkspaceConfig {
    WorkspaceConfig {
        host: String::from("https://dbc-1234.cloud.databricks.com"),
        token: String::from("dapi0123456789"),
        spark_version: String::from("15.4.x-scala2.12"),
        node_type_id: String::from("i3.xlarge"),
        autotermination_minutes: 10,
        provision_timeout_secs: 1200,
        poll_interval_secs: 10,
        max_poll_interval_secs: 60,
        command_timeout_secs: 600,
        register_instance_profiles: false,
    }
}

/// Verifies that validation produces actionable errors mentioning both the
/// environment variable and configuration file for each required field.
#[rstest]
#[case::host(|cfg: &mut WorkspaceConfig| cfg.host.clear(), "LAKEMOUNT_HOST", "host")]
#[case::token(|cfg: &mut WorkspaceConfig| cfg.token.clear(), "LAKEMOUNT_TOKEN", "token")]
#[case::spark_version(
    |cfg: &mut WorkspaceConfig| cfg.spark_version.clear(),
    "LAKEMOUNT_SPARK_VERSION",
    "spark_version"
)]
#[case::node_type(
    |cfg: &mut WorkspaceConfig| cfg.node_type_id.clear(),
    "LAKEMOUNT_NODE_TYPE_ID",
    "node_type_id"
)]
fn config_validation_produces_actionable_errors(
    mut valid_config: WorkspaceConfig,
    #[case] mutate: fn(&mut WorkspaceConfig),
    #[case] env_var: &str,
    #[case] toml_key: &str,
) {
    mutate(&mut valid_config);
    let error = valid_config.validate().expect_err("validation should fail");
    let ConfigError::MissingField(ref message) = error else {
        panic!("expected MissingField error, got {error:?}");
    };
    assert!(
        message.contains(env_var),
        "error should mention env var {env_var}: {message}"
    );
    assert!(
        message.contains("lakemount.toml"),
        "error should mention config file: {message}"
    );
    assert!(
        message.contains(toml_key),
        "error should mention TOML key {toml_key}: {message}"
    );
}

#[rstest]
fn config_drives_provisioning_defaults(valid_config: WorkspaceConfig) {
    let defaults = valid_config.cluster_defaults();
    assert_eq!(defaults.spark_version, "15.4.x-scala2.12");
    assert_eq!(defaults.node_type_id, "i3.xlarge");
    assert_eq!(defaults.autotermination_minutes, 10);
    assert_eq!(valid_config.command_timeout(), Duration::from_secs(600));
}

fn write_declaration(contents: &str) -> (TempDir, Utf8PathBuf) {
    let tmp = TempDir::new().unwrap_or_else(|err| panic!("tempdir: {err}"));
    let root =
        Utf8PathBuf::from_path_buf(tmp.path().to_path_buf()).unwrap_or_else(|non_utf8_path| {
            panic!("temp dir should be utf8: {}", non_utf8_path.display())
        });
    Dir::open_ambient_dir(&root, ambient_authority())
        .unwrap_or_else(|err| panic!("open temp dir: {err}"))
        .write("mount.toml", contents)
        .unwrap_or_else(|err| panic!("write declaration: {err}"));
    (tmp, root.join("mount.toml"))
}

#[test]
fn declaration_with_instance_profile_targets_matching_clusters() {
    let (_tmp, path) = write_declaration(
        r#"
mount_name = "this_mount"

[s3]
bucket_name = "test-s3-bucket"
instance_profile = "arn:aws:iam::123456789012:instance-profile/mounts"
"#,
    );

    let request = load_declaration(&path)
        .and_then(|declaration| declaration.into_request().map_err(DeclarationError::from))
        .unwrap_or_else(|err| panic!("declaration should load: {err}"));

    assert_eq!(request.name.mount_point(), "/mnt/this_mount");
    assert!(matches!(request.spec.source, MountSource::S3 { .. }));
    let target = request
        .cluster_target()
        .unwrap_or_else(|err| panic!("target should resolve: {err}"));
    let arn = InstanceProfileArn::parse("arn:aws:iam::123456789012:instance-profile/mounts")
        .unwrap_or_else(|err| panic!("valid arn: {err}"));
    assert_eq!(target.cluster_id, None);
    assert_eq!(target.requirement, CredentialRequirement::InstanceProfile(arn));
    assert_eq!(target.provisioned_cluster_name(), "lakemount-mounts");
}

#[test]
fn declaration_with_two_sources_is_rejected() {
    let (_tmp, path) = write_declaration(
        r#"
mount_name = "ambiguous"
cluster_id = "0101-abc"

[gcs]
bucket_name = "analytics"

[s3]
bucket_name = "test-s3-bucket"
"#,
    );

    let declaration =
        load_declaration(&path).unwrap_or_else(|err| panic!("declaration should parse: {err}"));
    assert_eq!(
        declaration.into_request(),
        Err(ValidationError::MultipleSources { count: 2 })
    );
}
