//! Python scripts executed inside the cluster to manage mounts.
//!
//! Every value embedded in a script is rendered as a JSON literal, which is
//! also a valid Python string or dict literal.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use super::MountDescription;

/// Marker raised by the read script when no mount matches.
pub const MOUNT_NOT_FOUND: &str = "Mount not found";

/// Value the delete script exits with on success.
pub const DELETE_SUCCESS: &str = "success";

/// Renders the create script for `mount_point`.
///
/// An existing mount at the same path is left untouched and its source is
/// returned. A failed mount attempts an unmount before re-raising.
#[must_use]
pub fn create_script(mount_point: &str, description: &MountDescription) -> String {
    format!(
        r#"def safe_mount(mount_point, mount_source, configs):
    for mount in dbutils.fs.mounts():
        if mount.mountPoint == mount_point:
            return mount.source
    try:
        dbutils.fs.mount(mount_source, mount_point, extra_configs=configs)
        dbutils.fs.refreshMounts()
        dbutils.fs.ls(mount_point)
        return mount_source
    except Exception as e:
        try:
            dbutils.fs.unmount(mount_point)
        except Exception as e2:
            print("Failed to unmount", e2)
        raise e

mount_source = safe_mount({mount_point}, {source}, {configs})
dbutils.notebook.exit(mount_source)
"#,
        mount_point = literal(mount_point),
        source = literal(&description.source),
        configs = config_literal(&description.configs),
    )
}

/// Renders the script that reports the source mounted at `mount_point`.
#[must_use]
pub fn read_script(mount_point: &str) -> String {
    format!(
        r#"dbutils.fs.refreshMounts()
for mount in dbutils.fs.mounts():
    if mount.mountPoint == {mount_point}:
        dbutils.notebook.exit(mount.source)
raise Exception({not_found})
"#,
        mount_point = literal(mount_point),
        not_found = literal(MOUNT_NOT_FOUND),
    )
}

/// Renders the script that unmounts `mount_point` when present.
#[must_use]
pub fn delete_script(mount_point: &str) -> String {
    format!(
        r#"mount_point = {mount_point}
dbutils.fs.refreshMounts()
if any(mount.mountPoint == mount_point for mount in dbutils.fs.mounts()):
    dbutils.fs.unmount(mount_point)
    dbutils.fs.refreshMounts()
dbutils.notebook.exit({success})
"#,
        mount_point = literal(mount_point),
        success = literal(DELETE_SUCCESS),
    )
}

fn literal(value: &str) -> String {
    Value::String(value.to_owned()).to_string()
}

fn config_literal(configs: &BTreeMap<String, String>) -> String {
    let map: Map<String, Value> = configs
        .iter()
        .map(|(key, value)| (key.clone(), Value::String(value.clone())))
        .collect();
    Value::Object(map).to_string()
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    fn create_script_embeds_source_and_empty_config() {
        let description = MountDescription {
            source: String::from("s3a://test-s3-bucket"),
            configs: BTreeMap::new(),
        };
        let script = create_script("/mnt/this_mount", &description);
        assert!(script.starts_with("def safe_mount"));
        assert!(script.contains(
            r#"safe_mount("/mnt/this_mount", "s3a://test-s3-bucket", {})"#
        ));
    }

    #[rstest]
    fn create_script_escapes_config_values() {
        let description = MountDescription {
            source: String::from("gs://bucket"),
            configs: BTreeMap::from([(String::from("k"), String::from("say \"hi\""))]),
        };
        let script = create_script("/mnt/gcs", &description);
        assert!(script.contains(r#"{"k":"say \"hi\""}"#));
    }

    #[rstest]
    fn read_script_filters_on_mount_point() {
        let script = read_script("/mnt/this_mount");
        assert!(script.contains("dbutils.fs.mounts()"));
        assert!(script.contains(r#"mount.mountPoint == "/mnt/this_mount""#));
        assert!(script.contains(r#"raise Exception("Mount not found")"#));
    }

    #[rstest]
    fn delete_script_unmounts_only_when_present() {
        let script = delete_script("/mnt/this_mount");
        assert!(script.contains("dbutils.fs.unmount(mount_point)"));
        assert!(script.starts_with(r#"mount_point = "/mnt/this_mount""#));
    }
}
