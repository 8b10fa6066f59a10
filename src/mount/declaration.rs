//! TOML mount declarations persisted by callers between runs.
//!
//! A declaration holds everything needed to recreate a mount: its name, the
//! cluster it was bound to, and the storage source fields. Only one storage
//! table may be present.

use std::collections::BTreeMap;

use camino::{Utf8Path, Utf8PathBuf};
use cap_std::{ambient_authority, fs_utf8::Dir};
use ortho_config::toml;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::credentials::SecretRef;
use crate::orchestrator::MountRequest;

use super::{
    AdlsGen1Source, AdlsGen2Source, AzureBlobSource, BlobAuth, MountName, MountSource, MountSpec,
    S3Credentials, ServicePrincipal, ValidationError,
};

const DEFAULT_ADLS_GEN1_PREFIX: &str = "fs.adl";

/// Errors raised while loading a declaration file.
#[derive(Debug, Error)]
pub enum DeclarationError {
    /// The file could not be read.
    #[error("failed to read {path}: {message}")]
    Io {
        /// Path that could not be read.
        path: Utf8PathBuf,
        /// Underlying error message.
        message: String,
    },
    /// The file is not a valid declaration.
    #[error("failed to parse {path}: {message}")]
    Parse {
        /// Offending path.
        path: Utf8PathBuf,
        /// Parser message.
        message: String,
    },
    /// The declaration parsed but describes an invalid mount.
    #[error(transparent)]
    Validation(#[from] ValidationError),
}

/// Persisted description of a mount.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(deny_unknown_fields)]
pub struct MountDeclaration {
    /// Mount name; the canonical path is `/mnt/<mount_name>`.
    pub mount_name: String,
    /// Cluster the mount is bound to, if pinned.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_id: Option<String>,
    /// Extra filesystem configuration.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra_configs: BTreeMap<String, String>,
    /// Amazon S3 source.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub s3: Option<S3Declaration>,
    /// Google Cloud Storage source.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gcs: Option<GcsDeclaration>,
    /// ADLS Gen2 source.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub adls_gen2: Option<AdlsGen2Declaration>,
    /// ADLS Gen1 source.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub adls_gen1: Option<AdlsGen1Declaration>,
    /// Azure Blob Storage source.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub azure_blob: Option<AzureBlobDeclaration>,
}

/// `[s3]` table.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(deny_unknown_fields)]
pub struct S3Declaration {
    /// Bucket name.
    pub bucket_name: String,
    /// Instance profile ARN.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance_profile: Option<String>,
    /// Access key identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_key: Option<String>,
    /// Secret scope holding the secret access key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_scope: Option<String>,
    /// Secret key holding the secret access key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_key: Option<String>,
}

/// `[gcs]` table.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(deny_unknown_fields)]
pub struct GcsDeclaration {
    /// Bucket name.
    pub bucket_name: String,
}

/// `[adls_gen2]` table.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AdlsGen2Declaration {
    /// Storage account name.
    pub storage_account_name: String,
    /// Filesystem (container) name.
    pub container_name: String,
    /// Optional directory inside the container.
    #[serde(default)]
    pub directory: String,
    /// Azure AD tenant.
    pub tenant_id: String,
    /// Application identifier.
    pub client_id: String,
    /// Secret scope holding the client secret.
    pub client_secret_scope: String,
    /// Secret key holding the client secret.
    pub client_secret_key: String,
    /// Create the filesystem during mount when missing.
    #[serde(default)]
    pub initialize_file_system: bool,
}

/// `[adls_gen1]` table.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AdlsGen1Declaration {
    /// Data Lake Store resource name.
    pub storage_resource_name: String,
    /// Optional directory inside the store.
    #[serde(default)]
    pub directory: String,
    /// Configuration key prefix; defaults to `fs.adl`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spark_conf_prefix: Option<String>,
    /// Azure AD tenant.
    pub tenant_id: String,
    /// Application identifier.
    pub client_id: String,
    /// Secret scope holding the client secret.
    pub client_secret_scope: String,
    /// Secret key holding the client secret.
    pub client_secret_key: String,
}

/// Authentication mechanism named in an `[azure_blob]` table.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub enum BlobAuthType {
    /// Storage account key.
    #[default]
    #[serde(rename = "ACCESS_KEY")]
    AccessKey,
    /// Shared access signature.
    #[serde(rename = "SAS")]
    Sas,
}

/// `[azure_blob]` table.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AzureBlobDeclaration {
    /// Storage account name.
    pub storage_account_name: String,
    /// Container name.
    pub container_name: String,
    /// Optional directory inside the container.
    #[serde(default)]
    pub directory: String,
    /// Account key or SAS authentication.
    #[serde(default)]
    pub auth_type: BlobAuthType,
    /// Secret scope holding the key or token.
    pub token_secret_scope: String,
    /// Secret key holding the key or token.
    pub token_secret_key: String,
}

impl MountDeclaration {
    /// Converts the declaration into a validated [`MountRequest`].
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError`] when the name is invalid, when zero or
    /// several storage tables are present, when credentials conflict, or when
    /// the resulting request fails validation.
    pub fn into_request(self) -> Result<MountRequest, ValidationError> {
        let name = MountName::new(self.mount_name.trim())?;
        let source = self.source()?;
        let cluster_id = self
            .cluster_id
            .map(|id| id.trim().to_owned())
            .filter(|id| !id.is_empty());
        let request = MountRequest {
            name,
            cluster_id,
            spec: MountSpec {
                source,
                extra_configs: self.extra_configs,
            },
        };
        request.validate()?;
        Ok(request)
    }

    fn source_count(&self) -> usize {
        [
            self.s3.is_some(),
            self.gcs.is_some(),
            self.adls_gen2.is_some(),
            self.adls_gen1.is_some(),
            self.azure_blob.is_some(),
        ]
        .into_iter()
        .filter(|present| *present)
        .count()
    }

    fn source(&self) -> Result<MountSource, ValidationError> {
        match self.source_count() {
            0 => return Err(ValidationError::MissingSource),
            1 => {}
            count => return Err(ValidationError::MultipleSources { count }),
        }
        if let Some(s3) = &self.s3 {
            return s3.source();
        }
        if let Some(gcs) = &self.gcs {
            return Ok(MountSource::Gcs {
                bucket: gcs.bucket_name.clone(),
            });
        }
        if let Some(adls) = &self.adls_gen2 {
            return Ok(MountSource::AdlsGen2(AdlsGen2Source {
                storage_account: adls.storage_account_name.clone(),
                container: adls.container_name.clone(),
                directory: adls.directory.clone(),
                principal: principal(
                    &adls.tenant_id,
                    &adls.client_id,
                    &adls.client_secret_scope,
                    &adls.client_secret_key,
                )?,
                initialize_file_system: adls.initialize_file_system,
            }));
        }
        if let Some(adls) = &self.adls_gen1 {
            return Ok(MountSource::AdlsGen1(AdlsGen1Source {
                storage_resource: adls.storage_resource_name.clone(),
                directory: adls.directory.clone(),
                spark_conf_prefix: adls
                    .spark_conf_prefix
                    .clone()
                    .unwrap_or_else(|| DEFAULT_ADLS_GEN1_PREFIX.to_owned()),
                principal: principal(
                    &adls.tenant_id,
                    &adls.client_id,
                    &adls.client_secret_scope,
                    &adls.client_secret_key,
                )?,
            }));
        }
        let Some(blob) = &self.azure_blob else {
            return Err(ValidationError::MissingSource);
        };
        Ok(MountSource::AzureBlob(AzureBlobSource {
            storage_account: blob.storage_account_name.clone(),
            container: blob.container_name.clone(),
            directory: blob.directory.clone(),
            auth: match blob.auth_type {
                BlobAuthType::AccessKey => BlobAuth::AccountKey,
                BlobAuthType::Sas => BlobAuth::SasToken,
            },
            secret: SecretRef::new(&blob.token_secret_scope, &blob.token_secret_key)?,
        }))
    }
}

impl S3Declaration {
    fn source(&self) -> Result<MountSource, ValidationError> {
        let credentials = match (
            non_empty(self.instance_profile.as_deref()),
            non_empty(self.access_key.as_deref()),
            non_empty(self.secret_scope.as_deref()),
            non_empty(self.secret_key.as_deref()),
        ) {
            (profile, None, None, None) => {
                S3Credentials::InstanceProfile(profile.map(str::to_owned))
            }
            (Some(_), _, _, _) => return Err(ValidationError::ConflictingCredentials),
            (None, Some(access_key), Some(scope), Some(key)) => S3Credentials::AccessKeys {
                access_key: access_key.to_owned(),
                secret_key: SecretRef::new(scope, key)?,
            },
            _ => return Err(ValidationError::IncompleteAccessKeys),
        };
        Ok(MountSource::S3 {
            bucket: self.bucket_name.clone(),
            credentials,
        })
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|item| !item.is_empty())
}

fn principal(
    tenant_id: &str,
    client_id: &str,
    secret_scope: &str,
    secret_key: &str,
) -> Result<ServicePrincipal, ValidationError> {
    Ok(ServicePrincipal {
        tenant_id: tenant_id.to_owned(),
        client_id: client_id.to_owned(),
        client_secret: SecretRef::new(secret_scope, secret_key)?,
    })
}

/// Reads and parses a declaration file.
///
/// # Errors
///
/// Returns [`DeclarationError::Io`] when the file cannot be read and
/// [`DeclarationError::Parse`] when it is not a valid declaration.
pub fn load_declaration(path: &Utf8Path) -> Result<MountDeclaration, DeclarationError> {
    let parent = match path.parent() {
        Some(dir) if !dir.as_str().is_empty() => dir,
        _ => Utf8Path::new("."),
    };
    let file_name = path.file_name().ok_or_else(|| DeclarationError::Io {
        path: path.to_path_buf(),
        message: String::from("declaration path is missing a filename"),
    })?;
    let dir =
        Dir::open_ambient_dir(parent, ambient_authority()).map_err(|err| DeclarationError::Io {
            path: parent.to_path_buf(),
            message: err.to_string(),
        })?;
    let contents = dir
        .read_to_string(file_name)
        .map_err(|err| DeclarationError::Io {
            path: path.to_path_buf(),
            message: err.to_string(),
        })?;
    toml::from_str(&contents).map_err(|err| DeclarationError::Parse {
        path: path.to_path_buf(),
        message: err.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use tempfile::TempDir;

    use super::*;

    fn write_declaration(contents: &str) -> (TempDir, Utf8PathBuf) {
        let tmp = TempDir::new().expect("temp dir");
        let path = Utf8PathBuf::from_path_buf(tmp.path().join("mount.toml"))
            .expect("utf-8 temp path");
        std::fs::write(&path, contents).expect("write declaration");
        (tmp, path)
    }

    #[rstest]
    fn loads_s3_declaration_with_instance_profile() {
        let (_tmp, path) = write_declaration(
            r#"
mount_name = "this_mount"

[s3]
bucket_name = "test-s3-bucket"
instance_profile = "arn:aws:iam::123456789012:instance-profile/mounts"
"#,
        );
        let request = load_declaration(&path)
            .expect("declaration loads")
            .into_request()
            .expect("valid request");
        assert_eq!(request.name.mount_point(), "/mnt/this_mount");
        assert_eq!(request.cluster_id, None);
        assert!(matches!(
            request.spec.source,
            MountSource::S3 {
                credentials: S3Credentials::InstanceProfile(Some(_)),
                ..
            }
        ));
    }

    #[rstest]
    fn rejects_unknown_fields() {
        let (_tmp, path) = write_declaration(
            r#"
mount_name = "m"
bucket = "typo"
"#,
        );
        let err = load_declaration(&path).expect_err("unknown field");
        assert!(matches!(err, DeclarationError::Parse { .. }));
    }

    #[rstest]
    fn reports_missing_file() {
        let tmp = TempDir::new().expect("temp dir");
        let path =
            Utf8PathBuf::from_path_buf(tmp.path().join("absent.toml")).expect("utf-8 temp path");
        let err = load_declaration(&path).expect_err("missing file");
        assert!(matches!(err, DeclarationError::Io { .. }));
    }

    #[rstest]
    #[case(MountDeclaration {
        mount_name: String::from("m"),
        ..MountDeclaration::default()
    }, ValidationError::MissingSource)]
    #[case(MountDeclaration {
        mount_name: String::from("m"),
        s3: Some(S3Declaration { bucket_name: String::from("b"), ..S3Declaration::default() }),
        gcs: Some(GcsDeclaration { bucket_name: String::from("g") }),
        ..MountDeclaration::default()
    }, ValidationError::MultipleSources { count: 2 })]
    #[case(MountDeclaration {
        mount_name: String::from("m"),
        s3: Some(S3Declaration { bucket_name: String::from("b"), ..S3Declaration::default() }),
        ..MountDeclaration::default()
    }, ValidationError::MissingCredentialMechanism)]
    #[case(MountDeclaration {
        mount_name: String::from("m"),
        s3: Some(S3Declaration {
            bucket_name: String::from("b"),
            instance_profile: Some(String::from("arn:aws:iam::1:instance-profile/p")),
            access_key: Some(String::from("AKIA")),
            ..S3Declaration::default()
        }),
        ..MountDeclaration::default()
    }, ValidationError::ConflictingCredentials)]
    #[case(MountDeclaration {
        mount_name: String::from("m"),
        s3: Some(S3Declaration {
            bucket_name: String::from("b"),
            access_key: Some(String::from("AKIA")),
            ..S3Declaration::default()
        }),
        ..MountDeclaration::default()
    }, ValidationError::IncompleteAccessKeys)]
    #[case(MountDeclaration {
        mount_name: String::from("../etc"),
        gcs: Some(GcsDeclaration { bucket_name: String::from("g") }),
        ..MountDeclaration::default()
    }, ValidationError::InvalidMountName { value: String::from("../etc") })]
    fn rejects_invalid_declarations(
        #[case] declaration: MountDeclaration,
        #[case] expected: ValidationError,
    ) {
        assert_eq!(declaration.into_request().expect_err("invalid"), expected);
    }

    #[rstest]
    fn adls_gen1_defaults_prefix() {
        let declaration = MountDeclaration {
            mount_name: String::from("lake"),
            adls_gen1: Some(AdlsGen1Declaration {
                storage_resource_name: String::from("store"),
                tenant_id: String::from("tenant"),
                client_id: String::from("client"),
                client_secret_scope: String::from("azure"),
                client_secret_key: String::from("secret"),
                ..AdlsGen1Declaration::default()
            }),
            ..MountDeclaration::default()
        };
        let request = declaration.into_request().expect("valid request");
        let MountSource::AdlsGen1(source) = request.spec.source else {
            panic!("expected an ADLS Gen1 source");
        };
        assert_eq!(source.spark_conf_prefix, "fs.adl");
    }
}
