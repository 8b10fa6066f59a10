//! Storage sources and their translation into mount arguments.

use std::collections::BTreeMap;

use crate::cluster::CredentialRequirement;
use crate::credentials::{InstanceProfileArn, SecretRef};

use super::ValidationError;

const AZURE_LOGIN_ENDPOINT: &str = "https://login.microsoftonline.com";
const ADLS_GEN1_PREFIXES: [&str; 2] = ["fs.adl", "dfs.adls"];

/// Source URI and configuration passed to the remote mount primitive.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct MountDescription {
    /// Storage URI understood by the remote filesystem layer.
    pub source: String,
    /// Filesystem configuration; ordered so scripts are reproducible.
    pub configs: BTreeMap<String, String>,
}

/// A declared mount: where the data lives plus optional extra configuration.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct MountSpec {
    /// Storage backend and its credentials.
    pub source: MountSource,
    /// Additional filesystem configuration merged into the generated map.
    pub extra_configs: BTreeMap<String, String>,
}

/// Storage backends that can be mounted.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum MountSource {
    /// Amazon S3 bucket.
    S3 {
        /// Bucket name without scheme.
        bucket: String,
        /// How the cluster authenticates to S3.
        credentials: S3Credentials,
    },
    /// Google Cloud Storage bucket, authenticated by the cluster's service
    /// account.
    Gcs {
        /// Bucket name without scheme.
        bucket: String,
    },
    /// Azure Data Lake Storage Gen2 container.
    AdlsGen2(AdlsGen2Source),
    /// Azure Data Lake Storage Gen1 store.
    AdlsGen1(AdlsGen1Source),
    /// Azure Blob Storage container.
    AzureBlob(AzureBlobSource),
}

/// Authentication options for S3 mounts.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum S3Credentials {
    /// Rely on an instance profile attached to the cluster. `None` means the
    /// caller named a cluster that already carries one.
    InstanceProfile(Option<String>),
    /// Static access keys; the secret half lives in the remote secret store.
    AccessKeys {
        /// Access key identifier.
        access_key: String,
        /// Secret access key reference.
        secret_key: SecretRef,
    },
}

/// Azure AD application used for OAuth client-credential flows.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ServicePrincipal {
    /// Directory (tenant) identifier.
    pub tenant_id: String,
    /// Application (client) identifier.
    pub client_id: String,
    /// Client secret reference.
    pub client_secret: SecretRef,
}

/// ADLS Gen2 mount source.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AdlsGen2Source {
    /// Storage account name.
    pub storage_account: String,
    /// Filesystem (container) name.
    pub container: String,
    /// Optional sub-directory; empty or starting with `/`.
    pub directory: String,
    /// Credentials used to reach the account.
    pub principal: ServicePrincipal,
    /// Create the filesystem if it does not exist.
    pub initialize_file_system: bool,
}

/// ADLS Gen1 mount source.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AdlsGen1Source {
    /// Data Lake Store resource name.
    pub storage_resource: String,
    /// Optional sub-directory; empty or starting with `/`.
    pub directory: String,
    /// Configuration key prefix, `fs.adl` or `dfs.adls`.
    pub spark_conf_prefix: String,
    /// Credentials used to reach the store.
    pub principal: ServicePrincipal,
}

/// How an Azure Blob mount authenticates.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum BlobAuth {
    /// Storage account access key.
    AccountKey,
    /// Shared access signature scoped to the container.
    SasToken,
}

/// Azure Blob Storage mount source.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AzureBlobSource {
    /// Storage account name.
    pub storage_account: String,
    /// Container name.
    pub container: String,
    /// Optional sub-directory; empty or starting with `/`.
    pub directory: String,
    /// Authentication mechanism.
    pub auth: BlobAuth,
    /// Reference to the account key or SAS token.
    pub secret: SecretRef,
}

impl MountSpec {
    /// Creates a spec without extra configuration.
    #[must_use]
    pub const fn new(source: MountSource) -> Self {
        Self {
            source,
            extra_configs: BTreeMap::new(),
        }
    }

    /// Adds an extra configuration entry.
    #[must_use]
    pub fn with_extra_config(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_configs.insert(key.into(), value.into());
        self
    }

    /// Produces the source URI and configuration map for the mount.
    ///
    /// The result depends only on the spec's fields.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError`] when a field is empty or malformed, or when
    /// an extra configuration key collides with a generated one.
    ///
    /// # Examples
    ///
    /// ```
    /// use lakemount::{MountSource, MountSpec};
    /// use lakemount::mount::S3Credentials;
    ///
    /// let spec = MountSpec::new(MountSource::S3 {
    ///     bucket: "test-s3-bucket".into(),
    ///     credentials: S3Credentials::InstanceProfile(None),
    /// });
    /// let description = spec.describe().expect("valid spec");
    /// assert_eq!(description.source, "s3a://test-s3-bucket");
    /// assert!(description.configs.is_empty());
    /// ```
    pub fn describe(&self) -> Result<MountDescription, ValidationError> {
        let (source, mut configs) = self.source.describe()?;
        for (raw_key, value) in &self.extra_configs {
            let key = raw_key.trim();
            if key.is_empty() {
                return Err(ValidationError::EmptyField {
                    field: "extra_configs key",
                });
            }
            if configs.contains_key(key) {
                return Err(ValidationError::ConflictingConfigKey {
                    key: key.to_owned(),
                });
            }
            configs.insert(key.to_owned(), value.clone());
        }
        Ok(MountDescription { source, configs })
    }

    /// Instance profile the mount depends on, if it names one.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError`] when the declared profile is not a valid
    /// instance profile ARN.
    pub fn instance_profile(&self) -> Result<Option<InstanceProfileArn>, ValidationError> {
        match &self.source {
            MountSource::S3 {
                credentials: S3Credentials::InstanceProfile(Some(value)),
                ..
            } => InstanceProfileArn::parse(value).map(Some),
            MountSource::S3 { .. }
            | MountSource::Gcs { .. }
            | MountSource::AdlsGen2(_)
            | MountSource::AdlsGen1(_)
            | MountSource::AzureBlob(_) => Ok(None),
        }
    }

    /// Credential attributes a cluster needs to host this mount.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError`] when the declared profile is malformed.
    pub fn credential_requirement(&self) -> Result<CredentialRequirement, ValidationError> {
        if let Some(arn) = self.instance_profile()? {
            return Ok(CredentialRequirement::InstanceProfile(arn));
        }
        Ok(match &self.source {
            MountSource::S3 {
                credentials: S3Credentials::InstanceProfile(None),
                ..
            } => CredentialRequirement::AnyInstanceProfile,
            _ => CredentialRequirement::Unrestricted,
        })
    }

    /// Returns `true` when only the cluster can supply credentials, so a
    /// cluster must be named explicitly.
    #[must_use]
    pub const fn needs_cluster_credentials(&self) -> bool {
        matches!(
            self.source,
            MountSource::S3 {
                credentials: S3Credentials::InstanceProfile(None),
                ..
            }
        )
    }
}

impl MountSource {
    fn describe(&self) -> Result<(String, BTreeMap<String, String>), ValidationError> {
        match self {
            Self::S3 {
                bucket: raw_bucket,
                credentials,
            } => {
                let bucket = identifier("bucket_name", raw_bucket)?;
                let configs = match credentials {
                    S3Credentials::InstanceProfile(profile) => {
                        if let Some(value) = profile {
                            InstanceProfileArn::parse(value)?;
                        }
                        BTreeMap::new()
                    }
                    S3Credentials::AccessKeys {
                        access_key,
                        secret_key,
                    } => BTreeMap::from([
                        (
                            String::from("fs.s3a.access.key"),
                            identifier("access_key", access_key)?.to_owned(),
                        ),
                        (String::from("fs.s3a.secret.key"), secret_key.placeholder()),
                    ]),
                };
                Ok((format!("s3a://{bucket}"), configs))
            }
            Self::Gcs { bucket: raw_bucket } => {
                let bucket = identifier("bucket_name", raw_bucket)?;
                Ok((format!("gs://{bucket}"), BTreeMap::new()))
            }
            Self::AdlsGen2(source) => source.describe(),
            Self::AdlsGen1(source) => source.describe(),
            Self::AzureBlob(source) => source.describe(),
        }
    }
}

impl ServicePrincipal {
    fn token_endpoint(&self) -> Result<String, ValidationError> {
        let tenant = identifier("tenant_id", &self.tenant_id)?;
        Ok(format!("{AZURE_LOGIN_ENDPOINT}/{tenant}/oauth2/token"))
    }
}

impl AdlsGen2Source {
    fn describe(&self) -> Result<(String, BTreeMap<String, String>), ValidationError> {
        let account = identifier("storage_account_name", &self.storage_account)?;
        let container = identifier("container_name", &self.container)?;
        let directory = directory(&self.directory)?;
        let configs = BTreeMap::from([
            entry("fs.azure.account.auth.type", "OAuth"),
            entry(
                "fs.azure.account.oauth.provider.type",
                "org.apache.hadoop.fs.azurebfs.oauth2.ClientCredsTokenProvider",
            ),
            entry(
                "fs.azure.account.oauth2.client.id",
                identifier("client_id", &self.principal.client_id)?,
            ),
            (
                String::from("fs.azure.account.oauth2.client.secret"),
                self.principal.client_secret.placeholder(),
            ),
            (
                String::from("fs.azure.account.oauth2.client.endpoint"),
                self.principal.token_endpoint()?,
            ),
            entry(
                "fs.azure.createRemoteFileSystemDuringInitialization",
                if self.initialize_file_system {
                    "true"
                } else {
                    "false"
                },
            ),
        ]);
        Ok((
            format!("abfss://{container}@{account}.dfs.core.windows.net{directory}"),
            configs,
        ))
    }
}

impl AdlsGen1Source {
    fn describe(&self) -> Result<(String, BTreeMap<String, String>), ValidationError> {
        let resource = identifier("storage_resource_name", &self.storage_resource)?;
        let directory = directory(&self.directory)?;
        let prefix = self.spark_conf_prefix.trim();
        if !ADLS_GEN1_PREFIXES.contains(&prefix) {
            return Err(ValidationError::InvalidConfPrefix {
                value: self.spark_conf_prefix.clone(),
            });
        }
        let configs = BTreeMap::from([
            (
                format!("{prefix}.oauth2.access.token.provider.type"),
                String::from("ClientCredential"),
            ),
            (
                format!("{prefix}.oauth2.client.id"),
                identifier("client_id", &self.principal.client_id)?.to_owned(),
            ),
            (
                format!("{prefix}.oauth2.credential"),
                self.principal.client_secret.placeholder(),
            ),
            (
                format!("{prefix}.oauth2.refresh.url"),
                self.principal.token_endpoint()?,
            ),
        ]);
        Ok((
            format!("adl://{resource}.azuredatalakestore.net{directory}"),
            configs,
        ))
    }
}

impl AzureBlobSource {
    fn describe(&self) -> Result<(String, BTreeMap<String, String>), ValidationError> {
        let account = identifier("storage_account_name", &self.storage_account)?;
        let container = identifier("container_name", &self.container)?;
        let directory = directory(&self.directory)?;
        let key = match self.auth {
            BlobAuth::AccountKey => format!("fs.azure.account.key.{account}.blob.core.windows.net"),
            BlobAuth::SasToken => {
                format!("fs.azure.sas.{container}.{account}.blob.core.windows.net")
            }
        };
        let configs = BTreeMap::from([(key, self.secret.placeholder())]);
        Ok((
            format!("wasbs://{container}@{account}.blob.core.windows.net{directory}"),
            configs,
        ))
    }
}

fn entry(key: &str, value: &str) -> (String, String) {
    (key.to_owned(), value.to_owned())
}

fn identifier<'a>(field: &'static str, value: &'a str) -> Result<&'a str, ValidationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::EmptyField { field });
    }
    if trimmed
        .chars()
        .any(|ch| ch.is_whitespace() || matches!(ch, '"' | '\'' | '\\' | '/' | '@'))
    {
        return Err(ValidationError::InvalidCharacters {
            field,
            value: value.to_owned(),
        });
    }
    Ok(trimmed)
}

fn directory(value: &str) -> Result<&str, ValidationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Ok("");
    }
    if !trimmed.starts_with('/') || trimmed.contains(['"', '\'', '\\']) {
        return Err(ValidationError::InvalidDirectory {
            value: value.to_owned(),
        });
    }
    Ok(trimmed)
}
