//! Credential references carried by mount specifications.

use std::fmt;

use crate::mount::ValidationError;

const ARN_PREFIX: &str = "arn:";
const ARN_SECTIONS: usize = 6;
const INSTANCE_PROFILE_RESOURCE: &str = "instance-profile/";

/// Validated AWS instance profile ARN.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct InstanceProfileArn(String);

impl InstanceProfileArn {
    /// Parses and validates an instance profile ARN.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidArn`] when the value is not an ARN
    /// and [`ValidationError::NotInstanceProfile`] when it names some other
    /// kind of resource.
    ///
    /// # Examples
    ///
    /// ```
    /// use lakemount::InstanceProfileArn;
    ///
    /// let arn = InstanceProfileArn::parse("arn:aws:iam::123456789012:instance-profile/mounts")
    ///     .expect("valid arn");
    /// assert_eq!(arn.profile_name(), "mounts");
    /// assert!(InstanceProfileArn::parse("this_mount").is_err());
    /// ```
    pub fn parse(value: &str) -> Result<Self, ValidationError> {
        let trimmed = value.trim();
        if !trimmed.starts_with(ARN_PREFIX) {
            return Err(ValidationError::InvalidArn {
                reason: String::from("invalid prefix"),
            });
        }
        let sections: Vec<&str> = trimmed.splitn(ARN_SECTIONS, ':').collect();
        let [_, _partition, service, _region, _account, resource] = sections.as_slice() else {
            return Err(ValidationError::InvalidArn {
                reason: String::from("not enough sections"),
            });
        };
        if *service != "iam" || !resource.starts_with(INSTANCE_PROFILE_RESOURCE) {
            return Err(ValidationError::NotInstanceProfile {
                value: trimmed.to_owned(),
            });
        }
        if resource.len() == INSTANCE_PROFILE_RESOURCE.len() {
            return Err(ValidationError::NotInstanceProfile {
                value: trimmed.to_owned(),
            });
        }
        Ok(Self(trimmed.to_owned()))
    }

    /// Returns the full ARN.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the last path segment of the profile resource.
    #[must_use]
    pub fn profile_name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }
}

impl fmt::Display for InstanceProfileArn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Pointer to a secret held by the remote execution environment.
///
/// Secrets never travel through scripts in clear text; they render as a
/// `{{secrets/<scope>/<key>}}` placeholder resolved remotely.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct SecretRef {
    scope: String,
    key: String,
}

impl SecretRef {
    /// Builds a secret reference from scope and key.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidSecretRef`] when either part is empty
    /// or contains characters that would break the placeholder syntax.
    pub fn new(scope: &str, key: &str) -> Result<Self, ValidationError> {
        let trimmed_scope = scope.trim();
        let trimmed_key = key.trim();
        let malformed = |part: &str| {
            part.is_empty() || part.contains(['/', '{', '}']) || part.contains(char::is_whitespace)
        };
        if malformed(trimmed_scope) || malformed(trimmed_key) {
            return Err(ValidationError::InvalidSecretRef {
                scope: scope.to_owned(),
                key: key.to_owned(),
            });
        }
        Ok(Self {
            scope: trimmed_scope.to_owned(),
            key: trimmed_key.to_owned(),
        })
    }

    /// Placeholder text embedded in mount configuration.
    #[must_use]
    pub fn placeholder(&self) -> String {
        format!("{{{{secrets/{}/{}}}}}", self.scope, self.key)
    }
}

impl fmt::Display for SecretRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.placeholder())
    }
}
