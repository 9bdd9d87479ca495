//! Error types for provisioning runs.

use std::path::PathBuf;

use thiserror::Error;

use crate::aws::ProviderError;
use crate::store::StoreError;

/// Top-level error for a provisioning run.
///
/// Variants that require operator action (missing configuration, missing
/// permissions) carry the complete list of offending items so a single run
/// reports everything at once.
#[derive(Error, Debug)]
pub enum ProvisionError {
    #[error("Missing required configuration values: {}", .0.join(", "))]
    MissingConfig(Vec<String>),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Missing permissions for {principal}: {}", .actions.join(", "))]
    MissingPermissions {
        principal: String,
        actions: Vec<String>,
    },

    #[error(
        "Cannot evaluate permissions of {principal}: iam:SimulatePrincipalPolicy is denied. \
         Grant that action to the caller before provisioning ({detail})"
    )]
    SimulationDenied { principal: String, detail: String },

    #[error("Unsupported principal: {0}")]
    UnsupportedPrincipal(String),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Failed to read function package {}: {source}", .path.display())]
    Package {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize document: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Unexpected provider response: {0}")]
    UnexpectedResponse(String),
}

pub type ProvisionResult<T> = Result<T, ProvisionError>;

impl ProvisionError {
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig(message.into())
    }

    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::UnexpectedResponse(message.into())
    }

    /// Whether the operator has to change configuration or permissions
    /// before a re-run can succeed.
    pub fn requires_operator_action(&self) -> bool {
        matches!(
            self,
            Self::MissingConfig(_)
                | Self::InvalidConfig(_)
                | Self::MissingPermissions { .. }
                | Self::SimulationDenied { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_permissions_lists_every_action() {
        let err = ProvisionError::MissingPermissions {
            principal: "arn:aws:iam::123456789012:user/admin".to_string(),
            actions: vec!["s3:CreateBucket".to_string(), "sqs:CreateQueue".to_string()],
        };
        let message = err.to_string();
        assert!(message.contains("s3:CreateBucket"));
        assert!(message.contains("sqs:CreateQueue"));
        assert!(err.requires_operator_action());
    }

    #[test]
    fn test_simulation_denied_names_capability() {
        let err = ProvisionError::SimulationDenied {
            principal: "arn:aws:iam::123456789012:user/admin".to_string(),
            detail: "AccessDenied".to_string(),
        };
        assert!(err.to_string().contains("iam:SimulatePrincipalPolicy"));
    }

    #[test]
    fn test_runtime_errors_do_not_require_operator_action() {
        assert!(!ProvisionError::unexpected("empty response").requires_operator_action());
    }
}
