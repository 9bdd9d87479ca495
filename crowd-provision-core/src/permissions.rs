//! Permission gate evaluated before any resource is created.

use crate::aws::principal::{resolve_principal, PrincipalKind};
use crate::aws::{ErrorKind, IdentityApi};
use crate::error::{ProvisionError, ProvisionResult};
use crate::types::{CallerIdentity, PermissionCheckResult};

pub const SIMULATE_ACTION: &str = "iam:SimulatePrincipalPolicy";

/// Every action a provisioning run performs.
pub const REQUIRED_ACTIONS: &[&str] = &[
    "iam:ListPolicies",
    "iam:CreatePolicy",
    "iam:ListUsers",
    "iam:CreateUser",
    "iam:ListRoles",
    "iam:CreateRole",
    "iam:PassRole",
    "iam:ListAttachedUserPolicies",
    "iam:AttachUserPolicy",
    "iam:ListAttachedRolePolicies",
    "iam:AttachRolePolicy",
    "iam:ListAccessKeys",
    "iam:CreateAccessKey",
    "iam:DeleteAccessKey",
    "s3:CreateBucket",
    "s3:GetBucketLocation",
    "s3:GetBucketPolicy",
    "s3:PutBucketPolicy",
    "s3:PutBucketPublicAccessBlock",
    "s3:GetBucketCORS",
    "s3:PutBucketCORS",
    "sqs:ListQueues",
    "sqs:CreateQueue",
    "sqs:GetQueueAttributes",
    "dynamodb:CreateTable",
    "dynamodb:DescribeTable",
    "lambda:CreateFunction",
    "lambda:GetFunction",
    "lambda:AddPermission",
    "lambda:ListEventSourceMappings",
    "lambda:CreateEventSourceMapping",
    "apigateway:GET",
    "apigateway:POST",
];

pub struct PermissionGate<'a, P: ?Sized> {
    provider: &'a P,
    actions: Vec<String>,
}

impl<'a, P: IdentityApi + ?Sized> PermissionGate<'a, P> {
    pub fn new(provider: &'a P) -> Self {
        Self::with_actions(provider, REQUIRED_ACTIONS)
    }

    pub fn with_actions(provider: &'a P, actions: &[&str]) -> Self {
        Self {
            provider,
            actions: actions.iter().map(ToString::to_string).collect(),
        }
    }

    /// Simulate every checklist action against the principal behind
    /// `caller`. `None` for the account root, which cannot be simulated.
    pub async fn evaluate(
        &self,
        caller: &CallerIdentity,
    ) -> ProvisionResult<Option<Vec<PermissionCheckResult>>> {
        let principal = resolve_principal(&caller.arn)?;
        if principal.kind == PrincipalKind::Root {
            return Ok(None);
        }

        log::debug!(
            "Simulating {} actions for {}",
            self.actions.len(),
            principal.simulation_arn
        );
        match self
            .provider
            .simulate_principal_policy(&principal.simulation_arn, &self.actions)
            .await
        {
            Ok(results) => Ok(Some(results)),
            Err(err) if err.is(ErrorKind::AccessDenied) => Err(ProvisionError::SimulationDenied {
                principal: principal.simulation_arn,
                detail: err.message,
            }),
            Err(err) => Err(err.into()),
        }
    }

    /// Abort unless every checklist action is allowed. The error names every
    /// denied action.
    pub async fn enforce(&self, caller: &CallerIdentity) -> ProvisionResult<()> {
        let Some(results) = self.evaluate(caller).await? else {
            log::warn!(
                "Running as the account root user ({}); skipping the permission check",
                caller.arn
            );
            return Ok(());
        };

        let denied = denied_actions(&results);
        if !denied.is_empty() {
            return Err(ProvisionError::MissingPermissions {
                principal: caller.arn.clone(),
                actions: denied,
            });
        }
        log::info!("All {} required actions are allowed", results.len());
        Ok(())
    }
}

pub fn denied_actions(results: &[PermissionCheckResult]) -> Vec<String> {
    results
        .iter()
        .filter(|r| r.is_denied())
        .map(|r| r.action_name.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::InMemoryProvider;

    fn caller(arn: &str) -> CallerIdentity {
        CallerIdentity {
            account: "123456789012".to_string(),
            arn: arn.to_string(),
            user_id: "AIDAADMIN".to_string(),
        }
    }

    #[tokio::test]
    async fn test_enforce_lists_all_denied_actions() {
        let provider = InMemoryProvider::new()
            .deny_action("s3:CreateBucket")
            .deny_action("lambda:CreateFunction");
        let gate = PermissionGate::new(&provider);
        let err = gate
            .enforce(&caller("arn:aws:iam::123456789012:user/admin"))
            .await
            .unwrap_err();
        match err {
            ProvisionError::MissingPermissions { actions, .. } => {
                assert_eq!(actions, vec!["s3:CreateBucket", "lambda:CreateFunction"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_simulator_denied_is_distinct() {
        let provider = InMemoryProvider::new().deny_simulation();
        let gate = PermissionGate::new(&provider);
        let err = gate
            .enforce(&caller("arn:aws:sts::123456789012:assumed-role/Deployer/ci"))
            .await
            .unwrap_err();
        match err {
            ProvisionError::SimulationDenied { principal, .. } => {
                assert_eq!(principal, "arn:aws:iam::123456789012:role/Deployer");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_root_skips_simulation() {
        let provider = InMemoryProvider::new().deny_simulation();
        let gate = PermissionGate::new(&provider);
        gate.enforce(&caller("arn:aws:iam::123456789012:root"))
            .await
            .unwrap();
        assert!(provider.requests().await.is_empty());
    }

    #[test]
    fn test_checklist_has_no_duplicates() {
        let mut actions = REQUIRED_ACTIONS.to_vec();
        actions.sort_unstable();
        actions.dedup();
        assert_eq!(actions.len(), REQUIRED_ACTIONS.len());
        assert!(!REQUIRED_ACTIONS.contains(&SIMULATE_ACTION));
    }
}
