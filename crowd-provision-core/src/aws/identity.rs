//! Caller identity through STS and the IAM policy simulator.

use async_trait::async_trait;
use aws_sdk_iam::types::PolicyEvaluationDecisionType;

use super::client::AwsProvider;
use super::provider::IdentityApi;
use super::{flag, member, optional_text, sdk_error, text, ProviderError, ProviderResult};
use crate::types::{CallerIdentity, PermissionCheckResult, PermissionDecision};

#[async_trait]
impl IdentityApi for AwsProvider {
    async fn caller_identity(&self) -> ProviderResult<CallerIdentity> {
        let output = self
            .sts
            .get_caller_identity()
            .send()
            .await
            .map_err(|e| sdk_error("GetCallerIdentity", e))?;

        let arn = output
            .arn()
            .ok_or_else(|| ProviderError::missing_member("GetCallerIdentity", "Arn"))?;
        Ok(CallerIdentity {
            account: text(output.account()),
            arn: arn.to_string(),
            user_id: text(output.user_id()),
        })
    }

    async fn simulate_principal_policy(
        &self,
        principal_arn: &str,
        actions: &[String],
    ) -> ProviderResult<Vec<PermissionCheckResult>> {
        let mut results = Vec::with_capacity(actions.len());
        let mut marker: Option<String> = None;
        loop {
            let output = self
                .iam
                .simulate_principal_policy()
                .policy_source_arn(principal_arn)
                .set_action_names(Some(actions.to_vec()))
                .set_marker(marker.take())
                .send()
                .await
                .map_err(|e| sdk_error("SimulatePrincipalPolicy", e))?;

            // Anything other than an explicit allow (implicit or explicit
            // deny) blocks the action.
            results.extend(output.evaluation_results().iter().map(|result| {
                let decision = match member::<PolicyEvaluationDecisionType>(result.eval_decision()) {
                    Some(PolicyEvaluationDecisionType::Allowed) => PermissionDecision::Allow,
                    _ => PermissionDecision::Deny,
                };
                PermissionCheckResult {
                    action_name: text(result.eval_action_name()),
                    decision,
                }
            }));

            if !flag(output.is_truncated()) {
                break;
            }
            marker = optional_text(output.marker());
            if marker.is_none() {
                break;
            }
        }
        Ok(results)
    }
}
