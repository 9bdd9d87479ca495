//! IAM policies, users, roles and policy attachments.

use crate::aws::CloudProvider;
use crate::documents::PolicyDocument;
use crate::error::ProvisionResult;
use crate::probe::Probe;
use crate::store::StateKey;
use crate::types::{
    PolicyAttachmentDescriptor, PolicyDescriptor, ResourceKind, RoleDescriptor, UserDescriptor,
};

/// Policy name from a managed policy ARN.
fn policy_name(policy_arn: &str) -> &str {
    policy_arn.rsplit('/').next().unwrap_or(policy_arn)
}

impl<P: CloudProvider + ?Sized> super::Reconciler<'_, P> {
    /// Managed policy under the run's IAM path. An existing policy keeps its
    /// document.
    pub async fn ensure_policy(
        &mut self,
        name: &str,
        document: &PolicyDocument,
    ) -> ProvisionResult<PolicyDescriptor> {
        let key = StateKey::new(ResourceKind::Policy, name);
        match self.prober.policy(name).await? {
            Probe::Found(policy) => {
                self.adopt(&key, &policy).await?;
                Ok(policy)
            }
            Probe::NotFound => {
                let policy = self
                    .provider
                    .create_policy(name, &self.iam_path, &document.to_json()?)
                    .await?;
                self.created(&key, &policy).await?;
                Ok(policy)
            }
        }
    }

    pub async fn ensure_user(&mut self, name: &str) -> ProvisionResult<UserDescriptor> {
        let key = StateKey::new(ResourceKind::User, name);
        match self.prober.user(name).await? {
            Probe::Found(user) => {
                self.adopt(&key, &user).await?;
                Ok(user)
            }
            Probe::NotFound => {
                let user = self.provider.create_user(name, &self.iam_path).await?;
                self.created(&key, &user).await?;
                Ok(user)
            }
        }
    }

    pub async fn ensure_role(
        &mut self,
        name: &str,
        trust_policy: &PolicyDocument,
    ) -> ProvisionResult<RoleDescriptor> {
        let key = StateKey::new(ResourceKind::Role, name);
        match self.prober.role(name).await? {
            Probe::Found(role) => {
                self.adopt(&key, &role).await?;
                Ok(role)
            }
            Probe::NotFound => {
                let role = self
                    .provider
                    .create_role(name, &self.iam_path, &trust_policy.to_json()?)
                    .await?;
                self.created(&key, &role).await?;
                Ok(role)
            }
        }
    }

    pub async fn ensure_user_policy_attachment(
        &mut self,
        user_name: &str,
        policy_arn: &str,
    ) -> ProvisionResult<()> {
        let attached = self.provider.list_attached_user_policies(user_name).await?;
        let descriptor = PolicyAttachmentDescriptor {
            principal_name: user_name.to_string(),
            policy_arn: policy_arn.to_string(),
        };
        let key = StateKey::with_sub_id(
            ResourceKind::PolicyAttachment,
            user_name,
            policy_name(policy_arn),
        );
        if attached.iter().any(|arn| arn == policy_arn) {
            self.adopt(&key, &descriptor).await?;
        } else {
            self.provider
                .attach_user_policy(user_name, policy_arn)
                .await?;
            self.created(&key, &descriptor).await?;
        }
        Ok(())
    }

    pub async fn ensure_role_policy_attachment(
        &mut self,
        role_name: &str,
        policy_arn: &str,
    ) -> ProvisionResult<()> {
        let attached = self.provider.list_attached_role_policies(role_name).await?;
        let descriptor = PolicyAttachmentDescriptor {
            principal_name: role_name.to_string(),
            policy_arn: policy_arn.to_string(),
        };
        let key = StateKey::with_sub_id(
            ResourceKind::PolicyAttachment,
            role_name,
            policy_name(policy_arn),
        );
        if attached.iter().any(|arn| arn == policy_arn) {
            self.adopt(&key, &descriptor).await?;
        } else {
            self.provider
                .attach_role_policy(role_name, policy_arn)
                .await?;
            self.created(&key, &descriptor).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reconcile::Reconciler;
    use crate::store::LocalStateStore;
    use crate::testing::InMemoryProvider;
    use crate::types::Action;
    use tempfile::TempDir;

    #[test]
    fn test_policy_name_from_arn() {
        assert_eq!(
            policy_name("arn:aws:iam::123456789012:policy/crowd-task/p"),
            "p"
        );
    }

    #[tokio::test]
    async fn test_attachment_only_attaches_once() {
        let dir = TempDir::new().unwrap();
        let store = LocalStateStore::new(dir.path());
        let provider = InMemoryProvider::new();
        let mut reconciler = Reconciler::new(&provider, &store, "/crowd-task/");

        let user = reconciler.ensure_user("crowd-task-user").await.unwrap();
        let policy = reconciler
            .ensure_policy(
                "crowd-task-user-policy",
                &crate::documents::deploy_bucket_policy("deploy"),
            )
            .await
            .unwrap();
        for _ in 0..2 {
            reconciler
                .ensure_user_policy_attachment(&user.user_name, &policy.arn)
                .await
                .unwrap();
        }

        let attaches = provider
            .mutations()
            .await
            .into_iter()
            .filter(|m| m.starts_with("AttachUserPolicy"))
            .count();
        assert_eq!(attaches, 1);
        let actions: Vec<Action> = reconciler
            .outcomes()
            .iter()
            .filter(|o| o.kind == ResourceKind::PolicyAttachment)
            .map(|o| o.action)
            .collect();
        assert_eq!(actions, vec![Action::Created, Action::ReusedRemote]);
    }

    #[tokio::test]
    async fn test_existing_user_refreshes_missing_local_entry() {
        let dir = TempDir::new().unwrap();
        let store = LocalStateStore::new(dir.path());
        let provider = InMemoryProvider::new();
        {
            let mut first = Reconciler::new(&provider, &store, "/crowd-task/");
            first.ensure_user("crowd-task-user").await.unwrap();
        }
        store
            .remove(&StateKey::new(ResourceKind::User, "crowd-task-user"))
            .await
            .unwrap();

        let mut second = Reconciler::new(&provider, &store, "/crowd-task/");
        let user = second.ensure_user("crowd-task-user").await.unwrap();
        assert_eq!(second.outcomes()[0].action, Action::Refreshed);
        assert_eq!(
            store
                .get::<UserDescriptor>(&StateKey::new(ResourceKind::User, "crowd-task-user"))
                .await
                .unwrap(),
            Some(user)
        );
        assert_eq!(provider.creations().await.len(), 1);
    }
}
