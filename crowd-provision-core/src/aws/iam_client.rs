//! IAM operations for [`AwsProvider`]: managed policies, users, roles,
//! attachments and access keys.
//!
//! List operations follow the `marker`/`is_truncated` pagination IAM uses and
//! always return every page.

use async_trait::async_trait;
use aws_sdk_iam::types::{AccessKey, Policy, PolicyScopeType, Role, StatusType, User};

use super::client::AwsProvider;
use super::provider::IamApi;
use super::{flag, member, optional_text, sdk_error, text, timestamp, ProviderError, ProviderResult};
use crate::types::{
    AccessKeyRecord, AccessKeySummary, PolicyDescriptor, RoleDescriptor, UserDescriptor,
};

fn policy_descriptor(policy: &Policy) -> PolicyDescriptor {
    PolicyDescriptor {
        policy_name: text(policy.policy_name()),
        policy_id: text(policy.policy_id()),
        arn: text(policy.arn()),
        path: text(policy.path()),
        default_version_id: optional_text(policy.default_version_id()),
        create_date: timestamp(policy.create_date()),
    }
}

fn user_descriptor(user: &User) -> UserDescriptor {
    UserDescriptor {
        user_name: text(user.user_name()),
        user_id: text(user.user_id()),
        arn: text(user.arn()),
        path: text(user.path()),
        create_date: timestamp(user.create_date()),
    }
}

fn role_descriptor(role: &Role) -> RoleDescriptor {
    RoleDescriptor {
        role_name: text(role.role_name()),
        role_id: text(role.role_id()),
        arn: text(role.arn()),
        path: text(role.path()),
        create_date: timestamp(role.create_date()),
    }
}

fn status_text(status: Option<&StatusType>) -> Option<String> {
    status.map(|s| s.as_str().to_string())
}

fn access_key_record(key: &AccessKey) -> AccessKeyRecord {
    AccessKeyRecord {
        user_name: text(key.user_name()),
        access_key_id: text(key.access_key_id()),
        secret_access_key: text(key.secret_access_key()),
        status: status_text(member::<StatusType>(key.status())),
        create_date: timestamp(key.create_date()),
    }
}

#[async_trait]
impl IamApi for AwsProvider {
    async fn list_policies(&self, path_prefix: &str) -> ProviderResult<Vec<PolicyDescriptor>> {
        let mut policies = Vec::new();
        let mut marker: Option<String> = None;
        loop {
            let output = self
                .iam
                .list_policies()
                .scope(PolicyScopeType::Local)
                .path_prefix(path_prefix)
                .set_marker(marker.take())
                .send()
                .await
                .map_err(|e| sdk_error("ListPolicies", e))?;
            policies.extend(output.policies().iter().map(policy_descriptor));
            if !flag(output.is_truncated()) {
                break;
            }
            marker = optional_text(output.marker());
            if marker.is_none() {
                break;
            }
        }
        log::trace!("ListPolicies under {path_prefix} returned {}", policies.len());
        Ok(policies)
    }

    async fn create_policy(
        &self,
        name: &str,
        path: &str,
        document: &str,
    ) -> ProviderResult<PolicyDescriptor> {
        let output = self
            .iam
            .create_policy()
            .policy_name(name)
            .path(path)
            .policy_document(document)
            .send()
            .await
            .map_err(|e| sdk_error("CreatePolicy", e))?;
        member::<Policy>(output.policy())
            .map(policy_descriptor)
            .ok_or_else(|| ProviderError::missing_member("CreatePolicy", "Policy"))
    }

    async fn list_users(&self, path_prefix: &str) -> ProviderResult<Vec<UserDescriptor>> {
        let mut users = Vec::new();
        let mut marker: Option<String> = None;
        loop {
            let output = self
                .iam
                .list_users()
                .path_prefix(path_prefix)
                .set_marker(marker.take())
                .send()
                .await
                .map_err(|e| sdk_error("ListUsers", e))?;
            users.extend(output.users().iter().map(user_descriptor));
            if !flag(output.is_truncated()) {
                break;
            }
            marker = optional_text(output.marker());
            if marker.is_none() {
                break;
            }
        }
        Ok(users)
    }

    async fn create_user(&self, name: &str, path: &str) -> ProviderResult<UserDescriptor> {
        let output = self
            .iam
            .create_user()
            .user_name(name)
            .path(path)
            .send()
            .await
            .map_err(|e| sdk_error("CreateUser", e))?;
        member::<User>(output.user())
            .map(user_descriptor)
            .ok_or_else(|| ProviderError::missing_member("CreateUser", "User"))
    }

    async fn list_roles(&self, path_prefix: &str) -> ProviderResult<Vec<RoleDescriptor>> {
        let mut roles = Vec::new();
        let mut marker: Option<String> = None;
        loop {
            let output = self
                .iam
                .list_roles()
                .path_prefix(path_prefix)
                .set_marker(marker.take())
                .send()
                .await
                .map_err(|e| sdk_error("ListRoles", e))?;
            roles.extend(output.roles().iter().map(role_descriptor));
            if !flag(output.is_truncated()) {
                break;
            }
            marker = optional_text(output.marker());
            if marker.is_none() {
                break;
            }
        }
        Ok(roles)
    }

    async fn create_role(
        &self,
        name: &str,
        path: &str,
        trust_document: &str,
    ) -> ProviderResult<RoleDescriptor> {
        let output = self
            .iam
            .create_role()
            .role_name(name)
            .path(path)
            .assume_role_policy_document(trust_document)
            .send()
            .await
            .map_err(|e| sdk_error("CreateRole", e))?;
        member::<Role>(output.role())
            .map(role_descriptor)
            .ok_or_else(|| ProviderError::missing_member("CreateRole", "Role"))
    }

    async fn list_attached_user_policies(&self, user_name: &str) -> ProviderResult<Vec<String>> {
        let mut arns = Vec::new();
        let mut marker: Option<String> = None;
        loop {
            let output = self
                .iam
                .list_attached_user_policies()
                .user_name(user_name)
                .set_marker(marker.take())
                .send()
                .await
                .map_err(|e| sdk_error("ListAttachedUserPolicies", e))?;
            arns.extend(
                output
                    .attached_policies()
                    .iter()
                    .filter_map(|p| optional_text(p.policy_arn())),
            );
            if !flag(output.is_truncated()) {
                break;
            }
            marker = optional_text(output.marker());
            if marker.is_none() {
                break;
            }
        }
        Ok(arns)
    }

    async fn attach_user_policy(&self, user_name: &str, policy_arn: &str) -> ProviderResult<()> {
        self.iam
            .attach_user_policy()
            .user_name(user_name)
            .policy_arn(policy_arn)
            .send()
            .await
            .map_err(|e| sdk_error("AttachUserPolicy", e))?;
        Ok(())
    }

    async fn list_attached_role_policies(&self, role_name: &str) -> ProviderResult<Vec<String>> {
        let mut arns = Vec::new();
        let mut marker: Option<String> = None;
        loop {
            let output = self
                .iam
                .list_attached_role_policies()
                .role_name(role_name)
                .set_marker(marker.take())
                .send()
                .await
                .map_err(|e| sdk_error("ListAttachedRolePolicies", e))?;
            arns.extend(
                output
                    .attached_policies()
                    .iter()
                    .filter_map(|p| optional_text(p.policy_arn())),
            );
            if !flag(output.is_truncated()) {
                break;
            }
            marker = optional_text(output.marker());
            if marker.is_none() {
                break;
            }
        }
        Ok(arns)
    }

    async fn attach_role_policy(&self, role_name: &str, policy_arn: &str) -> ProviderResult<()> {
        self.iam
            .attach_role_policy()
            .role_name(role_name)
            .policy_arn(policy_arn)
            .send()
            .await
            .map_err(|e| sdk_error("AttachRolePolicy", e))?;
        Ok(())
    }

    async fn list_access_keys(&self, user_name: &str) -> ProviderResult<Vec<AccessKeySummary>> {
        let output = self
            .iam
            .list_access_keys()
            .user_name(user_name)
            .send()
            .await
            .map_err(|e| sdk_error("ListAccessKeys", e))?;
        Ok(output
            .access_key_metadata()
            .iter()
            .map(|key| AccessKeySummary {
                user_name: text(key.user_name()),
                access_key_id: text(key.access_key_id()),
                status: status_text(member::<StatusType>(key.status())),
                create_date: timestamp(key.create_date()),
            })
            .collect())
    }

    async fn create_access_key(&self, user_name: &str) -> ProviderResult<AccessKeyRecord> {
        let output = self
            .iam
            .create_access_key()
            .user_name(user_name)
            .send()
            .await
            .map_err(|e| sdk_error("CreateAccessKey", e))?;
        member::<AccessKey>(output.access_key())
            .map(access_key_record)
            .ok_or_else(|| ProviderError::missing_member("CreateAccessKey", "AccessKey"))
    }

    async fn delete_access_key(&self, user_name: &str, access_key_id: &str) -> ProviderResult<()> {
        self.iam
            .delete_access_key()
            .user_name(user_name)
            .access_key_id(access_key_id)
            .send()
            .await
            .map_err(|e| sdk_error("DeleteAccessKey", e))?;
        Ok(())
    }
}
