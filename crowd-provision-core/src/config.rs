//! Run configuration and deterministic resource naming.

use std::fmt;
use std::path::PathBuf;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::{ProvisionError, ProvisionResult};
use crate::types::TableSpec;

pub const DEFAULT_RESOURCE_PREFIX: &str = "crowd-task";
pub const DEFAULT_STATE_DIR: &str = "data/build/aws";
pub const DEFAULT_LOGGER_PACKAGE: &str = "aws/logger/logger.zip";

/// Longest name IAM accepts for users and roles, and Lambda for functions.
const MAX_NAME_LEN: usize = 64;

static BUCKET_NAME_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z0-9][a-z0-9.-]{1,61}[a-z0-9]$").expect("valid bucket name regex")
});

static IDENTIFIER_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]+$").expect("valid identifier regex"));

static IPV4_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{1,3}(\.\d{1,3}){3}$").expect("valid address regex"));

/// Raw configuration as collected from flags, the environment and `.env`.
/// Every field may be missing; [`ProvisionSettings::resolve`] decides what is
/// required.
#[derive(Clone, Default)]
pub struct ProvisionSettings {
    pub task_name: Option<String>,
    pub batch_name: Option<String>,
    pub region: Option<String>,
    pub profile: Option<String>,
    pub private_bucket: Option<String>,
    pub deploy_bucket: Option<String>,
    pub admin_user: Option<String>,
    pub admin_password: Option<String>,
    pub ip_info_token: Option<String>,
    pub resource_prefix: Option<String>,
    pub state_dir: Option<PathBuf>,
    pub logger_package: Option<PathBuf>,
}

/// Validated configuration of one provisioning run.
#[derive(Clone, PartialEq, Eq)]
pub struct ProvisionConfig {
    pub task_name: String,
    pub batch_name: String,
    pub region: String,
    pub profile: Option<String>,
    pub private_bucket: String,
    pub deploy_bucket: String,
    pub admin_user: String,
    pub admin_password: String,
    pub ip_info_token: Option<String>,
    pub resource_prefix: String,
    pub state_dir: PathBuf,
    pub logger_package: PathBuf,
}

impl fmt::Debug for ProvisionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProvisionConfig")
            .field("task_name", &self.task_name)
            .field("batch_name", &self.batch_name)
            .field("region", &self.region)
            .field("profile", &self.profile)
            .field("private_bucket", &self.private_bucket)
            .field("deploy_bucket", &self.deploy_bucket)
            .field("admin_user", &self.admin_user)
            .field("resource_prefix", &self.resource_prefix)
            .field("state_dir", &self.state_dir)
            .field("logger_package", &self.logger_package)
            .finish_non_exhaustive()
    }
}

fn present(value: Option<&String>) -> Option<String> {
    value.map(|v| v.trim()).filter(|v| !v.is_empty()).map(str::to_string)
}

fn required(value: Option<&String>, variable: &str, missing: &mut Vec<String>) -> String {
    present(value).unwrap_or_else(|| {
        missing.push(variable.to_string());
        String::new()
    })
}

pub fn is_valid_bucket_name(name: &str) -> bool {
    BUCKET_NAME_REGEX.is_match(name) && !name.contains("..") && !IPV4_REGEX.is_match(name)
}

impl ProvisionSettings {
    /// Validate the settings. Every missing required value is reported in a
    /// single [`ProvisionError::MissingConfig`].
    pub fn resolve(&self) -> ProvisionResult<ProvisionConfig> {
        let mut missing = Vec::new();
        let task_name = required(self.task_name.as_ref(), "TASK_NAME", &mut missing);
        let batch_name = required(self.batch_name.as_ref(), "BATCH_NAME", &mut missing);
        let region = required(self.region.as_ref(), "AWS_REGION", &mut missing);
        let private_bucket =
            required(self.private_bucket.as_ref(), "AWS_PRIVATE_BUCKET", &mut missing);
        let deploy_bucket = required(self.deploy_bucket.as_ref(), "AWS_DEPLOY_BUCKET", &mut missing);
        let admin_user = required(self.admin_user.as_ref(), "ADMIN_USER", &mut missing);
        let admin_password = required(self.admin_password.as_ref(), "ADMIN_PASSWORD", &mut missing);
        if !missing.is_empty() {
            return Err(ProvisionError::MissingConfig(missing));
        }

        let resource_prefix = present(self.resource_prefix.as_ref())
            .unwrap_or_else(|| DEFAULT_RESOURCE_PREFIX.to_string());

        for (variable, value) in [
            ("TASK_NAME", &task_name),
            ("BATCH_NAME", &batch_name),
            ("RESOURCE_PREFIX", &resource_prefix),
        ] {
            if !IDENTIFIER_REGEX.is_match(value) {
                return Err(ProvisionError::invalid_config(format!(
                    "{variable} '{value}' may only contain letters, digits, '-' and '_'"
                )));
            }
        }
        for (variable, value) in [
            ("AWS_PRIVATE_BUCKET", &private_bucket),
            ("AWS_DEPLOY_BUCKET", &deploy_bucket),
        ] {
            if !is_valid_bucket_name(value) {
                return Err(ProvisionError::invalid_config(format!(
                    "{variable} '{value}' is not a valid S3 bucket name"
                )));
            }
        }
        if private_bucket == deploy_bucket {
            return Err(ProvisionError::invalid_config(
                "AWS_PRIVATE_BUCKET and AWS_DEPLOY_BUCKET must name different buckets",
            ));
        }

        let config = ProvisionConfig {
            task_name,
            batch_name,
            region,
            profile: present(self.profile.as_ref()),
            private_bucket,
            deploy_bucket,
            admin_user,
            admin_password,
            ip_info_token: present(self.ip_info_token.as_ref()),
            resource_prefix,
            state_dir: self
                .state_dir
                .clone()
                .unwrap_or_else(|| PathBuf::from(DEFAULT_STATE_DIR)),
            logger_package: self
                .logger_package
                .clone()
                .unwrap_or_else(|| PathBuf::from(DEFAULT_LOGGER_PACKAGE)),
        };

        let names = config.names();
        if let Some(long) = names.length_limited().find(|name| name.len() > MAX_NAME_LEN) {
            return Err(ProvisionError::invalid_config(format!(
                "derived resource name '{long}' exceeds {MAX_NAME_LEN} characters; \
                 shorten RESOURCE_PREFIX, TASK_NAME or BATCH_NAME"
            )));
        }
        Ok(config)
    }
}

/// Names of every resource a run manages, derived from prefix, task and
/// batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceNames {
    pub iam_path: String,
    pub user: String,
    pub user_policy: String,
    pub logger_policy: String,
    pub role: String,
    pub queue: String,
    pub data_table: String,
    pub acl_table: String,
    pub logger_table: String,
    pub function: String,
    pub api: String,
    pub invoke_statement_id: String,
    pub environment: String,
}

impl ResourceNames {
    pub fn new(prefix: &str, task: &str, batch: &str) -> Self {
        let base = format!("{prefix}-{task}-{batch}");
        Self {
            iam_path: format!("/{prefix}/"),
            user: format!("{prefix}-user"),
            user_policy: format!("{base}-user-policy"),
            logger_policy: format!("{base}-logger-policy"),
            role: format!("{base}-logger-role"),
            queue: format!("{base}-logger"),
            data_table: format!("{base}-data"),
            acl_table: format!("{base}-acl"),
            logger_table: format!("{base}-logger"),
            function: format!("{base}-logger"),
            api: format!("{base}-logger-api"),
            invoke_statement_id: format!("{base}-api-invoke"),
            environment: format!("{task}-{batch}"),
        }
    }

    /// Tables keyed by their role in the task (`data`, `acl`, `logger`).
    pub fn tables(&self) -> [(&'static str, &str); 3] {
        [
            ("data", self.data_table.as_str()),
            ("acl", self.acl_table.as_str()),
            ("logger", self.logger_table.as_str()),
        ]
    }

    pub fn table_specs(&self) -> Vec<TableSpec> {
        self.tables()
            .iter()
            .map(|(_, name)| TableSpec {
                name: (*name).to_string(),
                partition_key: "identifier".to_string(),
                sort_key: None,
            })
            .collect()
    }

    fn length_limited(&self) -> impl Iterator<Item = &str> {
        [
            self.user.as_str(),
            self.role.as_str(),
            self.function.as_str(),
        ]
        .into_iter()
    }
}

impl ProvisionConfig {
    pub fn names(&self) -> ResourceNames {
        ResourceNames::new(&self.resource_prefix, &self.task_name, &self.batch_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn complete() -> ProvisionSettings {
        ProvisionSettings {
            task_name: Some("sentiment".to_string()),
            batch_name: Some("batch-1".to_string()),
            region: Some("eu-west-1".to_string()),
            private_bucket: Some("crowd-private".to_string()),
            deploy_bucket: Some("crowd-deploy".to_string()),
            admin_user: Some("admin".to_string()),
            admin_password: Some("hunter2".to_string()),
            ..ProvisionSettings::default()
        }
    }

    #[test]
    fn test_resolve_reports_every_missing_value() {
        let settings = ProvisionSettings {
            task_name: Some("sentiment".to_string()),
            region: Some("  ".to_string()),
            ..ProvisionSettings::default()
        };
        match settings.resolve().unwrap_err() {
            ProvisionError::MissingConfig(missing) => assert_eq!(
                missing,
                vec![
                    "BATCH_NAME",
                    "AWS_REGION",
                    "AWS_PRIVATE_BUCKET",
                    "AWS_DEPLOY_BUCKET",
                    "ADMIN_USER",
                    "ADMIN_PASSWORD",
                ]
            ),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_resolve_applies_defaults() {
        let config = complete().resolve().unwrap();
        assert_eq!(config.resource_prefix, DEFAULT_RESOURCE_PREFIX);
        assert_eq!(config.state_dir, PathBuf::from(DEFAULT_STATE_DIR));
        assert_eq!(config.logger_package, PathBuf::from(DEFAULT_LOGGER_PACKAGE));
        assert_eq!(config.ip_info_token, None);
    }

    #[rstest]
    #[case("Crowd-Private")]
    #[case("ab")]
    #[case("crowd..private")]
    #[case("192.168.1.1")]
    #[case("-crowd")]
    fn test_resolve_rejects_bucket_names(#[case] bucket: &str) {
        let settings = ProvisionSettings {
            private_bucket: Some(bucket.to_string()),
            ..complete()
        };
        assert!(matches!(
            settings.resolve(),
            Err(ProvisionError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_resolve_rejects_same_bucket_twice() {
        let settings = ProvisionSettings {
            deploy_bucket: Some("crowd-private".to_string()),
            ..complete()
        };
        assert!(settings.resolve().is_err());
    }

    #[test]
    fn test_resolve_rejects_overlong_names() {
        let settings = ProvisionSettings {
            task_name: Some("t".repeat(60)),
            ..complete()
        };
        assert!(matches!(
            settings.resolve(),
            Err(ProvisionError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_debug_hides_password() {
        let config = complete().resolve().unwrap();
        assert!(!format!("{config:?}").contains("hunter2"));
    }

    #[test]
    fn test_names_are_deterministic() {
        let names = ResourceNames::new("crowd-task", "sentiment", "batch-1");
        assert_eq!(names.iam_path, "/crowd-task/");
        assert_eq!(names.user, "crowd-task-user");
        assert_eq!(names.role, "crowd-task-sentiment-batch-1-logger-role");
        assert_eq!(names.queue, "crowd-task-sentiment-batch-1-logger");
        assert_eq!(names.environment, "sentiment-batch-1");
        assert_eq!(names, ResourceNames::new("crowd-task", "sentiment", "batch-1"));

        let specs = names.table_specs();
        assert_eq!(specs.len(), 3);
        assert!(specs.iter().all(|s| s.partition_key == "identifier"));
        assert_eq!(specs[1].name, "crowd-task-sentiment-batch-1-acl");
    }
}
