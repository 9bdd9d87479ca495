//! IAM and S3 policy documents the provisioning run attaches.
//!
//! Documents are built deterministically from resource names so that the
//! same configuration always yields byte-identical JSON.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::types::CorsRule;

pub const POLICY_VERSION: &str = "2012-10-17";

/// A single value or a list, as IAM accepts for `Action`, `Resource` and
/// principal entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl OneOrMany {
    pub fn contains(&self, value: &str) -> bool {
        match self {
            Self::One(one) => one == value,
            Self::Many(many) => many.iter().any(|v| v == value),
        }
    }
}

impl From<Vec<String>> for OneOrMany {
    fn from(mut values: Vec<String>) -> Self {
        if values.len() == 1 {
            Self::One(values.remove(0))
        } else {
            Self::Many(values)
        }
    }
}

impl From<&str> for OneOrMany {
    fn from(value: &str) -> Self {
        Self::One(value.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Principal {
    /// `"*"`
    Wildcard(String),
    /// `{"Service": "lambda.amazonaws.com"}`, `{"AWS": "*"}` and the like.
    Mapped(BTreeMap<String, OneOrMany>),
}

impl Principal {
    pub fn anyone() -> Self {
        Self::Wildcard("*".to_string())
    }

    pub fn service(service: &str) -> Self {
        Self::Mapped(BTreeMap::from([("Service".to_string(), service.into())]))
    }

    pub fn is_anyone(&self) -> bool {
        match self {
            Self::Wildcard(value) => value == "*",
            Self::Mapped(map) => map.get("AWS").is_some_and(|aws| aws.contains("*")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Statement {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sid: Option<String>,
    pub effect: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub principal: Option<Principal>,
    pub action: OneOrMany,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource: Option<OneOrMany>,
}

impl Statement {
    pub fn allow(sid: &str, actions: &[&str], resources: Vec<String>) -> Self {
        Self {
            sid: Some(sid.to_string()),
            effect: "Allow".to_string(),
            principal: None,
            action: actions
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .into(),
            resource: Some(resources.into()),
        }
    }

    #[must_use]
    pub fn with_principal(mut self, principal: Principal) -> Self {
        self.principal = Some(principal);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PolicyDocument {
    pub version: String,
    pub statement: Vec<Statement>,
}

impl PolicyDocument {
    pub fn new(statement: Vec<Statement>) -> Self {
        Self {
            version: POLICY_VERSION.to_string(),
            statement,
        }
    }

    /// Whether any statement allows access to every principal.
    pub fn grants_public_access(&self) -> bool {
        self.statement.iter().any(|s| {
            s.effect == "Allow" && s.principal.as_ref().is_some_and(Principal::is_anyone)
        })
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

pub fn bucket_arn(bucket: &str) -> String {
    format!("arn:aws:s3:::{bucket}")
}

pub fn bucket_objects_arn(bucket: &str) -> String {
    format!("arn:aws:s3:::{bucket}/*")
}

pub fn queue_arn(region: &str, account_id: &str, queue: &str) -> String {
    format!("arn:aws:sqs:{region}:{account_id}:{queue}")
}

pub fn table_arn(region: &str, account_id: &str, table: &str) -> String {
    format!("arn:aws:dynamodb:{region}:{account_id}:table/{table}")
}

pub fn log_group_arn(region: &str, account_id: &str, function: &str) -> String {
    format!("arn:aws:logs:{region}:{account_id}:log-group:/aws/lambda/{function}:*")
}

/// Source ARN API Gateway presents when invoking an integration of `api_id`.
pub fn execute_api_arn(region: &str, account_id: &str, api_id: &str) -> String {
    format!("arn:aws:execute-api:{region}:{account_id}:{api_id}/*/*")
}

/// Policy of the task's IAM user: object access on both buckets, sending
/// log records and item access on the task tables.
pub fn task_user_policy(
    private_bucket: &str,
    deploy_bucket: &str,
    queue_arn: &str,
    table_arns: &[String],
) -> PolicyDocument {
    PolicyDocument::new(vec![
        Statement::allow(
            "BucketListing",
            &["s3:ListBucket", "s3:GetBucketLocation"],
            vec![bucket_arn(private_bucket), bucket_arn(deploy_bucket)],
        ),
        Statement::allow(
            "BucketObjects",
            &["s3:GetObject", "s3:PutObject", "s3:DeleteObject"],
            vec![
                bucket_objects_arn(private_bucket),
                bucket_objects_arn(deploy_bucket),
            ],
        ),
        Statement::allow(
            "LogQueue",
            &["sqs:SendMessage", "sqs:GetQueueUrl"],
            vec![queue_arn.to_string()],
        ),
        Statement::allow(
            "TaskTables",
            &[
                "dynamodb:GetItem",
                "dynamodb:PutItem",
                "dynamodb:UpdateItem",
                "dynamodb:DeleteItem",
                "dynamodb:Query",
                "dynamodb:Scan",
            ],
            table_arns.to_vec(),
        ),
    ])
}

/// Execution policy of the logger function.
pub fn logger_execution_policy(
    queue_arn: &str,
    table_arns: &[String],
    log_group_arn: &str,
) -> PolicyDocument {
    PolicyDocument::new(vec![
        Statement::allow(
            "ConsumeLogQueue",
            &[
                "sqs:ReceiveMessage",
                "sqs:DeleteMessage",
                "sqs:GetQueueAttributes",
            ],
            vec![queue_arn.to_string()],
        ),
        Statement::allow(
            "WriteTables",
            &["dynamodb:PutItem", "dynamodb:UpdateItem", "dynamodb:BatchWriteItem"],
            table_arns.to_vec(),
        ),
        Statement::allow(
            "FunctionLogs",
            &[
                "logs:CreateLogGroup",
                "logs:CreateLogStream",
                "logs:PutLogEvents",
            ],
            vec![log_group_arn.to_string()],
        ),
    ])
}

/// Trust policy letting Lambda assume the execution role.
pub fn lambda_trust_policy() -> PolicyDocument {
    PolicyDocument::new(vec![Statement {
        sid: None,
        effect: "Allow".to_string(),
        principal: Some(Principal::service("lambda.amazonaws.com")),
        action: "sts:AssumeRole".into(),
        resource: None,
    }])
}

/// Public read access to the published task files.
pub fn deploy_bucket_policy(deploy_bucket: &str) -> PolicyDocument {
    PolicyDocument::new(vec![Statement::allow(
        "PublicRead",
        &["s3:GetObject"],
        vec![bucket_objects_arn(deploy_bucket)],
    )
    .with_principal(Principal::anyone())])
}

/// Browser access from the published task page to both buckets.
pub fn default_cors_rules() -> Vec<CorsRule> {
    vec![CorsRule {
        allowed_headers: vec!["*".to_string()],
        allowed_methods: ["GET", "PUT", "POST", "DELETE", "HEAD"]
            .iter()
            .map(ToString::to_string)
            .collect(),
        allowed_origins: vec!["*".to_string()],
        expose_headers: vec!["ETag".to_string()],
        max_age_seconds: Some(3000),
    }]
}
