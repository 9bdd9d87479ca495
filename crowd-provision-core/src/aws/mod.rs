//! AWS SDK integration: provider traits, the SDK-backed provider, principal
//! parsing and normalization of provider error conditions.

mod apigateway;
mod client;
mod dynamodb;
mod iam_client;
mod identity;
mod lambda;
pub mod principal;
pub mod provider;
mod s3;
mod sqs;

pub use client::AwsProvider;
pub use provider::{
    CloudProvider, FunctionApi, HttpApi, IamApi, IdentityApi, QueueApi, StorageApi, TableApi,
};

use aws_sdk_iam::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_iam::primitives::DateTime;
use thiserror::Error;

/// Provider conditions the prober knows how to interpret.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The resource already exists and belongs to the caller.
    AlreadyExists,
    /// The resource or configuration does not exist.
    NotFound,
    /// The caller is not allowed to perform the operation.
    AccessDenied,
    /// Anything else, including transport failures and timeouts.
    Other,
}

#[derive(Error, Debug, Clone)]
#[error("{operation} failed ({}): {message}", .code.as_deref().unwrap_or("no error code"))]
pub struct ProviderError {
    pub kind: ErrorKind,
    pub operation: String,
    pub code: Option<String>,
    pub message: String,
}

pub type ProviderResult<T> = Result<T, ProviderError>;

impl ProviderError {
    pub fn new(kind: ErrorKind, operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            operation: operation.into(),
            code: None,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn is(&self, kind: ErrorKind) -> bool {
        self.kind == kind
    }

    /// A response that lacked a member the operation always returns.
    pub fn missing_member(operation: &str, member: &str) -> Self {
        Self::new(
            ErrorKind::Other,
            operation,
            format!("response did not contain {member}"),
        )
    }
}

const ALREADY_EXISTS_CODES: &[&str] = &[
    "EntityAlreadyExists",
    "BucketAlreadyOwnedByYou",
    "QueueAlreadyExists",
    "QueueNameExists",
    "ResourceInUseException",
    "ResourceConflictException",
    "ConflictException",
];

const NOT_FOUND_CODES: &[&str] = &[
    "NoSuchEntity",
    "NoSuchBucket",
    "NoSuchBucketPolicy",
    "NoSuchCORSConfiguration",
    "ResourceNotFoundException",
    "NotFoundException",
    "AWS.SimpleQueueService.NonExistentQueue",
    "QueueDoesNotExist",
];

const ACCESS_DENIED_CODES: &[&str] = &[
    "AccessDenied",
    "AccessDeniedException",
    "UnauthorizedOperation",
    "AuthorizationError",
];

/// Map a provider error code onto the conditions the prober understands.
/// Errors without a code (dispatch failures, timeouts) are always `Other`.
pub fn classify_code(code: Option<&str>) -> ErrorKind {
    match code {
        Some(code) if ALREADY_EXISTS_CODES.contains(&code) => ErrorKind::AlreadyExists,
        Some(code) if NOT_FOUND_CODES.contains(&code) => ErrorKind::NotFound,
        Some(code) if ACCESS_DENIED_CODES.contains(&code) => ErrorKind::AccessDenied,
        _ => ErrorKind::Other,
    }
}

/// Convert any SDK operation error into a [`ProviderError`].
pub(crate) fn sdk_error<E, R>(operation: &str, err: SdkError<E, R>) -> ProviderError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
    R: std::fmt::Debug,
{
    let code = err.code().map(str::to_string);
    let message = err
        .message()
        .map_or_else(|| DisplayErrorContext(&err).to_string(), str::to_string);
    let kind = classify_code(code.as_deref());
    log::debug!("{operation} returned {kind:?} ({code:?}): {message}");

    ProviderError {
        kind,
        operation: operation.to_string(),
        code,
        message,
    }
}

/// SDK accessors return `&str` for members the service model marks required
/// and `Option<&str>` otherwise; both are accepted here.
pub(crate) fn text<'a>(value: impl Into<Option<&'a str>>) -> String {
    value.into().unwrap_or_default().to_string()
}

pub(crate) fn optional_text<'a>(value: impl Into<Option<&'a str>>) -> Option<String> {
    value.into().map(str::to_string)
}

pub(crate) fn timestamp<'a>(value: impl Into<Option<&'a DateTime>>) -> Option<String> {
    value.into().map(ToString::to_string)
}

/// Pagination flags are `bool` in some service models and `Option<bool>` in
/// others.
pub(crate) fn flag(value: impl Into<Option<bool>>) -> bool {
    value.into().unwrap_or(false)
}

/// Same as [`text`] for structure and enum members.
pub(crate) fn member<'a, T>(value: impl Into<Option<&'a T>>) -> Option<&'a T>
where
    T: 'a,
{
    value.into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(Some("EntityAlreadyExists"), ErrorKind::AlreadyExists)]
    #[case(Some("BucketAlreadyOwnedByYou"), ErrorKind::AlreadyExists)]
    #[case(Some("ResourceInUseException"), ErrorKind::AlreadyExists)]
    #[case(Some("ResourceConflictException"), ErrorKind::AlreadyExists)]
    #[case(Some("NoSuchBucketPolicy"), ErrorKind::NotFound)]
    #[case(Some("NoSuchCORSConfiguration"), ErrorKind::NotFound)]
    #[case(Some("NoSuchEntity"), ErrorKind::NotFound)]
    #[case(Some("AccessDenied"), ErrorKind::AccessDenied)]
    #[case(Some("BucketAlreadyExists"), ErrorKind::Other)]
    #[case(Some("Throttling"), ErrorKind::Other)]
    #[case(None, ErrorKind::Other)]
    fn test_classify_code(#[case] code: Option<&str>, #[case] expected: ErrorKind) {
        assert_eq!(classify_code(code), expected);
    }

    #[test]
    fn test_provider_error_display_includes_code() {
        let err = ProviderError::new(ErrorKind::NotFound, "GetBucketPolicy", "no policy")
            .with_code("NoSuchBucketPolicy");
        let message = err.to_string();
        assert!(message.contains("GetBucketPolicy"));
        assert!(message.contains("NoSuchBucketPolicy"));
        assert!(err.is(ErrorKind::NotFound));
    }

    #[test]
    fn test_text_accepts_required_and_optional_members() {
        assert_eq!(text("user"), "user");
        assert_eq!(text(Some("user")), "user");
        assert_eq!(text(None::<&str>), "");
        assert_eq!(optional_text(None::<&str>), None);
    }
}
