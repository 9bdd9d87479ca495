//! Core library for provisioning the AWS backend of a crowdsourcing task:
//! - Existence probing of every resource kind
//! - A local state store for descriptors the provider cannot return again
//! - Reconciliation of remote and local state into one action per resource
//! - A permission gate evaluated before anything is created
//!

pub mod aws;
pub mod config;
pub mod documents;
mod error;
mod permissions;
mod pipeline;
pub mod probe;
pub mod reconcile;
pub mod store;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
mod types;

// Re-exports for a small, focused public API
pub use aws::principal::{resolve_principal, PrincipalInfo, PrincipalKind};
pub use aws::{AwsProvider, CloudProvider, ErrorKind, ProviderError};
pub use config::{ProvisionConfig, ProvisionSettings, ResourceNames};
pub use error::{ProvisionError, ProvisionResult};
pub use permissions::{denied_actions, PermissionGate, REQUIRED_ACTIONS, SIMULATE_ACTION};
pub use pipeline::Provisioner;
pub use store::{LocalStateStore, StateKey, StoreError};
pub use types::{
    AccessKeyRecord, AccessKeySummary, Action, ApiDescriptor, ApiSpec, BucketDescriptor,
    CallerIdentity, CorsRule, EventSourceMappingDescriptor, FunctionDescriptor,
    FunctionPermissionDescriptor, FunctionSpec, PermissionCheckResult, PermissionDecision,
    PolicyAttachmentDescriptor, PolicyDescriptor, ProvisionReport, QueueDescriptor, ResourceKind,
    RoleDescriptor, StepOutcome, TableDescriptor, TableSpec, TaskEnvironment, UserDescriptor,
};
