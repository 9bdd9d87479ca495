//! Principal ARN resolution for the policy simulator.

use crate::error::{ProvisionError, ProvisionResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrincipalKind {
    User,
    Role,
    /// The account root user. It cannot be simulated.
    Root,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrincipalInfo {
    pub kind: PrincipalKind,
    pub account_id: String,
    /// ARN accepted by `SimulatePrincipalPolicy` as the policy source.
    pub simulation_arn: String,
}

/// Resolve a caller ARN, as returned by `GetCallerIdentity`, to the IAM
/// principal whose policies govern it.
///
/// Assumed-role session ARNs map to the role they were assumed from; the
/// role path is not part of a session ARN, so roles created under a path
/// other than `/` resolve to a path-less ARN.
pub fn resolve_principal(arn: &str) -> ProvisionResult<PrincipalInfo> {
    let unsupported = || ProvisionError::UnsupportedPrincipal(arn.to_string());

    let parts: Vec<&str> = arn.splitn(6, ':').collect();
    let [prefix, partition, service, _region, account_id, resource] = parts.as_slice() else {
        return Err(unsupported());
    };
    if *prefix != "arn" || account_id.is_empty() {
        return Err(unsupported());
    }

    let info = |kind, simulation_arn: String| PrincipalInfo {
        kind,
        account_id: (*account_id).to_string(),
        simulation_arn,
    };

    match *service {
        "iam" if *resource == "root" => Ok(info(PrincipalKind::Root, arn.to_string())),
        "iam" if resource.starts_with("user/") => Ok(info(PrincipalKind::User, arn.to_string())),
        "iam" if resource.starts_with("role/") => Ok(info(PrincipalKind::Role, arn.to_string())),
        "sts" => {
            let mut segments = resource.split('/');
            match (segments.next(), segments.next(), segments.next()) {
                (Some("assumed-role"), Some(role), Some(_session)) if !role.is_empty() => {
                    Ok(info(
                        PrincipalKind::Role,
                        format!("arn:{partition}:iam::{account_id}:role/{role}"),
                    ))
                }
                _ => Err(unsupported()),
            }
        }
        _ => Err(unsupported()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(
        "arn:aws:iam::123456789012:user/admin",
        PrincipalKind::User,
        "arn:aws:iam::123456789012:user/admin"
    )]
    #[case(
        "arn:aws:iam::123456789012:user/ops/admin",
        PrincipalKind::User,
        "arn:aws:iam::123456789012:user/ops/admin"
    )]
    #[case(
        "arn:aws:iam::123456789012:role/Deployer",
        PrincipalKind::Role,
        "arn:aws:iam::123456789012:role/Deployer"
    )]
    #[case(
        "arn:aws:sts::123456789012:assumed-role/Deployer/session-1",
        PrincipalKind::Role,
        "arn:aws:iam::123456789012:role/Deployer"
    )]
    #[case(
        "arn:aws-cn:sts::123456789012:assumed-role/Deployer/ci",
        PrincipalKind::Role,
        "arn:aws-cn:iam::123456789012:role/Deployer"
    )]
    #[case(
        "arn:aws:iam::123456789012:root",
        PrincipalKind::Root,
        "arn:aws:iam::123456789012:root"
    )]
    fn test_resolve_principal(
        #[case] arn: &str,
        #[case] kind: PrincipalKind,
        #[case] simulation_arn: &str,
    ) {
        let info = resolve_principal(arn).unwrap();
        assert_eq!(info.kind, kind);
        assert_eq!(info.account_id, "123456789012");
        assert_eq!(info.simulation_arn, simulation_arn);
    }

    #[rstest]
    #[case("not-an-arn")]
    #[case("arn:aws:s3:::bucket")]
    #[case("arn:aws:sts::123456789012:federated-user/bob")]
    #[case("arn:aws:sts::123456789012:assumed-role/Deployer")]
    #[case("arn:aws:iam::123456789012:group/admins")]
    fn test_resolve_principal_rejects(#[case] arn: &str) {
        let err = resolve_principal(arn).unwrap_err();
        assert!(matches!(err, ProvisionError::UnsupportedPrincipal(_)));
    }
}
