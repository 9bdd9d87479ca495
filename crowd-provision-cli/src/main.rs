mod cli;
mod output;

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use serde::Serialize;

use cli::{Cli, Commands};
use crowd_provision_core::{
    denied_actions, AwsProvider, LocalStateStore, PermissionCheckResult, ProvisionConfig,
    ProvisionError, Provisioner, ResourceKind, SIMULATE_ACTION,
};
use output::{print_error, print_permissions, print_report, print_success, print_warning};

/// Exit code when configuration or permissions must change before a re-run.
const EXIT_OPERATOR_ACTION: i32 = 2;

#[tokio::main]
async fn main() {
    if let Err(e) = dotenvy::dotenv() {
        if !matches!(e, dotenvy::Error::Io(ref io_err) if io_err.kind() == std::io::ErrorKind::NotFound)
        {
            eprintln!("Warning: Failed to load .env file: {e}");
        }
    }

    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli).await {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            print_error(&format!("{e:#}"));
            let operator_action = e
                .downcast_ref::<ProvisionError>()
                .is_some_and(ProvisionError::requires_operator_action);
            std::process::exit(if operator_action { EXIT_OPERATOR_ACTION } else { 1 });
        }
    }
}

/// Default log filter for the number of `-v` flags.
fn log_level(verbose: u8) -> &'static str {
    match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}

fn init_logging(verbose: u8) {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level(verbose)))
        .format_timestamp(None)
        .init();
}

async fn run(cli: Cli) -> Result<i32> {
    match cli.command {
        Commands::Provision { json } => {
            let config = cli.settings.to_settings().resolve()?;
            let mut provisioner = Provisioner::new(connect(&config).await, config);
            let report = provisioner.run().await?;
            print_report(&report);
            if json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&report).context("Failed to render report")?
                );
            }
            Ok(0)
        }
        Commands::CheckPermissions => {
            let config = cli.settings.to_settings().resolve()?;
            let provisioner = Provisioner::new(connect(&config).await, config);
            log::info!("Evaluating required actions with {SIMULATE_ACTION}");
            let (caller, results) = provisioner.check_permissions().await?;
            let Some(results) = results else {
                print_warning(&format!(
                    "{} is the account root user, which holds every permission",
                    caller.arn
                ));
                return Ok(0);
            };
            print_permissions(&caller, &results);
            let denied = denied_actions(&results);
            if denied.is_empty() {
                print_success(&format!("All {} required actions are allowed", results.len()));
            } else {
                print_error(&format!(
                    "{} of {} required actions are denied. Grant them to {} and run again",
                    denied.len(),
                    results.len(),
                    caller.arn
                ));
            }
            Ok(permissions_exit_code(&results))
        }
        Commands::Status { json } => {
            status(&LocalStateStore::new(&cli.settings.state_dir), json).await?;
            Ok(0)
        }
    }
}

/// Exit code of `check-permissions`: any denied action needs the operator.
fn permissions_exit_code(results: &[PermissionCheckResult]) -> i32 {
    if results.iter().any(PermissionCheckResult::is_denied) {
        EXIT_OPERATOR_ACTION
    } else {
        0
    }
}

async fn connect(config: &ProvisionConfig) -> AwsProvider {
    log::debug!(
        "Loading AWS configuration for {} (profile {})",
        config.region,
        config.profile.as_deref().unwrap_or("default")
    );
    AwsProvider::from_env(&config.region, config.profile.as_deref()).await
}

#[derive(Serialize)]
struct StatusEntry {
    kind: ResourceKind,
    key: String,
    path: String,
}

async fn status(store: &LocalStateStore, json: bool) -> Result<()> {
    let mut entries = Vec::new();
    for kind in ResourceKind::ALL {
        for key in store
            .list(kind)
            .await
            .with_context(|| format!("Failed to list {kind} entries"))?
        {
            entries.push(StatusEntry {
                kind,
                path: store.path_for(&key).display().to_string(),
                key: key.to_string(),
            });
        }
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }
    if entries.is_empty() {
        print_warning(&format!(
            "No local state in {}. Run `crowd-provision provision` first",
            store.root().display()
        ));
        return Ok(());
    }
    eprintln!("{} {}", "State".cyan(), store.root().display());
    for entry in &entries {
        eprintln!("  {:<20} {}", entry.kind.as_str(), entry.key);
    }
    print_success(&format!("{} entries", entries.len()));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crowd_provision_core::PermissionDecision;

    fn check(action: &str, decision: PermissionDecision) -> PermissionCheckResult {
        PermissionCheckResult {
            action_name: action.to_string(),
            decision,
        }
    }

    #[test]
    fn test_any_denied_action_exits_with_operator_action() {
        let allowed = vec![
            check("s3:CreateBucket", PermissionDecision::Allow),
            check("sqs:CreateQueue", PermissionDecision::Allow),
        ];
        assert_eq!(permissions_exit_code(&allowed), 0);
        assert_eq!(permissions_exit_code(&[]), 0);

        let mut one_denied = allowed;
        one_denied.push(check("lambda:CreateFunction", PermissionDecision::Deny));
        assert_eq!(permissions_exit_code(&one_denied), EXIT_OPERATOR_ACTION);
    }

    #[test]
    fn test_verbosity_levels() {
        assert_eq!(log_level(0), "warn");
        assert_eq!(log_level(1), "info");
        assert_eq!(log_level(2), "debug");
        assert_eq!(log_level(3), "trace");
        assert_eq!(log_level(9), "trace");
    }

    #[test]
    fn test_simulator_hint_names_the_action() {
        let err = ProvisionError::SimulationDenied {
            principal: "arn:aws:iam::123456789012:user/admin".to_string(),
            detail: "denied".to_string(),
        };
        assert!(err.to_string().contains(SIMULATE_ACTION));
        assert!(anyhow::Error::from(err)
            .downcast_ref::<ProvisionError>()
            .is_some_and(ProvisionError::requires_operator_action));
    }
}
