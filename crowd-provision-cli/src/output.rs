//! Operator-facing output. Human-readable text goes to stderr; stdout is
//! reserved for `--json`.

use colored::Colorize;
use crowd_provision_core::{
    Action, CallerIdentity, PermissionCheckResult, PermissionDecision, ProvisionReport,
    StepOutcome,
};

pub fn print_success(msg: &str) {
    eprintln!("{} {}", "✓".green(), msg);
}

pub fn print_warning(msg: &str) {
    eprintln!("{} {}", "!".yellow(), msg);
}

pub fn print_error(msg: &str) {
    eprintln!("{} {}", "✗".red(), msg);
}

fn action_label(action: Action) -> colored::ColoredString {
    let label = format!("{action:>9}");
    match action {
        Action::Created => label.green(),
        Action::ReusedRemote | Action::ReusedLocal => label.dimmed(),
        Action::Refreshed => label.cyan(),
        Action::Repaired => label.yellow(),
    }
}

fn print_outcome(outcome: &StepOutcome) {
    let line = format!(
        "{} {:<20} {}",
        action_label(outcome.action),
        outcome.kind.as_str(),
        outcome.name
    );
    match &outcome.detail {
        Some(detail) => eprintln!("{line} {}", format!("({detail})").dimmed()),
        None => eprintln!("{line}"),
    }
}

pub fn print_report(report: &ProvisionReport) {
    eprintln!(
        "{} {} ({})",
        "Account".cyan(),
        report.account_id,
        report.caller_arn
    );
    for outcome in &report.outcomes {
        print_outcome(outcome);
    }
    let repaired = report.count(Action::Repaired);
    if repaired > 0 {
        print_warning(&format!(
            "{repaired} access key(s) without a recoverable secret were deleted"
        ));
    }
    print_success(&format!(
        "{} created, {} reused, {} refreshed. Active access key {}",
        report.count(Action::Created),
        report.count(Action::ReusedRemote) + report.count(Action::ReusedLocal),
        report.count(Action::Refreshed),
        report.active_access_key_id
    ));
    print_success(&format!(
        "Task environment written to {}",
        report.environment_file.display()
    ));
}

pub fn print_permissions(caller: &CallerIdentity, results: &[PermissionCheckResult]) {
    eprintln!("{} {}", "Caller".cyan(), caller.arn);
    for result in results {
        let decision = match result.decision {
            PermissionDecision::Allow => "Allow".green(),
            PermissionDecision::Deny => "Deny ".red(),
        };
        eprintln!("  {decision} {}", result.action_name);
    }
}
