use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand};
use crowd_provision_core::config::{
    DEFAULT_LOGGER_PACKAGE, DEFAULT_RESOURCE_PREFIX, DEFAULT_STATE_DIR,
};
use crowd_provision_core::ProvisionSettings;

#[derive(Parser)]
#[command(name = "crowd-provision")]
#[command(about = "Provision the AWS backend of a crowdsourcing task, idempotently")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Raise log verbosity (-v info, -vv debug, -vvv trace). RUST_LOG takes precedence
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    #[command(flatten)]
    pub settings: SettingsArgs,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create or reuse every resource of the task and write its environment
    Provision {
        /// Print the run report as JSON on stdout
        #[arg(long)]
        json: bool,
    },
    /// Simulate every required action for the current credentials
    CheckPermissions,
    /// List the entries of the local state directory without calling AWS
    Status {
        /// Print the entries as JSON on stdout
        #[arg(long)]
        json: bool,
    },
}

/// Run settings. Each falls back to its environment variable, which may in
/// turn come from a `.env` file.
#[derive(Args)]
pub struct SettingsArgs {
    /// Task identifier
    #[arg(long, global = true, env = "TASK_NAME")]
    pub task_name: Option<String>,

    /// Batch identifier within the task
    #[arg(long, global = true, env = "BATCH_NAME")]
    pub batch_name: Option<String>,

    /// AWS region every resource is created in
    #[arg(long, global = true, env = "AWS_REGION")]
    pub region: Option<String>,

    /// Named AWS profile to load credentials from
    #[arg(long, global = true, env = "AWS_PROFILE")]
    pub profile: Option<String>,

    /// Bucket holding task data
    #[arg(long, global = true, env = "AWS_PRIVATE_BUCKET")]
    pub private_bucket: Option<String>,

    /// Publicly readable bucket the task is deployed to
    #[arg(long, global = true, env = "AWS_DEPLOY_BUCKET")]
    pub deploy_bucket: Option<String>,

    /// Administrator of the published task
    #[arg(long, global = true, env = "ADMIN_USER")]
    pub admin_user: Option<String>,

    /// Administrator password of the published task
    #[arg(long, global = true, env = "ADMIN_PASSWORD", hide_env_values = true)]
    pub admin_password: Option<String>,

    /// Token for the IP geolocation service used by the task
    #[arg(long, global = true, env = "IP_INFO_TOKEN", hide_env_values = true)]
    pub ip_info_token: Option<String>,

    /// Prefix of every resource name
    #[arg(long, global = true, env = "RESOURCE_PREFIX", default_value = DEFAULT_RESOURCE_PREFIX)]
    pub resource_prefix: String,

    /// Local state directory
    #[arg(long, global = true, env = "STATE_DIR", default_value = DEFAULT_STATE_DIR)]
    pub state_dir: PathBuf,

    /// Zip package of the logger function
    #[arg(long, global = true, env = "LOGGER_PACKAGE", default_value = DEFAULT_LOGGER_PACKAGE)]
    pub logger_package: PathBuf,
}

impl SettingsArgs {
    pub fn to_settings(&self) -> ProvisionSettings {
        ProvisionSettings {
            task_name: self.task_name.clone(),
            batch_name: self.batch_name.clone(),
            region: self.region.clone(),
            profile: self.profile.clone(),
            private_bucket: self.private_bucket.clone(),
            deploy_bucket: self.deploy_bucket.clone(),
            admin_user: self.admin_user.clone(),
            admin_password: self.admin_password.clone(),
            ip_info_token: self.ip_info_token.clone(),
            resource_prefix: Some(self.resource_prefix.clone()),
            state_dir: Some(self.state_dir.clone()),
            logger_package: Some(self.logger_package.clone()),
        }
    }
}
