use std::path::PathBuf;
use std::time::Duration;

use clap::Args;
use tokio_util::sync::CancellationToken;

use crate::models::RunReport;
use crate::orchestrator::Orchestrator;
use crate::provider::Bootstrap;
use crate::{loader, Result};

#[derive(Args, Debug, Clone, Default)]
pub struct IamServiceAccountArgs {
    /// Name of the iamserviceaccount to create, same as --name
    #[arg(value_name = "NAME")]
    pub name_arg: Option<String>,

    /// EKS cluster name
    #[arg(long, short = 'c')]
    pub cluster: Option<String>,

    /// Name of the iamserviceaccount to create
    #[arg(long)]
    pub name: Option<String>,

    /// Namespace where to create the iamserviceaccount [default: default]
    #[arg(long)]
    pub namespace: Option<String>,

    /// ARN of the policy where to create the iamserviceaccount
    #[arg(long = "attach-policy-arn", value_delimiter = ',')]
    pub attach_policy_arns: Vec<String>,

    /// ARN of the role to attach to the iamserviceaccount
    #[arg(long = "attach-role-arn")]
    pub attach_role_arn: Option<String>,

    /// Set a custom name for the created role
    #[arg(long)]
    pub role_name: Option<String>,

    /// Disable service account creation, only the role will be created
    #[arg(long)]
    pub role_only: bool,

    /// OIDC Thumbprint
    #[arg(long)]
    pub oidc_thumbprint: Option<String>,

    /// Used to tag the IAM role, e.g. "Owner=John Doe,Team=Some Team"
    #[arg(long, value_delimiter = ',', value_parser = parse_tag)]
    pub tags: Vec<(String, String)>,

    /// Create IAM roles for existing serviceaccounts and update the serviceaccount
    #[arg(long = "override-existing-serviceaccounts")]
    pub override_existing: bool,

    /// IAM service accounts to include, glob patterns over namespace/name
    #[arg(long, value_delimiter = ',')]
    pub include: Vec<String>,

    /// IAM service accounts to exclude, glob patterns over namespace/name
    #[arg(long, value_delimiter = ',')]
    pub exclude: Vec<String>,

    /// Apply the changes, without it only the plan is shown
    #[arg(long)]
    pub approve: bool,

    /// AWS region, defaults to $AWS_REGION
    #[arg(long, short = 'r')]
    pub region: Option<String>,

    /// Region from the environment, only used when neither the flag nor the config file set one
    #[arg(skip = region_from_env())]
    pub env_region: Option<String>,

    /// Load configuration from a file
    #[arg(long, short = 'f')]
    pub config_file: Option<PathBuf>,

    /// Maximum waiting time for any long-running operation
    #[arg(long, default_value = "25m", value_parser = parse_duration)]
    pub timeout: Duration,
}

/// Loads the batch and reconciles it against the cluster.
pub async fn iam_service_account(
    args: IamServiceAccountArgs,
    bootstrap: &dyn Bootstrap,
    cancel: CancellationToken,
) -> Result<RunReport> {
    let request = loader::load(&args)?;
    Orchestrator::new(bootstrap, cancel).run(request).await
}

fn region_from_env() -> Option<String> {
    std::env::var("AWS_REGION").ok().filter(|r| !r.is_empty())
}

fn parse_tag(s: &str) -> std::result::Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.trim().to_string()))
        }
        _ => Err(format!("invalid tag {:?}, expected key=value", s)),
    }
}

/// Accepts durations like `90s`, `25m` or `1h30m`.
pub fn parse_duration(s: &str) -> std::result::Result<Duration, String> {
    let invalid = || format!("invalid duration {:?}, expected e.g. 90s, 25m or 1h30m", s);
    if s.is_empty() {
        return Err(invalid());
    }
    let mut total = Duration::ZERO;
    let mut digits = String::new();
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        if c.is_ascii_digit() {
            digits.push(c);
            continue;
        }
        let value: u64 = digits.parse().map_err(|_| invalid())?;
        digits.clear();
        let unit = match (c, chars.peek()) {
            ('m', Some('s')) => {
                chars.next();
                Duration::from_millis(1)
            }
            ('h', _) => Duration::from_secs(3600),
            ('m', _) => Duration::from_secs(60),
            ('s', _) => Duration::from_secs(1),
            _ => return Err(invalid()),
        };
        total += unit * u32::try_from(value).map_err(|_| invalid())?;
    }
    if !digits.is_empty() {
        return Err(invalid());
    }
    Ok(total)
}
