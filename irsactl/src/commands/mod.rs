//! CLI commands

use clap::Subcommand;

pub mod create;

#[derive(Subcommand, Debug)]
pub enum CreateCommands {
    /// Create an iamserviceaccount - AWS IAM role bound to a Kubernetes service account
    #[command(name = "iamserviceaccount")]
    IamServiceAccount(create::IamServiceAccountArgs),
}
