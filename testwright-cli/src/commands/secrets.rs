//! Secrets command - create and inspect the secrets file

use clap::{Args, Subcommand};
use testwright_core::Secrets;

/// Arguments for the secrets command
#[derive(Args, Debug)]
pub struct SecretsArgs {
    #[command(subcommand)]
    pub command: SecretsCommand,
}

#[derive(Subcommand, Debug)]
pub enum SecretsCommand {
    /// Write a template secrets file with restrictive permissions
    Init,

    /// Show which credentials are available, without printing them
    Status,
}

impl SecretsArgs {
    pub fn execute(&self) -> anyhow::Result<()> {
        match self.command {
            SecretsCommand::Init => {
                let path = Secrets::create_template()?;
                println!("Created secrets template at {}", path.display());
                println!("Edit it to add your GitHub token or Azure DevOps PAT.");
            }
            SecretsCommand::Status => {
                let secrets = Secrets::load()?;
                if let Some(path) = Secrets::default_secrets_path() {
                    println!("Secrets file: {}", path.display());
                }
                println!("  github token: {}", presence(secrets.github_token().is_some()));
                println!("  azure devops pat: {}", presence(secrets.azure_devops_pat().is_some()));
                println!("  llm api key: {}", presence(secrets.llm_api_key().is_some()));
            }
        }
        Ok(())
    }
}

fn presence(found: bool) -> &'static str {
    if found {
        "set"
    } else {
        "missing"
    }
}
