//! Testwright CLI - Command line interface for the unit-test agent pipeline
//!
//! Clones a repository, lets the verifier/planner/implementer/reviewer agents
//! add missing unit tests, and opens a pull request with the result.

mod commands;

use clap::{Parser, Subcommand};
use testwright_core::{CliOverrides, Config};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use commands::{RunArgs, SecretsArgs};

/// Testwright: agents that write the unit tests your repository is missing
#[derive(Parser, Debug)]
#[command(name = "testwright")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Model to use (overrides config and env)
    #[arg(long, global = true, env = "TESTWRIGHT_MODEL")]
    model: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show version information
    Version,

    /// Run the pipeline against a repository
    #[command(visible_alias = "r")]
    Run(RunArgs),

    /// Show current configuration
    Config,

    /// Manage the secrets file
    Secrets(SecretsArgs),
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Some(Commands::Version) => {
            println!("testwright {}", env!("CARGO_PKG_VERSION"));
        }
        Some(Commands::Run(args)) => {
            args.execute(cli.verbose, cli.model).await?;
        }
        Some(Commands::Secrets(args)) => {
            args.execute()?;
        }
        Some(Commands::Config) => {
            let config = Config::load_with_overrides(CliOverrides {
                model: cli.model,
                ..Default::default()
            })?;
            print_config(&config);
        }
        None => {
            println!("Testwright - agents that add missing unit tests and open a pull request");
            println!();
            println!("Use --help for usage information");
        }
    }

    Ok(())
}

fn print_config(config: &Config) {
    let workflow = &config.workflow;

    println!("Testwright Configuration");
    println!("========================");
    println!();
    println!("Agent Settings:");
    println!("  backend: {}", config.agent.backend);
    println!("  implementer_backend: {}", config.agent.implementer_backend);
    println!("  model: {}", config.agent.model.as_deref().unwrap_or("(default)"));
    println!("  timeout: {:?}", config.agent.timeout);
    println!();
    println!("Workflow Settings:");
    println!("  target_branch: {}", workflow.target_branch);
    println!("  branch_prefix: {}", workflow.branch_prefix);
    println!("  labels: {}", workflow.labels.join(", "));
    println!("  max_revisions: {}", workflow.max_revisions);
    match workflow.max_steps {
        Some(steps) => println!("  max_steps: {}", steps),
        None => println!("  max_steps: (derived from max_revisions)"),
    }
    println!("  routing_mode: {}", workflow.routing_mode);
    println!();
    println!("Source Control:");
    println!("  provider: {}", config.scm.provider);
    println!("  repo: {}", config.scm.repo.as_deref().unwrap_or("(not set)"));
    println!("  workspace: {}", config.workspace.path.display());
    println!();
    if let Some(path) = Config::default_config_path() {
        println!("Config file: {}", path.display());
        if path.exists() {
            println!("  (exists)");
        } else {
            println!("  (not found - using defaults)");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_run_flags() {
        let cli = Cli::try_parse_from([
            "testwright",
            "--verbose",
            "run",
            "--repo",
            "acme/calculator",
            "--labels",
            "unit-tests, automated",
            "--max-revisions",
            "2",
            "--routing-mode",
            "text-only",
            "--json",
        ])
        .unwrap();

        assert!(cli.verbose);
        match cli.command {
            Some(Commands::Run(args)) => {
                assert_eq!(args.repo.as_deref(), Some("acme/calculator"));
                assert_eq!(args.max_revisions, Some(2));
                assert!(args.json);
            }
            other => panic!("expected run, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_provider_rejected() {
        assert!(Cli::try_parse_from(["testwright", "run", "--provider", "gitlab"]).is_err());
    }
}
