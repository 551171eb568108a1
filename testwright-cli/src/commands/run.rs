//! Run command - clone a repository and drive the pipeline once

use std::path::PathBuf;

use clap::Args;
use testwright_core::config::split_labels;
use testwright_core::workflow::{StepRecord, StepStatus};
use testwright_core::{
    BackendKind, CliOverrides, Config, Orchestrator, Provider, RoutingMode, RunSummary, Secrets,
};

/// Arguments for the run command
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Repository to work on (`owner/repo` for GitHub, repository name for Azure DevOps)
    #[arg(long)]
    pub repo: Option<String>,

    /// Source control provider (github or azure)
    #[arg(long)]
    pub provider: Option<Provider>,

    /// Target branch the pull request is opened against
    #[arg(short, long)]
    pub branch: Option<String>,

    /// Directory the repository is cloned into
    #[arg(short, long)]
    pub workspace: Option<PathBuf>,

    /// Comma separated pull request labels
    #[arg(short, long)]
    pub labels: Option<String>,

    /// Planner/implementer/reviewer cycles before approval is forced
    #[arg(long)]
    pub max_revisions: Option<u32>,

    /// Absolute ceiling on node executions
    #[arg(long)]
    pub max_steps: Option<usize>,

    /// How routing decisions are read from agent responses
    #[arg(long)]
    pub routing_mode: Option<RoutingMode>,

    /// Agent backend for the verifier, planner and reviewer
    #[arg(long)]
    pub backend: Option<BackendKind>,

    /// Print the run summary as JSON
    #[arg(long)]
    pub json: bool,
}

impl RunArgs {
    fn overrides(&self, model: Option<String>) -> CliOverrides {
        CliOverrides {
            model,
            backend: self.backend,
            target_branch: self.branch.clone(),
            workspace: self.workspace.clone(),
            labels: self.labels.as_deref().map(split_labels),
            repo: self.repo.clone(),
            provider: self.provider,
            max_revisions: self.max_revisions,
            max_steps: self.max_steps,
            routing_mode: self.routing_mode,
        }
    }

    /// Execute the run command
    pub async fn execute(&self, verbose: bool, model: Option<String>) -> anyhow::Result<()> {
        let config = Config::load_with_overrides(self.overrides(model))?;
        let secrets = Secrets::load()?;

        if verbose {
            tracing::info!(
                provider = %config.scm.provider,
                repo = ?config.scm.repo,
                branch = %config.workflow.target_branch,
                max_revisions = config.workflow.max_revisions,
                routing_mode = %config.workflow.routing_mode,
                "Configuration loaded"
            );
        }

        let gateway = testwright_scm::build_gateway(&config, &secrets)?;
        let summary = Orchestrator::new(config, secrets, gateway).run().await;

        if self.json {
            println!("{}", serde_json::to_string_pretty(&summary)?);
        } else {
            print_report(&summary);
        }

        if let Some(error) = summary.error.as_deref().filter(|_| !summary.is_success()) {
            anyhow::bail!("run failed: {}", error);
        }
        Ok(())
    }
}

fn print_report(summary: &RunSummary) {
    println!("Testwright Run");
    println!("==============");
    println!();
    println!("Status: {}", summary.status);
    println!("Repository: {}", summary.repo_path.display());
    println!(
        "Duration: {}s",
        summary.duration().num_milliseconds() as f64 / 1000.0
    );
    println!("Revisions: {}", summary.revision_count);
    println!("Steps executed: {}", summary.steps_executed);
    println!();

    if !summary.steps.is_empty() {
        println!("Steps:");
        for record in &summary.steps {
            println!("  {}", step_line(record));
        }
        println!();
    }

    for output in &summary.outputs {
        println!("{}", output);
    }
    if let Some(url) = summary.pr_url() {
        println!("Pull request: {}", url);
    }
    if let Some(error) = &summary.error {
        println!("Error: {}", error);
    }
}

fn step_line(record: &StepRecord) -> String {
    let mut line = format!("{:<10} {}", record.step.as_str(), status_label(record.status));
    if let Some(decision) = &record.decision {
        line.push_str(&format!(" decision={}", decision));
    }
    if let Some(revision) = record.revision {
        line.push_str(&format!(" revision={}", revision));
    }
    if record.forced {
        line.push_str(" (forced)");
    }
    if let Some(id) = &record.pr_id {
        line.push_str(&format!(" pr={}", id));
    }
    if let Some(error) = &record.error {
        line.push_str(&format!(" error={}", error));
    }
    line
}

fn status_label(status: StepStatus) -> &'static str {
    match status {
        StepStatus::Completed => "completed",
        StepStatus::Skipped => "skipped",
        StepStatus::Failed => "failed",
    }
}
