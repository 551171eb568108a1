//! Orchestration driver: clone, assemble agents, run the pipeline once

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use tracing::{error, info};

use crate::agent::AgentFactory;
use crate::config::Config;
use crate::git::GitWorkingTree;
use crate::scm::SourceControl;
use crate::secrets::Secrets;
use crate::workflow::{run_pipeline, RunSummary};
use crate::Result;

/// Runs the pipeline against the configured repository
pub struct Orchestrator {
    config: Config,
    secrets: Secrets,
    gateway: Arc<dyn SourceControl>,
}

impl Orchestrator {
    pub fn new(config: Config, secrets: Secrets, gateway: Arc<dyn SourceControl>) -> Self {
        Self {
            config,
            secrets,
            gateway,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Directory the repository is cloned into
    pub fn clone_dir(&self) -> PathBuf {
        let name = self
            .config
            .scm
            .repo
            .as_deref()
            .map(repo_dir_name)
            .unwrap_or("repo");
        self.config.workspace.path.join(name)
    }

    /// One complete run
    ///
    /// Every failure, including a failed clone, ends up in the summary.
    pub async fn run(&self) -> RunSummary {
        let started_at = Utc::now();
        let target = self.clone_dir();
        let branch = &self.config.workflow.target_branch;

        info!(
            provider = self.gateway.name(),
            target = %target.display(),
            branch = %branch,
            "Cloning repository"
        );
        let repo_path = match self.gateway.clone_repo(&target, branch).await {
            Ok(path) => path,
            Err(e) => {
                error!(error = %e, "Clone failed");
                return RunSummary::failed_early(target, started_at, e.to_string());
            }
        };

        let (agents, tree) = match self.prepare(&repo_path) {
            Ok(parts) => parts,
            Err(e) => {
                error!(error = %e, "Run setup failed");
                return RunSummary::failed_early(repo_path, started_at, e.to_string());
            }
        };

        let mut summary = run_pipeline(
            &repo_path,
            &agents,
            Arc::new(tree),
            Arc::clone(&self.gateway),
            self.config.workflow.clone(),
        )
        .await;
        summary.started_at = started_at;
        summary
    }

    fn prepare(&self, repo_path: &Path) -> Result<(crate::agent::AgentSet, GitWorkingTree)> {
        let agents = AgentFactory::new(&self.config, &self.secrets).build_set(repo_path)?;
        info!(agents = ?agents, "Agents ready");
        let tree = GitWorkingTree::open(repo_path)?
            .with_author(&self.config.scm.author_name, &self.config.scm.author_email);
        Ok((agents, tree))
    }
}

/// Last path segment of `owner/name` or a URL, without `.git`
pub fn repo_dir_name(repo: &str) -> &str {
    let last = repo
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or(repo);
    let name = last.strip_suffix(".git").unwrap_or(last);
    if name.is_empty() {
        "repo"
    } else {
        name
    }
}
