//! Source-control provider contract
//!
//! Concrete gateways (GitHub, Azure DevOps) live in the `testwright-scm`
//! crate; the workflow only sees this trait.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::Result;

/// A pull request to open
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequestRequest {
    pub source_branch: String,
    pub target_branch: String,
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub labels: Vec<String>,
}

/// A pull request as created by the provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequestInfo {
    /// Provider id (GitHub number, Azure DevOps pullRequestId)
    pub id: String,
    /// Web URL
    pub url: String,
    pub title: String,
    /// Labels successfully attached
    #[serde(default)]
    pub labels: Vec<String>,
}

/// A branch created on the remote
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchRef {
    /// Full ref name, e.g. `refs/heads/feature/x`
    pub name: String,
    /// Commit the branch points at
    pub object_id: String,
}

/// Remote repository operations
#[async_trait]
pub trait SourceControl: Send + Sync {
    /// Provider name for logs
    fn name(&self) -> &str;

    /// Clone (or refresh) the repository at `branch` into `target_dir`
    async fn clone_repo(&self, target_dir: &Path, branch: &str) -> Result<PathBuf>;

    /// Create branch `name` on the remote from `source_branch`
    async fn create_branch(&self, name: &str, source_branch: &str) -> Result<BranchRef>;

    /// Open a pull request; labels in `request` are not applied here
    async fn create_pull_request(&self, request: &PullRequestRequest) -> Result<PullRequestInfo>;

    /// Attach one label to an existing pull request
    async fn add_label(&self, pr: &PullRequestInfo, label: &str) -> Result<()>;

    /// Open a pull request and attach the requested labels
    ///
    /// Label failures are logged and skipped; the pull request stands.
    async fn create_pull_request_with_labels(
        &self,
        request: &PullRequestRequest,
    ) -> Result<PullRequestInfo> {
        let mut pr = self.create_pull_request(request).await?;
        info!(provider = self.name(), pr = %pr.id, url = %pr.url, "Pull request created");

        for label in &request.labels {
            match self.add_label(&pr, label).await {
                Ok(()) => pr.labels.push(label.clone()),
                Err(e) => {
                    warn!(
                        provider = self.name(),
                        pr = %pr.id,
                        label = %label,
                        error = %e,
                        "Failed to add label"
                    )
                }
            }
        }

        Ok(pr)
    }
}
