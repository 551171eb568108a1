//! Testwright SCM - source-control gateways for testwright
//!
//! Implements [`testwright_core::SourceControl`] for GitHub (octocrab) and
//! Azure DevOps (Git REST API over reqwest).

mod azure;
mod error;
mod github;

pub use azure::{AzureDevOpsGateway, API_VERSION};
pub use error::{Error, Result};
pub use github::{GitHubGateway, RepoUrl};

use std::sync::Arc;

use testwright_core::{Config, Provider, Secrets, SourceControl};

/// Build the gateway selected by `config.scm.provider`
pub fn build_gateway(config: &Config, secrets: &Secrets) -> Result<Arc<dyn SourceControl>> {
    let scm = &config.scm;
    let repo = scm.repo.as_deref().ok_or_else(|| {
        Error::MissingEnv("repository not set (--repo, TESTWRIGHT_REPO or scm.repo)".to_string())
    })?;

    match scm.provider {
        Provider::GitHub => {
            let token = secrets.github_token().ok_or_else(|| {
                Error::Auth(
                    "GitHub token not found. Set GITHUB_TOKEN environment variable \
                     or add token to ~/.config/testwright/secrets.toml"
                        .to_string(),
                )
            })?;
            Ok(Arc::new(GitHubGateway::new(RepoUrl::parse(repo)?, token)?))
        }
        Provider::Azure => {
            let org = scm.organization_url.as_deref().ok_or_else(|| {
                Error::MissingEnv(
                    "organization URL not set (AZURE_DEVOPS_ORG_URL or scm.organization_url)"
                        .to_string(),
                )
            })?;
            let project = scm.project.as_deref().ok_or_else(|| {
                Error::MissingEnv(
                    "project not set (AZURE_DEVOPS_PROJECT or scm.project)".to_string(),
                )
            })?;
            let pat = secrets.azure_devops_pat().ok_or_else(|| {
                Error::Auth(
                    "Azure DevOps PAT not found. Set AZURE_DEVOPS_PAT environment variable \
                     or add pat to ~/.config/testwright/secrets.toml"
                        .to_string(),
                )
            })?;
            Ok(Arc::new(AzureDevOpsGateway::new(org, project, repo, pat)?))
        }
    }
}
