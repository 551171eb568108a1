//! GitHub gateway using octocrab

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use octocrab::Octocrab;
use serde_json::{json, Value};
use testwright_core::git::{clone_or_update, inject_credentials};
use testwright_core::scm::{BranchRef, PullRequestInfo, PullRequestRequest, SourceControl};
use tracing::{debug, info};

use crate::{Error, Result};

/// A GitHub repository coordinate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoUrl {
    pub owner: String,
    pub name: String,
}

impl RepoUrl {
    /// Parse `owner/repo`, an https URL, or an SSH URL
    pub fn parse(input: &str) -> Result<Self> {
        let input = input.trim();

        if input.starts_with("https://") || input.starts_with("http://") {
            let url = url::Url::parse(input)?;
            return Self::from_path(url.path(), input);
        }

        if let Some(rest) = input.strip_prefix("git@") {
            let path = rest
                .split_once(':')
                .map(|(_, path)| path)
                .ok_or_else(|| Error::Parse(format!("Invalid SSH URL: {}", input)))?;
            return Self::from_path(path, input);
        }

        if input.contains("://") || input.contains('@') {
            return Err(Error::Parse(format!("Unrecognized URL format: {}", input)));
        }

        let parts: Vec<&str> = input.split('/').collect();
        match parts.as_slice() {
            [owner, name] if !owner.is_empty() && !name.is_empty() => Ok(Self {
                owner: owner.to_string(),
                name: name.trim_end_matches(".git").to_string(),
            }),
            _ => Err(Error::Parse(format!(
                "Invalid repository format: {}. Expected owner/repo",
                input
            ))),
        }
    }

    fn from_path(path: &str, original: &str) -> Result<Self> {
        let path = path.trim_matches('/').trim_end_matches(".git");
        let mut parts = path.split('/');
        match (parts.next(), parts.next()) {
            (Some(owner), Some(name)) if !owner.is_empty() && !name.is_empty() => Ok(Self {
                owner: owner.to_string(),
                name: name.to_string(),
            }),
            _ => Err(Error::Parse(format!("Invalid GitHub URL path: {}", original))),
        }
    }

    /// Clone URL without credentials
    pub fn https_url(&self) -> String {
        format!("https://github.com/{}/{}.git", self.owner, self.name)
    }

    pub fn pull_url(&self, number: u64) -> String {
        format!("https://github.com/{}/{}/pull/{}", self.owner, self.name, number)
    }
}

impl std::fmt::Display for RepoUrl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

/// Body for `POST /repos/{owner}/{repo}/git/refs`
pub(crate) fn ref_body(branch: &str, sha: &str) -> Value {
    json!({
        "ref": format!("refs/heads/{}", branch),
        "sha": sha,
    })
}

/// [`SourceControl`] for a GitHub repository
pub struct GitHubGateway {
    client: Octocrab,
    repo: RepoUrl,
    token: String,
}

impl GitHubGateway {
    pub fn new(repo: RepoUrl, token: impl Into<String>) -> Result<Self> {
        let token = token.into();
        let client = Octocrab::builder()
            .personal_token(token.clone())
            .build()
            .map_err(|e| Error::Auth(format!("Failed to create GitHub client: {}", e)))?;

        info!(repo = %repo, "Created GitHub gateway");
        Ok(Self {
            client,
            repo,
            token,
        })
    }

    pub fn repo(&self) -> &RepoUrl {
        &self.repo
    }

    async fn branch_sha(&self, branch: &str) -> Result<String> {
        let route = format!(
            "/repos/{}/{}/git/ref/heads/{}",
            self.repo.owner, self.repo.name, branch
        );
        let reference: Value = self.client.get(route, None::<&()>).await?;
        reference["object"]["sha"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| Error::Parse(format!("No commit sha for branch {}", branch)))
    }
}

impl std::fmt::Debug for GitHubGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitHubGateway")
            .field("repo", &self.repo)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl SourceControl for GitHubGateway {
    fn name(&self) -> &str {
        "github"
    }

    async fn clone_repo(
        &self,
        target_dir: &Path,
        branch: &str,
    ) -> testwright_core::Result<PathBuf> {
        let remote = inject_credentials(&self.repo.https_url(), "x-access-token", &self.token)?;
        clone_or_update(&remote, target_dir, branch).await
    }

    async fn create_branch(
        &self,
        name: &str,
        source_branch: &str,
    ) -> testwright_core::Result<BranchRef> {
        let sha = self.branch_sha(source_branch).await?;
        let route = format!("/repos/{}/{}/git/refs", self.repo.owner, self.repo.name);
        let created: Value = self
            .client
            .post(route, Some(&ref_body(name, &sha)))
            .await
            .map_err(Error::Api)?;

        let name = created["ref"]
            .as_str()
            .map(str::to_string)
            .unwrap_or_else(|| format!("refs/heads/{}", name));
        info!(branch = %name, sha = %sha, "Created branch");
        Ok(BranchRef {
            name,
            object_id: sha,
        })
    }

    async fn create_pull_request(
        &self,
        request: &PullRequestRequest,
    ) -> testwright_core::Result<PullRequestInfo> {
        debug!(
            head = %request.source_branch,
            base = %request.target_branch,
            "Creating pull request"
        );
        let pr = self
            .client
            .pulls(&self.repo.owner, &self.repo.name)
            .create(&request.title, &request.source_branch, &request.target_branch)
            .body(&request.description)
            .send()
            .await
            .map_err(Error::Api)?;

        Ok(PullRequestInfo {
            id: pr.number.to_string(),
            url: pr
                .html_url
                .map(|u| u.to_string())
                .unwrap_or_else(|| self.repo.pull_url(pr.number)),
            title: pr.title.unwrap_or_else(|| request.title.clone()),
            labels: Vec::new(),
        })
    }

    async fn add_label(&self, pr: &PullRequestInfo, label: &str) -> testwright_core::Result<()> {
        let number: u64 = pr
            .id
            .parse()
            .map_err(|_| Error::Parse(format!("Invalid pull request number: {}", pr.id)))?;
        self.client
            .issues(&self.repo.owner, &self.repo.name)
            .add_labels(number, &[label.to_string()])
            .await
            .map_err(Error::Api)?;
        debug!(pr = number, label, "Label added");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_shorthand() {
        let repo = RepoUrl::parse("acme/calculator").unwrap();
        assert_eq!(repo.owner, "acme");
        assert_eq!(repo.name, "calculator");
        assert_eq!(repo.to_string(), "acme/calculator");
    }

    #[test]
    fn test_parse_https_url() {
        let repo = RepoUrl::parse("https://github.com/acme/calculator.git").unwrap();
        assert_eq!(repo.name, "calculator");
        assert_eq!(repo.https_url(), "https://github.com/acme/calculator.git");
    }

    #[test]
    fn test_parse_ssh_url() {
        let repo = RepoUrl::parse("git@github.com:acme/calculator.git").unwrap();
        assert_eq!(repo.owner, "acme");
        assert_eq!(repo.name, "calculator");
    }

    #[test]
    fn test_parse_invalid() {
        assert!(RepoUrl::parse("calculator").is_err());
        assert!(RepoUrl::parse("a/b/c").is_err());
        assert!(RepoUrl::parse("https://github.com/acme").is_err());
        assert!(RepoUrl::parse("ftp://x@y").is_err());
    }

    #[test]
    fn test_ref_body() {
        let body = ref_body("feature/add-unit-tests-20260101-000000", "abc123");
        assert_eq!(body["ref"], "refs/heads/feature/add-unit-tests-20260101-000000");
        assert_eq!(body["sha"], "abc123");
    }

    #[test]
    fn test_pull_url() {
        let repo = RepoUrl::parse("acme/calculator").unwrap();
        assert_eq!(repo.pull_url(7), "https://github.com/acme/calculator/pull/7");
    }

    #[tokio::test]
    async fn test_gateway_debug_hides_token() {
        let gateway =
            GitHubGateway::new(RepoUrl::parse("acme/calculator").unwrap(), "ghp_secret").unwrap();
        let debug = format!("{:?}", gateway);
        assert!(!debug.contains("ghp_secret"));
        assert_eq!(gateway.name(), "github");
    }
}
