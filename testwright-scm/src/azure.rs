//! Azure DevOps gateway over the Git REST API

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use testwright_core::git::{clone_or_update, inject_credentials};
use testwright_core::scm::{BranchRef, PullRequestInfo, PullRequestRequest, SourceControl};
use tracing::{debug, info};
use url::Url;

use crate::{Error, Result};

/// REST api-version sent with every request
pub const API_VERSION: &str = "7.1";

/// Old object id for a ref that does not exist yet
const ZERO_OBJECT_ID: &str = "0000000000000000000000000000000000000000";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Repository {
    remote_url: String,
}

#[derive(Debug, Deserialize)]
struct ValueList<T> {
    value: Vec<T>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GitRef {
    name: String,
    object_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RefUpdateResult {
    name: String,
    new_object_id: String,
    #[serde(default)]
    success: bool,
    #[serde(default)]
    custom_message: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreatedPullRequest {
    pull_request_id: u64,
    title: String,
}

/// Body for `POST .../refs` creating `branch` at `object_id`
pub(crate) fn ref_update_body(branch: &str, object_id: &str) -> Value {
    json!([{
        "name": format!("refs/heads/{}", branch),
        "oldObjectId": ZERO_OBJECT_ID,
        "newObjectId": object_id,
    }])
}

/// Body for `POST .../pullrequests`
pub(crate) fn pull_request_body(request: &PullRequestRequest) -> Value {
    json!({
        "sourceRefName": format!("refs/heads/{}", request.source_branch),
        "targetRefName": format!("refs/heads/{}", request.target_branch),
        "title": request.title,
        "description": request.description,
    })
}

/// [`SourceControl`] for an Azure DevOps Git repository
pub struct AzureDevOpsGateway {
    http: Client,
    organization_url: Url,
    project: String,
    repo: String,
    pat: String,
}

impl AzureDevOpsGateway {
    /// `organization_url` is e.g. `https://dev.azure.com/contoso`
    pub fn new(
        organization_url: &str,
        project: impl Into<String>,
        repo: impl Into<String>,
        pat: impl Into<String>,
    ) -> Result<Self> {
        let organization_url = Url::parse(organization_url.trim_end_matches('/'))?;
        if organization_url.cannot_be_a_base() {
            return Err(Error::Parse(format!(
                "Invalid organization URL: {}",
                organization_url
            )));
        }
        let http = Client::builder()
            .user_agent(concat!("testwright/", env!("CARGO_PKG_VERSION")))
            .build()?;

        let gateway = Self {
            http,
            organization_url,
            project: project.into(),
            repo: repo.into(),
            pat: pat.into(),
        };
        info!(
            org = %gateway.organization_url,
            project = %gateway.project,
            repo = %gateway.repo,
            "Created Azure DevOps gateway"
        );
        Ok(gateway)
    }

    /// `{org}/{project}/_apis/git/repositories/{repo}/{tail...}`
    pub fn api_url(&self, tail: &[&str]) -> Url {
        let mut url = self.organization_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments
                .pop_if_empty()
                .extend([self.project.as_str(), "_apis", "git", "repositories", self.repo.as_str()])
                .extend(tail);
        }
        url.query_pairs_mut().append_pair("api-version", API_VERSION);
        url
    }

    /// Web URL of a pull request
    pub fn pull_request_web_url(&self, id: u64) -> String {
        let mut url = self.organization_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments
                .pop_if_empty()
                .extend([self.project.as_str(), "_git", self.repo.as_str(), "pullrequest"])
                .push(&id.to_string());
        }
        url.to_string()
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        let response = request.basic_auth("", Some(&self.pat)).send().await?;
        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(Error::Auth(format!(
                "Azure DevOps rejected the PAT ({}); check its scopes",
                status
            )));
        }
        if !status.is_success() {
            let text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read response".to_string());
            return Err(Error::Other(format!(
                "Azure DevOps request failed with status {}: {}",
                status, text
            )));
        }
        response
            .json()
            .await
            .map_err(|e| Error::Parse(format!("Failed to parse Azure DevOps response: {}", e)))
    }

    async fn branch_object_id(&self, branch: &str) -> Result<String> {
        let mut url = self.api_url(&["refs"]);
        url.query_pairs_mut()
            .append_pair("filter", &format!("heads/{}", branch));
        let refs: ValueList<GitRef> = self.send(self.http.get(url)).await?;
        let wanted = format!("refs/heads/{}", branch);
        refs.value
            .into_iter()
            .find(|r| r.name == wanted)
            .map(|r| r.object_id)
            .ok_or_else(|| Error::Other(format!("Branch {} not found", branch)))
    }
}

impl std::fmt::Debug for AzureDevOpsGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AzureDevOpsGateway")
            .field("organization_url", &self.organization_url.as_str())
            .field("project", &self.project)
            .field("repo", &self.repo)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl SourceControl for AzureDevOpsGateway {
    fn name(&self) -> &str {
        "azure"
    }

    async fn clone_repo(
        &self,
        target_dir: &Path,
        branch: &str,
    ) -> testwright_core::Result<PathBuf> {
        let repository: Repository = self.send(self.http.get(self.api_url(&[]))).await?;
        let remote = inject_credentials(&repository.remote_url, "pat", &self.pat)?;
        clone_or_update(&remote, target_dir, branch).await
    }

    async fn create_branch(
        &self,
        name: &str,
        source_branch: &str,
    ) -> testwright_core::Result<BranchRef> {
        let object_id = self.branch_object_id(source_branch).await?;
        let updates: ValueList<RefUpdateResult> = self
            .send(
                self.http
                    .post(self.api_url(&["refs"]))
                    .json(&ref_update_body(name, &object_id)),
            )
            .await?;

        let update = updates
            .value
            .into_iter()
            .next()
            .ok_or_else(|| Error::Parse("Empty ref update response".to_string()))?;
        if !update.success {
            return Err(Error::Other(format!(
                "Failed to create branch {}: {}",
                name,
                update.custom_message.unwrap_or_default()
            ))
            .into());
        }

        info!(branch = %update.name, "Created branch");
        Ok(BranchRef {
            name: update.name,
            object_id: update.new_object_id,
        })
    }

    async fn create_pull_request(
        &self,
        request: &PullRequestRequest,
    ) -> testwright_core::Result<PullRequestInfo> {
        debug!(
            source = %request.source_branch,
            target = %request.target_branch,
            "Creating pull request"
        );
        let created: CreatedPullRequest = self
            .send(
                self.http
                    .post(self.api_url(&["pullrequests"]))
                    .json(&pull_request_body(request)),
            )
            .await?;

        Ok(PullRequestInfo {
            id: created.pull_request_id.to_string(),
            url: self.pull_request_web_url(created.pull_request_id),
            title: created.title,
            labels: Vec::new(),
        })
    }

    async fn add_label(&self, pr: &PullRequestInfo, label: &str) -> testwright_core::Result<()> {
        let _: Value = self
            .send(
                self.http
                    .post(self.api_url(&["pullrequests", pr.id.as_str(), "labels"]))
                    .json(&json!({ "name": label })),
            )
            .await?;
        debug!(pr = %pr.id, label, "Label added");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gateway() -> AzureDevOpsGateway {
        AzureDevOpsGateway::new(
            "https://dev.azure.com/contoso/",
            "Calc Project",
            "calculator",
            "pat123",
        )
        .unwrap()
    }

    #[test]
    fn test_api_url() {
        let url = gateway().api_url(&["pullrequests", "17", "labels"]);
        assert_eq!(
            url.as_str(),
            "https://dev.azure.com/contoso/Calc%20Project/_apis/git/repositories/calculator/\
             pullrequests/17/labels?api-version=7.1"
        );
    }

    #[test]
    fn test_repository_url() {
        let url = gateway().api_url(&[]);
        assert!(url.path().ends_with("/_apis/git/repositories/calculator"));
    }

    #[test]
    fn test_pull_request_web_url() {
        assert_eq!(
            gateway().pull_request_web_url(17),
            "https://dev.azure.com/contoso/Calc%20Project/_git/calculator/pullrequest/17"
        );
    }

    #[test]
    fn test_ref_update_body_uses_zero_old_id() {
        let body = ref_update_body("feature/add-unit-tests-20260101-000000", "abc");
        assert_eq!(body[0]["name"], "refs/heads/feature/add-unit-tests-20260101-000000");
        assert_eq!(body[0]["oldObjectId"], ZERO_OBJECT_ID);
        assert_eq!(body[0]["newObjectId"], "abc");
    }

    #[test]
    fn test_pull_request_body() {
        let request = PullRequestRequest {
            source_branch: "feature/x".to_string(),
            target_branch: "main".to_string(),
            title: "Add unit tests".to_string(),
            description: "body".to_string(),
            labels: vec!["unit-tests".to_string()],
        };
        let body = pull_request_body(&request);
        assert_eq!(body["sourceRefName"], "refs/heads/feature/x");
        assert_eq!(body["targetRefName"], "refs/heads/main");
        assert!(body.get("labels").is_none());
    }

    #[test]
    fn test_invalid_org_url() {
        assert!(AzureDevOpsGateway::new("not a url", "p", "r", "x").is_err());
        assert!(AzureDevOpsGateway::new("mailto:a@b", "p", "r", "x").is_err());
    }

    #[test]
    fn test_debug_hides_pat() {
        assert!(!format!("{:?}", gateway()).contains("pat123"));
    }

    #[test]
    fn test_created_pull_request_parses() {
        let created: CreatedPullRequest = serde_json::from_value(json!({
            "pullRequestId": 17,
            "title": "Add unit tests",
            "status": "active"
        }))
        .unwrap();
        assert_eq!(created.pull_request_id, 17);
    }
}
