//! The side-effect node that publishes the agents' edits as a pull request

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{error, info};

use super::graph::{Node, NodeContext};
use super::message::Message;
use super::results::{StepName, StepRecord, StepStatus};
use super::state::{SharedState, PR_URL, REVIEW_SUMMARY, VERIFIER_REPORT};
use super::truncate;
use crate::git::WorkingTree;
use crate::scm::{PullRequestInfo, PullRequestRequest, SourceControl};
use crate::Result;

/// Status sent onward when the tree was clean
pub const NO_CHANGES: &str = "No changes to commit; pull request skipped";

/// Commits, pushes and opens a pull request when the tree changed
pub struct CreatePrNode {
    id: String,
    tree: Arc<dyn WorkingTree>,
    gateway: Arc<dyn SourceControl>,
}

enum Published {
    Clean,
    Opened { branch: String, pr: PullRequestInfo },
}

impl CreatePrNode {
    pub fn new(
        id: impl Into<String>,
        tree: Arc<dyn WorkingTree>,
        gateway: Arc<dyn SourceControl>,
    ) -> Self {
        Self {
            id: id.into(),
            tree,
            gateway,
        }
    }

    async fn publish(&self, state: &SharedState) -> Result<Published> {
        // Decide before touching branches so a checkout cannot lose staged work
        self.tree.stage_all().await?;
        if !self.tree.has_changes().await? {
            return Ok(Published::Clean);
        }

        let settings = state.settings();
        let branch = branch_name(&settings.branch_prefix);
        self.tree.checkout_new_branch(&branch).await?;

        // The checkout must not have dropped anything
        self.tree.stage_all().await?;
        if !self.tree.has_changes().await? {
            return Ok(Published::Clean);
        }

        let remote = self
            .gateway
            .create_branch(&branch, &settings.target_branch)
            .await?;
        info!(branch = %remote.name, base = %remote.object_id, "Created remote branch");

        let commit = self.tree.commit(&settings.commit_message).await?;
        info!(branch = %branch, commit = %commit, "Committed generated tests");
        self.tree.push(&branch).await?;

        let request = PullRequestRequest {
            source_branch: branch.clone(),
            target_branch: settings.target_branch.clone(),
            title: settings.pr_title.clone(),
            description: describe(state),
            labels: settings.labels.clone(),
        };
        let pr = self.gateway.create_pull_request_with_labels(&request).await?;
        Ok(Published::Opened { branch, pr })
    }
}

/// `prefix` plus a UTC timestamp
pub fn branch_name(prefix: &str) -> String {
    format!("{}{}", prefix, Utc::now().format("%Y%m%d-%H%M%S"))
}

/// Pull request body from the verifier report and review summary
pub fn describe(state: &SharedState) -> String {
    let limit = state.settings().description_limit;
    let section = |key: &str| {
        state
            .get_str(key)
            .map(|text| truncate(text.trim(), limit))
            .filter(|text| !text.is_empty())
            .unwrap_or_else(|| "(not available)".to_string())
    };

    format!(
        "Unit tests generated by testwright.\n\n\
         ## Verifier report\n\n{}\n\n\
         ## Review summary\n\n{}\n",
        section(VERIFIER_REPORT),
        section(REVIEW_SUMMARY)
    )
}

#[async_trait]
impl Node for CreatePrNode {
    fn id(&self) -> &str {
        &self.id
    }

    async fn handle(&self, _input: Message, ctx: &mut NodeContext<'_>) -> Result<()> {
        match self.publish(ctx.state).await {
            Ok(Published::Clean) => {
                info!("Working tree clean; skipping pull request");
                ctx.state.record(
                    StepRecord::new(StepName::CreatePr, StepStatus::Skipped)
                        .with_note("no changes"),
                );
                ctx.send_message(Message::Status(NO_CHANGES.to_string()));
                Ok(())
            }
            Ok(Published::Opened { branch, pr }) => {
                ctx.state.set_str(PR_URL, pr.url.clone());
                let status = format!("Pull request created: {}", pr.url);
                ctx.state.record(
                    StepRecord::new(StepName::CreatePr, StepStatus::Completed)
                        .with_branch(branch)
                        .with_pull_request(pr.id, pr.url)
                        .with_labels(pr.labels),
                );
                ctx.send_message(Message::Status(status));
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "Pull request creation failed");
                ctx.state.record(StepRecord::failed(StepName::CreatePr, e.to_string()));
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WorkflowSettings;
    use crate::test_support::{RecordingGateway, RecordingTree};
    use crate::workflow::state::RunArgs;

    fn state(labels: &[&str]) -> SharedState {
        let settings = WorkflowSettings {
            labels: labels.iter().map(|l| l.to_string()).collect(),
            description_limit: 20,
            ..WorkflowSettings::default()
        };
        SharedState::new(RunArgs::new("/work/calc", settings))
    }

    #[tokio::test]
    async fn test_clean_tree_skips_branch_and_pr() {
        let tree = Arc::new(RecordingTree::clean());
        let gateway = Arc::new(RecordingGateway::new());
        let node = CreatePrNode::new("create_pr", tree.clone(), gateway.clone());

        let mut state = state(&[]);
        let mut ctx = NodeContext::new(&mut state);
        node.handle(Message::Status("approved".into()), &mut ctx).await.unwrap();
        let (sent, _) = ctx.into_parts();

        assert_eq!(sent, vec![Message::Status(NO_CHANGES.to_string())]);
        assert_eq!(tree.calls(), vec!["stage_all", "has_changes"]);
        assert!(gateway.calls().is_empty());
        let record = state.results().last().unwrap();
        assert_eq!(record.status, StepStatus::Skipped);
        assert_eq!(record.note.as_deref(), Some("no changes"));
    }

    #[tokio::test]
    async fn test_dirty_tree_opens_pull_request() {
        let tree = Arc::new(RecordingTree::dirty());
        let gateway = Arc::new(RecordingGateway::new());
        let node = CreatePrNode::new("create_pr", tree.clone(), gateway.clone());

        let mut state = state(&["unit-tests", "automated"]);
        state.set_str(VERIFIER_REPORT, "calc.py has no tests at all, none");
        let mut ctx = NodeContext::new(&mut state);
        node.handle(Message::Status("approved".into()), &mut ctx).await.unwrap();

        let calls = tree.calls();
        assert_eq!(calls[0], "stage_all");
        assert_eq!(calls[1], "has_changes");
        assert!(calls[2].starts_with("checkout:feature/add-unit-tests-"));
        assert!(calls.iter().any(|c| c.starts_with("push:")));

        let remote = gateway.calls();
        assert!(remote[0].starts_with("create_branch:feature/add-unit-tests-"));
        assert_eq!(remote[1], "create_pull_request");

        let record = state.results().last().unwrap();
        assert!(record.success);
        assert!(!record.pr_id.as_deref().unwrap_or_default().is_empty());
        assert_eq!(record.labels, vec!["unit-tests", "automated"]);
        assert!(state.get_str(PR_URL).is_some());

        let request = gateway.last_request().unwrap();
        assert!(request.description.contains("calc.py has no tests..."));
        assert!(request.description.contains("(not available)"));
        assert_eq!(request.target_branch, "main");
    }

    #[tokio::test]
    async fn test_label_failure_keeps_pull_request() {
        let tree = Arc::new(RecordingTree::dirty());
        let gateway = Arc::new(RecordingGateway::new().failing_label("broken"));
        let node = CreatePrNode::new("create_pr", tree, gateway);

        let mut state = state(&["ok", "broken"]);
        let mut ctx = NodeContext::new(&mut state);
        node.handle(Message::Status("approved".into()), &mut ctx).await.unwrap();

        let record = state.results().last().unwrap();
        assert_eq!(record.status, StepStatus::Completed);
        assert_eq!(record.labels, vec!["ok"]);
    }

    #[tokio::test]
    async fn test_push_failure_is_recorded_and_fatal() {
        let tree = Arc::new(RecordingTree::dirty().failing_push());
        let gateway = Arc::new(RecordingGateway::new());
        let node = CreatePrNode::new("create_pr", tree, gateway.clone());

        let mut state = state(&[]);
        let mut ctx = NodeContext::new(&mut state);
        let err = node
            .handle(Message::Status("approved".into()), &mut ctx)
            .await
            .unwrap_err();

        assert!(err.to_string().contains("push"));
        let calls = gateway.calls();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].starts_with("create_branch:feature/add-unit-tests-"));
        assert!(calls[0].ends_with(":main"));
        let record = state.results().last().unwrap();
        assert_eq!(record.status, StepStatus::Failed);
        assert!(record.error.is_some());
    }

    #[tokio::test]
    async fn test_tree_clean_after_checkout_skips() {
        let tree = Arc::new(RecordingTree::dirty().clean_after_checkout());
        let gateway = Arc::new(RecordingGateway::new());
        let node = CreatePrNode::new("create_pr", tree.clone(), gateway.clone());

        let mut state = state(&["unit-tests"]);
        let mut ctx = NodeContext::new(&mut state);
        node.handle(Message::Status("approved".into()), &mut ctx).await.unwrap();
        let (sent, _) = ctx.into_parts();

        assert_eq!(sent, vec![Message::Status(NO_CHANGES.to_string())]);
        let calls = tree.calls();
        assert_eq!(calls.len(), 5);
        assert!(calls[2].starts_with("checkout:"));
        assert!(!calls.iter().any(|c| c == "commit" || c.starts_with("push:")));
        assert!(gateway.calls().is_empty());
        let record = state.results().last().unwrap();
        assert_eq!(record.status, StepStatus::Skipped);
        assert!(record.pr_id.is_none());
    }

    #[tokio::test]
    async fn test_remote_branch_failure_stops_before_commit() {
        let tree = Arc::new(RecordingTree::dirty());
        let gateway = Arc::new(RecordingGateway::new().failing_branches());
        let node = CreatePrNode::new("create_pr", tree.clone(), gateway.clone());

        let mut state = state(&[]);
        let mut ctx = NodeContext::new(&mut state);
        let err = node
            .handle(Message::Status("approved".into()), &mut ctx)
            .await
            .unwrap_err();

        assert!(err.to_string().contains("branch"));
        assert!(!tree.calls().iter().any(|c| c == "commit"));
        assert_eq!(gateway.calls().len(), 1);
        assert_eq!(state.results().last().unwrap().status, StepStatus::Failed);
    }

    #[test]
    fn test_branch_name_is_prefixed_timestamp() {
        let name = branch_name("feature/add-unit-tests-");
        let stamp = name.trim_start_matches("feature/add-unit-tests-");
        assert_eq!(stamp.len(), "20260101-000000".len());
        assert!(stamp.chars().all(|c| c.is_ascii_digit() || c == '-'));
    }
}
