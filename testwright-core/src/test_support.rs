use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::agent::{AgentExecutor, AgentResponse, AgentSet};
use crate::git::WorkingTree;
use crate::scm::{BranchRef, PullRequestInfo, PullRequestRequest, SourceControl};
use crate::{Error, Result};

/// Agent that replays canned responses and keeps the prompts it was given
pub(crate) struct ScriptedAgent {
    name: String,
    responses: Mutex<VecDeque<AgentResponse>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedAgent {
    pub(crate) fn new(name: &str, responses: Vec<AgentResponse>) -> Self {
        Self {
            name: name.to_string(),
            responses: Mutex::new(responses.into()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl AgentExecutor for ScriptedAgent {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, prompt: &str) -> Result<AgentResponse> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| Error::Agent(format!("{} has no scripted response left", self.name)))
    }
}

pub(crate) fn agents(
    verifier: ScriptedAgent,
    planner: ScriptedAgent,
    implementer: ScriptedAgent,
    reviewer: ScriptedAgent,
) -> AgentSet {
    AgentSet {
        verifier: Arc::new(verifier),
        planner: Arc::new(planner),
        implementer: Arc::new(implementer),
        reviewer: Arc::new(reviewer),
    }
}

/// Working tree that logs calls; dirty until committed
pub(crate) struct RecordingTree {
    dirty: Mutex<bool>,
    fail_push: bool,
    clean_after_checkout: bool,
    calls: Mutex<Vec<String>>,
}

impl RecordingTree {
    pub(crate) fn clean() -> Self {
        Self {
            dirty: Mutex::new(false),
            fail_push: false,
            clean_after_checkout: false,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn dirty() -> Self {
        Self {
            dirty: Mutex::new(true),
            ..Self::clean()
        }
    }

    pub(crate) fn failing_push(mut self) -> Self {
        self.fail_push = true;
        self
    }

    /// The new branch turns out to hold nothing to commit
    pub(crate) fn clean_after_checkout(mut self) -> Self {
        self.clean_after_checkout = true;
        self
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn log(&self, call: impl Into<String>) {
        self.calls.lock().unwrap().push(call.into());
    }
}

#[async_trait]
impl WorkingTree for RecordingTree {
    async fn stage_all(&self) -> Result<()> {
        self.log("stage_all");
        Ok(())
    }

    async fn has_changes(&self) -> Result<bool> {
        self.log("has_changes");
        Ok(*self.dirty.lock().unwrap())
    }

    async fn checkout_new_branch(&self, branch: &str) -> Result<()> {
        self.log(format!("checkout:{}", branch));
        if self.clean_after_checkout {
            *self.dirty.lock().unwrap() = false;
        }
        Ok(())
    }

    async fn commit(&self, _message: &str) -> Result<String> {
        self.log("commit");
        *self.dirty.lock().unwrap() = false;
        Ok("0123abcd".to_string())
    }

    async fn push(&self, branch: &str) -> Result<()> {
        self.log(format!("push:{}", branch));
        if self.fail_push {
            return Err(Error::SourceControl(format!("git push of {} failed: rejected", branch)));
        }
        Ok(())
    }
}

/// Gateway that logs calls and answers with a fixed pull request
pub(crate) struct RecordingGateway {
    failing_label: Option<String>,
    fail_branches: bool,
    fail_pull_requests: bool,
    calls: Mutex<Vec<String>>,
    requests: Mutex<Vec<PullRequestRequest>>,
}

impl RecordingGateway {
    pub(crate) fn new() -> Self {
        Self {
            failing_label: None,
            fail_branches: false,
            fail_pull_requests: false,
            calls: Mutex::new(Vec::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn failing_label(mut self, label: &str) -> Self {
        self.failing_label = Some(label.to_string());
        self
    }

    pub(crate) fn failing_branches(mut self) -> Self {
        self.fail_branches = true;
        self
    }

    pub(crate) fn failing_pull_requests(mut self) -> Self {
        self.fail_pull_requests = true;
        self
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn last_request(&self) -> Option<PullRequestRequest> {
        self.requests.lock().unwrap().last().cloned()
    }

    fn log(&self, call: impl Into<String>) {
        self.calls.lock().unwrap().push(call.into());
    }
}

#[async_trait]
impl SourceControl for RecordingGateway {
    fn name(&self) -> &str {
        "recording"
    }

    async fn clone_repo(&self, target_dir: &Path, branch: &str) -> Result<PathBuf> {
        self.log(format!("clone:{}", branch));
        Ok(target_dir.to_path_buf())
    }

    async fn create_branch(&self, name: &str, source_branch: &str) -> Result<BranchRef> {
        self.log(format!("create_branch:{}:{}", name, source_branch));
        if self.fail_branches {
            return Err(Error::SourceControl(format!("could not create branch {}", name)));
        }
        Ok(BranchRef {
            name: format!("refs/heads/{}", name),
            object_id: "0123abcd".to_string(),
        })
    }

    async fn create_pull_request(&self, request: &PullRequestRequest) -> Result<PullRequestInfo> {
        self.log("create_pull_request");
        self.requests.lock().unwrap().push(request.clone());
        if self.fail_pull_requests {
            return Err(Error::SourceControl("pull request rejected: 403".to_string()));
        }
        Ok(PullRequestInfo {
            id: "42".to_string(),
            url: "https://example.test/pulls/42".to_string(),
            title: request.title.clone(),
            labels: Vec::new(),
        })
    }

    async fn add_label(&self, _pr: &PullRequestInfo, label: &str) -> Result<()> {
        self.log(format!("add_label:{}", label));
        if self.failing_label.as_deref() == Some(label) {
            return Err(Error::SourceControl(format!("label {} not allowed", label)));
        }
        Ok(())
    }
}
