//! Run-scoped shared state
//!
//! One [`SharedState`] is created per run and handed to every node by
//! mutable reference through the scheduler. Execution is sequential, so no
//! locking is involved. Keys are only ever inserted or overwritten; readers
//! must treat a missing key as a normal condition.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde_json::Value;

use super::results::{ResultsLog, StepRecord};
use crate::config::WorkflowSettings;

/// Short verifier report for the pull request description
pub const VERIFIER_REPORT: &str = "verifier_report";
/// Full verifier feedback reused by the planner prompts
pub const VERIFIER_FEEDBACK: &str = "verifier_feedback";
/// Latest reviewer feedback, fed into the revision prompt
pub const REVIEWER_FEEDBACK: &str = "reviewer_feedback";
/// Reviewer summary for the pull request description
pub const REVIEW_SUMMARY: &str = "review_summary";
/// URL of the created pull request
pub const PR_URL: &str = "pr_url";

/// Invocation arguments, fixed at run start
#[derive(Debug, Clone)]
pub struct RunArgs {
    /// Local clone the agents work in
    pub repo_path: PathBuf,
    pub settings: WorkflowSettings,
}

impl RunArgs {
    pub fn new(repo_path: impl Into<PathBuf>, settings: WorkflowSettings) -> Self {
        Self {
            repo_path: repo_path.into(),
            settings,
        }
    }
}

/// Key-value store visible to all nodes of one run
#[derive(Debug)]
pub struct SharedState {
    args: RunArgs,
    revision_count: u32,
    steps_executed: usize,
    results: ResultsLog,
    values: HashMap<String, Value>,
}

impl SharedState {
    /// Fresh state for a new run
    pub fn new(args: RunArgs) -> Self {
        Self {
            args,
            revision_count: 0,
            steps_executed: 0,
            results: ResultsLog::new(),
            values: HashMap::new(),
        }
    }

    pub fn args(&self) -> &RunArgs {
        &self.args
    }

    pub fn settings(&self) -> &WorkflowSettings {
        &self.args.settings
    }

    pub fn repo_path(&self) -> &Path {
        &self.args.repo_path
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// String value for `key`, `None` if absent or not a string
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.values.get(key).and_then(Value::as_str)
    }

    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.values.insert(key.into(), value);
    }

    pub fn set_str(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.set(key, Value::String(value.into()));
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn revision_count(&self) -> u32 {
        self.revision_count
    }

    pub fn max_revisions(&self) -> u32 {
        self.args.settings.max_revisions
    }

    /// Whether the revision ceiling has been reached
    pub fn ceiling_reached(&self) -> bool {
        self.revision_count >= self.max_revisions()
    }

    /// Increment the revision counter by one, never past the ceiling
    pub fn bump_revision(&mut self) -> u32 {
        if self.revision_count < self.max_revisions() {
            self.revision_count += 1;
        }
        self.revision_count
    }

    /// Node executions so far, kept even when a run aborts
    pub fn steps_executed(&self) -> usize {
        self.steps_executed
    }

    pub(crate) fn count_step(&mut self) {
        self.steps_executed += 1;
    }

    pub fn results(&self) -> &ResultsLog {
        &self.results
    }

    /// Append a step record
    pub fn record(&mut self, record: StepRecord) {
        self.results.push(record);
    }

    /// Consume the state, keeping what the driver reports
    pub fn into_results(self) -> (ResultsLog, u32) {
        (self.results, self.revision_count)
    }
}
