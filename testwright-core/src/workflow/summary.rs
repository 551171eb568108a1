//! What a run reports back to its caller

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::results::{ResultsLog, StepName, StepStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    Failed,
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunStatus::Completed => write!(f, "completed"),
            RunStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Final report of one run, including the partial log of a failed run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub repo_path: PathBuf,
    /// Terminal outputs yielded by the graph
    pub outputs: Vec<String>,
    pub steps: ResultsLog,
    pub revision_count: u32,
    pub steps_executed: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RunSummary {
    /// A run that failed before the graph started
    pub fn failed_early(
        repo_path: impl Into<PathBuf>,
        started_at: DateTime<Utc>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            status: RunStatus::Failed,
            started_at,
            completed_at: Utc::now(),
            repo_path: repo_path.into(),
            outputs: Vec::new(),
            steps: ResultsLog::new(),
            revision_count: 0,
            steps_executed: 0,
            error: Some(error.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Completed
    }

    /// URL of the pull request, if one was opened
    pub fn pr_url(&self) -> Option<&str> {
        self.steps
            .for_step(StepName::CreatePr)
            .filter(|r| r.status == StepStatus::Completed)
            .find_map(|r| r.pr_url.as_deref())
    }

    pub fn duration(&self) -> chrono::Duration {
        self.completed_at - self.started_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::results::StepRecord;

    #[test]
    fn test_failed_early_serializes_error() {
        let summary = RunSummary::failed_early("/work/calc", Utc::now(), "clone failed");
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["status"], "failed");
        assert_eq!(json["error"], "clone failed");
        assert_eq!(json["steps"], serde_json::json!([]));
    }

    #[test]
    fn test_pr_url_from_steps() {
        let mut summary = RunSummary::failed_early("/r", Utc::now(), "x");
        assert!(summary.pr_url().is_none());
        summary.steps.push(
            StepRecord::new(StepName::CreatePr, StepStatus::Completed)
                .with_pull_request("7", "https://github.com/o/r/pull/7"),
        );
        assert_eq!(summary.pr_url(), Some("https://github.com/o/r/pull/7"));
    }
}
