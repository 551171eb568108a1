//! The append-only record of what each step did

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Pipeline step a record belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepName {
    Verify,
    Plan,
    Implement,
    Review,
    CreatePr,
    Complete,
}

impl StepName {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepName::Verify => "verify",
            StepName::Plan => "plan",
            StepName::Implement => "implement",
            StepName::Review => "review",
            StepName::CreatePr => "create_pr",
            StepName::Complete => "complete",
        }
    }
}

impl std::fmt::Display for StepName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Completed,
    Skipped,
    Failed,
}

/// Where a routing decision came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionSource {
    /// Decoded structured payload
    Structured,
    /// `VERDICT:` marker in free text
    TextMarker,
    /// Nothing readable; conservative default applied
    Default,
}

/// One entry in the results log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    pub step: StepName,
    pub status: StepStatus,
    /// For routing steps, whether the verdict was read rather than defaulted
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decision: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feedback: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision: Option<u32>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub forced: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<DecisionSource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pr_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pr_url: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub at: DateTime<Utc>,
}

impl StepRecord {
    /// New record; `success` follows the status until overridden
    pub fn new(step: StepName, status: StepStatus) -> Self {
        Self {
            step,
            status,
            success: status != StepStatus::Failed,
            decision: None,
            feedback: None,
            revision: None,
            forced: false,
            source: None,
            branch: None,
            pr_id: None,
            pr_url: None,
            labels: Vec::new(),
            note: None,
            error: None,
            at: Utc::now(),
        }
    }

    /// A failed step with its error
    pub fn failed(step: StepName, error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::new(step, StepStatus::Failed)
        }
    }

    pub fn with_success(mut self, success: bool) -> Self {
        self.success = success;
        self
    }

    pub fn with_decision(mut self, decision: impl Into<String>) -> Self {
        self.decision = Some(decision.into());
        self
    }

    pub fn with_feedback(mut self, feedback: impl Into<String>) -> Self {
        let feedback = feedback.into();
        if !feedback.is_empty() {
            self.feedback = Some(feedback);
        }
        self
    }

    pub fn with_revision(mut self, revision: u32) -> Self {
        self.revision = Some(revision);
        self
    }

    pub fn with_source(mut self, source: DecisionSource) -> Self {
        self.source = Some(source);
        self
    }

    /// Mark a decision imposed by the revision ceiling
    pub fn forced(mut self, note: impl Into<String>) -> Self {
        self.forced = true;
        self.note = Some(note.into());
        self
    }

    pub fn with_branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = Some(branch.into());
        self
    }

    pub fn with_pull_request(mut self, id: impl Into<String>, url: impl Into<String>) -> Self {
        self.pr_id = Some(id.into());
        self.pr_url = Some(url.into());
        self
    }

    pub fn with_labels(mut self, labels: Vec<String>) -> Self {
        self.labels = labels;
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }
}

/// Ordered step records; entries are only ever appended
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResultsLog(Vec<StepRecord>);

impl ResultsLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, record: StepRecord) {
        self.0.push(record);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn entries(&self) -> &[StepRecord] {
        &self.0
    }

    pub fn iter(&self) -> std::slice::Iter<'_, StepRecord> {
        self.0.iter()
    }

    pub fn last(&self) -> Option<&StepRecord> {
        self.0.last()
    }

    /// Records for one step, in order
    pub fn for_step(&self, step: StepName) -> impl Iterator<Item = &StepRecord> {
        self.0.iter().filter(move |r| r.step == step)
    }

    /// Step names in order, handy for asserting a run's path
    pub fn steps(&self) -> Vec<StepName> {
        self.0.iter().map(|r| r.step).collect()
    }
}

impl<'a> IntoIterator for &'a ResultsLog {
    type Item = &'a StepRecord;
    type IntoIter = std::slice::Iter<'a, StepRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
