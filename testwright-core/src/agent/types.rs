//! Agent role definitions
//!
//! Each role has its own instructions and, for the two decision points,
//! a structured-output schema:
//! - Verifier: decides whether adequate unit tests already exist
//! - Planner: writes a test plan
//! - Implementer: writes the tests into the workspace
//! - Reviewer: approves the tests or asks for a revision

use serde::{Deserialize, Serialize};
use std::fmt;

use super::response::{ResponseSchema, ReviewerOutput, VerifierOutput};

/// The role an agent plays in the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentRole {
    Verifier,
    Planner,
    Implementer,
    Reviewer,
}

impl AgentRole {
    /// All roles in pipeline order
    pub fn all() -> &'static [AgentRole] {
        &[
            AgentRole::Verifier,
            AgentRole::Planner,
            AgentRole::Implementer,
            AgentRole::Reviewer,
        ]
    }

    /// Get the short name for this role
    pub fn name(&self) -> &'static str {
        match self {
            AgentRole::Verifier => "verifier",
            AgentRole::Planner => "planner",
            AgentRole::Implementer => "implementer",
            AgentRole::Reviewer => "reviewer",
        }
    }

    /// Get a description of what this role does
    pub fn description(&self) -> &'static str {
        match self {
            AgentRole::Verifier => "Checks whether adequate unit tests already exist",
            AgentRole::Planner => "Writes a unit test plan for the repository",
            AgentRole::Implementer => "Implements the test plan in the workspace",
            AgentRole::Reviewer => "Reviews the new tests and approves or requests changes",
        }
    }

    /// Structured output schema, only for the decision roles
    pub fn schema(&self) -> Option<ResponseSchema> {
        match self {
            AgentRole::Verifier => Some(VerifierOutput::schema()),
            AgentRole::Reviewer => Some(ReviewerOutput::schema()),
            AgentRole::Planner | AgentRole::Implementer => None,
        }
    }

    /// Whether the role is allowed to write files
    pub fn can_write(&self) -> bool {
        matches!(self, AgentRole::Implementer)
    }
}

impl fmt::Display for AgentRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for AgentRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "verifier" | "verify" => Ok(AgentRole::Verifier),
            "planner" | "plan" => Ok(AgentRole::Planner),
            "implementer" | "implement" => Ok(AgentRole::Implementer),
            "reviewer" | "review" => Ok(AgentRole::Reviewer),
            _ => Err(format!("Unknown agent role: {}", s)),
        }
    }
}
