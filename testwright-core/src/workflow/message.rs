//! Messages passed along graph edges

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::agent::AgentResponse;

/// Verifier routing signal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerifierDecision {
    TestsCorrect,
    TestsNeeded,
}

/// Reviewer routing signal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewerDecision {
    Approved,
    Revise,
}

/// A routing decision emitted by a router node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Verifier(VerifierDecision),
    Reviewer(ReviewerDecision),
}

impl Decision {
    pub const TESTS_CORRECT: Decision = Decision::Verifier(VerifierDecision::TestsCorrect);
    pub const TESTS_NEEDED: Decision = Decision::Verifier(VerifierDecision::TestsNeeded);
    pub const APPROVED: Decision = Decision::Reviewer(ReviewerDecision::Approved);
    pub const REVISE: Decision = Decision::Reviewer(ReviewerDecision::Revise);

    /// Name used in results and logs
    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::Verifier(VerifierDecision::TestsCorrect) => "tests_correct",
            Decision::Verifier(VerifierDecision::TestsNeeded) => "tests_needed",
            Decision::Reviewer(ReviewerDecision::Approved) => "approved",
            Decision::Reviewer(ReviewerDecision::Revise) => "revise",
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_str().to_uppercase())
    }
}

/// The single typed input a node receives
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// A prompt for the next agent
    Prompt(String),
    /// An agent's answer
    Response(AgentResponse),
    /// A routing decision
    Decision(Decision),
    /// Status text from a side-effect node
    Status(String),
}

impl Message {
    /// The decision carried, if any
    pub fn decision(&self) -> Option<Decision> {
        match self {
            Message::Decision(d) => Some(*d),
            _ => None,
        }
    }

    /// Text view of the message
    pub fn text(&self) -> String {
        match self {
            Message::Prompt(s) | Message::Status(s) => s.clone(),
            Message::Response(r) => r.text.clone(),
            Message::Decision(d) => d.to_string(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Message::Prompt(_) => "prompt",
            Message::Response(_) => "response",
            Message::Decision(_) => "decision",
            Message::Status(_) => "status",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decision_names() {
        assert_eq!(Decision::TESTS_CORRECT.as_str(), "tests_correct");
        assert_eq!(Decision::REVISE.to_string(), "REVISE");
        assert_eq!(
            Message::Decision(Decision::APPROVED).decision(),
            Some(Decision::APPROVED)
        );
        assert_eq!(Message::Status("x".into()).decision(), None);
    }

    #[test]
    fn test_message_text() {
        let msg = Message::Response(AgentResponse::text("plan"));
        assert_eq!(msg.text(), "plan");
        assert_eq!(msg.kind(), "response");
    }
}
