//! Routing nodes that turn agent answers into decisions
//!
//! A verdict is read from the response's structured payload first
//! ([`Parsed::Decoded`]). When the payload is missing the text is scanned
//! for a `VERDICT: X` marker, a degraded mode kept for executors without
//! native structured output. [`RoutingMode`] selects which of the two paths
//! are trusted. Anything unreadable routes conservatively: tests needed,
//! or revise.

use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::graph::{Node, NodeContext};
use super::message::{Decision, Message};
use super::results::{DecisionSource, StepName, StepRecord, StepStatus};
use super::state::{REVIEWER_FEEDBACK, REVIEW_SUMMARY, VERIFIER_FEEDBACK, VERIFIER_REPORT};
use super::truncate;
use crate::agent::{AgentResponse, ReviewerOutput, VerifierOutput};
use crate::Result;

/// Which verdict sources the routers trust
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutingMode {
    /// Structured payload, then `VERDICT:` markers
    #[default]
    StructuredWithFallback,
    /// Structured payload only
    StructuredOnly,
    /// `VERDICT:` markers only; payloads are ignored
    TextOnly,
}

impl std::str::FromStr for RoutingMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "structured_with_fallback" | "structured" | "fallback" => {
                Ok(RoutingMode::StructuredWithFallback)
            }
            "structured_only" => Ok(RoutingMode::StructuredOnly),
            "text_only" | "text" => Ok(RoutingMode::TextOnly),
            _ => Err(format!(
                "Unknown routing mode: {} \
                 (expected structured_with_fallback, structured_only or text_only)",
                s
            )),
        }
    }
}

impl std::fmt::Display for RoutingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RoutingMode::StructuredWithFallback => write!(f, "structured_with_fallback"),
            RoutingMode::StructuredOnly => write!(f, "structured_only"),
            RoutingMode::TextOnly => write!(f, "text_only"),
        }
    }
}

/// Outcome of decoding a structured payload
#[derive(Debug, Clone, PartialEq)]
pub enum Parsed<T> {
    Decoded(T),
    Unparsed { text: String },
}

impl<T: DeserializeOwned> Parsed<T> {
    pub fn from_response(response: &AgentResponse) -> Self {
        match response.decode::<T>() {
            Some(decoded) => Parsed::Decoded(decoded),
            None => Parsed::Unparsed {
                text: response.text.clone(),
            },
        }
    }
}

static VERDICT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?im)verdict\**\s*[:=]\s*\**\s*([a-z_\-]+)").expect("Invalid verdict regex")
});

/// The last `VERDICT:` token in `text`, upper-cased with `-` as `_`
pub fn verdict_marker(text: &str) -> Option<String> {
    VERDICT
        .captures_iter(text)
        .last()
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_uppercase().replace('-', "_"))
}

struct Vocabulary {
    positive: &'static [&'static str],
    negative: &'static [&'static str],
}

const VERIFIER_WORDS: Vocabulary = Vocabulary {
    positive: &["TESTS_CORRECT", "CORRECT", "ADEQUATE", "PASS"],
    negative: &[
        "TESTS_NEEDED",
        "NEEDED",
        "TESTS_MISSING",
        "INSUFFICIENT",
        "FAIL",
    ],
};

const REVIEWER_WORDS: Vocabulary = Vocabulary {
    positive: &["APPROVED", "APPROVE", "LGTM"],
    negative: &[
        "REVISE",
        "REVISION",
        "REJECTED",
        "CHANGES_REQUESTED",
        "REQUEST_CHANGES",
    ],
};

/// A verdict as read from one response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reading {
    /// Tests correct / approved
    pub positive: bool,
    pub feedback: String,
    pub source: DecisionSource,
}

impl Reading {
    /// Whether the verdict came from the agent rather than the default
    pub fn understood(&self) -> bool {
        self.source != DecisionSource::Default
    }
}

fn read<T, F>(response: &AgentResponse, mode: RoutingMode, words: &Vocabulary, split: F) -> Reading
where
    T: DeserializeOwned,
    F: FnOnce(T) -> (bool, String),
{
    let parsed = match mode {
        RoutingMode::TextOnly => Parsed::Unparsed {
            text: response.text.clone(),
        },
        _ => Parsed::<T>::from_response(response),
    };

    let text = match parsed {
        Parsed::Decoded(payload) => {
            let (positive, feedback) = split(payload);
            let feedback = if feedback.trim().is_empty() {
                response.text.trim().to_string()
            } else {
                feedback
            };
            return Reading {
                positive,
                feedback,
                source: DecisionSource::Structured,
            };
        }
        Parsed::Unparsed { text } => text,
    };

    let feedback = text.trim().to_string();
    if mode == RoutingMode::StructuredOnly {
        warn!("No structured verdict; routing conservatively");
        return Reading {
            positive: false,
            feedback,
            source: DecisionSource::Default,
        };
    }

    match verdict_marker(&text) {
        Some(token) if words.positive.contains(&token.as_str()) => Reading {
            positive: true,
            feedback,
            source: DecisionSource::TextMarker,
        },
        Some(token) if words.negative.contains(&token.as_str()) => Reading {
            positive: false,
            feedback,
            source: DecisionSource::TextMarker,
        },
        other => {
            warn!(token = ?other, "No recognisable verdict; routing conservatively");
            Reading {
                positive: false,
                feedback,
                source: DecisionSource::Default,
            }
        }
    }
}

/// Read the verifier's verdict
pub fn read_verifier(response: &AgentResponse, mode: RoutingMode) -> Reading {
    read::<VerifierOutput, _>(response, mode, &VERIFIER_WORDS, |p| {
        (p.tests_exist_and_correct, p.feedback)
    })
}

/// Read the reviewer's verdict
pub fn read_reviewer(response: &AgentResponse, mode: RoutingMode) -> Reading {
    read::<ReviewerOutput, _>(response, mode, &REVIEWER_WORDS, |p| (p.approved, p.feedback))
}

fn into_response(message: Message) -> AgentResponse {
    match message {
        Message::Response(response) => response,
        other => AgentResponse::text(other.text()),
    }
}

/// Routes the verifier's answer to `TESTS_CORRECT` or `TESTS_NEEDED`
#[derive(Debug, Clone)]
pub struct VerifierRouter {
    id: String,
}

impl VerifierRouter {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

#[async_trait]
impl Node for VerifierRouter {
    fn id(&self) -> &str {
        &self.id
    }

    async fn handle(&self, input: Message, ctx: &mut NodeContext<'_>) -> Result<()> {
        let response = into_response(input);
        let settings = ctx.state.settings();
        let reading = read_verifier(&response, settings.routing_mode);
        let report = truncate(&reading.feedback, settings.description_limit);

        let decision = if reading.positive {
            Decision::TESTS_CORRECT
        } else {
            Decision::TESTS_NEEDED
        };

        ctx.state.set_str(VERIFIER_REPORT, report);
        ctx.state.set_str(VERIFIER_FEEDBACK, reading.feedback.clone());
        ctx.state.record(
            StepRecord::new(StepName::Verify, StepStatus::Completed)
                .with_success(reading.understood())
                .with_decision(decision.as_str())
                .with_feedback(reading.feedback)
                .with_source(reading.source),
        );

        info!(decision = %decision, source = ?reading.source, "Verifier routed");
        ctx.send_message(Message::Decision(decision));
        Ok(())
    }
}

/// Routes the reviewer's answer to `APPROVED` or `REVISE`
///
/// The revision ceiling is checked before the verdict is interpreted: once
/// the counter has reached it, approval is forced. Otherwise a rejection
/// bumps the counter, and the rejection that lands on the ceiling is itself
/// turned into a forced approval.
#[derive(Debug, Clone)]
pub struct ReviewerRouter {
    id: String,
}

impl ReviewerRouter {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

#[async_trait]
impl Node for ReviewerRouter {
    fn id(&self) -> &str {
        &self.id
    }

    async fn handle(&self, input: Message, ctx: &mut NodeContext<'_>) -> Result<()> {
        let response = into_response(input);
        let reading = read_reviewer(&response, ctx.state.settings().routing_mode);
        let ceiling = ctx.state.max_revisions();

        let (decision, forced) = if ctx.state.ceiling_reached() && !reading.positive {
            (Decision::APPROVED, true)
        } else if reading.positive {
            (Decision::APPROVED, false)
        } else {
            let count = ctx.state.bump_revision();
            if count >= ceiling {
                (Decision::APPROVED, true)
            } else {
                (Decision::REVISE, false)
            }
        };
        let revision = ctx.state.revision_count();

        let summary = if forced {
            format!(
                "{}\n\nApproval forced after {} revision(s).",
                reading.feedback, revision
            )
        } else {
            reading.feedback.clone()
        };
        ctx.state.set_str(REVIEWER_FEEDBACK, reading.feedback.clone());
        ctx.state.set_str(REVIEW_SUMMARY, summary);

        let mut record = StepRecord::new(StepName::Review, StepStatus::Completed)
            .with_success(reading.understood())
            .with_decision(decision.as_str())
            .with_feedback(reading.feedback)
            .with_revision(revision)
            .with_source(reading.source);
        if forced {
            let note = format!(
                "revision ceiling reached ({}/{}); approval forced",
                revision, ceiling
            );
            warn!(revision, ceiling, "Revision ceiling reached; forcing approval");
            record = record.forced(note);
        }
        ctx.state.record(record);

        info!(decision = %decision, revision, forced, source = ?reading.source, "Reviewer routed");
        ctx.send_message(Message::Decision(decision));
        Ok(())
    }
}
