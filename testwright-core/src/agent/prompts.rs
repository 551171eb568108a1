//! Agent prompt templates
//!
//! Role instructions and per-step task prompts are embedded markdown
//! templates. Templates use `{{VARIABLE}}` placeholders rendered from a
//! [`PromptContext`]; unset placeholders become `(not specified)`.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::{Captures, Regex};

use crate::agent::AgentRole;

const VERIFIER_PROMPT: &str = include_str!("prompts/verifier.md");
const PLANNER_PROMPT: &str = include_str!("prompts/planner.md");
const IMPLEMENTER_PROMPT: &str = include_str!("prompts/implementer.md");
const REVIEWER_PROMPT: &str = include_str!("prompts/reviewer.md");

const VERIFY_TASK: &str = include_str!("prompts/verify_task.md");
const PLAN_TASK: &str = include_str!("prompts/plan_task.md");
const REVISE_TASK: &str = include_str!("prompts/revise_task.md");
const IMPLEMENT_TASK: &str = include_str!("prompts/implement_task.md");
const REVIEW_TASK: &str = include_str!("prompts/review_task.md");

/// Get the role instructions (system prompt) for a role
pub fn system_prompt(role: AgentRole) -> &'static str {
    match role {
        AgentRole::Verifier => VERIFIER_PROMPT,
        AgentRole::Planner => PLANNER_PROMPT,
        AgentRole::Implementer => IMPLEMENTER_PROMPT,
        AgentRole::Reviewer => REVIEWER_PROMPT,
    }
}

/// Task prompts sent as the user message of each step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Task {
    Verify,
    Plan,
    Revise,
    Implement,
    Review,
}

impl Task {
    fn template(&self) -> &'static str {
        match self {
            Task::Verify => VERIFY_TASK,
            Task::Plan => PLAN_TASK,
            Task::Revise => REVISE_TASK,
            Task::Implement => IMPLEMENT_TASK,
            Task::Review => REVIEW_TASK,
        }
    }
}

/// Context for rendering a prompt template
#[derive(Debug, Clone, Default)]
pub struct PromptContext {
    variables: HashMap<String, String>,
}

impl PromptContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a variable value
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.variables.insert(key.into(), value.into());
        self
    }

    /// Set a variable value (builder pattern)
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(key, value);
        self
    }
}

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{([A-Z_]+)\}\}").expect("Invalid placeholder regex"));

/// Render a template string with variable substitution
pub fn render_template(template: &str, context: &PromptContext) -> String {
    PLACEHOLDER
        .replace_all(template, |caps: &Captures<'_>| {
            context
                .variables
                .get(&caps[1])
                .cloned()
                .unwrap_or_else(|| "(not specified)".to_string())
        })
        .into_owned()
}

/// Build a task prompt
pub struct PromptBuilder {
    task: Task,
    context: PromptContext,
}

impl PromptBuilder {
    pub fn new(task: Task) -> Self {
        Self {
            task,
            context: PromptContext::new(),
        }
    }

    /// Set the repository path
    pub fn repo(mut self, path: impl Into<String>) -> Self {
        self.context.set("REPO_PATH", path);
        self
    }

    /// Set a custom variable
    pub fn var(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.set(key, value);
        self
    }

    /// Build the final prompt
    pub fn build(self) -> String {
        render_template(self.task.template(), &self.context)
    }
}
