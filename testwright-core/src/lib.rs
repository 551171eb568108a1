//! Testwright Core - agent pipeline that writes unit tests for a repository
//!
//! A Verifier decides whether adequate tests exist. If not, a Planner,
//! Implementer and Reviewer iterate (bounded by a revision ceiling) and the
//! approved changes are published as a pull request. The pipeline is a
//! [`workflow::Workflow`] graph run by a single-threaded scheduler.

pub mod agent;
pub mod config;
pub mod driver;
pub mod error;
pub mod git;
pub mod scm;
pub mod secrets;
pub mod tools;
pub mod workflow;

#[cfg(test)]
mod test_support;

pub use agent::{AgentExecutor, AgentFactory, AgentResponse, AgentRole, AgentSet};
pub use config::{BackendKind, CliOverrides, Config, Provider};
pub use driver::Orchestrator;
pub use error::{Error, Result};
pub use git::{GitWorkingTree, WorkingTree};
pub use scm::{BranchRef, PullRequestInfo, PullRequestRequest, SourceControl};
pub use secrets::Secrets;
pub use tools::ToolBelt;
pub use workflow::{RoutingMode, RunStatus, RunSummary};
