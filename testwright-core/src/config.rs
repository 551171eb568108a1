//! Configuration management for testwright
//!
//! Configuration is loaded with the following priority (highest to lowest):
//! 1. CLI flags
//! 2. Environment variables
//! 3. Config file (~/.config/testwright/config.toml)
//! 4. Default values

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::workflow::RoutingMode;
use crate::{Error, Result};

/// Which executor implementation drives an agent role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// OpenAI/Azure OpenAI chat completions with function tools
    Chat,
    /// Claude Code CLI subprocess
    Claude,
    /// Codex CLI subprocess
    Codex,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Chat => write!(f, "chat"),
            BackendKind::Claude => write!(f, "claude"),
            BackendKind::Codex => write!(f, "codex"),
        }
    }
}

impl FromStr for BackendKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "chat" | "openai" | "azure" => Ok(BackendKind::Chat),
            "claude" => Ok(BackendKind::Claude),
            "codex" => Ok(BackendKind::Codex),
            other => Err(Error::Config(format!("Unknown agent backend: {}", other))),
        }
    }
}

/// Source control hosting provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    GitHub,
    Azure,
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Provider::GitHub => write!(f, "github"),
            Provider::Azure => write!(f, "azure"),
        }
    }
}

impl FromStr for Provider {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "github" | "gh" => Ok(Provider::GitHub),
            "azure" | "ado" | "azure-devops" | "azuredevops" => Ok(Provider::Azure),
            other => Err(Error::Config(format!("Unknown provider: {}", other))),
        }
    }
}

/// Agent-related configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Backend for the verifier, planner and reviewer roles
    pub backend: BackendKind,

    /// Backend for the implementer role
    pub implementer_backend: BackendKind,

    /// Model override passed to the backend
    pub model: Option<String>,

    /// Path to the claude executable
    pub claude_path: String,

    /// Path to the codex executable
    pub codex_path: String,

    /// Upper bound on one agent invocation
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,

    /// Maximum tool-call round trips for chat agents
    pub max_tool_rounds: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::Chat,
            implementer_backend: BackendKind::Codex,
            model: None,
            claude_path: "claude".to_string(),
            codex_path: "codex".to_string(),
            timeout: Duration::from_secs(15 * 60),
            max_tool_rounds: 25,
        }
    }
}

/// Chat completions endpoint configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ChatConfig {
    /// Base endpoint, e.g. `https://myres.openai.azure.com` or `https://api.openai.com/v1`
    pub endpoint: Option<String>,

    /// Deployment (Azure) or model name (OpenAI)
    pub deployment: Option<String>,

    /// Azure OpenAI api-version; when set the Azure URL scheme is used
    pub api_version: Option<String>,
}

/// Workflow tuning
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WorkflowSettings {
    /// Branch the clone starts from and the pull request targets
    pub target_branch: String,

    /// Prefix for generated branch names
    pub branch_prefix: String,

    /// Labels attached to the pull request
    pub labels: Vec<String>,

    /// Reviewer rejections tolerated before approval is forced
    pub max_revisions: u32,

    /// Explicit scheduler step ceiling; derived from `max_revisions` when unset
    pub max_steps: Option<usize>,

    /// How routing nodes read agent verdicts
    pub routing_mode: RoutingMode,

    /// Per-section character limit for the pull request description
    pub description_limit: usize,

    /// Pull request title
    pub pr_title: String,

    /// Commit message for the generated tests
    pub commit_message: String,
}

impl Default for WorkflowSettings {
    fn default() -> Self {
        Self {
            target_branch: "main".to_string(),
            branch_prefix: "feature/add-unit-tests-".to_string(),
            labels: Vec::new(),
            max_revisions: 3,
            max_steps: None,
            routing_mode: RoutingMode::default(),
            description_limit: 800,
            pr_title: "Add unit tests".to_string(),
            commit_message: "Add unit tests generated by testwright".to_string(),
        }
    }
}

/// Local workspace configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WorkspaceConfig {
    /// Directory the repository is cloned into
    pub path: PathBuf,

    /// Optional coding standards document served to agents
    pub standards_path: Option<PathBuf>,

    /// Upper bound on one test run
    #[serde(with = "humantime_serde")]
    pub test_timeout: Duration,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./workspace"),
            standards_path: None,
            test_timeout: Duration::from_secs(5 * 60),
        }
    }
}

/// Source control configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ScmConfig {
    /// Hosting provider
    pub provider: Provider,

    /// Repository: `owner/name` on GitHub, repository name on Azure DevOps
    pub repo: Option<String>,

    /// Azure DevOps organization URL, e.g. `https://dev.azure.com/contoso`
    pub organization_url: Option<String>,

    /// Azure DevOps project
    pub project: Option<String>,

    /// Commit author name
    pub author_name: String,

    /// Commit author email
    pub author_email: String,
}

impl Default for ScmConfig {
    fn default() -> Self {
        Self {
            provider: Provider::GitHub,
            repo: None,
            organization_url: None,
            project: None,
            author_name: "testwright".to_string(),
            author_email: "testwright@users.noreply.github.com".to_string(),
        }
    }
}

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Agent configuration
    pub agent: AgentConfig,

    /// Chat endpoint configuration
    pub chat: ChatConfig,

    /// Workflow settings
    pub workflow: WorkflowSettings,

    /// Workspace configuration
    pub workspace: WorkspaceConfig,

    /// Source control configuration
    pub scm: ScmConfig,
}

/// Values supplied on the command line; `None` leaves the lower layers alone
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub model: Option<String>,
    pub backend: Option<BackendKind>,
    pub target_branch: Option<String>,
    pub workspace: Option<PathBuf>,
    pub labels: Option<Vec<String>>,
    pub repo: Option<String>,
    pub provider: Option<Provider>,
    pub max_revisions: Option<u32>,
    pub max_steps: Option<usize>,
    pub routing_mode: Option<RoutingMode>,
}

impl Config {
    /// Load configuration from the default config file location
    ///
    /// Returns default config if file doesn't exist
    pub fn load() -> Result<Self> {
        let config_path = Self::default_config_path();

        if let Some(path) = config_path {
            if path.exists() {
                return Self::load_from_file(&path);
            }
        }

        Ok(Self::default())
    }

    /// Load configuration from a specific file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(Error::Io)?;
        toml::from_str(&contents)
            .map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))
    }

    /// Get the default config file path
    ///
    /// Returns `~/.config/testwright/config.toml` on Unix
    pub fn default_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("testwright").join("config.toml"))
    }

    /// Apply environment variable overrides from the process environment
    pub fn with_env_overrides(self) -> Result<Self> {
        self.with_env_lookup(|key| std::env::var(key).ok())
    }

    /// Apply environment variable overrides using `lookup` to read variables
    ///
    /// Supported variables:
    /// - TESTWRIGHT_MODEL, TESTWRIGHT_BACKEND
    /// - WORKSPACE_PATH, STANDARDS_DOC_PATH
    /// - TESTWRIGHT_DEFAULT_BRANCH or AZURE_DEVOPS_DEFAULT_BRANCH
    /// - TESTWRIGHT_REPO or AZURE_DEVOPS_REPO_NAME
    /// - PR_LABELS (comma separated)
    /// - AZURE_DEVOPS_ORG_URL, AZURE_DEVOPS_PROJECT
    /// - AZURE_OPENAI_ENDPOINT, AZURE_OPENAI_DEPLOYMENT_NAME, AZURE_OPENAI_API_VERSION
    pub fn with_env_lookup<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(model) = var("TESTWRIGHT_MODEL") {
            self.agent.model = Some(model);
        }
        if let Some(backend) = var("TESTWRIGHT_BACKEND") {
            self.agent.backend = backend.parse()?;
        }
        if let Some(path) = var("WORKSPACE_PATH") {
            self.workspace.path = PathBuf::from(path);
        }
        if let Some(path) = var("STANDARDS_DOC_PATH") {
            self.workspace.standards_path = Some(PathBuf::from(path));
        }
        if let Some(branch) =
            var("TESTWRIGHT_DEFAULT_BRANCH").or_else(|| var("AZURE_DEVOPS_DEFAULT_BRANCH"))
        {
            self.workflow.target_branch = branch;
        }
        if let Some(repo) = var("TESTWRIGHT_REPO").or_else(|| var("AZURE_DEVOPS_REPO_NAME")) {
            self.scm.repo = Some(repo);
        }
        if let Some(labels) = var("PR_LABELS") {
            self.workflow.labels = split_labels(&labels);
        }
        if let Some(url) = var("AZURE_DEVOPS_ORG_URL") {
            self.scm.organization_url = Some(url);
        }
        if let Some(project) = var("AZURE_DEVOPS_PROJECT") {
            self.scm.project = Some(project);
        }
        if let Some(endpoint) = var("AZURE_OPENAI_ENDPOINT") {
            self.chat.endpoint = Some(endpoint);
        }
        if let Some(deployment) = var("AZURE_OPENAI_DEPLOYMENT_NAME") {
            self.chat.deployment = Some(deployment);
        }
        if let Some(version) = var("AZURE_OPENAI_API_VERSION") {
            self.chat.api_version = Some(version);
        }

        Ok(self)
    }

    /// Apply CLI flag overrides
    pub fn with_cli_overrides(mut self, cli: CliOverrides) -> Self {
        if let Some(m) = cli.model {
            self.agent.model = Some(m);
        }
        if let Some(backend) = cli.backend {
            self.agent.backend = backend;
        }
        if let Some(branch) = cli.target_branch {
            self.workflow.target_branch = branch;
        }
        if let Some(path) = cli.workspace {
            self.workspace.path = path;
        }
        if let Some(labels) = cli.labels {
            self.workflow.labels = labels
                .into_iter()
                .map(|l| l.trim().to_string())
                .filter(|l| !l.is_empty())
                .collect();
        }
        if let Some(repo) = cli.repo {
            self.scm.repo = Some(repo);
        }
        if let Some(provider) = cli.provider {
            self.scm.provider = provider;
        }
        if let Some(max) = cli.max_revisions {
            self.workflow.max_revisions = max;
        }
        if let Some(steps) = cli.max_steps {
            self.workflow.max_steps = Some(steps);
        }
        if let Some(mode) = cli.routing_mode {
            self.workflow.routing_mode = mode;
        }

        self
    }

    /// Load configuration with all overrides applied
    ///
    /// Priority: CLI > env > config file > defaults
    pub fn load_with_overrides(cli: CliOverrides) -> Result<Self> {
        Ok(Self::load()?.with_env_overrides()?.with_cli_overrides(cli))
    }
}

/// Split a comma separated label list, dropping blanks
pub fn split_labels(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(String::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.agent.backend, BackendKind::Chat);
        assert_eq!(config.agent.implementer_backend, BackendKind::Codex);
        assert_eq!(config.workflow.max_revisions, 3);
        assert_eq!(config.workflow.target_branch, "main");
        assert_eq!(config.workflow.description_limit, 800);
        assert_eq!(config.workflow.routing_mode, RoutingMode::StructuredWithFallback);
        assert_eq!(config.scm.provider, Provider::GitHub);
    }

    #[test]
    fn test_parse_toml() {
        let toml = r#"
[agent]
backend = "claude"
model = "sonnet"
timeout = "2m"

[workflow]
target_branch = "develop"
labels = ["tests", "automated"]
max_revisions = 5
routing_mode = "text_only"

[workspace]
path = "/tmp/ws"
test_timeout = "90s"

[scm]
provider = "azure"
repo = "calculator"
organization_url = "https://dev.azure.com/contoso"
project = "Tools"
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.agent.backend, BackendKind::Claude);
        assert_eq!(config.agent.model, Some("sonnet".to_string()));
        assert_eq!(config.agent.timeout, Duration::from_secs(120));
        // Unset fields keep their defaults
        assert_eq!(config.agent.claude_path, "claude");
        assert_eq!(config.workflow.target_branch, "develop");
        assert_eq!(config.workflow.labels, vec!["tests", "automated"]);
        assert_eq!(config.workflow.max_revisions, 5);
        assert_eq!(config.workflow.routing_mode, RoutingMode::TextOnly);
        assert_eq!(config.workspace.test_timeout, Duration::from_secs(90));
        assert_eq!(config.scm.provider, Provider::Azure);
        assert_eq!(config.scm.project, Some("Tools".to_string()));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("WORKSPACE_PATH", "/srv/ws"),
            ("AZURE_DEVOPS_DEFAULT_BRANCH", "release"),
            ("AZURE_DEVOPS_REPO_NAME", "calculator"),
            ("PR_LABELS", "tests, ai-generated ,"),
            ("TESTWRIGHT_BACKEND", "codex"),
        ]
        .into_iter()
        .collect();

        let config = Config::default()
            .with_env_lookup(|k| env.get(k).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.workspace.path, PathBuf::from("/srv/ws"));
        assert_eq!(config.workflow.target_branch, "release");
        assert_eq!(config.scm.repo, Some("calculator".to_string()));
        assert_eq!(config.workflow.labels, vec!["tests", "ai-generated"]);
        assert_eq!(config.agent.backend, BackendKind::Codex);
    }

    #[test]
    fn test_env_prefers_testwright_branch() {
        let config = Config::default()
            .with_env_lookup(|k| match k {
                "TESTWRIGHT_DEFAULT_BRANCH" => Some("dev".to_string()),
                "AZURE_DEVOPS_DEFAULT_BRANCH" => Some("release".to_string()),
                _ => None,
            })
            .unwrap();
        assert_eq!(config.workflow.target_branch, "dev");
    }

    #[test]
    fn test_env_bad_backend_is_error() {
        let result = Config::default().with_env_lookup(|k| {
            (k == "TESTWRIGHT_BACKEND").then(|| "gpt-shell".to_string())
        });
        assert!(result.is_err());
    }

    #[test]
    fn test_cli_overrides_win() {
        let config = Config::default()
            .with_env_lookup(|k| (k == "PR_LABELS").then(|| "from-env".to_string()))
            .unwrap()
            .with_cli_overrides(CliOverrides {
                labels: Some(vec!["from-cli".to_string()]),
                max_revisions: Some(1),
                provider: Some(Provider::Azure),
                ..Default::default()
            });

        assert_eq!(config.workflow.labels, vec!["from-cli"]);
        assert_eq!(config.workflow.max_revisions, 1);
        assert_eq!(config.scm.provider, Provider::Azure);
    }

    #[test]
    fn test_provider_from_str() {
        assert_eq!("GitHub".parse::<Provider>().unwrap(), Provider::GitHub);
        assert_eq!("azure-devops".parse::<Provider>().unwrap(), Provider::Azure);
        assert!("gitlab".parse::<Provider>().is_err());
    }
}
