//! Secrets management for testwright
//!
//! Secrets are stored separately from configuration to avoid accidental sharing.
//! The secrets file is located at `~/.config/testwright/secrets.toml` and must have
//! restrictive permissions (0600 on Unix).
//!
//! Loading priority:
//! 1. Environment variables (GITHUB_TOKEN, AZURE_DEVOPS_PAT, AZURE_OPENAI_API_KEY, OPENAI_API_KEY)
//! 2. Secrets file (~/.config/testwright/secrets.toml)

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{Error, Result};

/// Secrets structure
#[derive(Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Secrets {
    /// GitHub configuration
    pub github: TokenSecret,

    /// Azure DevOps configuration
    pub azure_devops: PatSecret,

    /// Chat completions API key
    pub llm: ApiKeySecret,
}

/// GitHub-related secrets
#[derive(Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct TokenSecret {
    /// GitHub Personal Access Token
    pub token: Option<String>,
}

/// Azure DevOps secrets
#[derive(Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct PatSecret {
    /// Personal Access Token with Code (read/write) scope
    pub pat: Option<String>,
}

/// LLM endpoint secrets
#[derive(Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ApiKeySecret {
    pub api_key: Option<String>,
}

impl std::fmt::Debug for Secrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mark = |v: &Option<String>| if v.is_some() { "<set>" } else { "<unset>" };
        f.debug_struct("Secrets")
            .field("github.token", &mark(&self.github.token))
            .field("azure_devops.pat", &mark(&self.azure_devops.pat))
            .field("llm.api_key", &mark(&self.llm.api_key))
            .finish()
    }
}

impl Secrets {
    /// Load secrets from the default location
    ///
    /// Returns default (empty) secrets if file doesn't exist
    pub fn load() -> Result<Self> {
        let secrets_path = Self::default_secrets_path();

        if let Some(path) = secrets_path {
            if path.exists() {
                return Self::load_from_file(&path);
            }
        }

        Ok(Self::default())
    }

    /// Load secrets from a specific file with permission checking
    pub fn load_from_file(path: &Path) -> Result<Self> {
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;

            let metadata = std::fs::metadata(path).map_err(Error::Io)?;
            let mode = metadata.permissions().mode();

            if mode & 0o077 != 0 {
                return Err(Error::Config(format!(
                    "Secrets file {} has insecure permissions {:o}. \
                     Please run: chmod 600 {}",
                    path.display(),
                    mode & 0o777,
                    path.display()
                )));
            }

            debug!(
                path = %path.display(),
                mode = format!("{:o}", mode & 0o777),
                "Secrets file permissions OK"
            );
        }

        let contents = std::fs::read_to_string(path).map_err(Error::Io)?;
        let mut secrets: Secrets = toml::from_str(&contents)
            .map_err(|e| Error::Config(format!("Failed to parse secrets: {}", e)))?;

        for value in [
            &mut secrets.github.token,
            &mut secrets.azure_devops.pat,
            &mut secrets.llm.api_key,
        ] {
            if let Some(v) = value.as_mut() {
                *v = v.trim().to_string();
            }
        }

        Ok(secrets)
    }

    /// Get the default secrets file path
    ///
    /// Returns `~/.config/testwright/secrets.toml` on Unix
    pub fn default_secrets_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("testwright").join("secrets.toml"))
    }

    /// GitHub token, GITHUB_TOKEN env var first
    pub fn github_token(&self) -> Option<String> {
        resolve("GITHUB_TOKEN", &self.github.token)
    }

    /// Azure DevOps PAT, AZURE_DEVOPS_PAT env var first
    pub fn azure_devops_pat(&self) -> Option<String> {
        resolve("AZURE_DEVOPS_PAT", &self.azure_devops.pat)
    }

    /// Chat API key, AZURE_OPENAI_API_KEY then OPENAI_API_KEY env vars first
    pub fn llm_api_key(&self) -> Option<String> {
        env_value("AZURE_OPENAI_API_KEY").or_else(|| resolve("OPENAI_API_KEY", &self.llm.api_key))
    }

    /// Create a template secrets file at the default location
    ///
    /// Creates parent directories if needed and sets secure permissions
    pub fn create_template() -> Result<PathBuf> {
        let path = Self::default_secrets_path()
            .ok_or_else(|| Error::Config("Could not determine secrets path".to_string()))?;
        Self::create_template_at(&path)?;
        warn!(path = %path.display(), "Created secrets template - please edit and add your tokens");
        Ok(path)
    }

    /// Create a template secrets file at `path`
    pub fn create_template_at(path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(Error::Io)?;
        }

        // Don't overwrite existing file
        if path.exists() {
            return Err(Error::Config(format!(
                "Secrets file already exists at {}",
                path.display()
            )));
        }

        let template = r#"# testwright secrets
# This file contains sensitive credentials - do not share or commit to version control
#
# IMPORTANT: This file must have restrictive permissions (chmod 600)

[github]
# Personal Access Token with repo scope
token = ""

[azure_devops]
# Personal Access Token with Code (read & write) scope
pat = ""

[llm]
# API key for the chat completions endpoint
api_key = ""
"#;

        std::fs::write(path, template).map_err(Error::Io)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o600);
            std::fs::set_permissions(path, perms).map_err(Error::Io)?;
        }

        Ok(())
    }
}

fn env_value(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn resolve(env_key: &str, file_value: &Option<String>) -> Option<String> {
    if let Some(value) = env_value(env_key) {
        debug!(source = env_key, "Using secret from environment");
        return Some(value);
    }

    file_value.as_ref().filter(|v| !v.is_empty()).map(|v| {
        debug!(source = env_key, "Using secret from secrets file");
        v.clone()
    })
}
