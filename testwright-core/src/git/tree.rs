//! The cloned working tree the Create-PR step commits from

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use git2::{ErrorCode, IndexAddOption, Repository, Signature, StatusOptions};
use tokio::process::Command;
use tracing::{debug, info};

use crate::{Error, Result};

/// Local git operations needed to publish the agents' edits
#[async_trait]
pub trait WorkingTree: Send + Sync {
    /// Stage every change, including deletions and untracked files
    async fn stage_all(&self) -> Result<()>;

    /// Whether the index or worktree differs from HEAD
    async fn has_changes(&self) -> Result<bool>;

    /// Create `branch` at HEAD and switch to it, keeping index and worktree
    async fn checkout_new_branch(&self, branch: &str) -> Result<()>;

    /// Commit the index, returning the commit id
    async fn commit(&self, message: &str) -> Result<String>;

    /// Push `branch` to origin and set upstream
    async fn push(&self, branch: &str) -> Result<()>;
}

/// [`WorkingTree`] backed by libgit2, pushing through the git CLI
#[derive(Debug, Clone)]
pub struct GitWorkingTree {
    root: PathBuf,
    author_name: String,
    author_email: String,
}

impl GitWorkingTree {
    /// Open the repository at `root`
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        Repository::open(&root).map_err(|e| {
            if e.code() == ErrorCode::NotFound {
                Error::Config(format!("Not a git repository: {}", root.display()))
            } else {
                Error::Git(e)
            }
        })?;

        Ok(Self {
            root,
            author_name: "testwright".to_string(),
            author_email: "testwright@users.noreply.github.com".to_string(),
        })
    }

    /// Set the commit author
    pub fn with_author(mut self, name: impl Into<String>, email: impl Into<String>) -> Self {
        self.author_name = name.into();
        self.author_email = email.into();
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Short name of the checked-out branch
    pub fn current_branch(&self) -> Result<String> {
        let repo = Repository::open(&self.root)?;
        let head = repo.head()?;
        Ok(head.shorthand().unwrap_or("HEAD").to_string())
    }

    async fn blocking<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Repository) -> Result<T> + Send + 'static,
    {
        let root = self.root.clone();
        tokio::task::spawn_blocking(move || {
            let repo = Repository::open(&root)?;
            f(&repo)
        })
        .await?
    }
}

#[async_trait]
impl WorkingTree for GitWorkingTree {
    async fn stage_all(&self) -> Result<()> {
        self.blocking(|repo| {
            let mut index = repo.index()?;
            index.add_all(["*"].iter(), IndexAddOption::DEFAULT, None)?;
            index.update_all(["*"].iter(), None)?;
            index.write()?;
            Ok(())
        })
        .await
    }

    async fn has_changes(&self) -> Result<bool> {
        self.blocking(|repo| {
            let mut opts = StatusOptions::new();
            opts.include_untracked(true)
                .recurse_untracked_dirs(true)
                .include_ignored(false);
            let statuses = repo.statuses(Some(&mut opts))?;
            let dirty = statuses
                .iter()
                .filter(|s| s.status() != git2::Status::CURRENT)
                .count();
            debug!(dirty, "Working tree status");
            Ok(dirty > 0)
        })
        .await
    }

    async fn checkout_new_branch(&self, branch: &str) -> Result<()> {
        let branch = branch.to_string();
        self.blocking(move |repo| {
            let refname = format!("refs/heads/{}", branch);
            match repo.head() {
                Ok(head) => {
                    let commit = head.peel_to_commit()?;
                    repo.branch(&branch, &commit, false)?;
                }
                // No commits yet: HEAD can point at the unborn branch directly
                Err(e) if e.code() == ErrorCode::UnbornBranch => {}
                Err(e) => return Err(e.into()),
            }
            repo.set_head(&refname)?;
            info!(branch = %branch, "Switched to new branch");
            Ok(())
        })
        .await
    }

    async fn commit(&self, message: &str) -> Result<String> {
        let message = message.to_string();
        let (name, email) = (self.author_name.clone(), self.author_email.clone());
        self.blocking(move |repo| {
            let sig = Signature::now(&name, &email)?;
            let mut index = repo.index()?;
            let tree = repo.find_tree(index.write_tree()?)?;
            let parent = match repo.head() {
                Ok(head) => Some(head.peel_to_commit()?),
                Err(e) if e.code() == ErrorCode::UnbornBranch => None,
                Err(e) => return Err(e.into()),
            };
            let parents: Vec<&git2::Commit<'_>> = parent.iter().collect();
            let oid = repo.commit(Some("HEAD"), &sig, &sig, &message, &tree, &parents)?;
            info!(commit = %oid, "Committed changes");
            Ok(oid.to_string())
        })
        .await
    }

    async fn push(&self, branch: &str) -> Result<()> {
        info!(branch, "Pushing branch to origin");
        let output = Command::new("git")
            .args(["push", "--set-upstream", "origin", branch])
            .env("GIT_TERMINAL_PROMPT", "0")
            .current_dir(&self.root)
            .output()
            .await
            .map_err(|e| Error::SourceControl(format!("Failed to run git push: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::SourceControl(format!(
                "git push of {} failed: {}",
                branch,
                super::redact_text(stderr.trim())
            )));
        }
        Ok(())
    }
}
