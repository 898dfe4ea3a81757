//! Subprocess git collaborator
//!
//! Every git interaction goes through the system `git` binary: diffing
//! two revisions, resolving branches, and finding the merge base for
//! pushes that start a new branch. The binary is located on PATH up
//! front so a missing install fails fast, before any work is attempted.

use std::path::{Path, PathBuf};
use std::process::Command;

use thiserror::Error;
use tracing::debug;

/// The all-zero revision git hooks pass for "no previous revision"
/// (new branch or new ref).
pub const ZERO_SHA: &str = "0000000000000000000000000000000000000000";

#[derive(Debug, Error)]
pub enum GitError {
    #[error("cannot locate the git binary on PATH")]
    BinaryMissing,
    #[error("git {command} failed: {stderr}")]
    CommandFailed { command: String, stderr: String },
}

/// Locate the git executable on the system search path.
pub fn locate_git_binary() -> Result<PathBuf, GitError> {
    let path = std::env::var_os("PATH").ok_or(GitError::BinaryMissing)?;
    for dir in std::env::split_paths(&path) {
        let candidate = dir.join("git");
        if candidate.is_file() {
            return Ok(candidate);
        }
        #[cfg(windows)]
        {
            let candidate = dir.join("git.exe");
            if candidate.is_file() {
                return Ok(candidate);
            }
        }
    }
    Err(GitError::BinaryMissing)
}

/// Runs git commands inside one working directory.
pub struct GitClient {
    binary: PathBuf,
    workdir: PathBuf,
}

impl GitClient {
    /// Create a client for a repository (or any directory inside it).
    ///
    /// Fails with [`GitError::BinaryMissing`] when git is not installed.
    pub fn new(workdir: impl Into<PathBuf>) -> Result<Self, GitError> {
        Ok(Self {
            binary: locate_git_binary()?,
            workdir: workdir.into(),
        })
    }

    fn execute(&self, args: &[&str]) -> Result<String, GitError> {
        debug!("git {}", args.join(" "));
        let output = Command::new(&self.binary)
            .args(args)
            .current_dir(&self.workdir)
            .output()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => GitError::BinaryMissing,
                _ => GitError::CommandFailed {
                    command: args.join(" "),
                    stderr: e.to_string(),
                },
            })?;
        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).into_owned())
        } else {
            Err(GitError::CommandFailed {
                command: args.join(" "),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }

    /// Unified diff text between two revisions.
    pub fn diff(&self, revision1: &str, revision2: &str) -> Result<String, GitError> {
        self.execute(&["diff", revision1, revision2])
    }

    /// Name of the branch currently checked out.
    pub fn current_branch(&self) -> Result<String, GitError> {
        self.execute(&["rev-parse", "--abbrev-ref", "HEAD"])
            .map(|out| out.trim().to_string())
    }

    /// Main branch of the `origin` remote, parsed from the
    /// `HEAD branch:` line of `git remote show origin`.
    pub fn main_branch(&self) -> Result<String, GitError> {
        let output = self.execute(&["remote", "show", "origin"])?;
        output
            .lines()
            .find_map(|line| {
                line.split_once("HEAD branch:")
                    .map(|(_, branch)| branch.trim().to_string())
            })
            .ok_or_else(|| GitError::CommandFailed {
                command: "remote show origin".to_string(),
                stderr: "no HEAD branch line in output".to_string(),
            })
    }

    /// Closest common ancestor between two branches.
    pub fn merge_base(&self, branch1: &str, branch2: &str) -> Result<String, GitError> {
        self.execute(&["merge-base", "-a", branch1, branch2])
            .map(|out| out.lines().next().unwrap_or("").trim().to_string())
    }

    /// Root directory of the repository.
    pub fn root_directory(&self) -> Result<PathBuf, GitError> {
        self.execute(&["rev-parse", "--show-toplevel"])
            .map(|out| PathBuf::from(out.trim()))
    }

    /// Closest ancestor between the current branch and the repository's
    /// main branch. Called when a push carries the all-zero revision;
    /// any failure along the way means "no ancestor to compare against".
    pub fn find_closest_sha(&self) -> Option<String> {
        let current = match self.current_branch() {
            Ok(branch) => branch,
            Err(e) => {
                debug!("cannot find the current branch: {e}");
                return None;
            }
        };
        let main = match self.main_branch() {
            Ok(branch) => branch,
            Err(e) => {
                debug!("cannot find the main branch: {e}");
                return None;
            }
        };
        match self.merge_base(&main, &current) {
            Ok(sha) if !sha.is_empty() => Some(sha),
            Ok(_) => None,
            Err(e) => {
                debug!("cannot find the merge base of {main} and {current}: {e}");
                None
            }
        }
    }

    /// Directory the client runs git in.
    pub fn workdir(&self) -> &Path {
        &self.workdir
    }
}
