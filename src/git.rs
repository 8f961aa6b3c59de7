use std::path::Path;
use std::time::Duration;

use base64::Engine as _;
use secrecy::{ExposeSecret, SecretString};

use crate::config::RepositoryConfig;
use crate::error::{Error, Result};
use crate::process::{failure_message, Invocation};

/// HTTP basic credentials for the ledger repository remote.
#[derive(Debug, Clone)]
pub struct GitCredentials {
    pub username: String,
    pub token: SecretString,
}

impl GitCredentials {
    fn basic_auth_header(&self) -> String {
        let raw = format!("{}:{}", self.username, self.token.expose_secret());
        let encoded = base64::engine::general_purpose::STANDARD.encode(raw);
        format!("Authorization: Basic {encoded}")
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum RepoSyncOutcome {
    Cloned,
    Updated,
    UpToDate,
}

/// Make sure `repo.path` holds an up to date working copy of `repo.url`.
///
/// Clones when the path is missing or an empty directory, otherwise
/// fast-forwards the configured branch. An unchanged HEAD after pulling is
/// reported as [`RepoSyncOutcome::UpToDate`], not an error.
pub async fn sync_repository(
    repo: &RepositoryConfig,
    credentials: Option<&GitCredentials>,
    timeout: Duration,
) -> Result<RepoSyncOutcome> {
    let git = Git {
        credentials,
        timeout,
    };

    if is_work_tree(&git, &repo.path).await? {
        let before = git.head(&repo.path).await?;
        git.run(
            Some(repo.path.as_path()),
            &["pull", "--ff-only", "origin", repo.branch.as_str()],
            "git pull",
        )
        .await?;
        let after = git.head(&repo.path).await?;

        if before == after {
            tracing::debug!(path = %repo.path.display(), "ledger repository already up to date");
            Ok(RepoSyncOutcome::UpToDate)
        } else {
            tracing::info!(path = %repo.path.display(), %before, %after, "pulled ledger repository");
            Ok(RepoSyncOutcome::Updated)
        }
    } else {
        if !is_empty_or_missing(&repo.path)? {
            return Err(Error::Sync(format!(
                "{} exists but is not a git working copy",
                repo.path.display()
            )));
        }

        let path = repo.path.to_string_lossy();
        git.run(
            None,
            &[
                "clone",
                "--branch",
                repo.branch.as_str(),
                repo.url.as_str(),
                &*path,
            ],
            "git clone",
        )
        .await?;
        tracing::info!(url = %repo.url, path = %repo.path.display(), "cloned ledger repository");
        Ok(RepoSyncOutcome::Cloned)
    }
}

struct Git<'a> {
    credentials: Option<&'a GitCredentials>,
    timeout: Duration,
}

impl Git<'_> {
    async fn output(&self, dir: Option<&Path>, args: &[&str]) -> Result<std::process::Output> {
        let mut invocation = Invocation::new("git", self.timeout).env("GIT_TERMINAL_PROMPT", "0");
        if let Some(dir) = dir {
            invocation = invocation.arg("-C").arg(dir);
        }
        if let Some(credentials) = self.credentials {
            // Passed through the environment so the token never shows up in
            // the process list.
            invocation = invocation
                .env("GIT_CONFIG_COUNT", "1")
                .env("GIT_CONFIG_KEY_0", "http.extraHeader")
                .env("GIT_CONFIG_VALUE_0", credentials.basic_auth_header());
        }

        invocation
            .args(args)
            .output()
            .await
            .map_err(|e| Error::Sync(e.to_string()))
    }

    async fn run(&self, dir: Option<&Path>, args: &[&str], what: &str) -> Result<String> {
        let output = self.output(dir, args).await?;
        if !output.status.success() {
            return Err(Error::Sync(format!("{what} failed: {}", failure_message(&output))));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn head(&self, dir: &Path) -> Result<String> {
        let head = self.run(Some(dir), &["rev-parse", "HEAD"], "git rev-parse").await?;
        Ok(head.trim().to_string())
    }
}

async fn is_work_tree(git: &Git<'_>, dir: &Path) -> Result<bool> {
    if !dir.join(".git").exists() {
        return Ok(false);
    }
    let output = git
        .output(Some(dir), &["rev-parse", "--is-inside-work-tree"])
        .await?;
    Ok(output.status.success() && String::from_utf8_lossy(&output.stdout).trim() == "true")
}

fn is_empty_or_missing(dir: &Path) -> Result<bool> {
    match std::fs::read_dir(dir) {
        Ok(mut entries) => Ok(entries.next().is_none()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(true),
        Err(e) => Err(Error::Sync(format!("cannot read {}: {e}", dir.display()))),
    }
}
