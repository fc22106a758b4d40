use crate::{
    api::registry::Tool,
    config::Config,
    errors::{AppError, AppResult},
    guard::PathGuard,
    tools::{ensure_parent, parse_params},
};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::{ffi::OsStr, path::Path, process::Stdio, time::Duration};
use tokio::{io::AsyncWriteExt, process::Command, time::timeout};
use tracing::{debug, info, warn};

pub const COMMIT_FILE: &str = "commit.txt";
pub const COMMIT_OK: &str = "Repository cloned and commit made successfully.";

/// Runs git steps as child processes with a bounded wait.
#[derive(Debug, Clone)]
pub struct GitRunner {
    program: String,
    timeout: Duration,
    author: Option<(String, String)>,
}

impl GitRunner {
    pub fn new(cfg: &Config) -> Self {
        let author = match (&cfg.git.author_name, &cfg.git.author_email) {
            (Some(name), Some(email)) => Some((name.clone(), email.clone())),
            _ => None,
        };
        Self {
            program: cfg.git.program.clone(),
            timeout: Duration::from_secs(cfg.limits.exec_timeout_s),
            author,
        }
    }

    /// Runs one git step; a non-zero exit becomes an external-action failure
    /// carrying the process's stderr.
    async fn run<I, S>(&self, step: &'static str, args: I) -> AppResult<String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let program = which::which(&self.program)
            .map_err(|e| AppError::external(step, format!("{} not found: {e}", self.program)))?;
        let mut command = Command::new(program);
        command.args(args);
        command.env("GIT_TERMINAL_PROMPT", "0");
        command.stdin(Stdio::null());
        command.stdout(Stdio::piped());
        command.stderr(Stdio::piped());
        command.kill_on_drop(true);

        debug!(step, "running git");
        let output = match timeout(self.timeout, command.output()).await {
            Ok(result) => result.map_err(|e| AppError::external(step, e))?,
            Err(_) => return Err(AppError::Timeout(step)),
        };
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            warn!(step, code = ?output.status.code(), stderr = %stderr, "git step failed");
            return Err(AppError::external(step, stderr));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn identity_args(&self) -> Vec<String> {
        match &self.author {
            Some((name, email)) => vec![
                "-c".to_string(),
                format!("user.name={name}"),
                "-c".to_string(),
                format!("user.email={email}"),
            ],
            None => Vec::new(),
        }
    }
}

/// Clones `repo_url` into `checkout_dir` unless it already exists, appends
/// `message` as a line of `commit.txt` and commits it.
///
/// Not idempotent: every call adds one line and one commit.
pub async fn clone_and_commit(
    guard: &PathGuard,
    git: &GitRunner,
    checkout_dir: &str,
    repo_url: &str,
    message: &str,
) -> AppResult<String> {
    guard.require(&[checkout_dir], "checkout_dir")?;
    ensure_parent(checkout_dir).await?;

    let dir = Path::new(checkout_dir);
    if !dir.exists() {
        info!(repo_url, checkout_dir, "cloning repository");
        git.run("git clone", ["clone", "--", repo_url, checkout_dir]).await?;
    }
    if !dir.join(".git").exists() {
        return Err(AppError::external("git clone", format!("{checkout_dir} is not a git repository")));
    }

    let commit_file = dir.join(COMMIT_FILE);
    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&commit_file)
        .await
        .map_err(|e| AppError::external("append commit file", e))?;
    file.write_all(format!("{message}\n").as_bytes())
        .await
        .map_err(|e| AppError::external("append commit file", e))?;
    file.flush().await.map_err(|e| AppError::external("append commit file", e))?;
    drop(file);

    git.run("git add", ["-C", checkout_dir, "add", COMMIT_FILE]).await?;
    let mut commit_args = vec!["-C".to_string(), checkout_dir.to_string()];
    commit_args.extend(git.identity_args());
    commit_args.extend(["commit".to_string(), "-m".to_string(), message.to_string()]);
    git.run("git commit", commit_args).await?;

    info!(checkout_dir, "commit made");
    Ok(COMMIT_OK.to_string())
}

pub struct GitCommitTool {
    guard: PathGuard,
    git: GitRunner,
    checkout_dir: String,
}

impl GitCommitTool {
    pub fn new(guard: PathGuard, git: GitRunner, checkout_dir: String) -> Self {
        Self { guard, git, checkout_dir }
    }
}

#[derive(Debug, Deserialize)]
struct GitCommitParams {
    repo_url: String,
    commit_message: String,
}

#[async_trait]
impl Tool for GitCommitTool {
    fn name(&self) -> &'static str { "git_commit" }
    fn description(&self) -> &'static str { "Clone a git repository into the data root (once) and commit a message line to commit.txt." }
    fn capabilities(&self) -> serde_json::Value {
        json!({"input": {"type":"object","required":["repo_url","commit_message"],"properties": {"repo_url": {"type":"string"},"commit_message":{"type":"string"}}}, "output": {"type":"object","properties": {"message":{"type":"string"},"checkout_dir":{"type":"string"}}}})
    }
    async fn call(&self, params: serde_json::Value) -> AppResult<serde_json::Value> {
        let p: GitCommitParams = parse_params(params)?;
        let message = clone_and_commit(&self.guard, &self.git, &self.checkout_dir, &p.repo_url, &p.commit_message).await?;
        Ok(json!({"message": message, "checkout_dir": self.checkout_dir}))
    }
}
