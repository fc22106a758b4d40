use crate::guard::GuardPolicy;
use serde::Deserialize;
use std::fs;
use std::path::Path;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub root: Root,
    pub server: Server,
    pub auth: Auth,
    #[serde(default)]
    pub limits: Limits,
    #[serde(default)]
    pub rate: Rate,
    #[serde(default)]
    pub git: Git,
    #[serde(default)]
    pub logging: Logging,
}

/// The data root is kept as a plain string: the default guard policy compares it
/// against candidate paths as a literal prefix.
#[derive(Debug, Deserialize, Clone)]
pub struct Root {
    #[serde(default = "default_root_dir")]
    pub root_dir: String,
    #[serde(default)]
    pub policy: GuardPolicy,
}
fn default_root_dir() -> String { "/data".to_string() }

#[derive(Debug, Deserialize, Clone)]
pub struct Server {
    pub bind_addr: String,
    pub port: u16,
    #[serde(default = "default_base_path")]
    pub base_path: String,
}
fn default_base_path() -> String { "/tasks".to_string() }

#[derive(Debug, Deserialize, Clone)]
pub struct Auth {
    pub bearer_token: String,
    pub allowed_origins: Vec<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Limits {
    #[serde(default = "default_http_timeout_s")]
    pub http_timeout_s: u64,
    #[serde(default = "default_exec_timeout_s")]
    pub exec_timeout_s: u64,
    #[serde(default = "default_max_fetch_kb")]
    pub max_fetch_kb: u64,
    #[serde(default = "default_max_request_kb")]
    pub max_request_kb: usize,
}
fn default_http_timeout_s() -> u64 { 30 }
fn default_exec_timeout_s() -> u64 { 120 }
fn default_max_fetch_kb() -> u64 { 10 * 1024 }
fn default_max_request_kb() -> usize { 256 }

impl Default for Limits {
    fn default() -> Self {
        Self {
            http_timeout_s: default_http_timeout_s(),
            exec_timeout_s: default_exec_timeout_s(),
            max_fetch_kb: default_max_fetch_kb(),
            max_request_kb: default_max_request_kb(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct Rate {
    #[serde(default = "default_per_token_rps")]
    pub per_token_rps: u32,
    #[serde(default = "default_per_token_burst")]
    pub per_token_burst: u32,
    #[serde(default = "default_global_rps")]
    pub global_rps: u32,
    #[serde(default = "default_global_burst")]
    pub global_burst: u32,
}
fn default_per_token_rps() -> u32 { 10 }
fn default_per_token_burst() -> u32 { 20 }
fn default_global_rps() -> u32 { 20 }
fn default_global_burst() -> u32 { 40 }

impl Default for Rate {
    fn default() -> Self {
        Self {
            per_token_rps: default_per_token_rps(),
            per_token_burst: default_per_token_burst(),
            global_rps: default_global_rps(),
            global_burst: default_global_burst(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct Git {
    #[serde(default = "default_git_program")]
    pub program: String,
    /// Relative names are placed under the data root.
    #[serde(default = "default_checkout_dir")]
    pub checkout_dir: String,
    #[serde(default)]
    pub author_name: Option<String>,
    #[serde(default)]
    pub author_email: Option<String>,
}
fn default_git_program() -> String { "git".to_string() }
fn default_checkout_dir() -> String { "repo".to_string() }

impl Default for Git {
    fn default() -> Self {
        Self {
            program: default_git_program(),
            checkout_dir: default_checkout_dir(),
            author_name: None,
            author_email: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Logging {
    #[serde(default)]
    pub format: LogFormat,
    #[serde(default = "default_filter")]
    pub filter: String,
}
fn default_filter() -> String { "info".to_string() }

impl Default for Logging {
    fn default() -> Self { Self { format: LogFormat::default(), filter: default_filter() } }
}

impl Config {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = fs::read_to_string(path)?;
        if path.extension().map(|e| e == "json").unwrap_or(false) {
            Ok(serde_json::from_str(&raw)?)
        } else {
            Ok(toml::from_str(&raw)?)
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.root.root_dir.is_empty() { anyhow::bail!("root_dir must not be empty"); }
        if !Path::new(&self.root.root_dir).is_absolute() {
            anyhow::bail!("root_dir must be an absolute path: {}", self.root.root_dir);
        }
        if self.auth.bearer_token.trim().is_empty() { anyhow::bail!("bearer_token must not be empty"); }
        if self.auth.allowed_origins.is_empty() { anyhow::bail!("allowed_origins must not be empty"); }
        if self.limits.http_timeout_s == 0 { anyhow::bail!("http_timeout_s must be > 0"); }
        if self.limits.exec_timeout_s == 0 { anyhow::bail!("exec_timeout_s must be > 0"); }
        if self.limits.max_fetch_kb == 0 { anyhow::bail!("max_fetch_kb must be > 0"); }
        if self.limits.max_request_kb == 0 { anyhow::bail!("max_request_kb must be > 0"); }
        if self.git.program.trim().is_empty() { anyhow::bail!("git.program must not be empty"); }
        if self.git.author_name.is_some() != self.git.author_email.is_some() {
            anyhow::bail!("git.author_name and git.author_email must be set together");
        }
        Ok(())
    }

    /// Checkout directory used by the clone-and-commit task.
    pub fn checkout_dir(&self) -> String {
        if Path::new(&self.git.checkout_dir).is_absolute() {
            self.git.checkout_dir.clone()
        } else {
            format!("{}/{}", self.root.root_dir.trim_end_matches('/'), self.git.checkout_dir)
        }
    }
}
