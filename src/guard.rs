//! Path containment checks for every task that reads or writes under the data root.
//!
//! The default policy is a literal string-prefix test. It does not resolve `..`,
//! symlinks or relative paths: `/data/../etc/passwd` passes for root `/data`, and so
//! does `/database`. Callers depend on that behavior, so hardening is opt-in through
//! [`GuardPolicy::Canonical`].

use crate::errors::{AppError, AppResult};
use serde::Deserialize;
use std::ffi::OsString;
use std::path::{Component, Path, PathBuf};
use tracing::warn;

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum GuardPolicy {
    /// Literal string prefix of the root.
    #[default]
    Prefix,
    /// Normalized, symlink-resolved component containment.
    Canonical,
}

#[derive(Debug, Clone)]
pub struct PathGuard {
    root: String,
    policy: GuardPolicy,
}

impl PathGuard {
    pub fn new(root: impl Into<String>) -> Self {
        Self::with_policy(root, GuardPolicy::Prefix)
    }

    pub fn with_policy(root: impl Into<String>, policy: GuardPolicy) -> Self {
        Self { root: root.into(), policy }
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    pub fn policy(&self) -> GuardPolicy {
        self.policy
    }

    /// True when every path is inside the root. An empty sequence passes.
    pub fn allows<I, S>(&self, paths: I) -> bool
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        paths.into_iter().all(|p| self.allows_one(p.as_ref()))
    }

    /// Like [`PathGuard::allows`], but yields the permission error tasks return.
    /// `what` names the arguments that must be under the root.
    pub fn require<S: AsRef<str>>(&self, paths: &[S], what: &str) -> AppResult<()> {
        if self.allows(paths) {
            return Ok(());
        }
        let rejected: Vec<&str> = paths
            .iter()
            .map(|p| p.as_ref())
            .filter(|p| !self.allows_one(p))
            .collect();
        warn!(root = %self.root, rejected = ?rejected, "path outside data root");
        Err(AppError::PermissionDenied(format!("{what} must be under {}", self.root)))
    }

    fn allows_one(&self, path: &str) -> bool {
        match self.policy {
            GuardPolicy::Prefix => path.starts_with(self.root.as_str()),
            GuardPolicy::Canonical => contained(Path::new(&self.root), Path::new(path)),
        }
    }
}

fn contained(root: &Path, candidate: &Path) -> bool {
    if !candidate.is_absolute() {
        return false;
    }
    let Ok(root) = dunce::canonicalize(root) else {
        return false;
    };
    resolve_existing(&normalize(candidate)).starts_with(&root)
}

fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Canonicalizes the deepest ancestor that exists and re-appends the rest, so a
/// symlink anywhere along an existing prefix is followed.
fn resolve_existing(path: &Path) -> PathBuf {
    let mut existing = path.to_path_buf();
    let mut rest: Vec<OsString> = Vec::new();
    loop {
        if let Ok(mut resolved) = dunce::canonicalize(&existing) {
            for part in rest.iter().rev() {
                resolved.push(part);
            }
            return resolved;
        }
        let name = existing.file_name().map(|n| n.to_os_string());
        let parent = existing.parent().map(Path::to_path_buf);
        match (name, parent) {
            (Some(name), Some(parent)) => {
                rest.push(name);
                existing = parent;
            }
            _ => return path.to_path_buf(),
        }
    }
}
