//! Skill identities and environment names.
//!
//! Environment name: `skillpod-<repoScope>-<effectiveName>`. The repo scope keeps
//! environments of different workspaces apart; the effective name is the sanitized
//! override when one is configured, else the sanitized skill identity.

use sha2::{Digest, Sha256};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::SandboxError;

/// Prefix of every environment name.
pub const NAME_PREFIX: &str = "skillpod";
/// Label carrying the repo scope on every environment.
pub const SCOPE_LABEL: &str = "skillpod.scope";

/// Opaque, non-empty string naming a skill.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SkillId(String);

impl SkillId {
    pub fn new(id: impl Into<String>) -> Result<Self, SandboxError> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(SandboxError::InvalidSkillId(
                "skill identity must not be empty".to_string(),
            ));
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SkillId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for SkillId {
    type Err = SandboxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

/// Lowercase, map chars outside `[a-z0-9_.-]` to `-`, collapse and trim dashes.
pub fn sanitize_component(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars().flat_map(char::to_lowercase) {
        let mapped = if c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '_' | '.' | '-')
        {
            c
        } else {
            '-'
        };
        if mapped == '-' && out.ends_with('-') {
            continue;
        }
        out.push(mapped);
    }
    let trimmed = out.trim_matches('-');
    if trimmed.is_empty() {
        "workspace".to_string()
    } else {
        trimmed.to_string()
    }
}

/// `<sanitized basename>-<8 hex chars of sha256(absolute path)>`.
pub fn repo_scope(workspace: &Path) -> String {
    let absolute = absolutize(workspace);
    let base = absolute
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let digest = Sha256::digest(absolute.to_string_lossy().as_bytes());
    let short = hex::encode(digest);
    format!("{}-{}", sanitize_component(&base), &short[..8])
}

fn absolutize(path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    }
}

/// Derives environment names for one repo scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Naming {
    scope: String,
    name_override: Option<String>,
}

impl Naming {
    pub fn new(scope: impl Into<String>, name_override: Option<String>) -> Self {
        Self {
            scope: scope.into(),
            name_override: name_override.filter(|n| !n.trim().is_empty()),
        }
    }

    pub fn for_workspace(workspace: &Path, name_override: Option<String>) -> Self {
        Self::new(repo_scope(workspace), name_override)
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }

    pub fn effective_name(&self, skill: &SkillId) -> String {
        match &self.name_override {
            Some(name) => sanitize_component(name),
            None => sanitize_component(skill.as_str()),
        }
    }

    pub fn environment_name(&self, skill: &SkillId) -> String {
        format!("{}{}", self.prefix(), self.effective_name(skill))
    }

    /// Shared prefix of every environment name in this scope.
    pub fn prefix(&self) -> String {
        format!("{}-{}-", NAME_PREFIX, self.scope)
    }
}
