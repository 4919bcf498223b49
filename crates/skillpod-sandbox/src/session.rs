//! Per-run record of skills whose environments were used.
//!
//! Owned by the process entry point and drained at shutdown to stop and remove
//! every environment the run touched.

use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Mutex;

use crate::lifecycle::EnvironmentManager;
use crate::naming::SkillId;

#[derive(Debug, Default)]
pub struct Session {
    skills: Mutex<BTreeSet<SkillId>>,
}

/// Outcome of [`Session::drain`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CleanupReport {
    /// Skills whose environments were stopped and removed (or already gone).
    pub cleaned: Vec<String>,
    pub failed: Vec<CleanupFailure>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CleanupFailure {
    pub skill: String,
    pub error: String,
}

impl CleanupReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if the skill was not tracked yet.
    pub fn record(&self, skill: &SkillId) -> bool {
        self.lock().insert(skill.clone())
    }

    pub fn skills(&self) -> Vec<SkillId> {
        self.lock().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeSet<SkillId>> {
        self.skills.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Stop and remove every tracked environment, then forget them.
    ///
    /// The set is taken before any runtime call, so a second drain is a no-op.
    /// Failures are collected; one failing skill does not stop the others.
    pub async fn drain(&self, manager: &EnvironmentManager) -> CleanupReport {
        let skills = std::mem::take(&mut *self.lock());
        let mut report = CleanupReport::default();
        for skill in skills {
            match manager.remove(&skill).await {
                Ok(_) => report.cleaned.push(skill.to_string()),
                Err(e) => {
                    tracing::warn!(skill = %skill, error = %e, "cleanup failed");
                    report.failed.push(CleanupFailure {
                        skill: skill.to_string(),
                        error: e.to_string(),
                    });
                }
            }
        }
        if !report.cleaned.is_empty() || !report.failed.is_empty() {
            tracing::info!(
                cleaned = report.cleaned.len(),
                failed = report.failed.len(),
                "session drained"
            );
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_is_a_set() {
        let session = Session::new();
        let pdf = SkillId::new("pdf").unwrap();
        assert!(session.is_empty());
        assert!(session.record(&pdf));
        assert!(!session.record(&pdf));
        session.record(&SkillId::new("xlsx").unwrap());
        assert_eq!(session.len(), 2);
        assert_eq!(session.skills()[0], pdf);
    }
}
