//! Skill discovery: directories containing `SKILL.md` under a skills root.
//!
//! Only names are discovered here. Instruction files are never parsed.

use std::fs;
use std::path::{Path, PathBuf};

/// Marker file identifying a skill directory.
pub const SKILL_MARKER: &str = "SKILL.md";

/// A skill directory found under the skills root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredSkill {
    /// Directory name; used as the skill identity.
    pub name: String,
    pub path: PathBuf,
}

/// List direct children of `root` that contain `SKILL.md`, sorted by name.
///
/// A missing or unreadable root yields an empty list. Hidden directories are skipped.
pub fn discover_skills(root: &Path) -> Vec<DiscoveredSkill> {
    let Ok(entries) = fs::read_dir(root) else {
        return Vec::new();
    };
    let mut skills: Vec<DiscoveredSkill> = entries
        .flatten()
        .filter_map(|entry| {
            let path = entry.path();
            let name = entry.file_name().to_string_lossy().to_string();
            if name.starts_with('.') || !path.is_dir() || !path.join(SKILL_MARKER).is_file() {
                return None;
            }
            Some(DiscoveredSkill { name, path })
        })
        .collect();
    skills.sort_by(|a, b| a.name.cmp(&b.name));
    skills
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_discover_skills_only_marked_dirs() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();
        for name in ["pdf", "xlsx", ".hidden"] {
            fs::create_dir(root.join(name)).unwrap();
            fs::write(root.join(name).join(SKILL_MARKER), "---\nname: x\n---\n").unwrap();
        }
        fs::create_dir(root.join("notes")).unwrap();
        fs::write(root.join("README.md"), "not a skill").unwrap();

        let names: Vec<String> = discover_skills(root).into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["pdf".to_string(), "xlsx".to_string()]);
    }

    #[test]
    fn test_discover_skills_missing_root() {
        assert!(discover_skills(Path::new("/definitely/not/here")).is_empty());
    }
}
