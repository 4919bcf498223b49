use std::path::Path;

use skillpod_core::skill::discover_skills;

/// Print one skill name per line.
pub fn run_skills(root: &Path) {
    let skills = discover_skills(root);
    if skills.is_empty() {
        tracing::info!(root = %root.display(), "no skills found");
    }
    for skill in skills {
        println!("{}", skill.name);
    }
}
