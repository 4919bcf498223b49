//! Environment management commands: stop, rm, logs, status, prewarm.

use anyhow::Result;
use serde_json::json;
use std::process::ExitCode;

use skillpod_sandbox::SkillId;

use super::print_json;
use crate::context::AppContext;

pub async fn run_stop(ctx: &AppContext, skill: &str) -> Result<ExitCode> {
    let skill = SkillId::new(skill)?;
    let stopped = ctx.manager.stop(&skill).await?;
    print_json(&json!({
        "name": ctx.manager.environment_name(&skill),
        "stopped": stopped,
    }))?;
    Ok(ExitCode::SUCCESS)
}

pub async fn run_remove(ctx: &AppContext, skill: &str) -> Result<ExitCode> {
    let skill = SkillId::new(skill)?;
    let removed = ctx.manager.remove(&skill).await?;
    print_json(&json!({
        "name": ctx.manager.environment_name(&skill),
        "removed": removed,
    }))?;
    Ok(ExitCode::SUCCESS)
}

pub async fn run_logs(ctx: &AppContext, skill: &str, tail: usize) -> Result<ExitCode> {
    let skill = SkillId::new(skill)?;
    print!("{}", ctx.manager.logs(&skill, tail).await?);
    Ok(ExitCode::SUCCESS)
}

pub async fn run_status(ctx: &AppContext, skill: Option<&str>) -> Result<ExitCode> {
    match skill {
        Some(skill) => {
            let skill = SkillId::new(skill)?;
            match ctx.manager.status(&skill).await? {
                Some(record) => {
                    print_json(&record)?;
                    Ok(ExitCode::SUCCESS)
                }
                None => {
                    eprintln!(
                        "skillpod: no environment named {}",
                        ctx.manager.environment_name(&skill)
                    );
                    Ok(ExitCode::FAILURE)
                }
            }
        }
        None => {
            print_json(&ctx.manager.list().await?)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

pub async fn run_prewarm(ctx: &AppContext) -> Result<ExitCode> {
    let resolver = ctx.manager.resolver();
    let availability = resolver.resolve().await?;
    print_json(&json!({
        "image": resolver.reference(),
        "availability": format!("{:?}", availability).to_lowercase(),
    }))?;
    Ok(ExitCode::SUCCESS)
}
