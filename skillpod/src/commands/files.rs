use anyhow::{Context, Result};
use std::io::Read;
use std::process::ExitCode;

use skillpod_sandbox::SkillId;

use crate::context::AppContext;

pub async fn run_read(ctx: &AppContext, skill: &str, path: &str) -> Result<ExitCode> {
    let skill = SkillId::new(skill)?;
    let response = ctx.client.read_file(&skill, path).await?;
    if response.success {
        print!("{}", response.content);
        Ok(ExitCode::SUCCESS)
    } else {
        eprintln!(
            "skillpod: {}",
            response.error.unwrap_or_else(|| "read failed".to_string())
        );
        Ok(ExitCode::FAILURE)
    }
}

pub async fn run_write(ctx: &AppContext, skill: &str, path: &str, content: String) -> Result<ExitCode> {
    let skill = SkillId::new(skill)?;
    let content = if content == "-" {
        let mut s = String::new();
        std::io::stdin()
            .read_to_string(&mut s)
            .context("Failed to read content from stdin")?;
        s
    } else {
        content
    };
    let response = ctx.client.write_file(&skill, path, &content).await?;
    if response.success {
        Ok(ExitCode::SUCCESS)
    } else {
        eprintln!(
            "skillpod: {}",
            response.error.unwrap_or_else(|| "write failed".to_string())
        );
        Ok(ExitCode::FAILURE)
    }
}
