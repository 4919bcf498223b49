use anyhow::Result;
use std::io::Write;
use std::process::ExitCode;

use skillpod_core::protocol::StreamEvent;
use skillpod_sandbox::{ExecutionRequest, SkillId};

use super::{exit_code, print_json};
use crate::context::AppContext;

pub struct ExecArgs {
    pub skill: String,
    pub command: String,
    pub timeout_ms: Option<u64>,
    pub cwd: Option<String>,
    pub stream: bool,
    pub json: bool,
    pub cleanup: bool,
}

impl ExecArgs {
    fn request(&self) -> ExecutionRequest {
        let mut request = ExecutionRequest::new(self.command.clone());
        request.timeout_ms = self.timeout_ms;
        request.working_directory = self.cwd.clone();
        request
    }
}

pub async fn run_exec(ctx: &AppContext, args: ExecArgs) -> Result<ExitCode> {
    let skill = SkillId::new(args.skill.clone())?;
    let code = if args.stream {
        stream(ctx, &skill, &args).await?
    } else {
        buffered(ctx, &skill, &args).await?
    };

    if args.cleanup {
        let report = ctx.drain_session().await;
        for failure in &report.failed {
            eprintln!("cleanup failed for {}: {}", failure.skill, failure.error);
        }
    }
    Ok(exit_code(code))
}

async fn buffered(ctx: &AppContext, skill: &SkillId, args: &ExecArgs) -> Result<i32> {
    let result = ctx.client.execute(skill, args.request()).await?;
    if args.json {
        print_json(&result)?;
    } else {
        print!("{}", result.stdout);
        eprint!("{}", result.stderr);
        if let Some(message) = &result.error_message {
            eprintln!("skillpod: {}", message);
        }
    }
    Ok(result.exit_code)
}

async fn stream(ctx: &AppContext, skill: &SkillId, args: &ExecArgs) -> Result<i32> {
    let mut rx = ctx.client.execute_stream(skill, args.request()).await?;
    let mut code = 1;
    let stdout = std::io::stdout();
    let stderr = std::io::stderr();
    while let Some(event) = rx.recv().await {
        if args.json {
            let mut out = stdout.lock();
            out.write_all(event.to_ndjson().as_bytes())?;
            out.flush()?;
        }
        match event {
            StreamEvent::Stdout { data } if !args.json => {
                let mut out = stdout.lock();
                out.write_all(data.as_bytes())?;
                out.flush()?;
            }
            StreamEvent::Stderr { data } if !args.json => {
                let mut err = stderr.lock();
                err.write_all(data.as_bytes())?;
                err.flush()?;
            }
            StreamEvent::Timeout { timeout_ms } if !args.json => {
                eprintln!("skillpod: command timed out after {}ms", timeout_ms);
            }
            StreamEvent::Exit { exit_code, .. } => code = exit_code.unwrap_or(1),
            StreamEvent::Error { message } => {
                if !args.json {
                    eprintln!("skillpod: {}", message);
                }
                code = 1;
            }
            _ => {}
        }
    }
    Ok(code)
}
