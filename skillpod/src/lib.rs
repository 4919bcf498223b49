//! skillpod CLI library: argument parsing and command dispatch.

mod cli;
mod commands;
mod context;
mod stdio_rpc;

use anyhow::{Context, Result};
use clap::Parser;
use std::process::ExitCode;
use std::sync::Arc;

use cli::{Cli, Commands};
use commands::exec::ExecArgs;
use context::{load_config, AppContext};
use skillpod_core::config::SandboxConfig;

/// Parse args, set up logging and a tokio runtime, and run the command.
pub fn run_cli() -> Result<ExitCode> {
    let cli = Cli::parse();
    skillpod_core::observability::init_tracing();
    // Reads `.env`; must happen before worker threads exist.
    let config = load_config(&cli.global);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start tokio runtime")?;
    runtime.block_on(dispatch(cli, config))
}

async fn dispatch(cli: Cli, config: SandboxConfig) -> Result<ExitCode> {
    if let Commands::Skills { dir } = &cli.command {
        let root = match dir {
            Some(dir) => dir.clone(),
            None => config.skills_root(),
        };
        commands::skills::run_skills(&root);
        return Ok(ExitCode::SUCCESS);
    }

    let ctx = Arc::new(AppContext::new(config));
    match cli.command {
        Commands::Exec {
            skill,
            command,
            timeout_ms,
            cwd,
            stream,
            json,
            cleanup,
        } => {
            ctx.start_prewarm();
            let args = ExecArgs {
                skill,
                command,
                timeout_ms,
                cwd,
                stream,
                json,
                cleanup,
            };
            commands::exec::run_exec(&ctx, args).await
        }
        Commands::Read { skill, path } => {
            ctx.start_prewarm();
            commands::files::run_read(&ctx, &skill, &path).await
        }
        Commands::Write {
            skill,
            path,
            content,
        } => {
            ctx.start_prewarm();
            commands::files::run_write(&ctx, &skill, &path, content).await
        }
        Commands::Stop { skill } => commands::environment::run_stop(&ctx, &skill).await,
        Commands::Rm { skill } => commands::environment::run_remove(&ctx, &skill).await,
        Commands::Logs { skill, tail } => commands::environment::run_logs(&ctx, &skill, tail).await,
        Commands::Status { skill } => {
            commands::environment::run_status(&ctx, skill.as_deref()).await
        }
        Commands::Prewarm => commands::environment::run_prewarm(&ctx).await,
        Commands::Serve { stdio, keep } => {
            if stdio {
                stdio_rpc::serve_stdio(ctx, keep).await?;
                Ok(ExitCode::SUCCESS)
            } else {
                anyhow::bail!("Only `serve --stdio` is supported")
            }
        }
        Commands::Skills { .. } => Ok(ExitCode::SUCCESS),
    }
}
