use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// skillpod - run skill commands in per-skill container environments
#[derive(Parser, Debug)]
#[command(name = "skillpod")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Commands,
}

/// Overrides for values otherwise read from `SKILLPOD_*` variables.
#[derive(Args, Debug, Default, Clone)]
pub struct GlobalArgs {
    /// Workspace directory; scopes environment names (default: current directory)
    #[arg(long, global = true, value_name = "DIR")]
    pub workspace: Option<PathBuf>,

    /// Container CLI binary (docker, podman, ...)
    #[arg(long, global = true, value_name = "BIN")]
    pub runtime: Option<String>,

    /// Runtime image reference (default: built-in image)
    #[arg(long, global = true)]
    pub image: Option<String>,

    /// Use one shared environment name instead of one per skill
    #[arg(long, global = true, value_name = "NAME")]
    pub container_name: Option<String>,

    /// Host path mounted at the same path inside environments
    #[arg(long, global = true, value_name = "PATH")]
    pub mount_path: Option<PathBuf>,

    /// Skip background image resolution at startup
    #[arg(long, global = true)]
    pub no_prewarm: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a shell command in a skill's environment
    Exec {
        #[arg(value_name = "SKILL")]
        skill: String,

        /// Command line, run with /bin/sh -c
        #[arg(value_name = "COMMAND")]
        command: String,

        /// Execution timeout in milliseconds (default: SKILLPOD_TIMEOUT_MS or 30000)
        #[arg(long)]
        timeout_ms: Option<u64>,

        /// Working directory inside the environment (default: /workspace)
        #[arg(long, value_name = "DIR")]
        cwd: Option<String>,

        /// Print output as it arrives
        #[arg(long)]
        stream: bool,

        /// Print the result (or events) as JSON
        #[arg(long)]
        json: bool,

        /// Stop and remove the environment afterwards
        #[arg(long)]
        cleanup: bool,
    },

    /// Print a file from a skill's environment
    Read {
        #[arg(value_name = "SKILL")]
        skill: String,

        /// Path, relative to the working directory
        #[arg(value_name = "PATH")]
        path: String,
    },

    /// Write a file in a skill's environment
    Write {
        #[arg(value_name = "SKILL")]
        skill: String,

        #[arg(value_name = "PATH")]
        path: String,

        /// File content. Use "-" to read from stdin
        #[arg(value_name = "CONTENT")]
        content: String,
    },

    /// Stop a skill's environment
    Stop {
        #[arg(value_name = "SKILL")]
        skill: String,
    },

    /// Stop and remove a skill's environment
    Rm {
        #[arg(value_name = "SKILL")]
        skill: String,
    },

    /// Show recent output of a skill's environment
    Logs {
        #[arg(value_name = "SKILL")]
        skill: String,

        /// Number of lines from the end
        #[arg(long, default_value = "100")]
        tail: usize,
    },

    /// Show one environment, or every environment of this workspace
    Status {
        #[arg(value_name = "SKILL")]
        skill: Option<String>,
    },

    /// Make the runtime image available (present → pull → build)
    Prewarm,

    /// List skills (directories containing SKILL.md) under the skills directory
    Skills {
        /// Skills directory (default: SKILLPOD_SKILLS_DIR or ./skills)
        #[arg(long, value_name = "DIR")]
        dir: Option<PathBuf>,
    },

    /// Serve JSON-RPC requests over stdio
    Serve {
        /// Read requests from stdin, write responses to stdout
        #[arg(long)]
        stdio: bool,

        /// Leave environments running on exit
        #[arg(long)]
        keep: bool,
    },
}
