//! Docker CLI backend for [`ContainerRuntime`].
//!
//! Shells out to a docker-compatible binary (`docker`, `podman`, ...) with
//! `tokio::process`. Stderr of failed invocations is classified into
//! [`RuntimeError`] variants so the lifecycle manager can react to daemon
//! outages and name conflicts.

use async_trait::async_trait;
use std::process::Stdio;
use tokio::process::Command;

use skillpod_core::config::SandboxConfig;

use crate::error::RuntimeError;
use crate::runtime::{
    BuildContext, ContainerRuntime, ContainerState, ContainerSummary, RunSpec, RuntimeResult,
};

/// Lines of build output kept in error messages.
const BUILD_ERROR_TAIL: usize = 20;

#[derive(Debug, Clone)]
pub struct DockerCli {
    binary: String,
}

impl DockerCli {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    pub fn from_config(config: &SandboxConfig) -> Self {
        Self::new(config.runtime.clone())
    }

    pub fn binary(&self) -> &str {
        &self.binary
    }

    fn ensure_installed(&self) -> RuntimeResult<()> {
        which::which(&self.binary)
            .map(|_| ())
            .map_err(|e| RuntimeError::Unavailable {
                binary: self.binary.clone(),
                reason: format!("not found on PATH ({})", e),
            })
    }

    /// Run one CLI invocation, returning stdout on success.
    async fn invoke(&self, operation: &str, args: &[String]) -> RuntimeResult<Invocation> {
        tracing::debug!(binary = %self.binary, operation, ?args, "runtime command");
        let output = Command::new(&self.binary)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    RuntimeError::Unavailable {
                        binary: self.binary.clone(),
                        reason: "binary not found".to_string(),
                    }
                } else {
                    RuntimeError::command_failed(operation, e.to_string())
                }
            })?;
        Ok(Invocation {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }

    async fn invoke_checked(&self, operation: &str, args: &[String]) -> RuntimeResult<String> {
        let out = self.invoke(operation, args).await?;
        if out.success {
            Ok(out.stdout)
        } else {
            Err(classify_failure(&self.binary, operation, &out.stderr))
        }
    }
}

struct Invocation {
    success: bool,
    stdout: String,
    stderr: String,
}

fn strings(args: &[&str]) -> Vec<String> {
    args.iter().map(|s| s.to_string()).collect()
}

#[async_trait]
impl ContainerRuntime for DockerCli {
    fn name(&self) -> &str {
        &self.binary
    }

    async fn version(&self) -> RuntimeResult<String> {
        self.ensure_installed()?;
        let out = self
            .invoke_checked(
                "version",
                &strings(&["version", "--format", "{{.Server.Version}}"]),
            )
            .await
            .map_err(|e| match e {
                // The client answers even when the daemon is down; any failure here
                // means the control plane is not usable.
                RuntimeError::CommandFailed { message, .. } => RuntimeError::Unavailable {
                    binary: self.binary.clone(),
                    reason: message,
                },
                other => other,
            })?;
        Ok(out.trim().to_string())
    }

    async fn image_exists(&self, image: &str) -> RuntimeResult<bool> {
        let out = self
            .invoke("image inspect", &strings(&["image", "inspect", image]))
            .await?;
        if out.success {
            return Ok(true);
        }
        match classify_failure(&self.binary, "image inspect", &out.stderr) {
            e @ RuntimeError::Unavailable { .. } => Err(e),
            _ => Ok(false),
        }
    }

    async fn pull_image(&self, image: &str) -> RuntimeResult<()> {
        self.invoke_checked("pull", &strings(&["pull", image]))
            .await
            .map(|_| ())
    }

    async fn build_image(&self, image: &str, context: &BuildContext) -> RuntimeResult<()> {
        let out = self.invoke("build", &build_args(image, context)).await?;
        if out.success {
            return Ok(());
        }
        let tail = tail_lines(&out.stderr, BUILD_ERROR_TAIL);
        Err(classify_failure(&self.binary, "build", &tail))
    }

    async fn list_containers(
        &self,
        name_filter: &str,
        all: bool,
    ) -> RuntimeResult<Vec<ContainerSummary>> {
        let mut args = strings(&["ps"]);
        if all {
            args.push("-a".to_string());
        }
        args.extend(strings(&[
            "--filter",
            &format!("name={}", name_filter),
            "--format",
            "{{.Names}}\t{{.State}}\t{{.Image}}",
        ]));
        let out = self.invoke_checked("ps", &args).await?;
        Ok(out.lines().filter_map(parse_ps_line).collect())
    }

    async fn run_container(&self, spec: &RunSpec) -> RuntimeResult<()> {
        self.invoke_checked("run", &run_args(spec)).await.map(|_| ())
    }

    async fn start_container(&self, name: &str) -> RuntimeResult<()> {
        self.invoke_checked("start", &strings(&["start", name]))
            .await
            .map(|_| ())
    }

    async fn stop_container(&self, name: &str) -> RuntimeResult<()> {
        self.invoke_checked("stop", &strings(&["stop", name]))
            .await
            .map(|_| ())
    }

    async fn remove_container(&self, name: &str) -> RuntimeResult<()> {
        self.invoke_checked("rm", &strings(&["rm", "-f", name]))
            .await
            .map(|_| ())
    }

    async fn host_port(&self, name: &str, container_port: u16) -> RuntimeResult<Option<u16>> {
        let port_spec = format!("{}/tcp", container_port);
        let out = self
            .invoke("port", &strings(&["port", name, &port_spec]))
            .await?;
        if out.success {
            return Ok(parse_port_output(&out.stdout));
        }
        if out.stderr.to_ascii_lowercase().contains("no public port") {
            return Ok(None);
        }
        Err(classify_failure(&self.binary, "port", &out.stderr))
    }

    async fn logs(&self, name: &str, tail: usize) -> RuntimeResult<String> {
        let tail = tail.to_string();
        let out = self
            .invoke("logs", &strings(&["logs", "--tail", &tail, name]))
            .await?;
        if !out.success {
            return Err(classify_failure(&self.binary, "logs", &out.stderr));
        }
        // Container stderr arrives on our stderr.
        let mut combined = out.stdout;
        combined.push_str(&out.stderr);
        Ok(combined)
    }
}

/// Arguments for `build` from a [`BuildContext`].
fn build_args(image: &str, context: &BuildContext) -> Vec<String> {
    let mut args = strings(&["build", "-t", image]);
    if let Some(file) = &context.dockerfile {
        args.push("-f".to_string());
        args.push(file.to_string_lossy().to_string());
    }
    args.push(context.dir.to_string_lossy().to_string());
    args
}

/// `-p` value publishing on `bind_host` only. IPv6 addresses are bracketed.
fn publish_arg(spec: &RunSpec) -> String {
    let host = match spec.bind_host.parse::<std::net::IpAddr>() {
        Ok(std::net::IpAddr::V6(addr)) => format!("[{}]", addr),
        _ => spec.bind_host.clone(),
    };
    format!("{}:{}:{}", host, spec.host_port, spec.container_port)
}

/// Arguments for `run -d` from a [`RunSpec`].
fn run_args(spec: &RunSpec) -> Vec<String> {
    let mut args = strings(&["run", "-d", "--name", &spec.name]);
    args.push("-p".to_string());
    args.push(publish_arg(spec));
    if let Some(mount) = &spec.mount {
        let path = mount.host_path.to_string_lossy();
        args.push("-v".to_string());
        args.push(format!("{}:{}", path, path));
    }
    for (key, value) in &spec.env {
        args.push("-e".to_string());
        args.push(format!("{}={}", key, value));
    }
    for (key, value) in &spec.labels {
        args.push("--label".to_string());
        args.push(format!("{}={}", key, value));
    }
    args.push(spec.image.clone());
    args
}

/// Parse one `{{.Names}}\t{{.State}}\t{{.Image}}` line.
fn parse_ps_line(line: &str) -> Option<ContainerSummary> {
    let mut parts = line.trim().split('\t');
    let name = parts.next()?.trim();
    if name.is_empty() {
        return None;
    }
    let state = parts.next().unwrap_or_default();
    let image = parts.next().unwrap_or_default();
    Some(ContainerSummary {
        name: name.to_string(),
        state: ContainerState::from_runtime(state),
        image: image.trim().to_string(),
    })
}

/// First port in `docker port` output (`0.0.0.0:3322` / `[::]:3322`).
fn parse_port_output(out: &str) -> Option<u16> {
    out.lines()
        .filter_map(|line| line.trim().rsplit(':').next())
        .find_map(|port| port.trim().parse::<u16>().ok())
}

fn classify_failure(binary: &str, operation: &str, stderr: &str) -> RuntimeError {
    let message = stderr.trim().to_string();
    let lower = message.to_ascii_lowercase();
    if lower.contains("cannot connect to")
        || lower.contains("is the docker daemon running")
        || lower.contains("error during connect")
    {
        return RuntimeError::Unavailable {
            binary: binary.to_string(),
            reason: message,
        };
    }
    if lower.contains("is already in use") || lower.contains("conflict") {
        let name = extract_quoted(&message).unwrap_or_default();
        return RuntimeError::NameConflict { name };
    }
    RuntimeError::command_failed(operation, message)
}

fn extract_quoted(message: &str) -> Option<String> {
    let start = message.find('"')? + 1;
    let end = message[start..].find('"')? + start;
    Some(message[start..end].trim_start_matches('/').to_string())
}

fn tail_lines(text: &str, n: usize) -> String {
    let lines: Vec<&str> = text.lines().collect();
    let start = lines.len().saturating_sub(n);
    lines[start..].join("\n")
}
