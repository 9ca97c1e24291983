//! Bounded command execution on the host and inside node containers

use crate::error::{TwinError, TwinResult};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

/// Captured result of a finished command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == 0
    }

    /// Turn a non-zero exit into a process error naming `what`
    pub fn check(self, what: &str) -> TwinResult<Self> {
        if self.success() {
            Ok(self)
        } else {
            Err(TwinError::Process(format!(
                "{} failed (exit {}): {}",
                what,
                self.code,
                self.stderr.trim()
            )))
        }
    }
}

/// Run `program` with `args`, feeding `stdin` if given, and wait at most
/// `timeout` for it to finish. The child is killed on timeout.
pub async fn run_command(
    program: &str,
    args: &[&str],
    stdin: Option<&[u8]>,
    timeout: Duration,
) -> TwinResult<CommandOutput> {
    let mut cmd = Command::new(program);
    cmd.args(args)
        .stdin(if stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = cmd
        .spawn()
        .map_err(|e| TwinError::Process(format!("failed to spawn {}: {}", program, e)))?;

    if let (Some(input), Some(mut pipe)) = (stdin, child.stdin.take()) {
        pipe.write_all(input)
            .await
            .map_err(|e| TwinError::Process(format!("failed to write stdin of {}: {}", program, e)))?;
        // Close stdin so the child sees EOF
        drop(pipe);
    }

    let output = tokio::time::timeout(timeout, child.wait_with_output())
        .await
        .map_err(|_| {
            TwinError::Process(format!(
                "{} did not finish within {}s",
                program,
                timeout.as_secs()
            ))
        })?
        .map_err(|e| TwinError::Process(format!("failed to wait for {}: {}", program, e)))?;

    let result = CommandOutput {
        code: output.status.code().unwrap_or(-1),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    };
    debug!(program = %program, code = result.code, "Command finished");
    Ok(result)
}

/// Executes commands inside the container of an emulated node
#[derive(Debug, Clone)]
pub struct DockerExec {
    container_prefix: String,
    timeout: Duration,
}

impl DockerExec {
    pub fn new(container_prefix: impl Into<String>, timeout: Duration) -> Self {
        Self {
            container_prefix: container_prefix.into(),
            timeout,
        }
    }

    /// Container name backing `node`
    pub fn container(&self, node: &str) -> String {
        format!("{}-{}", self.container_prefix, node)
    }

    pub async fn exec(
        &self,
        node: &str,
        args: &[&str],
        stdin: Option<&[u8]>,
    ) -> TwinResult<CommandOutput> {
        let container = self.container(node);
        let mut full = Vec::with_capacity(args.len() + 3);
        full.push("exec");
        if stdin.is_some() {
            full.push("-i");
        }
        full.push(container.as_str());
        full.extend_from_slice(args);

        run_command("docker", &full, stdin, self.timeout).await
    }

    /// Run `kubectl` through the node's embedded k3s
    pub async fn kubectl(
        &self,
        node: &str,
        args: &[&str],
        stdin: Option<&[u8]>,
    ) -> TwinResult<CommandOutput> {
        let mut full = vec!["k3s", "kubectl"];
        full.extend_from_slice(args);
        self.exec(node, &full, stdin).await
    }

    /// Run a shell snippet inside the node's container
    pub async fn shell(&self, node: &str, script: &str) -> TwinResult<CommandOutput> {
        self.exec(node, &["bash", "-c", script], None).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_run_command_captures_output() {
        let out = run_command("sh", &["-c", "echo hello; echo oops >&2"], None, Duration::from_secs(5))
            .await
            .unwrap();
        assert!(out.success());
        assert_eq!(out.stdout.trim(), "hello");
        assert_eq!(out.stderr.trim(), "oops");
    }

    #[tokio::test]
    async fn test_run_command_feeds_stdin() {
        let out = run_command("cat", &[], Some(b"apiVersion: v1"), Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(out.stdout, "apiVersion: v1");
    }

    #[tokio::test]
    async fn test_non_zero_exit_checked() {
        let out = run_command("sh", &["-c", "echo bad >&2; exit 3"], None, Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(out.code, 3);
        let err = out.check("apply pod").unwrap_err();
        assert!(matches!(err, TwinError::Process(ref m) if m.contains("exit 3") && m.contains("bad")));
    }

    #[tokio::test]
    async fn test_timeout_is_process_error() {
        let err = run_command("sleep", &["5"], None, Duration::from_millis(100))
            .await
            .unwrap_err();
        assert!(matches!(err, TwinError::Process(ref m) if m.contains("did not finish")));
    }

    #[test]
    fn test_container_name() {
        let exec = DockerExec::new("clab-emulation", Duration::from_secs(30));
        assert_eq!(exec.container("serf1"), "clab-emulation-serf1");
    }
}
