/// Thin wrapper around external desktop utilities (scrot, xdotool, xclip).
use std::process::Stdio;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::errors::BridgeError;

pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Why a tool run did not succeed. Callers map this onto their own error kind.
#[derive(Debug, Clone)]
pub struct ToolFailure {
    pub program: String,
    pub detail: String,
}

impl std::fmt::Display for ToolFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} failed: {}", self.program, self.detail)
    }
}

/// Runs `program` to completion and captures its output.
/// A non-zero exit is a failure carrying the tool's stderr/stdout.
pub async fn run_tool(
    program: &str,
    args: &[&str],
    timeout: Duration,
) -> Result<ToolOutput, ToolFailure> {
    let fail = |detail: String| ToolFailure {
        program: program.to_string(),
        detail,
    };

    tracing::trace!(program, ?args, "running external tool");
    let output = match tokio::time::timeout(
        timeout,
        Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output(),
    )
    .await
    {
        Ok(Ok(output)) => output,
        Ok(Err(e)) => return Err(fail(format!("could not execute: {e}"))),
        Err(_) => return Err(fail(format!("timed out after {timeout:?}"))),
    };

    let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();

    if !output.status.success() {
        let diag = if stderr.is_empty() { &stdout } else { &stderr };
        return Err(fail(format!("{}, out: {diag}", output.status)));
    }
    Ok(ToolOutput { stdout, stderr })
}

/// Starts a tool that may keep running in the background to own a resource
/// (xclip holds the clipboard selection until someone else takes it).
///
/// Success means it exited 0, or is still alive after `grace`. It is never killed.
pub async fn run_holder(
    program: &str,
    args: &[&str],
    stdin: Option<&[u8]>,
    grace: Duration,
) -> Result<(), ToolFailure> {
    let fail = |detail: String| ToolFailure {
        program: program.to_string(),
        detail,
    };

    let mut child = Command::new(program)
        .args(args)
        .stdin(if stdin.is_some() { Stdio::piped() } else { Stdio::null() })
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|e| fail(format!("could not execute: {e}")))?;

    if let (Some(bytes), Some(mut pipe)) = (stdin, child.stdin.take()) {
        pipe.write_all(bytes)
            .await
            .map_err(|e| fail(format!("stdin write: {e}")))?;
        // Closing stdin lets the tool know the input is complete.
        drop(pipe);
    }

    match tokio::time::timeout(grace, child.wait()).await {
        Ok(Ok(status)) if status.success() => Ok(()),
        Ok(Ok(status)) => Err(fail(format!("{status}"))),
        Ok(Err(e)) => Err(fail(format!("wait: {e}"))),
        Err(_) => {
            tracing::debug!(program, "tool still running after grace period; treating as holder");
            Ok(())
        }
    }
}

impl From<ToolFailure> for BridgeError {
    fn from(f: ToolFailure) -> Self {
        BridgeError::Input(f.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_program_is_a_failure() {
        let err = run_tool("gravity-bridge-no-such-tool", &[], DEFAULT_TOOL_TIMEOUT)
            .await
            .unwrap_err();
        assert_eq!(err.program, "gravity-bridge-no-such-tool");
        assert!(err.detail.contains("could not execute"));
    }

    #[tokio::test]
    async fn non_zero_exit_carries_diagnostic() {
        let err = run_tool("sh", &["-c", "echo scrot: cannot open display >&2; exit 3"], DEFAULT_TOOL_TIMEOUT)
            .await
            .unwrap_err();
        assert!(err.detail.contains("cannot open display"), "{}", err.detail);
    }

    #[tokio::test]
    async fn captures_stdout() {
        let out = run_tool("sh", &["-c", "printf '123\\n456'"], DEFAULT_TOOL_TIMEOUT)
            .await
            .unwrap();
        assert_eq!(out.stdout, "123\n456");
    }

    #[tokio::test]
    async fn holder_that_keeps_running_is_success() {
        run_holder("sh", &["-c", "cat >/dev/null; sleep 2"], Some(&b"payload"[..]), Duration::from_millis(100))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn holder_that_fails_fast_is_failure() {
        let err = run_holder("sh", &["-c", "exit 1"], None, Duration::from_secs(2))
            .await
            .unwrap_err();
        assert_eq!(err.program, "sh");
    }
}
