//! Subprocess execution seam

use crate::error::Result;
use async_trait::async_trait;
use std::process::Stdio;
use tokio::process::Command;

/// Captured result of one subprocess invocation
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CommandOutput {
    /// Whether the process exited with status zero
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    /// Successful exit with the given stdout
    pub fn ok<S: Into<String>>(stdout: S) -> Self {
        Self {
            success: true,
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// Failed exit with the given stderr
    pub fn failed<S: Into<String>>(stderr: S) -> Self {
        Self {
            success: false,
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }
}

/// Runs external programs on behalf of the gateway
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run `program` with `args` to completion, capturing output
    async fn execute(&self, program: &str, args: &[String]) -> Result<CommandOutput>;
}

/// Runner backed by real processes
#[derive(Debug, Clone, Default)]
pub struct SystemRunner;

#[async_trait]
impl CommandRunner for SystemRunner {
    async fn execute(&self, program: &str, args: &[String]) -> Result<CommandOutput> {
        let output = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await?;

        Ok(CommandOutput {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_system_runner_captures_streams() {
        let runner = SystemRunner;
        let out = runner
            .execute("sh", &["-c".to_string(), "printf 'id=1'; printf oops >&2; exit 3".to_string()])
            .await
            .unwrap();
        assert!(!out.success);
        assert_eq!(out.stdout, "id=1");
        assert_eq!(out.stderr, "oops");
    }

    #[tokio::test]
    async fn test_system_runner_missing_program() {
        let err = SystemRunner
            .execute("definitely-not-a-real-binary-4711", &[])
            .await
            .unwrap_err();
        assert!(matches!(err, crate::error::BridgeError::Io(ref e) if e.kind() == std::io::ErrorKind::NotFound));
    }
}
