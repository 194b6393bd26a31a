//! Narrow subprocess runner
//!
//! Media probing and mixing shell out to ffprobe/ffmpeg. The runner
//! interface is argv-in, output-out with an enforced wall-clock timeout, so
//! mixing logic is testable against a fake runner and no shell ever
//! interpolates user data.

use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;

/// Subprocess invocation errors
#[derive(Debug, Error)]
pub enum SubprocessError {
    #[error("program not found: {0}")]
    NotFound(String),

    #[error("subprocess timed out after {0:?}")]
    TimedOut(Duration),

    #[error("subprocess I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Captured subprocess result
#[derive(Debug, Clone)]
pub struct SubprocessOutput {
    pub exit_code: Option<i32>,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl SubprocessOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    pub fn stderr_text(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }
}

/// Seam for test doubles
#[async_trait]
pub trait SubprocessRunner: Send + Sync {
    async fn run(
        &self,
        program: &str,
        args: &[String],
        timeout: Duration,
    ) -> Result<SubprocessOutput, SubprocessError>;
}

/// Real runner on tokio::process, killed on timeout expiry
#[derive(Debug, Clone, Default)]
pub struct TokioRunner;

#[async_trait]
impl SubprocessRunner for TokioRunner {
    async fn run(
        &self,
        program: &str,
        args: &[String],
        timeout: Duration,
    ) -> Result<SubprocessOutput, SubprocessError> {
        let child = tokio::process::Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    SubprocessError::NotFound(program.to_string())
                } else {
                    SubprocessError::Io(e)
                }
            })?;

        let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(result) => result?,
            Err(_) => {
                // kill_on_drop reaps the child when the future is dropped
                tracing::warn!(program, timeout_secs = timeout.as_secs(), "Subprocess timed out, killed");
                return Err(SubprocessError::TimedOut(timeout));
            }
        };

        Ok(SubprocessOutput {
            exit_code: output.status.code(),
            stdout: output.stdout,
            stderr: output.stderr,
        })
    }
}
