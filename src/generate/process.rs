//! Generator backed by an external command.
//!
//! The request is written to the child's stdin as JSON; the child prints a
//! `GenerationResult` JSON object on stdout. Anything printed around the
//! object (progress lines, logs) is ignored.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, instrument, warn};

use super::{GenerationRequest, GenerationResult, Generator};
use crate::errors::GenerateError;
use crate::util::extract_json_object;

#[derive(Debug, Clone)]
pub struct ProcessGenerator {
    command: String,
    args: Vec<String>,
    working_dir: PathBuf,
    timeout: Duration,
}

impl ProcessGenerator {
    pub fn new(
        command: &str,
        args: Vec<String>,
        working_dir: impl AsRef<Path>,
        timeout: Duration,
    ) -> Self {
        Self {
            command: command.to_string(),
            args,
            working_dir: working_dir.as_ref().to_path_buf(),
            timeout,
        }
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    fn parse_output(
        &self,
        output: &std::process::Output,
    ) -> Result<GenerationResult, GenerateError> {
        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.trim().is_empty() {
            debug!(stderr = %stderr.trim(), "Generator stderr");
        }

        if let Some(json) = extract_json_object(&stdout) {
            if let Ok(result) = serde_json::from_str::<GenerationResult>(&json) {
                return Ok(result);
            }
        }

        if output.status.success() {
            Err(GenerateError::Protocol(format!(
                "`{}` printed no generation result",
                self.command
            )))
        } else {
            let reason = if stderr.trim().is_empty() {
                format!("exit code {}", output.status.code().unwrap_or(-1))
            } else {
                stderr.trim().to_string()
            };
            Ok(GenerationResult::failure(reason))
        }
    }
}

#[async_trait]
impl Generator for ProcessGenerator {
    fn name(&self) -> &str {
        &self.command
    }

    #[instrument(skip(self, request), fields(phase = %request.phase, command = %self.command))]
    async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<GenerationResult, GenerateError> {
        let input = serde_json::to_string(request)
            .map_err(|e| GenerateError::Protocol(format!("failed to encode request: {}", e)))?;

        let mut child = Command::new(&self.command)
            .args(&self.args)
            .current_dir(&self.working_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .env("TOONFLOW_PHASE", request.phase.name())
            .env(
                "TOONFLOW_MODE",
                serde_json::to_value(request.mode)
                    .ok()
                    .and_then(|v| v.as_str().map(str::to_string))
                    .unwrap_or_default(),
            )
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| match source.kind() {
                std::io::ErrorKind::NotFound => {
                    GenerateError::Unavailable(format!(
                        "generator command `{}` not found",
                        self.command
                    ))
                }
                _ => GenerateError::Spawn {
                    command: self.command.clone(),
                    source,
                },
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(input.as_bytes()).await?;
        }

        let output = match timeout(self.timeout, child.wait_with_output()).await {
            Ok(result) => result?,
            Err(_) => {
                warn!(secs = self.timeout.as_secs(), "Generator timed out");
                return Err(GenerateError::Timeout {
                    secs: self.timeout.as_secs(),
                });
            }
        };
        self.parse_output(&output)
    }
}
