//! Bash tool: execute a shell command on the investigated host.
//!
//! Commands run under `sh -c` with a timeout, and are killed if the run's
//! context is cancelled first.

use async_trait::async_trait;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};
use vigil_core::context::ExecutionContext;
use vigil_core::error::ToolError;
use vigil_core::tool::{SHELL_TOOL, Tool};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);
const DEFAULT_MAX_OUTPUT: usize = 64 * 1024;

pub struct BashTool {
    timeout: Duration,
    max_output_bytes: usize,
}

impl BashTool {
    pub fn new() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            max_output_bytes: DEFAULT_MAX_OUTPUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_output(mut self, bytes: usize) -> Self {
        self.max_output_bytes = bytes;
        self
    }
}

impl Default for BashTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for BashTool {
    fn name(&self) -> &str {
        SHELL_TOOL
    }

    fn description(&self) -> &str {
        "Run a shell command and return its stdout/stderr. Use read-only diagnostics \
         (ps, df, journalctl, kubectl get, curl -I) to gather evidence."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "The shell command to execute"
                }
            },
            "required": ["command"]
        })
    }

    async fn execute(
        &self,
        ctx: &ExecutionContext,
        arguments: &serde_json::Value,
    ) -> Result<String, ToolError> {
        let command = arguments["command"]
            .as_str()
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'command' argument".into()))?;

        debug!(command = %command, "Executing shell command");

        let child = Command::new("sh")
            .args(["-c", command])
            .kill_on_drop(true)
            .output();

        let output = tokio::select! {
            result = tokio::time::timeout(self.timeout, child) => match result {
                Ok(output) => output.map_err(|e| ToolError::ExecutionFailed {
                    tool_name: SHELL_TOOL.into(),
                    reason: e.to_string(),
                })?,
                Err(_) => {
                    warn!(command = %command, "Command timed out");
                    return Err(ToolError::Timeout {
                        tool_name: SHELL_TOOL.into(),
                        timeout_secs: self.timeout.as_secs(),
                    });
                }
            },
            _ = ctx.done() => {
                return Err(ToolError::ExecutionFailed {
                    tool_name: SHELL_TOOL.into(),
                    reason: "cancelled".into(),
                });
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);

        let text = if output.status.success() {
            if stderr.is_empty() {
                stdout.into_owned()
            } else {
                format!("{stdout}\n[stderr]: {stderr}")
            }
        } else {
            let code = output.status.code().unwrap_or(-1);
            warn!(command = %command, exit_code = code, "Command failed");
            format!("[exit code: {code}]\n{stdout}\n{stderr}")
        };

        Ok(truncate(text.trim(), self.max_output_bytes))
    }
}

fn truncate(text: &str, max: usize) -> String {
    if text.len() <= max {
        return text.to_string();
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}\n[output truncated at {max} bytes]", &text[..end])
}
