//! Read file tool: size-capped file reads.

use async_trait::async_trait;
use tokio::io::AsyncReadExt;
use vigil_core::context::ExecutionContext;
use vigil_core::error::ToolError;
use vigil_core::tool::Tool;

const DEFAULT_MAX_BYTES: u64 = 256 * 1024;

pub struct ReadFileTool {
    max_bytes: u64,
}

impl ReadFileTool {
    pub fn new() -> Self {
        Self {
            max_bytes: DEFAULT_MAX_BYTES,
        }
    }

    pub fn with_max_bytes(max_bytes: u64) -> Self {
        Self { max_bytes }
    }
}

impl Default for ReadFileTool {
    fn default() -> Self {
        Self::new()
    }
}

fn failed(reason: impl ToString) -> ToolError {
    ToolError::ExecutionFailed {
        tool_name: "read_file".into(),
        reason: reason.to_string(),
    }
}

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read a text file (logs, configs, manifests). Large files are truncated."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "The file path to read"
                }
            },
            "required": ["path"]
        })
    }

    async fn execute(
        &self,
        _ctx: &ExecutionContext,
        arguments: &serde_json::Value,
    ) -> Result<String, ToolError> {
        let path = arguments["path"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'path' argument".into()))?;

        let file = tokio::fs::File::open(path).await.map_err(failed)?;
        let size = file.metadata().await.map_err(failed)?.len();

        let mut buf = Vec::new();
        file.take(self.max_bytes)
            .read_to_end(&mut buf)
            .await
            .map_err(failed)?;

        let mut content = String::from_utf8_lossy(&buf).into_owned();
        if size > self.max_bytes {
            content.push_str(&format!(
                "\n[truncated: showing {} of {size} bytes]",
                self.max_bytes
            ));
        }
        Ok(content)
    }
}
