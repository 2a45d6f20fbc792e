//! A [`Provider`] that replays assistant turns from a JSON transcript.
//!
//! The transcript is either a bare array of turns or an object with a
//! `turns` array:
//!
//! ```json
//! { "turns": [
//!     { "content": "Checking disk usage",
//!       "tool_calls": [ { "name": "bash", "arguments": { "command": "df -h" } } ] },
//!     { "content": "The log volume is full. confidence: 0.8" }
//! ] }
//! ```
//!
//! Once the transcript is spent every request gets an empty final answer.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use anyhow::Context;
use async_trait::async_trait;
use serde::Deserialize;
use vigil_core::error::ProviderError;
use vigil_core::message::{Message, MessageToolCall};
use vigil_core::provider::{Provider, ProviderRequest, ProviderResponse};

#[derive(Debug, Clone, Deserialize)]
pub struct ScriptedTurn {
    #[serde(default)]
    pub content: String,

    #[serde(default)]
    pub tool_calls: Vec<ScriptedCall>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScriptedCall {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub arguments: serde_json::Value,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Transcript {
    Wrapped { turns: Vec<ScriptedTurn> },
    Bare(Vec<ScriptedTurn>),
}

pub struct ReplayProvider {
    turns: Mutex<VecDeque<ScriptedTurn>>,
    model: Mutex<String>,
    served: Mutex<usize>,
}

impl ReplayProvider {
    pub fn new(turns: Vec<ScriptedTurn>, model: impl Into<String>) -> Self {
        Self {
            turns: Mutex::new(turns.into()),
            model: Mutex::new(model.into()),
            served: Mutex::new(0),
        }
    }

    pub fn parse(json: &str, model: impl Into<String>) -> anyhow::Result<Self> {
        let transcript =
            serde_json::from_str::<Transcript>(json).context("Invalid transcript JSON")?;
        let turns = match transcript {
            Transcript::Wrapped { turns } | Transcript::Bare(turns) => turns,
        };
        Ok(Self::new(turns, model))
    }

    pub fn from_file(path: &Path, model: impl Into<String>) -> anyhow::Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read transcript {}", path.display()))?;
        Self::parse(&json, model)
    }

    pub fn remaining(&self) -> usize {
        lock(&self.turns).len()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[async_trait]
impl Provider for ReplayProvider {
    fn name(&self) -> &str {
        "replay"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let turn = lock(&self.turns).pop_front().unwrap_or(ScriptedTurn {
            content: String::new(),
            tool_calls: Vec::new(),
        });
        let index = {
            let mut served = lock(&self.served);
            *served += 1;
            *served
        };

        let mut message = Message::assistant(turn.content);
        message.tool_calls = turn
            .tool_calls
            .into_iter()
            .enumerate()
            .map(|(i, call)| MessageToolCall {
                id: call.id.unwrap_or_else(|| format!("replay-{index}-{i}")),
                name: call.name,
                arguments: call.arguments.to_string(),
            })
            .collect();

        Ok(ProviderResponse {
            message,
            model: request.model,
        })
    }

    fn active_model(&self) -> String {
        lock(&self.model).clone()
    }

    fn set_active_model(&self, model: &str) -> Result<(), ProviderError> {
        *lock(&self.model) = model.to_string();
        Ok(())
    }
}
