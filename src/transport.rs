//! Implicit-message transport: the fallback entry point used when the
//! direct generator is unavailable.
//!
//! A command is a single line `"<COMMAND> <json>"`; the collaborator on the
//! other side routes on the leading command word.

use async_trait::async_trait;
use serde_json::{Value, json};
use std::fmt;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::errors::GenerateError;
use crate::generate::{GenerationMode, GenerationRequest};
use crate::phase::Phase;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImplicitCommand {
    Confirmation,
    GenerateStoryboard,
    Regeneration,
}

impl ImplicitCommand {
    pub const ALL: [ImplicitCommand; 3] = [
        ImplicitCommand::Confirmation,
        ImplicitCommand::GenerateStoryboard,
        ImplicitCommand::Regeneration,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ImplicitCommand::Confirmation => "CONFIRMATION",
            ImplicitCommand::GenerateStoryboard => "GENERATE_STORYBOARD",
            ImplicitCommand::Regeneration => "REGENERATION",
        }
    }

    /// Command that carries `request` over the implicit channel.
    pub fn for_request(request: &GenerationRequest) -> Self {
        match (request.mode, request.phase) {
            (GenerationMode::Regeneration, _) => ImplicitCommand::Regeneration,
            (GenerationMode::Confirmation, Phase::StoryBoard) => {
                ImplicitCommand::GenerateStoryboard
            }
            (GenerationMode::Confirmation, _) => ImplicitCommand::Confirmation,
        }
    }
}

impl fmt::Display for ImplicitCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payload sent for `request`: its inputs plus the phase name.
pub fn payload_for(request: &GenerationRequest) -> Value {
    let mut payload = request.inputs.to_value();
    if let Value::Object(map) = &mut payload {
        map.insert("phase".to_string(), json!(request.phase.name()));
        if let Some(index) = request.only_index {
            map.insert("only_index".to_string(), json!(index));
        }
    }
    payload
}

pub fn encode(command: ImplicitCommand, payload: &Value) -> String {
    format!("{} {}", command.as_str(), payload)
}

pub fn decode(line: &str) -> Result<(ImplicitCommand, Value), GenerateError> {
    let line = line.trim();
    let (word, rest) = line.split_once(' ').unwrap_or((line, ""));
    let command = ImplicitCommand::ALL
        .into_iter()
        .find(|c| c.as_str() == word)
        .ok_or_else(|| GenerateError::Protocol(format!("unknown implicit command '{}'", word)))?;
    let payload = if rest.trim().is_empty() {
        Value::Null
    } else {
        serde_json::from_str(rest)
            .map_err(|e| GenerateError::Protocol(format!("bad {} payload: {}", command, e)))?
    };
    Ok((command, payload))
}

/// Sends implicit command messages into the conversation channel.
#[async_trait]
pub trait ImplicitSender: Send + Sync {
    async fn send_implicit(
        &self,
        command: ImplicitCommand,
        payload: &Value,
    ) -> Result<(), GenerateError>;
}

/// Appends implicit commands, one per line, to an outbox file that an
/// external collaborator tails.
#[derive(Debug, Clone)]
pub struct FileOutbox {
    path: PathBuf,
}

impl FileOutbox {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl ImplicitSender for FileOutbox {
    async fn send_implicit(
        &self,
        command: ImplicitCommand,
        payload: &Value,
    ) -> Result<(), GenerateError> {
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        let line = encode(command, payload);
        file.write_all(line.as_bytes()).await?;
        file.write_all(b"\n").await?;
        file.flush().await?;
        debug!(%command, path = %self.path.display(), "Queued implicit message");
        Ok(())
    }
}
