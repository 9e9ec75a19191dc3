//! Generation collaborator boundary.
//!
//! The engine never produces content itself. It hands a `GenerationRequest`
//! (phase, mode, upstream inputs) to a `Generator` and applies the returned
//! `GenerationResult` if its version fence still holds.
//!
//! Implementations:
//! - `ProcessGenerator`: spawns an external command, JSON over stdin/stdout
//! - `OfflineGenerator`: deterministic placeholder content for dry runs and tests

mod offline;
mod process;

pub use offline::OfflineGenerator;
pub use process::ProcessGenerator;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::bundle::ConfirmationBundle;
use crate::errors::GenerateError;
use crate::phase::Phase;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GenerationMode {
    /// First generation of a phase from confirmed upstream content.
    Confirmation,
    /// Re-generation of a phase whose inputs (or own assets) changed.
    Regeneration,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub phase: Phase,
    pub mode: GenerationMode,
    pub inputs: ConfirmationBundle,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub only_index: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenerationStatus {
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationResult {
    pub status: GenerationStatus,
    #[serde(default)]
    pub payload: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl GenerationResult {
    pub fn success(payload: impl Into<Value>) -> Self {
        Self {
            status: GenerationStatus::Success,
            payload: payload.into(),
            error: None,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            status: GenerationStatus::Error,
            payload: Value::Null,
            error: Some(message.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == GenerationStatus::Success
    }
}

/// Produces phase content from confirmed inputs.
#[async_trait]
pub trait Generator: Send + Sync {
    /// Short name for logs and status output.
    fn name(&self) -> &str;

    /// Generate content for `request.phase`.
    ///
    /// `Err(GenerateError::Unavailable)` means this entry point cannot take
    /// requests right now and the caller may fall back to another transport.
    async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<GenerationResult, GenerateError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_wire_format() {
        let mut inputs = ConfirmationBundle::new();
        inputs.set(crate::phase::DataKey::Script, json!("T"));
        let request = GenerationRequest {
            phase: Phase::StoryBoard,
            mode: GenerationMode::Confirmation,
            inputs,
            only_index: None,
            prompt: None,
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["phase"], json!("StoryBoard"));
        assert_eq!(value["mode"], json!("CONFIRMATION"));
        assert_eq!(value["inputs"]["script"], json!("T"));
        assert!(value.get("only_index").is_none());
    }

    #[test]
    fn test_result_parses_with_defaults() {
        let result: GenerationResult =
            serde_json::from_str(r#"{"status":"error","error":"quota"}"#).unwrap();
        assert!(!result.is_success());
        assert_eq!(result.payload, Value::Null);
        assert_eq!(result.error.as_deref(), Some("quota"));
    }
}
