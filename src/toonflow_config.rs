//! Project configuration read from `.toonflow/toonflow.toml`.
//!
//! Layered as file → environment → CLI. Every section is optional.
//!
//! # Configuration File Format
//!
//! ```toml
//! [pipeline]
//! auto_next = true
//! regeneration_delay_ms = 500
//!
//! [cache]
//! restore_window_secs = 3600
//! similarity_threshold = 0.5
//! key_prefix = "toonflow"
//!
//! [generator]
//! command = "toonflow-gen"
//! args = ["--model", "fast"]
//! timeout_secs = 300
//!
//! [logging]
//! level = "info"
//! json = false
//! ```
//!
//! Without a `[generator] command` the offline generator is used.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::cache::persistence::{DEFAULT_KEY_PREFIX, DEFAULT_RESTORE_WINDOW_SECS};
use crate::cache::similarity::DEFAULT_SIMILARITY_THRESHOLD;

pub const CONFIG_FILE: &str = "toonflow.toml";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSection {
    /// Start the next phase automatically after a successful one.
    #[serde(default = "default_auto_next")]
    pub auto_next: bool,
    /// Settle delay before a queued regeneration is dispatched.
    #[serde(default = "default_regeneration_delay_ms")]
    pub regeneration_delay_ms: u64,
}

fn default_auto_next() -> bool {
    true
}

fn default_regeneration_delay_ms() -> u64 {
    500
}

impl Default for PipelineSection {
    fn default() -> Self {
        Self {
            auto_next: default_auto_next(),
            regeneration_delay_ms: default_regeneration_delay_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheSection {
    #[serde(default = "default_restore_window_secs")]
    pub restore_window_secs: i64,
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f64,
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
}

fn default_restore_window_secs() -> i64 {
    DEFAULT_RESTORE_WINDOW_SECS
}

fn default_similarity_threshold() -> f64 {
    DEFAULT_SIMILARITY_THRESHOLD
}

fn default_key_prefix() -> String {
    DEFAULT_KEY_PREFIX.to_string()
}

impl Default for CacheSection {
    fn default() -> Self {
        Self {
            restore_window_secs: default_restore_window_secs(),
            similarity_threshold: default_similarity_threshold(),
            key_prefix: default_key_prefix(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratorSection {
    /// External generator command; `None` selects the offline generator.
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    300
}

impl Default for GeneratorSection {
    fn default() -> Self {
        Self {
            command: None,
            args: Vec::new(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSection {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

/// The complete toonflow.toml configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ToonflowToml {
    #[serde(default)]
    pub pipeline: PipelineSection,
    #[serde(default)]
    pub cache: CacheSection,
    #[serde(default)]
    pub generator: GeneratorSection,
    #[serde(default)]
    pub logging: LoggingSection,
}

impl ToonflowToml {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse toonflow.toml")
    }

    /// Load `.toonflow/toonflow.toml`, or defaults when it does not exist.
    pub fn load_or_default(toonflow_dir: &Path) -> Result<Self> {
        let config_path = toonflow_dir.join(CONFIG_FILE);
        if config_path.exists() {
            Self::load(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize toonflow.toml")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// Auto-advance setting; `TOONFLOW_AUTO_NEXT` overrides the file.
    pub fn auto_next(&self) -> bool {
        Self::auto_next_override().unwrap_or(self.pipeline.auto_next)
    }

    /// Value of `TOONFLOW_AUTO_NEXT`, when set to a recognised flag.
    pub fn auto_next_override() -> Option<bool> {
        std::env::var("TOONFLOW_AUTO_NEXT")
            .ok()
            .and_then(|value| parse_flag(&value))
    }

    /// Generator command; `TOONFLOW_GENERATOR_CMD` overrides the file.
    /// An empty value selects the offline generator.
    pub fn generator_command(&self) -> Option<String> {
        std::env::var("TOONFLOW_GENERATOR_CMD")
            .ok()
            .or_else(|| self.generator.command.clone())
            .filter(|cmd| !cmd.trim().is_empty())
    }

    /// Validate the configuration and return any warnings.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if !(0.0..=1.0).contains(&self.cache.similarity_threshold) {
            warnings.push(format!(
                "Invalid similarity_threshold {}: must be between 0.0 and 1.0",
                self.cache.similarity_threshold
            ));
        }
        if self.cache.restore_window_secs <= 0 {
            warnings.push(format!(
                "Invalid restore_window_secs {}: must be positive",
                self.cache.restore_window_secs
            ));
        }
        if self.cache.key_prefix.is_empty() || self.cache.key_prefix.contains(':') {
            warnings.push(format!(
                "Invalid key_prefix '{}': must be non-empty and contain no ':'",
                self.cache.key_prefix
            ));
        }
        if self.generator.timeout_secs == 0 {
            warnings.push("generator timeout_secs must be at least 1".to_string());
        }
        if let Some(ref cmd) = self.generator.command {
            if cmd.trim().is_empty() {
                warnings.push(
                    "generator command is empty; remove it to use the offline generator".to_string(),
                );
            }
        }
        if tracing_subscriber::EnvFilter::try_new(&self.logging.level).is_err() {
            warnings.push(format!("Invalid logging level '{}'", self.logging.level));
        }

        warnings
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "on" | "yes" => Some(true),
        "0" | "false" | "off" | "no" => Some(false),
        _ => None,
    }
}
