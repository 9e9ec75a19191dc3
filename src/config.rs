use anyhow::{Context, Result};
use chrono::TimeDelta;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::toonflow_config::ToonflowToml;

/// Runtime configuration for Toonflow.
///
/// Bridges `toonflow.toml`, the environment and CLI flags, and owns every
/// path under `.toonflow/`.
#[derive(Debug, Clone)]
pub struct Config {
    pub project_dir: PathBuf,
    pub toonflow_dir: PathBuf,
    pub session_file: PathBuf,
    pub state_file: PathBuf,
    pub cache_file: PathBuf,
    pub audit_dir: PathBuf,
    pub log_dir: PathBuf,
    pub outbox_file: PathBuf,
    pub verbose: bool,
    pub toml: ToonflowToml,
}

impl Config {
    pub fn new(project_dir: &Path, verbose: bool) -> Result<Self> {
        let project_dir = project_dir
            .canonicalize()
            .context("Failed to resolve project directory")?;
        let toonflow_dir = project_dir.join(".toonflow");
        let toml = ToonflowToml::load_or_default(&toonflow_dir)?;

        Ok(Self {
            session_file: toonflow_dir.join("session.json"),
            state_file: toonflow_dir.join("state"),
            cache_file: toonflow_dir.join("cache.json"),
            audit_dir: toonflow_dir.join("audit"),
            log_dir: toonflow_dir.join("logs"),
            outbox_file: toonflow_dir.join("outbox"),
            project_dir,
            toonflow_dir,
            verbose,
            toml,
        })
    }

    pub fn is_initialized(&self) -> bool {
        self.toonflow_dir.is_dir()
    }

    pub fn ensure_directories(&self) -> Result<()> {
        std::fs::create_dir_all(&self.audit_dir).context("Failed to create audit directory")?;
        std::fs::create_dir_all(&self.log_dir).context("Failed to create log directory")?;
        std::fs::create_dir_all(self.audit_dir.join("sessions"))
            .context("Failed to create sessions directory")?;
        Ok(())
    }

    pub fn auto_next(&self) -> bool {
        self.toml.auto_next()
    }

    pub fn settle_delay(&self) -> TimeDelta {
        TimeDelta::milliseconds(self.toml.pipeline.regeneration_delay_ms as i64)
    }

    pub fn restore_window(&self) -> TimeDelta {
        TimeDelta::seconds(self.toml.cache.restore_window_secs)
    }

    pub fn generator_timeout(&self) -> Duration {
        Duration::from_secs(self.toml.generator.timeout_secs)
    }

    /// Session id forced through `TOONFLOW_SESSION`, if any.
    pub fn session_override(&self) -> Option<String> {
        std::env::var("TOONFLOW_SESSION")
            .ok()
            .filter(|s| !s.trim().is_empty())
    }
}
