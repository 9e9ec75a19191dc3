//! Initialization module for toonflow projects.
//!
//! `toonflow init` creates the `.toonflow/` directory structure:
//!
//! ```text
//! .toonflow/
//! ├── toonflow.toml    # Project configuration (defaults written on init)
//! ├── session.json     # Current session snapshot (created by `start`)
//! ├── state            # Pipeline event journal
//! ├── cache.json       # Persistence cache of unsaved edits
//! ├── outbox           # Implicit commands for an external collaborator
//! ├── audit/           # Revision audit trail
//! │   └── sessions/
//! └── logs/            # Daily-rotated log files
//! ```

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::session::SessionSnapshot;
use crate::toonflow_config::{CONFIG_FILE, ToonflowToml};

/// The name of the toonflow configuration directory.
pub const TOONFLOW_DIR: &str = ".toonflow";

/// Result of initializing a toonflow project.
#[derive(Debug)]
pub struct InitResult {
    /// Path to the created .toonflow directory
    pub toonflow_dir: PathBuf,
    /// Whether the directory was newly created (false if it already existed)
    pub created: bool,
}

/// Initialize a toonflow project in the given directory.
///
/// Re-running on an existing project completes the structure without
/// overwriting existing files.
pub fn init_project(project_dir: &Path) -> Result<InitResult> {
    let toonflow_dir = project_dir.join(TOONFLOW_DIR);
    let created = !toonflow_dir.exists();

    std::fs::create_dir_all(&toonflow_dir)
        .with_context(|| format!("Failed to create directory: {}", toonflow_dir.display()))?;
    ensure_directory_structure(&toonflow_dir)?;

    Ok(InitResult {
        toonflow_dir,
        created,
    })
}

/// Ensure all required subdirectories and files exist.
fn ensure_directory_structure(toonflow_dir: &Path) -> Result<()> {
    let sessions_dir = toonflow_dir.join("audit").join("sessions");
    let logs_dir = toonflow_dir.join("logs");

    std::fs::create_dir_all(&sessions_dir).with_context(|| {
        format!(
            "Failed to create audit directory: {}",
            sessions_dir.display()
        )
    })?;
    std::fs::create_dir_all(&logs_dir)
        .with_context(|| format!("Failed to create logs directory: {}", logs_dir.display()))?;

    let config_file = toonflow_dir.join(CONFIG_FILE);
    if !config_file.exists() {
        ToonflowToml::default().save(&config_file)?;
    }

    let state_file = toonflow_dir.join("state");
    if !state_file.exists() {
        std::fs::write(&state_file, "")
            .with_context(|| format!("Failed to create state file: {}", state_file.display()))?;
    }

    Ok(())
}

/// Check if a project is already initialized with toonflow.
pub fn is_initialized(project_dir: &Path) -> bool {
    project_dir.join(TOONFLOW_DIR).exists()
}

/// Get the path to the toonflow directory for a project.
pub fn get_toonflow_dir(project_dir: &Path) -> PathBuf {
    project_dir.join(TOONFLOW_DIR)
}

/// Returns `true` if `.toonflow/session.json` exists and parses.
pub fn has_session(project_dir: &Path) -> bool {
    let session_file = get_toonflow_dir(project_dir).join("session.json");
    session_file.exists() && SessionSnapshot::load(&session_file).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_init_project_creates_toonflow_directory() {
        let dir = tempdir().unwrap();
        let result = init_project(dir.path()).unwrap();

        assert!(result.toonflow_dir.exists());
        assert!(result.created);
        assert_eq!(result.toonflow_dir, dir.path().join(".toonflow"));
    }

    #[test]
    fn test_init_project_creates_structure() {
        let dir = tempdir().unwrap();
        init_project(dir.path()).unwrap();

        let toonflow_dir = dir.path().join(".toonflow");
        assert!(toonflow_dir.join("audit/sessions").is_dir());
        assert!(toonflow_dir.join("logs").is_dir());
        assert!(toonflow_dir.join("state").is_file());
        let config = ToonflowToml::load(&toonflow_dir.join("toonflow.toml")).unwrap();
        assert!(config.validate().is_empty());
    }

    #[test]
    fn test_init_project_twice_keeps_existing_config() {
        let dir = tempdir().unwrap();
        assert!(init_project(dir.path()).unwrap().created);

        let config_file = dir.path().join(".toonflow/toonflow.toml");
        std::fs::write(&config_file, "[pipeline]\nauto_next = false\n").unwrap();

        assert!(!init_project(dir.path()).unwrap().created);
        let content = std::fs::read_to_string(&config_file).unwrap();
        assert_eq!(content, "[pipeline]\nauto_next = false\n");
    }

    #[test]
    fn test_is_initialized() {
        let dir = tempdir().unwrap();
        assert!(!is_initialized(dir.path()));
        init_project(dir.path()).unwrap();
        assert!(is_initialized(dir.path()));
    }

    #[test]
    fn test_has_session() {
        let dir = tempdir().unwrap();
        init_project(dir.path()).unwrap();
        assert!(!has_session(dir.path()));

        let path = get_toonflow_dir(dir.path()).join("session.json");
        std::fs::write(&path, "not json").unwrap();
        assert!(!has_session(dir.path()));

        SessionSnapshot::with_id("s1", true).save(&path).unwrap();
        assert!(has_session(dir.path()));
    }
}
