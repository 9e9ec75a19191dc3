use super::{AuditSession, RevisionAudit};
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

pub struct AuditLogger {
    audit_dir: PathBuf,
    current_session: Option<AuditSession>,
    current_session_file: PathBuf,
}

impl AuditLogger {
    pub fn new(audit_dir: &Path) -> Self {
        let current_session_file = audit_dir.join("current-session.json");
        Self {
            audit_dir: audit_dir.to_path_buf(),
            current_session: None,
            current_session_file,
        }
    }

    pub fn start_session(&mut self, session_id: &str) -> Result<()> {
        self.current_session = Some(AuditSession::new(session_id));
        self.save_current()
    }

    /// Resume the session on disk if it matches `session_id`, otherwise archive
    /// it and start a new one.
    pub fn resume_or_start(&mut self, session_id: &str) -> Result<()> {
        if self.current_session.is_none() {
            self.load_current()?;
        }
        match &self.current_session {
            Some(session) if session.session_id == session_id => Ok(()),
            Some(_) => {
                self.finish_session()?;
                self.start_session(session_id)
            }
            None => self.start_session(session_id),
        }
    }

    /// Append an event to the active session.
    ///
    /// Returns an error if no session is active.
    pub fn record(&mut self, event: RevisionAudit) -> Result<()> {
        let session = self
            .current_session
            .as_mut()
            .ok_or_else(|| anyhow::anyhow!("record called with no active session"))?;
        session.events.push(event);
        self.save_current()
    }

    pub fn finish_session(&mut self) -> Result<PathBuf> {
        let session = self
            .current_session
            .as_mut()
            .ok_or_else(|| anyhow::anyhow!("No current session to finish"))?;

        session.finish();

        let sessions_dir = self.audit_dir.join("sessions");
        fs::create_dir_all(&sessions_dir).context("Failed to create sessions directory")?;
        let short_id: String = session.session_id.chars().take(8).collect();
        let filename = format!(
            "{}_{}.json",
            session.started_at.format("%Y-%m-%dT%H-%M-%S"),
            short_id
        );
        let session_file = sessions_dir.join(&filename);

        let json =
            serde_json::to_string_pretty(&session).context("Failed to serialize audit session")?;
        fs::write(&session_file, json).context("Failed to write audit session file")?;

        if self.current_session_file.exists() {
            fs::remove_file(&self.current_session_file)
                .context("Failed to remove current-session.json after finishing session")?;
        }

        self.current_session = None;
        Ok(session_file)
    }

    pub fn save_current(&self) -> Result<()> {
        if let Some(ref session) = self.current_session {
            fs::create_dir_all(&self.audit_dir).context("Failed to create audit directory")?;
            let json = serde_json::to_string_pretty(&session)
                .context("Failed to serialize current session")?;
            fs::write(&self.current_session_file, json)
                .context("Failed to write current session file")?;
        }
        Ok(())
    }

    pub fn load_current(&mut self) -> Result<bool> {
        if self.current_session_file.exists() {
            let content = fs::read_to_string(&self.current_session_file)
                .context("Failed to read current session file")?;
            let session: AuditSession =
                serde_json::from_str(&content).context("Failed to parse current session file")?;
            self.current_session = Some(session);
            Ok(true)
        } else {
            Ok(false)
        }
    }

    pub fn current_session(&self) -> Option<&AuditSession> {
        self.current_session.as_ref()
    }

    pub fn list_sessions(&self) -> Result<Vec<PathBuf>> {
        let sessions_dir = self.audit_dir.join("sessions");
        if !sessions_dir.exists() {
            return Ok(Vec::new());
        }

        let mut sessions: Vec<PathBuf> = fs::read_dir(&sessions_dir)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().map(|e| e == "json").unwrap_or(false))
            .collect();

        sessions.sort();
        sessions.reverse(); // Most recent first
        Ok(sessions)
    }

    pub fn load_session(&self, path: &Path) -> Result<AuditSession> {
        let content = fs::read_to_string(path).context("Failed to read audit session file")?;
        let session: AuditSession =
            serde_json::from_str(&content).context("Failed to parse audit session file")?;
        Ok(session)
    }
}
