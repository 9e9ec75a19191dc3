//! Loads a project's session into a ready-to-use [`Pipeline`] and writes it back.

use anyhow::{Result, bail};
use std::path::Path;
use tracing::{debug, info};

use toonflow::audit::AuditLogger;
use toonflow::cache::{FileStorage, MountOutcome, PersistenceCache, SessionGuard};
use toonflow::config::Config;
use toonflow::generate::{Generator, OfflineGenerator, ProcessGenerator};
use toonflow::orchestrator::{Pipeline, StateManager};
use toonflow::revision::RevisionController;
use toonflow::sequencer::PhaseSequencer;
use toonflow::session::SessionSnapshot;
use toonflow::toonflow_config::ToonflowToml;
use toonflow::transport::FileOutbox;
use toonflow::ui::PipelineUI;

pub struct Workspace {
    pub config: Config,
    pub snapshot: SessionSnapshot,
    pub pipeline: Pipeline,
    pub mount: MountOutcome,
}

impl Workspace {
    /// Open the project at `project_dir`, mounting its session.
    pub fn open(project_dir: &Path, verbose: bool) -> Result<Self> {
        let config = Config::new(project_dir, verbose)?;
        if !config.is_initialized() {
            bail!("Not a toonflow project. Run 'toonflow init' first.");
        }
        config.ensure_directories()?;

        let mut snapshot = match SessionSnapshot::load_optional(&config.session_file)? {
            Some(snapshot) => snapshot,
            None => {
                let mut snapshot = SessionSnapshot::new(config.auto_next());
                snapshot.save(&config.session_file)?;
                info!(session = %snapshot.session_id, "Created session");
                snapshot
            }
        };
        if let Some(session_id) = config.session_override() {
            if session_id != snapshot.session_id {
                info!(from = %snapshot.session_id, to = %session_id, "Switching session");
                snapshot.session_id = session_id;
            }
        }

        let mut pipeline = build_pipeline(&config, &snapshot);
        if let Some(enabled) = ToonflowToml::auto_next_override() {
            pipeline.set_auto_next(enabled);
        }
        let mount = pipeline.mount();
        debug!(session = %snapshot.session_id, ?mount, "Session mounted");

        Ok(Self {
            config,
            snapshot,
            pipeline,
            mount,
        })
    }

    /// Write the pipeline's state back to `session.json`.
    pub fn save(&mut self) -> Result<()> {
        self.snapshot.state = self.pipeline.controller().state().clone();
        self.snapshot.progress = self.pipeline.sequencer().progress().clone();
        self.snapshot.save(&self.config.session_file)
    }

    /// A progress UI positioned at the last finished phase.
    pub fn ui(&self) -> PipelineUI {
        let finished = self
            .pipeline
            .sequencer()
            .finish_phase()
            .map_or(0, |p| p.index() + 1);
        PipelineUI::new(finished, self.config.verbose)
    }

    /// Print and clear any notices the engine raised.
    pub fn flush_notices(&mut self, ui: &PipelineUI) {
        let notices = self.pipeline.drain_notices();
        ui.notices(&notices);
    }
}

fn build_pipeline(config: &Config, snapshot: &SessionSnapshot) -> Pipeline {
    let controller = RevisionController::from_state(snapshot.state.clone(), config.settle_delay());
    let sequencer = PhaseSequencer::from_progress(snapshot.progress.clone(), config.auto_next());
    let cache = PersistenceCache::new(
        Box::new(FileStorage::new(&config.cache_file)),
        &config.toml.cache.key_prefix,
        config.restore_window(),
    );

    let generator: Box<dyn Generator> = match config.toml.generator_command() {
        Some(command) => Box::new(ProcessGenerator::new(
            &command,
            config.toml.generator.args.clone(),
            config.project_dir.clone(),
            config.generator_timeout(),
        )),
        None => Box::new(OfflineGenerator::new()),
    };
    debug!(generator = generator.name(), "Generator selected");

    Pipeline::new(&snapshot.session_id, controller, sequencer, cache)
        .with_guard(SessionGuard::new(config.toml.cache.similarity_threshold))
        .with_generator(generator)
        .with_fallback(Box::new(FileOutbox::new(&config.outbox_file)))
        .with_journal(StateManager::new(config.state_file.clone()))
        .with_audit(AuditLogger::new(&config.audit_dir))
}
