//! Inspection and housekeeping commands: status, show, stale, auto, reset and audit.

use anyhow::{Context, Result, bail};
use console::style;
use std::path::Path;

use toonflow::audit::{AuditLogger, AuditSession};
use toonflow::orchestrator::StateManager;
use toonflow::phase::Phase;
use toonflow::sequencer::PipelineState;
use toonflow::stale::StaleMark;
use toonflow::ui::icons::{CHECK, CROSS, RUNNING, STALE};
use toonflow::util::preview;

use super::super::AuditCommands;
use super::workspace::Workspace;

pub fn cmd_status(project_dir: &Path, verbose: bool) -> Result<()> {
    let ws = Workspace::open(project_dir, verbose)?;
    let pipeline = &ws.pipeline;
    let controller = pipeline.controller();
    let sequencer = pipeline.sequencer();

    println!();
    println!("Session:      {}", style(pipeline.session_id()).cyan());
    println!(
        "Generator:    {}",
        ws.config
            .toml
            .generator_command()
            .unwrap_or_else(|| "offline".to_string())
    );
    println!(
        "Auto-advance: {}",
        if sequencer.auto_next() { "on" } else { "off" }
    );
    let state = match sequencer.state() {
        PipelineState::NotStarted => "not started".to_string(),
        PipelineState::Running(phase) => format!("running {}", phase),
        PipelineState::Failed(phase) => format!("{} failed", phase),
        PipelineState::Halted(phase) => format!("halted after {}", phase),
        PipelineState::Complete => "complete".to_string(),
    };
    let (position, total) = sequencer.position();
    println!("Pipeline:     {} ({}/{})", state, position, total);
    let journal = StateManager::new(ws.config.state_file.clone());
    if let Some(phase) = journal.get_last_completed_phase() {
        println!("Last done:    {}", phase);
    }
    println!();

    println!(
        "{:<4} {:<22} {:<26} {:<8} Preview",
        "", "Phase", "Label", "Version"
    );
    println!(
        "{:<4} {:<22} {:<26} {:<8} -------",
        "", "---------------------", "-------------------------", "-------"
    );
    for phase in Phase::ALL {
        let message = controller.store().find_latest_by_phase(phase);
        let version = message.map(|m| m.current_version());
        let summary = match message {
            Some(m) if !phase.is_structured() => preview(&m.phase_body().unwrap_or_default(), 30),
            _ => String::new(),
        };
        let icon = if controller.stale().is_stale(phase) {
            STALE.to_string()
        } else if sequencer.running_phase() == Some(phase) {
            match sequencer.state() {
                PipelineState::Failed(_) => CROSS.to_string(),
                _ => RUNNING.to_string(),
            }
        } else if version.is_some() {
            CHECK.to_string()
        } else {
            String::new()
        };
        println!(
            "{:<4} {:<22} {:<26} {:<8} {}",
            icon,
            phase.name(),
            phase.label(),
            version.map_or_else(|| "-".to_string(), |v| format!("v{}", v)),
            style(summary).dim()
        );
    }
    println!();

    let stale = controller.stale().stale_phases();
    if !stale.is_empty() {
        println!(
            "{} stale phase(s), {} queued regeneration(s). See `toonflow stale`.",
            stale.len(),
            controller.queue().len()
        );
    }
    let problems = ws.snapshot.problems();
    for problem in &problems {
        println!("{} {}", style("warning:").yellow().bold(), problem);
    }
    Ok(())
}

pub fn cmd_show(project_dir: &Path, verbose: bool, phase: &str, history: bool) -> Result<()> {
    let phase: Phase = phase.parse()?;
    let ws = Workspace::open(project_dir, verbose)?;
    let controller = ws.pipeline.controller();
    let Some(message) = controller.store().find_latest_by_phase(phase) else {
        println!("{} has no content yet.", phase);
        return Ok(());
    };

    println!();
    println!(
        "{}: {} (version {} of {})",
        style(phase.name()).bold(),
        phase.label(),
        message.current_version(),
        message.version_count()
    );
    if controller.stale().is_stale(phase) {
        println!("{}", style("stale: upstream content changed").yellow());
    }
    println!();

    if history {
        for (version, text) in message.history() {
            let marker = if version == message.current_version() {
                " (current)"
            } else {
                ""
            };
            println!("{}", style(format!("── version {}{} ──", version, marker)).dim());
            print_body(phase, &text);
            println!();
        }
        return Ok(());
    }

    match controller.bundle().read(phase.data_key()) {
        Some(value) if phase.is_structured() => {
            println!("{}", serde_json::to_string_pretty(value)?);
        }
        _ => print_body(phase, &message.phase_body().unwrap_or_default()),
    }
    Ok(())
}

fn print_body(phase: Phase, body: &str) {
    if phase.is_structured() {
        println!("{}", body);
        return;
    }
    for line in body.lines() {
        println!("{}", textwrap::fill(line, 80));
    }
}

pub fn cmd_stale(project_dir: &Path, verbose: bool) -> Result<()> {
    let ws = Workspace::open(project_dir, verbose)?;
    let controller = ws.pipeline.controller();
    let stale = controller.stale();

    if stale.is_empty() && controller.queue().is_empty() {
        println!("Nothing is stale.");
        return Ok(());
    }

    for phase in stale.stale_phases() {
        let detail = match stale.mark(phase) {
            Some(StaleMark::Items(items)) => format!(
                "items {}",
                items
                    .iter()
                    .map(|i| i.to_string())
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
            _ => "whole phase".to_string(),
        };
        println!("{}{:<22} {}", STALE, phase.name(), style(detail).dim());
    }

    if !controller.queue().is_empty() {
        println!();
        println!("Queued regenerations:");
        for request in controller.queue().iter() {
            let scope = request
                .only_index
                .map_or_else(|| "whole phase".to_string(), |i| format!("item {}", i));
            println!(
                "  {:<22} {:<12} after {} edit, due {}",
                request.phase.name(),
                scope,
                request.trigger,
                request.not_before.format("%H:%M:%S")
            );
        }
        println!();
        println!("{}", style("Run `toonflow flush` to dispatch them.").dim());
    }
    Ok(())
}

pub fn cmd_auto(project_dir: &Path, verbose: bool, enabled: bool) -> Result<()> {
    let mut ws = Workspace::open(project_dir, verbose)?;
    ws.pipeline.set_auto_next(enabled);
    ws.save()?;
    println!(
        "Auto-advance {}",
        if enabled {
            style("on").green()
        } else {
            style("off").yellow()
        }
    );
    Ok(())
}

pub fn cmd_reset(project_dir: &Path, verbose: bool, force: bool) -> Result<()> {
    use dialoguer::Confirm;

    let mut ws = Workspace::open(project_dir, verbose)?;

    if !force {
        let confirm = Confirm::new()
            .with_prompt("This will discard all content and progress. Are you sure?")
            .default(false)
            .interact()
            .unwrap_or(false);

        if !confirm {
            println!("Reset cancelled");
            return Ok(());
        }
    }

    ws.pipeline.reset()?;
    if ws.config.outbox_file.exists() {
        std::fs::remove_file(&ws.config.outbox_file).ok();
    }
    ws.save()?;

    println!("Reset complete");
    Ok(())
}

pub fn cmd_audit(project_dir: &Path, verbose: bool, command: &AuditCommands) -> Result<()> {
    let ws = Workspace::open(project_dir, verbose)?;
    let audit = AuditLogger::new(&ws.config.audit_dir);

    match command {
        AuditCommands::Show { phase } => {
            let Some(session) = ws.pipeline.audit().and_then(|a| a.current_session()) else {
                println!("No revisions recorded for this session.");
                return Ok(());
            };
            let phase = phase.as_deref().map(str::parse::<Phase>).transpose()?;
            print_session(session, phase);
        }
        AuditCommands::Sessions => {
            let sessions = audit.list_sessions()?;
            if sessions.is_empty() {
                println!("No archived sessions.");
            }
            for path in sessions {
                let session = audit.load_session(&path)?;
                println!(
                    "{}  {}  {} event(s)",
                    session.started_at.format("%Y-%m-%d %H:%M:%S"),
                    session.session_id,
                    session.events.len()
                );
            }
        }
        AuditCommands::Export { output } => {
            let Some(session) = ws.pipeline.audit().and_then(|a| a.current_session()) else {
                bail!("No active audit session to export");
            };
            let json = serde_json::to_string_pretty(session)?;
            std::fs::write(output, json)
                .with_context(|| format!("Failed to write {}", output.display()))?;
            println!("Exported {} event(s) to {}", session.events.len(), output.display());
        }
    }
    Ok(())
}

fn print_session(session: &AuditSession, phase: Option<Phase>) {
    println!(
        "Session {} (started {})",
        style(&session.session_id).cyan(),
        session.started_at.format("%Y-%m-%d %H:%M:%S")
    );
    println!();
    let events = session
        .events
        .iter()
        .filter(|e| phase.is_none_or(|p| e.phase == p));
    for event in events {
        let version = if event.version > 0 {
            format!("v{}", event.version)
        } else {
            "-".to_string()
        };
        println!(
            "{}  {:<22} {:<5} {:<16} {}",
            event.at.format("%H:%M:%S"),
            event.phase.name(),
            version,
            event.content_hash,
            event.kind
        );
        if !event.dependents.is_empty() {
            let names: Vec<&str> = event.dependents.iter().map(|p| p.name()).collect();
            println!("          {}", style(format!("stale: {}", names.join(", "))).dim());
        }
    }
}
