//! Pipeline execution commands: start, continue, retry, deliver and flush.

use anyhow::{Context, Result};
use console::style;
use std::path::Path;

use toonflow::errors::PipelineError;
use toonflow::generate::GenerationResult;
use toonflow::orchestrator::RunOutcome;
use toonflow::phase::Phase;
use toonflow::sequencer::PipelineState;
use toonflow::ui::PipelineUI;

use super::workspace::Workspace;

pub async fn cmd_start(project_dir: &Path, verbose: bool, premise: &str) -> Result<()> {
    let mut ws = Workspace::open(project_dir, verbose)?;
    let ui = ws.ui();
    ui.start_phase(Phase::first());
    ui.begin("Generating");
    let result = ws.pipeline.start(premise).await;
    finish(&mut ws, &ui, result)
}

pub async fn cmd_continue(project_dir: &Path, verbose: bool) -> Result<()> {
    let mut ws = Workspace::open(project_dir, verbose)?;
    let ui = ws.ui();
    ui.begin("Generating");
    let result = ws.pipeline.continue_pipeline().await;
    finish(&mut ws, &ui, result)
}

pub async fn cmd_retry(project_dir: &Path, verbose: bool, from: Option<&str>) -> Result<()> {
    let mut ws = Workspace::open(project_dir, verbose)?;
    let ui = ws.ui();
    let result = match from {
        Some(from) => {
            let phase: Phase = from.parse()?;
            ui.start_phase(phase);
            ui.begin("Regenerating");
            ws.pipeline.retry_from(phase).await
        }
        None => {
            ui.begin("Retrying");
            ws.pipeline.retry().await
        }
    };
    finish(&mut ws, &ui, result)
}

/// Hand in a result produced out of band for a deferred or stale phase.
pub async fn cmd_deliver(
    project_dir: &Path,
    verbose: bool,
    phase: &str,
    text: Option<&str>,
    file: Option<&Path>,
    error: Option<&str>,
) -> Result<()> {
    let phase: Phase = phase.parse()?;
    let result = match error {
        Some(reason) => GenerationResult::failure(reason),
        None => GenerationResult::success(super::read_body(text, file)?),
    };

    let mut ws = Workspace::open(project_dir, verbose)?;
    let ui = ws.ui();
    let outcome = ws
        .pipeline
        .deliver(phase, &result)
        .with_context(|| format!("Cannot deliver a result for {}", phase))?;

    // An applied run may now auto-advance; an applied text phase may have queued dependents.
    let mut outcomes = vec![outcome.clone()];
    if outcome.is_applied() && ws.pipeline.sequencer().should_auto_advance() {
        outcomes.extend(ws.pipeline.continue_pipeline().await?);
    }
    outcomes.extend(ws.pipeline.process_regenerations().await?);
    finish(&mut ws, &ui, Ok(outcomes))
}

/// Dispatch every queued regeneration now.
pub async fn cmd_flush(project_dir: &Path, verbose: bool) -> Result<()> {
    let mut ws = Workspace::open(project_dir, verbose)?;
    let ui = ws.ui();
    let pending = ws.pipeline.controller().queue().len();
    if pending == 0 {
        println!("No regenerations are queued.");
        return ws.save();
    }
    ui.begin(&format!("Regenerating {} phase(s)", pending));
    let result = ws.pipeline.process_regenerations().await;
    finish(&mut ws, &ui, result)
}

/// Report outcomes and notices, print the next step and save the session.
pub(crate) fn finish(
    ws: &mut Workspace,
    ui: &PipelineUI,
    result: Result<Vec<RunOutcome>, PipelineError>,
) -> Result<()> {
    let outcomes = match result {
        Ok(outcomes) => outcomes,
        Err(e) => {
            ui.finish();
            ws.flush_notices(ui);
            return Err(e.into());
        }
    };
    ui.report(&outcomes);
    ws.flush_notices(ui);
    ui.finish();

    let film_applied = outcomes
        .iter()
        .any(|o| matches!(o, RunOutcome::Applied { phase: Phase::Film, .. }));
    if film_applied && ws.pipeline.sequencer().is_complete() {
        ui.pipeline_complete();
    } else {
        print_next_step(ws);
    }
    ws.save()
}

fn print_next_step(ws: &Workspace) {
    let hint = match ws.pipeline.sequencer().state() {
        PipelineState::Halted(finished) => match finished.next() {
            Some(next) => format!("Run `toonflow continue` to generate {}.", next),
            None => return,
        },
        PipelineState::Failed(phase) => {
            format!("{} failed. Run `toonflow retry` to try again.", phase)
        }
        PipelineState::Running(phase) => format!(
            "{} is waiting for a result: `toonflow deliver {}`.",
            phase, phase
        ),
        PipelineState::NotStarted | PipelineState::Complete => return,
    };
    println!("{}", style(hint).dim());
}
