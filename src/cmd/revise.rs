//! Revision commands: edit a phase or one item, queue regenerations, pin candidates.
//!
//! Each command commits immediately. Dependent regenerations are then
//! dispatched after the settle delay unless `--defer` leaves them queued for
//! a later `toonflow flush`.

use anyhow::Result;
use console::style;
use std::path::Path;

use toonflow::phase::Phase;
use toonflow::revision::EditOutcome;
use toonflow::ui::PipelineUI;
use toonflow::ui::icons::{PENCIL, STALE, WARN};

use super::run::finish;
use super::workspace::Workspace;

pub async fn cmd_edit(
    project_dir: &Path,
    verbose: bool,
    phase: &str,
    text: Option<&str>,
    file: Option<&Path>,
    defer: bool,
) -> Result<()> {
    let phase: Phase = phase.parse()?;
    let content = super::read_body(text, file)?;
    let mut ws = Workspace::open(project_dir, verbose)?;
    let ui = ws.ui();
    let outcome = ws.pipeline.submit_edit(phase, &content)?;
    report_edit(&ui, &outcome, "saved");
    settle(&mut ws, &ui, defer).await
}

pub async fn cmd_edit_item(
    project_dir: &Path,
    verbose: bool,
    phase: &str,
    index: usize,
    value: &str,
    defer: bool,
) -> Result<()> {
    let phase: Phase = phase.parse()?;
    let mut ws = Workspace::open(project_dir, verbose)?;
    let ui = ws.ui();
    let outcome = ws.pipeline.edit_item(phase, index, value)?;
    report_edit(&ui, &outcome, &format!("item {} updated", index));
    settle(&mut ws, &ui, defer).await
}

pub async fn cmd_regenerate(
    project_dir: &Path,
    verbose: bool,
    phase: &str,
    index: Option<usize>,
    defer: bool,
) -> Result<()> {
    let phase: Phase = phase.parse()?;
    let mut ws = Workspace::open(project_dir, verbose)?;
    let ui = ws.ui();
    let outcome = ws.pipeline.regenerate(phase, index)?;
    let what = match index {
        Some(index) => format!("item {} cleared", index),
        None => "queued for regeneration".to_string(),
    };
    report_edit(&ui, &outcome, &what);
    settle(&mut ws, &ui, defer).await
}

pub async fn cmd_select(
    project_dir: &Path,
    verbose: bool,
    phase: &str,
    index: usize,
    url: &str,
    defer: bool,
) -> Result<()> {
    let phase: Phase = phase.parse()?;
    let mut ws = Workspace::open(project_dir, verbose)?;
    let ui = ws.ui();
    let outcome = ws.pipeline.select(phase, index, url)?;
    report_edit(&ui, &outcome, &format!("item {} pinned to {}", index, url));
    settle(&mut ws, &ui, defer).await
}

fn report_edit(ui: &PipelineUI, outcome: &EditOutcome, what: &str) {
    ui.print_line(format!(
        "{}{} {} (version {})",
        PENCIL,
        style(outcome.phase.name()).bold(),
        what,
        outcome.version
    ));
    if !outcome.dependents.is_empty() {
        ui.print_line(format!(
            "{}Stale: {}",
            STALE,
            style(phase_list(&outcome.dependents)).yellow()
        ));
    }
    for warning in &outcome.warnings {
        ui.print_line(format!("{}{}", WARN, warning));
    }
}

async fn settle(ws: &mut Workspace, ui: &PipelineUI, defer: bool) -> Result<()> {
    if defer {
        let queued = ws.pipeline.controller().queue().len();
        if queued > 0 {
            println!(
                "{}",
                style(format!(
                    "{} regeneration(s) queued. Run `toonflow flush` to dispatch them.",
                    queued
                ))
                .dim()
            );
        }
        ws.flush_notices(ui);
        ui.finish();
        return ws.save();
    }
    if !ws.pipeline.controller().queue().is_empty() {
        ui.begin("Regenerating");
    }
    let result = ws.pipeline.process_regenerations().await;
    finish(ws, ui, result)
}

fn phase_list(phases: &[Phase]) -> String {
    phases
        .iter()
        .map(|p| p.name())
        .collect::<Vec<_>>()
        .join(", ")
}
