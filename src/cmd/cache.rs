//! Persistence cache inspection: `toonflow cache`.

use anyhow::Result;
use chrono::Utc;
use console::style;
use std::path::Path;

use toonflow::cache::MountOutcome;
use toonflow::util::preview;

use super::super::CacheCommands;
use super::workspace::Workspace;

pub fn cmd_cache(project_dir: &Path, verbose: bool, command: Option<CacheCommands>) -> Result<()> {
    let mut ws = Workspace::open(project_dir, verbose)?;

    match command {
        None | Some(CacheCommands::Status) => {
            match &ws.mount {
                MountOutcome::NewSession { previous, purged } => println!(
                    "New session (previous: {}); purged {} cached edit(s)",
                    previous.as_deref().unwrap_or("none"),
                    purged
                ),
                MountOutcome::Resumed { restored, expired } => println!(
                    "Resumed session; restored {} edit(s), {} expired",
                    restored.len(),
                    expired
                ),
            }
            let cache = ws.pipeline.cache();
            println!(
                "Restore window: {}s",
                cache.window().num_seconds()
            );
            println!();

            let now = Utc::now();
            let entries = cache.entries();
            if entries.is_empty() {
                println!("No cached edits.");
            }
            for entry in entries {
                let restorable = entry.is_restorable(ws.pipeline.session_id(), now, cache.window());
                let status = if restorable {
                    style("restorable").green()
                } else {
                    style("inactive").dim()
                };
                println!(
                    "{:<26} {:<12} {:>6}s  {}  {}",
                    entry.key.as_str(),
                    status,
                    entry.age(now).num_seconds(),
                    &entry.session_id,
                    style(preview(&entry.payload, 40)).dim()
                );
            }
        }
        Some(CacheCommands::Purge { expired }) => {
            let removed = if expired {
                ws.pipeline.cache_mut().purge_expired_at(Utc::now())
            } else {
                ws.pipeline.cache_mut().purge_content()
            };
            println!("Purged {} cached edit(s)", removed);
        }
    }

    ws.save()
}
