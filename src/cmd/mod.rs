//! CLI command implementations.
//!
//! Each submodule owns one or more related `Commands` variants:
//!
//! | Module          | Commands handled                                      |
//! |-----------------|--------------------------------------------------------|
//! | `project`       | `Init`                                                |
//! | `run`           | `Start`, `Continue`, `Retry`, `Deliver`, `Flush`      |
//! | `revise`        | `Edit`, `EditItem`, `Regenerate`, `Select`            |
//! | `phase`         | `Status`, `Show`, `Stale`, `Auto`, `Reset`, `Audit`   |
//! | `cache`         | `Cache`                                               |
//! | `config`        | `Config`                                              |
//!
//! `workspace` loads `.toonflow/session.json` into a mounted pipeline and
//! saves it back after the command.

pub mod cache;
pub mod config;
pub mod phase;
pub mod project;
pub mod revise;
pub mod run;
pub mod workspace;

pub use cache::cmd_cache;
pub use config::cmd_config;
pub use phase::{cmd_audit, cmd_auto, cmd_reset, cmd_show, cmd_stale, cmd_status};
pub use project::cmd_init;
pub use revise::{cmd_edit, cmd_edit_item, cmd_regenerate, cmd_select};
pub use run::{cmd_continue, cmd_deliver, cmd_flush, cmd_retry, cmd_start};

use anyhow::{Context, Result, bail};
use std::io::Read;
use std::path::Path;

/// Content from `--text`, `--file`, or stdin, in that order.
pub(crate) fn read_body(text: Option<&str>, file: Option<&Path>) -> Result<String> {
    if let Some(text) = text {
        return Ok(text.to_string());
    }
    if let Some(file) = file {
        return std::fs::read_to_string(file)
            .with_context(|| format!("Failed to read {}", file.display()));
    }
    let mut body = String::new();
    std::io::stdin()
        .read_to_string(&mut body)
        .context("Failed to read content from stdin")?;
    if body.trim().is_empty() {
        bail!("No content given. Pass --text, --file, or pipe it on stdin.");
    }
    Ok(body)
}
