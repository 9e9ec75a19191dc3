use console::style;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::time::Duration;

use crate::notice::{Notice, NoticeLevel};
use crate::orchestrator::RunOutcome;
use crate::phase::Phase;
use crate::ui::icons::{CHECK, CROSS, DEFERRED, DISCARDED, INFO, RUNNING, SPARKLE, WARN};

/// Terminal UI for a pipeline command, rendered via `indicatif` progress bars.
///
/// Two bars are stacked vertically:
/// - Phase bar: how many of the eleven phases have finished
/// - Work bar: spinner shown while a generation is in flight
///
/// Result lines go to stdout through [`MultiProgress::suspend`], so they are
/// printed even when the bars are hidden (no terminal attached).
pub struct PipelineUI {
    multi: MultiProgress,
    phase_bar: ProgressBar,
    work_bar: ProgressBar,
    verbose: bool,
}

impl PipelineUI {
    /// Create the UI with the phase bar positioned at `finished` phases.
    pub fn new(finished: usize, verbose: bool) -> Self {
        let multi = MultiProgress::new();

        let phase_style = ProgressStyle::default_bar()
            .template("{prefix:.bold.dim} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .expect("progress bar template is a valid static string")
            .progress_chars("█▓▒░");

        let phase_bar = multi.add(ProgressBar::new(Phase::COUNT as u64));
        phase_bar.set_style(phase_style);
        phase_bar.set_prefix("Phases");
        phase_bar.set_position(finished as u64);

        let work_style = ProgressStyle::default_spinner()
            .template("{prefix:.bold.dim} {spinner} {msg}")
            .expect("progress bar template is a valid static string");

        let work_bar = multi.add(ProgressBar::new_spinner());
        work_bar.set_style(work_style);
        work_bar.set_prefix("  Work");

        Self {
            multi,
            phase_bar,
            work_bar,
            verbose,
        }
    }

    /// Print a line to stdout without tearing the progress bars.
    pub fn print_line(&self, msg: impl AsRef<str>) {
        self.multi.suspend(|| println!("{}", msg.as_ref()));
    }

    /// Start the spinner with `message` until [`Self::finish`] is called.
    pub fn begin(&self, message: &str) {
        self.work_bar
            .set_message(format!("{}{}", RUNNING, style(message).dim()));
        self.work_bar.enable_steady_tick(Duration::from_millis(100));
    }

    /// Announce the phase about to run on the phase bar.
    pub fn start_phase(&self, phase: Phase) {
        self.phase_bar.set_message(format!(
            "{}: {}",
            style(phase.name()).yellow(),
            phase.label()
        ));
    }

    /// Report each outcome, advancing the phase bar for applied phases.
    pub fn report(&self, outcomes: &[RunOutcome]) {
        for outcome in outcomes {
            if outcome.is_applied() {
                self.phase_bar
                    .set_position((outcome.phase().index() + 1) as u64);
            }
            self.print_line(outcome_line(outcome));
        }
    }

    pub fn notice(&self, notice: &Notice) {
        let icon = match notice.level {
            NoticeLevel::Info => INFO,
            NoticeLevel::Warning => WARN,
            NoticeLevel::Error => CROSS,
        };
        if notice.level == NoticeLevel::Info && !self.verbose {
            return;
        }
        self.print_line(format!("{}{}", icon, notice.message));
    }

    pub fn notices(&self, notices: &[Notice]) {
        for notice in notices {
            self.notice(notice);
        }
    }

    /// Print the completion banner once the last phase is applied.
    pub fn pipeline_complete(&self) {
        self.print_line(format!(
            "\n{}{}\n",
            SPARKLE,
            style("Pipeline complete: the film is ready").green().bold()
        ));
    }

    /// Stop both bars and clear them from the terminal.
    pub fn finish(&self) {
        self.work_bar.finish_and_clear();
        self.phase_bar.finish_and_clear();
    }
}

/// One-line summary of a run outcome.
pub fn outcome_line(outcome: &RunOutcome) -> String {
    match outcome {
        RunOutcome::Applied { phase, version } => format!(
            "{}{} confirmed (version {})",
            CHECK,
            style(phase.name()).green().bold(),
            version
        ),
        RunOutcome::Failed { phase, reason } => format!(
            "{}{} failed: {}",
            CROSS,
            style(phase.name()).red().bold(),
            reason
        ),
        RunOutcome::Discarded { phase } => format!(
            "{}{} result discarded: its inputs changed while it was generating",
            DISCARDED,
            style(phase.name()).yellow().bold()
        ),
        RunOutcome::Deferred { phase, command } => format!(
            "{}{} sent as {}; deliver the result with `toonflow deliver {}`",
            DEFERRED,
            style(phase.name()).cyan().bold(),
            command,
            phase.name()
        ),
    }
}
