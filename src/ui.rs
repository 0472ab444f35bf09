//! Terminal output for runs: a spinner while jobs are in flight, colored
//! per-unit outcomes and the final summary.
//!
//! Uses `indicatif` for the spinner and `console` for colors. Structured
//! logs still go through `tracing`; [`ActiveBar`] is their writer, so a log
//! line is printed with the spinner cleared instead of through it.

use std::io::{self, Write};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use console::Style;
use indicatif::{ProgressBar, ProgressStyle};
use tracing_subscriber::fmt::MakeWriter;

use genjob::pipeline::{RunObserver, RunSummary, UnitOutcome, UnitRecord, WorkUnit};
use genjob::poller::PollObserver;
use genjob::state_machine::JobState;

/// The spinner currently on screen, if any. Doubles as the `tracing`
/// writer: each formatted event is written to stderr inside
/// [`ProgressBar::suspend`].
#[derive(Clone, Default)]
pub struct ActiveBar(Arc<Mutex<Option<ProgressBar>>>);

impl ActiveBar {
    fn set(&self, pb: Option<ProgressBar>) {
        if let Ok(mut slot) = self.0.lock() {
            *slot = pb;
        }
    }

    fn current(&self) -> Option<ProgressBar> {
        self.0.lock().ok().and_then(|slot| slot.clone())
    }
}

impl<'a> MakeWriter<'a> for ActiveBar {
    type Writer = EventWriter;

    fn make_writer(&'a self) -> Self::Writer {
        EventWriter {
            bar: self.current(),
            buf: Vec::new(),
        }
    }
}

/// Buffers one formatted event and emits it on drop.
pub struct EventWriter {
    bar: Option<ProgressBar>,
    buf: Vec<u8>,
}

impl Write for EventWriter {
    fn write(&mut self, bytes: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(bytes);
        Ok(bytes.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for EventWriter {
    fn drop(&mut self) {
        if self.buf.is_empty() {
            return;
        }
        let emit = || {
            let _ = io::stderr().lock().write_all(&self.buf);
        };
        match &self.bar {
            Some(pb) => pb.suspend(emit),
            None => emit(),
        }
    }
}

/// Spinner plus colored status lines for one run.
pub struct RunProgress {
    pb: ProgressBar,
    active: ActiveBar,
    green: Style,
    red: Style,
    yellow: Style,
    dim: Style,
    // Dump every unit record as JSON when set.
    verbose: bool,
}

impl RunProgress {
    /// Show a spinner and register it with `active` until [`finish`](Self::finish).
    pub fn start(verbose: bool, active: &ActiveBar) -> Self {
        Self::with_bar(ProgressBar::new_spinner(), verbose, active)
    }

    fn with_bar(pb: ProgressBar, verbose: bool, active: &ActiveBar) -> Self {
        let style = ProgressStyle::default_spinner()
            .template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner());
        pb.set_style(style);
        pb.enable_steady_tick(Duration::from_millis(100));
        active.set(Some(pb.clone()));

        Self {
            pb,
            active: active.clone(),
            green: Style::new().green().bold(),
            red: Style::new().red().bold(),
            yellow: Style::new().yellow(),
            dim: Style::new().dim(),
            verbose,
        }
    }

    pub fn finish(&self) {
        self.active.set(None);
        self.pb.finish_and_clear();
    }

    pub fn print_summary(&self, summary: &RunSummary) {
        let style = if summary.all_succeeded() {
            &self.green
        } else {
            &self.red
        };
        println!();
        println!("{}", style.apply_to("─── Run Summary ───"));
        println!(
            "  {}/{} succeeded ({} already present)",
            summary.succeeded, summary.total, summary.skipped
        );
        for failed in &summary.failed {
            println!("  {} {}: {}", self.red.apply_to("✗"), failed.unit_id, failed.reason);
        }
        if let Some(reason) = &summary.aborted {
            println!("  {} run stopped: {reason}", self.yellow.apply_to("!"));
        }
        println!("  {}", self.dim.apply_to(format!("run {}", summary.run_id)));
    }
}

impl PollObserver for RunProgress {
    fn waiting(&self, task_id: &str, state: &JobState, elapsed: Duration) {
        self.pb
            .set_message(format!("{task_id}: {state} ({}s)", elapsed.as_secs()));
    }
}

impl RunObserver for RunProgress {
    fn unit_started(&self, index: usize, total: usize, unit: &WorkUnit) {
        self.pb.println(format!(
            "[{}/{total}] {} ({})",
            index + 1,
            unit.label,
            unit.id
        ));
        self.pb.set_message(format!("{}: submitting", unit.id));
    }

    fn unit_submitted(&self, unit: &WorkUnit, task_id: &str) {
        self.pb
            .set_message(format!("{}: submitted as {task_id}", unit.id));
    }

    fn unit_finished(&self, record: &UnitRecord) {
        let line = match &record.outcome {
            UnitOutcome::Completed { bytes } => format!(
                "  {} {} ({bytes} bytes)",
                self.green.apply_to("✓"),
                record.target.display()
            ),
            UnitOutcome::Skipped => format!(
                "  {} already present: {}",
                self.yellow.apply_to("↷"),
                record.target.display()
            ),
            UnitOutcome::Failed { reason } => {
                format!("  {} {reason}", self.red.apply_to("✗"))
            }
        };
        self.pb.println(line);
        if self.verbose {
            self.pb
                .println(serde_json::to_string_pretty(record).unwrap_or_default());
        }
        self.pb.set_message(String::new());
    }
}
