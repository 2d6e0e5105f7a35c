//! Build command implementation
//!
//! Runs the whole pipeline and reports:
//! - a progress bar while versions build (hidden with `--quiet` or when
//!   stderr is not a terminal),
//! - a summary of built and failed versions,
//! - the exit code derived from the run status and `strict`.
//!
//! SIGINT and SIGTERM stop the run from starting further builds. Builds
//! already running finish, every worktree is released, and the process exits
//! with [`INTERRUPTED_EXIT_CODE`].

use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

use docs_multiversion::output::{emoji, OutputConfig};
use docs_multiversion::phases::aggregate::{RunReport, RunStatus};
use docs_multiversion::phases::orchestrator::RunObserver;
use docs_multiversion::phases::overlay::PlannedRef;
use docs_multiversion::phases::BuildResult;

use super::{display_path, Session};

/// Exit code of a run stopped by an interrupt (128 + SIGINT).
pub const INTERRUPTED_EXIT_CODE: u8 = 130;

/// Drives an `indicatif` progress bar from run events
struct ProgressObserver {
    bar: ProgressBar,
    output: OutputConfig,
}

impl ProgressObserver {
    fn new(quiet: bool, output: OutputConfig) -> Self {
        let bar = if quiet {
            ProgressBar::hidden()
        } else {
            ProgressBar::with_draw_target(Some(0), ProgressDrawTarget::stderr())
        };
        bar.set_style(
            ProgressStyle::with_template("{spinner} [{pos}/{len}] {wide_msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        Self { bar, output }
    }
}

impl RunObserver for ProgressObserver {
    fn on_plan(&self, planned: &[PlannedRef]) {
        self.bar.set_length(planned.len() as u64);
        if !planned.is_empty() {
            self.bar.enable_steady_tick(Duration::from_millis(120));
        }
    }

    fn on_build_started(&self, planned: &PlannedRef) {
        self.bar
            .set_message(format!("building {}", planned.reference.name));
    }

    fn on_build_finished(&self, result: &BuildResult) {
        let mark = if result.success {
            self.output.success(emoji(&self.output, "✔", "ok"))
        } else {
            self.output.failure(emoji(&self.output, "✘", "FAILED"))
        };
        self.bar.println(format!(
            "{} {} {}",
            mark,
            result.name(),
            self.output.dim(&format!("({} ms)", result.duration_ms))
        ));
        self.bar.inc(1);
    }
}

/// Execute a full run
pub fn execute(session: &Session, quiet: bool) -> Result<ExitCode> {
    let start_time = Instant::now();
    let output = session.output;

    if !quiet {
        println!(
            "{} Building documentation versions from {}",
            emoji(&output, "📚", "[DOCS]"),
            session.repository.root().display()
        );
    }

    let observer = Arc::new(ProgressObserver::new(quiet, output));
    let orchestrator = session
        .orchestrator()
        .with_observer(Arc::clone(&observer) as Arc<dyn RunObserver>);

    let cancel = orchestrator.cancel_handle();
    install_interrupt_handler(Arc::clone(&cancel));

    let report = orchestrator.run();
    observer.bar.finish_and_clear();
    let report = report?;

    if !quiet {
        print_summary(&report, session, start_time.elapsed());
    }

    if cancel.load(Ordering::SeqCst) {
        eprintln!(
            "{} Interrupted, {} version(s) were not built",
            emoji(&output, "⛔", "[STOP]"),
            report.failures().count()
        );
        return Ok(ExitCode::from(INTERRUPTED_EXIT_CODE));
    }

    Ok(ExitCode::from(report.exit_code(session.config.strict)))
}

/// Set `cancel` on SIGINT or SIGTERM instead of terminating the process.
fn install_interrupt_handler(cancel: Arc<AtomicBool>) {
    let installed = ctrlc::set_handler(move || {
        if !cancel.swap(true, Ordering::SeqCst) {
            eprintln!("Interrupted, waiting for running builds to finish");
        }
    });
    if let Err(e) = installed {
        log::warn!("Cannot install interrupt handler: {}", e);
    }
}

fn print_summary(report: &RunReport, session: &Session, elapsed: Duration) {
    let output = &session.output;

    if report.results.is_empty() {
        println!(
            "{} No refs matched the configuration, nothing to build",
            emoji(output, "ℹ️ ", "[INFO]")
        );
        return;
    }

    let built = report.successes().count();
    if built > 0 {
        println!(
            "{} Built {} version(s) into {} in {:.2}s",
            emoji(output, "✅", "[OK]"),
            built,
            display_path(&session.layout.output_root).display(),
            elapsed.as_secs_f64()
        );
        for entry in &report.catalog.versions {
            let latest = if entry.is_latest { " (latest)" } else { "" };
            println!(
                "   {}{} {}",
                output.success(&entry.name),
                latest,
                output.dim(&format!("-> {}/", entry.output_dir))
            );
        }
    }

    let failures: Vec<&BuildResult> = report.failures().collect();
    if !failures.is_empty() {
        println!(
            "{} {} version(s) failed:",
            emoji(output, "❌", "[FAIL]"),
            failures.len()
        );
        for failure in failures {
            let detail = failure.error.as_deref().unwrap_or("unknown error");
            println!("   {}: {}", output.failure(failure.name()), detail.trim());
        }
    }

    match report.status {
        RunStatus::PartialFailure if !session.config.strict => println!(
            "{} Some versions failed; use --strict to exit with an error",
            emoji(output, "⚠️ ", "[WARN]")
        ),
        RunStatus::Failure => println!("{} No version could be built", emoji(output, "❌", "[FAIL]")),
        _ => {}
    }
}
