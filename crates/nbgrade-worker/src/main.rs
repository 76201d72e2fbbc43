//! The worker daemon: consumes submissions from the autograde queue, runs
//! the grading engine, and posts the reports back on the report queue.

use anyhow::Context;
use clap::Parser;
use nbgrade_grader::Autograder;
use nbgrade_queue::Channel;
use std::{path::PathBuf, time::Duration};

#[derive(Parser)]
#[clap(name = env!("CARGO_PKG_NAME"), version, about)]
struct Args {
    /// The spec of the queue to connect to.
    #[clap(long, default_value = "redis://localhost:6379/")]
    queue_spec: String,
    /// The queue to listen on for work requests.
    #[clap(long, default_value = "autograde")]
    autograde_queue: String,
    /// The queue to post reports to.
    #[clap(long, default_value = "report")]
    report_queue: String,
    /// The root directory of autograder scripts.
    #[clap(long)]
    autograder_dir: PathBuf,
    /// The base directory for per-submission scratch directories.
    #[clap(long, default_value = "/tmp")]
    scratch_dir: PathBuf,
    /// The path to the sandbox binary.
    #[clap(long, default_value = "/usr/local/bin/nsjail")]
    sandbox_path: PathBuf,
    /// The path to the python binary.
    #[clap(long, default_value = "/usr/bin/python3")]
    python_path: PathBuf,
    /// Do not delete scratch directories after grading.
    #[clap(long)]
    disable_cleanup: bool,
    /// Wipe pre-existing scratch directories instead of failing.
    #[clap(long)]
    auto_remove: bool,
    /// Include raw runner logs in rendered reports.
    #[clap(long)]
    include_logs: bool,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let autograder_dir = if args.autograder_dir.is_absolute() {
        args.autograder_dir.clone()
    } else {
        std::env::current_dir()
            .context("error reading working directory")?
            .join(&args.autograder_dir)
    };
    let mut grader = Autograder::new(
        autograder_dir,
        &args.scratch_dir,
        &args.sandbox_path,
        &args.python_path,
    );
    grader.disable_cleanup = args.disable_cleanup;
    grader.auto_remove = args.auto_remove;
    grader.include_logs = args.include_logs;

    let mut channel = Channel::open_with_backoff(&args.queue_spec, Duration::from_secs(60))
        .with_context(|| format!("error opening queue {:?}", args.queue_spec))?;
    log::info!("listening on the queue {:?}", args.autograde_queue);

    loop {
        let message = match channel.receive(&args.autograde_queue) {
            Ok(message) => message,
            Err(err) => {
                log::error!("error receiving from queue: {err}");
                std::thread::sleep(Duration::from_secs(1));
                continue;
            }
        };
        log::info!("worker received {} bytes", message.len());

        let report = match grader.grade(&message) {
            Ok(report) => report,
            Err(err) => {
                let submission_id = err.submission_id().map(str::to_string);
                let chain = format!("{:#}", anyhow::Error::new(err));
                log::error!("{chain}");
                let Some(submission_id) = submission_id else {
                    // without an id there is no report URL waiting on this
                    continue;
                };
                match error_report(&submission_id, &chain) {
                    Ok(report) => report,
                    Err(err) => {
                        log::error!("error building error report: {err}");
                        continue;
                    }
                }
            }
        };
        if let Err(err) = channel.post(&args.report_queue, &report) {
            log::error!(
                "error posting {} byte report to queue {:?}: {err}",
                report.len(),
                args.report_queue
            );
        }
    }
}

// A synthetic report so the waiting browser receives feedback instead of
// polling forever.
fn error_report(submission_id: &str, message: &str) -> serde_json::Result<Vec<u8>> {
    let escaped = message
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;");
    serde_json::to_vec_pretty(&serde_json::json!({
        "submission_id": submission_id,
        "grading_error": {
            "report": format!(
                "\n<h2 style='color: red'>Checker Error</h2>\n<pre>{escaped}</pre>"
            ),
        },
    }))
}
