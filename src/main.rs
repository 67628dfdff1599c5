mod metric;
mod scan;
mod sources;

use clap::Parser;
use metric::{Accumulator, MetricSpec};
use std::fmt::Write as _;
use std::path::PathBuf;
use std::process::ExitCode;

/// Extract numeric metric values from a log file (and optionally its rotated
/// .gz archives) and print one monitoring-friendly line per metric:
/// `<prefix>.<name> <value> <timestamp>`.
#[derive(Parser, Debug)]
#[command(name = "logfile-values", version, about)]
struct Cli {
    /// Metrics to extract, as `name:column[:function[:period]]`
    /// (function: mean, median, sum, min, max, count, last; period: e.g. 5m)
    #[arg(long = "metric", value_name = "SPEC", required = true, num_args = 1..)]
    metrics: Vec<MetricSpec>,

    /// Prefix for every output line
    #[arg(long, default_value = "logfile_values")]
    prefix: String,

    /// Log file to scan
    #[arg(long, default_value = "/var/log/messages")]
    file: PathBuf,

    /// strftime-style format of the leading timestamp field
    #[arg(long, default_value = "%Y-%m-%dT%H:%M:%S")]
    time_format: String,

    /// Also scan rotated archives (`<file>.<N>.gz`) in the same directory
    #[arg(long)]
    arch: bool,

    /// Extra logging (per-source scan results)
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_max_level(if cli.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::WARN
        })
        .init();

    match run(&cli) {
        Ok(report) => {
            print!("{report}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("logfile-values: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Scan every source for every metric and render the full report.
///
/// The report is built in memory and printed in one piece by the caller, so a
/// failure on any metric produces no partial output. Each metric performs its
/// own full pass over the live file and then over each archive; the archives
/// come last, so the accumulator's last-line field ends up reflecting the
/// last archive scanned rather than the live file.
fn run(cli: &Cli) -> Result<String, RunError> {
    let now = chrono::Local::now().timestamp();

    let archives = if cli.arch {
        sources::find_archives(&cli.file)?
    } else {
        Vec::new()
    };

    let mut report = String::new();
    for spec in &cli.metrics {
        let mut acc = Accumulator::default();

        let lines = sources::live_lines(&cli.file)?;
        acc.absorb(scan::scan_source(spec, lines, &cli.time_format, now)?);
        tracing::debug!(
            metric = spec.name(),
            file = %cli.file.display(),
            values = acc.values.len(),
            "scanned live file"
        );

        for archive in &archives {
            let lines = sources::archive_lines(archive)?;
            acc.absorb(scan::scan_source(spec, lines, &cli.time_format, now)?);
            tracing::debug!(
                metric = spec.name(),
                archive = %archive.display(),
                values = acc.values.len(),
                "scanned archive"
            );
        }

        let value = spec.evaluate(&acc)?;
        // f64 Display drops a trailing .0, so integers print bare and the
        // even-median fraction survives (2.5 prints as "2.5").
        let _ = writeln!(report, "{}.{} {} {}", cli.prefix, spec.name(), value, now);
    }
    Ok(report)
}

#[derive(Debug)]
enum RunError {
    Io(std::io::Error),
    Scan(scan::ScanError),
    Eval(metric::EvalError),
}

impl std::fmt::Display for RunError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunError::Io(e) => write!(f, "I/O error: {e}"),
            RunError::Scan(e) => write!(f, "scan failed: {e}"),
            RunError::Eval(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for RunError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RunError::Io(e) => Some(e),
            RunError::Scan(e) => Some(e),
            RunError::Eval(e) => Some(e),
        }
    }
}

impl From<std::io::Error> for RunError {
    fn from(e: std::io::Error) -> Self {
        RunError::Io(e)
    }
}

impl From<scan::ScanError> for RunError {
    fn from(e: scan::ScanError) -> Self {
        RunError::Scan(e)
    }
}

impl From<metric::EvalError> for RunError {
    fn from(e: metric::EvalError) -> Self {
        RunError::Eval(e)
    }
}
