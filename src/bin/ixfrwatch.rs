//! Report changes of watched names found in diff logs.
//!
//! Usage: ixfrwatch --log FILE [--log FILE...] [--watch FILE]
//!                  [--report FILE] [--debug]
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::Parser;
use tracing::{debug, error, info};

use ixfrlog::logging::init_logging;
use ixfrlog::watch::{LogReader, Reconciler, Report, WatchConfig};

#[derive(Parser)]
#[command(
    name = "ixfrwatch",
    version,
    about = "Report the net changes of watched names in IXFR diff logs"
)]
struct Args {
    /// Diff log to read, optionally gzip compressed.
    ///
    /// May be given more than once. Logs are replayed in the given order.
    #[arg(long, value_name = "FILE", required = true)]
    log: Vec<PathBuf>,

    /// Watch list mapping names to recipients.
    #[arg(long, value_name = "FILE", default_value = "watchlist.json")]
    watch: PathBuf,

    /// File to write the report to, or "-" for standard output.
    #[arg(long, value_name = "FILE", default_value = "report.json")]
    report: PathBuf,

    /// Enable debug logging.
    #[arg(long)]
    debug: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.debug);

    let watch = match WatchConfig::load(&args.watch) {
        Ok(watch) => watch,
        Err(err) => {
            error!("Cannot load {}: {err}", args.watch.display());
            return ExitCode::FAILURE;
        }
    };
    debug!("Watching {} names", watch.len());

    let report = match replay(&args.log, &watch) {
        Ok(report) => report,
        Err(err) => {
            error!("{err}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(err) = write_report(&args.report, &report) {
        error!("Cannot write {}: {err}", args.report.display());
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}

/// Replays all logs in order.
fn replay(logs: &[PathBuf], watch: &WatchConfig) -> Result<Report, String> {
    let mut reconciler = Reconciler::new(watch);
    for path in logs {
        let mut count = 0usize;
        let reader = LogReader::open(path)
            .map_err(|err| format!("{}: {err}", path.display()))?;
        for event in reader {
            let event =
                event.map_err(|err| format!("{}: {err}", path.display()))?;
            reconciler.apply(&event);
            count += 1;
        }
        info!("Read {count} changes from {}", path.display());
    }
    Ok(reconciler.report())
}

fn write_report(path: &Path, report: &Report) -> io::Result<()> {
    if path.as_os_str() == "-" {
        let stdout = io::stdout();
        let mut out = stdout.lock();
        write!(out, "{report}")?;
        return out.flush();
    }
    let mut out = BufWriter::new(File::create(path)?);
    write!(out, "{report}")?;
    out.flush()
}
