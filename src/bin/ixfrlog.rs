//! Fetch incremental zone transfers and log their changes.
//!
//! Usage: ixfrlog [--state FILE] [--mqtt URL] [--nameserver ADDR]
//!                [--log-dir DIR | --no-log] [--debug] [ZONE...]
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};

use ixfrlog::controller::ZoneRunner;
use ixfrlog::logging::init_logging;
use ixfrlog::sink::MqttPublisher;
use ixfrlog::state::StateFile;
use ixfrlog::xfr::TcpConnector;

#[derive(Parser)]
#[command(
    name = "ixfrlog",
    version,
    about = "Log the changes of DNS zones via incremental zone transfers"
)]
struct Args {
    /// File the per-zone tracking state is kept in.
    #[arg(long, value_name = "FILE", default_value = "ixfrlog.state")]
    state: PathBuf,

    /// MQTT broker to publish changes to, e.g. mqtt://localhost:1883.
    #[arg(long, value_name = "URL")]
    mqtt: Option<String>,

    /// Name server to request transfers from.
    ///
    /// Used for all zones of this run. Stored for zones tracked for the
    /// first time.
    #[arg(long, value_name = "ADDR")]
    nameserver: Option<String>,

    /// Directory to write the diff logs to.
    #[arg(long, value_name = "DIR", default_value = ".")]
    log_dir: PathBuf,

    /// Don't write diff logs.
    #[arg(long)]
    no_log: bool,

    /// Enable debug logging.
    #[arg(long)]
    debug: bool,

    /// Zones to start tracking.
    #[arg(value_name = "ZONE")]
    zones: Vec<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.debug);

    let mut state = match StateFile::load(&args.state) {
        Ok(state) => state,
        Err(err) => {
            error!("Cannot load {}: {err}", args.state.display());
            return ExitCode::FAILURE;
        }
    };
    for zone in &args.zones {
        match state.seed(zone, args.nameserver.as_deref()) {
            Ok(true) => info!("Tracking zone {zone}"),
            Ok(false) => {}
            Err(err) => {
                error!("{err}");
                return ExitCode::FAILURE;
            }
        }
    }
    if state.is_empty() {
        error!("No zones to track");
        return ExitCode::FAILURE;
    }

    let mut runner = ZoneRunner::new(TcpConnector);
    if !args.no_log {
        runner = runner.with_log_dir(&args.log_dir);
    }
    if let Some(nameserver) = &args.nameserver {
        runner = runner.with_nameserver(nameserver);
    }
    if let Some(endpoint) = &args.mqtt {
        match MqttPublisher::connect(endpoint) {
            Ok(publisher) => runner = runner.with_publisher(publisher),
            Err(err) => {
                error!("{err}");
                return ExitCode::FAILURE;
            }
        }
    }

    let summary = runner.run_all(&mut state).await;
    if let Some(publisher) = runner.into_publisher() {
        publisher.disconnect().await;
    }

    if let Err(err) = state.save(&args.state) {
        error!("Cannot save {}: {err}", args.state.display());
        return ExitCode::FAILURE;
    }

    for (zone, outcome) in &summary.outcomes {
        info!("{zone}: {outcome}");
    }
    if summary.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
