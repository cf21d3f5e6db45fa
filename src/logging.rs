use tracing::Level;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

/// Setup logging for the command line tools.
///
/// Logs at INFO level, or at DEBUG level if `debug` is set. Use the
/// RUST_LOG environment variable to override the defaults.
///
/// E.g. to see the individual changes of every transfer:
///   RUST_LOG=ixfrlog::xfr=DEBUG
///
/// Or to also see the MQTT traffic:
///   RUST_LOG=DEBUG,ixfrlog::sink=TRACE
pub fn init_logging(debug: bool) {
    let level = if debug { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::from_level(level).into())
        .from_env_lossy();
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .ok();
}
