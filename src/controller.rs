//! Running transfers for tracked zones.
//!
//! A [`ZoneRunner`] drives one IXFR per zone through the decoder, hands the
//! change events to the configured sinks, and updates the zone's state
//! depending on the outcome.

use std::fmt;
use std::path::PathBuf;

use domain::base::Name;
use tracing::{error, info, warn};

use crate::sink::{LogWriter, Publisher, SinkError};
use crate::state::{StateFile, ZoneState};
use crate::xfr::{Connect, DecodeError, Error, Transfer, TransferSource};

//------------ ZoneOutcome ----------------------------------------------------

/// What running a transfer for a zone resulted in.
#[derive(Debug)]
pub enum ZoneOutcome {
    /// The zone is still at the given serial.
    Unchanged(u32),

    /// Changes up to `serial` were captured.
    Updated {
        serial: u32,
        changes: usize,

        /// The name of the diff log unless logging is disabled.
        filename: Option<String>,
    },

    /// The serial advanced but nothing was captured.
    Empty(u32),

    /// The server sent the full zone. The state was moved to its serial
    /// without capturing any changes.
    FastForward(u32),

    /// The transfer failed. The state was left alone.
    Failed(RunError),
}

impl ZoneOutcome {
    /// Returns whether the run produced a confirmed result.
    pub fn is_success(&self) -> bool {
        matches!(self, ZoneOutcome::Unchanged(_) | ZoneOutcome::Updated { .. })
    }
}

impl fmt::Display for ZoneOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ZoneOutcome::Unchanged(serial) => {
                write!(f, "no changes, serial {serial}")
            }
            ZoneOutcome::Updated {
                serial, changes, ..
            } => write!(f, "{changes} changes, serial {serial}"),
            ZoneOutcome::Empty(serial) => {
                write!(f, "no changes captured, serial {serial}")
            }
            ZoneOutcome::FastForward(serial) => {
                write!(f, "fast forward to serial {serial}")
            }
            ZoneOutcome::Failed(err) => write!(f, "failed: {err}"),
        }
    }
}

//------------ RunSummary -----------------------------------------------------

/// The outcomes of running all zones.
#[derive(Debug, Default)]
pub struct RunSummary {
    pub outcomes: Vec<(String, ZoneOutcome)>,
}

impl RunSummary {
    /// Returns whether every zone produced a confirmed result.
    pub fn is_success(&self) -> bool {
        self.outcomes.iter().all(|(_, outcome)| outcome.is_success())
    }

    pub fn get(&self, zone: &str) -> Option<&ZoneOutcome> {
        self.outcomes
            .iter()
            .find(|(name, _)| name == zone)
            .map(|(_, outcome)| outcome)
    }
}

//------------ ZoneRunner -----------------------------------------------------

/// Runs transfers and routes their changes to the configured sinks.
pub struct ZoneRunner<C, P> {
    connector: C,

    /// The directory diff logs are written to, if logging is enabled.
    log_dir: Option<PathBuf>,

    publisher: Option<P>,

    /// A name server to use instead of the one stored for each zone.
    nameserver: Option<String>,
}

impl<C: Connect, P: Publisher> ZoneRunner<C, P> {
    pub fn new(connector: C) -> Self {
        ZoneRunner {
            connector,
            log_dir: None,
            publisher: None,
            nameserver: None,
        }
    }

    /// Enables writing diff logs to `dir`.
    pub fn with_log_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.log_dir = Some(dir.into());
        self
    }

    /// Enables publishing changes.
    pub fn with_publisher(mut self, publisher: P) -> Self {
        self.publisher = Some(publisher);
        self
    }

    /// Uses `nameserver` for all zones.
    pub fn with_nameserver(mut self, nameserver: impl Into<String>) -> Self {
        self.nameserver = Some(nameserver.into());
        self
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    /// Takes back the publisher, e.g., to disconnect it.
    pub fn into_publisher(self) -> Option<P> {
        self.publisher
    }

    /// Runs a transfer for every zone in `state`.
    ///
    /// Zones are processed one after another. A failing zone doesn't stop
    /// the others.
    pub async fn run_all(&mut self, state: &mut StateFile) -> RunSummary {
        let mut summary = RunSummary::default();
        for (zone, zone_state) in state.iter_mut() {
            let outcome = self.run_zone(zone, zone_state).await;
            summary.outcomes.push((zone.clone(), outcome));
        }
        summary
    }

    /// Runs a transfer for one zone and updates its state.
    pub async fn run_zone(
        &mut self,
        zone: &str,
        state: &mut ZoneState,
    ) -> ZoneOutcome {
        let last_serial = state.serial;
        match self.transfer(zone, state).await {
            Ok(TransferOutcome { serial, .. }) if serial == last_serial => {
                info!("No changes for zone {zone} serial {serial}");
                ZoneOutcome::Unchanged(serial)
            }
            Ok(TransferOutcome {
                serial,
                changes,
                filename,
            }) => {
                let logged = self.log_dir.is_none() || filename.is_some();
                if changes == 0 || !logged {
                    warn!("Serial of zone {zone} advanced to {serial} without changes");
                    state.serial = serial;
                    ZoneOutcome::Empty(serial)
                } else {
                    info!("Logged {changes} changes for zone {zone} serial {serial}");
                    state.serial = serial;
                    if filename.is_some() {
                        state.filename.clone_from(&filename);
                    }
                    ZoneOutcome::Updated {
                        serial,
                        changes,
                        filename,
                    }
                }
            }
            Err(RunError::Transfer(Error::Decode(
                DecodeError::NotIncremental(serial),
            ))) => {
                warn!("IXFR not available for zone {zone}, fast forward to serial {serial}");
                state.serial = serial;
                ZoneOutcome::FastForward(serial)
            }
            Err(err) => {
                error!("Transfer of zone {zone} failed: {err}");
                ZoneOutcome::Failed(err)
            }
        }
    }

    /// Fetches and decodes the transfer, feeding the sinks.
    async fn transfer(
        &mut self,
        zone: &str,
        state: &ZoneState,
    ) -> Result<TransferOutcome, RunError> {
        let origin = Name::vec_from_str(zone)
            .map_err(|_| RunError::InvalidZone(zone.into()))?;
        let nameserver = self.nameserver.as_deref().unwrap_or(&state.nameserver);
        let source = self
            .connector
            .connect(nameserver, &origin, state.serial)
            .await
            .map_err(|err| RunError::Transfer(err.into()))?;

        // The temporary log is removed on every early return.
        let mut writer = match &self.log_dir {
            Some(dir) => Some(LogWriter::create(dir)?),
            None => None,
        };
        let mut transfer = Transfer::new(source, zone, state.serial);
        self.feed(zone, &mut transfer, writer.as_mut()).await?;

        let result = transfer.result();
        let serial = result.final_serial.unwrap_or(state.serial);
        let filename = match writer {
            Some(writer) if serial != state.serial && result.changes > 0 => {
                writer.commit(zone, serial)?
            }
            _ => None,
        };
        Ok(TransferOutcome {
            serial,
            changes: result.changes,
            filename,
        })
    }

    /// Passes all events of the transfer to the sinks.
    async fn feed<S: TransferSource>(
        &mut self,
        zone: &str,
        transfer: &mut Transfer<S>,
        mut writer: Option<&mut LogWriter>,
    ) -> Result<(), RunError> {
        while let Some(event) = transfer.next_event().await? {
            if let Some(writer) = writer.as_mut() {
                writer.write(&event)?;
            }
            if let Some(publisher) = self.publisher.as_mut() {
                publisher.publish(zone, &event).await?;
            }
        }
        Ok(())
    }
}

//------------ TransferOutcome ------------------------------------------------

/// The result of a transfer that went through.
struct TransferOutcome {
    serial: u32,
    changes: usize,
    filename: Option<String>,
}

//------------ RunError -------------------------------------------------------

/// Running the transfer for a zone failed.
#[derive(Debug)]
pub enum RunError {
    /// The zone name is not a valid domain name.
    InvalidZone(String),

    /// Fetching or decoding the transfer failed.
    Transfer(Error),

    /// Handing a change to a sink failed.
    Sink(SinkError),
}

impl fmt::Display for RunError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunError::InvalidZone(zone) => {
                write!(f, "invalid zone name '{zone}'")
            }
            RunError::Transfer(err) => err.fmt(f),
            RunError::Sink(err) => err.fmt(f),
        }
    }
}

impl std::error::Error for RunError {}

impl From<Error> for RunError {
    fn from(err: Error) -> Self {
        RunError::Transfer(err)
    }
}

impl From<SinkError> for RunError {
    fn from(err: SinkError) -> Self {
        RunError::Sink(err)
    }
}
