//! Destinations for change events.
//!
//! Change events go to the diff log, a file of newline delimited JSON
//! written by [`LogWriter`], and optionally to a [`Publisher`] such as
//! [`MqttPublisher`].

use core::future::Future;
use core::time::Duration;

use std::fmt;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use rumqttc::{AsyncClient, Event, MqttOptions, Outgoing, QoS};
use tempfile::NamedTempFile;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::event::ChangeEvent;
use crate::state::artifact_name;

/// Prefix of the temporary files the diff log is written to.
const TEMPFILE_PREFIX: &str = "ixfrlog.";

/// The topic prefix events are published under.
pub const TOPIC_PREFIX: &str = "ixfrlog";

/// The port MQTT brokers listen on unless told otherwise.
pub const MQTT_DEFAULT_PORT: u16 = 1883;

//------------ LogWriter ------------------------------------------------------

/// Writes the diff log of one transfer.
///
/// Events are written to a temporary file which only becomes visible under
/// its final name through [`commit()`]. Dropping the writer without
/// committing removes the temporary file.
///
/// [`commit()`]: LogWriter::commit()
pub struct LogWriter {
    dir: PathBuf,
    file: BufWriter<NamedTempFile>,
    written: usize,
}

impl LogWriter {
    /// Creates a temporary log file in `dir`.
    pub fn create(dir: impl AsRef<Path>) -> Result<Self, SinkError> {
        let dir = dir.as_ref();
        let file = tempfile::Builder::new()
            .prefix(TEMPFILE_PREFIX)
            .suffix(".tmp")
            .tempfile_in(dir)?;
        trace!("Writing diff log to {}", file.path().display());
        Ok(LogWriter {
            dir: dir.into(),
            file: BufWriter::new(file),
            written: 0,
        })
    }

    /// Appends an event to the log.
    pub fn write(&mut self, event: &ChangeEvent) -> Result<(), SinkError> {
        serde_json::to_writer(&mut self.file, event)?;
        self.file.write_all(b"\n")?;
        self.written += 1;
        Ok(())
    }

    /// The number of events written so far.
    pub fn written(&self) -> usize {
        self.written
    }

    /// Makes the log visible under its final name.
    ///
    /// The name is derived from the zone and the serial reached. If nothing
    /// was written, the temporary file is removed and `None` returned.
    pub fn commit(
        self,
        zone: &str,
        serial: u32,
    ) -> Result<Option<String>, SinkError> {
        let file = self.file.into_inner().map_err(|err| err.into_error())?;
        if file.as_file().metadata()?.len() == 0 {
            debug!("Discarding empty diff log for zone {zone}");
            return Ok(None);
        }
        file.as_file().sync_all()?;
        let filename = artifact_name(zone, serial);
        file.persist(self.dir.join(&filename))
            .map_err(|err| SinkError::Io(err.error))?;
        Ok(Some(filename))
    }
}

//------------ Publisher ------------------------------------------------------

/// A receiver of change events for a zone.
pub trait Publisher {
    /// Publishes a change of `zone`.
    fn publish(
        &mut self,
        zone: &str,
        event: &ChangeEvent,
    ) -> impl Future<Output = Result<(), SinkError>> + Send;
}

//------------ MqttPublisher --------------------------------------------------

/// Publishes change events to an MQTT broker.
///
/// Each event goes to the topic `ixfrlog/<zone>` as a JSON object.
pub struct MqttPublisher {
    client: AsyncClient,
    eventloop: JoinHandle<()>,
}

impl MqttPublisher {
    /// Connects to the broker at `endpoint`.
    ///
    /// The endpoint is given as `mqtt://host[:port]` or `host[:port]`.
    /// Must be called from within a Tokio runtime.
    pub fn connect(endpoint: &str) -> Result<Self, SinkError> {
        let (host, port) = broker_addr(endpoint)?;
        let client_id = format!("ixfrlog-{}", std::process::id());
        let mut options = MqttOptions::new(client_id, host, port);
        options.set_keep_alive(Duration::from_secs(30));

        let (client, mut eventloop) = AsyncClient::new(options, 64);
        let eventloop = tokio::spawn(async move {
            loop {
                match eventloop.poll().await {
                    Ok(Event::Outgoing(Outgoing::Disconnect)) => break,
                    Ok(event) => trace!("MQTT {event:?}"),
                    Err(err) => {
                        warn!("MQTT connection failed: {err}");
                        break;
                    }
                }
            }
        });
        Ok(MqttPublisher { client, eventloop })
    }

    /// Disconnects from the broker once everything has been sent.
    pub async fn disconnect(self) {
        if let Err(err) = self.client.disconnect().await {
            debug!("MQTT disconnect: {err}");
        }
        if tokio::time::timeout(Duration::from_secs(5), self.eventloop)
            .await
            .is_err()
        {
            warn!("MQTT disconnect timed out");
        }
    }
}

impl Publisher for MqttPublisher {
    async fn publish(
        &mut self,
        zone: &str,
        event: &ChangeEvent,
    ) -> Result<(), SinkError> {
        let payload = serde_json::to_vec(&event.published())?;
        self.client
            .publish(topic(zone), QoS::AtLeastOnce, false, payload)
            .await
            .map_err(|err| SinkError::Publish(err.to_string()))
    }
}

//------------ Helper functions -----------------------------------------------

/// Returns the topic changes of `zone` are published under.
pub fn topic(zone: &str) -> String {
    format!("{TOPIC_PREFIX}/{zone}")
}

/// Splits an MQTT endpoint into host and port.
fn broker_addr(endpoint: &str) -> Result<(String, u16), SinkError> {
    let addr = endpoint
        .strip_prefix("mqtt://")
        .or_else(|| endpoint.strip_prefix("tcp://"))
        .unwrap_or(endpoint)
        .trim_end_matches('/');
    let (host, port) = match addr.rsplit_once(':') {
        Some((host, port)) if !host.ends_with(':') => {
            let port = port
                .parse()
                .map_err(|_| SinkError::Endpoint(endpoint.into()))?;
            (host, port)
        }
        _ => (addr, MQTT_DEFAULT_PORT),
    };
    let host = host.trim_start_matches('[').trim_end_matches(']');
    if host.is_empty() {
        return Err(SinkError::Endpoint(endpoint.into()));
    }
    Ok((host.into(), port))
}

//------------ SinkError ------------------------------------------------------

/// Writing or publishing a change event failed.
#[derive(Debug)]
pub enum SinkError {
    Io(io::Error),
    Json(serde_json::Error),

    /// The broker endpoint can't be parsed.
    Endpoint(String),

    /// Handing the event to the broker client failed.
    Publish(String),
}

impl fmt::Display for SinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SinkError::Io(err) => write!(f, "writing diff log failed: {err}"),
            SinkError::Json(err) => {
                write!(f, "serializing change failed: {err}")
            }
            SinkError::Endpoint(endpoint) => {
                write!(f, "invalid MQTT endpoint '{endpoint}'")
            }
            SinkError::Publish(err) => write!(f, "publishing failed: {err}"),
        }
    }
}

impl std::error::Error for SinkError {}

impl From<io::Error> for SinkError {
    fn from(err: io::Error) -> Self {
        SinkError::Io(err)
    }
}

impl From<serde_json::Error> for SinkError {
    fn from(err: serde_json::Error) -> Self {
        SinkError::Json(err)
    }
}

//============ Tests =========================================================
