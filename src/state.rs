//! Persisted per-zone tracking state.
//!
//! The state file is a JSON object with one entry per tracked zone:
//!
//! ```text
//! { "example.com.": { "nameserver": "192.0.2.53", "serial": 2024010101,
//!                     "filename": "example.com-2024010101.log" } }
//! ```
//!
//! Zones are keyed by their dot-terminated name. Keys without the trailing
//! dot are accepted when loading and stored in canonical form.

use std::collections::BTreeMap;
use std::fmt;
use std::fs::File;
use std::io::{self, BufReader, Write};
use std::path::Path;

use domain::base::Name;
use serde::{Deserialize, Serialize};
use tracing::debug;

//------------ ZoneState ------------------------------------------------------

/// The tracking state of one zone.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct ZoneState {
    /// The name server to request transfers from.
    pub nameserver: String,

    /// The last serial seen.
    ///
    /// Zero means no transfer has happened yet.
    #[serde(default)]
    pub serial: u32,

    /// The name of the most recent non-empty diff log.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
}

impl ZoneState {
    pub fn new(nameserver: impl Into<String>) -> Self {
        ZoneState {
            nameserver: nameserver.into(),
            serial: 0,
            filename: None,
        }
    }
}

//------------ StateFile ------------------------------------------------------

/// The tracking state of all zones.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct StateFile {
    zones: BTreeMap<String, ZoneState>,
}

impl StateFile {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads the state from `path`.
    ///
    /// A missing file results in empty state. Anything that can't be
    /// parsed is an error.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, StateError> {
        let path = path.as_ref();
        let file = match File::open(path) {
            Ok(file) => file,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                debug!("No state file at {}", path.display());
                return Ok(Self::new());
            }
            Err(err) => return Err(StateError::Io(err)),
        };
        let raw: BTreeMap<String, ZoneState> =
            serde_json::from_reader(BufReader::new(file))?;
        let mut res = Self::new();
        for (zone, state) in raw {
            let key = zone_key(&zone)?;
            if res.zones.insert(key.clone(), state).is_some() {
                return Err(StateError::DuplicateZone(key));
            }
        }
        Ok(res)
    }

    /// Writes the state to `path`.
    ///
    /// The file is replaced atomically.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), StateError> {
        let path = path.as_ref();
        let dir = match path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };
        let mut tmp = tempfile::Builder::new()
            .prefix("ixfrlog.")
            .suffix(".state")
            .tempfile_in(dir)?;
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut ser =
            serde_json::Serializer::with_formatter(&mut tmp, formatter);
        self.zones.serialize(&mut ser)?;
        tmp.write_all(b"\n")?;
        tmp.as_file().sync_all()?;
        tmp.persist(path).map_err(|err| StateError::Io(err.error))?;
        Ok(())
    }

    /// Starts tracking `zone` unless it is tracked already.
    ///
    /// Returns whether the zone was added.
    pub fn seed(
        &mut self,
        zone: &str,
        nameserver: Option<&str>,
    ) -> Result<bool, StateError> {
        let key = zone_key(zone)?;
        if self.zones.contains_key(&key) {
            return Ok(false);
        }
        let nameserver =
            nameserver.ok_or_else(|| StateError::NoNameserver(key.clone()))?;
        self.zones.insert(key, ZoneState::new(nameserver));
        Ok(true)
    }

    pub fn get(&self, zone: &str) -> Option<&ZoneState> {
        self.zones.get(zone)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ZoneState)> {
        self.zones.iter()
    }

    pub fn iter_mut(
        &mut self,
    ) -> impl Iterator<Item = (&String, &mut ZoneState)> {
        self.zones.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.zones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.zones.is_empty()
    }
}

//------------ Helper functions -----------------------------------------------

/// Returns the canonical key for a zone name: the name with a trailing dot.
pub fn zone_key(zone: &str) -> Result<String, StateError> {
    Name::vec_from_str(zone)
        .map_err(|_| StateError::InvalidZone(zone.into()))?;
    let mut res = zone.to_string();
    if !res.ends_with('.') {
        res.push('.');
    }
    Ok(res)
}

/// Returns the diff log file name for a zone at a serial.
pub fn artifact_name(zone: &str, serial: u32) -> String {
    format!("{}-{}.log", zone.trim_end_matches('.'), serial)
}

//------------ StateError -----------------------------------------------------

/// Loading or saving the state failed.
#[derive(Debug)]
pub enum StateError {
    Io(io::Error),

    /// The state file is not valid.
    Json(serde_json::Error),

    /// A zone name is not a valid domain name.
    InvalidZone(String),

    /// A zone is listed twice, once with and once without trailing dot.
    DuplicateZone(String),

    /// A zone to track was given without a name server.
    NoNameserver(String),
}

impl fmt::Display for StateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StateError::Io(err) => write!(f, "state file: {err}"),
            StateError::Json(err) => write!(f, "malformed state file: {err}"),
            StateError::InvalidZone(zone) => {
                write!(f, "invalid zone name '{zone}'")
            }
            StateError::DuplicateZone(zone) => {
                write!(f, "zone '{zone}' listed twice in state file")
            }
            StateError::NoNameserver(zone) => {
                write!(f, "no name server given for zone '{zone}'")
            }
        }
    }
}

impl std::error::Error for StateError {}

impl From<io::Error> for StateError {
    fn from(err: io::Error) -> Self {
        StateError::Io(err)
    }
}

impl From<serde_json::Error> for StateError {
    fn from(err: serde_json::Error) -> Self {
        StateError::Json(err)
    }
}

//============ Tests =========================================================
