//! Change events produced by decoding a transfer.
//!
//! A [`ChangeEvent`] describes one record set that was added to or deleted
//! from a zone. Events are written as newline delimited JSON to the diff
//! log and published to the broker, and they are the input to the watch
//! reconciliation at report time.

use serde::{Deserialize, Serialize};

use crate::xfr::Rrset;

//------------ ChangeEvent ----------------------------------------------------

/// A record set added to or deleted from a zone.
///
/// The serialized field names are those of the diff log format.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct ChangeEvent {
    /// The serial the change belongs to.
    ///
    /// For additions this is the serial reached by the change, for
    /// deletions the serial of the version being left.
    pub serial: u32,

    /// Whether the record set was deleted rather than added.
    pub deleted: bool,

    /// The absolute owner name with a trailing dot.
    #[serde(rename = "name")]
    pub owner: String,

    pub ttl: u32,

    #[serde(rename = "rdclass")]
    pub class: String,

    #[serde(rename = "rdtype")]
    pub rtype: String,

    /// The data of each record in the set in presentation format.
    pub rdata: Vec<String>,

    /// The record set in presentation format, one record per line.
    ///
    /// Published messages don't carry this field.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub text: String,
}

impl ChangeEvent {
    /// Creates an event for a record set.
    pub fn new(serial: u32, deleted: bool, rrset: &Rrset) -> Self {
        ChangeEvent {
            serial,
            deleted,
            owner: rrset.owner_fqdn(),
            ttl: rrset.ttl().as_secs(),
            class: rrset.class().to_string(),
            rtype: rrset.rtype().to_string(),
            rdata: rrset.rdata_text(),
            text: rrset.to_string(),
        }
    }

    /// Returns the label used for the change in log output.
    pub fn action(&self) -> &'static str {
        if self.deleted {
            "DEL"
        } else {
            "ADD"
        }
    }

    /// Returns the texts identifying the values of the individual records.
    ///
    /// These are the lines of the presentation text, one per record.
    /// Events that lack it, such as those received from the broker, have
    /// them rebuilt from the structured fields.
    pub fn keys(&self) -> Vec<String> {
        if !self.text.is_empty() {
            return self.text.lines().map(Into::into).collect();
        }
        self.rdata
            .iter()
            .map(|rdata| {
                format!(
                    "{} {} {} {} {}",
                    self.owner, self.ttl, self.class, self.rtype, rdata
                )
            })
            .collect()
    }

    /// Returns the shape of the event published to the broker.
    pub fn published(&self) -> PublishedChange<'_> {
        PublishedChange {
            serial: self.serial,
            deleted: self.deleted,
            name: &self.owner,
            ttl: self.ttl,
            rdclass: &self.class,
            rdtype: &self.rtype,
            rdata: &self.rdata,
        }
    }
}

//------------ PublishedChange ------------------------------------------------

/// A change event as published to the broker.
///
/// This is the log line without the presentation text.
#[derive(Clone, Copy, Debug, Serialize)]
pub struct PublishedChange<'a> {
    pub serial: u32,
    pub deleted: bool,
    pub name: &'a str,
    pub ttl: u32,
    pub rdclass: &'a str,
    pub rdtype: &'a str,
    pub rdata: &'a [String],
}

//------------ TransferResult -------------------------------------------------

/// The summary of decoding one transfer.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct TransferResult {
    /// The serial reached or `None` if the transfer was rejected.
    pub final_serial: Option<u32>,

    /// The number of change events emitted.
    pub changes: usize,
}

//============ Tests =========================================================
