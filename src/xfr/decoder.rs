use domain::base::Rtype;
use tracing::{debug, trace};

use crate::event::{ChangeEvent, TransferResult};

use super::rrset::Rrset;
use super::types::{DecodeError, DecoderState};

//------------ IGNORED_RTYPES -------------------------------------------------

/// Record types that never represent a change of their own.
///
/// SOA records mark diff boundaries and DNSSEC denial and signature records
/// follow from the other changes.
const IGNORED_RTYPES: &[Rtype] =
    &[Rtype::SOA, Rtype::NSEC, Rtype::NSEC3, Rtype::RRSIG];

//------------ IxfrDecoder ----------------------------------------------------

/// Turns the record sets of an IXFR response sequence into change events.
///
/// # Usage
///
/// Create a decoder for the zone and the serial the transfer was requested
/// for, then pass every record set of every response message in order to
/// [`process()`]. Once the source has no more messages, [`finish()`]
/// returns the summary of the transfer.
///
/// Whether a block of records is being added or deleted isn't tagged in
/// the response. It follows from the SOA preceding the block: if the serial
/// did not advance, the block holds deletions from the version being left,
/// otherwise it holds the additions bringing the zone to the new serial.
///
/// [`process()`]: IxfrDecoder::process()
/// [`finish()`]: IxfrDecoder::finish()
#[derive(Clone, Debug)]
pub struct IxfrDecoder {
    /// The zone being transferred.
    origin: String,

    /// The serial the current block belongs to.
    serial: u32,

    /// The decoding state.
    state: DecoderState,

    /// The number of change events emitted so far.
    changes: usize,

    /// Set when the transfer turned out not to be incremental.
    rejected: bool,
}

impl IxfrDecoder {
    /// Creates a decoder for a transfer started from `start_serial`.
    pub fn new(origin: impl Into<String>, start_serial: u32) -> Self {
        IxfrDecoder {
            origin: origin.into(),
            serial: start_serial,
            state: DecoderState::AwaitingFirstSoa,
            changes: 0,
            rejected: false,
        }
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn state(&self) -> DecoderState {
        self.state
    }

    /// The serial of the block currently being decoded.
    pub fn serial(&self) -> u32 {
        self.serial
    }

    /// Process a single record set.
    ///
    /// Returns the change event for the set, if it represents a change.
    pub fn process(
        &mut self,
        rrset: Rrset,
    ) -> Result<Option<ChangeEvent>, DecodeError> {
        if let Some(new_serial) = rrset.soa_serial() {
            debug!("SOA {rrset}");
            self.soa(new_serial);
            return Ok(None);
        }
        if IGNORED_RTYPES.contains(&rrset.rtype()) {
            return Ok(None);
        }

        let deleted = match self.state {
            DecoderState::AwaitingFirstSoa => {
                self.rejected = true;
                return Err(DecodeError::MissingInitialSoa);
            }
            DecoderState::AwaitingBoundary { first_serial } => {
                // Content before a boundary is a full zone transfer.
                self.rejected = true;
                return Err(DecodeError::NotIncremental(first_serial));
            }
            DecoderState::Deleting => true,
            DecoderState::Adding => false,
        };

        self.changes += 1;
        let event = ChangeEvent::new(self.serial, deleted, &rrset);
        for line in event.text.lines() {
            debug!("{} {} {}", event.serial, event.action(), line);
        }
        Ok(Some(event))
    }

    /// Processes a SOA record with the given serial.
    fn soa(&mut self, new_serial: u32) {
        match self.state {
            DecoderState::AwaitingFirstSoa => {
                // The server's current version, not a change itself.
                self.state = DecoderState::AwaitingBoundary {
                    first_serial: new_serial,
                };
            }
            DecoderState::AwaitingBoundary { .. }
            | DecoderState::Deleting
            | DecoderState::Adding => {
                self.state =
                    DecoderState::at_boundary(self.serial, new_serial);
                self.serial = new_serial;
            }
        }
        trace!("Zone {} state={:?}", self.origin, self.state);
    }

    /// Returns the summary of the transfer.
    pub fn finish(&self) -> TransferResult {
        TransferResult {
            final_serial: (!self.rejected).then_some(self.serial),
            changes: self.changes,
        }
    }
}
