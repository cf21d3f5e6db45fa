//! Decode a transfer as its messages arrive.

use std::collections::VecDeque;

use tracing::trace;

use crate::event::{ChangeEvent, TransferResult};

use super::decoder::IxfrDecoder;
use super::rrset::Rrset;
use super::source::TransferSource;
use super::types::Error;

//------------ Transfer -------------------------------------------------------

/// A transfer being decoded into change events.
///
/// Messages are only requested from the source once all record sets of the
/// previous message have been turned into events, so waiting for the next
/// message is the only point where [`next_event()`] suspends.
///
/// [`next_event()`]: Transfer::next_event()
pub struct Transfer<S> {
    source: S,
    decoder: IxfrDecoder,

    /// Record sets of the current message not processed yet.
    pending: VecDeque<Rrset>,

    /// True once the source ran out of messages.
    exhausted: bool,
}

impl<S: TransferSource> Transfer<S> {
    pub fn new(source: S, origin: impl Into<String>, start_serial: u32) -> Self {
        Transfer {
            source,
            decoder: IxfrDecoder::new(origin, start_serial),
            pending: VecDeque::new(),
            exhausted: false,
        }
    }

    /// Returns the next change event of the transfer.
    ///
    /// Returns `Ok(None)` once the source has no more messages.
    pub async fn next_event(&mut self) -> Result<Option<ChangeEvent>, Error> {
        loop {
            while let Some(rrset) = self.pending.pop_front() {
                if let Some(event) = self.decoder.process(rrset)? {
                    return Ok(Some(event));
                }
            }
            if self.exhausted {
                return Ok(None);
            }
            match self.source.next_message().await? {
                Some(msg) => {
                    let rrsets = Rrset::group(&msg)?;
                    trace!(
                        "Zone {}: response with {} record sets",
                        self.decoder.origin(),
                        rrsets.len()
                    );
                    self.pending.extend(rrsets);
                }
                None => self.exhausted = true,
            }
        }
    }

    /// Returns the summary of what has been decoded so far.
    pub fn result(&self) -> TransferResult {
        self.decoder.finish()
    }

    pub fn decoder(&self) -> &IxfrDecoder {
        &self.decoder
    }
}
