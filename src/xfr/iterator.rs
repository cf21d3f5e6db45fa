//! Lazily decode a sequence of record sets.

use crate::event::{ChangeEvent, TransferResult};

use super::decoder::IxfrDecoder;
use super::rrset::Rrset;
use super::types::DecodeError;

//------------ DecodeIter -----------------------------------------------------

/// An iterator over the change events of a sequence of record sets.
///
/// Produced by [`decode()`]. Iteration stops after the first error or once
/// the record sets run out. The summary is available via [`result()`]
/// afterwards.
///
/// [`result()`]: DecodeIter::result()
pub struct DecodeIter<I> {
    decoder: IxfrDecoder,
    rrsets: I,
    failed: bool,
}

impl<I> DecodeIter<I> {
    /// Returns the summary of what has been decoded so far.
    pub fn result(&self) -> TransferResult {
        self.decoder.finish()
    }

    pub fn decoder(&self) -> &IxfrDecoder {
        &self.decoder
    }
}

impl<I: Iterator<Item = Rrset>> Iterator for DecodeIter<I> {
    type Item = Result<ChangeEvent, DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        for rrset in self.rrsets.by_ref() {
            match self.decoder.process(rrset) {
                Ok(Some(event)) => return Some(Ok(event)),
                Ok(None) => continue,
                Err(err) => {
                    self.failed = true;
                    return Some(Err(err));
                }
            }
        }
        None
    }
}

//------------ decode ---------------------------------------------------------

/// Decodes the record sets of an IXFR requested from `start_serial`.
pub fn decode<I>(
    rrsets: I,
    origin: impl Into<String>,
    start_serial: u32,
) -> DecodeIter<I::IntoIter>
where
    I: IntoIterator<Item = Rrset>,
{
    DecodeIter {
        decoder: IxfrDecoder::new(origin, start_serial),
        rrsets: rrsets.into_iter(),
        failed: false,
    }
}
