//! Decoding of IXFR response sequences into change events.
//!
//! This module provides [`IxfrDecoder`] which turns the record sets of an
//! RFC 1995 IXFR response sequence into [`ChangeEvent`]s, labelling each
//! as an addition or a deletion from the SOA boundaries in the sequence,
//! and rejecting responses where the server fell back to sending the
//! complete zone.
//!
//! [`Transfer`] runs the decoder over the messages of a [`TransferSource`]
//! one at a time, [`decode()`] over record sets already at hand.
//!
//! [`ChangeEvent`]: crate::event::ChangeEvent
mod decoder;
mod iterator;
mod rrset;
mod source;
mod transfer;
mod types;


pub use decoder::IxfrDecoder;
pub use iterator::{decode, DecodeIter};
pub use rrset::{fqdn, ParsedData, ParsedRecord, Rrset};
pub use source::{
    server_addr, Connect, MessageQueue, TcpConnector, TcpTransferSource,
    TransferSource, DEFAULT_PORT,
};
pub use transfer::Transfer;
pub use types::{DecodeError, DecoderState, Error, TransferError};
