//! IXFR decoding related types.

use std::fmt;
use std::io;

use domain::base::iana::OptRcode;
use domain::base::wire::ParseError;
use domain::net::client::request;

//------------ DecoderState ---------------------------------------------------

/// Where in an IXFR response sequence the decoder currently is.
///
/// An IXFR response starts with a copy of the server's current SOA record,
/// followed by one or more difference sequences. Each difference sequence
/// starts with the SOA of the version being left (deletions follow) and
/// continues with the SOA of the version being reached (additions follow).
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum DecoderState {
    /// Nothing has been seen yet.
    #[default]
    AwaitingFirstSoa,

    /// The opening SOA has been seen but no difference sequence yet.
    ///
    /// Any ordinary record arriving in this state means the server fell
    /// back to sending the full zone.
    AwaitingBoundary {
        /// The serial of the opening SOA.
        first_serial: u32,
    },

    /// The records being decoded are deletions.
    Deleting,

    /// The records being decoded are additions.
    Adding,
}

impl DecoderState {
    /// Returns the state entered at a boundary SOA.
    ///
    /// If the serial did not advance since the previous boundary, a block
    /// of deletions for the version being left follows. Otherwise the
    /// block adds the records of the new version.
    pub fn at_boundary(previous_serial: u32, new_serial: u32) -> Self {
        if new_serial == previous_serial {
            DecoderState::Deleting
        } else {
            DecoderState::Adding
        }
    }

    /// Returns whether a difference sequence boundary has been seen.
    pub fn is_established(self) -> bool {
        matches!(self, DecoderState::Deleting | DecoderState::Adding)
    }
}

//------------ DecodeError ----------------------------------------------------

/// An IXFR response sequence could not be decoded as a diff.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum DecodeError {
    /// The server sent the full zone instead of an incremental transfer.
    ///
    /// Carries the serial of the server's current SOA so that the caller
    /// can fast forward to it.
    NotIncremental(u32),

    /// The response did not start with a SOA record.
    MissingInitialSoa,
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::NotIncremental(serial) => {
                write!(f, "IXFR not available, server is at serial {serial}")
            }
            DecodeError::MissingInitialSoa => {
                f.write_str("IXFR response does not start with a SOA record")
            }
        }
    }
}

impl std::error::Error for DecodeError {}

//------------ TransferError --------------------------------------------------

/// Fetching the response messages of a transfer failed.
#[derive(Debug)]
pub enum TransferError {
    /// Connecting to the name server failed.
    Connect(io::Error),

    /// Connecting to the name server took too long.
    Timeout,

    /// The request could not be built.
    Request(String),

    /// Sending the request or receiving a response failed.
    Transport(request::Error),

    /// The server answered with an error.
    Response(OptRcode),

    /// A response message could not be parsed.
    Parse(ParseError),
}

impl fmt::Display for TransferError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransferError::Connect(err) => {
                write!(f, "connecting to name server failed: {err}")
            }
            TransferError::Timeout => {
                f.write_str("connecting to name server timed out")
            }
            TransferError::Request(err) => {
                write!(f, "building IXFR request failed: {err}")
            }
            TransferError::Transport(err) => {
                write!(f, "IXFR request failed: {err}")
            }
            TransferError::Response(rcode) => {
                write!(f, "IXFR refused by server: {rcode}")
            }
            TransferError::Parse(err) => {
                write!(f, "IXFR response parsing error: {err}")
            }
        }
    }
}

impl std::error::Error for TransferError {}

impl From<ParseError> for TransferError {
    fn from(err: ParseError) -> Self {
        TransferError::Parse(err)
    }
}

impl From<request::Error> for TransferError {
    fn from(err: request::Error) -> Self {
        TransferError::Transport(err)
    }
}

//------------ Error ----------------------------------------------------------

/// An error happening while running a transfer through the decoder.
#[derive(Debug)]
pub enum Error {
    /// The transfer could not be decoded.
    Decode(DecodeError),

    /// The transfer could not be fetched.
    Transfer(TransferError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Decode(err) => err.fmt(f),
            Error::Transfer(err) => err.fmt(f),
        }
    }
}

impl std::error::Error for Error {}

impl From<DecodeError> for Error {
    fn from(err: DecodeError) -> Self {
        Error::Decode(err)
    }
}

impl From<TransferError> for Error {
    fn from(err: TransferError) -> Self {
        Error::Transfer(err)
    }
}

impl From<ParseError> for Error {
    fn from(err: ParseError) -> Self {
        Error::Transfer(TransferError::Parse(err))
    }
}
