//! Sources of IXFR response messages.
//!
//! A [`TransferSource`] hands out the response messages of one transfer in
//! order. [`TcpTransferSource`] requests an IXFR from a name server over
//! TCP, [`MessageQueue`] replays messages held in memory.

use core::future::Future;
use core::time::Duration;

use std::collections::VecDeque;

use bytes::Bytes;
use domain::base::{Message, MessageBuilder, Name, Rtype, Serial, Ttl};
use domain::net::client::request::{
    GetResponseMulti, RequestMessage, RequestMessageMulti, SendRequestMulti,
};
use domain::net::client::stream;
use domain::rdata::Soa;
use tokio::net::TcpStream;
use tracing::{debug, trace};

use super::types::TransferError;

/// The port name servers listen on unless told otherwise.
pub const DEFAULT_PORT: u16 = 53;

/// How long to wait for the TCP connection to be established.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

//------------ TransferSource -------------------------------------------------

/// A source of the response messages of one transfer.
pub trait TransferSource {
    /// Returns the next response message.
    ///
    /// Returns `Ok(None)` once the transfer is over.
    fn next_message(
        &mut self,
    ) -> impl Future<Output = Result<Option<Message<Bytes>>, TransferError>> + Send;
}

//------------ Connect --------------------------------------------------------

/// Opens a transfer source for a zone.
pub trait Connect {
    type Source: TransferSource + Send;

    /// Starts an IXFR for `zone` from `serial` at `nameserver`.
    fn connect(
        &self,
        nameserver: &str,
        zone: &Name<Vec<u8>>,
        serial: u32,
    ) -> impl Future<Output = Result<Self::Source, TransferError>> + Send;
}

//------------ MessageQueue ---------------------------------------------------

/// A transfer source replaying messages held in memory.
#[derive(Clone, Debug, Default)]
pub struct MessageQueue {
    messages: VecDeque<Message<Bytes>>,
}

impl MessageQueue {
    pub fn new(messages: impl IntoIterator<Item = Message<Bytes>>) -> Self {
        MessageQueue {
            messages: messages.into_iter().collect(),
        }
    }
}

impl TransferSource for MessageQueue {
    fn next_message(
        &mut self,
    ) -> impl Future<Output = Result<Option<Message<Bytes>>, TransferError>> + Send
    {
        let msg = self.messages.pop_front();
        async move { Ok(msg) }
    }
}

//------------ TcpTransferSource ----------------------------------------------

/// An IXFR over a TCP connection to a name server.
pub struct TcpTransferSource {
    /// The connection the request was sent over.
    ///
    /// Kept so the connection stays open while responses arrive.
    _conn: stream::Connection<
        RequestMessage<Vec<u8>>,
        RequestMessageMulti<Vec<u8>>,
    >,

    /// The outstanding request.
    request: Box<dyn GetResponseMulti + Send + Sync>,
}

impl TcpTransferSource {
    /// Connects to `nameserver` and requests an IXFR.
    ///
    /// The request carries a SOA record with `serial` in its authority
    /// section, telling the server which version of the zone we have.
    pub async fn connect(
        nameserver: &str,
        zone: &Name<Vec<u8>>,
        serial: u32,
    ) -> Result<Self, TransferError> {
        let (host, port) = server_addr(nameserver);
        debug!("Requesting IXFR for zone {zone} from serial {serial} at {host}:{port}");

        let tcp_conn = tokio::time::timeout(
            CONNECT_TIMEOUT,
            TcpStream::connect((host.as_str(), port)),
        )
        .await
        .map_err(|_| TransferError::Timeout)?
        .map_err(TransferError::Connect)?;

        let (conn, transport) = stream::Connection::<
            RequestMessage<Vec<u8>>,
            RequestMessageMulti<Vec<u8>>,
        >::new(tcp_conn);
        tokio::spawn(async move {
            transport.run().await;
            trace!("IXFR TCP transport terminated");
        });

        let req = ixfr_request(zone, serial)?;
        let request = SendRequestMulti::send_request(&conn, req);
        Ok(TcpTransferSource {
            _conn: conn,
            request,
        })
    }
}

impl TransferSource for TcpTransferSource {
    async fn next_message(
        &mut self,
    ) -> Result<Option<Message<Bytes>>, TransferError> {
        let Some(msg) = self.request.get_response().await? else {
            return Ok(None);
        };
        if msg.is_error() {
            return Err(TransferError::Response(msg.opt_rcode()));
        }
        Ok(Some(msg))
    }
}

//------------ TcpConnector ---------------------------------------------------

/// Connects to name servers over TCP.
#[derive(Clone, Copy, Debug, Default)]
pub struct TcpConnector;

impl Connect for TcpConnector {
    type Source = TcpTransferSource;

    fn connect(
        &self,
        nameserver: &str,
        zone: &Name<Vec<u8>>,
        serial: u32,
    ) -> impl Future<Output = Result<Self::Source, TransferError>> + Send {
        let nameserver = nameserver.to_string();
        let zone = zone.clone();
        async move { TcpTransferSource::connect(&nameserver, &zone, serial).await }
    }
}

//------------ Helper functions -----------------------------------------------

/// Builds the IXFR query for `zone` at `serial`.
fn ixfr_request(
    zone: &Name<Vec<u8>>,
    serial: u32,
) -> Result<RequestMessageMulti<Vec<u8>>, TransferError> {
    let mname = zone.clone();
    let rname = zone.clone();
    let ttl = Ttl::from_secs(0);
    let soa = Soa::new(mname, rname, Serial(serial), ttl, ttl, ttl, ttl);

    let mut msg = MessageBuilder::new_vec().question();
    msg.push((zone, Rtype::IXFR))
        .map_err(|err| TransferError::Request(err.to_string()))?;
    let mut msg = msg.authority();
    msg.push((zone, 0, soa))
        .map_err(|err| TransferError::Request(err.to_string()))?;
    RequestMessageMulti::new(msg.into_message())
        .map_err(|err| TransferError::Request(err.to_string()))
}

/// Splits a name server given as `host`, `host:port` or an address.
pub fn server_addr(nameserver: &str) -> (String, u16) {
    if let Ok(addr) = nameserver.parse::<std::net::SocketAddr>() {
        return (addr.ip().to_string(), addr.port());
    }
    if nameserver.parse::<std::net::IpAddr>().is_ok() {
        return (nameserver.to_string(), DEFAULT_PORT);
    }
    if let Some((host, port)) = nameserver.rsplit_once(':') {
        if let Ok(port) = port.parse() {
            return (host.to_string(), port);
        }
    }
    (nameserver.to_string(), DEFAULT_PORT)
}
