//! Helpers shared by the integration tests.
#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::io;
use std::path::Path;
use std::sync::Mutex;

use bytes::{Bytes, BytesMut};
use domain::base::iana::{Class, OptRcode};
use domain::base::message_builder::AnswerBuilder;
use domain::base::{Message, MessageBuilder, Name, Rtype, Serial, Ttl};
use domain::rdata::{Soa, A};

use ixfrlog::event::ChangeEvent;
use ixfrlog::sink::{Publisher, SinkError};
use ixfrlog::xfr::{Connect, TransferError, TransferSource};

pub fn init_logging() {
    // Initialize tracing based logging. Override with env var RUST_LOG,
    // e.g. RUST_LOG=trace.
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_thread_ids(true)
        .without_time()
        .try_init()
        .ok();
}

//------------ Response -------------------------------------------------------

/// Builds an IXFR response message for a zone.
pub struct Response {
    zone: String,
    answer: AnswerBuilder<BytesMut>,
}

impl Response {
    pub fn new(zone: &str) -> Self {
        let mut msg = MessageBuilder::new_bytes().question();
        msg.push((Name::vec_from_str(zone).unwrap(), Rtype::IXFR))
            .unwrap();
        Response {
            zone: zone.into(),
            answer: msg.answer(),
        }
    }

    pub fn soa(mut self, serial: u32) -> Self {
        let zone = Name::vec_from_str(&self.zone).unwrap();
        let ttl = Ttl::from_secs(3600);
        let soa = Soa::new(
            zone.clone(),
            zone.clone(),
            Serial(serial),
            ttl,
            ttl,
            ttl,
            ttl,
        );
        self.answer
            .push((zone, Class::IN, Ttl::from_secs(3600), soa))
            .unwrap();
        self
    }

    pub fn a(mut self, owner: &str, addr: &str) -> Self {
        let owner = Name::vec_from_str(owner).unwrap();
        let data = A::new(addr.parse().unwrap());
        self.answer
            .push((owner, Class::IN, Ttl::from_secs(300), data))
            .unwrap();
        self
    }

    pub fn into_message(self) -> Message<Bytes> {
        self.answer.into_message()
    }
}

//------------ MockConnector --------------------------------------------------

/// Hands out canned responses per zone.
///
/// Zones without responses fail to connect.
#[derive(Default)]
pub struct MockConnector {
    /// The messages per zone and whether the transfer fails after them.
    responses: HashMap<String, (Vec<Message<Bytes>>, bool)>,
    requests: Mutex<Vec<(String, String, u32)>>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_response(mut self, zone: &str, msgs: Vec<Message<Bytes>>) -> Self {
        self.responses.insert(zone.into(), (msgs, false));
        self
    }

    /// Adds responses after which the server answers with SERVFAIL.
    pub fn with_failing_response(
        mut self,
        zone: &str,
        msgs: Vec<Message<Bytes>>,
    ) -> Self {
        self.responses.insert(zone.into(), (msgs, true));
        self
    }

    /// The requests made as name server, zone, and serial.
    pub fn requests(&self) -> Vec<(String, String, u32)> {
        self.requests.lock().unwrap().clone()
    }
}

impl Connect for MockConnector {
    type Source = MockSource;

    fn connect(
        &self,
        nameserver: &str,
        zone: &Name<Vec<u8>>,
        serial: u32,
    ) -> impl Future<Output = Result<Self::Source, TransferError>> + Send {
        let zone = format!("{zone}.");
        self.requests.lock().unwrap().push((
            nameserver.into(),
            zone.clone(),
            serial,
        ));
        let res = match self.responses.get(&zone) {
            Some((msgs, fail_at_end)) => Ok(MockSource {
                messages: msgs.iter().cloned().collect(),
                fail_at_end: *fail_at_end,
            }),
            None => Err(TransferError::Connect(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                "connection refused",
            ))),
        };
        async move { res }
    }
}

//------------ MockSource -----------------------------------------------------

/// Replays canned messages, optionally failing once they run out.
pub struct MockSource {
    messages: VecDeque<Message<Bytes>>,
    fail_at_end: bool,
}

impl TransferSource for MockSource {
    async fn next_message(
        &mut self,
    ) -> Result<Option<Message<Bytes>>, TransferError> {
        match self.messages.pop_front() {
            Some(msg) => Ok(Some(msg)),
            None if self.fail_at_end => {
                Err(TransferError::Response(OptRcode::SERVFAIL))
            }
            None => Ok(None),
        }
    }
}

//------------ Recorder -------------------------------------------------------

/// A publisher remembering everything published.
#[derive(Default)]
pub struct Recorder {
    pub published: Vec<(String, ChangeEvent)>,
}

impl Publisher for Recorder {
    async fn publish(
        &mut self,
        zone: &str,
        event: &ChangeEvent,
    ) -> Result<(), SinkError> {
        self.published.push((zone.into(), event.clone()));
        Ok(())
    }
}

//------------ Helper functions -----------------------------------------------

/// Returns the sorted names of the files in `dir`.
pub fn dir_entries(dir: &Path) -> Vec<String> {
    let mut res: Vec<_> = std::fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().into_string().unwrap())
        .collect();
    res.sort();
    res
}
