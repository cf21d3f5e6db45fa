//! Grouping of transfer records into record sets.

use std::fmt;
use std::vec::Vec;

use bytes::Bytes;
use domain::base::iana::Class;
use domain::base::rdata::RecordData;
use domain::base::wire::ParseError;
use domain::base::{Message, ParsedName, Record, Rtype, Ttl};
use domain::rdata::ZoneRecordData;

//------------ ParsedRecord ---------------------------------------------------

/// The record data type of records taken from a transfer response.
pub type ParsedData = ZoneRecordData<Bytes, ParsedName<Bytes>>;

/// The type of record taken from a transfer response.
pub type ParsedRecord = Record<ParsedName<Bytes>, ParsedData>;

//------------ Rrset ----------------------------------------------------------

/// A set of records sharing owner, class, type and TTL.
///
/// A record set always holds at least one record.
#[derive(Clone, Debug)]
pub struct Rrset {
    owner: ParsedName<Bytes>,
    class: Class,
    ttl: Ttl,
    data: Vec<ParsedData>,
}

impl Rrset {
    /// Creates a record set holding a single record.
    pub fn new(record: ParsedRecord) -> Self {
        let owner = record.owner().clone();
        let class = record.class();
        let ttl = record.ttl();
        Rrset {
            owner,
            class,
            ttl,
            data: vec![record.into_data()],
        }
    }

    /// Groups the answer section of a response message into record sets.
    ///
    /// Consecutive records with the same owner, class, type and TTL end up
    /// in the same set. SOA records are never grouped as each of them
    /// marks a boundary in the transfer.
    pub fn group(msg: &Message<Bytes>) -> Result<Vec<Rrset>, ParseError> {
        let mut res: Vec<Rrset> = Vec::new();
        for record in msg.answer()?.limit_to::<ParsedData>() {
            let record = record?;
            if let Some(last) = res.last_mut() {
                if last.accepts(&record) {
                    last.data.push(record.into_data());
                    continue;
                }
            }
            res.push(Rrset::new(record));
        }
        Ok(res)
    }

    /// Returns whether `record` belongs to this set.
    fn accepts(&self, record: &ParsedRecord) -> bool {
        record.rtype() != Rtype::SOA
            && record.rtype() == self.rtype()
            && record.class() == self.class
            && record.ttl() == self.ttl
            && *record.owner() == self.owner
    }

    /// Returns the owner as an absolute name with a trailing dot.
    pub fn owner_fqdn(&self) -> String {
        fqdn(&self.owner)
    }

    pub fn class(&self) -> Class {
        self.class
    }

    pub fn rtype(&self) -> Rtype {
        // There is always at least one record.
        self.data[0].rtype()
    }

    pub fn ttl(&self) -> Ttl {
        self.ttl
    }

    pub fn data(&self) -> &[ParsedData] {
        &self.data
    }

    /// Returns the serial if this is a SOA record set.
    pub fn soa_serial(&self) -> Option<u32> {
        match self.data.first() {
            Some(ZoneRecordData::Soa(soa)) => Some(soa.serial().into_int()),
            _ => None,
        }
    }

    /// Returns the presentation format of each record's data.
    pub fn rdata_text(&self) -> Vec<String> {
        self.data.iter().map(|data| data.to_string()).collect()
    }
}

//--- Display

impl fmt::Display for Rrset {
    /// Formats the set in presentation format, one record per line.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let owner = self.owner_fqdn();
        for (i, data) in self.data.iter().enumerate() {
            if i > 0 {
                f.write_str("\n")?;
            }
            write!(
                f,
                "{} {} {} {} {}",
                owner,
                self.ttl.as_secs(),
                self.class,
                data.rtype(),
                data
            )?;
        }
        Ok(())
    }
}

//------------ Helper functions -----------------------------------------------

/// Formats a name as an absolute name with a trailing dot.
///
/// Domain names display without the trailing dot except for the root.
pub fn fqdn(name: &impl fmt::Display) -> String {
    let mut res = name.to_string();
    if !res.ends_with('.') {
        res.push('.');
    }
    res
}
