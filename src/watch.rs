//! Reporting changes of watched names.
//!
//! A [`WatchConfig`] maps domain names to the recipients interested in
//! them. [`Reconciler`] replays change events in order and keeps, for each
//! watched name and each record value, the net effect of the changes: the
//! last change of a value decides whether it counts as added or deleted.
//! The resulting [`Report`] lists the net changes per recipient.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Read};
use std::path::Path;

use domain::base::Name;
use flate2::read::MultiGzDecoder;
use tracing::{debug, trace};

use crate::event::ChangeEvent;

//------------ WatchConfig ----------------------------------------------------

/// The watched names and who to tell about their changes.
///
/// Names keep the order they were given in.
#[derive(Clone, Debug, Default)]
pub struct WatchConfig {
    domains: Vec<WatchedDomain>,

    /// Index into `domains` by name.
    index: HashMap<Name<Vec<u8>>, usize>,
}

#[derive(Clone, Debug)]
struct WatchedDomain {
    /// The name as given in the configuration.
    display: String,
    recipients: Vec<String>,
}

impl WatchConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a watched name.
    ///
    /// Recipients of a name given more than once are merged.
    pub fn insert<I, R>(
        &mut self,
        domain: &str,
        recipients: I,
    ) -> Result<(), WatchError>
    where
        I: IntoIterator<Item = R>,
        R: Into<String>,
    {
        let name = Name::vec_from_str(domain)
            .map_err(|_| WatchError::InvalidName(domain.into()))?;
        let pos = match self.index.get(&name) {
            Some(pos) => *pos,
            None => {
                self.domains.push(WatchedDomain {
                    display: domain.into(),
                    recipients: Vec::new(),
                });
                self.index.insert(name, self.domains.len() - 1);
                self.domains.len() - 1
            }
        };
        let entry = &mut self.domains[pos];
        for recipient in recipients {
            let recipient = recipient.into();
            if !entry.recipients.contains(&recipient) {
                entry.recipients.push(recipient);
            }
        }
        Ok(())
    }

    /// Parses a configuration from its JSON form.
    ///
    /// This is an object mapping domain names to arrays of recipients.
    pub fn from_json(json: &str) -> Result<Self, WatchError> {
        let map: serde_json::Map<String, serde_json::Value> =
            serde_json::from_str(json)?;
        let mut res = Self::new();
        for (domain, recipients) in map {
            let recipients: Vec<String> = serde_json::from_value(recipients)?;
            res.insert(&domain, recipients)?;
        }
        Ok(res)
    }

    /// Loads a configuration from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, WatchError> {
        Self::from_json(&std::fs::read_to_string(path)?)
    }

    /// Returns the position of the watched name for an event owner.
    fn position(&self, owner: &str) -> Option<usize> {
        let name = Name::vec_from_str(owner).ok()?;
        self.index.get(&name).copied()
    }

    pub fn is_watched(&self, owner: &str) -> bool {
        self.position(owner).is_some()
    }

    pub fn len(&self) -> usize {
        self.domains.len()
    }

    pub fn is_empty(&self) -> bool {
        self.domains.is_empty()
    }

    /// Returns the watched names per recipient.
    ///
    /// Recipients appear in the order they are first mentioned, their
    /// names in configuration order.
    fn by_recipient(&self) -> Vec<(&str, Vec<usize>)> {
        let mut res: Vec<(&str, Vec<usize>)> = Vec::new();
        let mut index: HashMap<&str, usize> = HashMap::new();
        for (pos, domain) in self.domains.iter().enumerate() {
            for recipient in &domain.recipients {
                let idx = *index.entry(recipient.as_str()).or_insert_with(|| {
                    res.push((recipient.as_str(), Vec::new()));
                    res.len() - 1
                });
                res[idx].1.push(pos);
            }
        }
        res
    }
}

//------------ ReportAccumulator ----------------------------------------------

/// The net changes of one watched name.
///
/// A value is never in both sets at the same time.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ReportAccumulator {
    added: BTreeSet<String>,
    deleted: BTreeSet<String>,
}

impl ReportAccumulator {
    /// Applies a change of the value `key`.
    pub fn apply(&mut self, key: String, deleted: bool) {
        if deleted {
            self.added.remove(&key);
            self.deleted.insert(key);
        } else {
            self.deleted.remove(&key);
            self.added.insert(key);
        }
    }

    /// The values added, in lexicographical order.
    pub fn added(&self) -> impl Iterator<Item = &str> {
        self.added.iter().map(String::as_str)
    }

    /// The values deleted, in lexicographical order.
    pub fn deleted(&self) -> impl Iterator<Item = &str> {
        self.deleted.iter().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.deleted.is_empty()
    }
}

//------------ Reconciler -----------------------------------------------------

/// Folds change events into the net changes of watched names.
pub struct Reconciler<'a> {
    watch: &'a WatchConfig,
    changes: Vec<ReportAccumulator>,
}

impl<'a> Reconciler<'a> {
    pub fn new(watch: &'a WatchConfig) -> Self {
        Reconciler {
            watch,
            changes: vec![ReportAccumulator::default(); watch.len()],
        }
    }

    /// Applies a change event.
    ///
    /// Events for names not watched are skipped.
    pub fn apply(&mut self, event: &ChangeEvent) {
        let Some(pos) = self.watch.position(&event.owner) else {
            return;
        };
        trace!("{} {} {}", event.serial, event.action(), event.owner);
        for key in event.keys() {
            self.changes[pos].apply(key, event.deleted);
        }
    }

    /// Returns the net changes of a watched name.
    pub fn changes(&self, domain: &str) -> Option<&ReportAccumulator> {
        self.watch.position(domain).map(|pos| &self.changes[pos])
    }

    /// Assembles the report for all recipients.
    pub fn report(&self) -> Report {
        let recipients = self
            .watch
            .by_recipient()
            .into_iter()
            .map(|(recipient, positions)| RecipientReport {
                recipient: recipient.into(),
                domains: positions
                    .into_iter()
                    .map(|pos| DomainReport {
                        domain: self.watch.domains[pos].display.clone(),
                        deleted: self.changes[pos]
                            .deleted()
                            .map(Into::into)
                            .collect(),
                        added: self.changes[pos]
                            .added()
                            .map(Into::into)
                            .collect(),
                    })
                    .collect(),
            })
            .collect();
        Report { recipients }
    }
}

/// Reconciles a sequence of change events against a watch configuration.
pub fn reconcile<'e, I>(events: I, watch: &WatchConfig) -> Report
where
    I: IntoIterator<Item = &'e ChangeEvent>,
{
    let mut reconciler = Reconciler::new(watch);
    for event in events {
        reconciler.apply(event);
    }
    reconciler.report()
}

//------------ Report ---------------------------------------------------------

/// The net changes of watched names for each recipient.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Report {
    pub recipients: Vec<RecipientReport>,
}

impl Report {
    pub fn get(&self, recipient: &str) -> Option<&RecipientReport> {
        self.recipients.iter().find(|r| r.recipient == recipient)
    }

    /// Returns the report text for each recipient.
    pub fn texts(&self) -> Vec<(&str, String)> {
        self.recipients
            .iter()
            .map(|r| (r.recipient.as_str(), r.to_string()))
            .collect()
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for recipient in &self.recipients {
            recipient.fmt(f)?;
        }
        Ok(())
    }
}

//------------ RecipientReport ------------------------------------------------

/// The net changes of the names a recipient watches.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct RecipientReport {
    pub recipient: String,
    pub domains: Vec<DomainReport>,
}

impl RecipientReport {
    pub fn is_empty(&self) -> bool {
        self.domains.iter().all(DomainReport::is_empty)
    }
}

impl fmt::Display for RecipientReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Report for {}:", self.recipient)?;
        for domain in &self.domains {
            for text in &domain.deleted {
                writeln!(f, "  Deleted: {text}")?;
            }
            for text in &domain.added {
                writeln!(f, "  Added:   {text}")?;
            }
        }
        Ok(())
    }
}

//------------ DomainReport ---------------------------------------------------

/// The net changes of one watched name.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct DomainReport {
    pub domain: String,
    pub deleted: Vec<String>,
    pub added: Vec<String>,
}

impl DomainReport {
    pub fn is_empty(&self) -> bool {
        self.deleted.is_empty() && self.added.is_empty()
    }
}

//------------ LogReader ------------------------------------------------------

/// Reads change events from a diff log.
///
/// Logs with a `.gz` suffix are decompressed on the fly.
pub struct LogReader {
    lines: io::Lines<Box<dyn BufRead>>,
    line: usize,
}

impl LogReader {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, WatchError> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let reader: Box<dyn Read> =
            if path.extension().is_some_and(|ext| ext == "gz") {
                debug!("Reading compressed log {}", path.display());
                Box::new(MultiGzDecoder::new(file))
            } else {
                Box::new(file)
            };
        Ok(Self::new(BufReader::new(reader)))
    }

    pub fn new(reader: impl BufRead + 'static) -> Self {
        let reader: Box<dyn BufRead> = Box::new(reader);
        LogReader {
            lines: reader.lines(),
            line: 0,
        }
    }
}

impl Iterator for LogReader {
    type Item = Result<ChangeEvent, WatchError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let line = match self.lines.next()? {
                Ok(line) => line,
                Err(err) => return Some(Err(err.into())),
            };
            self.line += 1;
            if line.trim().is_empty() {
                continue;
            }
            return Some(
                serde_json::from_str(&line)
                    .map_err(|err| WatchError::MalformedLog(self.line, err)),
            );
        }
    }
}

//------------ WatchError -----------------------------------------------------

/// Loading the watch configuration or a diff log failed.
#[derive(Debug)]
pub enum WatchError {
    Io(io::Error),

    /// The watch configuration is not valid JSON of the right shape.
    Json(serde_json::Error),

    /// A watched name is not a valid domain name.
    InvalidName(String),

    /// A line of a diff log can't be parsed.
    MalformedLog(usize, serde_json::Error),
}

impl fmt::Display for WatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WatchError::Io(err) => err.fmt(f),
            WatchError::Json(err) => {
                write!(f, "malformed watch configuration: {err}")
            }
            WatchError::InvalidName(name) => {
                write!(f, "invalid domain name '{name}' in watch list")
            }
            WatchError::MalformedLog(line, err) => {
                write!(f, "malformed log line {line}: {err}")
            }
        }
    }
}

impl std::error::Error for WatchError {}

impl From<io::Error> for WatchError {
    fn from(err: io::Error) -> Self {
        WatchError::Io(err)
    }
}

impl From<serde_json::Error> for WatchError {
    fn from(err: serde_json::Error) -> Self {
        WatchError::Json(err)
    }
}

//============ Tests =========================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn mk_event(owner: &str, value: &str, deleted: bool) -> ChangeEvent {
        ChangeEvent {
            serial: 1,
            deleted,
            owner: owner.into(),
            ttl: 300,
            class: "IN".into(),
            rtype: "TXT".into(),
            rdata: vec![value.into()],
            text: format!("{owner} 300 IN TXT {value}"),
        }
    }

    fn mk_watch() -> WatchConfig {
        WatchConfig::from_json(
            r#"{
                "example.com.": ["alice", "bob"],
                "www.example.com.": ["bob"]
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn add_then_delete_nets_to_deleted() {
        let mut acc = ReportAccumulator::default();
        acc.apply("X".into(), false);
        acc.apply("X".into(), true);
        assert_eq!(acc.deleted().collect::<Vec<_>>(), ["X"]);
        assert_eq!(acc.added().count(), 0);
    }

    #[test]
    fn delete_then_add_nets_to_added() {
        let mut acc = ReportAccumulator::default();
        acc.apply("X".into(), true);
        acc.apply("X".into(), false);
        assert_eq!(acc.added().collect::<Vec<_>>(), ["X"]);
        assert_eq!(acc.deleted().count(), 0);
    }

    #[test]
    fn replaced_value_is_reported_both_ways() {
        let mut acc = ReportAccumulator::default();
        acc.apply("Y".into(), false);
        acc.apply("X".into(), true);
        assert_eq!(acc.deleted().collect::<Vec<_>>(), ["X"]);
        assert_eq!(acc.added().collect::<Vec<_>>(), ["Y"]);
    }

    #[test]
    fn last_change_decides() {
        let mut acc = ReportAccumulator::default();
        acc.apply("X".into(), false);
        acc.apply("X".into(), true);
        acc.apply("X".into(), false);
        acc.apply("X".into(), true);
        assert_eq!(acc.deleted().collect::<Vec<_>>(), ["X"]);
        assert_eq!(acc.added().count(), 0);
    }

    #[test]
    fn sets_stay_disjoint() {
        let mut acc = ReportAccumulator::default();
        for (i, key) in ["a", "b", "a", "c", "b", "a"].iter().enumerate() {
            acc.apply(key.to_string(), i % 2 == 0);
            let added: BTreeSet<_> = acc.added().collect();
            assert!(acc.deleted().all(|key| !added.contains(key)));
        }
    }

    #[test]
    fn unwatched_names_are_skipped() {
        let watch = mk_watch();
        let events = [mk_event("mail.example.com.", "x", false)];
        let report = reconcile(&events, &watch);
        assert!(report.recipients.iter().all(RecipientReport::is_empty));
    }

    #[test]
    fn restored_record_nets_to_added() {
        let watch = mk_watch();
        let events = [
            mk_event("www.example.com.", "X", true),
            mk_event("www.example.com.", "X", false),
            mk_event("WWW.example.com", "Z", false),
        ];
        let mut reconciler = Reconciler::new(&watch);
        events.iter().for_each(|event| reconciler.apply(event));

        let changes = reconciler.changes("www.example.com").unwrap();
        assert_eq!(changes.deleted().count(), 0);
        assert_eq!(
            changes.added().collect::<Vec<_>>(),
            [
                "WWW.example.com 300 IN TXT Z",
                "www.example.com. 300 IN TXT X"
            ]
        );
    }

    #[test]
    fn record_sets_fold_per_record() {
        let watch = mk_watch();
        let mut added = mk_event("www.example.com.", "A", false);
        added.rdata.push("B".into());
        added.text.clear();
        let events = [added, mk_event("www.example.com.", "B", true)];
        let report = reconcile(&events, &watch);

        let www = &report.get("bob").unwrap().domains[1];
        assert_eq!(www.deleted, ["www.example.com. 300 IN TXT B"]);
        assert_eq!(www.added, ["www.example.com. 300 IN TXT A"]);
    }

    #[test]
    fn names_compare_case_insensitively() {
        let watch = mk_watch();
        assert!(watch.is_watched("WWW.Example.COM."));
        assert!(watch.is_watched("www.example.com"));
        assert!(!watch.is_watched("example.org."));
    }

    #[test]
    fn recipients_keep_configuration_order() {
        let watch = mk_watch();
        let events: [ChangeEvent; 0] = [];
        let report = reconcile(&events, &watch);
        let order: Vec<_> = report
            .recipients
            .iter()
            .map(|r| {
                let domains: Vec<_> =
                    r.domains.iter().map(|d| d.domain.as_str()).collect();
                (r.recipient.as_str(), domains)
            })
            .collect();
        assert_eq!(
            order,
            [
                ("alice", vec!["example.com."]),
                ("bob", vec!["example.com.", "www.example.com."]),
            ]
        );
    }

    #[test]
    fn report_text_lists_deleted_before_added() {
        let watch = mk_watch();
        let events = [
            mk_event("example.com.", "Y", false),
            mk_event("example.com.", "X", true),
            mk_event("example.com.", "A", false),
        ];
        let report = reconcile(&events, &watch);
        let alice = report.get("alice").unwrap();
        assert_eq!(
            alice.to_string(),
            "Report for alice:\n\
             \x20 Deleted: example.com. 300 IN TXT X\n\
             \x20 Added:   example.com. 300 IN TXT A\n\
             \x20 Added:   example.com. 300 IN TXT Y\n"
        );
    }

    #[test]
    fn malformed_watch_config_is_rejected() {
        assert!(WatchConfig::from_json(r#"["example.com."]"#).is_err());
        assert!(WatchConfig::from_json(r#"{"example.com.": "bob"}"#).is_err());
        assert!(matches!(
            WatchConfig::from_json(r#"{"exa mple..com": ["bob"]}"#),
            Err(WatchError::InvalidName(_))
        ));
    }

    #[test]
    fn log_reader_reports_line_numbers() {
        let log = format!(
            "{}\n\n{{\"serial\": 1}}\n",
            serde_json::to_string(&mk_event("example.com.", "X", true))
                .unwrap()
        );
        let mut reader = LogReader::new(io::Cursor::new(log.into_bytes()));
        assert!(reader.next().unwrap().is_ok());
        assert!(matches!(
            reader.next(),
            Some(Err(WatchError::MalformedLog(3, _)))
        ));
        assert!(reader.next().is_none());
    }
}
