mod common;

use domain::base::iana::OptRcode;

use ixfrlog::controller::{RunError, ZoneOutcome, ZoneRunner};
use ixfrlog::event::ChangeEvent;
use ixfrlog::state::StateFile;
use ixfrlog::xfr::{Error, TransferError};

use common::{dir_entries, init_logging, MockConnector, Recorder, Response};

const NS: &str = "192.0.2.53";

fn mk_state(zones: &[(&str, u32)]) -> StateFile {
    let mut state = StateFile::new();
    for (zone, _) in zones {
        state.seed(zone, Some(NS)).unwrap();
    }
    for (zone, zone_state) in state.iter_mut() {
        zone_state.serial = zones
            .iter()
            .find(|(name, _)| name == zone)
            .map(|(_, serial)| *serial)
            .unwrap();
    }
    state
}

fn incremental_response() -> Vec<domain::base::Message<bytes::Bytes>> {
    vec![
        Response::new("example.com.")
            .soa(11)
            .soa(10)
            .a("www.example.com.", "192.0.2.1")
            .into_message(),
        Response::new("example.com.")
            .soa(11)
            .a("www.example.com.", "192.0.2.2")
            .soa(11)
            .into_message(),
    ]
}

#[tokio::test]
async fn changes_are_logged_and_published() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let mut state = mk_state(&[("example.com.", 10)]);

    let connector = MockConnector::new()
        .with_response("example.com.", incremental_response());
    let mut runner = ZoneRunner::new(connector)
        .with_log_dir(dir.path())
        .with_publisher(Recorder::default());
    let summary = runner.run_all(&mut state).await;

    assert!(summary.is_success());
    assert!(matches!(
        summary.get("example.com."),
        Some(ZoneOutcome::Updated {
            serial: 11,
            changes: 2,
            filename: Some(name),
        }) if name == "example.com-11.log"
    ));
    assert_eq!(
        runner.connector().requests(),
        [(NS.to_string(), "example.com.".to_string(), 10)]
    );

    let zone = state.get("example.com.").unwrap();
    assert_eq!(zone.serial, 11);
    assert_eq!(zone.filename.as_deref(), Some("example.com-11.log"));

    assert_eq!(dir_entries(dir.path()), ["example.com-11.log"]);
    let log = std::fs::read_to_string(dir.path().join("example.com-11.log"))
        .unwrap();
    let logged: Vec<ChangeEvent> = log
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert_eq!(logged.len(), 2);
    assert!(logged[0].deleted);
    assert_eq!(logged[0].serial, 10);
    assert_eq!(logged[0].text, "www.example.com. 300 IN A 192.0.2.1");
    assert!(!logged[1].deleted);
    assert_eq!(logged[1].serial, 11);

    let published = runner.into_publisher().unwrap().published;
    assert_eq!(published.len(), 2);
    assert!(published.iter().all(|(zone, _)| zone == "example.com."));
    assert_eq!(published[0].1, logged[0]);
}

#[tokio::test]
async fn up_to_date_zone_is_left_alone() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let mut state = mk_state(&[("example.com.", 10)]);
    let before = state.clone();

    let connector = MockConnector::new().with_response(
        "example.com.",
        vec![Response::new("example.com.").soa(10).into_message()],
    );
    let mut runner =
        ZoneRunner::<_, Recorder>::new(connector).with_log_dir(dir.path());
    let summary = runner.run_all(&mut state).await;

    assert!(summary.is_success());
    assert!(matches!(
        summary.get("example.com."),
        Some(ZoneOutcome::Unchanged(10))
    ));
    assert_eq!(state, before);
    assert!(dir_entries(dir.path()).is_empty());
}

#[tokio::test]
async fn serial_advance_without_changes_is_not_success() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let mut state = mk_state(&[("example.com.", 10)]);

    let connector = MockConnector::new().with_response(
        "example.com.",
        vec![Response::new("example.com.")
            .soa(11)
            .soa(10)
            .soa(11)
            .soa(11)
            .into_message()],
    );
    let mut runner = ZoneRunner::new(connector)
        .with_log_dir(dir.path())
        .with_publisher(Recorder::default());
    let summary = runner.run_all(&mut state).await;

    assert!(!summary.is_success());
    assert!(matches!(
        summary.get("example.com."),
        Some(ZoneOutcome::Empty(11))
    ));
    let zone = state.get("example.com.").unwrap();
    assert_eq!(zone.serial, 11);
    assert_eq!(zone.filename, None);
    assert!(dir_entries(dir.path()).is_empty());
    assert!(runner.into_publisher().unwrap().published.is_empty());
}

#[tokio::test]
async fn failure_after_changes_discards_log() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let mut state = mk_state(&[("example.com.", 10)]);

    // The first message carries changes, then the server gives up.
    let mut msgs = incremental_response();
    msgs.truncate(1);
    let connector =
        MockConnector::new().with_failing_response("example.com.", msgs);
    let mut runner = ZoneRunner::new(connector)
        .with_log_dir(dir.path())
        .with_publisher(Recorder::default());
    let summary = runner.run_all(&mut state).await;

    assert!(!summary.is_success());
    assert!(matches!(
        summary.get("example.com."),
        Some(ZoneOutcome::Failed(RunError::Transfer(Error::Transfer(
            TransferError::Response(OptRcode::SERVFAIL)
        ))))
    ));
    let zone = state.get("example.com.").unwrap();
    assert_eq!(zone.serial, 10);
    assert_eq!(zone.filename, None);
    assert!(dir_entries(dir.path()).is_empty());

    // The deletion was handed on before the failure.
    assert_eq!(runner.into_publisher().unwrap().published.len(), 1);
}

#[tokio::test]
async fn full_transfer_fast_forwards() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let mut state = mk_state(&[("example.com.", 10)]);

    let connector = MockConnector::new().with_response(
        "example.com.",
        vec![Response::new("example.com.")
            .soa(30)
            .a("example.com.", "192.0.2.1")
            .a("www.example.com.", "192.0.2.2")
            .soa(30)
            .into_message()],
    );
    let mut runner = ZoneRunner::new(connector)
        .with_log_dir(dir.path())
        .with_publisher(Recorder::default());
    let summary = runner.run_all(&mut state).await;

    assert!(!summary.is_success());
    assert!(matches!(
        summary.get("example.com."),
        Some(ZoneOutcome::FastForward(30))
    ));
    let zone = state.get("example.com.").unwrap();
    assert_eq!(zone.serial, 30);
    assert_eq!(zone.filename, None);
    assert!(dir_entries(dir.path()).is_empty());
    assert!(runner.into_publisher().unwrap().published.is_empty());
}

#[tokio::test]
async fn failing_zone_does_not_stop_others() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let mut state = mk_state(&[("example.com.", 10), ("example.net.", 5)]);

    // Nothing canned for example.net., so connecting fails.
    let connector = MockConnector::new()
        .with_response("example.com.", incremental_response());
    let mut runner =
        ZoneRunner::<_, Recorder>::new(connector).with_log_dir(dir.path());
    let summary = runner.run_all(&mut state).await;

    assert!(!summary.is_success());
    assert!(matches!(
        summary.get("example.net."),
        Some(ZoneOutcome::Failed(RunError::Transfer(Error::Transfer(
            TransferError::Connect(_)
        ))))
    ));
    assert!(matches!(
        summary.get("example.com."),
        Some(ZoneOutcome::Updated { serial: 11, .. })
    ));
    assert_eq!(state.get("example.net.").unwrap().serial, 5);
    assert_eq!(state.get("example.com.").unwrap().serial, 11);
    assert_eq!(dir_entries(dir.path()), ["example.com-11.log"]);
}

#[tokio::test]
async fn truncated_transfer_keeps_state() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let mut state = mk_state(&[("example.com.", 10)]);

    // The first record comes before any SOA.
    let connector = MockConnector::new().with_response(
        "example.com.",
        vec![Response::new("example.com.")
            .a("example.com.", "192.0.2.1")
            .into_message()],
    );
    let mut runner =
        ZoneRunner::<_, Recorder>::new(connector).with_log_dir(dir.path());
    let summary = runner.run_all(&mut state).await;

    assert!(matches!(
        summary.get("example.com."),
        Some(ZoneOutcome::Failed(_))
    ));
    assert_eq!(state.get("example.com.").unwrap().serial, 10);
    assert!(dir_entries(dir.path()).is_empty());
}

#[tokio::test]
async fn publishing_without_log() {
    init_logging();
    let mut state = mk_state(&[("example.com.", 10)]);

    let connector = MockConnector::new()
        .with_response("example.com.", incremental_response());
    let mut runner = ZoneRunner::new(connector)
        .with_publisher(Recorder::default())
        .with_nameserver("198.51.100.53");
    let summary = runner.run_all(&mut state).await;

    assert!(summary.is_success());
    assert!(matches!(
        summary.get("example.com."),
        Some(ZoneOutcome::Updated {
            serial: 11,
            changes: 2,
            filename: None,
        })
    ));
    assert_eq!(
        runner.connector().requests(),
        [("198.51.100.53".to_string(), "example.com.".to_string(), 10)]
    );

    let zone = state.get("example.com.").unwrap();
    assert_eq!(zone.serial, 11);
    assert_eq!(zone.filename, None);
    assert_eq!(zone.nameserver, NS);
    assert_eq!(runner.into_publisher().unwrap().published.len(), 2);
}
