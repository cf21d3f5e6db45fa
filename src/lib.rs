//! Logging incremental DNS zone changes.
//!
//! This crate tracks zones through incremental zone transfers (IXFR, RFC
//! 1995) and keeps a log of every change the primary name server reports.
//! The logs can later be replayed against a watch list to tell people which
//! of the names they care about changed.
//!
//! # Modules
//!
//! * [xfr] decodes IXFR responses into a sequence of [event::ChangeEvent]s
//!   and fetches them from a name server,
//! * [controller] runs a transfer per tracked zone and updates the
//!   [state] accordingly,
//! * [sink] writes change events to diff logs and publishes them via MQTT,
//!   and
//! * [watch] reconciles diff logs against a watch list.
//!
//! The two command line tools `ixfrlog` and `ixfrwatch` wrap the
//! controller and the watch reconciliation respectively.

pub mod controller;
pub mod event;
pub mod logging;
pub mod sink;
pub mod state;
pub mod watch;
pub mod xfr;
