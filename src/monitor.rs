//! Fixed-interval polling with automatic reconnection.
//!
//! The loop starts in [`MonitorState::Connecting`], moves to `Polling` once a
//! fetch succeeds and falls back to `Reconnecting` whenever a fetch fails. Only an
//! interrupt reaches `Stopped`.

use anyhow::{Context, Result};
use chrono::Local;
use serde_json::Value;
use std::future::Future;
use std::io;
use std::pin::Pin;
use std::time::Duration;
use tokio::runtime::Runtime;

use crate::client::{Transport, get_user_status};
use crate::discovery::connect;
use crate::display;
use crate::error::DiscoveryError;
use crate::history::{HistoryStore, HistoryTracker, SaveOutcome};
use crate::models::Connection;
use crate::ports::ProcessInspector;

/// Changes shown after each recorded change
pub const TICK_LOG_COUNT: usize = 20;
/// Changes shown when the monitor stops
pub const FINAL_LOG_COUNT: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    Connecting,
    Polling,
    Reconnecting,
    Stopped,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MonitorStats {
    pub checks: usize,
    pub changes: usize,
}

/// Result of one check
#[derive(Debug)]
pub enum TickOutcome {
    /// A snapshot was written. `first` marks the forced initial record.
    Recorded {
        data: Value,
        outcome: SaveOutcome,
        first: bool,
    },
    Unchanged,
    /// Data was fetched but the history write failed
    SaveFailed { data: Value, error: String },
    /// No data this check. `lost` is set when a working connection just dropped.
    NoData {
        lost: bool,
        error: Option<DiscoveryError>,
    },
    Stopped,
}

/// Sleeps between checks
pub trait Ticker {
    /// Wait for `interval`. Returns `false` when the monitor should stop.
    fn wait(&mut self, interval: Duration) -> bool;
}

/// Interval sleep that returns early on Ctrl+C
pub struct SignalTicker {
    runtime: Runtime,
    interrupt: Option<Pin<Box<dyn Future<Output = io::Result<()>>>>>,
    interrupted: bool,
}

impl SignalTicker {
    pub fn new() -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .context("build signal runtime")?;

        let mut interrupt: Pin<Box<dyn Future<Output = io::Result<()>>>> =
            Box::pin(tokio::signal::ctrl_c());
        // First poll installs the handler so Ctrl+C during a blocking call is kept.
        let first = runtime.block_on(tokio::time::timeout(Duration::ZERO, interrupt.as_mut()));
        let mut ticker = Self {
            runtime,
            interrupt: Some(interrupt),
            interrupted: false,
        };
        match first {
            Err(_elapsed) => {}
            Ok(Ok(())) => ticker.interrupted = true,
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "ctrl-c handler unavailable");
                ticker.interrupt = None;
            }
        }
        Ok(ticker)
    }
}

impl Ticker for SignalTicker {
    fn wait(&mut self, interval: Duration) -> bool {
        if self.interrupted {
            return false;
        }
        let Some(interrupt) = self.interrupt.as_mut() else {
            self.runtime.block_on(tokio::time::sleep(interval));
            return true;
        };
        let fired = self.runtime.block_on(async {
            tokio::select! {
                _ = tokio::time::sleep(interval) => false,
                _ = interrupt.as_mut() => true,
            }
        });
        if fired {
            self.interrupted = true;
            self.interrupt = None;
        }
        !fired
    }
}

pub struct Monitor<'a, S> {
    inspector: &'a dyn ProcessInspector,
    transport: &'a dyn Transport,
    tracker: &'a HistoryTracker<S>,
    interval: Duration,
    state: MonitorState,
    connection: Option<Connection>,
    stats: MonitorStats,
    recorded_once: bool,
}

impl<'a, S: HistoryStore> Monitor<'a, S> {
    pub fn new(
        inspector: &'a dyn ProcessInspector,
        transport: &'a dyn Transport,
        tracker: &'a HistoryTracker<S>,
        interval: Duration,
    ) -> Self {
        Self {
            inspector,
            transport,
            tracker,
            interval,
            state: MonitorState::Connecting,
            connection: None,
            stats: MonitorStats::default(),
            recorded_once: false,
        }
    }

    pub fn state(&self) -> MonitorState {
        self.state
    }

    pub fn stats(&self) -> MonitorStats {
        self.stats
    }

    pub fn connection(&self) -> Option<&Connection> {
        self.connection.as_ref()
    }

    /// Initial connect and forced first record. A failed connect leaves the
    /// monitor in `Reconnecting`.
    pub fn start(&mut self) -> TickOutcome {
        self.stats.checks += 1;
        self.discover_and_fetch(false)
    }

    /// One interval check.
    pub fn tick(&mut self) -> TickOutcome {
        match self.state {
            MonitorState::Stopped => TickOutcome::Stopped,
            MonitorState::Connecting | MonitorState::Reconnecting => {
                self.stats.checks += 1;
                self.discover_and_fetch(false)
            }
            MonitorState::Polling => {
                self.stats.checks += 1;
                match self.fetch() {
                    Some(data) => self.record(data),
                    None => {
                        tracing::info!("fetch failed, rediscovering");
                        self.state = MonitorState::Reconnecting;
                        self.connection = None;
                        self.discover_and_fetch(true)
                    }
                }
            }
        }
    }

    pub fn stop(&mut self) {
        self.state = MonitorState::Stopped;
        self.connection = None;
    }

    /// Check, then wait on `ticker` between checks until it reports an interrupt.
    pub fn run(&mut self, ticker: &mut dyn Ticker) -> MonitorStats {
        let outcome = self.start();
        self.report(&outcome);
        while ticker.wait(self.interval) {
            let outcome = self.tick();
            self.report(&outcome);
        }
        self.stop();

        println!(
            "\n\n🛑 Monitor stopped. Total: {} checks, {} changes",
            self.stats.checks, self.stats.changes
        );
        display::print_change_log(&self.tracker.change_log(), FINAL_LOG_COUNT);
        self.stats
    }

    fn fetch(&self) -> Option<Value> {
        let conn = self.connection.as_ref()?;
        get_user_status(self.transport, conn.port, &conn.csrf_token)
    }

    fn discover_and_fetch(&mut self, lost: bool) -> TickOutcome {
        match connect(self.inspector, self.transport) {
            Ok(conn) => {
                self.connection = Some(conn);
                match self.fetch() {
                    Some(data) => {
                        self.state = MonitorState::Polling;
                        self.record(data)
                    }
                    None => {
                        self.state = MonitorState::Reconnecting;
                        self.connection = None;
                        TickOutcome::NoData { lost, error: None }
                    }
                }
            }
            Err(e) => {
                tracing::debug!(error = %e, "discovery failed");
                self.state = MonitorState::Reconnecting;
                TickOutcome::NoData {
                    lost,
                    error: Some(e),
                }
            }
        }
    }

    fn record(&mut self, data: Value) -> TickOutcome {
        let first = !self.recorded_once;
        match self.tracker.save(&data, first) {
            Ok(SaveOutcome::Unchanged) => TickOutcome::Unchanged,
            Ok(outcome) => {
                self.recorded_once = true;
                if !first {
                    self.stats.changes += 1;
                }
                TickOutcome::Recorded {
                    data,
                    outcome,
                    first,
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to save history");
                TickOutcome::SaveFailed {
                    data,
                    error: format!("{e:#}"),
                }
            }
        }
    }

    fn report(&self, outcome: &TickOutcome) {
        let now = Local::now().format("%H:%M:%S");
        match outcome {
            TickOutcome::Recorded {
                data,
                outcome,
                first,
            } => {
                display::print_quota(data);
                display::print_save_outcome(outcome);
                if !first {
                    display::print_change_log(&self.tracker.change_log(), TICK_LOG_COUNT);
                }
            }
            TickOutcome::Unchanged => println!(
                "  [{now}] ✅ Unchanged (check #{}, {} changes)",
                self.stats.checks, self.stats.changes
            ),
            TickOutcome::SaveFailed { data, error } => {
                display::print_quota(data);
                eprintln!("  [{now}] ⚠️  Could not save history: {error}");
            }
            TickOutcome::NoData { lost, error } => {
                if *lost {
                    println!("  [{now}] ⚠️  Connection lost, retrying...");
                }
                if let Some(e) = error {
                    if self.stats.checks == 1 {
                        display::print_discovery_error(e);
                    }
                }
                println!("  [{now}] ❌ No data (check #{})", self.stats.checks);
            }
            TickOutcome::Stopped => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{UNLEASH_DATA_PATH, USER_STATUS_PATH};
    use crate::history::MemoryStore;
    use crate::models::ProcessRecord;
    use serde_json::json;
    use std::cell::{Cell, RefCell};
    use std::collections::VecDeque;

    struct FakeInspector {
        running: Cell<bool>,
    }

    impl ProcessInspector for FakeInspector {
        fn processes(&self) -> Vec<ProcessRecord> {
            if !self.running.get() {
                return Vec::new();
            }
            vec![ProcessRecord {
                pid: 42,
                name: "language_server".into(),
                cmdline: "ls --extension_server_port 1 --csrf_token abc".into(),
            }]
        }

        fn listening_ports(&self, _pid: u32) -> Vec<u16> {
            vec![5000]
        }
    }

    /// Answers probes while up; serves queued status responses.
    struct FakeServer {
        up: Cell<bool>,
        responses: RefCell<VecDeque<Value>>,
    }

    impl FakeServer {
        fn new(responses: Vec<Value>) -> Self {
            Self {
                up: Cell::new(true),
                responses: RefCell::new(responses.into()),
            }
        }
    }

    impl Transport for FakeServer {
        fn call(&self, _port: u16, path: &str, _token: &str, _body: &Value) -> Option<Value> {
            if !self.up.get() {
                return None;
            }
            match path {
                UNLEASH_DATA_PATH => Some(json!({})),
                USER_STATUS_PATH => self.responses.borrow_mut().pop_front(),
                _ => None,
            }
        }
    }

    fn status(prompt: f64) -> Value {
        json!({"userStatus": {"planStatus": {"availablePromptCredits": prompt}}})
    }

    #[test]
    fn test_first_fetch_is_forced_then_unchanged_is_skipped() {
        let inspector = FakeInspector {
            running: Cell::new(true),
        };
        let server = FakeServer::new(vec![status(100.0), status(100.0), status(90.0)]);
        let tracker = HistoryTracker::new(MemoryStore::new());
        let mut monitor = Monitor::new(&inspector, &server, &tracker, Duration::from_secs(10));

        assert!(matches!(
            monitor.start(),
            TickOutcome::Recorded { first: true, .. }
        ));
        assert_eq!(monitor.state(), MonitorState::Polling);
        assert!(matches!(monitor.tick(), TickOutcome::Unchanged));
        assert!(matches!(
            monitor.tick(),
            TickOutcome::Recorded { first: false, .. }
        ));
        assert_eq!(
            monitor.stats(),
            MonitorStats {
                checks: 3,
                changes: 1
            }
        );
        assert_eq!(tracker.store().len(), 2);
    }

    #[test]
    fn test_failed_initial_connect_enters_reconnecting() {
        let inspector = FakeInspector {
            running: Cell::new(false),
        };
        let server = FakeServer::new(vec![status(100.0)]);
        let tracker = HistoryTracker::new(MemoryStore::new());
        let mut monitor = Monitor::new(&inspector, &server, &tracker, Duration::from_secs(10));

        assert!(matches!(
            monitor.start(),
            TickOutcome::NoData {
                error: Some(DiscoveryError::NoProcess),
                ..
            }
        ));
        assert_eq!(monitor.state(), MonitorState::Reconnecting);

        inspector.running.set(true);
        assert!(matches!(
            monitor.tick(),
            TickOutcome::Recorded { first: true, .. }
        ));
        assert_eq!(monitor.state(), MonitorState::Polling);
        assert_eq!(monitor.connection().map(|c| c.port), Some(5000));
    }

    #[test]
    fn test_lost_connection_stays_reconnecting_until_server_returns() {
        let inspector = FakeInspector {
            running: Cell::new(true),
        };
        let server = FakeServer::new(vec![status(100.0), status(80.0)]);
        let tracker = HistoryTracker::new(MemoryStore::new());
        let mut monitor = Monitor::new(&inspector, &server, &tracker, Duration::from_secs(10));
        monitor.start();

        server.up.set(false);
        assert!(matches!(
            monitor.tick(),
            TickOutcome::NoData { lost: true, .. }
        ));
        assert_eq!(monitor.state(), MonitorState::Reconnecting);
        assert!(matches!(
            monitor.tick(),
            TickOutcome::NoData { lost: false, .. }
        ));

        server.up.set(true);
        assert!(matches!(monitor.tick(), TickOutcome::Recorded { .. }));
        assert_eq!(monitor.state(), MonitorState::Polling);
    }

    struct CountingTicker(usize);

    impl Ticker for CountingTicker {
        fn wait(&mut self, _interval: Duration) -> bool {
            if self.0 == 0 {
                return false;
            }
            self.0 -= 1;
            true
        }
    }

    #[test]
    fn test_run_stops_on_interrupt() {
        let inspector = FakeInspector {
            running: Cell::new(true),
        };
        let server = FakeServer::new(vec![status(100.0), status(99.0), status(99.0)]);
        let tracker = HistoryTracker::new(MemoryStore::new());
        let mut monitor = Monitor::new(&inspector, &server, &tracker, Duration::from_secs(10));

        let stats = monitor.run(&mut CountingTicker(2));
        assert_eq!(
            stats,
            MonitorStats {
                checks: 3,
                changes: 1
            }
        );
        assert_eq!(monitor.state(), MonitorState::Stopped);
        assert!(matches!(monitor.tick(), TickOutcome::Stopped));
    }
}
