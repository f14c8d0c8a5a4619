//! Poll/cache/backoff controller shared by both panels.
//!
//! One attempt runs at activation; every resolution schedules exactly one
//! next attempt: the normal interval after a success, the backoff table
//! after a failure. Failures fall back to the persisted last-good snapshot
//! when there is one. Cached data is shown regardless of its age.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use common::config::TimingConfig;
use common::{CacheRecord, Error};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::schedule::ScheduledTask;
use crate::store::{load_json, save_json, KeyValueStore};

/// Anything that can produce a fresh snapshot or fail.
pub trait SnapshotSource: Send + Sync + 'static {
    type Snapshot: Clone + Serialize + DeserializeOwned + Send + Sync + 'static;

    fn fetch(&self) -> impl Future<Output = Result<Self::Snapshot, Error>> + Send;
}

// ── Policy ────────────────────────────────────────────────────────────

/// Retry delays indexed by consecutive failures; the last step repeats.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackoffTable {
    steps: Vec<Duration>,
}

impl BackoffTable {
    /// Build from explicit steps. An empty list falls back to the default.
    pub fn new(steps: Vec<Duration>) -> Self {
        if steps.is_empty() {
            return Self::default();
        }
        Self { steps }
    }

    pub fn from_millis(steps: &[u64]) -> Self {
        Self::new(steps.iter().copied().map(Duration::from_millis).collect())
    }

    /// Delay before the next attempt after `failures` earlier consecutive failures.
    pub fn delay_for(&self, failures: u32) -> Duration {
        let idx = (failures as usize).min(self.steps.len() - 1);
        self.steps[idx]
    }
}

impl Default for BackoffTable {
    fn default() -> Self {
        Self::from_millis(&[5_000, 15_000, 30_000])
    }
}

/// Which panel a controller drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Panel {
    Weather,
    Departures,
}

impl Panel {
    /// Store key of the panel's cache record.
    pub fn cache_key(self) -> &'static str {
        match self {
            Panel::Weather => "weatherCache",
            Panel::Departures => "departuresCache",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Panel::Weather => "weather",
            Panel::Departures => "departures",
        }
    }
}

impl fmt::Display for Panel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Scheduling and persistence parameters of one controller.
#[derive(Debug, Clone)]
pub struct PollPolicy {
    pub panel: Panel,
    pub normal_interval: Duration,
    pub backoff: BackoffTable,
    pub cache_key: String,
}

impl PollPolicy {
    /// 300 s refresh.
    pub fn weather() -> Self {
        Self::for_panel(Panel::Weather, &TimingConfig::default())
    }

    /// 60 s refresh.
    pub fn departures() -> Self {
        Self::for_panel(Panel::Departures, &TimingConfig::default())
    }

    pub fn for_panel(panel: Panel, timing: &TimingConfig) -> Self {
        let interval_secs = match panel {
            Panel::Weather => timing.weather_interval_secs,
            Panel::Departures => timing.departures_interval_secs,
        };
        Self {
            panel,
            normal_interval: Duration::from_secs(interval_secs),
            backoff: BackoffTable::from_millis(&timing.backoff_ms),
            cache_key: panel.cache_key().to_string(),
        }
    }
}

// ── State ─────────────────────────────────────────────────────────────

/// What the panel is currently showing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PanelStatus {
    /// No attempt has resolved yet.
    Loading,
    /// The snapshot came from the latest successful fetch.
    Live,
    /// The latest fetch failed; the snapshot is the persisted record.
    Cached,
    /// The latest fetch failed with nothing cached; any prior snapshot stays.
    Error(String),
}

/// Published panel state.
#[derive(Debug, Clone, PartialEq)]
pub struct PanelState<T> {
    pub snapshot: Option<T>,
    pub last_updated: Option<DateTime<Utc>>,
    pub status: PanelStatus,
    pub consecutive_failures: u32,
}

impl<T> Default for PanelState<T> {
    fn default() -> Self {
        Self {
            snapshot: None,
            last_updated: None,
            status: PanelStatus::Loading,
            consecutive_failures: 0,
        }
    }
}

impl<T> PanelState<T> {
    pub fn is_cached(&self) -> bool {
        self.status == PanelStatus::Cached
    }

    pub fn error(&self) -> Option<&str> {
        match &self.status {
            PanelStatus::Error(msg) => Some(msg),
            _ => None,
        }
    }
}

/// How one attempt resolved.
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome<T> {
    Live(T),
    Cached(CacheRecord<T>),
    Error(String),
}

// ── Controller ────────────────────────────────────────────────────────

pub struct PollController<S: SnapshotSource> {
    source: S,
    store: Arc<dyn KeyValueStore>,
    policy: PollPolicy,
    state: PanelState<S::Snapshot>,
}

impl<S: SnapshotSource> PollController<S> {
    pub fn new(source: S, store: Arc<dyn KeyValueStore>, policy: PollPolicy) -> Self {
        Self {
            source,
            store,
            policy,
            state: PanelState::default(),
        }
    }

    pub fn state(&self) -> &PanelState<S::Snapshot> {
        &self.state
    }

    pub fn policy(&self) -> &PollPolicy {
        &self.policy
    }

    /// Run one attempt. Returns how it resolved and the delay before the next.
    pub async fn poll_once(&mut self) -> (PollOutcome<S::Snapshot>, Duration) {
        let result = self.source.fetch().await;
        self.resolve(result, Utc::now())
    }

    /// Apply a finished fetch to the state.
    pub fn resolve(
        &mut self,
        result: Result<S::Snapshot, Error>,
        now: DateTime<Utc>,
    ) -> (PollOutcome<S::Snapshot>, Duration) {
        match result {
            Ok(snapshot) => self.on_success(snapshot, now),
            Err(e) => self.on_failure(e, now),
        }
    }

    fn on_success(
        &mut self,
        snapshot: S::Snapshot,
        now: DateTime<Utc>,
    ) -> (PollOutcome<S::Snapshot>, Duration) {
        let record = CacheRecord::new(now, snapshot.clone());
        if let Err(e) = save_json(self.store.as_ref(), &self.policy.cache_key, &record) {
            warn!("[{}] cache write failed: {}", self.policy.panel, e);
        }

        if self.state.consecutive_failures > 0 {
            info!(
                "[{}] recovered after {} failed attempt(s)",
                self.policy.panel, self.state.consecutive_failures
            );
        }

        self.state.snapshot = Some(snapshot.clone());
        self.state.last_updated = Some(now);
        self.state.status = PanelStatus::Live;
        self.state.consecutive_failures = 0;

        debug!(
            "[{}] live snapshot stored; next poll in {:?}",
            self.policy.panel, self.policy.normal_interval
        );
        (PollOutcome::Live(snapshot), self.policy.normal_interval)
    }

    fn on_failure(&mut self, err: Error, now: DateTime<Utc>) -> (PollOutcome<S::Snapshot>, Duration) {
        let delay = self.policy.backoff.delay_for(self.state.consecutive_failures);
        self.state.consecutive_failures = self.state.consecutive_failures.saturating_add(1);

        let outcome = match self.read_cache() {
            Some(record) => {
                let age = record.age(now);
                warn!(
                    "[{}] fetch failed ({}); showing cached data from {}s ago; retry in {:?}",
                    self.policy.panel,
                    err,
                    age.num_seconds(),
                    delay
                );
                self.state.snapshot = Some(record.data.clone());
                self.state.last_updated = record.fetched_at();
                self.state.status = PanelStatus::Cached;
                PollOutcome::Cached(record)
            }
            None => {
                let message = err.to_string();
                warn!(
                    "[{}] fetch failed with no cache: {}; retry in {:?}",
                    self.policy.panel, message, delay
                );
                self.state.status = PanelStatus::Error(message.clone());
                PollOutcome::Error(message)
            }
        };

        (outcome, delay)
    }

    /// The persisted record, or `None` when absent or unreadable.
    fn read_cache(&self) -> Option<CacheRecord<S::Snapshot>> {
        match load_json(self.store.as_ref(), &self.policy.cache_key) {
            Ok(record) => record,
            Err(e) => {
                warn!("[{}] ignoring unreadable cache record: {}", self.policy.panel, e);
                None
            }
        }
    }

    /// Start the poll loop. The first attempt runs immediately.
    pub fn spawn(mut self) -> PanelHandle<S::Snapshot> {
        let (state_tx, state_rx) = watch::channel(self.state.clone());
        let (fetching_tx, fetching_rx) = watch::channel(false);
        let panel = self.policy.panel;

        let task = ScheduledTask::spawn(move |mut ctx| async move {
            info!("[{}] poll loop started", panel);
            loop {
                let _ = fetching_tx.send(true);
                let result = self.source.fetch().await;
                if !ctx.is_alive() {
                    debug!("[{}] dropping result of fetch that outlived its panel", panel);
                    let _ = fetching_tx.send(false);
                    break;
                }
                let (_, delay) = self.resolve(result, Utc::now());
                let _ = fetching_tx.send(false);
                let _ = state_tx.send(self.state.clone());

                if !ctx.sleep(delay).await {
                    break;
                }
            }
            info!("[{}] poll loop stopped", panel);
        });

        PanelHandle {
            panel,
            state: state_rx,
            fetching: fetching_rx,
            task,
        }
    }
}

/// Owner of a running panel loop. Dropping it tears the loop down.
#[derive(Debug)]
pub struct PanelHandle<T> {
    panel: Panel,
    state: watch::Receiver<PanelState<T>>,
    fetching: watch::Receiver<bool>,
    task: ScheduledTask,
}

impl<T: Clone> PanelHandle<T> {
    /// Latest published state.
    pub fn current(&self) -> PanelState<T> {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<PanelState<T>> {
        self.state.clone()
    }

    /// True while an attempt is in flight.
    pub fn fetching(&self) -> watch::Receiver<bool> {
        self.fetching.clone()
    }

    /// Stop scheduling without waiting.
    pub fn cancel(&self) {
        self.task.cancel();
    }

    /// Stop scheduling and wait for the loop to exit (after any in-flight fetch).
    pub async fn shutdown(self) {
        self.task.shutdown().await;
    }

    /// Stop scheduling and wait at most `grace` for the loop to exit. A fetch
    /// still hanging after that is abandoned; its result is never published.
    pub async fn shutdown_within(self, grace: Duration) -> bool {
        let panel = self.panel;
        let stopped = self.task.shutdown_within(grace).await;
        if !stopped {
            warn!(
                "[{}] fetch still in flight after {:?}; abandoning it",
                panel, grace
            );
        }
        stopped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use pretty_assertions::assert_eq;
    use serde::Deserialize;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use tokio::sync::Notify;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Snap(u32);

    /// Replays scripted results; once exhausted every fetch fails.
    #[derive(Clone, Default)]
    struct Scripted {
        results: Arc<Mutex<VecDeque<Result<Snap, String>>>>,
        calls: Arc<Mutex<Vec<tokio::time::Instant>>>,
    }

    impl Scripted {
        fn new(results: Vec<Result<Snap, &str>>) -> Self {
            Self {
                results: Arc::new(Mutex::new(
                    results
                        .into_iter()
                        .map(|r| r.map_err(str::to_string))
                        .collect(),
                )),
                calls: Arc::default(),
            }
        }

        fn call_offsets(&self, start: tokio::time::Instant) -> Vec<u64> {
            self.calls
                .lock()
                .expect("lock")
                .iter()
                .map(|at| at.duration_since(start).as_secs())
                .collect()
        }
    }

    impl SnapshotSource for Scripted {
        type Snapshot = Snap;

        async fn fetch(&self) -> Result<Snap, Error> {
            self.calls
                .lock()
                .expect("lock")
                .push(tokio::time::Instant::now());
            let next = self.results.lock().expect("lock").pop_front();
            match next {
                Some(Ok(snap)) => Ok(snap),
                Some(Err(msg)) => Err(Error::Http(msg)),
                None => Err(Error::Http("exhausted".into())),
            }
        }
    }

    fn controller(
        results: Vec<Result<Snap, &str>>,
        store: Arc<dyn KeyValueStore>,
    ) -> PollController<Scripted> {
        PollController::new(Scripted::new(results), store, PollPolicy::departures())
    }

    #[test]
    fn test_backoff_table_holds_last_step() {
        let table = BackoffTable::default();
        let delays: Vec<u128> = (0..6).map(|n| table.delay_for(n).as_millis()).collect();
        assert_eq!(delays, vec![5000, 15000, 30000, 30000, 30000, 30000]);
        assert_eq!(BackoffTable::new(Vec::new()), BackoffTable::default());
    }

    #[test]
    fn test_policies_use_panel_intervals() {
        assert_eq!(PollPolicy::weather().normal_interval, Duration::from_secs(300));
        assert_eq!(PollPolicy::weather().cache_key, "weatherCache");
        assert_eq!(PollPolicy::departures().normal_interval, Duration::from_secs(60));
        assert_eq!(PollPolicy::departures().cache_key, "departuresCache");
    }

    #[tokio::test]
    async fn test_success_persists_and_schedules_normal_interval() {
        let store = Arc::new(MemoryStore::new());
        let mut ctl = controller(vec![Ok(Snap(7))], store.clone());

        let (outcome, delay) = ctl.poll_once().await;

        assert_eq!(outcome, PollOutcome::Live(Snap(7)));
        assert_eq!(delay, Duration::from_secs(60));
        assert_eq!(ctl.state().status, PanelStatus::Live);
        assert_eq!(ctl.state().snapshot, Some(Snap(7)));

        let record: CacheRecord<Snap> = load_json(&*store, "departuresCache")
            .expect("load")
            .expect("record present");
        assert_eq!(record.data, Snap(7));
        assert_eq!(record.fetched_at(), ctl.state().last_updated.map(trim_to_millis));
    }

    fn trim_to_millis(at: DateTime<Utc>) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(at.timestamp_millis()).expect("in range")
    }

    #[tokio::test]
    async fn test_failure_with_cache_shows_cached_snapshot() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let cached_at = Utc::now() - chrono::Duration::days(3);
        save_json(store.as_ref(), "departuresCache", &CacheRecord::new(cached_at, Snap(1)))
            .expect("seed cache");
        let mut ctl = controller(vec![Err("boom")], store);

        let (outcome, delay) = ctl.poll_once().await;

        assert!(matches!(outcome, PollOutcome::Cached(ref r) if r.data == Snap(1)));
        assert_eq!(delay, Duration::from_secs(5));
        assert!(ctl.state().is_cached());
        assert_eq!(ctl.state().snapshot, Some(Snap(1)));
        assert_eq!(ctl.state().last_updated, Some(trim_to_millis(cached_at)));
        assert_eq!(ctl.state().consecutive_failures, 1);
    }

    #[tokio::test]
    async fn test_failure_without_cache_keeps_prior_snapshot() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let mut ctl = controller(vec![Err("offline")], store);
        let (outcome, _) = ctl.poll_once().await;
        assert_eq!(
            outcome,
            PollOutcome::Error("HTTP request failed: offline".into())
        );
        assert_eq!(ctl.state().snapshot, None);
        assert_eq!(ctl.state().error(), Some("HTTP request failed: offline"));

        // A live snapshot that is not in the store (write failed) stays visible.
        let failing_store: Arc<dyn KeyValueStore> = Arc::new(ReadOnlyStore);
        let mut ctl = controller(vec![Ok(Snap(3)), Err("offline")], failing_store);
        ctl.poll_once().await;
        let (outcome, _) = ctl.poll_once().await;
        assert!(matches!(outcome, PollOutcome::Error(_)));
        assert_eq!(ctl.state().snapshot, Some(Snap(3)));
        assert!(ctl.state().last_updated.is_some());
    }

    struct ReadOnlyStore;

    impl KeyValueStore for ReadOnlyStore {
        fn get(&self, _key: &str) -> Result<Option<String>, Error> {
            Ok(None)
        }

        fn set(&self, _key: &str, _value: String) -> Result<(), Error> {
            Err(Error::Store("read-only".into()))
        }
    }

    #[tokio::test]
    async fn test_corrupt_cache_counts_as_absent() {
        let store = Arc::new(MemoryStore::new());
        store.set("departuresCache", "{not json".into()).expect("seed");
        let mut ctl = controller(vec![Err("down")], store);

        let (outcome, _) = ctl.poll_once().await;
        assert!(matches!(outcome, PollOutcome::Error(_)));
    }

    #[tokio::test]
    async fn test_backoff_sequence_and_reset() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let mut ctl = controller(
            vec![Err("a"), Err("b"), Err("c"), Err("d"), Ok(Snap(1)), Err("e")],
            store,
        );

        let mut delays = Vec::new();
        for _ in 0..6 {
            let (_, delay) = ctl.poll_once().await;
            delays.push(delay.as_secs());
        }

        assert_eq!(delays, vec![5, 15, 30, 30, 60, 5]);
        assert_eq!(ctl.state().consecutive_failures, 1);
        // The success in between wrote a record, so the last failure is cached.
        assert!(ctl.state().is_cached());
    }

    #[tokio::test(start_paused = true)]
    async fn test_spawned_loop_schedules_one_attempt_per_resolution() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let source = Scripted::new(vec![Err("a"), Err("b"), Ok(Snap(9)), Err("c")]);
        let start = tokio::time::Instant::now();
        let handle =
            PollController::new(source.clone(), store, PollPolicy::departures()).spawn();
        let mut rx = handle.subscribe();

        rx.changed().await.expect("first publish");
        assert!(matches!(rx.borrow().status, PanelStatus::Error(_)));

        // 0 (fail) +5 → 5 (fail) +15 → 20 (ok) +60 → 80 (fail, cached) +5 → 85 ...
        tokio::time::sleep_until(start + Duration::from_secs(21)).await;
        let state = handle.current();
        assert_eq!(state.status, PanelStatus::Live);
        assert_eq!(state.snapshot, Some(Snap(9)));
        assert_eq!(state.consecutive_failures, 0);

        tokio::time::sleep_until(start + Duration::from_secs(81)).await;
        assert_eq!(source.call_offsets(start), vec![0, 5, 20, 80]);
        let state = handle.current();
        assert_eq!(state.status, PanelStatus::Cached);
        assert_eq!(state.snapshot, Some(Snap(9)));
        assert_eq!(state.consecutive_failures, 1);

        handle.shutdown().await;
        let calls_at_shutdown = source.call_offsets(start).len();
        tokio::time::sleep(Duration::from_secs(600)).await;
        assert_eq!(source.call_offsets(start).len(), calls_at_shutdown);
    }

    /// Blocks inside `fetch` until released.
    #[derive(Clone, Default)]
    struct Gated {
        started: Arc<Notify>,
        release: Arc<Notify>,
    }

    impl SnapshotSource for Gated {
        type Snapshot = Snap;

        async fn fetch(&self) -> Result<Snap, Error> {
            self.started.notify_one();
            self.release.notified().await;
            Ok(Snap(42))
        }
    }

    #[tokio::test]
    async fn test_fetch_resolving_after_teardown_is_ignored() {
        let store = Arc::new(MemoryStore::new());
        let gated = Gated::default();
        let handle = PollController::new(
            gated.clone(),
            store.clone() as Arc<dyn KeyValueStore>,
            PollPolicy::weather(),
        )
        .spawn();
        let rx = handle.subscribe();

        let fetching = handle.fetching();

        gated.started.notified().await;
        assert!(*fetching.borrow());
        handle.cancel();
        gated.release.notify_one();
        handle.shutdown().await;

        assert_eq!(rx.borrow().status, PanelStatus::Loading);
        assert_eq!(rx.borrow().snapshot, None);
        assert!(!*fetching.borrow());
        assert!(store.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_does_not_wait_for_hung_fetch() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let gated = Gated::default();
        let handle = PollController::new(gated.clone(), store, PollPolicy::departures()).spawn();
        let rx = handle.subscribe();

        gated.started.notified().await;
        let stopped = handle.shutdown_within(Duration::from_secs(2)).await;

        assert!(!stopped);
        // Released after teardown: nothing is published.
        gated.release.notify_one();
        tokio::task::yield_now().await;
        assert_eq!(rx.borrow().status, PanelStatus::Loading);
    }
}
