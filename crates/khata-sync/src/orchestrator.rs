//! # Sync Orchestrator
//!
//! Decides when reconciliation with the remote store happens and prevents
//! overlapping or excessive attempts. The actual exchange is delegated to
//! the external [`RemoteSyncGateway`].
//!
//! ## State Machine
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Orchestrator State Machine                          │
//! │                                                                         │
//! │            ┌──────────────────── IDLE ◄──────────────────┐             │
//! │            │                      │                       │             │
//! │   trigger fires                   │ attempt passes        │ gateway     │
//! │   while SYNCING                   │ in-flight, debounce,  │ call        │
//! │   → no-op                         │ and pre-flight guard  │ completes   │
//! │            │                      ▼                       │ (success    │
//! │            └───────────────── SYNCING ───────────────────┘  or not)    │
//! │                                                                         │
//! │  TRIGGERS (all funnel into the same attempt pipeline):                 │
//! │  1. Periodic               every sync_interval (default 6h)            │
//! │  2. Connectivity restored  offline→online edge, settle ~3s,            │
//! │                            suppressed inside the debounce window       │
//! │  3. Login                  auth false→true edge, settle ~2s            │
//! │  4. Manual                 caller-invoked, bypasses debounce           │
//! │                                                                         │
//! │  ATTEMPT PIPELINE:                                                     │
//! │  in-flight check → debounce check → guard (online AND authed)          │
//! │      → Syncing, stamp last_attempt → snapshot unsynced ids             │
//! │      → gateway.sync_all_data() → on success clear snapshot flags       │
//! │      → Idle, record outcome                                            │
//! │                                                                         │
//! │  Failed attempts are NOT retried; the next natural trigger             │
//! │  re-evaluates. Bounded retry pressure instead of backoff machinery.    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use khata_core::EntityKind;
use khata_db::{Database, DbError};

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::gateway::{RemoteSyncGateway, RemoteSyncStatus, SyncReport};
use crate::observer::{AuthProvider, NetworkObserver};

// =============================================================================
// Attempt Outcome Types
// =============================================================================

/// What set a sync attempt in motion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncTrigger {
    /// The recurring timer.
    Periodic,
    /// The network came back after being offline.
    ConnectivityRestored,
    /// A user newly authenticated.
    Login,
    /// Caller-invoked.
    Manual,
}

impl SyncTrigger {
    /// Whether the debounce window applies to this trigger.
    ///
    /// Only connectivity restorations are debounced: a flapping link can
    /// fire many times a minute, while the periodic timer is self-limiting
    /// and manual triggers are deliberate.
    const fn respects_debounce(&self) -> bool {
        matches!(self, SyncTrigger::ConnectivityRestored)
    }
}

impl std::fmt::Display for SyncTrigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncTrigger::Periodic => write!(f, "periodic"),
            SyncTrigger::ConnectivityRestored => write!(f, "connectivity_restored"),
            SyncTrigger::Login => write!(f, "login"),
            SyncTrigger::Manual => write!(f, "manual"),
        }
    }
}

/// Expected short-circuit outcomes of the attempt pipeline.
///
/// None of these are failures: the attempt is abandoned with no state
/// transition and no `last_attempt` stamp (except `AlreadySyncing`, where
/// the in-flight attempt owns the stamp), and the next natural trigger
/// re-evaluates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The network is not reachable.
    Offline,
    /// No user is authenticated.
    Unauthenticated,
    /// Another sync attempt is in flight.
    AlreadySyncing,
    /// A non-manual trigger fired inside the debounce window.
    Debounced,
    /// `restore_if_empty` found local data and refused to overwrite it.
    StoreNotEmpty,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::Offline => write!(f, "offline"),
            SkipReason::Unauthenticated => write!(f, "unauthenticated"),
            SkipReason::AlreadySyncing => write!(f, "already_syncing"),
            SkipReason::Debounced => write!(f, "debounced"),
            SkipReason::StoreNotEmpty => write!(f, "store_not_empty"),
        }
    }
}

/// Outcome of one trigger evaluation.
#[derive(Debug, Clone)]
pub enum SyncAttempt {
    /// The guard passed and the gateway was invoked.
    Completed(SyncReport),
    /// The attempt was abandoned before reaching the gateway.
    Skipped(SkipReason),
}

impl SyncAttempt {
    /// True when the gateway was invoked and reported success.
    pub fn is_success(&self) -> bool {
        matches!(self, SyncAttempt::Completed(report) if report.success)
    }
}

/// The two orchestrator states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Idle,
    Syncing,
}

/// Snapshot of the orchestrator for status screens.
#[derive(Debug, Clone)]
pub struct OrchestratorStatus {
    /// Current state.
    pub state: SyncState,

    /// When the last guarded attempt started (success or failure).
    pub last_attempt_at: Option<DateTime<Utc>>,

    /// Report of the last completed attempt.
    pub last_outcome: Option<SyncReport>,

    /// Rows currently awaiting upload, across all entity kinds.
    pub pending_count: i64,
}

// =============================================================================
// Internal State
// =============================================================================

/// Mutable trigger state, shared by all trigger tasks.
struct TriggerState {
    /// True while a gateway call is in flight.
    syncing: bool,

    /// Monotonic stamp of the last guarded attempt; the debounce window is
    /// measured from here. Virtual-time aware under tokio test-util.
    last_attempt: Option<Instant>,

    /// Wall-clock twin of `last_attempt`, for status display.
    last_attempt_at: Option<DateTime<Utc>>,

    /// Report of the last completed attempt.
    last_outcome: Option<SyncReport>,
}

/// Shared core of the orchestrator: everything the spawned trigger tasks
/// need.
struct Inner {
    config: SyncConfig,
    db: Database,
    gateway: Arc<dyn RemoteSyncGateway>,
    network: Arc<dyn NetworkObserver>,
    auth: Arc<dyn AuthProvider>,
    state: Mutex<TriggerState>,
}

impl Inner {
    /// Runs the full attempt pipeline for one trigger.
    async fn attempt(&self, trigger: SyncTrigger) -> SyncAttempt {
        if let Err(reason) = self.begin(trigger).await {
            debug!(%trigger, %reason, "Sync attempt skipped");
            return SyncAttempt::Skipped(reason);
        }

        info!(%trigger, "Sync attempt starting");

        // Snapshot the rows about to be transmitted BEFORE the exchange:
        // rows dirtied while the gateway runs must stay unsynced.
        let snapshot = match self.snapshot_unsynced().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                let report = SyncReport::failure(format!("unsynced snapshot failed: {}", e));
                warn!(%trigger, message = %report.message, "Sync attempt failed");
                self.finish(report.clone()).await;
                return SyncAttempt::Completed(report);
            }
        };

        let report = self.gateway.sync_all_data().await;

        if report.success {
            if let Err(e) = self.mark_snapshot_synced(&snapshot).await {
                warn!(?e, "Failed to clear synced flags after successful sync");
            }
            info!(message = %report.message, "Sync attempt succeeded");
        } else {
            // Recorded, not retried: the next natural trigger re-evaluates.
            warn!(message = %report.message, "Sync attempt failed");
        }

        self.finish(report.clone()).await;
        SyncAttempt::Completed(report)
    }

    /// In-flight check → debounce check → pre-flight guard → transition.
    ///
    /// Guard rejections leave no trace: no transition, no `last_attempt`
    /// stamp - an offline skip must not push the debounce window around.
    async fn begin(&self, trigger: SyncTrigger) -> Result<(), SkipReason> {
        let mut state = self.state.lock().await;

        if state.syncing {
            return Err(SkipReason::AlreadySyncing);
        }

        if trigger.respects_debounce() {
            if let Some(last) = state.last_attempt {
                if last.elapsed() < self.config.connectivity_debounce() {
                    return Err(SkipReason::Debounced);
                }
            }
        }

        if !self.network.is_online() {
            return Err(SkipReason::Offline);
        }
        if !self.auth.is_authenticated() {
            return Err(SkipReason::Unauthenticated);
        }

        state.syncing = true;
        state.last_attempt = Some(Instant::now());
        state.last_attempt_at = Some(Utc::now());
        Ok(())
    }

    /// Transition back to Idle and record the outcome.
    async fn finish(&self, report: SyncReport) {
        let mut state = self.state.lock().await;
        state.syncing = false;
        state.last_outcome = Some(report);
    }

    /// Collects the ids of every unsynced row, per entity kind.
    async fn snapshot_unsynced(&self) -> Result<Vec<(EntityKind, Vec<String>)>, DbError> {
        let sync = self.db.sync_state();
        let mut snapshot = Vec::with_capacity(EntityKind::ALL.len());
        for kind in EntityKind::ALL {
            snapshot.push((kind, sync.list_unsynced_ids(kind).await?));
        }
        Ok(snapshot)
    }

    /// Clears the synced flag on exactly the snapshotted rows.
    async fn mark_snapshot_synced(
        &self,
        snapshot: &[(EntityKind, Vec<String>)],
    ) -> Result<(), DbError> {
        let sync = self.db.sync_state();
        for (kind, ids) in snapshot {
            for id in ids {
                match sync.mark_synced(*kind, id).await {
                    Ok(()) => {}
                    // The row was deleted while the exchange ran; nothing
                    // left to flag.
                    Err(DbError::NotFound { .. }) => {}
                    Err(e) => return Err(e),
                }
            }
        }
        Ok(())
    }

    /// Marks every row of every kind synced (after a confirmed full push
    /// or restore).
    async fn mark_everything_synced(&self) -> Result<(), DbError> {
        let sync = self.db.sync_state();
        for kind in EntityKind::ALL {
            sync.mark_all_synced(kind).await?;
        }
        Ok(())
    }
}

// =============================================================================
// Sync Orchestrator
// =============================================================================

/// Owns the sync triggers and the single-in-flight discipline.
///
/// ## Lifecycle
/// ```rust,ignore
/// let mut orchestrator = SyncOrchestrator::new(config, db, gateway, network, auth);
/// orchestrator.start()?;          // spawns timer + watcher tasks
/// // ...
/// orchestrator.sync_now().await;  // manual trigger, any time
/// // ...
/// orchestrator.dispose();         // cancels everything; idempotent
/// ```
pub struct SyncOrchestrator {
    inner: Arc<Inner>,

    /// Handles of the spawned trigger tasks (empty until `start`).
    tasks: Vec<JoinHandle<()>>,

    /// Shutdown signal for the trigger tasks (None until `start`).
    shutdown: Option<watch::Sender<bool>>,
}

impl SyncOrchestrator {
    /// Creates an orchestrator. No background work starts until
    /// [`SyncOrchestrator::start`] is called; manual triggers work
    /// immediately.
    pub fn new(
        config: SyncConfig,
        db: Database,
        gateway: Arc<dyn RemoteSyncGateway>,
        network: Arc<dyn NetworkObserver>,
        auth: Arc<dyn AuthProvider>,
    ) -> Self {
        SyncOrchestrator {
            inner: Arc::new(Inner {
                config,
                db,
                gateway,
                network,
                auth,
                state: Mutex::new(TriggerState {
                    syncing: false,
                    last_attempt: None,
                    last_attempt_at: None,
                    last_outcome: None,
                }),
            }),
            tasks: Vec::new(),
            shutdown: None,
        }
    }

    /// Starts the trigger tasks: periodic timer, connectivity watcher,
    /// login watcher, and the stale-record cleanup timer.
    ///
    /// Errors with [`SyncError::AlreadyStarted`] if the tasks are already
    /// running; call [`SyncOrchestrator::dispose`] first.
    pub fn start(&mut self) -> SyncResult<()> {
        if self.shutdown.is_some() {
            return Err(SyncError::AlreadyStarted);
        }

        self.inner.config.validate()?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        info!(
            interval_secs = self.inner.config.timing.sync_interval_secs,
            debounce_secs = self.inner.config.timing.connectivity_debounce_secs,
            "Starting sync orchestrator"
        );

        // Subscribe (and read the baseline values) HERE, not inside the
        // spawned tasks: an edge arriving between spawn and first poll must
        // still be observed as a change.
        let network_rx = self.inner.network.subscribe();
        let initially_online = self.inner.network.is_online();
        let auth_rx = self.inner.auth.subscribe();
        let initially_authed = self.inner.auth.is_authenticated();

        self.tasks.push(tokio::spawn(periodic_task(
            self.inner.clone(),
            shutdown_rx.clone(),
        )));
        self.tasks.push(tokio::spawn(connectivity_task(
            self.inner.clone(),
            network_rx,
            initially_online,
            shutdown_rx.clone(),
        )));
        self.tasks.push(tokio::spawn(login_task(
            self.inner.clone(),
            auth_rx,
            initially_authed,
            shutdown_rx.clone(),
        )));
        self.tasks
            .push(tokio::spawn(cleanup_task(self.inner.clone(), shutdown_rx)));

        self.shutdown = Some(shutdown_tx);
        Ok(())
    }

    /// Stops scheduling future triggers and releases the timer and stream
    /// subscriptions. Safe to call more than once and on a never-started
    /// orchestrator. An in-flight gateway call is not interrupted.
    pub fn dispose(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(true);
            info!("Sync orchestrator disposed");
        }

        for handle in self.tasks.drain(..) {
            handle.abort();
        }
    }

    /// Manual trigger: bypasses the debounce window, still respects the
    /// single-in-flight guard and the pre-flight guard.
    pub async fn sync_now(&self) -> SyncAttempt {
        self.inner.attempt(SyncTrigger::Manual).await
    }

    /// One-directional push of all local data, bypassing normal
    /// reconciliation. Single-in-flight guarded, never debounced. On
    /// success every row of every kind is marked synced.
    pub async fn force_upload_all(&self) -> SyncAttempt {
        if let Err(reason) = self.inner.begin(SyncTrigger::Manual).await {
            debug!(%reason, "Force upload skipped");
            return SyncAttempt::Skipped(reason);
        }

        info!("Force upload starting");
        let report = self.inner.gateway.force_upload_all_data().await;

        if report.success {
            if let Err(e) = self.inner.mark_everything_synced().await {
                warn!(?e, "Failed to clear synced flags after force upload");
            }
        } else {
            warn!(message = %report.message, "Force upload failed");
        }

        self.inner.finish(report.clone()).await;
        SyncAttempt::Completed(report)
    }

    /// First-run restore: pulls remote state into an empty local store.
    /// Skipped with [`SkipReason::StoreNotEmpty`] when local data exists.
    pub async fn restore_if_empty(&self) -> SyncAttempt {
        match self.inner.db.is_empty().await {
            Ok(true) => {}
            Ok(false) => return SyncAttempt::Skipped(SkipReason::StoreNotEmpty),
            Err(e) => {
                return SyncAttempt::Completed(SyncReport::failure(format!(
                    "empty-store check failed: {}",
                    e
                )))
            }
        }

        if let Err(reason) = self.inner.begin(SyncTrigger::Manual).await {
            debug!(%reason, "Restore skipped");
            return SyncAttempt::Skipped(reason);
        }

        info!("First-run restore starting");
        let report = self.inner.gateway.restore_if_empty().await;

        if report.success {
            // Whatever the gateway wrote came FROM the remote store; it is
            // in sync by definition.
            if let Err(e) = self.inner.mark_everything_synced().await {
                warn!(?e, "Failed to flag restored rows as synced");
            }
        }

        self.inner.finish(report.clone()).await;
        SyncAttempt::Completed(report)
    }

    /// Current orchestrator status.
    pub async fn status(&self) -> OrchestratorStatus {
        let pending_count = self
            .inner
            .db
            .sync_state()
            .count_all_unsynced()
            .await
            .unwrap_or(0);

        let state = self.inner.state.lock().await;
        OrchestratorStatus {
            state: if state.syncing {
                SyncState::Syncing
            } else {
                SyncState::Idle
            },
            last_attempt_at: state.last_attempt_at,
            last_outcome: state.last_outcome.clone(),
            pending_count,
        }
    }

    /// Pass-through: the gateway's own status record.
    pub async fn remote_status(&self) -> RemoteSyncStatus {
        self.inner.gateway.sync_status().await
    }

    /// Pass-through: clears the gateway's recorded sync state.
    pub async fn reset_remote_status(&self) {
        self.inner.gateway.reset_sync_status().await;
    }
}

// =============================================================================
// Trigger Tasks
// =============================================================================

/// Fires a sync attempt every `sync_interval`.
async fn periodic_task(inner: Arc<Inner>, mut shutdown: watch::Receiver<bool>) {
    let period = inner.config.sync_interval();
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                inner.attempt(SyncTrigger::Periodic).await;
            }
            _ = shutdown.changed() => break,
        }
    }

    debug!("Periodic trigger stopped");
}

/// Fires a sync attempt on each offline→online edge, after a settle delay.
async fn connectivity_task(
    inner: Arc<Inner>,
    mut rx: watch::Receiver<bool>,
    mut online: bool,
    mut shutdown: watch::Receiver<bool>,
) {
    let settle = inner.config.connectivity_settle();

    loop {
        tokio::select! {
            changed = rx.changed() => {
                if changed.is_err() {
                    // Observer dropped; no more notifications will come.
                    break;
                }
                let now_online = *rx.borrow_and_update();
                eprintln!("DBG conn_task: edge now_online={} online={}", now_online, online);
                if now_online && !online {
                    debug!("Connectivity restored, waiting for link to settle");
                    sleep(settle).await;
                    eprintln!("DBG conn_task: settle done, attempting");
                    let r = inner.attempt(SyncTrigger::ConnectivityRestored).await;
                    eprintln!("DBG conn_task: attempt result {:?}", r);
                }
                online = now_online;
            }
            _ = shutdown.changed() => break,
        }
    }

    debug!("Connectivity trigger stopped");
}

/// Fires a sync attempt on each login (auth false→true edge), after a
/// settle delay.
async fn login_task(
    inner: Arc<Inner>,
    mut rx: watch::Receiver<bool>,
    mut authenticated: bool,
    mut shutdown: watch::Receiver<bool>,
) {
    let settle = inner.config.login_settle();

    loop {
        tokio::select! {
            changed = rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let now_authed = *rx.borrow_and_update();
                if now_authed && !authenticated {
                    debug!("Login detected, waiting for auth state to settle");
                    sleep(settle).await;
                    inner.attempt(SyncTrigger::Login).await;
                }
                authenticated = now_authed;
            }
            _ = shutdown.changed() => break,
        }
    }

    debug!("Login trigger stopped");
}

/// Ages out stale demand-planning data every `cleanup_interval`.
async fn cleanup_task(inner: Arc<Inner>, mut shutdown: watch::Receiver<bool>) {
    let period = inner.config.cleanup_interval();
    let age_days = inner.config.cleanup.age_days;
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(e) = inner.db.sync_state().cleanup_stale(age_days).await {
                    warn!(?e, "Stale-record cleanup failed");
                }
            }
            _ = shutdown.changed() => break,
        }
    }

    debug!("Cleanup timer stopped");
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use tokio::sync::Notify;

    use super::*;
    use crate::observer::{AuthState, NetworkState};
    use khata_db::DbConfig;
    use khata_core::NewClient;

    // =========================================================================
    // Test Doubles
    // =========================================================================

    /// Gateway that returns immediately and counts invocations.
    struct CountingGateway {
        sync_calls: AtomicUsize,
        force_calls: AtomicUsize,
        restore_calls: AtomicUsize,
        fail: AtomicBool,
    }

    impl CountingGateway {
        fn new() -> Self {
            CountingGateway {
                sync_calls: AtomicUsize::new(0),
                force_calls: AtomicUsize::new(0),
                restore_calls: AtomicUsize::new(0),
                fail: AtomicBool::new(false),
            }
        }

        fn sync_calls(&self) -> usize {
            self.sync_calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl RemoteSyncGateway for CountingGateway {
        async fn can_sync(&self) -> bool {
            true
        }

        async fn sync_all_data(&self) -> SyncReport {
            self.sync_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail.load(Ordering::SeqCst) {
                SyncReport::failure("remote unreachable")
            } else {
                SyncReport::ok("synced")
            }
        }

        async fn force_upload_all_data(&self) -> SyncReport {
            self.force_calls.fetch_add(1, Ordering::SeqCst);
            SyncReport::ok("uploaded")
        }

        async fn restore_if_empty(&self) -> SyncReport {
            self.restore_calls.fetch_add(1, Ordering::SeqCst);
            SyncReport::ok("restored")
        }

        async fn reset_sync_status(&self) {}

        async fn sync_status(&self) -> RemoteSyncStatus {
            RemoteSyncStatus::default()
        }
    }

    /// Gateway that blocks inside sync_all_data until released.
    struct BlockingGateway {
        started: AtomicBool,
        release: Notify,
        sync_calls: AtomicUsize,
    }

    impl BlockingGateway {
        fn new() -> Self {
            BlockingGateway {
                started: AtomicBool::new(false),
                release: Notify::new(),
                sync_calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl RemoteSyncGateway for BlockingGateway {
        async fn can_sync(&self) -> bool {
            true
        }

        async fn sync_all_data(&self) -> SyncReport {
            self.sync_calls.fetch_add(1, Ordering::SeqCst);
            self.started.store(true, Ordering::SeqCst);
            self.release.notified().await;
            SyncReport::ok("synced eventually")
        }

        async fn force_upload_all_data(&self) -> SyncReport {
            SyncReport::ok("uploaded")
        }

        async fn restore_if_empty(&self) -> SyncReport {
            SyncReport::ok("restored")
        }

        async fn reset_sync_status(&self) {}

        async fn sync_status(&self) -> RemoteSyncStatus {
            RemoteSyncStatus::default()
        }
    }

    // =========================================================================
    // Harness
    // =========================================================================

    struct Harness {
        orchestrator: SyncOrchestrator,
        gateway: Arc<CountingGateway>,
        network: Arc<NetworkState>,
        auth: Arc<AuthState>,
        db: Database,
    }

    async fn harness(online: bool, authenticated: bool) -> Harness {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let gateway = Arc::new(CountingGateway::new());
        let network = Arc::new(NetworkState::new(online));
        let auth = Arc::new(AuthState::new(authenticated));

        let orchestrator = SyncOrchestrator::new(
            SyncConfig::default(),
            db.clone(),
            gateway.clone(),
            network.clone(),
            auth.clone(),
        );

        Harness {
            orchestrator,
            gateway,
            network,
            auth,
            db,
        }
    }

    async fn seed_client(db: &Database) {
        db.clients()
            .insert(NewClient {
                name: "Test Client".to_string(),
                phone: None,
                address: None,
            })
            .await
            .unwrap();
    }

    /// Waits (in small virtual-time steps) until the gateway has been
    /// invoked `expected` times, then asserts the exact count.
    ///
    /// Paused-time tests need this: the attempt's store queries run on the
    /// blocking pool, so the virtual clock can outrun an in-flight attempt.
    async fn wait_for_calls(gateway: &CountingGateway, expected: usize) {
        for _ in 0..1_000 {
            if gateway.sync_calls() >= expected {
                break;
            }
            // The attempt's store queries run on the blocking pool (a real OS
            // thread). Under paused virtual time a `sleep` is auto-advanced
            // instantly and would outrun the in-flight query, so briefly resume
            // the real clock to give the blocking worker wall-clock time to land
            // before re-pausing.
            tokio::time::resume();
            tokio::time::sleep(Duration::from_millis(10)).await;
            tokio::time::pause();
        }
        assert_eq!(gateway.sync_calls(), expected);
    }

    // =========================================================================
    // Guard Tests
    // =========================================================================

    #[tokio::test]
    async fn offline_attempt_is_skipped_without_stamp() {
        let h = harness(false, true).await;

        let attempt = h.orchestrator.sync_now().await;
        assert!(matches!(attempt, SyncAttempt::Skipped(SkipReason::Offline)));
        assert_eq!(h.gateway.sync_calls(), 0);

        // Guard rejections never stamp last_attempt.
        let status = h.orchestrator.status().await;
        assert!(status.last_attempt_at.is_none());
        assert_eq!(status.state, SyncState::Idle);
    }

    #[tokio::test]
    async fn unauthenticated_attempt_is_skipped() {
        let h = harness(true, false).await;

        let attempt = h.orchestrator.sync_now().await;
        assert!(matches!(
            attempt,
            SyncAttempt::Skipped(SkipReason::Unauthenticated)
        ));
        assert_eq!(h.gateway.sync_calls(), 0);
    }

    #[tokio::test]
    async fn manual_sync_completes_and_records_outcome() {
        let h = harness(true, true).await;

        let attempt = h.orchestrator.sync_now().await;
        assert!(attempt.is_success());
        assert_eq!(h.gateway.sync_calls(), 1);

        let status = h.orchestrator.status().await;
        assert_eq!(status.state, SyncState::Idle);
        assert!(status.last_attempt_at.is_some());
        assert!(status.last_outcome.unwrap().success);
    }

    #[tokio::test]
    async fn manual_bypasses_debounce() {
        let h = harness(true, true).await;

        assert!(h.orchestrator.sync_now().await.is_success());
        // Immediately again - no debounce for manual triggers.
        assert!(h.orchestrator.sync_now().await.is_success());
        assert_eq!(h.gateway.sync_calls(), 2);
    }

    // =========================================================================
    // Single-In-Flight Tests
    // =========================================================================

    #[tokio::test]
    async fn second_attempt_while_syncing_is_a_noop() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let gateway = Arc::new(BlockingGateway::new());
        let orchestrator = Arc::new(SyncOrchestrator::new(
            SyncConfig::default(),
            db,
            gateway.clone(),
            Arc::new(NetworkState::new(true)),
            Arc::new(AuthState::new(true)),
        ));

        let first = {
            let orchestrator = orchestrator.clone();
            tokio::spawn(async move { orchestrator.sync_now().await })
        };

        // Wait until the gateway call is actually in flight.
        while !gateway.started.load(Ordering::SeqCst) {
            tokio::task::yield_now().await;
        }

        let second = orchestrator.sync_now().await;
        assert!(matches!(
            second,
            SyncAttempt::Skipped(SkipReason::AlreadySyncing)
        ));

        gateway.release.notify_one();
        let first = first.await.unwrap();
        assert!(first.is_success());
        assert_eq!(gateway.sync_calls.load(Ordering::SeqCst), 1);
    }

    // =========================================================================
    // Trigger Tests (paused virtual time)
    // =========================================================================

    #[tokio::test]
    async fn connectivity_triggers_are_debounced() {
        let mut h = harness(false, true).await;
        // Establish the pool under real time, then switch to virtual time so
        // the pool's acquire timeout cannot be auto-advanced past the in-flight
        // SQLite connect.
        tokio::time::pause();
        h.orchestrator.start().unwrap();

        // First restoration: settles 3s, then syncs.
        h.network.set_online(true);
        eprintln!("DBG before sleep: online={} calls={}", h.network.is_online(), h.gateway.sync_calls());
        tokio::time::sleep(Duration::from_secs(10)).await;
        eprintln!("DBG after 10s sleep: online={} calls={}", h.network.is_online(), h.gateway.sync_calls());
        wait_for_calls(&h.gateway, 1).await;

        // Second restoration inside the 5-minute window: suppressed.
        h.network.set_online(false);
        tokio::time::sleep(Duration::from_secs(30)).await;
        h.network.set_online(true);
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(h.gateway.sync_calls(), 1);

        // Past the window: honoured again.
        tokio::time::sleep(Duration::from_secs(301)).await;
        h.network.set_online(false);
        tokio::time::sleep(Duration::from_secs(1)).await;
        h.network.set_online(true);
        tokio::time::sleep(Duration::from_secs(10)).await;
        wait_for_calls(&h.gateway, 2).await;

        h.orchestrator.dispose();
    }

    #[tokio::test]
    async fn periodic_trigger_fires_every_interval() {
        let mut h = harness(true, true).await;
        // Establish the pool under real time, then switch to virtual time so
        // the pool's acquire timeout cannot be auto-advanced past the in-flight
        // SQLite connect.
        tokio::time::pause();
        h.orchestrator.start().unwrap();

        // Nothing before the interval elapses.
        tokio::time::sleep(Duration::from_secs(6 * 60 * 60 - 60)).await;
        assert_eq!(h.gateway.sync_calls(), 0);

        tokio::time::sleep(Duration::from_secs(120)).await;
        wait_for_calls(&h.gateway, 1).await;

        tokio::time::sleep(Duration::from_secs(6 * 60 * 60)).await;
        wait_for_calls(&h.gateway, 2).await;

        h.orchestrator.dispose();
    }

    #[tokio::test]
    async fn login_triggers_after_settle_delay() {
        let mut h = harness(true, false).await;
        // Establish the pool under real time, then switch to virtual time so
        // the pool's acquire timeout cannot be auto-advanced past the in-flight
        // SQLite connect.
        tokio::time::pause();
        h.orchestrator.start().unwrap();

        h.auth.set_authenticated(true);
        tokio::time::sleep(Duration::from_secs(5)).await;
        wait_for_calls(&h.gateway, 1).await;

        // Logout then login again: another login event.
        h.auth.set_authenticated(false);
        tokio::time::sleep(Duration::from_secs(1)).await;
        h.auth.set_authenticated(true);
        tokio::time::sleep(Duration::from_secs(5)).await;
        wait_for_calls(&h.gateway, 2).await;

        h.orchestrator.dispose();
    }

    #[tokio::test]
    async fn cleanup_timer_ages_out_stale_batches() {
        let mut h = harness(true, true).await;

        // A long-closed, fully synced batch (cleanup compares against the
        // real calendar, so an old demand_date is all it takes).
        let stale = h
            .db
            .demand()
            .open_batch("2020-01-01".parse().unwrap())
            .await
            .unwrap();
        h.db.demand().close_batch(&stale.id, false).await.unwrap();
        h.db.sync_state()
            .mark_synced(khata_core::EntityKind::DemandBatch, &stale.id)
            .await
            .unwrap();

        // Establish/seed the pool under real time, then switch to virtual time
        // so neither the pool's acquire timeout nor the cleanup timer can be
        // auto-advanced past an in-flight SQLite query.
        tokio::time::pause();
        h.orchestrator.start().unwrap();

        tokio::time::sleep(Duration::from_secs(7 * 24 * 60 * 60 + 60)).await;

        // The deletion runs on the blocking pool; give it bounded room.
        // Briefly resume the real clock each step so the blocking worker gets
        // wall-clock time instead of being outrun by auto-advanced virtual time.
        for _ in 0..1_000 {
            if h.db.demand().get_batch(&stale.id).await.unwrap().is_none() {
                break;
            }
            tokio::time::resume();
            tokio::time::sleep(Duration::from_millis(10)).await;
            tokio::time::pause();
        }
        assert!(h.db.demand().get_batch(&stale.id).await.unwrap().is_none());

        h.orchestrator.dispose();
    }

    // =========================================================================
    // Bookkeeping Tests
    // =========================================================================

    #[tokio::test]
    async fn successful_sync_clears_unsynced_markers() {
        let h = harness(true, true).await;
        seed_client(&h.db).await;

        assert_eq!(h.db.sync_state().count_all_unsynced().await.unwrap(), 1);

        assert!(h.orchestrator.sync_now().await.is_success());
        assert_eq!(h.db.sync_state().count_all_unsynced().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn failed_sync_keeps_unsynced_markers() {
        let h = harness(true, true).await;
        seed_client(&h.db).await;
        h.gateway.fail.store(true, Ordering::SeqCst);

        let attempt = h.orchestrator.sync_now().await;
        assert!(matches!(attempt, SyncAttempt::Completed(ref r) if !r.success));

        // Not retried; markers stay for the next natural trigger.
        assert_eq!(h.db.sync_state().count_all_unsynced().await.unwrap(), 1);
        assert_eq!(h.gateway.sync_calls(), 1);
    }

    #[tokio::test]
    async fn force_upload_marks_everything_synced() {
        let h = harness(true, true).await;
        seed_client(&h.db).await;

        let attempt = h.orchestrator.force_upload_all().await;
        assert!(attempt.is_success());
        assert_eq!(h.gateway.force_calls.load(Ordering::SeqCst), 1);
        assert_eq!(h.db.sync_state().count_all_unsynced().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn restore_only_runs_on_empty_store() {
        let h = harness(true, true).await;

        let attempt = h.orchestrator.restore_if_empty().await;
        assert!(attempt.is_success());
        assert_eq!(h.gateway.restore_calls.load(Ordering::SeqCst), 1);

        seed_client(&h.db).await;
        let attempt = h.orchestrator.restore_if_empty().await;
        assert!(matches!(
            attempt,
            SyncAttempt::Skipped(SkipReason::StoreNotEmpty)
        ));
        assert_eq!(h.gateway.restore_calls.load(Ordering::SeqCst), 1);
    }

    // =========================================================================
    // Lifecycle Tests
    // =========================================================================

    #[tokio::test]
    async fn start_twice_is_an_error() {
        let mut h = harness(true, true).await;

        h.orchestrator.start().unwrap();
        assert!(matches!(
            h.orchestrator.start(),
            Err(SyncError::AlreadyStarted)
        ));

        h.orchestrator.dispose();
    }

    #[tokio::test]
    async fn dispose_is_idempotent() {
        let mut h = harness(true, true).await;

        // Dispose before start is a no-op.
        h.orchestrator.dispose();

        h.orchestrator.start().unwrap();
        h.orchestrator.dispose();
        h.orchestrator.dispose();

        // And the orchestrator can be started again afterwards.
        h.orchestrator.start().unwrap();
        h.orchestrator.dispose();
    }

    #[tokio::test]
    async fn disposed_orchestrator_schedules_nothing() {
        let mut h = harness(false, true).await;
        // Establish the pool under real time, then switch to virtual time so
        // the pool's acquire timeout cannot be auto-advanced past the in-flight
        // SQLite connect.
        tokio::time::pause();
        h.orchestrator.start().unwrap();
        h.orchestrator.dispose();

        h.network.set_online(true);
        tokio::time::sleep(Duration::from_secs(7 * 60 * 60)).await;
        assert_eq!(h.gateway.sync_calls(), 0);
    }
}
