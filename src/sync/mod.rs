//! Background delivery of locally produced data (saved calculations,
//! settings, analytics) to the backend.
//!
//! Items wait in a journaled queue until a send succeeds or they have
//! failed `max_retries` times. Sends are attempted on enqueue, when
//! connectivity returns, when the client becomes visible and on a periodic
//! tick.

pub mod store;
pub mod transport;
pub mod types;

use crate::clock::Clock;
use crate::constants::{MAX_RETRIES, SYNC_INTERVAL};
use crate::error::SyncError;
use crate::rate_limit::AdaptiveRateLimiter;
use futures_util::future::join_all;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

pub use store::{FileSyncStore, MemorySyncStore, SyncStore};
pub use transport::{HttpSyncTransport, SyncPayload, SyncTransport};
pub use types::{
    JournalRecord, RemovalReason, SyncData, SyncDataType, SyncOutcome, SyncReport, SyncStats,
    SyncTrigger,
};

#[derive(Debug, Clone)]
pub struct SyncServiceConfig {
    pub max_retries: u32,
    pub sync_interval: Duration,
    pub start_online: bool,
}

impl Default for SyncServiceConfig {
    fn default() -> Self {
        Self {
            max_retries: MAX_RETRIES,
            sync_interval: SYNC_INTERVAL,
            start_online: true,
        }
    }
}

struct QueueState {
    pending: Vec<SyncData>,
    in_flight: HashSet<String>,
    abandoned: Vec<SyncData>,
    store: Box<dyn SyncStore>,
    stats: SyncStats,
}

impl QueueState {
    /// Journal a change already applied to `pending`. If the append fails
    /// the whole queue is checkpointed instead, so storage never lags
    /// memory. Errors only when both writes fail.
    fn persist(&mut self, record: JournalRecord) -> Result<(), SyncError> {
        if let Err(e) = self.store.append(&record) {
            warn!("Failed to append sync journal record, checkpointing instead: {}", e);
            return self.store.checkpoint(&self.pending);
        }
        if self.store.needs_checkpoint() {
            if let Err(e) = self.store.checkpoint(&self.pending) {
                error!("Failed to checkpoint sync queue: {}", e);
            }
        }
        Ok(())
    }

    fn persist_or_log(&mut self, record: JournalRecord) {
        if let Err(e) = self.persist(record) {
            error!("Sync queue could not be persisted: {}", e);
        }
    }
}

pub struct BackgroundSyncService {
    transport: Arc<dyn SyncTransport>,
    clock: Arc<dyn Clock>,
    limiter: Option<Arc<AdaptiveRateLimiter>>,
    config: SyncServiceConfig,
    state: Mutex<QueueState>,
    online: AtomicBool,
    syncing: AtomicBool,
}

/// Clears the `syncing` flag even if a `sync_all` future is dropped midway.
struct SyncingGuard<'a>(&'a AtomicBool);

impl Drop for SyncingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl BackgroundSyncService {
    /// Restores whatever `store` still holds from a previous run.
    pub fn new(
        transport: Arc<dyn SyncTransport>,
        mut store: Box<dyn SyncStore>,
        clock: Arc<dyn Clock>,
        config: SyncServiceConfig,
    ) -> Result<Self, SyncError> {
        let pending = store.load()?;
        if !pending.is_empty() {
            info!("Restored {} pending sync items", pending.len());
        }
        let stats = SyncStats {
            pending: pending.len(),
            ..SyncStats::default()
        };

        Ok(Self {
            transport,
            clock,
            limiter: None,
            online: AtomicBool::new(config.start_online),
            syncing: AtomicBool::new(false),
            config,
            state: Mutex::new(QueueState {
                pending,
                in_flight: HashSet::new(),
                abandoned: Vec::new(),
                store,
                stats,
            }),
        })
    }

    /// Gate every send through `limiter` and feed it the outcomes.
    pub fn with_rate_limiter(mut self, limiter: Arc<AdaptiveRateLimiter>) -> Self {
        self.limiter = Some(limiter);
        self
    }

    fn state(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    pub fn get_pending_count(&self) -> usize {
        self.state().pending.len()
    }

    pub fn pending(&self) -> Vec<SyncData> {
        self.state().pending.clone()
    }

    pub fn stats(&self) -> SyncStats {
        let state = self.state();
        SyncStats {
            pending: state.pending.len(),
            ..state.stats
        }
    }

    /// Items dropped after exhausting their retries since the last call.
    pub fn take_abandoned(&self) -> Vec<SyncData> {
        std::mem::take(&mut self.state().abandoned)
    }

    /// Queue `data` and, when online, try to send it right away. Returns the
    /// id of the queued item; a failed immediate send leaves it queued.
    pub async fn queue_for_sync(
        &self,
        data_type: SyncDataType,
        data: serde_json::Value,
    ) -> Result<String, SyncError> {
        let item = SyncData {
            id: Uuid::new_v4().to_string(),
            data_type,
            data,
            timestamp: self.clock.now_ms(),
            retry_count: 0,
        };
        let id = item.id.clone();

        {
            let mut state = self.state();
            state.pending.push(item.clone());
            if let Err(e) = state.persist(JournalRecord::Queued { item }) {
                state.pending.retain(|p| p.id != id);
                return Err(e);
            }
        }
        debug!("Queued {:?} item {} for sync", data_type, id);

        if self.is_online() {
            self.sync_item(&id).await;
        }
        Ok(id)
    }

    /// Attempt delivery of one queued item.
    pub async fn sync_item(&self, id: &str) -> SyncOutcome {
        let item = {
            let mut state = self.state();
            if state.in_flight.contains(id) {
                return SyncOutcome::InFlight;
            }
            match state.pending.iter().find(|p| p.id == id) {
                Some(item) => {
                    let item = item.clone();
                    state.in_flight.insert(id.to_string());
                    item
                }
                None => return SyncOutcome::Missing,
            }
        };

        if let Some(limiter) = &self.limiter {
            let admission = limiter.check_rate_limit();
            if !admission.allowed {
                let mut state = self.state();
                state.in_flight.remove(id);
                state.stats.deferred += 1;
                debug!("Sync of {} deferred by rate limiter", id);
                return SyncOutcome::Deferred {
                    retry_after: admission.retry_after,
                };
            }
        }

        let result = self.transport.send(&item).await;
        if let Some(limiter) = &self.limiter {
            limiter.record_result(result.is_ok());
        }
        self.apply_result(id, result)
    }

    fn apply_result(&self, id: &str, result: Result<(), SyncError>) -> SyncOutcome {
        let mut state = self.state();
        state.in_flight.remove(id);

        let Some(pos) = state.pending.iter().position(|p| p.id == id) else {
            // Cleared while the send was running
            return SyncOutcome::Missing;
        };

        match result {
            Ok(()) => {
                state.pending.remove(pos);
                state.stats.synced += 1;
                state.persist_or_log(JournalRecord::Removed {
                    id: id.to_string(),
                    reason: RemovalReason::Synced,
                });
                debug!("Synced item {}", id);
                SyncOutcome::Synced
            }
            Err(e) => {
                state.stats.failed_attempts += 1;
                state.pending[pos].retry_count += 1;
                let retry_count = state.pending[pos].retry_count;

                if retry_count >= self.config.max_retries {
                    let item = state.pending.remove(pos);
                    warn!(
                        "Abandoning {:?} item {} after {} failed attempts: {}",
                        item.data_type, id, retry_count, e
                    );
                    state.abandoned.push(item);
                    state.stats.abandoned += 1;
                    state.persist_or_log(JournalRecord::Removed {
                        id: id.to_string(),
                        reason: RemovalReason::Abandoned,
                    });
                    SyncOutcome::Abandoned
                } else {
                    warn!(
                        "Sync of item {} failed (attempt {}/{}): {}",
                        id, retry_count, self.config.max_retries, e
                    );
                    state.persist_or_log(JournalRecord::Retried {
                        id: id.to_string(),
                        retry_count,
                    });
                    SyncOutcome::Retry { retry_count }
                }
            }
        }
    }

    /// Attempt every pending item concurrently. A failing item never holds
    /// up the others. Does nothing while offline or while another
    /// `sync_all` is running.
    pub async fn sync_all(&self) -> SyncReport {
        if !self.is_online() {
            debug!("Offline, skipping sync");
            return SyncReport::default();
        }
        if self.syncing.swap(true, Ordering::SeqCst) {
            debug!("Sync already running");
            return SyncReport::default();
        }
        let _guard = SyncingGuard(&self.syncing);

        let ids: Vec<String> = self.state().pending.iter().map(|p| p.id.clone()).collect();
        if ids.is_empty() {
            return SyncReport::default();
        }

        let outcomes = join_all(ids.iter().map(|id| self.sync_item(id))).await;
        let mut report = SyncReport::default();
        for outcome in outcomes {
            report.record(outcome);
        }
        info!(
            "Sync pass: {} synced, {} retrying, {} abandoned, {} deferred",
            report.synced, report.retried, report.abandoned, report.deferred
        );
        report
    }

    /// Drop every pending item without sending it.
    pub fn clear_pending(&self) -> Result<(), SyncError> {
        let mut state = self.state();
        let cleared = std::mem::take(&mut state.pending);
        for item in &cleared {
            state.persist(JournalRecord::Removed {
                id: item.id.clone(),
                reason: RemovalReason::Cleared,
            })?;
        }
        info!("Cleared {} pending sync items", cleared.len());
        Ok(())
    }

    /// Fold the journal into a fresh snapshot.
    pub fn checkpoint(&self) -> Result<(), SyncError> {
        let mut state = self.state();
        let pending = state.pending.clone();
        state.store.checkpoint(&pending)
    }

    pub async fn handle_trigger(&self, trigger: SyncTrigger) -> SyncReport {
        match trigger {
            SyncTrigger::Online => {
                info!("Connection restored, syncing pending items");
                self.set_online(true);
                self.sync_all().await
            }
            SyncTrigger::Offline => {
                info!("Connection lost, pausing sync");
                self.set_online(false);
                SyncReport::default()
            }
            SyncTrigger::Visible | SyncTrigger::Periodic => self.sync_all().await,
        }
    }

    /// Spawn the trigger loop. Pending items restored from storage are
    /// flushed first when online.
    pub fn start(self: &Arc<Self>) -> SyncHandle {
        let (trigger_tx, mut trigger_rx) = mpsc::channel(32);
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let service = Arc::clone(self);

        let join = tokio::spawn(async move {
            if service.is_online() && service.get_pending_count() > 0 {
                service.sync_all().await;
            }

            let period = service.config.sync_interval;
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        service.handle_trigger(SyncTrigger::Periodic).await;
                    }
                    trigger = trigger_rx.recv() => match trigger {
                        Some(trigger) => {
                            service.handle_trigger(trigger).await;
                        }
                        None => break,
                    },
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }

            if let Err(e) = service.checkpoint() {
                error!("Failed to checkpoint sync queue on shutdown: {}", e);
            }
            debug!("Sync loop stopped");
        });

        SyncHandle {
            triggers: trigger_tx,
            shutdown: shutdown_tx,
            join,
        }
    }
}

/// Running sync loop. Dropping the handle without `dispose` leaves the loop
/// running until its trigger channel closes.
pub struct SyncHandle {
    triggers: mpsc::Sender<SyncTrigger>,
    shutdown: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl SyncHandle {
    pub async fn trigger(&self, trigger: SyncTrigger) {
        if self.triggers.send(trigger).await.is_err() {
            warn!("Sync loop is gone, dropping {:?} trigger", trigger);
        }
    }

    /// Stop the loop and wait for its final checkpoint.
    pub async fn dispose(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.join.await {
            error!("Sync loop ended abnormally: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::rate_limit::{RateLimitAlgorithm, RateLimitConfig};
    use crate::constants::COMPACTION_THRESHOLD;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;
    use tempfile::tempdir;

    /// Fails the first `failures` sends, then succeeds.
    struct ScriptedTransport {
        failures: AtomicUsize,
        calls: AtomicUsize,
        sent: Mutex<Vec<String>>,
    }

    impl ScriptedTransport {
        fn failing(failures: usize) -> Arc<Self> {
            Arc::new(Self {
                failures: AtomicUsize::new(failures),
                calls: AtomicUsize::new(0),
                sent: Mutex::new(Vec::new()),
            })
        }

        fn always_failing() -> Arc<Self> {
            Self::failing(usize::MAX)
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl SyncTransport for ScriptedTransport {
        async fn send(&self, item: &SyncData) -> Result<(), SyncError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let remaining = self.failures.load(Ordering::SeqCst);
            if remaining > 0 {
                if remaining != usize::MAX {
                    self.failures.fetch_sub(1, Ordering::SeqCst);
                }
                return Err(SyncError::Http(500));
            }
            self.sent.lock().unwrap().push(item.id.clone());
            Ok(())
        }
    }

    /// Memory store shared across restarts that can be told to fail writes.
    #[derive(Default)]
    struct FlakyStore {
        inner: Arc<Mutex<MemorySyncStore>>,
        fail_queued: bool,
        fail_removed: bool,
        fail_checkpoint: bool,
    }

    impl FlakyStore {
        fn sharing(inner: &Arc<Mutex<MemorySyncStore>>) -> Self {
            Self {
                inner: Arc::clone(inner),
                ..Self::default()
            }
        }

        fn disk_full() -> SyncError {
            SyncError::Storage(std::io::Error::other("disk full"))
        }
    }

    impl SyncStore for FlakyStore {
        fn load(&mut self) -> Result<Vec<SyncData>, SyncError> {
            self.inner.lock().unwrap().load()
        }

        fn append(&mut self, record: &JournalRecord) -> Result<(), SyncError> {
            let fail = match record {
                JournalRecord::Queued { .. } => self.fail_queued,
                JournalRecord::Removed { .. } => self.fail_removed,
                JournalRecord::Retried { .. } => false,
            };
            if fail {
                return Err(Self::disk_full());
            }
            self.inner.lock().unwrap().append(record)
        }

        fn checkpoint(&mut self, pending: &[SyncData]) -> Result<(), SyncError> {
            if self.fail_checkpoint {
                return Err(Self::disk_full());
            }
            self.inner.lock().unwrap().checkpoint(pending)
        }
    }

    fn service(transport: Arc<ScriptedTransport>, online: bool) -> BackgroundSyncService {
        BackgroundSyncService::new(
            transport,
            Box::new(MemorySyncStore::new()),
            Arc::new(ManualClock::new(1_700_000_000_000)),
            SyncServiceConfig {
                start_online: online,
                ..SyncServiceConfig::default()
            },
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_queue_sends_immediately_when_online() {
        let transport = ScriptedTransport::failing(0);
        let svc = service(transport.clone(), true);

        let id = svc
            .queue_for_sync(SyncDataType::Calculation, json!({"price": 120.0}))
            .await
            .unwrap();

        assert_eq!(svc.get_pending_count(), 0);
        assert_eq!(transport.sent.lock().unwrap().as_slice(), &[id]);
        assert_eq!(svc.stats().synced, 1);
    }

    #[tokio::test]
    async fn test_offline_queue_waits_for_online_trigger() {
        let transport = ScriptedTransport::failing(0);
        let svc = service(transport.clone(), false);

        svc.queue_for_sync(SyncDataType::Settings, json!({"theme": "dark"}))
            .await
            .unwrap();
        svc.queue_for_sync(SyncDataType::Analytics, json!({"event": "view"}))
            .await
            .unwrap();
        assert_eq!(svc.get_pending_count(), 2);
        assert_eq!(transport.calls(), 0);

        assert_eq!(svc.sync_all().await, SyncReport::default());

        let report = svc.handle_trigger(SyncTrigger::Online).await;
        assert_eq!(report.synced, 2);
        assert_eq!(svc.get_pending_count(), 0);
    }

    #[tokio::test]
    async fn test_always_failing_item_dropped_after_max_retries() {
        let transport = ScriptedTransport::always_failing();
        let svc = service(transport.clone(), false);
        svc.queue_for_sync(SyncDataType::Calculation, json!({"price": 1.0}))
            .await
            .unwrap();
        svc.set_online(true);

        let first = svc.sync_all().await;
        assert_eq!(first.retried, 1);
        assert_eq!(svc.pending()[0].retry_count, 1);

        let second = svc.sync_all().await;
        assert_eq!(second.retried, 1);
        assert_eq!(svc.get_pending_count(), 1);

        let third = svc.sync_all().await;
        assert_eq!(third.abandoned, 1);
        assert_eq!(svc.get_pending_count(), 0);
        assert_eq!(transport.calls(), MAX_RETRIES as usize);

        let abandoned = svc.take_abandoned();
        assert_eq!(abandoned.len(), 1);
        assert_eq!(abandoned[0].retry_count, MAX_RETRIES);
        assert!(svc.take_abandoned().is_empty());
        assert_eq!(svc.stats().abandoned, 1);
    }

    #[tokio::test]
    async fn test_one_failure_does_not_block_others() {
        let transport = ScriptedTransport::failing(1);
        let svc = service(transport.clone(), false);
        for i in 0..3 {
            svc.queue_for_sync(SyncDataType::UserData, json!({ "n": i }))
                .await
                .unwrap();
        }
        svc.set_online(true);

        let report = svc.sync_all().await;
        assert_eq!(report.attempted, 3);
        assert_eq!(report.synced, 2);
        assert_eq!(report.retried, 1);
        assert_eq!(svc.get_pending_count(), 1);

        let report = svc.sync_all().await;
        assert_eq!(report.synced, 1);
        assert_eq!(svc.get_pending_count(), 0);
    }

    #[tokio::test]
    async fn test_rate_limited_sends_do_not_burn_retries() {
        let transport = ScriptedTransport::failing(0);
        let clock = ManualClock::new(0);
        let limiter = Arc::new(AdaptiveRateLimiter::new(
            RateLimitConfig {
                max_requests: 1,
                window_ms: 1_000,
                burst_capacity: 0,
                algorithm: RateLimitAlgorithm::SlidingWindow,
                adaptive: false,
                ..RateLimitConfig::default()
            },
            Arc::new(clock.clone()),
        )
        .unwrap());
        let svc = service(transport.clone(), false).with_rate_limiter(limiter.clone());
        svc.queue_for_sync(SyncDataType::Calculation, json!({}))
            .await
            .unwrap();
        svc.queue_for_sync(SyncDataType::Calculation, json!({}))
            .await
            .unwrap();
        svc.set_online(true);

        let report = svc.sync_all().await;
        assert_eq!(report.synced, 1);
        assert_eq!(report.deferred, 1);
        assert_eq!(svc.pending()[0].retry_count, 0);
        assert_eq!(limiter.stats().success_rate, Some(1.0));

        clock.advance(1_000);
        let report = svc.sync_all().await;
        assert_eq!(report.synced, 1);
        assert_eq!(svc.get_pending_count(), 0);
    }

    #[tokio::test]
    async fn test_restart_restores_journaled_queue() {
        let dir = tempdir().unwrap();
        let clock = Arc::new(ManualClock::new(5));
        let failing = ScriptedTransport::always_failing();
        {
            let svc = BackgroundSyncService::new(
                failing.clone(),
                Box::new(FileSyncStore::open(dir.path()).unwrap()),
                clock.clone(),
                SyncServiceConfig::default(),
            )
            .unwrap();
            svc.queue_for_sync(SyncDataType::Calculation, json!({"price": 99.9}))
                .await
                .unwrap();
            assert_eq!(svc.pending()[0].retry_count, 1);
        }

        let healthy = ScriptedTransport::failing(0);
        let svc = Arc::new(
            BackgroundSyncService::new(
                healthy.clone(),
                Box::new(FileSyncStore::open(dir.path()).unwrap()),
                clock,
                SyncServiceConfig::default(),
            )
            .unwrap(),
        );
        assert_eq!(svc.get_pending_count(), 1);
        assert_eq!(svc.pending()[0].retry_count, 1);

        // Starting the loop flushes restored items
        let handle = svc.start();
        for _ in 0..100 {
            if svc.get_pending_count() == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        handle.dispose().await;
        assert_eq!(svc.get_pending_count(), 0);
        assert_eq!(healthy.calls(), 1);

        let reopened = FileSyncStore::open(dir.path()).unwrap().load().unwrap();
        assert!(reopened.is_empty());
    }

    #[tokio::test]
    async fn test_triggers_through_handle() {
        let transport = ScriptedTransport::failing(0);
        let svc = Arc::new(service(transport.clone(), false));
        svc.queue_for_sync(SyncDataType::Settings, json!({"lang": "pt-BR"}))
            .await
            .unwrap();

        let handle = svc.start();
        handle.trigger(SyncTrigger::Visible).await;
        handle.trigger(SyncTrigger::Online).await;
        for _ in 0..100 {
            if svc.get_pending_count() == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(svc.get_pending_count(), 0);
        assert!(svc.is_online());

        handle.trigger(SyncTrigger::Offline).await;
        for _ in 0..100 {
            if !svc.is_online() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(!svc.is_online());
        handle.dispose().await;
    }

    #[tokio::test]
    async fn test_clear_pending() {
        let svc = service(ScriptedTransport::failing(0), false);
        svc.queue_for_sync(SyncDataType::Analytics, json!({}))
            .await
            .unwrap();
        svc.clear_pending().unwrap();
        assert_eq!(svc.get_pending_count(), 0);
        assert_eq!(svc.sync_item("unknown").await, SyncOutcome::Missing);
    }

    #[tokio::test]
    async fn test_clear_pending_is_journaled() {
        let dir = tempdir().unwrap();
        let clock = Arc::new(ManualClock::new(0));
        let svc = BackgroundSyncService::new(
            ScriptedTransport::failing(0),
            Box::new(FileSyncStore::open(dir.path()).unwrap()),
            clock,
            SyncServiceConfig {
                start_online: false,
                ..SyncServiceConfig::default()
            },
        )
        .unwrap();
        for i in 0..2 {
            svc.queue_for_sync(SyncDataType::Analytics, json!({ "n": i }))
                .await
                .unwrap();
        }
        svc.clear_pending().unwrap();

        let mut store = FileSyncStore::open(dir.path()).unwrap();
        let log = std::fs::read_to_string(store.log_path()).unwrap();
        assert_eq!(log.matches(r#""reason":"cleared""#).count(), 2);
        assert!(store.load().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_removal_append_falls_back_to_checkpoint() {
        let transport = ScriptedTransport::failing(0);
        let shared = Arc::new(Mutex::new(MemorySyncStore::new()));
        let clock = Arc::new(ManualClock::new(0));
        {
            let store = FlakyStore {
                fail_removed: true,
                ..FlakyStore::sharing(&shared)
            };
            let svc = BackgroundSyncService::new(
                transport.clone(),
                Box::new(store),
                clock.clone(),
                SyncServiceConfig::default(),
            )
            .unwrap();
            svc.queue_for_sync(SyncDataType::Calculation, json!({"price": 42.0}))
                .await
                .unwrap();
            assert_eq!(svc.get_pending_count(), 0);
        }

        let restarted = BackgroundSyncService::new(
            transport.clone(),
            Box::new(FlakyStore::sharing(&shared)),
            clock,
            SyncServiceConfig::default(),
        )
        .unwrap();
        assert_eq!(restarted.get_pending_count(), 0);
        assert_eq!(restarted.sync_all().await, SyncReport::default());
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test]
    async fn test_queue_fails_when_nothing_can_be_persisted() {
        let transport = ScriptedTransport::failing(0);
        let store = FlakyStore {
            fail_queued: true,
            fail_checkpoint: true,
            ..FlakyStore::default()
        };
        let svc = BackgroundSyncService::new(
            transport.clone(),
            Box::new(store),
            Arc::new(ManualClock::new(0)),
            SyncServiceConfig::default(),
        )
        .unwrap();

        let err = svc
            .queue_for_sync(SyncDataType::Settings, json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::Storage(_)));
        assert_eq!(svc.get_pending_count(), 0);
        assert_eq!(transport.calls(), 0);
    }

    #[tokio::test]
    async fn test_offline_queue_compacts_journal() {
        let dir = tempdir().unwrap();
        let svc = BackgroundSyncService::new(
            ScriptedTransport::failing(0),
            Box::new(FileSyncStore::open(dir.path()).unwrap()),
            Arc::new(ManualClock::new(0)),
            SyncServiceConfig {
                start_online: false,
                ..SyncServiceConfig::default()
            },
        )
        .unwrap();
        for i in 0..(COMPACTION_THRESHOLD + 10) {
            svc.queue_for_sync(SyncDataType::Analytics, json!({ "n": i }))
                .await
                .unwrap();
        }

        let mut store = FileSyncStore::open(dir.path()).unwrap();
        let log = std::fs::read_to_string(store.log_path()).unwrap();
        assert_eq!(log.lines().count(), 10);
        let snapshot: Vec<SyncData> =
            serde_json::from_str(&std::fs::read_to_string(store.snapshot_path()).unwrap())
                .unwrap();
        assert_eq!(snapshot.len(), COMPACTION_THRESHOLD);
        assert_eq!(store.load().unwrap().len(), COMPACTION_THRESHOLD + 10);
    }
}
