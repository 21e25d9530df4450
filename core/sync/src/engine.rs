//! Core sync engine that routes reads and writes between the local store and
//! the remote authority.

use futures::stream::{self, StreamExt};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{broadcast, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use tasksync_common::{OperationKind, PendingOperation, Record, RecordDraft, Result};
use tasksync_storage::{LocalStore, RemoteClient};

use crate::config::SyncConfig;
use crate::merge::{compact, effective_operations, merge_view, EffectiveOperation};
use crate::observe::EngineObservers;
use crate::scheduler::{SyncScheduler, SyncTrigger};
use crate::state::{DrainOutcome, EngineState, SyncResult, SyncStatus};

/// Offline-first sync engine.
///
/// Online, reads and writes go to the remote authority and the accepted
/// collection becomes the canonical set. Offline (or when the remote call
/// fails) writes are applied to the local view immediately and queued; the
/// queue is replayed by [`SyncEngine::drain_pending`] on reconnection, on the
/// periodic timer, or after a successful fetch.
///
/// # Locking
/// Every load-modify-write of the store, the view and the status happens
/// under the state lock. Remote calls never hold it. A second lock makes the
/// drain single-flight.
pub struct SyncEngine<S: LocalStore + ?Sized, R: RemoteClient + ?Sized> {
    store: Arc<S>,
    remote: Arc<R>,
    connectivity: watch::Receiver<bool>,
    state: Mutex<EngineState>,
    drain_lock: Mutex<()>,
    observers: EngineObservers,
    config: SyncConfig,
}

impl<S: LocalStore + 'static, R: RemoteClient + 'static> SyncEngine<S, R> {
    /// Create a new sync engine.
    ///
    /// # Errors
    /// - `InvalidInput` if `config` is not usable
    pub fn new(
        store: S,
        remote: R,
        connectivity: watch::Receiver<bool>,
        config: SyncConfig,
    ) -> Result<Self> {
        Self::from_arc(Arc::new(store), Arc::new(remote), connectivity, config)
    }
}

impl<S: LocalStore + ?Sized + 'static, R: RemoteClient + ?Sized + 'static> SyncEngine<S, R> {
    /// Create a new sync engine from Arc-wrapped collaborators.
    ///
    /// The view starts empty; call [`SyncEngine::refresh_local`] or
    /// [`SyncEngine::list`] to load it.
    pub fn from_arc(
        store: Arc<S>,
        remote: Arc<R>,
        connectivity: watch::Receiver<bool>,
        config: SyncConfig,
    ) -> Result<Self> {
        config.validate()?;
        let online = *connectivity.borrow();

        Ok(Self {
            store,
            remote,
            connectivity,
            state: Mutex::new(EngineState::new(online)),
            drain_lock: Mutex::new(()),
            observers: EngineObservers::new(),
            config,
        })
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn remote(&self) -> &Arc<R> {
        &self.remote
    }

    /// Current value of the connectivity signal.
    pub fn is_online(&self) -> bool {
        *self.connectivity.borrow()
    }

    /// Current merged view.
    pub async fn records(&self) -> Vec<Record> {
        self.state.lock().await.records.clone()
    }

    pub async fn status(&self) -> SyncStatus {
        self.state.lock().await.sync_status.clone()
    }

    pub async fn is_loading(&self) -> bool {
        self.state.lock().await.is_loading
    }

    /// Snapshot of the engine state.
    pub async fn snapshot(&self) -> EngineState {
        self.state.lock().await.clone()
    }

    /// Queued operations, oldest first.
    pub async fn pending(&self) -> Result<Vec<PendingOperation>> {
        let _state = self.state.lock().await;
        self.store.load_pending().await
    }

    pub fn subscribe_records(&self) -> watch::Receiver<Vec<Record>> {
        self.observers.subscribe_records()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<SyncStatus> {
        self.observers.subscribe_status()
    }

    /// Every status change in order, including the ones a watch receiver
    /// would coalesce.
    pub fn subscribe_status_events(&self) -> broadcast::Receiver<SyncStatus> {
        self.observers.subscribe_status_events()
    }

    pub fn subscribe_loading(&self) -> watch::Receiver<bool> {
        self.observers.subscribe_loading()
    }

    pub fn subscribe_online(&self) -> watch::Receiver<bool> {
        self.connectivity.clone()
    }

    /// Rebuild the view from the store without touching the network.
    pub async fn refresh_local(&self) -> Result<Vec<Record>> {
        let mut state = self.state.lock().await;
        self.recompute(&mut state).await
    }

    /// Fetch the collection.
    ///
    /// Online, the remote collection becomes the canonical set and a
    /// non-empty queue is drained afterwards. When the remote fails, or
    /// offline, the local merged view is returned instead. Only local store
    /// failures are returned as errors.
    pub async fn list(&self) -> Result<Vec<Record>> {
        self.set_loading(true).await;
        let result = self.list_inner().await;
        self.set_loading(false).await;
        result
    }

    async fn list_inner(&self) -> Result<Vec<Record>> {
        if !self.is_online() {
            debug!("Offline, serving local view");
            return self.refresh_local().await;
        }

        self.begin_attempt().await;

        let fetched = match self.remote.list().await {
            Ok(records) => records,
            Err(e) => {
                warn!("Fetch failed, serving local view: {}", e);
                let mut state = self.state.lock().await;
                self.set_status(&mut state, SyncStatus::Error(e.to_string()));
                return self.recompute(&mut state).await;
            }
        };

        let queued = {
            let mut state = self.state.lock().await;
            let applied = self.apply_fetch(&mut state, &fetched).await;
            match applied {
                Ok(queued) => {
                    self.set_status(&mut state, SyncStatus::Success);
                    queued
                }
                Err(e) => {
                    error!("Failed to store fetched records: {}", e);
                    self.set_status(&mut state, SyncStatus::Error(e.to_string()));
                    return Err(e);
                }
            }
        };
        info!("Fetched {} records, {} queued", fetched.len(), queued);

        if queued > 0 && self.config.drain_after_fetch {
            self.drain_pending().await?;
        }

        Ok(self.records().await)
    }

    /// Save a fetched collection and recompute. Returns the queue length.
    async fn apply_fetch(&self, state: &mut EngineState, fetched: &[Record]) -> Result<usize> {
        self.store.save_canonical(fetched).await?;
        self.recompute(state).await?;
        self.store.pending_count().await
    }

    /// Create a record from `draft`.
    ///
    /// Returns the authority's copy when the remote accepted it, otherwise
    /// the locally built record, which is queued.
    pub async fn create(&self, draft: RecordDraft) -> Result<Record> {
        let record = Record::from_draft(draft);
        self.write(OperationKind::Create, record).await
    }

    /// Replace the record with the same id.
    pub async fn update(&self, record: Record) -> Result<Record> {
        self.write(OperationKind::Update, record).await
    }

    async fn write(&self, kind: OperationKind, record: Record) -> Result<Record> {
        if !self.is_online() {
            debug!("Offline, queueing {} for {}", kind, record.id);
            self.enqueue(kind, record.clone(), None).await?;
            return Ok(record);
        }

        // A queued snapshot of this id may be in flight in a drain; a direct
        // call could land before it and be overwritten.
        if self.is_queued(&record.id).await? {
            debug!("{} already queued, routing {} through the queue", record.id, kind);
            self.enqueue(kind, record.clone(), None).await?;
            self.drain_pending().await?;
            let current = self
                .records()
                .await
                .into_iter()
                .find(|r| r.id == record.id);
            return Ok(current.unwrap_or(record));
        }

        let result = match kind {
            OperationKind::Create => self.remote.create(&record).await,
            OperationKind::Update => self.remote.update(&record).await,
        };

        match result {
            Ok(accepted) => {
                let copy = authority_copy(&record, &accepted);
                debug!("Remote accepted {} for {}", kind, record.id);
                self.accept_remote(&record.id, &accepted).await?;
                Ok(copy)
            }
            Err(e) => {
                warn!("Remote {} for {} failed, queueing: {}", kind, record.id, e);
                self.enqueue(kind, record.clone(), Some(e.to_string()))
                    .await?;
                Ok(record)
            }
        }
    }

    async fn is_queued(&self, record_id: &str) -> Result<bool> {
        let _state = self.state.lock().await;
        let pending = self.store.load_pending().await?;
        Ok(pending.iter().any(|op| op.record_id() == record_id))
    }

    /// Store an accepted collection and drop queued writes it supersedes.
    async fn accept_remote(&self, record_id: &str, accepted: &[Record]) -> Result<()> {
        let mut state = self.state.lock().await;
        self.store.save_canonical(accepted).await?;

        let pending = self.store.load_pending().await?;
        if pending.iter().any(|op| op.record_id() == record_id) {
            let remaining: Vec<PendingOperation> = pending
                .into_iter()
                .filter(|op| op.record_id() != record_id)
                .collect();
            self.write_queue(&remaining).await?;
        }

        self.recompute(&mut state).await?;
        Ok(())
    }

    /// Queue a write and show it in the view right away.
    ///
    /// A write to an id that is already queued replaces that entry in place
    /// with a new operation id.
    async fn enqueue(
        &self,
        kind: OperationKind,
        record: Record,
        failure: Option<String>,
    ) -> Result<()> {
        let mut state = self.state.lock().await;
        let mut pending = self.store.load_pending().await?;

        match pending.iter().position(|op| op.record_id() == record.id) {
            Some(index) => {
                pending[index] = pending[index].superseded_by(kind, record);
                let compacted = compact(&pending);
                self.store.replace_pending(&compacted).await?;
            }
            None => {
                self.store
                    .append_pending(&PendingOperation::new(kind, record))
                    .await?;
            }
        }

        if let Some(reason) = failure {
            self.set_status(&mut state, SyncStatus::Error(reason));
        }
        self.recompute(&mut state).await?;
        Ok(())
    }

    /// Replay the queue against the remote.
    ///
    /// Single-flight: an overlapping call returns [`DrainOutcome::InFlight`]
    /// without doing anything. Each queued record is submitted once: as an
    /// update when the canonical set knows its id, as a create otherwise.
    pub async fn drain_pending(&self) -> Result<DrainOutcome> {
        if !self.is_online() {
            debug!("Offline, drain skipped");
            return Ok(DrainOutcome::Offline);
        }

        let _flight = match self.drain_lock.try_lock() {
            Ok(guard) => guard,
            Err(_) => {
                debug!("Drain already running");
                return Ok(DrainOutcome::InFlight);
            }
        };

        match self.drain_inner().await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                error!("Drain failed: {}", e);
                let mut state = self.state.lock().await;
                self.set_status(&mut state, SyncStatus::Error(e.to_string()));
                Err(e)
            }
        }
    }

    async fn drain_inner(&self) -> Result<DrainOutcome> {
        let start = Instant::now();

        let (known, operations) = {
            let mut state = self.state.lock().await;
            let pending = self.store.load_pending().await?;
            if pending.is_empty() {
                return Ok(DrainOutcome::Empty);
            }
            let canonical = self.store.load_canonical().await?;
            self.begin(&mut state);

            let known: HashSet<String> = canonical.into_iter().map(|r| r.id).collect();
            (known, effective_operations(&pending))
        };

        info!("Draining {} pending operations", operations.len());

        let known = &known;
        let results: Vec<(EffectiveOperation, Result<Vec<Record>>)> =
            stream::iter(operations.into_iter().map(|op| async move {
                let result = if known.contains(op.record_id()) {
                    debug!("Replaying update for {}", op.record_id());
                    self.remote.update(&op.snapshot).await
                } else {
                    debug!("Replaying create for {}", op.record_id());
                    self.remote.create(&op.snapshot).await
                };
                (op, result)
            }))
            .buffered(self.config.max_in_flight)
            .collect()
            .await;

        let mut acknowledged: HashSet<String> = HashSet::new();
        let mut last_accepted: Option<Vec<Record>> = None;
        let mut synced = 0;
        let mut failed = 0;

        for (op, result) in results {
            match result {
                Ok(records) => {
                    synced += 1;
                    acknowledged.extend(op.operation_ids);
                    last_accepted = Some(records);
                }
                Err(e) => {
                    failed += 1;
                    warn!("Replay for {} failed: {}", op.snapshot.id, e);
                }
            }
        }

        let refreshed = if synced > 0 {
            Some(self.remote.list().await)
        } else {
            None
        };

        let mut state = self.state.lock().await;

        let pending = self.store.load_pending().await?;
        let remaining: Vec<PendingOperation> = pending
            .into_iter()
            .filter(|op| !acknowledged.contains(&op.operation_id))
            .collect();
        self.write_queue(&compact(&remaining)).await?;

        let refresh_error = match refreshed {
            Some(Ok(records)) => {
                self.store.save_canonical(&records).await?;
                None
            }
            Some(Err(e)) => {
                warn!("Refresh after drain failed: {}", e);
                if let Some(records) = &last_accepted {
                    self.store.save_canonical(records).await?;
                }
                Some(e.to_string())
            }
            None => None,
        };

        let status = if failed > 0 {
            SyncStatus::Error(format!("{} operations failed", failed))
        } else if let Some(reason) = refresh_error {
            SyncStatus::Error(format!("refresh failed: {}", reason))
        } else {
            SyncStatus::Success
        };
        self.set_status(&mut state, status);
        self.recompute(&mut state).await?;

        let result = SyncResult {
            synced,
            failed,
            duration: start.elapsed(),
        };
        info!(
            "Drain finished: {} synced, {} failed in {:?}",
            result.synced, result.failed, result.duration
        );
        Ok(DrainOutcome::Completed(result))
    }

    /// React to a connectivity value.
    ///
    /// Going online drains the queue. Going offline only updates state: the
    /// merged view keeps being served.
    pub async fn handle_connectivity(&self, online: bool) -> Result<DrainOutcome> {
        let was_online = {
            let mut state = self.state.lock().await;
            std::mem::replace(&mut state.is_online, online)
        };

        if was_online != online {
            info!(
                "Connectivity: {} -> {}",
                if was_online { "online" } else { "offline" },
                if online { "online" } else { "offline" }
            );
        }

        if online {
            self.drain_pending().await
        } else {
            Ok(DrainOutcome::Offline)
        }
    }

    /// Handle one scheduler trigger.
    pub async fn handle_trigger(&self, trigger: SyncTrigger) -> Result<DrainOutcome> {
        match trigger {
            SyncTrigger::Connectivity(online) => self.handle_connectivity(online).await,
            SyncTrigger::Tick | SyncTrigger::Manual => self.drain_pending().await,
        }
    }

    /// Spawn the trigger loop for this engine.
    ///
    /// The loop drains on connectivity transitions and every
    /// `config.sync_interval`, and stops when the returned scheduler is shut
    /// down or dropped.
    pub fn spawn_scheduler(self: &Arc<Self>) -> (SyncScheduler, JoinHandle<()>) {
        let (scheduler, handle) = SyncScheduler::new(self.config.sync_interval);
        let engine = Arc::clone(self);
        let connectivity = self.connectivity.clone();

        let task = tokio::spawn(async move {
            handle
                .run(connectivity, move |trigger| {
                    let engine = engine.clone();
                    async move { engine.handle_trigger(trigger).await }
                })
                .await;
        });

        (scheduler, task)
    }

    async fn write_queue(&self, ops: &[PendingOperation]) -> Result<()> {
        if ops.is_empty() {
            self.store.clear_pending().await
        } else {
            self.store.replace_pending(ops).await
        }
    }

    async fn recompute(&self, state: &mut EngineState) -> Result<Vec<Record>> {
        let canonical = self.store.load_canonical().await?;
        let pending = self.store.load_pending().await?;

        state.records = merge_view(&canonical, &pending);
        self.observers.publish_records(&state.records);
        Ok(state.records.clone())
    }

    fn set_status(&self, state: &mut EngineState, status: SyncStatus) {
        self.observers.publish_status(&status);
        state.sync_status = status;
    }

    async fn set_loading(&self, loading: bool) {
        let mut state = self.state.lock().await;
        state.is_loading = loading;
        self.observers.publish_loading(loading);
    }

    /// Move to `Syncing`, passing through `Idle` when leaving a terminal state.
    fn begin(&self, state: &mut EngineState) {
        if state.sync_status.is_terminal() {
            self.set_status(state, SyncStatus::Idle);
        }
        self.set_status(state, SyncStatus::Syncing);
    }

    async fn begin_attempt(&self) {
        let mut state = self.state.lock().await;
        self.begin(&mut state);
    }
}

/// Pick the authority's copy of a submitted record.
///
/// Matched by id, else by timestamp and name (the authority may assign its
/// own id), else by timestamp alone; falls back to the submitted snapshot.
fn authority_copy(submitted: &Record, accepted: &[Record]) -> Record {
    accepted
        .iter()
        .find(|r| r.id == submitted.id)
        .or_else(|| {
            accepted
                .iter()
                .rev()
                .find(|r| r.timestamp == submitted.timestamp && r.name == submitted.name)
        })
        .or_else(|| {
            accepted
                .iter()
                .rev()
                .find(|r| r.timestamp == submitted.timestamp)
        })
        .cloned()
        .unwrap_or_else(|| submitted.clone())
}

impl<S: LocalStore + ?Sized, R: RemoteClient + ?Sized> std::fmt::Debug for SyncEngine<S, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("store", &self.store.name())
            .field("remote", &self.remote.name())
            .field("online", &*self.connectivity.borrow())
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connectivity::ConnectivityMonitor;
    use tasksync_common::Error;
    use tasksync_storage::{MemoryRemote, MemoryStore};

    type TestEngine = SyncEngine<MemoryStore, MemoryRemote>;

    fn record(id: &str, name: &str) -> Record {
        Record::new(id, name, false, "2025-10-13 10:00:00")
    }

    fn engine(
        online: bool,
        store: MemoryStore,
        remote: MemoryRemote,
    ) -> (Arc<TestEngine>, ConnectivityMonitor) {
        let monitor = ConnectivityMonitor::new(online);
        let engine =
            SyncEngine::new(store, remote, monitor.subscribe(), SyncConfig::default()).unwrap();
        (Arc::new(engine), monitor)
    }

    #[test]
    fn test_authority_copy_by_id() {
        let submitted = record("1", "local");
        let accepted = vec![record("1", "server"), record("2", "other")];
        assert_eq!(authority_copy(&submitted, &accepted).name, "server");
    }

    #[test]
    fn test_authority_copy_by_timestamp() {
        let submitted = Record::new("local-uuid", "Buy milk", false, "2025-10-13 11:00:00");
        let accepted = vec![
            record("1", "older"),
            Record::new("17", "Buy milk", false, "2025-10-13 11:00:00"),
        ];
        assert_eq!(authority_copy(&submitted, &accepted).id, "17");
    }

    #[test]
    fn test_authority_copy_falls_back_to_submitted() {
        let submitted = Record::new("local-uuid", "Buy milk", false, "2025-10-13 11:00:00");
        assert_eq!(authority_copy(&submitted, &[record("1", "x")]), submitted);
    }

    #[test]
    fn test_rejects_invalid_config() {
        let monitor = ConnectivityMonitor::new(true);
        let result = SyncEngine::new(
            MemoryStore::new(),
            MemoryRemote::new(),
            monitor.subscribe(),
            SyncConfig::default().with_max_in_flight(0),
        );
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_offline_write_is_queued_and_visible() {
        let store = MemoryStore::new();
        let (engine, _monitor) = engine(false, store.clone(), MemoryRemote::new());

        let created = engine.create(RecordDraft::new("Buy milk")).await.unwrap();

        assert_eq!(engine.records().await, vec![created.clone()]);
        let pending = store.load_pending().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].kind, OperationKind::Create);
        assert_eq!(pending[0].snapshot, created);
        assert_eq!(engine.status().await, SyncStatus::Idle);
        assert_eq!(engine.remote().create_calls(), 0);
    }

    #[tokio::test]
    async fn test_online_write_updates_canonical() {
        let store = MemoryStore::new();
        let (engine, _monitor) = engine(true, store.clone(), MemoryRemote::new());

        let created = engine.create(RecordDraft::new("Buy milk")).await.unwrap();

        assert_eq!(store.load_canonical().await.unwrap(), vec![created.clone()]);
        assert!(store.load_pending().await.unwrap().is_empty());
        assert_eq!(engine.records().await, vec![created]);
    }

    #[tokio::test]
    async fn test_failed_write_is_queued_with_error_status() {
        let store = MemoryStore::new();
        let remote = MemoryRemote::new();
        remote.fail_next(1);
        let (engine, _monitor) = engine(true, store.clone(), remote);

        let created = engine.create(RecordDraft::new("Buy milk")).await.unwrap();

        assert_eq!(store.pending_count().await.unwrap(), 1);
        assert_eq!(engine.records().await, vec![created]);
        assert!(engine.status().await.is_error());
    }

    #[tokio::test]
    async fn test_online_write_to_queued_id_goes_through_queue() {
        let queued = PendingOperation::new(OperationKind::Update, record("1", "offline edit"));
        let store = MemoryStore::with_contents(vec![record("1", "synced")], vec![queued]);
        let remote = MemoryRemote::with_records(vec![record("1", "synced")]);
        let (engine, _monitor) = engine(true, store.clone(), remote);

        let returned = engine.update(record("1", "online edit")).await.unwrap();

        assert_eq!(returned, record("1", "online edit"));
        assert!(store.load_pending().await.unwrap().is_empty());
        assert_eq!(engine.records().await, vec![record("1", "online edit")]);
        // The superseded offline edit is never submitted.
        assert_eq!(engine.remote().submitted(), vec![record("1", "online edit")]);
        assert_eq!(engine.status().await, SyncStatus::Success);
    }

    #[tokio::test]
    async fn test_repeated_offline_writes_keep_one_entry() {
        let store = MemoryStore::new();
        let (engine, _monitor) = engine(false, store.clone(), MemoryRemote::new());

        let created = engine.create(RecordDraft::new("v1")).await.unwrap();
        let first_op = store.load_pending().await.unwrap()[0].operation_id.clone();
        engine.update(created.with_name("v2")).await.unwrap();

        let pending = store.load_pending().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].kind, OperationKind::Create);
        assert_eq!(pending[0].snapshot.name, "v2");
        assert_ne!(pending[0].operation_id, first_op);
    }

    #[tokio::test]
    async fn test_list_offline_uses_local_view() {
        let queued = PendingOperation::new(OperationKind::Create, record("2", "queued"));
        let store = MemoryStore::with_contents(vec![record("1", "synced")], vec![queued]);
        let (engine, _monitor) = engine(false, store, MemoryRemote::new());

        let records = engine.list().await.unwrap();

        assert_eq!(records, vec![record("1", "synced"), record("2", "queued")]);
        assert_eq!(engine.remote().list_calls(), 0);
        assert!(!engine.is_loading().await);
    }

    #[tokio::test]
    async fn test_list_remote_failure_falls_back() {
        let store = MemoryStore::with_contents(vec![record("1", "cached")], vec![]);
        let remote = MemoryRemote::with_records(vec![record("9", "server")]);
        remote.fail_next(1);
        let (engine, _monitor) = engine(true, store.clone(), remote);

        let records = engine.list().await.unwrap();

        assert_eq!(records, vec![record("1", "cached")]);
        assert_eq!(store.load_canonical().await.unwrap(), vec![record("1", "cached")]);
        assert!(engine.status().await.is_error());
    }

    #[tokio::test]
    async fn test_list_online_replaces_canonical() {
        let store = MemoryStore::with_contents(vec![record("1", "stale")], vec![]);
        let remote = MemoryRemote::with_records(vec![record("1", "fresh"), record("2", "new")]);
        let (engine, _monitor) = engine(true, store.clone(), remote);

        let records = engine.list().await.unwrap();

        assert_eq!(records, vec![record("1", "fresh"), record("2", "new")]);
        assert_eq!(store.load_canonical().await.unwrap(), records);
        assert_eq!(engine.status().await, SyncStatus::Success);
    }

    #[tokio::test]
    async fn test_drain_outcomes_without_work() {
        let (engine, monitor) = engine(false, MemoryStore::new(), MemoryRemote::new());
        assert_eq!(engine.drain_pending().await.unwrap(), DrainOutcome::Offline);

        monitor.set_online(true);
        assert_eq!(engine.drain_pending().await.unwrap(), DrainOutcome::Empty);
        assert_eq!(engine.status().await, SyncStatus::Idle);
    }

    #[tokio::test]
    async fn test_drain_routes_by_canonical_membership() {
        // Kind says Create but the id is already canonical: replay as update.
        let queued = vec![
            PendingOperation::new(OperationKind::Create, record("1", "edited")),
            PendingOperation::new(OperationKind::Update, record("2", "brand new")),
        ];
        let store = MemoryStore::with_contents(vec![record("1", "synced")], queued);
        let remote = MemoryRemote::with_records(vec![record("1", "synced")]);
        let (engine, _monitor) = engine(true, store.clone(), remote);

        let outcome = engine.drain_pending().await.unwrap();

        assert_eq!(outcome.result().map(|r| (r.synced, r.failed)), Some((2, 0)));
        assert_eq!(engine.remote().update_calls(), 1);
        assert_eq!(engine.remote().create_calls(), 1);
        assert!(store.load_pending().await.unwrap().is_empty());
        assert_eq!(engine.status().await, SyncStatus::Success);
    }

    #[tokio::test]
    async fn test_drain_refresh_failure_keeps_accepted_set() {
        let queued = vec![PendingOperation::new(
            OperationKind::Create,
            record("1", "queued"),
        )];
        let store = MemoryStore::with_contents(vec![], queued);
        let remote = MemoryRemote::new();
        remote.fail_next_list(1);
        let (engine, _monitor) = engine(true, store.clone(), remote);

        let outcome = engine.drain_pending().await.unwrap();

        assert_eq!(outcome.result().map(|r| r.synced), Some(1));
        assert!(store.load_pending().await.unwrap().is_empty());
        assert_eq!(store.load_canonical().await.unwrap(), vec![record("1", "queued")]);
        match engine.status().await {
            SyncStatus::Error(reason) => assert!(reason.starts_with("refresh failed")),
            other => panic!("unexpected status {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_going_offline_does_not_touch_network() {
        let (engine, _monitor) = engine(true, MemoryStore::new(), MemoryRemote::new());

        let outcome = engine.handle_connectivity(false).await.unwrap();

        assert_eq!(outcome, DrainOutcome::Offline);
        assert!(!engine.snapshot().await.is_online);
        assert_eq!(engine.remote().list_calls(), 0);
    }

    #[tokio::test]
    async fn test_observers_see_recomputations() {
        let (engine, _monitor) = engine(false, MemoryStore::new(), MemoryRemote::new());
        let mut records_rx = engine.subscribe_records();

        engine.create(RecordDraft::new("watched")).await.unwrap();

        assert!(records_rx.has_changed().unwrap());
        assert_eq!(records_rx.borrow_and_update().len(), 1);

        engine.refresh_local().await.unwrap();
        assert!(records_rx.has_changed().unwrap());
    }
}
