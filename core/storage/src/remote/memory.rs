//! In-memory remote authority for testing.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tracing::debug;

use super::RemoteClient;
use tasksync_common::{Error, Record, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Call {
    Create,
    Update,
}

#[derive(Debug, Default)]
struct RemoteState {
    records: Vec<Record>,
    next_id: Option<u64>,
    fail_next: usize,
    fail_next_list: usize,
    failing_ids: HashSet<String>,
    list_calls: usize,
    create_calls: usize,
    update_calls: usize,
    in_flight: HashMap<String, usize>,
    max_in_flight: HashMap<String, usize>,
    submitted: Vec<Record>,
}

impl RemoteState {
    fn take_failure(&mut self, id: Option<&str>) -> Result<()> {
        if self.fail_next > 0 {
            self.fail_next -= 1;
            return Err(Error::Server(500));
        }
        if id.is_some_and(|id| self.failing_ids.contains(id)) {
            return Err(Error::Server(500));
        }
        Ok(())
    }

    fn upsert(&mut self, record: Record) {
        match self.records.iter_mut().find(|r| r.id == record.id) {
            Some(existing) => *existing = record,
            None => self.records.push(record),
        }
    }
}

/// Remote authority kept in memory.
///
/// Stands in for the task server in tests: failures can be injected, ids can
/// be assigned by the authority, and every call is counted. Both `create` and
/// `update` upsert by id.
#[derive(Debug, Default)]
pub struct MemoryRemote {
    state: Mutex<RemoteState>,
    latency: Option<Duration>,
}

impl MemoryRemote {
    /// Create an empty authority.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an authority that already holds `records`.
    pub fn with_records(records: Vec<Record>) -> Self {
        Self {
            state: Mutex::new(RemoteState {
                records,
                ..RemoteState::default()
            }),
            latency: None,
        }
    }

    /// Replace submitted ids on create with sequential ids starting at `first`.
    pub fn with_sequential_ids(self, first: u64) -> Self {
        if let Ok(mut state) = self.state.lock() {
            state.next_id = Some(first);
        }
        self
    }

    /// Delay every call by `latency` before it is answered.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    fn state(&self) -> Result<MutexGuard<'_, RemoteState>> {
        self.state
            .lock()
            .map_err(|_| Error::Transport("Memory remote lock poisoned".to_string()))
    }

    /// Fail the next `count` calls of any kind with HTTP 500.
    pub fn fail_next(&self, count: usize) {
        if let Ok(mut state) = self.state() {
            state.fail_next = count;
        }
    }

    /// Fail the next `count` list calls with HTTP 500, leaving writes alone.
    pub fn fail_next_list(&self, count: usize) {
        if let Ok(mut state) = self.state() {
            state.fail_next_list = count;
        }
    }

    /// Fail every create or update for the given ids with HTTP 500.
    pub fn fail_ids<I, S>(&self, ids: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if let Ok(mut state) = self.state() {
            state.failing_ids.extend(ids.into_iter().map(Into::into));
        }
    }

    /// Remove every injected failure.
    pub fn clear_failures(&self) {
        if let Ok(mut state) = self.state() {
            state.fail_next = 0;
            state.fail_next_list = 0;
            state.failing_ids.clear();
        }
    }

    /// Current collection.
    pub fn records(&self) -> Vec<Record> {
        self.state()
            .map(|state| state.records.clone())
            .unwrap_or_default()
    }

    pub fn list_calls(&self) -> usize {
        self.state().map(|state| state.list_calls).unwrap_or(0)
    }

    pub fn create_calls(&self) -> usize {
        self.state().map(|state| state.create_calls).unwrap_or(0)
    }

    pub fn update_calls(&self) -> usize {
        self.state().map(|state| state.update_calls).unwrap_or(0)
    }

    /// Every snapshot submitted through create or update, in arrival order.
    pub fn submitted(&self) -> Vec<Record> {
        self.state()
            .map(|state| state.submitted.clone())
            .unwrap_or_default()
    }

    /// Highest number of simultaneous writes ever observed for `id`.
    pub fn max_concurrent(&self, id: &str) -> usize {
        self.state()
            .map(|state| state.max_in_flight.get(id).copied().unwrap_or(0))
            .unwrap_or(0)
    }

    async fn write(&self, call: Call, record: &Record) -> Result<Vec<Record>> {
        {
            let mut state = self.state()?;
            match call {
                Call::Create => state.create_calls += 1,
                Call::Update => state.update_calls += 1,
            }
            state.submitted.push(record.clone());

            let current = {
                let entry = state.in_flight.entry(record.id.clone()).or_insert(0);
                *entry += 1;
                *entry
            };
            let peak = state.max_in_flight.entry(record.id.clone()).or_insert(0);
            *peak = (*peak).max(current);
        }

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        let mut state = self.state()?;
        if let Some(count) = state.in_flight.get_mut(&record.id) {
            *count = count.saturating_sub(1);
        }
        state.take_failure(Some(record.id.as_str()))?;

        let mut accepted = record.clone();
        if call == Call::Create {
            if let Some(next) = state.next_id.as_mut() {
                accepted.id = next.to_string();
                *next += 1;
            }
        }
        debug!("Memory remote accepted {:?} for {}", call, accepted.id);
        state.upsert(accepted);

        Ok(state.records.clone())
    }
}

#[async_trait]
impl RemoteClient for MemoryRemote {
    fn name(&self) -> &str {
        "memory"
    }

    async fn list(&self) -> Result<Vec<Record>> {
        {
            let mut state = self.state()?;
            state.list_calls += 1;
        }

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        let mut state = self.state()?;
        if state.fail_next_list > 0 {
            state.fail_next_list -= 1;
            return Err(Error::Server(500));
        }
        state.take_failure(None)?;
        Ok(state.records.clone())
    }

    async fn create(&self, record: &Record) -> Result<Vec<Record>> {
        self.write(Call::Create, record).await
    }

    async fn update(&self, record: &Record) -> Result<Vec<Record>> {
        self.write(Call::Update, record).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, name: &str) -> Record {
        Record::new(id, name, false, "2025-10-13 10:00:00")
    }

    #[tokio::test]
    async fn test_create_and_update_upsert() {
        let remote = MemoryRemote::new();

        let after_create = remote.create(&record("1", "draft")).await.unwrap();
        assert_eq!(after_create, vec![record("1", "draft")]);

        let after_update = remote.update(&record("1", "final")).await.unwrap();
        assert_eq!(after_update, vec![record("1", "final")]);

        assert_eq!(remote.create_calls(), 1);
        assert_eq!(remote.update_calls(), 1);
        assert_eq!(remote.submitted().len(), 2);
    }

    #[tokio::test]
    async fn test_sequential_ids() {
        let remote = MemoryRemote::new().with_sequential_ids(100);

        remote.create(&record("local-a", "a")).await.unwrap();
        let records = remote.create(&record("local-b", "b")).await.unwrap();

        let ids: Vec<_> = records.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["100", "101"]);
    }

    #[tokio::test]
    async fn test_fail_next() {
        let remote = MemoryRemote::with_records(vec![record("1", "a")]);
        remote.fail_next(2);

        assert!(matches!(remote.list().await, Err(Error::Server(500))));
        assert!(matches!(
            remote.update(&record("1", "b")).await,
            Err(Error::Server(500))
        ));
        assert_eq!(remote.list().await.unwrap(), vec![record("1", "a")]);
        assert_eq!(remote.list_calls(), 2);
    }

    #[tokio::test]
    async fn test_fail_next_list_spares_writes() {
        let remote = MemoryRemote::new();
        remote.fail_next_list(1);

        assert!(remote.create(&record("1", "a")).await.is_ok());
        assert!(remote.list().await.is_err());
        assert_eq!(remote.list().await.unwrap(), vec![record("1", "a")]);
    }

    #[tokio::test]
    async fn test_fail_ids() {
        let remote = MemoryRemote::new();
        remote.fail_ids(["bad"]);

        assert!(remote.create(&record("bad", "x")).await.is_err());
        assert!(remote.create(&record("good", "y")).await.is_ok());
        assert_eq!(remote.records(), vec![record("good", "y")]);

        remote.clear_failures();
        assert!(remote.create(&record("bad", "x")).await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_max_concurrent_tracks_overlap() {
        let remote = MemoryRemote::new().with_latency(Duration::from_millis(50));
        let item = record("1", "same");

        let (a, b) = tokio::join!(remote.create(&item), remote.update(&item));
        assert!(a.is_ok() && b.is_ok());
        assert_eq!(remote.max_concurrent("1"), 2);

        remote.update(&item).await.unwrap();
        assert_eq!(remote.max_concurrent("1"), 2);
        assert_eq!(remote.max_concurrent("other"), 0);
    }
}
