//! Observable engine outputs.

use tokio::sync::{broadcast, watch};

use tasksync_common::Record;

use crate::state::SyncStatus;

/// Capacity of the status event channel.
const STATUS_EVENT_CAPACITY: usize = 64;

/// Watch channels the engine publishes on.
///
/// Every publish uses `send_replace`, so subscribers are notified of each
/// recomputation even when the value did not change. Status changes are also
/// broadcast one by one for subscribers that need the full sequence.
pub struct EngineObservers {
    records: watch::Sender<Vec<Record>>,
    status: watch::Sender<SyncStatus>,
    status_events: broadcast::Sender<SyncStatus>,
    loading: watch::Sender<bool>,
}

impl EngineObservers {
    pub fn new() -> Self {
        Self {
            records: watch::channel(Vec::new()).0,
            status: watch::channel(SyncStatus::Idle).0,
            status_events: broadcast::channel(STATUS_EVENT_CAPACITY).0,
            loading: watch::channel(false).0,
        }
    }

    pub fn publish_records(&self, records: &[Record]) {
        self.records.send_replace(records.to_vec());
    }

    pub fn publish_status(&self, status: &SyncStatus) {
        self.status.send_replace(status.clone());
        // No subscribers is fine.
        let _ = self.status_events.send(status.clone());
    }

    pub fn publish_loading(&self, loading: bool) {
        self.loading.send_replace(loading);
    }

    pub fn subscribe_records(&self) -> watch::Receiver<Vec<Record>> {
        self.records.subscribe()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<SyncStatus> {
        self.status.subscribe()
    }

    pub fn subscribe_status_events(&self) -> broadcast::Receiver<SyncStatus> {
        self.status_events.subscribe()
    }

    pub fn subscribe_loading(&self) -> watch::Receiver<bool> {
        self.loading.subscribe()
    }
}

impl Default for EngineObservers {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_identical_values_still_notify() {
        let observers = EngineObservers::new();
        let mut rx = observers.subscribe_records();

        observers.publish_records(&[]);
        assert!(rx.has_changed().unwrap());
        rx.borrow_and_update();

        observers.publish_records(&[]);
        assert!(rx.has_changed().unwrap());
    }

    #[tokio::test]
    async fn test_status_subscribers_see_latest() {
        let observers = EngineObservers::new();
        let rx = observers.subscribe_status();

        observers.publish_status(&SyncStatus::Syncing);
        observers.publish_status(&SyncStatus::Success);
        assert_eq!(*rx.borrow(), SyncStatus::Success);
    }

    #[tokio::test]
    async fn test_status_events_keep_every_change() {
        let observers = EngineObservers::new();
        let mut events = observers.subscribe_status_events();

        observers.publish_status(&SyncStatus::Idle);
        observers.publish_status(&SyncStatus::Syncing);
        observers.publish_status(&SyncStatus::Success);

        assert_eq!(events.recv().await.unwrap(), SyncStatus::Idle);
        assert_eq!(events.recv().await.unwrap(), SyncStatus::Syncing);
        assert_eq!(events.recv().await.unwrap(), SyncStatus::Success);
    }

    #[test]
    fn test_publish_without_subscribers() {
        let observers = EngineObservers::new();
        observers.publish_loading(true);
        assert!(*observers.subscribe_loading().borrow());
    }
}
