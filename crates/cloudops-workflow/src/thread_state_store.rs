use std::collections::HashMap;
use std::sync::Mutex;

use thiserror::Error;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
/// Lifecycle state of one Slack thread.
pub struct ThreadRecord {
    pub claimed: bool,
    pub work_item_id: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ThreadStateError {
    #[error("thread {thread_ts} was never claimed for ticket creation")]
    Unclaimed { thread_ts: String },
    #[error("thread {thread_ts} already has work item {existing} recorded")]
    AlreadyRecorded { thread_ts: String, existing: u64 },
}

/// Process-lifetime map from thread root timestamp to its ticket state.
///
/// `try_claim` is the only synchronization point between concurrent reaction
/// tasks; the lock is released before any network call.
#[derive(Debug, Default)]
pub struct ThreadStateStore {
    threads: Mutex<HashMap<String, ThreadRecord>>,
}

impl ThreadStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically marks `thread_ts` as claimed. Returns `false` when it already was.
    pub fn try_claim(&self, thread_ts: &str) -> bool {
        let mut threads = self.lock();
        let record = threads.entry(thread_ts.to_string()).or_default();
        if record.claimed {
            return false;
        }
        record.claimed = true;
        true
    }

    pub fn record_ticket(&self, thread_ts: &str, ticket_id: u64) -> Result<(), ThreadStateError> {
        let mut threads = self.lock();
        let result = match threads.get_mut(thread_ts) {
            Some(record) if record.claimed => match record.work_item_id {
                Some(existing) => Err(ThreadStateError::AlreadyRecorded {
                    thread_ts: thread_ts.to_string(),
                    existing,
                }),
                None => {
                    record.work_item_id = Some(ticket_id);
                    Ok(())
                }
            },
            _ => Err(ThreadStateError::Unclaimed {
                thread_ts: thread_ts.to_string(),
            }),
        };
        drop(threads);
        debug_assert!(result.is_ok(), "thread state conflict: {result:?}");
        result
    }

    pub fn lookup_ticket(&self, thread_ts: &str) -> Option<u64> {
        self.lock()
            .get(thread_ts)
            .and_then(|record| record.work_item_id)
    }

    /// Clears an unfulfilled claim so a later trigger may retry creation.
    /// Threads with a recorded ticket keep their claim.
    pub fn release_claim(&self, thread_ts: &str) -> bool {
        let mut threads = self.lock();
        match threads.get_mut(thread_ts) {
            Some(record) if record.claimed && record.work_item_id.is_none() => {
                record.claimed = false;
                true
            }
            _ => false,
        }
    }

    pub fn record(&self, thread_ts: &str) -> Option<ThreadRecord> {
        self.lock().get(thread_ts).copied()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, ThreadRecord>> {
        // A poisoned map is still structurally valid; every update is a single assignment.
        self.threads
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::{ThreadRecord, ThreadStateStore};

    #[test]
    fn unit_try_claim_is_test_and_set() {
        let store = ThreadStateStore::new();
        assert!(store.try_claim("1700000000.000100"));
        assert!(!store.try_claim("1700000000.000100"));
        assert!(store.try_claim("1700000000.000200"));
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn functional_record_and_lookup_ticket() {
        let store = ThreadStateStore::new();
        assert_eq!(store.lookup_ticket("t1"), None);
        assert!(store.try_claim("t1"));
        store.record_ticket("t1", 1234).expect("record");
        assert_eq!(store.lookup_ticket("t1"), Some(1234));
        assert_eq!(
            store.record("t1"),
            Some(ThreadRecord {
                claimed: true,
                work_item_id: Some(1234)
            })
        );
    }

    #[test]
    fn functional_release_claim_only_clears_unfulfilled_claims() {
        let store = ThreadStateStore::new();
        assert!(!store.release_claim("missing"));

        assert!(store.try_claim("t1"));
        assert!(store.release_claim("t1"));
        assert_eq!(
            store.record("t1"),
            Some(ThreadRecord {
                claimed: false,
                work_item_id: None
            })
        );
        assert!(store.try_claim("t1"));

        store.record_ticket("t1", 7).expect("record");
        assert!(!store.release_claim("t1"));
        assert_eq!(store.lookup_ticket("t1"), Some(7));
    }

    #[test]
    fn integration_concurrent_claims_admit_exactly_one_winner() {
        let store = Arc::new(ThreadStateStore::new());
        let handles = (0..16)
            .map(|_| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || store.try_claim("1700000000.000100"))
            })
            .collect::<Vec<_>>();
        let winners = handles
            .into_iter()
            .map(|handle| handle.join().expect("join"))
            .filter(|claimed| *claimed)
            .count();
        assert_eq!(winners, 1);
    }

    #[cfg(debug_assertions)]
    #[test]
    #[should_panic(expected = "thread state conflict")]
    fn regression_record_ticket_without_claim_panics_in_debug_builds() {
        let store = ThreadStateStore::new();
        let _ = store.record_ticket("t1", 1);
    }

    #[cfg(debug_assertions)]
    #[test]
    #[should_panic(expected = "thread state conflict")]
    fn regression_record_ticket_twice_panics_in_debug_builds() {
        let store = ThreadStateStore::new();
        assert!(store.try_claim("t1"));
        store.record_ticket("t1", 1).expect("first record");
        let _ = store.record_ticket("t1", 2);
    }

    #[cfg(not(debug_assertions))]
    #[test]
    fn regression_record_ticket_conflicts_return_errors_in_release_builds() {
        let store = ThreadStateStore::new();
        assert!(store.record_ticket("t1", 1).is_err());
        assert!(store.try_claim("t1"));
        store.record_ticket("t1", 1).expect("first record");
        assert!(store.record_ticket("t1", 2).is_err());
        assert_eq!(store.lookup_ticket("t1"), Some(1));
    }
}
