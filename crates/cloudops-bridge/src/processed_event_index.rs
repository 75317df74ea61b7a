use std::collections::{HashSet, VecDeque};

/// Bounded record of Slack `event_id`s already accepted, oldest evicted first.
#[derive(Debug)]
pub struct ProcessedEventIndex {
    cap: usize,
    order: VecDeque<String>,
    index: HashSet<String>,
}

impl ProcessedEventIndex {
    pub fn new(cap: usize) -> Self {
        let cap = cap.max(1);
        Self {
            cap,
            order: VecDeque::with_capacity(cap.min(1_024)),
            index: HashSet::new(),
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.index.contains(key)
    }

    /// Returns `false` when `key` was already recorded.
    pub fn mark_processed(&mut self, key: &str) -> bool {
        if self.index.contains(key) {
            return false;
        }
        self.order.push_back(key.to_string());
        self.index.insert(key.to_string());
        while self.order.len() > self.cap {
            if let Some(evicted) = self.order.pop_front() {
                self.index.remove(&evicted);
            }
        }
        true
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}
