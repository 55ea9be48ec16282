//! Processed-event registry for redelivery suppression.
//!
//! Slack re-delivers an event when it does not see a timely 2xx, so the same
//! `event_id` can arrive more than once — including near-simultaneously on
//! parallel connections. The registry makes the check-and-record a single
//! atomic operation: exactly one caller observes "first", everyone else
//! observes "duplicate". The set is bounded with insertion-order eviction so
//! a long-running process does not grow without limit.

use std::collections::{HashSet, VecDeque};
use std::sync::Mutex;

const DEFAULT_CAPACITY: usize = 4096;

pub struct EventRegistry {
    inner: Mutex<RegistryInner>,
    capacity: usize,
}

struct RegistryInner {
    seen: HashSet<String>,
    order: VecDeque<String>,
}

impl Default for EventRegistry {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}

impl EventRegistry {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(RegistryInner {
                seen: HashSet::new(),
                order: VecDeque::new(),
            }),
            capacity: capacity.max(1),
        }
    }

    /// Returns true when `event_id` was already recorded; records it and
    /// returns false on first observation. Atomic under concurrent dispatch.
    pub fn check_and_record(&self, event_id: &str) -> bool {
        let mut inner = self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        if inner.seen.contains(event_id) {
            return true;
        }

        if inner.order.len() >= self.capacity {
            if let Some(evicted) = inner.order.pop_front() {
                inner.seen.remove(&evicted);
            }
        }
        inner.seen.insert(event_id.to_owned());
        inner.order.push_back(event_id.to_owned());
        false
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
