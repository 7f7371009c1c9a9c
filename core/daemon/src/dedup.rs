//! Recently applied events, keyed by `event_id`.
//!
//! `hallctl` retries a delivery with the same event id when it loses the
//! response. The daemon answers such a repeat with the stored outcome
//! instead of applying the event a second time.

use std::collections::{HashMap, VecDeque};

use hallmonitor_daemon_protocol::ErrorInfo;
use serde_json::Value;

pub const RECENT_EVENT_CAPACITY: usize = 256;

pub type Outcome = Result<Value, ErrorInfo>;

#[derive(Debug)]
pub struct RecentEvents {
    capacity: usize,
    order: VecDeque<String>,
    outcomes: HashMap<String, Outcome>,
}

impl RecentEvents {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            order: VecDeque::with_capacity(capacity),
            outcomes: HashMap::with_capacity(capacity),
        }
    }

    pub fn get(&self, event_id: &str) -> Option<&Outcome> {
        self.outcomes.get(event_id)
    }

    /// Remembers the outcome of `event_id`, evicting the oldest entry once
    /// full.
    pub fn record(&mut self, event_id: &str, outcome: Outcome) {
        if self.outcomes.contains_key(event_id) {
            return;
        }
        if self.order.len() == self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.outcomes.remove(&oldest);
            }
        }
        self.order.push_back(event_id.to_string());
        self.outcomes.insert(event_id.to_string(), outcome);
    }
}

impl Default for RecentEvents {
    fn default() -> Self {
        Self::new(RECENT_EVENT_CAPACITY)
    }
}
