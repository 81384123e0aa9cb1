//! Bounded in-memory debug log for certificate validation
//!
//! Entries are appended only; once capacity is reached the oldest entry is
//! evicted. Values are recorded verbatim, so callers must never pass secrets.

use parking_lot::Mutex;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Default number of retained entries
pub const DEFAULT_DEBUG_LOG_CAPACITY: usize = 200;

/// One debug log record
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DebugLogEntry {
    /// Sequential id (`net_0000002a`)
    pub id: String,
    /// Milliseconds since the Unix epoch
    pub timestamp: u64,
    /// Code location that recorded the entry
    pub location: String,
    /// Short event name
    pub message: String,
    /// Free-form details
    pub data: String,
}

impl DebugLogEntry {
    /// Render as a single JSON line
    pub fn to_json_line(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Append-only ring of [`DebugLogEntry`]
pub struct DebugLog {
    entries: Mutex<VecDeque<DebugLogEntry>>,
    capacity: usize,
    next_id: AtomicU64,
}

impl DebugLog {
    /// Create log with the given capacity (at least 1)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            next_id: AtomicU64::new(0),
        }
    }

    /// Append an entry, evicting the oldest when full
    pub fn record(&self, location: &str, message: &str, data: impl Into<String>) {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64;
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let entry = DebugLogEntry {
            id: format!("net_{:08x}", id),
            timestamp,
            location: location.to_string(),
            message: message.to_string(),
            data: data.into(),
        };

        let mut entries = self.entries.lock();
        if entries.len() == self.capacity {
            entries.pop_front();
        }
        entries.push_back(entry);
    }

    /// Copy of the current entries, oldest first
    pub fn snapshot(&self) -> Vec<DebugLogEntry> {
        self.entries.lock().iter().cloned().collect()
    }

    /// Drop all entries
    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    /// Number of retained entries
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether the log is empty
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl Default for DebugLog {
    fn default() -> Self {
        Self::new(DEFAULT_DEBUG_LOG_CAPACITY)
    }
}
