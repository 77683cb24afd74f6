//! Upload progress tracking.
//!
//! A [`ProgressTracker`] sits between the transport and the caller's
//! [`ProgressSink`]. It only forwards values that move forward, clamps them to
//! `0..=100`, and stops forwarding once sealed so that nothing arrives after
//! the dispatch has reached a terminal outcome.

use std::sync::{Arc, Mutex};

use nutrilens_core::ProgressSink;

#[derive(Default)]
struct TrackerState {
    last: Option<u8>,
    sealed: bool,
}

pub struct ProgressTracker {
    sink: Arc<dyn ProgressSink>,
    state: Mutex<TrackerState>,
}

impl ProgressTracker {
    pub fn new(sink: Arc<dyn ProgressSink>) -> Self {
        Self {
            sink,
            state: Mutex::new(TrackerState::default()),
        }
    }

    /// Forward `percent` if it is larger than the last value sent.
    /// Returns whether the sink was called.
    pub fn report(&self, percent: u8) -> bool {
        let percent = percent.min(100);
        let Ok(mut state) = self.state.lock() else {
            return false;
        };
        if state.sealed || state.last.is_some_and(|last| percent <= last) {
            return false;
        }
        state.last = Some(percent);
        // Emit while holding the lock so concurrent reports stay ordered.
        self.sink.on_progress(percent);
        true
    }

    /// Report progress as a byte count out of `total`.
    pub fn report_bytes(&self, sent: u64, total: u64) -> bool {
        let percent = if total == 0 {
            100
        } else {
            (sent.min(total) * 100 / total) as u8
        };
        self.report(percent)
    }

    /// Stop forwarding. Later reports are dropped.
    pub fn seal(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.sealed = true;
        }
    }

    pub fn last(&self) -> Option<u8> {
        self.state.lock().ok().and_then(|s| s.last)
    }
}
