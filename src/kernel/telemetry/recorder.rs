use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use super::event::TelemetryEvent;
use super::metrics::{compute_snapshot, TelemetrySnapshot};

const MAX_EVENTS: usize = 10_000;

#[derive(Debug)]
pub struct TelemetryRecorder {
    buffer: VecDeque<TelemetryEvent>,
}

impl Default for TelemetryRecorder {
    fn default() -> Self {
        Self::new()
    }
}

impl TelemetryRecorder {
    pub fn new() -> Self {
        Self {
            buffer: VecDeque::with_capacity(MAX_EVENTS),
        }
    }

    pub fn record(&mut self, event: TelemetryEvent) {
        if self.buffer.len() >= MAX_EVENTS {
            self.buffer.pop_front();
        }
        self.buffer.push_back(event);
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        compute_snapshot(&self.buffer)
    }

    pub fn events(&self) -> impl Iterator<Item = &TelemetryEvent> {
        self.buffer.iter()
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

/// Clonable handle so the capture thread and async tasks can share one recorder.
/// The lock is only held for a push or a snapshot.
#[derive(Debug, Clone, Default)]
pub struct SharedRecorder {
    inner: Arc<Mutex<TelemetryRecorder>>,
}

impl SharedRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, event: TelemetryEvent) {
        let mut recorder = self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        recorder.record(event);
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        let recorder = self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        recorder.snapshot()
    }

    pub fn events(&self) -> Vec<TelemetryEvent> {
        let recorder = self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        recorder.events().cloned().collect()
    }
}
