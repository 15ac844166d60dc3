use std::sync::atomic::{AtomicU8, Ordering};

use crate::kernel::protocol::GateState;

/// Process-wide listening/paused cell shared by the capture thread and the
/// network side. One atomic swap per write, one atomic load per read.
#[derive(Debug)]
pub struct TurnGate {
    state: AtomicU8,
}

impl Default for TurnGate {
    fn default() -> Self {
        Self::new(GateState::Listening)
    }
}

impl TurnGate {
    pub fn new(initial: GateState) -> Self {
        Self {
            state: AtomicU8::new(encode(initial)),
        }
    }

    pub fn get(&self) -> GateState {
        decode(self.state.load(Ordering::Acquire))
    }

    pub fn is_listening(&self) -> bool {
        self.get() == GateState::Listening
    }

    /// Store `next`; returns true if the state actually changed.
    pub fn set(&self, next: GateState) -> bool {
        let previous = self.state.swap(encode(next), Ordering::AcqRel);
        previous != encode(next)
    }
}

fn encode(state: GateState) -> u8 {
    match state {
        GateState::Listening => 0,
        GateState::Paused => 1,
    }
}

fn decode(raw: u8) -> GateState {
    if raw == 0 {
        GateState::Listening
    } else {
        GateState::Paused
    }
}
