use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::kernel::audio::segment::Transcript;
use crate::kernel::gate::TurnGate;
use crate::kernel::protocol::{ControlCommand, GateState, LegMessage};

pub type ListenerId = u64;

/// What happened to a transcript handed to [`ControlPlane::publish_transcript`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Publication {
    /// Broadcast to this many listeners.
    Delivered(usize),
    /// The gate was paused.
    HeldBack,
    /// The text would read as a status line on the wire.
    Reserved,
}

/// Connected control/transcript subscribers. Each listener owns one
/// unbounded outbound queue, so per-listener ordering follows call order.
#[derive(Debug, Default)]
pub struct ListenerRegistry {
    listeners: Mutex<HashMap<ListenerId, mpsc::UnboundedSender<String>>>,
    next_id: AtomicU64,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self) -> (ListenerId, mpsc::UnboundedReceiver<String>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        self.lock().insert(id, tx);
        (id, rx)
    }

    /// Idempotent.
    pub fn deregister(&self, id: ListenerId) -> bool {
        self.lock().remove(&id).is_some()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Deliver to every listener. Broken listeners do not stop delivery to
    /// the rest; they are removed after the attempt. Returns delivered count.
    pub fn broadcast(&self, message: &str) -> usize {
        let mut listeners = self.lock();
        let mut failed = Vec::new();
        let mut delivered = 0;

        for (id, tx) in listeners.iter() {
            match tx.send(message.to_string()) {
                Ok(()) => delivered += 1,
                Err(_) => {
                    warn!("[Hub] Send to listener {} failed", id);
                    failed.push(*id);
                }
            }
        }

        for id in failed {
            listeners.remove(&id);
        }

        delivered
    }

    pub fn send_to(&self, id: ListenerId, message: &str) -> bool {
        let mut listeners = self.lock();
        let ok = match listeners.get(&id) {
            Some(tx) => tx.send(message.to_string()).is_ok(),
            None => return false,
        };
        if !ok {
            listeners.remove(&id);
        }
        ok
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<ListenerId, mpsc::UnboundedSender<String>>> {
        self.listeners.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Turn-Gate plus listener registry: the leg's side of the control protocol.
#[derive(Debug)]
pub struct ControlPlane {
    gate: Arc<TurnGate>,
    registry: ListenerRegistry,
    // Serializes writers; readers of the gate never take it.
    writer: Mutex<()>,
    name: String,
}

impl ControlPlane {
    pub fn new(name: impl Into<String>, gate: Arc<TurnGate>) -> Self {
        Self {
            gate,
            registry: ListenerRegistry::new(),
            writer: Mutex::new(()),
            name: name.into(),
        }
    }

    pub fn gate(&self) -> &Arc<TurnGate> {
        &self.gate
    }

    pub fn registry(&self) -> &ListenerRegistry {
        &self.registry
    }

    /// Register a subscriber and greet it.
    pub fn connect(&self) -> (ListenerId, mpsc::UnboundedReceiver<String>) {
        let (id, rx) = self.registry.register();
        let greeting = LegMessage::Connected(format!("{} ({})", self.name, self.gate.get()));
        self.registry.send_to(id, &greeting.to_line());
        info!("[Hub] Listener {} connected ({} total)", id, self.registry.len());
        (id, rx)
    }

    pub fn disconnect(&self, id: ListenerId) {
        if self.registry.deregister(id) {
            info!("[Hub] Listener {} disconnected ({} remaining)", id, self.registry.len());
        }
    }

    /// Handle one text line from listener `id`. Malformed commands are
    /// answered with `ERROR:` and otherwise ignored.
    pub fn handle_line(&self, id: ListenerId, line: &str) {
        match line.parse::<ControlCommand>() {
            Ok(command) => {
                self.apply(command, Some(id));
            }
            Err(e) => {
                warn!("[Hub] Listener {}: {}", id, e);
                self.registry.send_to(id, &LegMessage::Error(e.to_string()).to_line());
            }
        }
    }

    /// Apply a command. When pausing the gate closes before `STATE: PAUSED`
    /// goes out; when resuming `STATE: LISTENING` and the ack go out before
    /// the gate opens. Returns whether the state changed.
    pub fn apply(&self, command: ControlCommand, from: Option<ListenerId>) -> bool {
        let _writer = self.writer.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let target = command.target();
        let ack = LegMessage::Ack(command.as_str().to_string()).to_line();

        let changed = match target {
            GateState::Paused => {
                let changed = self.gate.set(GateState::Paused);
                if changed {
                    self.registry.broadcast(&LegMessage::State(target).to_line());
                }
                if let Some(id) = from {
                    self.registry.send_to(id, &ack);
                }
                changed
            }
            GateState::Listening => {
                let changed = self.gate.get() != GateState::Listening;
                if changed {
                    self.registry.broadcast(&LegMessage::State(target).to_line());
                }
                if let Some(id) = from {
                    self.registry.send_to(id, &ack);
                }
                self.gate.set(GateState::Listening);
                changed
            }
        };

        if changed {
            info!("[Hub] Gate -> {}", target);
        } else {
            debug!("[Hub] Gate already {}", target);
        }
        changed
    }

    /// Broadcast a transcript unless the gate is paused. Runs under the
    /// writer lock so it cannot interleave with a gate change. Text that
    /// starts with a status prefix is never sent, since listeners would
    /// parse it as one.
    pub fn publish_transcript(&self, transcript: &Transcript) -> Publication {
        if LegMessage::is_status_line(&transcript.text) {
            warn!("[Hub] Transcript {} collides with a status prefix; not sent", transcript.utterance_id);
            return Publication::Reserved;
        }
        let _writer = self.writer.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if !self.gate.is_listening() {
            return Publication::HeldBack;
        }
        let delivered = self.registry.broadcast(&transcript.text);
        debug!("[Hub] Transcript {} delivered to {} listeners", transcript.utterance_id, delivered);
        Publication::Delivered(delivered)
    }
}
