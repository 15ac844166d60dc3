use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ErrorClass;
use crate::kernel::state::OrchestratorState;

// Allowed: IDs, durations, counts, enums
// Forbidden: transcript text, generated text, audio

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TelemetryEvent {
    UtteranceEmitted {
        utterance_id: Uuid,
        duration_ms: u64,
    },

    UtteranceDropped {
        reason: DropReason,
        duration_ms: u64,
    },

    StateTransition {
        from: OrchestratorState,
        to: OrchestratorState,
    },

    TurnCompleted {
        units: usize,
        latency_ms: u64,
    },

    TurnFailed {
        class: FailureClass,
    },

    ReconnectAttempt {
        attempt: u32,
    },

    ProtocolViolation,

    CommandDeliveryFailed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DropReason {
    TooShort,
    GatePaused,
    EmptyTranscript,
    StaleTranscript,
    /// Transcript text that would parse as a status line.
    ReservedPrefix,
    RecognitionFailed,
}

/// Serializable mirror of [`ErrorClass`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureClass {
    Device,
    Protocol,
    Collaborator,
    Connectivity,
    Config,
}

impl From<ErrorClass> for FailureClass {
    fn from(class: ErrorClass) -> Self {
        match class {
            ErrorClass::Device => FailureClass::Device,
            ErrorClass::Protocol => FailureClass::Protocol,
            ErrorClass::Collaborator => FailureClass::Collaborator,
            ErrorClass::Connectivity => FailureClass::Connectivity,
            ErrorClass::Config => FailureClass::Config,
        }
    }
}
