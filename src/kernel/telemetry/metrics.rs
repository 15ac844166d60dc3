use std::collections::VecDeque;

use super::event::{DropReason, TelemetryEvent};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TelemetrySnapshot {
    pub utterance_stats: UtteranceStats,
    pub turn_stats: TurnStats,
    pub link_stats: LinkStats,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct UtteranceStats {
    pub emitted: u64,
    pub too_short: u64,
    pub dropped_paused: u64,
    pub empty_transcripts: u64,
    pub stale_transcripts: u64,
    pub reserved_transcripts: u64,
    pub recognition_failures: u64,
    pub total_speech_ms: u64,
    pub avg_speech_ms: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TurnStats {
    pub completed: u64,
    pub failed: u64,
    pub units_played: u64,
    pub total_latency_ms: u64,
    pub avg_latency_ms: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LinkStats {
    pub reconnect_attempts: u64,
    pub protocol_violations: u64,
    pub command_failures: u64,
    pub transitions: u64,
}

pub fn compute_snapshot(events: &VecDeque<TelemetryEvent>) -> TelemetrySnapshot {
    let mut snap = TelemetrySnapshot::default();

    for event in events {
        match event {
            TelemetryEvent::UtteranceEmitted { duration_ms, .. } => {
                snap.utterance_stats.emitted += 1;
                snap.utterance_stats.total_speech_ms += duration_ms;
            }
            TelemetryEvent::UtteranceDropped { reason, .. } => match reason {
                DropReason::TooShort => snap.utterance_stats.too_short += 1,
                DropReason::GatePaused => snap.utterance_stats.dropped_paused += 1,
                DropReason::EmptyTranscript => snap.utterance_stats.empty_transcripts += 1,
                DropReason::StaleTranscript => snap.utterance_stats.stale_transcripts += 1,
                DropReason::ReservedPrefix => snap.utterance_stats.reserved_transcripts += 1,
                DropReason::RecognitionFailed => snap.utterance_stats.recognition_failures += 1,
            },
            TelemetryEvent::StateTransition { .. } => snap.link_stats.transitions += 1,
            TelemetryEvent::TurnCompleted { units, latency_ms } => {
                snap.turn_stats.completed += 1;
                snap.turn_stats.units_played += *units as u64;
                snap.turn_stats.total_latency_ms += latency_ms;
            }
            TelemetryEvent::TurnFailed { .. } => snap.turn_stats.failed += 1,
            TelemetryEvent::ReconnectAttempt { .. } => snap.link_stats.reconnect_attempts += 1,
            TelemetryEvent::ProtocolViolation => snap.link_stats.protocol_violations += 1,
            TelemetryEvent::CommandDeliveryFailed => snap.link_stats.command_failures += 1,
        }
    }

    if snap.utterance_stats.emitted > 0 {
        snap.utterance_stats.avg_speech_ms =
            snap.utterance_stats.total_speech_ms as f64 / snap.utterance_stats.emitted as f64;
    }

    if snap.turn_stats.completed > 0 {
        snap.turn_stats.avg_latency_ms =
            snap.turn_stats.total_latency_ms as f64 / snap.turn_stats.completed as f64;
    }

    snap
}
