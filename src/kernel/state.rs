use serde::{Deserialize, Serialize};

/// Orchestrator turn state machine.
///
/// `Connecting -> ListeningForTranscript -> OnTranscript -> Generating ->
/// SynthesizingAndPlaying -> Resuming -> ListeningForTranscript`,
/// with `Disconnected` terminal once the retry budget is spent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrchestratorState {
    Connecting,
    ListeningForTranscript,
    OnTranscript,
    Generating,
    SynthesizingAndPlaying,
    Resuming,
    Disconnected,
}

impl OrchestratorState {
    pub fn can_transition(self, next: OrchestratorState) -> bool {
        use OrchestratorState::*;

        if self == Disconnected {
            return false;
        }
        // Any live state may lose its connection or shut down.
        if matches!(next, Connecting | Disconnected) {
            return true;
        }

        matches!(
            (self, next),
            (Connecting, ListeningForTranscript)
                | (ListeningForTranscript, OnTranscript)
                | (OnTranscript, Generating)
                | (OnTranscript, Resuming)
                | (Generating, SynthesizingAndPlaying)
                | (Generating, Resuming)
                | (SynthesizingAndPlaying, Resuming)
                | (Resuming, ListeningForTranscript)
        )
    }
}

impl std::fmt::Display for OrchestratorState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            OrchestratorState::Connecting => "CONNECTING",
            OrchestratorState::ListeningForTranscript => "LISTENING_FOR_TRANSCRIPT",
            OrchestratorState::OnTranscript => "ON_TRANSCRIPT",
            OrchestratorState::Generating => "GENERATING",
            OrchestratorState::SynthesizingAndPlaying => "SYNTHESIZING_AND_PLAYING",
            OrchestratorState::Resuming => "RESUMING",
            OrchestratorState::Disconnected => "DISCONNECTED",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::OrchestratorState::*;

    #[test]
    fn happy_path_is_allowed() {
        let path = [
            Connecting,
            ListeningForTranscript,
            OnTranscript,
            Generating,
            SynthesizingAndPlaying,
            Resuming,
            ListeningForTranscript,
        ];
        for pair in path.windows(2) {
            assert!(pair[0].can_transition(pair[1]), "{:?} -> {:?}", pair[0], pair[1]);
        }
    }

    #[test]
    fn failed_turns_still_reach_resume() {
        assert!(OnTranscript.can_transition(Resuming));
        assert!(Generating.can_transition(Resuming));
    }

    #[test]
    fn turns_cannot_skip_pause_or_resume() {
        assert!(!ListeningForTranscript.can_transition(Generating));
        assert!(!SynthesizingAndPlaying.can_transition(ListeningForTranscript));
        assert!(!Disconnected.can_transition(Connecting));
    }
}
