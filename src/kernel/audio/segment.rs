use uuid::Uuid;

/// One contiguous span of detected speech, closed by a silence run.
/// Built by the Segmenter; immutable once handed off.
#[derive(Debug, Clone)]
pub struct Utterance {
    pub id: Uuid,
    /// Offset of the first speech frame from the start of capture.
    pub start_ms: u64,
    /// Accumulated speech duration (silence gaps below threshold are not counted).
    pub duration_ms: u64,
    pub sample_rate: u32,
    pub samples: Vec<i16>,
}

impl Utterance {
    pub fn new(start_ms: u64, duration_ms: u64, sample_rate: u32, samples: Vec<i16>) -> Self {
        Self {
            id: Uuid::new_v4(),
            start_ms,
            duration_ms,
            sample_rate,
            samples,
        }
    }
}

/// Finalized text for one emitted utterance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transcript {
    pub utterance_id: Uuid,
    pub text: String,
}

impl Transcript {
    /// Trimmed transcript, or None for empty/whitespace-only recognizer output.
    pub fn from_recognized(utterance_id: Uuid, raw: &str) -> Option<Self> {
        let text = raw.trim();
        if text.is_empty() {
            return None;
        }
        Some(Self {
            utterance_id,
            text: text.to_string(),
        })
    }
}
