use tracing::debug;

use super::monitor::FrameClassifier;
use super::segment::Utterance;
use crate::config::SegmenterConfig;
use crate::kernel::time::{FrameTiming, Tick};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmenterState {
    Idle,
    Accumulating,
}

/// Result of closing an utterance.
#[derive(Debug)]
pub enum Endpoint {
    Emitted(Utterance),
    /// Speech run shorter than the minimum duration.
    Discarded { speech_ms: u64 },
}

/// Streaming endpointer: turns a frame stream into utterances.
///
/// `Idle` until the first speech frame, then `Accumulating` until
/// `silence_frames` consecutive non-speech frames close the utterance.
/// Non-speech frames inside a short gap are not buffered.
pub struct Segmenter<C> {
    classifier: C,
    timing: FrameTiming,
    silence_frames: usize,
    min_utterance_ms: u64,

    state: SegmenterState,
    tick: Tick,
    samples: Vec<i16>,
    speech_frames: u64,
    silence_run: usize,
    start_ms: u64,
}

impl<C: FrameClassifier> Segmenter<C> {
    pub fn new(classifier: C, sample_rate: u32, config: &SegmenterConfig) -> Self {
        let timing = FrameTiming::new(sample_rate, config.frame_ms);
        Self {
            classifier,
            timing,
            silence_frames: timing.frames_for_ms(config.silence_threshold_ms),
            min_utterance_ms: config.min_utterance_ms as u64,
            state: SegmenterState::Idle,
            tick: Tick::new(),
            samples: Vec::new(),
            speech_frames: 0,
            silence_run: 0,
            start_ms: 0,
        }
    }

    pub fn timing(&self) -> FrameTiming {
        self.timing
    }

    pub fn state(&self) -> SegmenterState {
        self.state
    }

    /// Feed one frame. Returns an endpoint when the silence threshold closes an utterance.
    pub fn push(&mut self, frame: &[i16]) -> Option<Endpoint> {
        let offset_ms = self.timing.offset_ms(self.tick);
        self.tick = self.tick.next();

        let is_speech = self.classifier.is_speech(frame);

        match self.state {
            SegmenterState::Idle => {
                if is_speech {
                    debug!("Speech detected at {}ms", offset_ms);
                    self.state = SegmenterState::Accumulating;
                    self.start_ms = offset_ms;
                    self.append(frame);
                }
                None
            }
            SegmenterState::Accumulating => {
                if is_speech {
                    self.append(frame);
                    self.silence_run = 0;
                    return None;
                }

                self.silence_run += 1;
                if self.silence_run < self.silence_frames {
                    return None;
                }

                Some(self.close())
            }
        }
    }

    /// Drop any open utterance (used when capture stops).
    pub fn reset(&mut self) {
        self.state = SegmenterState::Idle;
        self.samples.clear();
        self.speech_frames = 0;
        self.silence_run = 0;
    }

    fn append(&mut self, frame: &[i16]) {
        self.samples.extend_from_slice(frame);
        self.speech_frames += 1;
    }

    fn close(&mut self) -> Endpoint {
        let speech_ms = self.speech_frames * self.timing.frame_ms as u64;
        let samples = std::mem::take(&mut self.samples);
        let start_ms = self.start_ms;
        self.reset();

        if speech_ms < self.min_utterance_ms {
            debug!("Discarding {}ms speech run (min {}ms)", speech_ms, self.min_utterance_ms);
            return Endpoint::Discarded { speech_ms };
        }

        Endpoint::Emitted(Utterance::new(start_ms, speech_ms, self.timing.sample_rate, samples))
    }
}
