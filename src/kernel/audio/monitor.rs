use tracing::debug;
use webrtc_vad::{SampleRate, Vad, VadMode};

use crate::error::{PipelineError, PipelineResult};

/// Speech / non-speech decision for one fixed-size frame.
pub trait FrameClassifier {
    fn is_speech(&mut self, frame: &[i16]) -> bool;
}

/// RMS energy of a frame on the normalized [-1, 1] scale.
pub fn frame_rms(frame: &[i16]) -> f32 {
    if frame.is_empty() {
        return 0.0;
    }
    let sq_sum: f32 = frame
        .iter()
        .map(|&s| {
            let x = s as f32 / 32768.0;
            x * x
        })
        .sum();
    (sq_sum / frame.len() as f32).sqrt()
}

/// Simple energy gate. Also used as the fallback behind the VAD.
#[derive(Debug, Clone)]
pub struct EnergyClassifier {
    threshold_rms: f32,
}

impl EnergyClassifier {
    pub fn new(threshold_rms: f32) -> Self {
        Self { threshold_rms }
    }
}

impl FrameClassifier for EnergyClassifier {
    fn is_speech(&mut self, frame: &[i16]) -> bool {
        frame_rms(frame) > self.threshold_rms
    }
}

/// WebRTC VAD first; frames it rejects get a second chance on raw energy
/// so soft speech the detector misses is still captured.
pub struct VadClassifier {
    vad: Vad,
    fallback: EnergyClassifier,
}

impl VadClassifier {
    pub fn new(sample_rate: u32, aggressiveness: u8, threshold_rms: f32) -> PipelineResult<Self> {
        let rate = match sample_rate {
            8000 => SampleRate::Rate8kHz,
            16000 => SampleRate::Rate16kHz,
            32000 => SampleRate::Rate32kHz,
            48000 => SampleRate::Rate48kHz,
            other => {
                return Err(PipelineError::Config(format!(
                    "WebRTC VAD only supports 8000, 16000, 32000 or 48000 Hz, got {}",
                    other
                )))
            }
        };
        let mode = match aggressiveness {
            0 => VadMode::Quality,
            1 => VadMode::LowBitrate,
            2 => VadMode::Aggressive,
            3 => VadMode::VeryAggressive,
            other => {
                return Err(PipelineError::Config(format!(
                    "VAD aggressiveness must be 0-3, got {}",
                    other
                )))
            }
        };

        Ok(Self {
            vad: Vad::new_with_rate_and_mode(rate, mode),
            fallback: EnergyClassifier::new(threshold_rms),
        })
    }
}

impl FrameClassifier for VadClassifier {
    fn is_speech(&mut self, frame: &[i16]) -> bool {
        match self.vad.is_voice_segment(frame) {
            Ok(true) => true,
            Ok(false) => self.fallback.is_speech(frame),
            Err(_) => {
                // Wrong frame length for the VAD; energy alone decides.
                debug!("VAD rejected frame of {} samples", frame.len());
                self.fallback.is_speech(frame)
            }
        }
    }
}
