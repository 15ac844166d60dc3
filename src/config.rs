use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{PipelineError, PipelineResult};

/// Sample rates accepted by the WebRTC VAD.
pub const VAD_SAMPLE_RATES: [u32; 4] = [8000, 16000, 32000, 48000];

/// Endpointing parameters for the Segmenter.
#[derive(Debug, Clone)]
pub struct SegmenterConfig {
    /// 10, 20 or 30 ms (VAD frame sizes)
    pub frame_ms: u32,
    pub silence_threshold_ms: u32,
    pub min_utterance_ms: u32,
    /// 0 (quality) .. 3 (very aggressive)
    pub vad_aggressiveness: u8,
    /// Normalized RMS above which a VAD-rejected frame still counts as speech
    pub energy_rms_threshold: f32,
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            frame_ms: 30,
            silence_threshold_ms: 500,
            min_utterance_ms: 120,
            vad_aggressiveness: 3,
            energy_rms_threshold: 0.008,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RecognitionConfig {
    pub host: String,
    pub port: u16,
    pub stt_url: String,
    pub language: String,
    pub capture_sample_rate: u32,
    pub request_timeout: Duration,
}

impl Default for RecognitionConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8001,
            stt_url: "http://127.0.0.1:8010/transcribe".to_string(),
            language: "ja".to_string(),
            capture_sample_rate: 16000,
            request_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SynthesisMode {
    /// Whole response, one synthesis call, after generation completes.
    Batch,
    /// Whole response split into sentences after generation completes.
    BatchSentences,
    /// Sentences submitted as soon as they are complete in the generated stream.
    Incremental,
}

impl FromStr for SynthesisMode {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "batch" => Ok(SynthesisMode::Batch),
            "batch-sentences" | "sentences" => Ok(SynthesisMode::BatchSentences),
            "incremental" | "stream" => Ok(SynthesisMode::Incremental),
            other => Err(PipelineError::Config(format!("unknown synthesis mode '{}'", other))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SynthesisConfig {
    pub tts_url: String,
    pub voice: String,
    pub speed: f32,
    pub stream: bool,
    pub max_concurrency: usize,
    pub mode: SynthesisMode,
    pub output_sample_rate: u32,
    pub save_output: bool,
    pub output_dir: PathBuf,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            tts_url: "ws://127.0.0.1:8003/tts".to_string(),
            voice: "default".to_string(),
            speed: 1.0,
            stream: false,
            max_concurrency: 1,
            mode: SynthesisMode::Batch,
            output_sample_rate: 24000,
            save_output: false,
            output_dir: PathBuf::from("."),
        }
    }
}

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub ears_url: String,
    pub llm_url: String,
    pub llm_timeout: Duration,
    pub knowledge_dir: Option<PathBuf>,
    pub rag_top_k: usize,
    pub max_attempts: u32,
    pub backoff: Duration,
    /// How long after a delivered resume a transcript still counts as a
    /// protocol violation when the leg has not acknowledged it.
    pub resume_ack_timeout: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            ears_url: "ws://127.0.0.1:8001/listen".to_string(),
            llm_url: "http://127.0.0.1:8002/think".to_string(),
            llm_timeout: Duration::from_secs(60),
            knowledge_dir: None,
            rag_top_k: 3,
            max_attempts: 3,
            backoff: Duration::from_millis(3000),
            resume_ack_timeout: Duration::from_millis(5000),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Config {
    pub segmenter: SegmenterConfig,
    pub recognition: RecognitionConfig,
    pub synthesis: SynthesisConfig,
    pub orchestrator: OrchestratorConfig,
}

impl Config {
    /// Load configuration from `.env` (if present) and environment variables.
    /// Unset keys fall back to defaults; malformed values are rejected.
    pub fn from_env() -> PipelineResult<Self> {
        let _ = dotenvy::dotenv();
        let defaults = Config::default();

        let segmenter = SegmenterConfig {
            frame_ms: env_or("FRAME_MS", defaults.segmenter.frame_ms)?,
            silence_threshold_ms: env_or("SILENCE_THRESHOLD_MS", defaults.segmenter.silence_threshold_ms)?,
            min_utterance_ms: env_or("MIN_UTTERANCE_MS", defaults.segmenter.min_utterance_ms)?,
            vad_aggressiveness: env_or("VAD_AGGRESSIVENESS", defaults.segmenter.vad_aggressiveness)?,
            energy_rms_threshold: env_or("ENERGY_RMS_THRESHOLD", defaults.segmenter.energy_rms_threshold)?,
        };

        let recognition = RecognitionConfig {
            host: env_or("EARS_HOST", defaults.recognition.host)?,
            port: env_or("EARS_PORT", defaults.recognition.port)?,
            stt_url: env_or("STT_URL", defaults.recognition.stt_url)?,
            language: env_or("STT_LANGUAGE", defaults.recognition.language)?,
            capture_sample_rate: env_or("CAPTURE_SAMPLE_RATE", defaults.recognition.capture_sample_rate)?,
            request_timeout: Duration::from_secs(env_or("STT_TIMEOUT_SECS", 30u64)?),
        };

        let synthesis = SynthesisConfig {
            tts_url: env_or("MOUTH_TTS_SERVER_URL", defaults.synthesis.tts_url)?,
            voice: env_or("SPEAKER_ID", defaults.synthesis.voice)?,
            speed: env_or("TTS_SPEED", defaults.synthesis.speed)?,
            stream: env_flag("TTS_STREAM", defaults.synthesis.stream)?,
            max_concurrency: env_or("TTS_MAX_CONCURRENCY", defaults.synthesis.max_concurrency)?.max(1),
            mode: env_or("SYNTHESIS_MODE", defaults.synthesis.mode)?,
            output_sample_rate: env_or("OUTPUT_SAMPLE_RATE", defaults.synthesis.output_sample_rate)?,
            save_output: env_flag("SAVE_MOUTH_OUTPUT", defaults.synthesis.save_output)?,
            output_dir: env::var("OUTPUT_DIR").map(PathBuf::from).unwrap_or(defaults.synthesis.output_dir),
        };

        let orchestrator = OrchestratorConfig {
            ears_url: env_or("EARS_STT_SERVER_URL", defaults.orchestrator.ears_url)?,
            llm_url: env_or("HEAD_LLM_SERVER_URL", defaults.orchestrator.llm_url)?,
            llm_timeout: Duration::from_secs(env_or("LLM_TIMEOUT_SECS", 60u64)?),
            knowledge_dir: env::var("KNOWLEDGE_DIR").ok().map(PathBuf::from),
            rag_top_k: env_or("RAG_TOP_K", defaults.orchestrator.rag_top_k)?,
            max_attempts: env_or("MAX_RECONNECT_ATTEMPTS", defaults.orchestrator.max_attempts)?,
            backoff: Duration::from_millis(env_or("RECONNECT_BACKOFF_MS", 3000u64)?),
            resume_ack_timeout: Duration::from_millis(env_or("RESUME_ACK_TIMEOUT_MS", 5000u64)?),
        };

        let config = Config { segmenter, recognition, synthesis, orchestrator };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> PipelineResult<()> {
        if !VAD_SAMPLE_RATES.contains(&self.recognition.capture_sample_rate) {
            return Err(PipelineError::Config(format!(
                "capture sample rate {} unsupported, VAD requires 8k, 16k, 32k or 48k",
                self.recognition.capture_sample_rate
            )));
        }
        if !matches!(self.segmenter.frame_ms, 10 | 20 | 30) {
            return Err(PipelineError::Config(format!(
                "frame duration {}ms unsupported, VAD requires 10, 20 or 30ms",
                self.segmenter.frame_ms
            )));
        }
        if self.segmenter.vad_aggressiveness > 3 {
            return Err(PipelineError::Config(format!(
                "VAD aggressiveness must be 0-3, got {}",
                self.segmenter.vad_aggressiveness
            )));
        }
        if self.orchestrator.max_attempts == 0 {
            return Err(PipelineError::Config("MAX_RECONNECT_ATTEMPTS must be at least 1".into()));
        }
        Ok(())
    }
}

fn env_or<T>(key: &str, default: T) -> PipelineResult<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => parse_value(key, &raw),
        Err(_) => Ok(default),
    }
}

fn env_flag(key: &str, default: bool) -> PipelineResult<bool> {
    match env::var(key) {
        Ok(raw) => parse_bool(&raw)
            .ok_or_else(|| PipelineError::Config(format!("{}: expected a boolean, got '{}'", key, raw))),
        Err(_) => Ok(default),
    }
}

fn parse_value<T>(key: &str, raw: &str) -> PipelineResult<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse::<T>()
        .map_err(|e| PipelineError::Config(format!("{}: {}", key, e)))
}

pub fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bool_variants() {
        assert_eq!(parse_bool("Yes"), Some(true));
        assert_eq!(parse_bool("on"), Some(true));
        assert_eq!(parse_bool("0"), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }

    #[test]
    fn parses_values_with_key_in_error() {
        let port: u16 = parse_value("EARS_PORT", " 8001 ").unwrap();
        assert_eq!(port, 8001);

        let err = parse_value::<u16>("EARS_PORT", "eighty").unwrap_err();
        assert!(err.to_string().contains("EARS_PORT"));
    }

    #[test]
    fn parses_synthesis_modes() {
        assert_eq!("batch".parse::<SynthesisMode>().unwrap(), SynthesisMode::Batch);
        assert_eq!("Batch-Sentences".parse::<SynthesisMode>().unwrap(), SynthesisMode::BatchSentences);
        assert_eq!("incremental".parse::<SynthesisMode>().unwrap(), SynthesisMode::Incremental);
        assert!("chunky".parse::<SynthesisMode>().is_err());
    }

    #[test]
    fn validation_rejects_vad_incompatible_settings() {
        let mut config = Config::default();
        assert!(config.validate().is_ok());

        config.recognition.capture_sample_rate = 44100;
        assert!(config.validate().is_err());

        config.recognition.capture_sample_rate = 16000;
        config.segmenter.frame_ms = 25;
        assert!(config.validate().is_err());

        config.segmenter.frame_ms = 20;
        config.orchestrator.max_attempts = 0;
        assert!(config.validate().is_err());
    }
}
