use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio_util::task::AbortOnDropHandle;
use tracing::{debug, info, warn};

use super::admission::AdmissionControl;
use super::splitter::{split_all, IncrementalSplitter};
use crate::audio::playback::{AudioChunk, AudioSink};
use crate::audio::wav::save_recording;
use crate::config::{SynthesisConfig, SynthesisMode};
use crate::error::{PipelineError, PipelineResult};
use crate::services::tts::client::{SynthesisRequest, Synthesizer};

const UNIT_QUEUE: usize = 16;

#[derive(Debug, Clone)]
pub struct SpeechSettings {
    pub mode: SynthesisMode,
    pub voice: String,
    pub speed: f32,
    pub stream: bool,
    pub max_concurrency: usize,
    /// Write each turn's audio here as WAV when set.
    pub recording_dir: Option<PathBuf>,
}

impl From<&SynthesisConfig> for SpeechSettings {
    fn from(config: &SynthesisConfig) -> Self {
        Self {
            mode: config.mode,
            voice: config.voice.clone(),
            speed: config.speed,
            stream: config.stream,
            max_concurrency: config.max_concurrency,
            recording_dir: config.save_output.then(|| config.output_dir.clone()),
        }
    }
}

impl Default for SpeechSettings {
    fn default() -> Self {
        Self::from(&SynthesisConfig::default())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TurnOutcome {
    pub units: usize,
    pub audio_ms: u64,
}

/// One submitted unit: its chunk queue and the synthesis task feeding it.
/// Dropping it cancels the synthesis.
struct PendingUnit {
    index: usize,
    chunks: mpsc::UnboundedReceiver<AudioChunk>,
    task: AbortOnDropHandle<PipelineResult<()>>,
}

/// Text units in, ordered audio out. Synthesis of later units overlaps
/// playback of earlier ones up to the admission capacity; playback order is
/// always submission order.
pub struct SpeechPipeline {
    synthesizer: Arc<dyn Synthesizer>,
    sink: Box<dyn AudioSink>,
    admission: AdmissionControl,
    settings: SpeechSettings,
}

impl SpeechPipeline {
    pub fn new(synthesizer: Arc<dyn Synthesizer>, sink: Box<dyn AudioSink>, settings: SpeechSettings) -> Self {
        Self {
            synthesizer,
            sink,
            admission: AdmissionControl::new(settings.max_concurrency),
            settings,
        }
    }

    pub fn mode(&self) -> SynthesisMode {
        self.settings.mode
    }

    pub fn admission(&self) -> &AdmissionControl {
        &self.admission
    }

    /// Drop whatever the output still has queued.
    pub fn stop(&mut self) {
        self.sink.stop();
    }

    /// Speak a finished response, split according to the configured mode.
    pub async fn speak_text(&mut self, text: &str) -> PipelineResult<TurnOutcome> {
        let units = match self.settings.mode {
            SynthesisMode::Batch => {
                let whole = text.trim();
                if whole.is_empty() {
                    Vec::new()
                } else {
                    vec![whole.to_string()]
                }
            }
            SynthesisMode::BatchSentences | SynthesisMode::Incremental => split_all(text),
        };

        let (unit_tx, unit_rx) = mpsc::channel(units.len().max(1));
        for unit in units {
            // Capacity covers every unit.
            let _ = unit_tx.try_send(Ok(unit));
        }
        drop(unit_tx);

        self.play_units(unit_rx).await
    }

    /// Speak a response while it is still being generated: each sentence is
    /// submitted as soon as it closes. The unterminated tail is spoken only
    /// when `completion` reports a clean end of generation; a generation
    /// error abandons the turn after the sentences already submitted.
    pub async fn speak_stream(
        &mut self,
        mut fragments: mpsc::Receiver<String>,
        completion: oneshot::Receiver<PipelineResult<()>>,
    ) -> PipelineResult<TurnOutcome> {
        let (unit_tx, unit_rx) = mpsc::channel(UNIT_QUEUE);

        let splitter = AbortOnDropHandle::new(tokio::spawn(async move {
            let mut splitter = IncrementalSplitter::new();
            while let Some(fragment) = fragments.recv().await {
                for unit in splitter.push(&fragment) {
                    if unit_tx.send(Ok(unit)).await.is_err() {
                        return;
                    }
                }
            }
            let tail = match completion.await {
                Ok(Ok(())) => splitter.finish().map(Ok),
                Ok(Err(e)) => {
                    if splitter.finish().is_some() {
                        debug!("[Mouth] Unfinished tail dropped after generation failure");
                    }
                    Some(Err(e))
                }
                Err(_) => Some(Err(PipelineError::Generation("generation ended without a result".into()))),
            };
            if let Some(item) = tail {
                let _ = unit_tx.send(item).await;
            }
        }));

        let result = self.play_units(unit_rx).await;
        drop(splitter);
        result
    }

    /// An `Err` unit ends the turn at that position in the order.
    async fn play_units(&mut self, units: mpsc::Receiver<PipelineResult<String>>) -> PipelineResult<TurnOutcome> {
        let (queue_tx, mut queue_rx) = mpsc::unbounded_channel();
        let template = SynthesisRequest {
            text: String::new(),
            voice: self.settings.voice.clone(),
            speed: self.settings.speed,
            stream: self.settings.stream,
        };
        let submitter = AbortOnDropHandle::new(tokio::spawn(submit_units(
            units,
            queue_tx,
            self.synthesizer.clone(),
            self.admission.clone(),
            template,
        )));

        let recording = self.settings.recording_dir.is_some();
        let mut recorded = Vec::new();
        let mut outcome = TurnOutcome::default();
        let mut failure = None;

        while let Some(next) = queue_rx.recv().await {
            let mut unit = match next {
                Ok(unit) => unit,
                Err(e) => {
                    failure = Some(e);
                    break;
                }
            };
            while let Some(chunk) = unit.chunks.recv().await {
                outcome.audio_ms += chunk.duration_ms();
                if let Err(e) = self.sink.write(&chunk).await {
                    warn!("[Mouth] Playback write failed, chunk skipped: {}", e);
                }
                if recording {
                    recorded.push(chunk);
                }
            }

            match unit.task.await {
                Ok(Ok(())) => {
                    debug!("[Mouth] Unit {} played", unit.index);
                    outcome.units += 1;
                }
                Ok(Err(e)) => {
                    failure = Some(e);
                    break;
                }
                Err(e) => {
                    failure = Some(PipelineError::Synthesis(format!("synthesis task failed: {}", e)));
                    break;
                }
            }
        }

        if let Some(e) = failure {
            submitter.abort();
            queue_rx.close();
            while queue_rx.try_recv().is_ok() {}
            self.sink.stop();
            warn!("[Mouth] Turn abandoned after {} units", outcome.units);
            return Err(e);
        }

        if let Err(e) = submitter.await {
            return Err(PipelineError::Synthesis(format!("submitter failed: {}", e)));
        }

        if outcome.units > 0 {
            if let Err(e) = self.sink.drain().await {
                warn!("[Mouth] Output drain failed: {}", e);
            }
        }

        if let Some(dir) = &self.settings.recording_dir {
            match save_recording(dir, &recorded) {
                Ok(Some(path)) => info!("[Mouth] Saved audio: {}", path.display()),
                Ok(None) => {}
                Err(e) => warn!("[Mouth] Failed to save audio: {}", e),
            }
        }

        info!("[Mouth] Played {} units ({}ms)", outcome.units, outcome.audio_ms);
        Ok(outcome)
    }
}

/// Acquire a permit in submission order, then synthesize in the background.
/// Failures are queued in place so playback stops exactly there.
async fn submit_units(
    mut units: mpsc::Receiver<PipelineResult<String>>,
    queue: mpsc::UnboundedSender<PipelineResult<PendingUnit>>,
    synthesizer: Arc<dyn Synthesizer>,
    admission: AdmissionControl,
    template: SynthesisRequest,
) {
    let mut index = 0;
    while let Some(next) = units.recv().await {
        let acquired = match next {
            Ok(text) => admission.acquire().await.map(|permit| (text, permit)),
            Err(e) => Err(e),
        };
        let (text, permit) = match acquired {
            Ok(acquired) => acquired,
            Err(e) => {
                let _ = queue.send(Err(e));
                return;
            }
        };
        debug!("[Mouth] Unit {} submitted: '{}'", index, text);

        let (chunk_tx, chunk_rx) = mpsc::unbounded_channel();
        let request = SynthesisRequest {
            text,
            ..template.clone()
        };
        let synthesizer = synthesizer.clone();
        let task = AbortOnDropHandle::new(tokio::spawn(async move {
            let _permit = permit;
            synthesizer.synthesize(&request, chunk_tx).await
        }));

        let unit = PendingUnit {
            index,
            chunks: chunk_rx,
            task,
        };
        if queue.send(Ok(unit)).is_err() {
            break;
        }
        index += 1;
    }
}
