use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::hub::{ControlPlane, Publication};
use crate::audio::capture::CaptureDevice;
use crate::audio::processing::{CaptureCommand, CaptureWorker};
use crate::config::SegmenterConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::kernel::audio::monitor::FrameClassifier;
use crate::kernel::audio::segment::{Transcript, Utterance};
use crate::kernel::audio::segmenter::Segmenter;
use crate::kernel::telemetry::event::{DropReason, TelemetryEvent};
use crate::kernel::telemetry::recorder::SharedRecorder;
use crate::services::stt::client::Recognizer;

const UTTERANCE_QUEUE: usize = 16;

/// Capture thread plus the recognition task that turns its utterances into
/// broadcast transcripts.
pub struct RecognitionSession {
    commands: mpsc::UnboundedSender<CaptureCommand>,
    running: AtomicBool,
    sample_rate: u32,
    capture: Option<std::thread::JoinHandle<()>>,
    recognition: Option<JoinHandle<()>>,
}

impl RecognitionSession {
    /// Open the capture device on a dedicated thread. `setup` runs on that
    /// thread (device handles are not `Send`) and its failure is returned here.
    pub async fn open<F, D, C>(
        setup: F,
        config: SegmenterConfig,
        language: String,
        recognizer: Arc<dyn Recognizer>,
        control: Arc<ControlPlane>,
        telemetry: SharedRecorder,
    ) -> PipelineResult<Self>
    where
        F: FnOnce() -> PipelineResult<(D, C)> + Send + 'static,
        D: CaptureDevice + 'static,
        C: FrameClassifier + 'static,
    {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (utterance_tx, utterance_rx) = mpsc::channel::<Utterance>(UTTERANCE_QUEUE);
        let (ready_tx, ready_rx) = oneshot::channel::<PipelineResult<u32>>();

        let gate = control.gate().clone();
        let capture_telemetry = telemetry.clone();

        let capture = std::thread::Builder::new()
            .name("capture".into())
            .spawn(move || {
                let (device, classifier) = match setup() {
                    Ok(opened) => opened,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                let sample_rate = device.sample_rate();
                let segmenter = Segmenter::new(classifier, sample_rate, &config);
                let _ = ready_tx.send(Ok(sample_rate));

                CaptureWorker::new(device, segmenter, command_rx, utterance_tx, gate, capture_telemetry).run();
            })?;

        let sample_rate = match ready_rx.await {
            Ok(Ok(rate)) => rate,
            Ok(Err(e)) => {
                let _ = capture.join();
                return Err(e);
            }
            Err(_) => return Err(PipelineError::Device("capture thread exited during setup".into())),
        };
        info!("[Ears] Capture device open at {}Hz", sample_rate);

        let recognition = tokio::spawn(recognize_loop(utterance_rx, recognizer, language, control, telemetry));

        Ok(Self {
            commands: command_tx,
            running: AtomicBool::new(false),
            sample_rate,
            capture: Some(capture),
            recognition: Some(recognition),
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Idempotent. Resolves once the device is running, or with the error
    /// the device reported; a failed start leaves the session stopped.
    pub async fn start(&self) -> PipelineResult<()> {
        if self.is_running() {
            return Ok(());
        }
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(CaptureCommand::Start(reply_tx))?;
        match reply_rx.await {
            Ok(Ok(())) => {
                self.running.store(true, Ordering::Release);
                Ok(())
            }
            Ok(Err(e)) => Err(e),
            Err(_) => Err(PipelineError::Device("capture thread exited during start".into())),
        }
    }

    /// Idempotent. An open utterance is dropped.
    pub fn stop(&self) -> PipelineResult<()> {
        if !self.running.swap(false, Ordering::AcqRel) {
            return Ok(());
        }
        self.send(CaptureCommand::Stop)
    }

    /// Release the device, join the capture thread, and let the recognition
    /// task finish the utterances already queued.
    pub async fn close(mut self) {
        let _ = self.commands.send(CaptureCommand::Shutdown);
        if let Some(capture) = self.capture.take() {
            if tokio::task::spawn_blocking(move || capture.join()).await.is_err() {
                warn!("[Ears] Capture thread join failed");
            }
        }
        if let Some(recognition) = self.recognition.take() {
            let _ = recognition.await;
        }
        info!("[Ears] Session closed");
    }

    fn send(&self, command: CaptureCommand) -> PipelineResult<()> {
        self.commands
            .send(command)
            .map_err(|_| PipelineError::Device("capture thread is gone".into()))
    }
}

impl Drop for RecognitionSession {
    fn drop(&mut self) {
        // Detached: the thread releases the device as soon as it sees this.
        let _ = self.commands.send(CaptureCommand::Shutdown);
    }
}

/// Utterances are recognized one at a time, so transcripts go out in
/// utterance-completion order.
async fn recognize_loop(
    mut utterances: mpsc::Receiver<Utterance>,
    recognizer: Arc<dyn Recognizer>,
    language: String,
    control: Arc<ControlPlane>,
    telemetry: SharedRecorder,
) {
    while let Some(utterance) = utterances.recv().await {
        let duration_ms = utterance.duration_ms;
        let drop_as = |reason| TelemetryEvent::UtteranceDropped { reason, duration_ms };

        let raw = match recognizer.transcribe(&utterance, &language).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!("[Ears] Recognition failed for {}: {}", utterance.id, e);
                telemetry.record(drop_as(DropReason::RecognitionFailed));
                continue;
            }
        };

        let Some(transcript) = raw.and_then(|raw| Transcript::from_recognized(utterance.id, &raw)) else {
            debug!("[Ears] Empty transcript for {}", utterance.id);
            telemetry.record(drop_as(DropReason::EmptyTranscript));
            continue;
        };

        match control.publish_transcript(&transcript) {
            Publication::Delivered(delivered) => {
                info!("[Ears] Transcript {} -> {} listeners", transcript.utterance_id, delivered);
            }
            Publication::HeldBack => {
                debug!("[Ears] Gate paused during recognition; dropping {}", transcript.utterance_id);
                telemetry.record(drop_as(DropReason::StaleTranscript));
            }
            Publication::Reserved => telemetry.record(drop_as(DropReason::ReservedPrefix)),
        }
    }
    debug!("[Ears] Recognition task finished");
}
