use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use super::capture::{CaptureDevice, FrameRead};
use crate::error::PipelineResult;
use crate::kernel::audio::monitor::FrameClassifier;
use crate::kernel::audio::segment::Utterance;
use crate::kernel::audio::segmenter::{Endpoint, Segmenter};
use crate::kernel::gate::TurnGate;
use crate::kernel::telemetry::event::{DropReason, TelemetryEvent};
use crate::kernel::telemetry::recorder::SharedRecorder;

const POLL_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Debug)]
pub enum CaptureCommand {
    /// Start the device; the outcome of `CaptureDevice::start` is sent back.
    Start(oneshot::Sender<PipelineResult<()>>),
    Stop,
    Shutdown,
}

/// Blocking capture loop. Owns the device and the Segmenter, runs on its own
/// OS thread and hands finished utterances to the async side.
pub struct CaptureWorker<D, C> {
    device: D,
    segmenter: Segmenter<C>,
    commands: mpsc::UnboundedReceiver<CaptureCommand>,
    utterances: mpsc::Sender<Utterance>,
    gate: Arc<TurnGate>,
    telemetry: SharedRecorder,
    running: bool,
}

impl<D, C> CaptureWorker<D, C>
where
    D: CaptureDevice,
    C: FrameClassifier,
{
    pub fn new(
        device: D,
        segmenter: Segmenter<C>,
        commands: mpsc::UnboundedReceiver<CaptureCommand>,
        utterances: mpsc::Sender<Utterance>,
        gate: Arc<TurnGate>,
        telemetry: SharedRecorder,
    ) -> Self {
        Self {
            device,
            segmenter,
            commands,
            utterances,
            gate,
            telemetry,
            running: false,
        }
    }

    pub fn run(mut self) {
        let timing = self.segmenter.timing();
        info!(
            "Capture worker started. Rate: {}Hz, Frame: {}ms",
            timing.sample_rate, timing.frame_ms
        );

        let mut frame = vec![0i16; timing.samples_per_frame()];

        loop {
            if let Some(command) = self.next_command() {
                if !self.apply(command) {
                    break;
                }
                continue;
            }

            match self.device.read(&mut frame) {
                Ok(FrameRead::Ready) => {
                    if !self.on_frame(&frame) {
                        info!("Utterance receiver closed; capture worker exiting");
                        break;
                    }
                }
                Ok(FrameRead::Pending) => std::thread::sleep(POLL_INTERVAL),
                Ok(FrameRead::Overrun(lost)) => {
                    warn!("Capture overrun: {} samples dropped", lost);
                }
                Ok(FrameRead::Closed) => {
                    info!("Capture source closed");
                    self.segmenter.reset();
                    self.running = false;
                }
                Err(e) => {
                    warn!("Capture read failed: {}", e);
                    std::thread::sleep(POLL_INTERVAL);
                }
            }
        }

        if let Err(e) = self.device.stop() {
            debug!("Device stop on exit: {}", e);
        }
        info!("Capture worker stopped");
    }

    /// Blocks while stopped; never blocks while running.
    fn next_command(&mut self) -> Option<CaptureCommand> {
        if self.running {
            match self.commands.try_recv() {
                Ok(command) => Some(command),
                Err(TryRecvError::Empty) => None,
                Err(TryRecvError::Disconnected) => Some(CaptureCommand::Shutdown),
            }
        } else {
            Some(self.commands.blocking_recv().unwrap_or(CaptureCommand::Shutdown))
        }
    }

    /// Returns false when the worker should exit.
    fn apply(&mut self, command: CaptureCommand) -> bool {
        match command {
            CaptureCommand::Start(reply) => {
                let started = if self.running {
                    Ok(())
                } else {
                    self.device.start()
                };
                match &started {
                    Ok(()) if !self.running => {
                        self.running = true;
                        info!("Capture started");
                    }
                    Ok(()) => {}
                    Err(e) => warn!("Capture start failed: {}", e),
                }
                let _ = reply.send(started);
                true
            }
            CaptureCommand::Stop => {
                if self.running {
                    if let Err(e) = self.device.stop() {
                        warn!("Capture stop failed: {}", e);
                    }
                    self.segmenter.reset();
                    self.running = false;
                    info!("Capture stopped");
                }
                true
            }
            CaptureCommand::Shutdown => false,
        }
    }

    fn on_frame(&mut self, frame: &[i16]) -> bool {
        match self.segmenter.push(frame) {
            None => true,
            Some(Endpoint::Discarded { speech_ms }) => {
                self.telemetry.record(TelemetryEvent::UtteranceDropped {
                    reason: DropReason::TooShort,
                    duration_ms: speech_ms,
                });
                true
            }
            Some(Endpoint::Emitted(utterance)) => {
                if !self.gate.is_listening() {
                    debug!("Gate paused; dropping {}ms utterance", utterance.duration_ms);
                    self.telemetry.record(TelemetryEvent::UtteranceDropped {
                        reason: DropReason::GatePaused,
                        duration_ms: utterance.duration_ms,
                    });
                    return true;
                }

                info!(
                    "Utterance {} closed: start={}ms duration={}ms",
                    utterance.id, utterance.start_ms, utterance.duration_ms
                );
                self.telemetry.record(TelemetryEvent::UtteranceEmitted {
                    utterance_id: utterance.id,
                    duration_ms: utterance.duration_ms,
                });
                self.utterances.blocking_send(utterance).is_ok()
            }
        }
    }
}
