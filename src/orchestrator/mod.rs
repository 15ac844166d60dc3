//! Turn-taking side of the pipeline.
//!
//! The orchestrator owns the connection to the recognition leg. For every
//! transcript it pauses the leg, generates a response, speaks it, and
//! resumes the leg. Resume is sent whatever happened in between.

pub mod link;

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;
use tokio_util::task::AbortOnDropHandle;
use tracing::{debug, error, info, warn};

use self::link::{ControlLink, Connector};
use crate::config::{OrchestratorConfig, SynthesisMode};
use crate::error::{PipelineError, PipelineResult};
use crate::kernel::protocol::{ControlCommand, GateState, LegMessage};
use crate::kernel::state::OrchestratorState;
use crate::kernel::telemetry::event::TelemetryEvent;
use crate::kernel::telemetry::recorder::SharedRecorder;
use crate::pipeline::synthesis::{SpeechPipeline, TurnOutcome};
use crate::services::llm::client::{Generator, Prompt};
use crate::services::retrieval::Retriever;

const FRAGMENT_QUEUE: usize = 64;
const RESUME_ACK_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&OrchestratorConfig::default())
    }
}

impl From<&OrchestratorConfig> for RetryPolicy {
    fn from(config: &OrchestratorConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            backoff: config.backoff,
        }
    }
}

enum SessionEnd {
    Shutdown,
    Lost(String),
}

pub struct Orchestrator {
    connector: Arc<dyn Connector>,
    generator: Arc<dyn Generator>,
    retriever: Option<(Arc<dyn Retriever>, usize)>,
    speech: SpeechPipeline,
    policy: RetryPolicy,
    resume_ack_timeout: Duration,
    telemetry: SharedRecorder,
    state: OrchestratorState,
    state_tx: watch::Sender<OrchestratorState>,
}

impl Orchestrator {
    pub fn new(
        connector: Arc<dyn Connector>,
        generator: Arc<dyn Generator>,
        speech: SpeechPipeline,
        policy: RetryPolicy,
    ) -> Self {
        let (state_tx, _) = watch::channel(OrchestratorState::Connecting);
        Self {
            connector,
            generator,
            retriever: None,
            speech,
            policy,
            resume_ack_timeout: RESUME_ACK_TIMEOUT,
            telemetry: SharedRecorder::new(),
            state: OrchestratorState::Connecting,
            state_tx,
        }
    }

    pub fn with_retriever(mut self, retriever: Arc<dyn Retriever>, top_k: usize) -> Self {
        self.retriever = Some((retriever, top_k));
        self
    }

    /// Legs that never acknowledge a resume are treated as listening again
    /// once this has passed.
    pub fn with_resume_ack_timeout(mut self, timeout: Duration) -> Self {
        self.resume_ack_timeout = timeout;
        self
    }

    pub fn with_telemetry(mut self, telemetry: SharedRecorder) -> Self {
        self.telemetry = telemetry;
        self
    }

    pub fn state(&self) -> OrchestratorState {
        self.state
    }

    pub fn subscribe(&self) -> watch::Receiver<OrchestratorState> {
        self.state_tx.subscribe()
    }

    pub fn telemetry(&self) -> &SharedRecorder {
        &self.telemetry
    }

    /// Connect, serve turns, reconnect on loss. Returns `Ok` on shutdown and
    /// `RetriesExhausted` once `max_attempts` consecutive attempts failed.
    pub async fn run(&mut self, shutdown: CancellationToken) -> PipelineResult<()> {
        let mut failures = 0u32;

        loop {
            self.transition(OrchestratorState::Connecting);
            info!("[Ears] Connecting...");

            let connected = tokio::select! {
                _ = shutdown.cancelled() => {
                    self.finish();
                    return Ok(());
                }
                connected = self.connector.connect() => connected,
            };

            let reason = match connected {
                Ok(mut link) => {
                    failures = 0;
                    info!("[Ears] Connected");
                    let end = self.session(link.as_mut(), &shutdown).await;
                    link.close().await;
                    match end {
                        SessionEnd::Shutdown => {
                            self.finish();
                            return Ok(());
                        }
                        SessionEnd::Lost(reason) => reason,
                    }
                }
                Err(e) => e.to_string(),
            };

            failures += 1;
            self.telemetry.record(TelemetryEvent::ReconnectAttempt { attempt: failures });

            if failures >= self.policy.max_attempts {
                error!("[Ears] {} ({}/{}); giving up", reason, failures, self.policy.max_attempts);
                self.transition(OrchestratorState::Disconnected);
                self.log_summary();
                return Err(PipelineError::RetriesExhausted { attempts: failures });
            }

            warn!(
                "[Ears] {} ({}/{}); retrying in {:?}",
                reason, failures, self.policy.max_attempts, self.policy.backoff
            );
            tokio::select! {
                _ = shutdown.cancelled() => {
                    self.finish();
                    return Ok(());
                }
                _ = tokio::time::sleep(self.policy.backoff) => {}
            }
        }
    }

    async fn session(&mut self, link: &mut dyn ControlLink, shutdown: &CancellationToken) -> SessionEnd {
        self.transition(OrchestratorState::ListeningForTranscript);

        // A leg left paused by an earlier session starts listening again.
        self.send_command(link, ControlCommand::ResumeListening).await;

        // Deadline for the leg to confirm the RESUME that ended our last turn.
        let mut awaiting_resume: Option<tokio::time::Instant> = None;

        loop {
            let line = tokio::select! {
                _ = shutdown.cancelled() => return SessionEnd::Shutdown,
                line = link.recv() => line,
            };
            let line = match line {
                Some(Ok(line)) => line,
                Some(Err(e)) => return SessionEnd::Lost(e.to_string()),
                None => return SessionEnd::Lost("connection closed by leg".into()),
            };

            let message = match LegMessage::parse(&line) {
                Ok(Some(message)) => message,
                Ok(None) => continue,
                Err(e) => {
                    warn!("[Ears] {}", e);
                    continue;
                }
            };

            match message {
                LegMessage::Connected(info) => info!("[Ears] {}", info),
                LegMessage::Ack(command) => {
                    debug!("[Ears] ACK: {}", command);
                    if command.eq_ignore_ascii_case(ControlCommand::ResumeListening.as_str()) {
                        awaiting_resume = None;
                    }
                }
                LegMessage::State(GateState::Listening) => {
                    awaiting_resume = None;
                    info!("[Ears] Listening...");
                }
                LegMessage::State(GateState::Paused) => info!("[Ears] Listening paused"),
                LegMessage::Error(message) => warn!("[Ears] Leg reported: {}", message),
                LegMessage::Transcript(text) => {
                    if let Some(deadline) = awaiting_resume {
                        if tokio::time::Instant::now() < deadline {
                            warn!("[Ears] Transcript received while paused; discarded");
                            self.telemetry.record(TelemetryEvent::ProtocolViolation);
                            continue;
                        }
                        warn!(
                            "[Ears] Resume not acknowledged within {:?}; treating leg as listening",
                            self.resume_ack_timeout
                        );
                    }
                    let resumed = self.handle_turn(link, text, shutdown).await;
                    awaiting_resume = resumed.then(|| tokio::time::Instant::now() + self.resume_ack_timeout);
                    if shutdown.is_cancelled() {
                        return SessionEnd::Shutdown;
                    }
                }
            }
        }
    }

    /// Pause, respond, resume. Returns whether the resume was delivered.
    async fn handle_turn(&mut self, link: &mut dyn ControlLink, text: String, shutdown: &CancellationToken) -> bool {
        let started = Instant::now();
        info!("[Ears] Transcript: '{}'", text);

        self.transition(OrchestratorState::OnTranscript);
        self.send_command(link, ControlCommand::PauseListening).await;

        let result = tokio::select! {
            result = self.run_turn(&text) => Some(result),
            _ = shutdown.cancelled() => None,
        };

        match result {
            Some(Ok(outcome)) => {
                let latency_ms = started.elapsed().as_millis() as u64;
                info!("[Turn] Completed: {} units in {}ms", outcome.units, latency_ms);
                self.telemetry.record(TelemetryEvent::TurnCompleted {
                    units: outcome.units,
                    latency_ms,
                });
            }
            Some(Err(e)) => {
                error!("[Turn] Failed ({}): {}", e.class(), e);
                self.telemetry.record(TelemetryEvent::TurnFailed { class: e.class().into() });
            }
            None => {
                self.speech.stop();
                warn!("[Turn] Interrupted by shutdown");
            }
        }

        self.transition(OrchestratorState::Resuming);
        let resumed = self.send_command(link, ControlCommand::ResumeListening).await;
        self.transition(OrchestratorState::ListeningForTranscript);
        resumed
    }

    async fn run_turn(&mut self, text: &str) -> PipelineResult<TurnOutcome> {
        let prompt = self.prompt_for(text);
        self.transition(OrchestratorState::Generating);

        if self.speech.mode() != SynthesisMode::Incremental {
            info!("[Head] Thinking...");
            let response = self.generator.generate(&prompt).await?;
            info!("[Head] Response ready: {} chars", response.chars().count());
            debug!("[Head] Response: {}", response);
            self.transition(OrchestratorState::SynthesizingAndPlaying);
            return self.speech.speak_text(&response).await;
        }

        let (fragment_tx, fragment_rx) = mpsc::channel(FRAGMENT_QUEUE);
        let (done_tx, done_rx) = oneshot::channel();
        let generator = self.generator.clone();
        // Aborted with the turn if speaking fails or the turn is dropped.
        let _generation = AbortOnDropHandle::new(tokio::spawn(async move {
            let result = generator.generate_stream(&prompt, fragment_tx).await;
            let _ = done_tx.send(result);
        }));

        self.transition(OrchestratorState::SynthesizingAndPlaying);
        self.speech.speak_stream(fragment_rx, done_rx).await
    }

    fn prompt_for(&self, text: &str) -> Prompt {
        let prompt = Prompt::new(text);
        match &self.retriever {
            Some((retriever, top_k)) => {
                let context: Vec<String> = retriever.search(text, *top_k).iter().map(|s| s.render()).collect();
                debug!("[RAG] {} context snippets", context.len());
                prompt.with_context(context)
            }
            None => prompt,
        }
    }

    /// Fire-and-forget; a failed delivery is logged and the turn goes on.
    async fn send_command(&mut self, link: &mut dyn ControlLink, command: ControlCommand) -> bool {
        match link.send(command).await {
            Ok(()) => {
                debug!("[Ears] Sent {}", command);
                true
            }
            Err(e) => {
                warn!("[Ears] Failed to send {}: {}", command, e);
                self.telemetry.record(TelemetryEvent::CommandDeliveryFailed);
                false
            }
        }
    }

    fn transition(&mut self, next: OrchestratorState) {
        let from = self.state;
        if from == next {
            return;
        }
        if !from.can_transition(next) {
            warn!("[State] Unexpected transition {} -> {}", from, next);
        }
        debug!("[State] {} -> {}", from, next);
        self.state = next;
        self.state_tx.send_replace(next);
        self.telemetry.record(TelemetryEvent::StateTransition { from, to: next });
    }

    fn finish(&mut self) {
        info!("[Ears] Shutting down");
        self.transition(OrchestratorState::Disconnected);
        self.log_summary();
    }

    fn log_summary(&self) {
        let snap = self.telemetry.snapshot();
        info!(
            "[Session] turns: {} ok / {} failed, units played: {}, avg latency: {:.0}ms, reconnects: {}, protocol violations: {}",
            snap.turn_stats.completed,
            snap.turn_stats.failed,
            snap.turn_stats.units_played,
            snap.turn_stats.avg_latency_ms,
            snap.link_stats.reconnect_attempts,
            snap.link_stats.protocol_violations,
        );
    }
}
