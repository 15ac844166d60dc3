use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use parley::audio::playback::{AudioChunk, AudioSink};
use parley::config::SynthesisMode;
use parley::error::{ErrorClass, PipelineError, PipelineResult};
use parley::kernel::gate::TurnGate;
use parley::kernel::protocol::ControlCommand;
use parley::kernel::state::OrchestratorState;
use parley::kernel::telemetry::event::{FailureClass, TelemetryEvent};
use parley::orchestrator::link::{Connector, ControlLink};
use parley::orchestrator::{Orchestrator, RetryPolicy};
use parley::pipeline::synthesis::{SpeechPipeline, SpeechSettings};
use parley::recognition::hub::{ControlPlane, ListenerId, Publication};
use parley::services::llm::client::{Generator, Prompt};
use parley::services::retrieval::{KeywordRetriever, Snippet};
use parley::services::tts::client::{SynthesisRequest, Synthesizer};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{timeout, Instant};
use tokio_util::sync::CancellationToken;

type Commands = Arc<Mutex<Vec<ControlCommand>>>;

// ---------------------------------------------------------------- links

/// Link attached to an in-process ControlPlane, as a real leg would be.
struct LocalLink {
    control: Arc<ControlPlane>,
    id: ListenerId,
    rx: mpsc::UnboundedReceiver<String>,
    commands: Commands,
}

#[async_trait]
impl ControlLink for LocalLink {
    async fn send(&mut self, command: ControlCommand) -> PipelineResult<()> {
        self.commands.lock().unwrap().push(command);
        self.control.handle_line(self.id, command.as_str());
        Ok(())
    }

    async fn recv(&mut self) -> Option<PipelineResult<String>> {
        self.rx.recv().await.map(Ok)
    }

    async fn close(&mut self) {
        self.control.disconnect(self.id);
    }
}

struct LocalConnector {
    control: Arc<ControlPlane>,
    commands: Commands,
}

#[async_trait]
impl Connector for LocalConnector {
    async fn connect(&self) -> PipelineResult<Box<dyn ControlLink>> {
        let (id, rx) = self.control.connect();
        Ok(Box::new(LocalLink {
            control: self.control.clone(),
            id,
            rx,
            commands: self.commands.clone(),
        }))
    }
}

/// Link whose incoming lines are fed by the test; nothing is answered.
struct ScriptedLink {
    incoming: mpsc::UnboundedReceiver<String>,
    commands: Commands,
}

#[async_trait]
impl ControlLink for ScriptedLink {
    async fn send(&mut self, command: ControlCommand) -> PipelineResult<()> {
        self.commands.lock().unwrap().push(command);
        Ok(())
    }

    async fn recv(&mut self) -> Option<PipelineResult<String>> {
        self.incoming.recv().await.map(Ok)
    }

    async fn close(&mut self) {}
}

/// Fails the first `failures` attempts, then hands out queued links.
struct FlakyConnector {
    failures: usize,
    attempts: AtomicUsize,
    links: Mutex<VecDeque<ScriptedLink>>,
}

impl FlakyConnector {
    fn new(failures: usize, links: Vec<ScriptedLink>) -> Arc<Self> {
        Arc::new(Self {
            failures,
            attempts: AtomicUsize::new(0),
            links: Mutex::new(links.into()),
        })
    }

    fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for FlakyConnector {
    async fn connect(&self) -> PipelineResult<Box<dyn ControlLink>> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
        if attempt < self.failures {
            return Err(PipelineError::Connectivity("connection refused".into()));
        }
        match self.links.lock().unwrap().pop_front() {
            Some(link) => Ok(Box::new(link)),
            None => Err(PipelineError::Connectivity("no more links".into())),
        }
    }
}

fn scripted_link(commands: &Commands) -> (mpsc::UnboundedSender<String>, ScriptedLink) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        tx,
        ScriptedLink {
            incoming: rx,
            commands: commands.clone(),
        },
    )
}

// ---------------------------------------------------------------- collaborators

struct FakeGenerator {
    reply: Result<String, String>,
    prompts: Mutex<Vec<Prompt>>,
}

impl FakeGenerator {
    fn replying(reply: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: Ok(reply.to_string()),
            prompts: Mutex::new(Vec::new()),
        })
    }

    fn failing(message: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: Err(message.to_string()),
            prompts: Mutex::new(Vec::new()),
        })
    }

    fn prompts(&self) -> Vec<Prompt> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl Generator for FakeGenerator {
    async fn generate(&self, prompt: &Prompt) -> PipelineResult<String> {
        self.prompts.lock().unwrap().push(prompt.clone());
        tokio::time::sleep(Duration::from_millis(20)).await;
        self.reply.clone().map_err(PipelineError::Generation)
    }

    async fn generate_stream(&self, prompt: &Prompt, fragments: mpsc::Sender<String>) -> PipelineResult<()> {
        self.prompts.lock().unwrap().push(prompt.clone());
        let reply = self.reply.clone().map_err(PipelineError::Generation)?;
        let chars: Vec<char> = reply.chars().collect();
        for piece in chars.chunks(4) {
            tokio::time::sleep(Duration::from_millis(5)).await;
            if fragments.send(piece.iter().collect()).await.is_err() {
                break;
            }
        }
        Ok(())
    }
}

/// Streams its fragments, then fails as a dropped connection would.
struct BrokenStreamGenerator {
    fragments: Vec<&'static str>,
}

#[async_trait]
impl Generator for BrokenStreamGenerator {
    async fn generate(&self, _prompt: &Prompt) -> PipelineResult<String> {
        Err(PipelineError::Generation("stream only".into()))
    }

    async fn generate_stream(&self, _prompt: &Prompt, fragments: mpsc::Sender<String>) -> PipelineResult<()> {
        for fragment in &self.fragments {
            tokio::time::sleep(Duration::from_millis(5)).await;
            let _ = fragments.send(fragment.to_string()).await;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
        Err(PipelineError::Generation("stream interrupted".into()))
    }
}

#[derive(Default)]
struct EchoSynthesizer {
    texts: Mutex<Vec<String>>,
}

#[async_trait]
impl Synthesizer for EchoSynthesizer {
    async fn synthesize(
        &self,
        request: &SynthesisRequest,
        chunks: mpsc::UnboundedSender<AudioChunk>,
    ) -> PipelineResult<()> {
        self.texts.lock().unwrap().push(request.text.clone());
        tokio::time::sleep(Duration::from_millis(30)).await;
        let _ = chunks.send(AudioChunk::new(vec![7; 2400], 24000));
        Ok(())
    }
}

#[derive(Clone, Default)]
struct CountingSink {
    chunks: Arc<AtomicUsize>,
    stopped: Arc<AtomicBool>,
}

#[async_trait]
impl AudioSink for CountingSink {
    async fn write(&mut self, _chunk: &AudioChunk) -> PipelineResult<()> {
        self.chunks.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn drain(&mut self) -> PipelineResult<()> {
        Ok(())
    }

    fn stop(&mut self) {
        self.stopped.store(true, Ordering::SeqCst);
    }
}

struct Harness {
    synth: Arc<EchoSynthesizer>,
    sink: CountingSink,
}

impl Harness {
    fn new() -> Self {
        Self {
            synth: Arc::new(EchoSynthesizer::default()),
            sink: CountingSink::default(),
        }
    }

    fn speech(&self, mode: SynthesisMode) -> SpeechPipeline {
        let settings = SpeechSettings {
            mode,
            max_concurrency: 2,
            ..SpeechSettings::default()
        };
        SpeechPipeline::new(self.synth.clone(), Box::new(self.sink.clone()), settings)
    }

    fn spoken(&self) -> Vec<String> {
        self.synth.texts.lock().unwrap().clone()
    }
}

fn policy(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        backoff: Duration::from_secs(3),
    }
}

fn spawn_run(
    mut orchestrator: Orchestrator,
    shutdown: CancellationToken,
) -> JoinHandle<(Orchestrator, PipelineResult<()>)> {
    tokio::spawn(async move {
        let result = orchestrator.run(shutdown).await;
        (orchestrator, result)
    })
}

async fn wait_for(mut check: impl FnMut() -> bool) {
    timeout(Duration::from_secs(30), async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition reached in time");
}

fn turns_done(orchestrator_events: &[TelemetryEvent]) -> usize {
    orchestrator_events
        .iter()
        .filter(|e| matches!(e, TelemetryEvent::TurnCompleted { .. } | TelemetryEvent::TurnFailed { .. }))
        .count()
}

// ---------------------------------------------------------------- tests

#[tokio::test]
async fn test_turn_pauses_then_resumes_leg() {
    let control = Arc::new(ControlPlane::new("ears", Arc::new(TurnGate::default())));
    let (_observer, mut observer_rx) = control.connect();
    observer_rx.recv().await.unwrap(); // greeting

    let commands = Commands::default();
    let connector = Arc::new(LocalConnector {
        control: control.clone(),
        commands: commands.clone(),
    });
    let generator = FakeGenerator::replying("Hi there. Nice to meet you!");
    let harness = Harness::new();
    let orchestrator = Orchestrator::new(connector, generator.clone(), harness.speech(SynthesisMode::BatchSentences), policy(3));
    let telemetry = orchestrator.telemetry().clone();
    let mut states = orchestrator.subscribe();

    let shutdown = CancellationToken::new();
    let run = spawn_run(orchestrator, shutdown.clone());

    // 1. Connected and listening, with the initial RESUME acknowledged.
    states.wait_for(|s| *s == OrchestratorState::ListeningForTranscript).await.unwrap();
    wait_for(|| control.registry().len() == 2).await;

    // 2. A transcript drives one full turn.
    let transcript = parley::kernel::audio::segment::Transcript::from_recognized(uuid::Uuid::new_v4(), "hello").unwrap();
    assert_eq!(control.publish_transcript(&transcript), Publication::Delivered(2));
    wait_for(|| turns_done(&telemetry.events()) == 1).await;
    wait_for(|| commands.lock().unwrap().len() == 3).await;

    assert_eq!(
        *commands.lock().unwrap(),
        vec![ControlCommand::ResumeListening, ControlCommand::PauseListening, ControlCommand::ResumeListening]
    );
    assert!(control.gate().is_listening());

    // 3. The leg's other listeners saw it pause and come back.
    let mut seen = Vec::new();
    while let Ok(line) = observer_rx.try_recv() {
        seen.push(line);
    }
    assert_eq!(seen, vec!["hello", "STATE: PAUSED", "STATE: LISTENING"]);

    assert_eq!(generator.prompts()[0].text, "hello");
    assert_eq!(harness.spoken(), vec!["Hi there.", "Nice to meet you!"]);
    assert_eq!(harness.sink.chunks.load(Ordering::SeqCst), 2);

    shutdown.cancel();
    let (orchestrator, result) = run.await.unwrap();
    assert!(result.is_ok());
    assert_eq!(orchestrator.state(), OrchestratorState::Disconnected);

    let snap = orchestrator.telemetry().snapshot();
    assert_eq!(snap.turn_stats.completed, 1);
    assert_eq!(snap.turn_stats.units_played, 2);
}

#[tokio::test(start_paused = true)]
async fn test_gives_up_after_max_attempts() {
    let connector = FlakyConnector::new(usize::MAX, Vec::new());
    let harness = Harness::new();
    let mut orchestrator = Orchestrator::new(
        connector.clone(),
        FakeGenerator::replying("unused"),
        harness.speech(SynthesisMode::Batch),
        policy(3),
    );

    let started = Instant::now();
    let result = orchestrator.run(CancellationToken::new()).await;

    assert!(matches!(result, Err(PipelineError::RetriesExhausted { attempts: 3 })));
    assert_eq!(connector.attempts(), 3);
    // Backoff between attempts only, not after the last one.
    assert_eq!(started.elapsed(), Duration::from_secs(6));
    assert_eq!(orchestrator.state(), OrchestratorState::Disconnected);
    assert_eq!(orchestrator.telemetry().snapshot().link_stats.reconnect_attempts, 3);
}

#[tokio::test(start_paused = true)]
async fn test_recovers_when_a_retry_connects() {
    let commands = Commands::default();
    let (lines, link) = scripted_link(&commands);
    let connector = FlakyConnector::new(1, vec![link]);
    let harness = Harness::new();
    let orchestrator = Orchestrator::new(
        connector.clone(),
        FakeGenerator::replying("unused"),
        harness.speech(SynthesisMode::Batch),
        policy(2),
    );
    let mut states = orchestrator.subscribe();

    let shutdown = CancellationToken::new();
    let run = spawn_run(orchestrator, shutdown.clone());

    states.wait_for(|s| *s == OrchestratorState::ListeningForTranscript).await.unwrap();
    wait_for(|| commands.lock().unwrap().len() == 1).await;
    assert_eq!(connector.attempts(), 2);
    assert_eq!(*commands.lock().unwrap(), vec![ControlCommand::ResumeListening]);

    shutdown.cancel();
    let (_, result) = run.await.unwrap();
    assert!(result.is_ok());
    drop(lines);
}

#[tokio::test(start_paused = true)]
async fn test_lost_session_counts_toward_retries() {
    let commands = Commands::default();
    let (first_lines, first) = scripted_link(&commands);
    let (second_lines, second) = scripted_link(&commands);
    drop(first_lines);
    drop(second_lines);
    let connector = FlakyConnector::new(0, vec![first, second]);
    let harness = Harness::new();
    let mut orchestrator = Orchestrator::new(
        connector.clone(),
        FakeGenerator::replying("unused"),
        harness.speech(SynthesisMode::Batch),
        policy(3),
    );

    let result = orchestrator.run(CancellationToken::new()).await;

    // Each connection resets the count; only the consecutive tail matters.
    assert!(matches!(result, Err(PipelineError::RetriesExhausted { attempts: 3 })));
    assert_eq!(connector.attempts(), 4);
}

#[tokio::test(start_paused = true)]
async fn test_failed_generation_still_resumes() {
    let commands = Commands::default();
    let (lines, link) = scripted_link(&commands);
    let connector = FlakyConnector::new(0, vec![link]);
    let harness = Harness::new();
    let orchestrator = Orchestrator::new(
        connector,
        FakeGenerator::failing("model offline"),
        harness.speech(SynthesisMode::BatchSentences),
        policy(3),
    );
    let telemetry = orchestrator.telemetry().clone();

    let shutdown = CancellationToken::new();
    let run = spawn_run(orchestrator, shutdown.clone());

    lines.send("what time is it".into()).unwrap();
    wait_for(|| turns_done(&telemetry.events()) == 1).await;
    wait_for(|| commands.lock().unwrap().len() == 3).await;

    assert_eq!(
        *commands.lock().unwrap(),
        vec![ControlCommand::ResumeListening, ControlCommand::PauseListening, ControlCommand::ResumeListening]
    );
    assert!(harness.spoken().is_empty());
    assert!(telemetry.events().contains(&TelemetryEvent::TurnFailed {
        class: FailureClass::from(ErrorClass::Collaborator)
    }));

    shutdown.cancel();
    let (orchestrator, _) = run.await.unwrap();
    assert_eq!(orchestrator.telemetry().snapshot().turn_stats.failed, 1);
}

#[tokio::test(start_paused = true)]
async fn test_transcript_before_resume_ack_is_discarded() {
    let commands = Commands::default();
    let (lines, link) = scripted_link(&commands);
    let connector = FlakyConnector::new(0, vec![link]);
    let generator = FakeGenerator::replying("Okay.");
    let harness = Harness::new();
    let orchestrator = Orchestrator::new(connector, generator.clone(), harness.speech(SynthesisMode::Batch), policy(3));
    let telemetry = orchestrator.telemetry().clone();

    let shutdown = CancellationToken::new();
    let run = spawn_run(orchestrator, shutdown.clone());

    lines.send("first".into()).unwrap();
    wait_for(|| turns_done(&telemetry.events()) == 1).await;
    wait_for(|| commands.lock().unwrap().len() == 3).await;

    // Resume sent but not yet confirmed by the leg.
    lines.send("stray".into()).unwrap();
    wait_for(|| telemetry.events().contains(&TelemetryEvent::ProtocolViolation)).await;

    lines.send("ACK: RESUME_LISTENING".into()).unwrap();
    lines.send("second".into()).unwrap();
    wait_for(|| turns_done(&telemetry.events()) == 2).await;

    let texts: Vec<String> = generator.prompts().into_iter().map(|p| p.text).collect();
    assert_eq!(texts, vec!["first", "second"]);

    shutdown.cancel();
    let (orchestrator, _) = run.await.unwrap();
    assert_eq!(orchestrator.telemetry().snapshot().link_stats.protocol_violations, 1);
}

#[tokio::test(start_paused = true)]
async fn test_leg_status_lines_are_not_transcripts() {
    let commands = Commands::default();
    let (lines, link) = scripted_link(&commands);
    let connector = FlakyConnector::new(0, vec![link]);
    let generator = FakeGenerator::replying("Okay.");
    let harness = Harness::new();
    let orchestrator = Orchestrator::new(connector, generator.clone(), harness.speech(SynthesisMode::Batch), policy(3));
    let mut states = orchestrator.subscribe();

    let shutdown = CancellationToken::new();
    let run = spawn_run(orchestrator, shutdown.clone());
    states.wait_for(|s| *s == OrchestratorState::ListeningForTranscript).await.unwrap();

    for line in ["CONNECTED: ears (LISTENING)", "STATE: LISTENING", "ACK: RESUME_LISTENING", "ERROR: nope", "STATE: BOGUS", ""] {
        lines.send(line.into()).unwrap();
    }
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert!(generator.prompts().is_empty());
    assert_eq!(*commands.lock().unwrap(), vec![ControlCommand::ResumeListening]);

    shutdown.cancel();
    assert!(run.await.unwrap().1.is_ok());
}

#[tokio::test(start_paused = true)]
async fn test_incremental_turn_with_retrieved_context() {
    let commands = Commands::default();
    let (lines, link) = scripted_link(&commands);
    let connector = FlakyConnector::new(0, vec![link]);
    let generator = FakeGenerator::replying("The shop opens at nine. It closes at five.");
    let harness = Harness::new();
    let retriever = KeywordRetriever::new(vec![
        Snippet {
            title: Some("Hours".into()),
            content: "The shop opens at nine".into(),
            speaker: None,
            date: None,
        },
        Snippet {
            title: None,
            content: "Parking is free".into(),
            speaker: None,
            date: None,
        },
    ]);
    let orchestrator = Orchestrator::new(connector, generator.clone(), harness.speech(SynthesisMode::Incremental), policy(3))
        .with_retriever(Arc::new(retriever), 3);
    let telemetry = orchestrator.telemetry().clone();

    let shutdown = CancellationToken::new();
    let run = spawn_run(orchestrator, shutdown.clone());

    lines.send("when does the shop open".into()).unwrap();
    wait_for(|| turns_done(&telemetry.events()) == 1).await;

    let prompt = generator.prompts()[0].clone();
    assert_eq!(prompt.context, vec!["[Hours] The shop opens at nine"]);
    assert_eq!(harness.spoken(), vec!["The shop opens at nine.", "It closes at five."]);

    shutdown.cancel();
    let (orchestrator, _) = run.await.unwrap();
    assert_eq!(orchestrator.telemetry().snapshot().turn_stats.units_played, 2);
}

#[tokio::test(start_paused = true)]
async fn test_interrupted_stream_drops_unfinished_sentence() {
    let commands = Commands::default();
    let (lines, link) = scripted_link(&commands);
    let connector = FlakyConnector::new(0, vec![link]);
    let generator = Arc::new(BrokenStreamGenerator {
        fragments: vec!["Hello there. ", "I was about to say some"],
    });
    let harness = Harness::new();
    let orchestrator = Orchestrator::new(connector, generator, harness.speech(SynthesisMode::Incremental), policy(3));
    let telemetry = orchestrator.telemetry().clone();

    let shutdown = CancellationToken::new();
    let run = spawn_run(orchestrator, shutdown.clone());

    lines.send("say something".into()).unwrap();
    wait_for(|| turns_done(&telemetry.events()) == 1).await;
    wait_for(|| commands.lock().unwrap().len() == 3).await;

    // The closed sentence went out; the cut-off one never reached synthesis.
    assert_eq!(harness.spoken(), vec!["Hello there."]);
    assert!(harness.sink.stopped.load(Ordering::SeqCst));
    assert!(telemetry.events().contains(&TelemetryEvent::TurnFailed {
        class: FailureClass::from(ErrorClass::Collaborator)
    }));
    assert_eq!(commands.lock().unwrap().last(), Some(&ControlCommand::ResumeListening));

    shutdown.cancel();
    let (orchestrator, _) = run.await.unwrap();
    assert_eq!(orchestrator.telemetry().snapshot().turn_stats.completed, 0);
}

#[tokio::test(start_paused = true)]
async fn test_unacknowledged_resume_expires() {
    let commands = Commands::default();
    let (lines, link) = scripted_link(&commands);
    let connector = FlakyConnector::new(0, vec![link]);
    let generator = FakeGenerator::replying("Okay.");
    let harness = Harness::new();
    let orchestrator = Orchestrator::new(connector, generator.clone(), harness.speech(SynthesisMode::Batch), policy(3))
        .with_resume_ack_timeout(Duration::from_secs(2));
    let telemetry = orchestrator.telemetry().clone();

    let shutdown = CancellationToken::new();
    let run = spawn_run(orchestrator, shutdown.clone());

    lines.send("first".into()).unwrap();
    wait_for(|| turns_done(&telemetry.events()) == 1).await;
    wait_for(|| commands.lock().unwrap().len() == 3).await;

    // Inside the window the leg is still presumed paused.
    lines.send("stray".into()).unwrap();
    wait_for(|| telemetry.events().contains(&TelemetryEvent::ProtocolViolation)).await;

    // The leg never acknowledges; once the window lapses transcripts count again.
    tokio::time::sleep(Duration::from_secs(3)).await;
    lines.send("second".into()).unwrap();
    wait_for(|| turns_done(&telemetry.events()) == 2).await;

    tokio::time::sleep(Duration::from_secs(3)).await;
    lines.send("third".into()).unwrap();
    wait_for(|| turns_done(&telemetry.events()) == 3).await;

    let texts: Vec<String> = generator.prompts().into_iter().map(|p| p.text).collect();
    assert_eq!(texts, vec!["first", "second", "third"]);

    shutdown.cancel();
    let (orchestrator, _) = run.await.unwrap();
    assert_eq!(orchestrator.telemetry().snapshot().link_stats.protocol_violations, 1);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_mid_turn_cancels_synthesis() {
    let commands = Commands::default();
    let (lines, link) = scripted_link(&commands);
    let connector = FlakyConnector::new(0, vec![link]);
    let generator = FakeGenerator::replying("One. Two. Three. Four. Five. Six. Seven. Eight.");
    let harness = Harness::new();
    let orchestrator = Orchestrator::new(connector, generator, harness.speech(SynthesisMode::BatchSentences), policy(3));

    let shutdown = CancellationToken::new();
    let run = spawn_run(orchestrator, shutdown.clone());

    lines.send("count for me".into()).unwrap();
    wait_for(|| !harness.spoken().is_empty()).await;

    shutdown.cancel();
    let (orchestrator, result) = run.await.unwrap();
    assert!(result.is_ok());
    assert_eq!(orchestrator.state(), OrchestratorState::Disconnected);

    let requested = harness.spoken().len();
    assert!(requested < 8, "turn was cut short, got {}", requested);
    assert!(harness.sink.stopped.load(Ordering::SeqCst), "queued output dropped");

    // Nothing left running in the background keeps synthesizing.
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(harness.spoken().len(), requested);
    assert_eq!(
        *commands.lock().unwrap(),
        vec![ControlCommand::ResumeListening, ControlCommand::PauseListening, ControlCommand::ResumeListening]
    );
}
