//! Recognition leg: microphone -> utterances -> transcripts, served to the
//! orchestrator over the `/listen` control channel.

use std::sync::Arc;

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use parley::audio::capture::{CaptureDevice, CpalCapture};
use parley::config::Config;
use parley::kernel::audio::monitor::VadClassifier;
use parley::kernel::gate::TurnGate;
use parley::kernel::telemetry::recorder::SharedRecorder;
use parley::recognition::hub::ControlPlane;
use parley::recognition::server::ListenServer;
use parley::recognition::session::RecognitionSession;
use parley::services::stt::client::HttpRecognizer;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("setting default subscriber failed")?;

    let config = Config::from_env().context("loading configuration")?;
    let telemetry = SharedRecorder::new();
    let control = Arc::new(ControlPlane::new("ears", Arc::new(TurnGate::default())));
    let recognizer = Arc::new(HttpRecognizer::new(
        config.recognition.stt_url.clone(),
        config.recognition.request_timeout,
    ));

    let rate = config.recognition.capture_sample_rate;
    let aggressiveness = config.segmenter.vad_aggressiveness;
    let threshold = config.segmenter.energy_rms_threshold;
    let session = RecognitionSession::open(
        move || {
            let device = CpalCapture::open(rate)?;
            let classifier = VadClassifier::new(device.sample_rate(), aggressiveness, threshold)?;
            Ok((device, classifier))
        },
        config.segmenter.clone(),
        config.recognition.language.clone(),
        recognizer,
        control.clone(),
        telemetry.clone(),
    )
    .await
    .context("opening capture device")?;
    session.start().await.context("starting capture")?;

    let addr = format!("{}:{}", config.recognition.host, config.recognition.port);
    let server = ListenServer::bind(&addr, control).await.context("binding control server")?;
    tracing::info!("Ears ready on ws://{}/listen", server.local_addr()?);

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Ctrl-C received");
        }
        signal.cancel();
    });

    let served = server.run(shutdown).await;
    session.close().await;

    let snap = telemetry.snapshot();
    tracing::info!(
        "[Session] utterances: {} emitted, {} too short, {} dropped while paused, {} empty transcripts",
        snap.utterance_stats.emitted,
        snap.utterance_stats.too_short,
        snap.utterance_stats.dropped_paused,
        snap.utterance_stats.empty_transcripts,
    );
    served?;
    Ok(())
}
