use std::sync::Arc;

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use parley::audio::playback::CpalPlayback;
use parley::config::Config;
use parley::orchestrator::link::WsConnector;
use parley::orchestrator::{Orchestrator, RetryPolicy};
use parley::pipeline::synthesis::{SpeechPipeline, SpeechSettings};
use parley::services::llm::client::HttpGenerator;
use parley::services::retrieval::KeywordRetriever;
use parley::services::tts::client::WsSynthesizer;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("setting default subscriber failed")?;

    let config = Config::from_env().context("loading configuration")?;
    tracing::info!("Orchestrator starting (ears: {}, mode: {:?})", config.orchestrator.ears_url, config.synthesis.mode);

    let generator = Arc::new(HttpGenerator::new(config.orchestrator.llm_url.clone(), config.orchestrator.llm_timeout));
    let synthesizer = Arc::new(WsSynthesizer::new(
        config.synthesis.tts_url.clone(),
        config.synthesis.output_sample_rate,
    ));

    let output = CpalPlayback::open(config.synthesis.output_sample_rate).context("opening output device")?;
    tracing::info!("Output device open at {}Hz", output.device_rate());

    let speech = SpeechPipeline::new(synthesizer, Box::new(output), SpeechSettings::from(&config.synthesis));
    let connector = Arc::new(WsConnector::new(config.orchestrator.ears_url.clone()));
    let mut orchestrator = Orchestrator::new(
        connector,
        generator,
        speech,
        RetryPolicy::from(&config.orchestrator),
    )
    .with_resume_ack_timeout(config.orchestrator.resume_ack_timeout);

    if let Some(dir) = &config.orchestrator.knowledge_dir {
        let retriever = KeywordRetriever::load(dir).context("loading knowledge base")?;
        tracing::info!("Knowledge base: {} snippets from {}", retriever.len(), dir.display());
        orchestrator = orchestrator.with_retriever(Arc::new(retriever), config.orchestrator.rag_top_k);
    }

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Ctrl-C received");
        }
        signal.cancel();
    });

    orchestrator.run(shutdown).await?;
    tracing::info!("Orchestrator stopped");
    Ok(())
}
