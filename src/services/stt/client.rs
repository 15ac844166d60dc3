use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use crate::audio::wav::encode_wav;
use crate::error::{PipelineError, PipelineResult};
use crate::kernel::audio::segment::Utterance;

/// Speech-to-text collaborator. `Ok(None)` means nothing was recognized.
#[async_trait]
pub trait Recognizer: Send + Sync {
    async fn transcribe(&self, utterance: &Utterance, language: &str) -> PipelineResult<Option<String>>;
}

#[derive(Deserialize)]
struct TranscriptionResponse {
    #[serde(default)]
    text: Option<String>,
}

/// Posts each utterance as a 16-bit mono WAV body.
#[derive(Clone)]
pub struct HttpRecognizer {
    client: Client,
    url: String,
}

impl HttpRecognizer {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client: Client::builder().timeout(timeout).build().unwrap_or_default(),
            url: url.into(),
        }
    }
}

#[async_trait]
impl Recognizer for HttpRecognizer {
    async fn transcribe(&self, utterance: &Utterance, language: &str) -> PipelineResult<Option<String>> {
        let body = encode_wav(&utterance.samples, utterance.sample_rate)?;
        debug!("STT request: utterance {} ({} bytes)", utterance.id, body.len());

        let response = self
            .client
            .post(&self.url)
            .query(&[("language", language)])
            .header(reqwest::header::CONTENT_TYPE, "audio/wav")
            .body(body)
            .send()
            .await
            .map_err(|e| PipelineError::Recognition(e.to_string()))?;

        if !response.status().is_success() {
            return Err(PipelineError::Recognition(format!("STT server error: {}", response.status())));
        }

        let parsed: TranscriptionResponse = response
            .json()
            .await
            .map_err(|e| PipelineError::Recognition(format!("bad STT reply: {}", e)))?;
        Ok(parsed.text)
    }
}
