use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::{PipelineError, PipelineResult};

/// User text plus optional retrieved context.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Prompt {
    pub text: String,
    pub context: Vec<String>,
}

impl Prompt {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            context: Vec::new(),
        }
    }

    pub fn with_context(mut self, context: Vec<String>) -> Self {
        self.context = context;
        self
    }
}

/// Response-generation collaborator.
#[async_trait]
pub trait Generator: Send + Sync {
    /// Whole response in one piece.
    async fn generate(&self, prompt: &Prompt) -> PipelineResult<String>;

    /// Response as ordered fragments. Returns when the response is complete.
    /// A dropped receiver ends generation early without error.
    async fn generate_stream(&self, prompt: &Prompt, fragments: mpsc::Sender<String>) -> PipelineResult<()>;
}

#[derive(Serialize)]
struct ThinkRequest<'a> {
    text: &'a str,
    #[serde(skip_serializing_if = "<[String]>::is_empty")]
    context: &'a [String],
    stream: bool,
}

#[derive(Deserialize)]
struct ThinkResponse {
    #[serde(default)]
    response: String,
}

#[derive(Clone)]
pub struct HttpGenerator {
    client: Client,
    url: String,
}

impl HttpGenerator {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client: Client::builder().timeout(timeout).build().unwrap_or_default(),
            url: url.into(),
        }
    }

    async fn post(&self, prompt: &Prompt, stream: bool) -> PipelineResult<reqwest::Response> {
        let request_body = ThinkRequest {
            text: &prompt.text,
            context: &prompt.context,
            stream,
        };

        let response = self
            .client
            .post(&self.url)
            .json(&request_body)
            .send()
            .await
            .map_err(|e| PipelineError::Generation(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let detail: String = body.chars().take(200).collect();
            return Err(PipelineError::Generation(format!("LLM Server Error: {} {}", status, detail)));
        }
        Ok(response)
    }
}

#[async_trait]
impl Generator for HttpGenerator {
    async fn generate(&self, prompt: &Prompt) -> PipelineResult<String> {
        let response = self.post(prompt, false).await?;
        let parsed: ThinkResponse = response
            .json()
            .await
            .map_err(|e| PipelineError::Generation(format!("bad LLM reply: {}", e)))?;
        Ok(parsed.response.trim().to_string())
    }

    async fn generate_stream(&self, prompt: &Prompt, fragments: mpsc::Sender<String>) -> PipelineResult<()> {
        let response = self.post(prompt, true).await?;

        // Servers without streaming answer with the batch JSON shape.
        let is_json = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.starts_with("application/json"))
            .unwrap_or(false);
        if is_json {
            let parsed: ThinkResponse = response
                .json()
                .await
                .map_err(|e| PipelineError::Generation(format!("bad LLM reply: {}", e)))?;
            if !parsed.response.is_empty() {
                let _ = fragments.send(parsed.response).await;
            }
            return Ok(());
        }

        let mut decoder = Utf8Carry::default();
        let mut stream = response.bytes_stream();
        while let Some(item) = stream.next().await {
            let bytes = item.map_err(|e| PipelineError::Generation(format!("stream interrupted: {}", e)))?;
            let text = decoder.push(&bytes);
            if text.is_empty() {
                continue;
            }
            if fragments.send(text).await.is_err() {
                debug!("Fragment receiver dropped; ending generation early");
                return Ok(());
            }
        }

        if decoder.has_pending() {
            warn!("LLM stream ended inside a multibyte character");
        }
        Ok(())
    }
}

/// Reassembles UTF-8 split across chunk boundaries.
#[derive(Debug, Default)]
pub struct Utf8Carry {
    pending: Vec<u8>,
}

impl Utf8Carry {
    /// Append bytes and return every complete character decoded so far.
    /// Invalid sequences are replaced, never carried.
    pub fn push(&mut self, bytes: &[u8]) -> String {
        self.pending.extend_from_slice(bytes);
        let mut out = String::new();
        loop {
            match std::str::from_utf8(&self.pending) {
                Ok(text) => {
                    out.push_str(text);
                    self.pending.clear();
                    return out;
                }
                Err(e) => {
                    let valid = e.valid_up_to();
                    out.push_str(&String::from_utf8_lossy(&self.pending[..valid]));
                    match e.error_len() {
                        Some(bad) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            self.pending.drain(..valid + bad);
                        }
                        None => {
                            // Incomplete tail; keep it for the next chunk.
                            self.pending.drain(..valid);
                            return out;
                        }
                    }
                }
            }
        }
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn carries_split_multibyte() {
        let text = "こんにちは";
        let bytes = text.as_bytes();
        let mut carry = Utf8Carry::default();
        let a = carry.push(&bytes[..4]);
        assert_eq!(a, "こ");
        assert!(carry.has_pending());
        let b = carry.push(&bytes[4..]);
        assert_eq!(format!("{}{}", a, b), text);
        assert!(!carry.has_pending());
    }

    #[test]
    fn replaces_invalid_bytes() {
        let mut carry = Utf8Carry::default();
        assert_eq!(carry.push(&[b'a', 0xff, b'b']), "a\u{fffd}b");
    }

    #[test]
    fn request_omits_empty_context() {
        let body = ThinkRequest { text: "hi", context: &[], stream: false };
        assert_eq!(serde_json::to_string(&body).unwrap(), r#"{"text":"hi","stream":false}"#);
    }
}
