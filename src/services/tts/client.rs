use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use crate::audio::playback::AudioChunk;
use crate::audio::wav::decode_pcm;
use crate::error::{PipelineError, PipelineResult};

/// One unit of text to speak. Stateless.
#[derive(Debug, Clone, PartialEq)]
pub struct SynthesisRequest {
    pub text: String,
    pub voice: String,
    pub speed: f32,
    pub stream: bool,
}

/// Text-to-speech collaborator. Chunks are sent in playback order; the call
/// returns once the unit is fully synthesized.
#[async_trait]
pub trait Synthesizer: Send + Sync {
    async fn synthesize(
        &self,
        request: &SynthesisRequest,
        chunks: mpsc::UnboundedSender<AudioChunk>,
    ) -> PipelineResult<()>;
}

#[derive(Serialize)]
struct TtsRequest<'a> {
    text: &'a str,
    mode: &'static str,
    speaker: &'a str,
    stream: bool,
    speed: f32,
}

/// Status frames of the synthesis socket.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum TtsStatus {
    Connected {
        #[serde(default)]
        message: Option<String>,
    },
    Start {
        #[serde(default)]
        sample_rate: Option<u32>,
    },
    Complete {
        #[serde(default)]
        sample_rate: Option<u32>,
        #[serde(default)]
        size: Option<usize>,
    },
    Done,
    Error {
        #[serde(default)]
        message: Option<String>,
    },
}

impl TtsStatus {
    pub fn parse(text: &str) -> PipelineResult<Self> {
        serde_json::from_str(text)
            .map_err(|e| PipelineError::Protocol(format!("unexpected TTS frame '{}': {}", text, e)))
    }
}

type TtsSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// One WebSocket connection per request; the socket is closed on every path.
#[derive(Debug, Clone)]
pub struct WsSynthesizer {
    url: String,
    default_rate: u32,
}

impl WsSynthesizer {
    pub fn new(url: impl Into<String>, default_rate: u32) -> Self {
        Self {
            url: url.into(),
            default_rate,
        }
    }

    async fn exchange(
        &self,
        ws: &mut TtsSocket,
        request: &SynthesisRequest,
        chunks: &mpsc::UnboundedSender<AudioChunk>,
    ) -> PipelineResult<()> {
        match TtsStatus::parse(&next_text(ws).await?)? {
            TtsStatus::Connected { message } => {
                debug!("[Mouth] TTS ready: {}", message.unwrap_or_default());
            }
            TtsStatus::Error { message } => return Err(tts_error(message)),
            other => warn!("[Mouth] Expected greeting, got {:?}", other),
        }

        let body = TtsRequest {
            text: &request.text,
            mode: "sft",
            speaker: &request.voice,
            stream: request.stream,
            speed: request.speed,
        };
        let payload = serde_json::to_string(&body)
            .map_err(|e| PipelineError::Synthesis(format!("encode request: {}", e)))?;
        ws.send(Message::Text(payload.into()))
            .await
            .map_err(|e| PipelineError::Synthesis(format!("send request: {}", e)))?;

        match TtsStatus::parse(&next_text(ws).await?)? {
            TtsStatus::Start { sample_rate } => {
                let rate = sample_rate.unwrap_or(self.default_rate);
                let mut received = 0usize;
                loop {
                    match next_message(ws).await? {
                        Message::Binary(bytes) => {
                            received += 1;
                            if chunks.send(decode_pcm(&bytes, rate)?).is_err() {
                                debug!("[Mouth] Chunk receiver dropped; abandoning unit");
                                return Ok(());
                            }
                        }
                        Message::Text(text) => match TtsStatus::parse(&text)? {
                            TtsStatus::Done => break,
                            TtsStatus::Error { message } => return Err(tts_error(message)),
                            other => warn!("[Mouth] Ignoring {:?} mid-stream", other),
                        },
                        _ => {}
                    }
                }
                debug!("[Mouth] Streamed {} chunks", received);
                Ok(())
            }
            TtsStatus::Complete { sample_rate, size } => {
                let rate = sample_rate.unwrap_or(self.default_rate);
                let bytes = match next_message(ws).await? {
                    Message::Binary(bytes) => bytes,
                    Message::Text(text) => {
                        return match TtsStatus::parse(&text)? {
                            TtsStatus::Error { message } => Err(tts_error(message)),
                            other => Err(PipelineError::Protocol(format!(
                                "expected audio after complete, got {:?}",
                                other
                            ))),
                        }
                    }
                    other => {
                        return Err(PipelineError::Protocol(format!("expected audio, got {:?}", other)))
                    }
                };
                if let Some(size) = size {
                    if size != bytes.len() {
                        warn!("[Mouth] Announced {} bytes, received {}", size, bytes.len());
                    }
                }
                let _ = chunks.send(decode_pcm(&bytes, rate)?);

                match TtsStatus::parse(&next_text(ws).await?)? {
                    TtsStatus::Done => Ok(()),
                    TtsStatus::Error { message } => Err(tts_error(message)),
                    other => Err(PipelineError::Protocol(format!("expected done, got {:?}", other))),
                }
            }
            TtsStatus::Error { message } => Err(tts_error(message)),
            other => Err(PipelineError::Protocol(format!("unexpected TTS reply {:?}", other))),
        }
    }
}

#[async_trait]
impl Synthesizer for WsSynthesizer {
    async fn synthesize(
        &self,
        request: &SynthesisRequest,
        chunks: mpsc::UnboundedSender<AudioChunk>,
    ) -> PipelineResult<()> {
        info!("[Mouth] Synthesizing {} chars", request.text.chars().count());

        let (mut ws, _) = connect_async(self.url.as_str())
            .await
            .map_err(|e| PipelineError::Synthesis(format!("connect {}: {}", self.url, e)))?;

        let result = self.exchange(&mut ws, request, &chunks).await;
        if let Err(e) = ws.close(None).await {
            debug!("[Mouth] Close: {}", e);
        }
        result
    }
}

fn tts_error(message: Option<String>) -> PipelineError {
    PipelineError::Synthesis(message.unwrap_or_else(|| "unknown TTS error".into()))
}

/// Next data frame; control frames are skipped.
async fn next_message(ws: &mut TtsSocket) -> PipelineResult<Message> {
    loop {
        match ws.next().await {
            Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) | Some(Ok(Message::Frame(_))) => continue,
            Some(Ok(Message::Close(_))) | None => {
                return Err(PipelineError::Synthesis("TTS connection closed mid-request".into()))
            }
            Some(Ok(message)) => return Ok(message),
            Some(Err(e)) => return Err(PipelineError::Synthesis(e.to_string())),
        }
    }
}

async fn next_text(ws: &mut TtsSocket) -> PipelineResult<String> {
    match next_message(ws).await? {
        Message::Text(text) => Ok(text.as_str().to_string()),
        other => Err(PipelineError::Protocol(format!("expected a status frame, got {:?}", other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_status_frames() {
        assert_eq!(
            TtsStatus::parse(r#"{"status":"connected","message":"ready"}"#).unwrap(),
            TtsStatus::Connected { message: Some("ready".into()) }
        );
        assert_eq!(
            TtsStatus::parse(r#"{"status":"start","stream":true,"format":"pcm_s16le","sample_rate":24000}"#).unwrap(),
            TtsStatus::Start { sample_rate: Some(24000) }
        );
        assert_eq!(TtsStatus::parse(r#"{"status":"done"}"#).unwrap(), TtsStatus::Done);
        assert!(matches!(
            TtsStatus::parse(r#"{"status":"error","message":"Missing 'text'"}"#).unwrap(),
            TtsStatus::Error { .. }
        ));
        assert!(TtsStatus::parse(r#"{"status":"sleeping"}"#).is_err());
    }

    #[test]
    fn request_shape() {
        let body = TtsRequest { text: "hi", mode: "sft", speaker: "default", stream: false, speed: 1.0 };
        let json: serde_json::Value = serde_json::to_value(&body).unwrap();
        assert_eq!(json["mode"], "sft");
        assert_eq!(json["speaker"], "default");
        assert_eq!(json["stream"], false);
    }
}
