use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, warn};

use crate::error::{PipelineError, PipelineResult};
use crate::kernel::protocol::ControlCommand;

/// Orchestrator's end of the control/transcript channel.
#[async_trait]
pub trait ControlLink: Send {
    async fn send(&mut self, command: ControlCommand) -> PipelineResult<()>;

    /// Next text line from the leg; `None` once the channel is closed.
    async fn recv(&mut self) -> Option<PipelineResult<String>>;

    async fn close(&mut self);
}

/// Opens a fresh [`ControlLink`] per connection attempt.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self) -> PipelineResult<Box<dyn ControlLink>>;
}

#[derive(Debug, Clone)]
pub struct WsConnector {
    url: String,
}

impl WsConnector {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self) -> PipelineResult<Box<dyn ControlLink>> {
        let (ws, _) = connect_async(self.url.as_str())
            .await
            .map_err(|e| PipelineError::Connectivity(format!("connect {}: {}", self.url, e)))?;
        Ok(Box::new(WsControlLink { ws }))
    }
}

pub struct WsControlLink {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl ControlLink for WsControlLink {
    async fn send(&mut self, command: ControlCommand) -> PipelineResult<()> {
        self.ws
            .send(Message::Text(command.as_str().into()))
            .await
            .map_err(|e| PipelineError::Connectivity(format!("send {}: {}", command, e)))
    }

    async fn recv(&mut self) -> Option<PipelineResult<String>> {
        loop {
            match self.ws.next().await? {
                Ok(Message::Text(text)) => return Some(Ok(text.as_str().to_string())),
                Ok(Message::Binary(data)) => {
                    warn!("[Ears] Ignoring {} byte binary frame", data.len());
                }
                Ok(Message::Close(frame)) => {
                    debug!("[Ears] Close frame: {:?}", frame);
                    return None;
                }
                Ok(_) => {}
                Err(e) => return Some(Err(PipelineError::Connectivity(e.to_string()))),
            }
        }
    }

    async fn close(&mut self) {
        if let Err(e) = self.ws.close(None).await {
            debug!("[Ears] Close: {}", e);
        }
    }
}
