use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::hub::ControlPlane;
use crate::error::{PipelineError, PipelineResult};
use crate::kernel::protocol::LegMessage;

pub const LISTEN_PATH: &str = "/listen";

/// WebSocket front of the recognition leg: one control/transcript channel
/// per connected client.
pub struct ListenServer {
    listener: TcpListener,
    control: Arc<ControlPlane>,
}

impl ListenServer {
    pub async fn bind(addr: &str, control: Arc<ControlPlane>) -> PipelineResult<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| PipelineError::Connectivity(format!("Failed to bind to {}: {}", addr, e)))?;
        Ok(Self { listener, control })
    }

    pub fn local_addr(&self) -> PipelineResult<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept until `shutdown` fires; open connections are closed with it.
    pub async fn run(self, shutdown: CancellationToken) -> PipelineResult<()> {
        let addr = self.local_addr()?;
        info!("[Ears] Listening on ws://{}{}", addr, LISTEN_PATH);

        loop {
            tokio::select! {
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        debug!("[Ears] TCP connection from {}", peer);
                        let control = self.control.clone();
                        let token = shutdown.child_token();
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(stream, control, token).await {
                                warn!("[Ears] Connection from {} ended: {}", peer, e);
                            }
                        });
                    }
                    Err(e) => error!("[Ears] Failed to accept connection: {}", e),
                },
                _ = shutdown.cancelled() => {
                    info!("[Ears] Server shutting down");
                    break;
                }
            }
        }
        Ok(())
    }
}

fn check_path(request: &Request, response: Response) -> Result<Response, ErrorResponse> {
    let path = request.uri().path();
    if path == LISTEN_PATH || path == "/" {
        return Ok(response);
    }
    warn!("[Ears] Rejecting connection to unknown path {}", path);
    let mut rejection = ErrorResponse::new(Some(format!("Invalid path: {}", path)));
    *rejection.status_mut() = StatusCode::NOT_FOUND;
    Err(rejection)
}

async fn handle_connection(
    stream: TcpStream,
    control: Arc<ControlPlane>,
    shutdown: CancellationToken,
) -> PipelineResult<()> {
    let ws = accept_hdr_async(stream, check_path)
        .await
        .map_err(|e| PipelineError::Connectivity(format!("WebSocket handshake failed: {}", e)))?;
    let (mut sink, mut source) = ws.split();

    let (id, mut outbound) = control.connect();

    // Sole writer for this socket; ends when the listener is deregistered.
    let writer = tokio::spawn(async move {
        while let Some(line) = outbound.recv().await {
            if let Err(e) = sink.send(Message::Text(line.into())).await {
                debug!("[Ears] Send failed: {}", e);
                break;
            }
        }
        let _ = sink.close().await;
    });

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            incoming = source.next() => match incoming {
                Some(Ok(Message::Text(text))) => control.handle_line(id, text.as_str()),
                Some(Ok(Message::Binary(data))) => {
                    warn!("[Ears] Listener {} sent {} binary bytes", id, data.len());
                    let reply = LegMessage::Error("binary frames are not supported".into());
                    control.registry().send_to(id, &reply.to_line());
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!("[Ears] Listener {} read error: {}", id, e);
                    break;
                }
            },
        }
    }

    control.disconnect(id);
    let _ = writer.await;
    Ok(())
}
