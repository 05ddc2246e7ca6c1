//! Signaling push channel — WebSocket client with automatic reconnection.
//!
//! Connects to the Huddle push gateway and feeds every delivered frame into
//! the reconciler. The channel carries call signaling only; it never touches
//! call state itself.

use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use futures::{SinkExt, StreamExt};
use tokio::time;
use tokio_tungstenite::{connect_async, tungstenite::Message};

use super::reconciler::Reconciler;

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// Application-level heartbeat interval.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Reason the inner connection loop exited.
enum DisconnectReason {
    /// Clean shutdown (Ctrl+C). Do not reconnect.
    Shutdown,
    /// Error or server-initiated close. Should reconnect.
    Error(anyhow::Error),
}

pub struct SignalingSocket {
    stream: WsStream,
}

impl SignalingSocket {
    /// Connect to the push gateway. Auth is carried as a query parameter on
    /// the WebSocket URL.
    pub async fn connect(gateway_url: &str, access_token: &str) -> Result<Self> {
        let sep = if gateway_url.contains('?') { '&' } else { '?' };
        let ws_url = format!("{}{}access_token={}", gateway_url, sep, access_token);
        let ws_url = ws_url
            .replace("https://", "wss://")
            .replace("http://", "ws://");

        tracing::info!("Connecting signaling WebSocket to {}", gateway_url);

        let (stream, response) = connect_async(&ws_url)
            .await
            .context("WebSocket connection failed")?;

        tracing::info!("Signaling WebSocket connected (status={})", response.status());

        Ok(Self { stream })
    }

    pub async fn send_text(&mut self, msg: &str) -> Result<()> {
        tracing::debug!("WS send: {}", msg);
        self.stream
            .send(Message::Text(msg.to_string()))
            .await
            .context("Failed to send WebSocket message")
    }

    /// Receive the next text frame, transparently answering pings.
    pub async fn recv_frame(&mut self) -> Result<Option<String>> {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => {
                    tracing::debug!("WS recv: {}", text);
                    return Ok(Some(text));
                }
                Some(Ok(Message::Ping(data))) => {
                    self.stream
                        .send(Message::Pong(data))
                        .await
                        .context("Failed to send pong")?;
                }
                Some(Ok(Message::Close(frame))) => {
                    tracing::info!("WebSocket closed: {:?}", frame);
                    return Ok(None);
                }
                Some(Ok(other)) => {
                    tracing::debug!("WS frame (ignored): {:?}", other);
                }
                Some(Err(e)) => {
                    return Err(e).context("WebSocket receive error");
                }
                None => {
                    return Ok(None);
                }
            }
        }
    }
}

/// Run the signaling connection with automatic reconnection.
///
/// On transient errors or server-initiated disconnects, reconnects with
/// exponential backoff (1s, 2s, 4s, ... capped at 64s). Backoff resets once
/// a connection has been stable for 60s. On clean shutdown (Ctrl+C), exits
/// immediately.
pub async fn connect_and_run(
    gateway_url: &str,
    access_token: &str,
    mut reconciler: Reconciler,
) -> Result<()> {
    let mut backoff = 1u64;

    loop {
        match run_session(gateway_url, access_token, &mut reconciler).await {
            Ok(DisconnectReason::Shutdown) => {
                return Ok(());
            }
            Ok(DisconnectReason::Error(e)) => {
                // Connection was stable, reset backoff before reconnecting.
                backoff = 1;
                tracing::warn!(
                    "Signaling disconnected after stable session: {:#}. Reconnecting in 1s...",
                    e,
                );

                tokio::select! {
                    _ = time::sleep(Duration::from_secs(1)) => {}
                    _ = tokio::signal::ctrl_c() => {
                        return Ok(());
                    }
                }
            }
            Err(e) => {
                tracing::warn!(
                    "Signaling disconnected: {:#}. Reconnecting in {}s...",
                    e,
                    backoff
                );

                tokio::select! {
                    _ = time::sleep(Duration::from_secs(backoff)) => {}
                    _ = tokio::signal::ctrl_c() => {
                        return Ok(());
                    }
                }

                backoff = (backoff * 2).min(64);
            }
        }
    }
}

/// One full gateway session: connect, heartbeat, frame loop.
///
/// Returns `DisconnectReason::Shutdown` on clean Ctrl+C, or
/// `DisconnectReason::Error` when the connection should be retried.
async fn run_session(
    gateway_url: &str,
    access_token: &str,
    reconciler: &mut Reconciler,
) -> Result<DisconnectReason> {
    let mut ws = SignalingSocket::connect(gateway_url, access_token).await?;

    let connected_at = Instant::now();
    let mut heartbeat = time::interval(HEARTBEAT_INTERVAL);
    heartbeat.tick().await; // skip first immediate tick

    // Stability threshold: reset backoff after 60s of successful connection.
    let stability_threshold = Duration::from_secs(60);

    tracing::info!("Signaling channel connected, listening for call events");

    let disconnect_reason = loop {
        tokio::select! {
            frame = ws.recv_frame() => {
                match frame {
                    Ok(Some(text)) => {
                        if text == "pong" {
                            tracing::debug!("Heartbeat pong from gateway");
                            continue;
                        }
                        reconciler.ingest_raw(&text);
                    }
                    Ok(None) => {
                        break DisconnectReason::Error(anyhow::anyhow!("WebSocket closed by server"));
                    }
                    Err(e) => {
                        break DisconnectReason::Error(e.context("WebSocket recv error"));
                    }
                }
            }
            _ = heartbeat.tick() => {
                if let Err(e) = ws.send_text("ping").await {
                    break DisconnectReason::Error(e.context("Heartbeat send failed"));
                }
            }
            _ = tokio::signal::ctrl_c() => {
                break DisconnectReason::Shutdown;
            }
        }
    };

    // If we were connected long enough, signal stability so the caller
    // resets its backoff.
    if connected_at.elapsed() >= stability_threshold {
        return Ok(disconnect_reason);
    }

    match disconnect_reason {
        DisconnectReason::Shutdown => Ok(DisconnectReason::Shutdown),
        DisconnectReason::Error(e) => Err(e),
    }
}
