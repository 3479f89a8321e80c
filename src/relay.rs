//
// Copyright 2026 Signal Messenger, LLC
// SPDX-License-Identifier: AGPL-3.0-only
//

//! Websocket client for the signaling relay.
//!
//! The client owns one background task that dials the relay, registers the
//! local `(user, conversation)` pair, and pumps envelopes in both
//! directions. When the connection drops, it reconnects with capped
//! exponential backoff and re-registers. Delivery is best effort: envelopes
//! submitted while disconnected are dropped, and the call core is built to
//! tolerate that.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use url::Url;

use crate::common::{ConversationId, Result, UserId};
use crate::config::CallConfig;
use crate::core::signaling::Envelope;
use crate::error::CallError;

const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(30);

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub struct SignalingClient {
    outbound_tx: mpsc::UnboundedSender<Envelope>,
    shutdown_tx: watch::Sender<bool>,
}

impl SignalingClient {
    /// Validates the configured endpoint and spawns the connection task.
    /// Inbound envelopes are delivered on `inbound`; feed that receiver to
    /// [`CallManager::attach_signaling`].
    ///
    /// [`CallManager::attach_signaling`]: crate::core::call_manager::CallManager::attach_signaling
    pub fn connect(
        config: &CallConfig,
        user_id: impl Into<UserId>,
        conversation_id: impl Into<ConversationId>,
        inbound: mpsc::UnboundedSender<Envelope>,
    ) -> Result<Self> {
        let endpoint = config.relay_endpoint();
        let parsed = Url::parse(&endpoint)
            .map_err(|e| CallError::InvalidRelayEndpoint(format!("{}: {}", endpoint, e)))?;
        match parsed.scheme() {
            "ws" | "wss" => {}
            other => {
                return Err(CallError::InvalidRelayEndpoint(format!(
                    "unsupported scheme: {}",
                    other
                ))
                .into())
            }
        }

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let task = ConnectionTask {
            endpoint,
            register: Envelope::Register {
                user_id: user_id.into(),
                conversation_id: conversation_id.into(),
            },
            inbound,
            outbound: outbound_rx,
            shutdown: shutdown_rx,
        };
        tokio::spawn(task.run());

        Ok(Self {
            outbound_tx,
            shutdown_tx,
        })
    }

    /// A handle suitable for [`CallManager::new`]'s outbound channel.
    ///
    /// [`CallManager::new`]: crate::core::call_manager::CallManager::new
    pub fn sender(&self) -> mpsc::UnboundedSender<Envelope> {
        self.outbound_tx.clone()
    }

    /// Submits one envelope for delivery, best effort.
    pub fn send(&self, envelope: Envelope) {
        if self.outbound_tx.send(envelope).is_err() {
            debug!("relay: connection task gone, envelope dropped");
        }
    }

    /// Stops the connection task after closing the websocket. Idempotent.
    pub fn disconnect(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}

impl Drop for SignalingClient {
    fn drop(&mut self) {
        self.disconnect();
    }
}

struct ConnectionTask {
    endpoint: String,
    register: Envelope,
    inbound: mpsc::UnboundedSender<Envelope>,
    outbound: mpsc::UnboundedReceiver<Envelope>,
    shutdown: watch::Receiver<bool>,
}

impl ConnectionTask {
    async fn run(mut self) {
        let mut backoff = INITIAL_BACKOFF;
        loop {
            if *self.shutdown.borrow() {
                break;
            }
            match connect_async(self.endpoint.as_str()).await {
                Ok((mut ws, _)) => {
                    info!("relay: connected to {}", self.endpoint);
                    backoff = INITIAL_BACKOFF;
                    match self.pump(&mut ws).await {
                        Ok(()) => break,
                        Err(e) => warn!("relay: connection lost: {}", e),
                    }
                }
                Err(e) => {
                    warn!("relay: connect to {} failed: {}", self.endpoint, e);
                }
            }
            if !self.backoff_sleep(backoff).await {
                break;
            }
            backoff = (backoff * 2).min(MAX_BACKOFF);
        }
        debug!("relay: connection task ended");
    }

    /// Pumps one live connection. `Ok(())` means shut down for good;
    /// `Err` means reconnect.
    async fn pump(&mut self, ws: &mut WsStream) -> Result<()> {
        let register = serde_json::to_string(&self.register)?;
        ws.send(Message::Text(register.into())).await?;

        loop {
            tokio::select! {
                _ = self.shutdown.changed() => {
                    if *self.shutdown.borrow() {
                        let _ = ws.close(None).await;
                        return Ok(());
                    }
                }
                maybe = self.outbound.recv() => {
                    match maybe {
                        Some(envelope) => {
                            debug!("relay: tx {}", envelope);
                            let json = serde_json::to_string(&envelope)?;
                            ws.send(Message::Text(json.into())).await?;
                        }
                        None => {
                            // Every manager handle is gone; nothing left to do.
                            let _ = ws.close(None).await;
                            return Ok(());
                        }
                    }
                }
                incoming = ws.next() => {
                    match incoming {
                        Some(Ok(Message::Text(text))) => {
                            match serde_json::from_str::<Envelope>(text.as_str()) {
                                Ok(envelope) => {
                                    debug!("relay: rx {}", envelope);
                                    if self.inbound.send(envelope).is_err() {
                                        let _ = ws.close(None).await;
                                        return Ok(());
                                    }
                                }
                                Err(e) => warn!("relay: undecodable envelope, dropping: {}", e),
                            }
                        }
                        Some(Ok(Message::Close(_))) => {
                            anyhow::bail!("relay closed the connection");
                        }
                        // Pings and pongs are handled inside tungstenite.
                        Some(Ok(_)) => {}
                        Some(Err(e)) => return Err(e.into()),
                        None => anyhow::bail!("relay stream ended"),
                    }
                }
            }
        }
    }

    /// Sleeps out one backoff period, draining (and dropping) outbound
    /// envelopes submitted meanwhile. Returns false when shut down.
    async fn backoff_sleep(&mut self, delay: Duration) -> bool {
        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);
        loop {
            tokio::select! {
                _ = &mut sleep => return true,
                _ = self.shutdown.changed() => {
                    if *self.shutdown.borrow() {
                        return false;
                    }
                }
                maybe = self.outbound.recv() => {
                    match maybe {
                        Some(envelope) => debug!("relay: disconnected, dropping {}", envelope),
                        None => return false,
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn rejects_non_websocket_scheme() {
        let config = CallConfig {
            relay_url: "https://relay.example.org".to_string(),
            ..CallConfig::default()
        };
        let (inbound_tx, _inbound_rx) = mpsc::unbounded_channel();
        let result = SignalingClient::connect(&config, "u", "c", inbound_tx);
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn rejects_unparsable_endpoint() {
        let config = CallConfig {
            relay_url: "not a url".to_string(),
            relay_path: "".to_string(),
            ..CallConfig::default()
        };
        let (inbound_tx, _inbound_rx) = mpsc::unbounded_channel();
        assert!(SignalingClient::connect(&config, "u", "c", inbound_tx).is_err());
    }
}
