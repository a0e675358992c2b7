use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use shared::protocol::{ChannelFrame, EventName, InboundEvent, OutboundEvent};
use tokio::{
    sync::{mpsc, Mutex},
    task::JoinHandle,
};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};
use url::Url;

use crate::{ChannelError, HandlerRegistry, LiveChannel, Subscription};

/// Derives the live-channel endpoint from the HTTP server URL:
/// `http` becomes `ws`, `https` becomes `wss`, and `/ws` is appended.
pub fn channel_url_from_server_url(server_url: &str) -> Result<String> {
    let mut url =
        Url::parse(server_url).with_context(|| format!("invalid server_url: {server_url}"))?;
    let scheme = match url.scheme() {
        "https" | "wss" => "wss",
        "http" | "ws" => "ws",
        _ => return Err(anyhow!("server_url must start with http:// or https://")),
    };
    url.set_scheme(scheme)
        .map_err(|()| anyhow!("cannot rewrite scheme of {server_url}"))?;
    let path = format!("{}/ws", url.path().trim_end_matches('/'));
    url.set_path(&path);
    Ok(url.to_string())
}

/// JSON-framed live channel over a WebSocket.
pub struct WebSocketChannel {
    url: String,
    registry: Arc<HandlerRegistry>,
    connected: Arc<AtomicBool>,
    writer: Mutex<Option<mpsc::UnboundedSender<Message>>>,
    io_task: Mutex<Option<JoinHandle<()>>>,
}

impl WebSocketChannel {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            registry: HandlerRegistry::new(),
            connected: Arc::new(AtomicBool::new(false)),
            writer: Mutex::new(None),
            io_task: Mutex::new(None),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn active_handlers(&self) -> usize {
        self.registry.active_handlers()
    }
}

#[async_trait]
impl LiveChannel for WebSocketChannel {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn connect(&self) -> Result<()> {
        let mut io_task = self.io_task.lock().await;
        if self.is_connected() {
            return Ok(());
        }

        let (ws_stream, _) =
            connect_async(self.url.as_str())
                .await
                .map_err(|err| ChannelError::Connect {
                    url: self.url.clone(),
                    reason: err.to_string(),
                })?;
        let (mut ws_writer, mut ws_reader) = ws_stream.split();
        let (tx, mut rx) = mpsc::unbounded_channel::<Message>();

        let registry = Arc::clone(&self.registry);
        let connected = Arc::clone(&self.connected);
        let task = tokio::spawn(async move {
            let reason = loop {
                tokio::select! {
                    outbound = rx.recv() => match outbound {
                        Some(frame) => {
                            if let Err(err) = ws_writer.send(frame).await {
                                break Some(err.to_string());
                            }
                        }
                        None => {
                            let _ = ws_writer.close().await;
                            break None;
                        }
                    },
                    inbound = ws_reader.next() => match inbound {
                        Some(Ok(Message::Text(text))) => dispatch_text(&registry, &text),
                        Some(Ok(Message::Close(_))) | None => break None,
                        Some(Ok(_)) => {}
                        Some(Err(err)) => break Some(err.to_string()),
                    },
                }
            };
            connected.store(false, Ordering::SeqCst);
            warn!(reason = reason.as_deref().unwrap_or("closed"), "channel: connection lost");
            registry.dispatch(&InboundEvent::Disconnect { reason });
        });

        if let Some(previous) = io_task.replace(task) {
            previous.abort();
        }
        *self.writer.lock().await = Some(tx);
        self.connected.store(true, Ordering::SeqCst);
        info!(url = %self.url, "channel: connected");
        self.registry.dispatch(&InboundEvent::Connect);
        Ok(())
    }

    async fn emit(&self, event: OutboundEvent) -> Result<()> {
        let name = event.name().as_str();
        let frame = event
            .into_frame()
            .map_err(|source| ChannelError::Encode {
                event: name,
                source,
            })?;
        let text = serde_json::to_string(&frame)?;

        let writer = self.writer.lock().await;
        let writer = writer
            .as_ref()
            .filter(|_| self.is_connected())
            .ok_or(ChannelError::NotConnected)?;
        writer
            .send(Message::Text(text))
            .map_err(|_| ChannelError::WriterClosed)?;
        debug!(event = name, "channel: emitted");
        Ok(())
    }

    fn subscribe(&self, events: &[EventName]) -> Subscription {
        self.registry.register(events)
    }
}

impl Drop for WebSocketChannel {
    fn drop(&mut self) {
        if let Some(task) = self.io_task.get_mut().take() {
            task.abort();
        }
    }
}

fn dispatch_text(registry: &HandlerRegistry, text: &str) {
    let frame = match serde_json::from_str::<ChannelFrame>(text) {
        Ok(frame) => frame,
        Err(err) => {
            warn!("channel: invalid frame: {err}");
            return;
        }
    };
    match InboundEvent::from_frame(frame) {
        Ok(event) => {
            let delivered = registry.dispatch(&event);
            debug!(event = event.name().as_str(), delivered, "channel: inbound event");
        }
        Err(err) => warn!("channel: dropped inbound frame: {err}"),
    }
}

#[cfg(test)]
#[path = "tests/websocket_tests.rs"]
mod tests;
