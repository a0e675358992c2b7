//! Live event channel seam: the transport trait, the scoped handler registry
//! every transport dispatches through, and the shipped transports.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex, MutexGuard, PoisonError, Weak,
    },
};

use async_trait::async_trait;
use shared::protocol::{EventName, InboundEvent, OutboundEvent};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::debug;

pub mod memory;
pub mod websocket;

pub use memory::MemoryChannel;
pub use websocket::{channel_url_from_server_url, WebSocketChannel};

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("live channel is not connected")]
    NotConnected,
    #[error("live channel is unavailable")]
    Unavailable,
    #[error("failed to connect live channel {url}: {reason}")]
    Connect { url: String, reason: String },
    #[error("failed to encode outbound `{event}` event: {source}")]
    Encode {
        event: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("live channel writer closed")]
    WriterClosed,
}

/// Persistent, at-least-once event transport shared by sequential session views.
#[async_trait]
pub trait LiveChannel: Send + Sync {
    fn is_connected(&self) -> bool;
    /// Opens the transport. Implementations dispatch [`InboundEvent::Connect`]
    /// to subscribers once the connection is up.
    async fn connect(&self) -> anyhow::Result<()>;
    async fn emit(&self, event: OutboundEvent) -> anyhow::Result<()>;
    /// Registers one handler set for `events`. Dropping the returned
    /// subscription unregisters it.
    fn subscribe(&self, events: &[EventName]) -> Subscription;
}

/// Stand-in used when no transport is configured; every operation fails.
#[derive(Default)]
pub struct MissingLiveChannel {
    registry: Arc<HandlerRegistry>,
}

#[async_trait]
impl LiveChannel for MissingLiveChannel {
    fn is_connected(&self) -> bool {
        false
    }

    async fn connect(&self) -> anyhow::Result<()> {
        Err(ChannelError::Unavailable.into())
    }

    async fn emit(&self, _event: OutboundEvent) -> anyhow::Result<()> {
        Err(ChannelError::Unavailable.into())
    }

    fn subscribe(&self, events: &[EventName]) -> Subscription {
        self.registry.register(events)
    }
}

struct Registration {
    events: Vec<EventName>,
    tx: mpsc::UnboundedSender<InboundEvent>,
}

/// Named-event handler table. Each registration is owned by a [`Subscription`].
#[derive(Default)]
pub struct HandlerRegistry {
    next_id: AtomicU64,
    handlers: Mutex<HashMap<u64, Registration>>,
}

impl HandlerRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn register(self: &Arc<Self>, events: &[EventName]) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        self.lock().insert(
            id,
            Registration {
                events: events.to_vec(),
                tx,
            },
        );
        debug!(subscription_id = id, "channel: handlers registered");
        Subscription {
            id,
            registry: Arc::downgrade(self),
            rx,
        }
    }

    /// Delivers `event` to every registration bound to its name and returns
    /// how many received it. Registrations whose receiver is gone are pruned.
    pub fn dispatch(&self, event: &InboundEvent) -> usize {
        let name = event.name();
        let mut delivered = 0;
        self.lock().retain(|_, registration| {
            if !registration.events.contains(&name) {
                return true;
            }
            if registration.tx.send(event.clone()).is_ok() {
                delivered += 1;
                true
            } else {
                false
            }
        });
        delivered
    }

    pub fn active_handlers(&self) -> usize {
        self.lock().len()
    }

    fn unregister(&self, id: u64) {
        if self.lock().remove(&id).is_some() {
            debug!(subscription_id = id, "channel: handlers unregistered");
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<u64, Registration>> {
        self.handlers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Scoped handler registration. Released on drop, on every exit path.
pub struct Subscription {
    id: u64,
    registry: Weak<HandlerRegistry>,
    rx: mpsc::UnboundedReceiver<InboundEvent>,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Next event for this handler set; `None` once the transport is gone.
    pub async fn recv(&mut self) -> Option<InboundEvent> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<InboundEvent> {
        self.rx.try_recv().ok()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.unregister(self.id);
        }
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
