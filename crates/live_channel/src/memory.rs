//! In-process channel. Records what was emitted and lets the caller inject
//! server events, which makes it the transport of choice for tests and demos.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex, PoisonError,
};

use async_trait::async_trait;
use shared::protocol::{EventName, InboundEvent, OutboundEvent};

use crate::{ChannelError, HandlerRegistry, LiveChannel, Subscription};

pub struct MemoryChannel {
    registry: Arc<HandlerRegistry>,
    connected: AtomicBool,
    refuse_connect: AtomicBool,
    acknowledge_joins: bool,
    emitted: Mutex<Vec<OutboundEvent>>,
}

impl Default for MemoryChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryChannel {
    pub fn new() -> Self {
        Self {
            registry: HandlerRegistry::new(),
            connected: AtomicBool::new(false),
            refuse_connect: AtomicBool::new(false),
            acknowledge_joins: false,
            emitted: Mutex::new(Vec::new()),
        }
    }

    /// Answers every `join_room` with a `joined` event, like the session server.
    pub fn acknowledging_joins(mut self) -> Self {
        self.acknowledge_joins = true;
        self
    }

    pub fn already_connected(self) -> Self {
        self.connected.store(true, Ordering::SeqCst);
        self
    }

    pub fn refuse_connections(&self, refuse: bool) {
        self.refuse_connect.store(refuse, Ordering::SeqCst);
    }

    /// Pushes a server event to the registered handlers.
    pub fn deliver(&self, event: InboundEvent) -> usize {
        self.registry.dispatch(&event)
    }

    pub fn drop_connection(&self, reason: impl Into<String>) {
        self.connected.store(false, Ordering::SeqCst);
        self.registry.dispatch(&InboundEvent::Disconnect {
            reason: Some(reason.into()),
        });
    }

    pub fn emitted(&self) -> Vec<OutboundEvent> {
        self.emitted
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn active_handlers(&self) -> usize {
        self.registry.active_handlers()
    }
}

#[async_trait]
impl LiveChannel for MemoryChannel {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn connect(&self) -> anyhow::Result<()> {
        if self.refuse_connect.load(Ordering::SeqCst) {
            return Err(ChannelError::Connect {
                url: "memory://".to_string(),
                reason: "connection refused".to_string(),
            }
            .into());
        }
        self.connected.store(true, Ordering::SeqCst);
        self.registry.dispatch(&InboundEvent::Connect);
        Ok(())
    }

    async fn emit(&self, event: OutboundEvent) -> anyhow::Result<()> {
        if !self.is_connected() {
            return Err(ChannelError::NotConnected.into());
        }
        let is_join = matches!(event, OutboundEvent::JoinRoom(_));
        self.emitted
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
        if is_join && self.acknowledge_joins {
            self.registry.dispatch(&InboundEvent::Joined);
        }
        Ok(())
    }

    fn subscribe(&self, events: &[EventName]) -> Subscription {
        self.registry.register(events)
    }
}
