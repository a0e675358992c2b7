use std::sync::Arc;

use live_channel::{LiveChannel, Subscription};
use shared::{
    domain::SessionId,
    protocol::{EventName, InboundEvent},
};
use tracing::{debug, info};

/// Inbound events a session view listens to.
pub const SESSION_EVENTS: [EventName; 6] = [
    EventName::Connect,
    EventName::Disconnect,
    EventName::Joined,
    EventName::Message,
    EventName::Status,
    EventName::Terminate,
];

/// What the runtime must do after handlers are in place.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinStep {
    /// Transport is down; connect and wait for the `connect` event.
    Connect,
    /// Transport is already up; `join_room` can go out right away.
    Join,
}

/// Owns the one handler set a session view may hold on the shared channel.
pub struct ChannelLifecycle {
    channel: Arc<dyn LiveChannel>,
    subscription: Option<Subscription>,
    session_id: Option<SessionId>,
}

impl ChannelLifecycle {
    pub fn new(channel: Arc<dyn LiveChannel>) -> Self {
        Self {
            channel,
            subscription: None,
            session_id: None,
        }
    }

    pub fn channel(&self) -> &Arc<dyn LiveChannel> {
        &self.channel
    }

    pub fn is_open(&self) -> bool {
        self.subscription.is_some()
    }

    pub fn session_id(&self) -> Option<&SessionId> {
        self.session_id.as_ref()
    }

    /// Releases any previous handlers before registering new ones, so at most
    /// one set is ever live no matter how often this is called.
    pub fn open(&mut self, session_id: SessionId) -> JoinStep {
        self.close();
        let subscription = self.channel.subscribe(&SESSION_EVENTS);
        info!(
            session_id = %session_id,
            subscription_id = subscription.id(),
            "channel: handlers bound"
        );
        self.subscription = Some(subscription);
        self.session_id = Some(session_id);
        if self.channel.is_connected() {
            JoinStep::Join
        } else {
            JoinStep::Connect
        }
    }

    pub fn close(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            debug!(
                session_id = ?self.session_id.as_ref().map(SessionId::as_str),
                subscription_id = subscription.id(),
                "channel: handlers released"
            );
        }
        self.session_id = None;
    }

    /// Waits for the next event on the current handler set. Never resolves
    /// while closed, which lets it sit in a `select!` unconditionally.
    pub async fn next_event(&mut self) -> InboundEvent {
        let Some(subscription) = self.subscription.as_mut() else {
            return std::future::pending().await;
        };
        match subscription.recv().await {
            Some(event) => event,
            None => {
                debug!("channel: transport dropped the subscription");
                self.subscription = None;
                std::future::pending().await
            }
        }
    }
}
