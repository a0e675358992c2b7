//! Single owner of a session view's state.
//!
//! Every input is an immutable [`ViewAction`]. [`SessionViewState::reduce`]
//! applies it and returns the [`Effect`]s the runtime must carry out; the
//! reducer itself never touches the network, the channel, or a timer.

use std::time::Duration;

use shared::{
    domain::{Session, SessionId},
    protocol::{InboundEvent, Message, OutboundEvent, StoredMessage},
};
use tracing::{debug, info, warn};

use crate::{
    bootstrap::BootstrapController,
    error::{FetchTarget, SyncError},
    transcript::TranscriptStore,
    view_state::{show_busy_indicator, ChatStatus, ScrollAnchor, ScrollRequest, Viewport},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChannelPhase {
    /// No session view is active.
    #[default]
    Idle,
    /// Waiting for both the session and its history.
    AwaitingPrerequisites,
    /// Handlers registered; connect or `join_room` in flight.
    Joining,
    Joined,
    TornDown,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewAction {
    Activate(SessionId),
    Deactivate,
    SessionLoaded {
        epoch: u64,
        session: Session,
    },
    HistoryLoaded {
        epoch: u64,
        history: Vec<StoredMessage>,
    },
    FetchFailed {
        epoch: u64,
        target: FetchTarget,
        message: String,
    },
    Channel {
        event: InboundEvent,
        received_at: i64,
    },
    ChannelFailed {
        epoch: u64,
        message: String,
    },
    Compose(String),
    Viewport(Viewport),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    FetchSession { epoch: u64, session_id: SessionId },
    FetchHistory { epoch: u64, session_id: SessionId },
    /// Tear down any previous handlers, subscribe, then connect or join.
    OpenChannel { epoch: u64, session_id: SessionId },
    CloseChannel,
    Emit(OutboundEvent),
    ScheduleScroll(ScrollRequest),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionViewState {
    epoch: u64,
    author_name: String,
    session_id: Option<SessionId>,
    session: Option<Session>,
    transcript: TranscriptStore,
    phase: ChannelPhase,
    terminated: bool,
    chat_status: Option<ChatStatus>,
    scroll: ScrollAnchor,
    error: Option<SyncError>,
    bootstrap: BootstrapController,
}

impl SessionViewState {
    pub fn new(author_name: impl Into<String>, scroll_delay: Duration) -> Self {
        Self {
            author_name: author_name.into(),
            scroll: ScrollAnchor::new(scroll_delay),
            ..Self::default()
        }
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn author_name(&self) -> &str {
        &self.author_name
    }

    pub fn session_id(&self) -> Option<&SessionId> {
        self.session_id.as_ref()
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn transcript(&self) -> &TranscriptStore {
        &self.transcript
    }

    pub fn messages(&self) -> Option<&[Message]> {
        self.transcript.messages()
    }

    pub fn phase(&self) -> ChannelPhase {
        self.phase
    }

    pub fn busy(&self) -> bool {
        self.transcript.busy()
    }

    pub fn show_busy_indicator(&self) -> bool {
        show_busy_indicator(self.busy(), self.terminated)
    }

    pub fn terminated(&self) -> bool {
        self.terminated
    }

    pub fn at_bottom(&self) -> bool {
        self.scroll.at_bottom()
    }

    pub fn chat_status(&self) -> Option<&ChatStatus> {
        self.chat_status.as_ref()
    }

    pub fn error(&self) -> Option<&SyncError> {
        self.error.as_ref()
    }

    pub fn bootstrap_sent(&self) -> bool {
        self.bootstrap.has_fired()
    }

    /// Session metadata or history still outstanding.
    pub fn is_loading(&self) -> bool {
        self.session_id.is_some() && (self.session.is_none() || !self.transcript.is_loaded())
    }

    pub fn reduce(&mut self, action: ViewAction) -> Vec<Effect> {
        match action {
            ViewAction::Activate(session_id) => self.activate(session_id),
            ViewAction::Deactivate => self.deactivate(),
            ViewAction::SessionLoaded { epoch, session } => {
                if !self.is_current(epoch, FetchTarget::Session) {
                    return Vec::new();
                }
                self.session_loaded(session)
            }
            ViewAction::HistoryLoaded { epoch, history } => {
                if !self.is_current(epoch, FetchTarget::History) {
                    return Vec::new();
                }
                self.history_loaded(history)
            }
            ViewAction::FetchFailed {
                epoch,
                target,
                message,
            } => {
                if self.is_current(epoch, target) {
                    warn!(epoch, %target, "history: fetch failed: {message}");
                    self.error = Some(SyncError::FetchFailure { target, message });
                }
                Vec::new()
            }
            ViewAction::Channel { event, received_at } => self.channel_event(event, received_at),
            ViewAction::ChannelFailed { epoch, message } => {
                if epoch == self.epoch && self.has_channel() {
                    warn!(epoch, "channel: {message}");
                    self.error = Some(SyncError::ChannelUnavailable(message));
                }
                Vec::new()
            }
            ViewAction::Compose(text) => self.compose(&text),
            ViewAction::Viewport(viewport) => {
                self.scroll.record(viewport);
                Vec::new()
            }
        }
    }

    fn activate(&mut self, session_id: SessionId) -> Vec<Effect> {
        let mut effects = Vec::new();
        if self.has_channel() {
            effects.push(Effect::CloseChannel);
        }

        let epoch = self.epoch + 1;
        let author_name = std::mem::take(&mut self.author_name);
        let scroll_delay = self.scroll.delay();
        info!(session_id = %session_id, epoch, "channel: activating session view");
        *self = Self {
            epoch,
            author_name,
            session_id: Some(session_id.clone()),
            phase: ChannelPhase::AwaitingPrerequisites,
            scroll: ScrollAnchor::new(scroll_delay),
            ..Self::default()
        };

        effects.push(Effect::FetchSession {
            epoch,
            session_id: session_id.clone(),
        });
        effects.push(Effect::FetchHistory { epoch, session_id });
        effects
    }

    fn deactivate(&mut self) -> Vec<Effect> {
        if matches!(self.phase, ChannelPhase::Idle | ChannelPhase::TornDown) {
            return Vec::new();
        }
        info!(
            session_id = ?self.session_id.as_ref().map(SessionId::as_str),
            epoch = self.epoch,
            "channel: tearing down session view"
        );
        self.epoch += 1;
        self.phase = ChannelPhase::TornDown;
        self.session_id = None;
        self.session = None;
        self.transcript.clear();
        self.chat_status = None;
        self.bootstrap = BootstrapController::new();
        vec![Effect::CloseChannel]
    }

    fn session_loaded(&mut self, session: Session) -> Vec<Effect> {
        if self.session_id.as_ref() != Some(&session.id) {
            warn!(
                requested = ?self.session_id.as_ref().map(SessionId::as_str),
                received = %session.id,
                "history: session fetch returned a different id"
            );
        }
        self.terminated |= session.is_terminated();
        self.chat_status = Some(ChatStatus {
            prompt: session.prompt.clone(),
            status: session.status,
        });
        self.session = Some(session);
        self.try_open_channel().into_iter().collect()
    }

    fn history_loaded(&mut self, history: Vec<StoredMessage>) -> Vec<Effect> {
        let count = self.transcript.load(history).len();
        debug!(epoch = self.epoch, count, "history: transcript loaded");
        let mut effects: Vec<Effect> = self.scroll_effect().into_iter().collect();
        effects.extend(self.try_open_channel());
        effects
    }

    /// Joining waits for both the session and a baseline transcript, so the
    /// bootstrap check never runs against a transcript that was never fetched.
    fn try_open_channel(&mut self) -> Option<Effect> {
        if self.phase != ChannelPhase::AwaitingPrerequisites
            || self.session.is_none()
            || !self.transcript.is_loaded()
        {
            return None;
        }
        let session_id = self.session_id.clone()?;
        self.phase = ChannelPhase::Joining;
        Some(Effect::OpenChannel {
            epoch: self.epoch,
            session_id,
        })
    }

    fn channel_event(&mut self, event: InboundEvent, received_at: i64) -> Vec<Effect> {
        if !self.has_channel() {
            debug!(
                event = event.name().as_str(),
                "channel: event outside an open channel, ignoring"
            );
            return Vec::new();
        }

        match event {
            InboundEvent::Connect => {
                self.phase = ChannelPhase::Joining;
                self.session_id
                    .clone()
                    .map(|session_id| Effect::Emit(OutboundEvent::JoinRoom(session_id)))
                    .into_iter()
                    .collect()
            }
            InboundEvent::Disconnect { reason } => {
                let message = reason.unwrap_or_else(|| "connection closed".to_string());
                warn!(epoch = self.epoch, "channel: disconnected: {message}");
                self.phase = ChannelPhase::Joining;
                self.error = Some(SyncError::ChannelUnavailable(message));
                Vec::new()
            }
            InboundEvent::Joined => {
                self.phase = ChannelPhase::Joined;
                if matches!(self.error, Some(SyncError::ChannelUnavailable(_))) {
                    self.error = None;
                }
                let mut effects: Vec<Effect> = match &self.session {
                    Some(session) => self
                        .bootstrap
                        .on_joined(session, &self.transcript, &self.author_name)
                        .into_iter()
                        .map(Effect::Emit)
                        .collect(),
                    None => Vec::new(),
                };
                effects.extend(self.scroll_effect());
                effects
            }
            InboundEvent::Message(inbound) => {
                self.transcript.append(inbound.normalize(received_at));
                self.scroll_effect().into_iter().collect()
            }
            InboundEvent::Status(status) => {
                if let Some(session) = &self.session {
                    debug!(%status, "channel: chat status");
                    self.chat_status = Some(ChatStatus {
                        prompt: session.prompt.clone(),
                        status,
                    });
                }
                Vec::new()
            }
            InboundEvent::Terminate { reason } => {
                info!(
                    reason = reason.as_deref().unwrap_or(""),
                    "channel: session terminated"
                );
                self.terminated = true;
                Vec::new()
            }
        }
    }

    fn compose(&mut self, text: &str) -> Vec<Effect> {
        let text = text.trim();
        if text.is_empty() {
            return Vec::new();
        }
        if self.terminated {
            warn!("channel: session terminated, dropping outgoing message");
            return Vec::new();
        }
        let Some(session) = &self.session else {
            warn!("channel: no session loaded, dropping outgoing message");
            return Vec::new();
        };
        vec![Effect::Emit(OutboundEvent::room_message(
            session.id.clone(),
            self.author_name.clone(),
            text,
        ))]
    }

    fn has_channel(&self) -> bool {
        matches!(self.phase, ChannelPhase::Joining | ChannelPhase::Joined)
    }

    fn is_current(&self, epoch: u64, target: FetchTarget) -> bool {
        let current = epoch == self.epoch;
        if !current {
            debug!(
                epoch,
                current_epoch = self.epoch,
                %target,
                "history: dropping result from superseded activation"
            );
        }
        current
    }

    fn scroll_effect(&self) -> Option<Effect> {
        self.scroll.after_mutation().map(Effect::ScheduleScroll)
    }
}

#[cfg(test)]
#[path = "tests/reducer_tests.rs"]
mod tests;
