//! Runtime around [`SessionViewState`]: owns the reducer on a single task,
//! carries out its effects, and publishes snapshots for the presentation
//! surface.

use std::{sync::Arc, time::Duration};

use chrono::Utc;
use live_channel::LiveChannel;
use shared::{
    domain::{ResourceSlug, Session, SessionId},
    protocol::{Message, OutboundEvent},
};
use tokio::{
    sync::{broadcast, mpsc, watch},
    task::JoinHandle,
};
use tracing::{debug, info, warn};

use crate::{
    api::SessionApi,
    error::{FetchTarget, SyncError},
    lifecycle::{ChannelLifecycle, JoinStep},
    reducer::{ChannelPhase, Effect, SessionViewState, ViewAction},
    view_state::{ChatStatus, Viewport, DEFAULT_SCROLL_DELAY},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionViewConfig {
    pub scope: ResourceSlug,
    pub author_name: String,
    pub scroll_delay: Duration,
}

impl SessionViewConfig {
    pub fn new(scope: ResourceSlug, author_name: impl Into<String>) -> Self {
        Self {
            scope,
            author_name: author_name.into(),
            scroll_delay: DEFAULT_SCROLL_DELAY,
        }
    }

    pub fn with_scroll_delay(mut self, scroll_delay: Duration) -> Self {
        self.scroll_delay = scroll_delay;
        self
    }
}

/// One-shot instructions for the presentation surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewNotice {
    ScrollToBottom { smooth: bool },
}

/// Everything the presentation surface renders, published after each action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewSnapshot {
    pub session_id: Option<SessionId>,
    pub session: Option<Session>,
    /// `None` until history has been fetched.
    pub transcript: Option<Vec<Message>>,
    pub busy: bool,
    pub show_busy_indicator: bool,
    pub terminated: bool,
    pub at_bottom: bool,
    pub chat_status: Option<ChatStatus>,
    pub error: Option<SyncError>,
    pub phase: ChannelPhase,
    pub is_loading: bool,
}

impl ViewSnapshot {
    pub fn message_count(&self) -> usize {
        self.transcript.as_ref().map_or(0, Vec::len)
    }
}

impl From<&SessionViewState> for ViewSnapshot {
    fn from(state: &SessionViewState) -> Self {
        Self {
            session_id: state.session_id().cloned(),
            session: state.session().cloned(),
            transcript: state.messages().map(<[Message]>::to_vec),
            busy: state.busy(),
            show_busy_indicator: state.show_busy_indicator(),
            terminated: state.terminated(),
            at_bottom: state.at_bottom(),
            chat_status: state.chat_status().cloned(),
            error: state.error().cloned(),
            phase: state.phase(),
            is_loading: state.is_loading(),
        }
    }
}

/// Handle to a running session view. Dropping every handle stops the view and
/// releases its channel handlers.
pub struct SessionView {
    commands: mpsc::UnboundedSender<ViewAction>,
    state: watch::Receiver<ViewSnapshot>,
    notices: broadcast::Sender<ViewNotice>,
    task: JoinHandle<()>,
}

impl SessionView {
    /// Starts the view task. Must be called from within a tokio runtime.
    pub fn spawn(
        api: Arc<dyn SessionApi>,
        channel: Arc<dyn LiveChannel>,
        config: SessionViewConfig,
    ) -> Self {
        let state = SessionViewState::new(config.author_name.clone(), config.scroll_delay);
        let (snapshot_tx, snapshot_rx) = watch::channel(ViewSnapshot::from(&state));
        let (notices, _) = broadcast::channel(64);
        let (commands, command_rx) = mpsc::unbounded_channel();
        let (internal_tx, internal_rx) = mpsc::unbounded_channel();

        let driver = Driver {
            api,
            scope: config.scope,
            state,
            lifecycle: ChannelLifecycle::new(channel),
            internal_tx,
            snapshot: snapshot_tx,
            notices: notices.clone(),
        };
        let task = tokio::spawn(driver.run(command_rx, internal_rx));

        Self {
            commands,
            state: snapshot_rx,
            notices,
            task,
        }
    }

    pub fn activate(&self, session_id: SessionId) -> Result<(), SyncError> {
        self.dispatch(ViewAction::Activate(session_id))
    }

    pub fn deactivate(&self) -> Result<(), SyncError> {
        self.dispatch(ViewAction::Deactivate)
    }

    /// Queues `text` for the session room. Blank input is rejected here and
    /// never reaches the channel.
    pub fn send_message(&self, text: &str) -> Result<(), SyncError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(SyncError::BlankMessage);
        }
        self.dispatch(ViewAction::Compose(text.to_string()))
    }

    pub fn report_viewport(&self, viewport: Viewport) -> Result<(), SyncError> {
        self.dispatch(ViewAction::Viewport(viewport))
    }

    pub fn snapshot(&self) -> ViewSnapshot {
        self.state.borrow().clone()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ViewSnapshot> {
        self.state.clone()
    }

    pub fn subscribe_notices(&self) -> broadcast::Receiver<ViewNotice> {
        self.notices.subscribe()
    }

    /// Resolves with the first published snapshot matching `predicate`.
    pub async fn wait_for(
        &self,
        mut predicate: impl FnMut(&ViewSnapshot) -> bool,
    ) -> Result<ViewSnapshot, SyncError> {
        let mut state = self.state.clone();
        let snapshot = state
            .wait_for(|snapshot| predicate(snapshot))
            .await
            .map_err(|_| SyncError::ViewClosed)?;
        Ok(snapshot.clone())
    }

    /// Tears the view down and waits for the task to release the channel.
    pub async fn shutdown(self) {
        let Self { commands, task, .. } = self;
        let _ = commands.send(ViewAction::Deactivate);
        drop(commands);
        if let Err(err) = task.await {
            warn!("channel: session view task failed: {err}");
        }
    }

    fn dispatch(&self, action: ViewAction) -> Result<(), SyncError> {
        self.commands
            .send(action)
            .map_err(|_| SyncError::ViewClosed)
    }
}

struct Driver {
    api: Arc<dyn SessionApi>,
    scope: ResourceSlug,
    state: SessionViewState,
    lifecycle: ChannelLifecycle,
    internal_tx: mpsc::UnboundedSender<ViewAction>,
    snapshot: watch::Sender<ViewSnapshot>,
    notices: broadcast::Sender<ViewNotice>,
}

impl Driver {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<ViewAction>,
        mut internal: mpsc::UnboundedReceiver<ViewAction>,
    ) {
        info!(scope = %self.scope, "channel: session view started");
        loop {
            let action = tokio::select! {
                command = commands.recv() => match command {
                    Some(action) => action,
                    None => break,
                },
                Some(result) = internal.recv() => result,
                event = self.lifecycle.next_event() => ViewAction::Channel {
                    event,
                    received_at: Utc::now().timestamp_millis(),
                },
            };
            self.apply(action).await;
        }
        self.lifecycle.close();
        info!(scope = %self.scope, "channel: session view stopped");
    }

    async fn apply(&mut self, action: ViewAction) {
        for effect in self.state.reduce(action) {
            self.execute(effect).await;
        }
        self.snapshot.send_replace(ViewSnapshot::from(&self.state));
    }

    async fn execute(&mut self, effect: Effect) {
        match effect {
            Effect::FetchSession { epoch, session_id } => {
                let api = Arc::clone(&self.api);
                let scope = self.scope.clone();
                let tx = self.internal_tx.clone();
                tokio::spawn(async move {
                    let action = match api.get_session(&scope, &session_id).await {
                        Ok(session) => ViewAction::SessionLoaded { epoch, session },
                        Err(err) => ViewAction::FetchFailed {
                            epoch,
                            target: FetchTarget::Session,
                            message: format!("{err:#}"),
                        },
                    };
                    let _ = tx.send(action);
                });
            }
            Effect::FetchHistory { epoch, session_id } => {
                let api = Arc::clone(&self.api);
                let scope = self.scope.clone();
                let tx = self.internal_tx.clone();
                tokio::spawn(async move {
                    let action = match api.get_messages(&scope, &session_id).await {
                        Ok(history) => ViewAction::HistoryLoaded { epoch, history },
                        Err(err) => ViewAction::FetchFailed {
                            epoch,
                            target: FetchTarget::History,
                            message: format!("{err:#}"),
                        },
                    };
                    let _ = tx.send(action);
                });
            }
            Effect::OpenChannel { epoch, session_id } => {
                match self.lifecycle.open(session_id.clone()) {
                    JoinStep::Join => self.emit(OutboundEvent::JoinRoom(session_id)).await,
                    JoinStep::Connect => {
                        let channel = Arc::clone(self.lifecycle.channel());
                        let tx = self.internal_tx.clone();
                        tokio::spawn(async move {
                            if let Err(err) = channel.connect().await {
                                let _ = tx.send(ViewAction::ChannelFailed {
                                    epoch,
                                    message: format!("{err:#}"),
                                });
                            }
                        });
                    }
                }
            }
            Effect::CloseChannel => self.lifecycle.close(),
            Effect::Emit(event) => self.emit(event).await,
            Effect::ScheduleScroll(request) => {
                let notices = self.notices.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(request.delay).await;
                    let _ = notices.send(ViewNotice::ScrollToBottom {
                        smooth: request.smooth,
                    });
                });
            }
        }
    }

    async fn emit(&self, event: OutboundEvent) {
        let name = event.name().as_str();
        debug!(event = name, "channel: emit");
        if let Err(err) = self.lifecycle.channel().emit(event).await {
            let _ = self.internal_tx.send(ViewAction::ChannelFailed {
                epoch: self.state.epoch(),
                message: format!("failed to emit `{name}`: {err:#}"),
            });
        }
    }
}

#[cfg(test)]
#[path = "tests/session_view_tests.rs"]
mod tests;
