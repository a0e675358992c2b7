use std::sync::atomic::{AtomicUsize, Ordering};

use super::*;
use anyhow::anyhow;
use async_trait::async_trait;
use live_channel::MemoryChannel;
use shared::{
    domain::{Direction, SessionStatus},
    protocol::{InboundEvent, InboundMessage, MessageBody, StoredMessage},
};
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(5);

struct StaticApi {
    session: Option<Session>,
    history: Vec<StoredMessage>,
    session_calls: AtomicUsize,
}

impl StaticApi {
    fn new(status: SessionStatus, history: Vec<StoredMessage>) -> Arc<Self> {
        Arc::new(Self {
            session: Some(Session {
                id: SessionId::new("s1"),
                name: Some("demo".to_string()),
                prompt: "Summarize X".to_string(),
                task_type: "research".to_string(),
                status,
            }),
            history,
            session_calls: AtomicUsize::new(0),
        })
    }

    fn missing() -> Arc<Self> {
        Arc::new(Self {
            session: None,
            history: Vec::new(),
            session_calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl SessionApi for StaticApi {
    async fn get_session(
        &self,
        _scope: &ResourceSlug,
        session_id: &SessionId,
    ) -> anyhow::Result<Session> {
        self.session_calls.fetch_add(1, Ordering::SeqCst);
        self.session
            .clone()
            .ok_or_else(|| anyhow!("session {session_id} not found"))
    }

    async fn get_messages(
        &self,
        _scope: &ResourceSlug,
        _session_id: &SessionId,
    ) -> anyhow::Result<Vec<StoredMessage>> {
        Ok(self.history.clone())
    }
}

fn reply(text: &str, ts: i64, is_feedback: bool) -> Message {
    Message {
        author_name: "Agent".to_string(),
        direction: Direction::Outgoing,
        message: MessageBody::text(text),
        ts,
        is_feedback,
    }
}

fn config() -> SessionViewConfig {
    SessionViewConfig::new(ResourceSlug::new("acme"), "ada")
        .with_scroll_delay(Duration::from_millis(10))
}

async fn eventually(mut check: impl FnMut() -> bool) {
    timeout(WAIT, async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

async fn wait_joined(view: &SessionView) -> ViewSnapshot {
    timeout(WAIT, view.wait_for(|s| s.phase == ChannelPhase::Joined))
        .await
        .expect("joined in time")
        .expect("view running")
}

#[tokio::test]
async fn new_session_joins_and_bootstraps_once() {
    let channel = Arc::new(MemoryChannel::new().acknowledging_joins());
    let view = SessionView::spawn(
        StaticApi::new(SessionStatus::Started, Vec::new()),
        channel.clone(),
        config(),
    );

    view.activate(SessionId::new("s1")).expect("activate");
    let snapshot = wait_joined(&view).await;

    assert_eq!(snapshot.session_id, Some(SessionId::new("s1")));
    assert_eq!(snapshot.transcript, Some(Vec::new()));
    assert!(snapshot.busy);
    assert!(!snapshot.is_loading);
    assert_eq!(channel.active_handlers(), 1);

    let session = snapshot.session.expect("session");
    assert_eq!(
        channel.emitted(),
        vec![
            OutboundEvent::JoinRoom(SessionId::new("s1")),
            OutboundEvent::room_message(SessionId::new("s1"), "ada", "Summarize X"),
            OutboundEvent::task_submission(&session),
        ]
    );

    view.shutdown().await;
    assert_eq!(channel.active_handlers(), 0);
}

#[tokio::test]
async fn remount_rejoins_with_one_handler_set() {
    let history = vec![StoredMessage {
        message: reply("earlier", 10, true),
    }];
    let channel = Arc::new(MemoryChannel::new().acknowledging_joins());
    let api = StaticApi::new(SessionStatus::Active, history);
    let view = SessionView::spawn(api.clone(), channel.clone(), config());

    view.activate(SessionId::new("s1")).expect("activate");
    wait_joined(&view).await;

    view.deactivate().expect("deactivate");
    timeout(WAIT, view.wait_for(|s| s.phase == ChannelPhase::TornDown))
        .await
        .expect("torn down in time")
        .expect("view running");
    assert_eq!(channel.active_handlers(), 0);

    view.activate(SessionId::new("s1")).expect("reactivate");
    let snapshot = wait_joined(&view).await;
    assert_eq!(snapshot.message_count(), 1);
    assert!(!snapshot.busy);
    assert_eq!(channel.active_handlers(), 1);
    assert_eq!(api.session_calls.load(Ordering::SeqCst), 2);

    // The transport stayed up, so the second join went out without a reconnect
    // and history kept the initiating prompt from being resubmitted.
    assert_eq!(
        channel.emitted(),
        vec![
            OutboundEvent::JoinRoom(SessionId::new("s1")),
            OutboundEvent::JoinRoom(SessionId::new("s1")),
        ]
    );

    view.shutdown().await;
    assert_eq!(channel.active_handlers(), 0);
}

#[tokio::test]
async fn live_messages_update_transcript_and_busy() {
    let channel = Arc::new(MemoryChannel::new().acknowledging_joins());
    let view = SessionView::spawn(
        StaticApi::new(SessionStatus::Active, Vec::new()),
        channel.clone(),
        config(),
    );
    view.activate(SessionId::new("s1")).expect("activate");
    wait_joined(&view).await;

    channel.deliver(InboundEvent::Message(InboundMessage::Structured(reply(
        "Done.", 100, true,
    ))));
    let snapshot = timeout(WAIT, view.wait_for(|s| s.message_count() == 1))
        .await
        .expect("message in time")
        .expect("view running");
    assert!(!snapshot.busy);
    assert!(!snapshot.show_busy_indicator);

    channel.deliver(InboundEvent::Message(InboundMessage::RawText(
        "one more thing".to_string(),
    )));
    let snapshot = timeout(WAIT, view.wait_for(|s| s.message_count() == 2))
        .await
        .expect("raw message in time")
        .expect("view running");
    assert!(snapshot.busy);

    view.shutdown().await;
}

#[tokio::test]
async fn terminate_event_hides_busy_indicator() {
    let channel = Arc::new(MemoryChannel::new().acknowledging_joins());
    let view = SessionView::spawn(
        StaticApi::new(SessionStatus::Running, Vec::new()),
        channel.clone(),
        config(),
    );
    view.activate(SessionId::new("s1")).expect("activate");
    let snapshot = wait_joined(&view).await;
    assert!(snapshot.show_busy_indicator);

    channel.deliver(InboundEvent::Terminate { reason: None });
    let snapshot = timeout(WAIT, view.wait_for(|s| s.terminated))
        .await
        .expect("terminated in time")
        .expect("view running");
    assert!(snapshot.busy);
    assert!(!snapshot.show_busy_indicator);

    view.shutdown().await;
}

#[tokio::test]
async fn send_message_rejects_blank_and_emits_trimmed_text() {
    let channel = Arc::new(MemoryChannel::new().acknowledging_joins());
    let history = vec![StoredMessage {
        message: reply("hello", 1, true),
    }];
    let view = SessionView::spawn(
        StaticApi::new(SessionStatus::Active, history),
        channel.clone(),
        config(),
    );
    view.activate(SessionId::new("s1")).expect("activate");
    wait_joined(&view).await;

    assert_eq!(view.send_message("   \n"), Err(SyncError::BlankMessage));
    view.send_message("  next step  ").expect("send");

    eventually(|| channel.emitted().len() == 2).await;
    assert_eq!(
        channel.emitted()[1],
        OutboundEvent::room_message(SessionId::new("s1"), "ada", "next step")
    );

    view.shutdown().await;
}

#[tokio::test]
async fn fetch_failure_is_published() {
    let channel = Arc::new(MemoryChannel::new());
    let view = SessionView::spawn(StaticApi::missing(), channel.clone(), config());

    view.activate(SessionId::new("s9")).expect("activate");
    let snapshot = timeout(WAIT, view.wait_for(|s| s.error.is_some()))
        .await
        .expect("error in time")
        .expect("view running");

    match snapshot.error {
        Some(SyncError::FetchFailure { target, message }) => {
            assert_eq!(target, FetchTarget::Session);
            assert!(message.contains("s9"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(snapshot.phase, ChannelPhase::AwaitingPrerequisites);
    assert_eq!(channel.active_handlers(), 0);

    view.shutdown().await;
}

#[tokio::test]
async fn refused_connection_is_reported() {
    let channel = Arc::new(MemoryChannel::new());
    channel.refuse_connections(true);
    let view = SessionView::spawn(
        StaticApi::new(SessionStatus::Active, Vec::new()),
        channel.clone(),
        config(),
    );

    view.activate(SessionId::new("s1")).expect("activate");
    let snapshot = timeout(WAIT, view.wait_for(|s| s.error.is_some()))
        .await
        .expect("error in time")
        .expect("view running");
    assert!(matches!(
        snapshot.error,
        Some(SyncError::ChannelUnavailable(_))
    ));
    assert_eq!(snapshot.phase, ChannelPhase::Joining);

    view.shutdown().await;
}

#[tokio::test]
async fn content_changes_schedule_smooth_scroll() {
    let channel = Arc::new(MemoryChannel::new().acknowledging_joins());
    let view = SessionView::spawn(
        StaticApi::new(SessionStatus::Active, Vec::new()),
        channel.clone(),
        config(),
    );
    let mut notices = view.subscribe_notices();

    view.activate(SessionId::new("s1")).expect("activate");
    let notice = timeout(WAIT, notices.recv())
        .await
        .expect("notice in time")
        .expect("notice");
    assert_eq!(notice, ViewNotice::ScrollToBottom { smooth: true });

    view.shutdown().await;
}

#[tokio::test]
async fn state_channel_closes_after_shutdown() {
    let channel = Arc::new(MemoryChannel::new());
    let view = SessionView::spawn(
        StaticApi::new(SessionStatus::Active, Vec::new()),
        channel,
        config(),
    );
    let state = view.subscribe_state();
    view.shutdown().await;
    assert!(state.has_changed().is_err());
}
