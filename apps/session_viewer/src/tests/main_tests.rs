use super::*;
use client_core::{ChannelPhase, SessionViewState, DEFAULT_SCROLL_DELAY};
use shared::{domain::Direction, protocol::MessageBody};

fn message(author: &str, direction: Direction, ts: i64, is_feedback: bool) -> Message {
    Message {
        author_name: author.to_string(),
        direction,
        message: MessageBody::text("hi"),
        ts,
        is_feedback,
    }
}

fn snapshot(transcript: Option<Vec<Message>>) -> ViewSnapshot {
    ViewSnapshot {
        transcript,
        ..ViewSnapshot::from(&SessionViewState::new("ada", DEFAULT_SCROLL_DELAY))
    }
}

#[test]
fn message_line_uses_utc_time_and_feedback_marker() {
    let line = format_message(&message("Agent", Direction::Outgoing, 3_723_000, true));
    assert_eq!(line, "[01:02:03] Agent: hi *");
}

#[test]
fn anonymous_authors_fall_back_to_direction() {
    assert!(format_message(&message("", Direction::Incoming, 0, false)).contains("you: hi"));
    assert!(format_message(&message("", Direction::Outgoing, 0, false)).contains("agent: hi"));
}

#[test]
fn appended_messages_keep_printed_count_growing() {
    let first = message("Agent", Direction::Outgoing, 10, false);
    let second = message("Agent", Direction::Outgoing, 20, false);
    let before = snapshot(Some(vec![first.clone()]));
    let after = snapshot(Some(vec![first, second]));
    assert_eq!(print_snapshot(&before, &after, 1), 2);
}

#[test]
fn reset_transcript_prints_nothing_new() {
    let before = snapshot(Some(vec![message("Agent", Direction::Outgoing, 10, false)]));
    let after = snapshot(None);
    assert_eq!(after.phase, ChannelPhase::Idle);
    assert_eq!(print_snapshot(&before, &after, 1), 0);
}

#[test]
fn cli_flags_override_settings() {
    let args = Args::parse_from([
        "session_viewer",
        "s1",
        "--scope",
        "acme",
        "--scroll-delay-ms",
        "5",
    ]);
    let mut settings = config::Settings::default();
    args.apply(&mut settings);
    assert_eq!(args.session_id, "s1");
    assert_eq!(settings.scope, "acme");
    assert_eq!(settings.scroll_delay_ms, 5);
    assert_eq!(settings.server_url, "http://127.0.0.1:3000");
}
