use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use client_core::{
    HttpSessionApi, SessionView, SessionViewConfig, SyncError, ViewNotice, ViewSnapshot,
};
use live_channel::WebSocketChannel;
use shared::{
    domain::{ResourceSlug, SessionId},
    protocol::Message,
};
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    sync::{broadcast, watch},
};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

mod config;

#[derive(Parser, Debug)]
#[command(about = "Follow a session transcript and chat into it from the terminal")]
struct Args {
    /// Session to open.
    session_id: String,
    #[arg(long)]
    server_url: Option<String>,
    #[arg(long)]
    channel_url: Option<String>,
    #[arg(long)]
    scope: Option<String>,
    #[arg(long)]
    author_name: Option<String>,
    #[arg(long)]
    scroll_delay_ms: Option<u64>,
}

impl Args {
    fn apply(&self, settings: &mut config::Settings) {
        if let Some(v) = &self.server_url {
            settings.server_url = v.clone();
        }
        if let Some(v) = &self.channel_url {
            settings.channel_url = Some(v.clone());
        }
        if let Some(v) = &self.scope {
            settings.scope = v.clone();
        }
        if let Some(v) = &self.author_name {
            settings.author_name = v.clone();
        }
        if let Some(v) = self.scroll_delay_ms {
            settings.scroll_delay_ms = v;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
    let args = Args::parse();

    let mut settings = config::load_settings();
    args.apply(&mut settings);
    let channel_url = settings.resolved_channel_url()?;
    info!(
        server_url = %settings.server_url,
        %channel_url,
        scope = %settings.scope,
        "session viewer starting"
    );

    let view = SessionView::spawn(
        Arc::new(HttpSessionApi::new(settings.server_url.clone())),
        Arc::new(WebSocketChannel::new(channel_url)),
        SessionViewConfig::new(ResourceSlug::new(settings.scope.clone()), &settings.author_name)
            .with_scroll_delay(settings.scroll_delay()),
    );
    let printer = tokio::spawn(print_updates(
        view.subscribe_state(),
        view.subscribe_notices(),
    ));
    view.activate(SessionId::new(args.session_id))
        .context("session view stopped before activation")?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => match line {
                Ok(Some(line)) => match view.send_message(&line) {
                    Ok(()) | Err(SyncError::BlankMessage) => {}
                    Err(err) => {
                        warn!("failed to send message: {err}");
                        break;
                    }
                },
                Ok(None) => break,
                Err(err) => {
                    warn!("failed to read stdin: {err}");
                    break;
                }
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    view.shutdown().await;
    printer.abort();
    Ok(())
}

async fn print_updates(
    mut state: watch::Receiver<ViewSnapshot>,
    mut notices: broadcast::Receiver<ViewNotice>,
) {
    let mut printed = 0;
    let mut last = state.borrow().clone();
    loop {
        tokio::select! {
            changed = state.changed() => {
                if changed.is_err() {
                    return;
                }
                let snapshot = state.borrow_and_update().clone();
                printed = print_snapshot(&last, &snapshot, printed);
                last = snapshot;
            }
            notice = notices.recv() => match notice {
                Ok(ViewNotice::ScrollToBottom { smooth }) => debug!(smooth, "view: scroll to bottom"),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!(skipped, "view: scroll notices lagged")
                }
                Err(broadcast::error::RecvError::Closed) => return,
            },
        }
    }
}

/// Prints what changed between two snapshots; returns how many transcript
/// entries are now on screen.
fn print_snapshot(previous: &ViewSnapshot, current: &ViewSnapshot, printed: usize) -> usize {
    if current.session != previous.session {
        if let Some(session) = &current.session {
            println!(
                "== {} ({}) [{}]",
                session.name.as_deref().unwrap_or(session.id.as_str()),
                session.task_type,
                session.status
            );
            println!("== {}", session.prompt);
        }
    }

    let transcript = current.transcript.as_deref().unwrap_or_default();
    // Out-of-order arrivals land mid-transcript; redraw from the top.
    let printed = if transcript.len() < printed || !starts_with(transcript, previous) {
        0
    } else {
        printed
    };
    for message in &transcript[printed..] {
        println!("{}", format_message(message));
    }

    if current.show_busy_indicator && !previous.show_busy_indicator {
        println!("... waiting for a reply");
    }
    if current.chat_status != previous.chat_status {
        if let Some(status) = &current.chat_status {
            println!("-- status: {}", status.status);
        }
    }
    if current.terminated && !previous.terminated {
        println!("== session terminated; input is closed");
    }
    if current.error != previous.error {
        if let Some(error) = &current.error {
            println!("!! {error}");
        }
    }
    transcript.len()
}

fn starts_with(transcript: &[Message], previous: &ViewSnapshot) -> bool {
    let before = previous.transcript.as_deref().unwrap_or_default();
    transcript.starts_with(before)
}

fn format_message(message: &Message) -> String {
    let time = message
        .sent_at()
        .map(|at| at.format("%H:%M:%S").to_string())
        .unwrap_or_else(|| "--:--:--".to_string());
    let author = if !message.author_name.is_empty() {
        message.author_name.as_str()
    } else if message.is_incoming() {
        "you"
    } else {
        "agent"
    };
    let marker = if message.is_feedback { " *" } else { "" };
    format!("[{time}] {author}: {}{marker}", message.text())
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
