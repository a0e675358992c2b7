use shared::{domain::Session, protocol::OutboundEvent};
use tracing::{debug, info};

use crate::transcript::TranscriptStore;

/// Decides whether a joined session is brand new and, if so, produces the
/// initiating prompt plus the task-queue submission. Fires at most once per
/// activation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BootstrapController {
    sent: bool,
}

impl BootstrapController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_fired(&self) -> bool {
        self.sent
    }

    pub fn on_joined(
        &mut self,
        session: &Session,
        transcript: &TranscriptStore,
        author_name: &str,
    ) -> Vec<OutboundEvent> {
        if self.sent {
            debug!(session_id = %session.id, "bootstrap: already sent for this view");
            return Vec::new();
        }
        let Some(messages) = transcript.messages() else {
            debug!(session_id = %session.id, "bootstrap: transcript not loaded, skipping");
            return Vec::new();
        };
        if !messages.is_empty() {
            return Vec::new();
        }

        self.sent = true;
        info!(
            session_id = %session.id,
            task_type = %session.task_type,
            "bootstrap: new session, submitting initiating prompt"
        );
        vec![
            OutboundEvent::room_message(session.id.clone(), author_name, session.prompt.clone()),
            OutboundEvent::task_submission(session),
        ]
    }
}
