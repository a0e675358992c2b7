use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    domain::{Direction, Session, SessionId, SessionStatus},
    error::ProtocolError,
};

/// Room shared by every session for background work submissions.
pub const TASK_QUEUE_ROOM: &str = "task_queue";

pub const TEXT_MESSAGE_TYPE: &str = "text";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventName {
    Connect,
    Disconnect,
    JoinRoom,
    Joined,
    Message,
    Status,
    Terminate,
}

impl EventName {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Connect => "connect",
            Self::Disconnect => "disconnect",
            Self::JoinRoom => "join_room",
            Self::Joined => "joined",
            Self::Message => "message",
            Self::Status => "status",
            Self::Terminate => "terminate",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "connect" => Some(Self::Connect),
            "disconnect" => Some(Self::Disconnect),
            "join_room" => Some(Self::JoinRoom),
            "joined" => Some(Self::Joined),
            "message" => Some(Self::Message),
            "status" => Some(Self::Status),
            "terminate" => Some(Self::Terminate),
            _ => None,
        }
    }
}

/// Envelope for everything crossing the live channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelFrame {
    pub event: String,
    #[serde(default)]
    pub payload: Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageBody {
    /// `None` is the empty type carried by raw-text deliveries.
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

impl MessageBody {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            kind: Some(TEXT_MESSAGE_TYPE.to_string()),
            text: text.into(),
            language: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    #[serde(default)]
    pub author_name: String,
    #[serde(rename = "incoming", default)]
    pub direction: Direction,
    pub message: MessageBody,
    /// Milliseconds since the epoch, as supplied by the sender.
    #[serde(default)]
    pub ts: i64,
    #[serde(default)]
    pub is_feedback: bool,
}

impl Message {
    pub fn is_incoming(&self) -> bool {
        self.direction.is_incoming()
    }

    pub fn text(&self) -> &str {
        &self.message.text
    }

    pub fn sent_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.ts)
    }
}

/// History record as returned by the messages endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredMessage {
    pub message: Message,
}

/// Inbound `message` payload: either a bare string or a full message object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InboundMessage {
    RawText(String),
    Structured(Message),
}

impl InboundMessage {
    /// Turns the payload into a transcript entry. Raw text has no sender
    /// metadata, so it is stamped with the local receive time.
    pub fn normalize(self, received_at: i64) -> Message {
        match self {
            Self::Structured(message) => message,
            Self::RawText(text) => Message {
                author_name: String::new(),
                direction: Direction::Outgoing,
                message: MessageBody {
                    kind: None,
                    text,
                    language: None,
                },
                ts: received_at,
                is_feedback: false,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    /// Transport reached the server (synthesized locally).
    Connect,
    /// Transport dropped (synthesized locally).
    Disconnect { reason: Option<String> },
    Joined,
    Message(InboundMessage),
    Status(SessionStatus),
    Terminate { reason: Option<String> },
}

impl InboundEvent {
    pub fn name(&self) -> EventName {
        match self {
            Self::Connect => EventName::Connect,
            Self::Disconnect { .. } => EventName::Disconnect,
            Self::Joined => EventName::Joined,
            Self::Message(_) => EventName::Message,
            Self::Status(_) => EventName::Status,
            Self::Terminate { .. } => EventName::Terminate,
        }
    }

    pub fn from_frame(frame: ChannelFrame) -> Result<Self, ProtocolError> {
        let name = EventName::parse(&frame.event)
            .ok_or_else(|| ProtocolError::UnknownEvent(frame.event.clone()))?;
        let payload = frame.payload;
        match name {
            EventName::Connect => Ok(Self::Connect),
            EventName::Disconnect => Ok(Self::Disconnect {
                reason: payload.as_str().map(str::to_string),
            }),
            EventName::Joined => Ok(Self::Joined),
            EventName::Message => {
                let message = decode_required(name, payload)?;
                Ok(Self::Message(message))
            }
            EventName::Status => {
                let status = decode_required(name, payload)?;
                Ok(Self::Status(status))
            }
            EventName::Terminate => Ok(Self::Terminate {
                reason: payload.as_str().map(str::to_string),
            }),
            EventName::JoinRoom => Err(ProtocolError::UnexpectedEvent(name.as_str())),
        }
    }
}

fn decode_required<T: serde::de::DeserializeOwned>(
    name: EventName,
    payload: Value,
) -> Result<T, ProtocolError> {
    if payload.is_null() {
        return Err(ProtocolError::EmptyPayload(name.as_str()));
    }
    serde_json::from_value(payload).map_err(|source| ProtocolError::MalformedPayload {
        event: name.as_str(),
        source,
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomMessage {
    pub room: SessionId,
    pub author_name: String,
    #[serde(rename = "incoming")]
    pub direction: Direction,
    pub message: MessageBody,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskPayload {
    pub task: String,
    pub session_id: SessionId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSubmission {
    pub room: String,
    /// Session type; selects the worker that picks the task up.
    pub event: String,
    pub message: TaskPayload,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundEvent {
    JoinRoom(SessionId),
    RoomMessage(RoomMessage),
    TaskSubmission(TaskSubmission),
}

impl OutboundEvent {
    /// Text typed by the human party into the session room.
    pub fn room_message(
        session_id: SessionId,
        author_name: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self::RoomMessage(RoomMessage {
            room: session_id,
            author_name: author_name.into(),
            direction: Direction::Incoming,
            message: MessageBody::text(text),
        })
    }

    pub fn task_submission(session: &Session) -> Self {
        Self::TaskSubmission(TaskSubmission {
            room: TASK_QUEUE_ROOM.to_string(),
            event: session.task_type.clone(),
            message: TaskPayload {
                task: session.prompt.clone(),
                session_id: session.id.clone(),
            },
        })
    }

    pub fn name(&self) -> EventName {
        match self {
            Self::JoinRoom(_) => EventName::JoinRoom,
            Self::RoomMessage(_) | Self::TaskSubmission(_) => EventName::Message,
        }
    }

    pub fn into_frame(self) -> Result<ChannelFrame, serde_json::Error> {
        let event = self.name().as_str().to_string();
        let payload = match self {
            Self::JoinRoom(session_id) => serde_json::to_value(session_id)?,
            Self::RoomMessage(message) => serde_json::to_value(message)?,
            Self::TaskSubmission(submission) => serde_json::to_value(submission)?,
        };
        Ok(ChannelFrame { event, payload })
    }
}
