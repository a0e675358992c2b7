use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

id_newtype!(SessionId);
id_newtype!(ResourceSlug);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Started,
    Active,
    Running,
    Waiting,
    Warning,
    Errored,
    Terminated,
    #[serde(other)]
    Unknown,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Started => "started",
            Self::Active => "active",
            Self::Running => "running",
            Self::Waiting => "waiting",
            Self::Warning => "warning",
            Self::Errored => "errored",
            Self::Terminated => "terminated",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which party produced a message.
///
/// On the wire this is the boolean `incoming` flag: `true` means the message
/// came from the human party, `false` from the automated counterpart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Direction {
    Incoming,
    #[default]
    Outgoing,
}

impl Direction {
    pub fn from_incoming_flag(incoming: bool) -> Self {
        if incoming {
            Self::Incoming
        } else {
            Self::Outgoing
        }
    }

    pub fn is_incoming(self) -> bool {
        self == Self::Incoming
    }
}

impl Serialize for Direction {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_bool(self.is_incoming())
    }
}

impl<'de> Deserialize<'de> for Direction {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        bool::deserialize(deserializer).map(Self::from_incoming_flag)
    }
}

/// One conversational task instance. Only `status` changes after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    #[serde(rename = "_id", alias = "id")]
    pub id: SessionId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub prompt: String,
    #[serde(rename = "type")]
    pub task_type: String,
    pub status: SessionStatus,
}

impl Session {
    pub fn is_terminated(&self) -> bool {
        self.status == SessionStatus::Terminated
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_decodes_document_id_and_type() {
        let session: Session = serde_json::from_str(
            r#"{"_id":"s1","prompt":"Summarize X","type":"research","status":"started","teamId":"t"}"#,
        )
        .expect("session");
        assert_eq!(session.id, SessionId::new("s1"));
        assert_eq!(session.task_type, "research");
        assert!(!session.is_terminated());
    }

    #[test]
    fn unknown_status_falls_back_instead_of_failing() {
        let status: SessionStatus = serde_json::from_str(r#""paused""#).expect("status");
        assert_eq!(status, SessionStatus::Unknown);
    }

    #[test]
    fn direction_travels_as_incoming_flag() {
        assert_eq!(
            serde_json::to_string(&Direction::Incoming).expect("encode"),
            "true"
        );
        let direction: Direction = serde_json::from_str("false").expect("decode");
        assert_eq!(direction, Direction::Outgoing);
    }
}
