use serde::{Deserialize, Serialize};

/// Ethereum account address, the user-facing identifier on XMTP.
///
/// Parsing enforces the `0x` prefix and normalizes to lowercase, since the
/// network resolves identifiers case-insensitively. Validation happens before
/// any network activity, so a bad address never costs a helper round trip.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct EthAddress(String);

#[derive(Debug, thiserror::Error)]
#[error("address must start with 0x: {0:?}")]
pub struct InvalidAddress(pub String);

impl EthAddress {
    pub fn parse(raw: &str) -> Result<Self, InvalidAddress> {
        let trimmed = raw.trim();
        if !trimmed.starts_with("0x") || trimmed.len() <= 2 {
            return Err(InvalidAddress(raw.to_string()));
        }
        Ok(Self(trimmed.to_ascii_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for EthAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque stable identity handle used inside the protocol, distinct from the
/// account address.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InboxId(pub String);

impl InboxId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for InboxId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for InboxId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationId(pub String);

impl ConversationId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ConversationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ConversationId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationKind {
    Dm,
    Group,
}

impl ConversationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Dm => "dm",
            Self::Group => "group",
        }
    }
}

/// A messaging channel as reported by the backend after a sync.
#[derive(Debug, Clone)]
pub struct Conversation {
    pub id: ConversationId,
    pub kind: ConversationKind,
    /// Creation timestamp, nanoseconds since the epoch.
    pub created_at_ns: Option<i64>,
    /// Counterparty inbox id. Only meaningful for DMs.
    pub peer_inbox_id: Option<InboxId>,
    /// Timestamp of the newest known message, used to pick between several
    /// candidate DMs for one counterparty.
    pub last_active_ns: Option<i64>,
}

/// Message payload. Anything other than plain text is opaque to these tools.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageContent {
    Text(String),
    Other,
}

impl MessageContent {
    /// Display form, truncated to at most `max` characters with an ellipsis
    /// marker. Non-text payloads render as a fixed placeholder.
    pub fn display(&self, max: usize) -> String {
        match self {
            Self::Text(text) => {
                if text.chars().count() > max {
                    let head: String = text.chars().take(max).collect();
                    format!("{head}...")
                } else {
                    text.clone()
                }
            }
            Self::Other => "[non-text content]".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Message {
    pub id: String,
    pub sender_inbox_id: InboxId,
    pub content: MessageContent,
    /// Network-assigned send timestamp, nanoseconds since the epoch. Absent
    /// when the backend reported something unparseable.
    pub sent_at_ns: Option<i64>,
}

/// Per-counterparty consent flag. Mutated by block/unblock, read by status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsentState {
    Allowed,
    Denied,
    Unknown,
}

impl ConsentState {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Allowed => "Allowed",
            Self::Denied => "Denied",
            Self::Unknown => "Unknown",
        }
    }
}

/// This process's own protocol identity, fixed at connect time.
#[derive(Debug, Clone)]
pub struct AgentIdentity {
    pub address: String,
    pub inbox_id: InboxId,
    /// Human-facing debug URL for the active network, when the backend
    /// exposes one.
    pub debug_url: Option<String>,
}

/// One inbound event from the subscription stream.
#[derive(Debug, Clone)]
pub enum XmtpEvent {
    Message {
        conversation_id: ConversationId,
        message: Message,
    },
    NewDm {
        conversation_id: ConversationId,
    },
    NewGroup {
        conversation_id: ConversationId,
    },
    /// An error the backend could not route to a specific handler.
    Error {
        message: String,
    },
}
