//! Production client: drives the helper process hosting the vendor SDK.
//!
//! The helper speaks newline-delimited JSON on stdin/stdout: one tagged
//! request object per line in, one tagged reply per line out, correlated by
//! `request_id`. Unsolicited lines carry subscription events. Its stderr is
//! inherited so SDK diagnostics land next to ours.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::api::XmtpApi;
use crate::config::Config;
use crate::error::XmtpError;
use crate::time::parse_ns;
use crate::types::{
    AgentIdentity, ConsentState, Conversation, ConversationId, ConversationKind, EthAddress,
    InboxId, Message, MessageContent, XmtpEvent,
};

/// Wire protocol revision this build speaks. A helper reporting a different
/// revision still gets used; the mismatch is advisory.
const PROTOCOL_VERSION: u32 = 1;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

// ── Wire types ──────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
enum HelperCmd<'a> {
    CanMessage {
        request_id: u64,
        address: &'a str,
    },
    ResolveInboxId {
        request_id: u64,
        address: &'a str,
    },
    ResolveAddress {
        request_id: u64,
        inbox_id: &'a str,
    },
    SyncConversations {
        request_id: u64,
    },
    ListConversations {
        request_id: u64,
    },
    ConversationMembers {
        request_id: u64,
        conversation_id: &'a str,
    },
    CreateDm {
        request_id: u64,
        address: &'a str,
    },
    SyncConversation {
        request_id: u64,
        conversation_id: &'a str,
    },
    ListMessages {
        request_id: u64,
        conversation_id: &'a str,
        limit: usize,
    },
    SendText {
        request_id: u64,
        conversation_id: &'a str,
        content: &'a str,
    },
    GetConsentState {
        request_id: u64,
        inbox_id: &'a str,
    },
    SetConsentState {
        request_id: u64,
        inbox_id: &'a str,
        state: ConsentState,
    },
    Subscribe {
        request_id: u64,
    },
}

impl HelperCmd<'_> {
    fn request_id(&self) -> u64 {
        match self {
            Self::CanMessage { request_id, .. }
            | Self::ResolveInboxId { request_id, .. }
            | Self::ResolveAddress { request_id, .. }
            | Self::SyncConversations { request_id }
            | Self::ListConversations { request_id }
            | Self::ConversationMembers { request_id, .. }
            | Self::CreateDm { request_id, .. }
            | Self::SyncConversation { request_id, .. }
            | Self::ListMessages { request_id, .. }
            | Self::SendText { request_id, .. }
            | Self::GetConsentState { request_id, .. }
            | Self::SetConsentState { request_id, .. }
            | Self::Subscribe { request_id } => *request_id,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum HelperMsg {
    Ready {
        protocol_version: u32,
        address: String,
        inbox_id: String,
        #[serde(default)]
        debug_url: Option<String>,
    },
    Ok {
        request_id: u64,
        #[serde(default)]
        result: Value,
    },
    Error {
        #[serde(default)]
        request_id: Option<u64>,
        code: String,
        message: String,
    },
    Message {
        conversation_id: String,
        #[serde(flatten)]
        message: WireMessage,
    },
    NewConversation {
        conversation_id: String,
        kind: ConversationKind,
    },
}

#[derive(Debug, Deserialize)]
struct WireMessage {
    id: String,
    sender_inbox_id: String,
    #[serde(default)]
    content: Value,
    #[serde(default)]
    sent_at_ns: Value,
}

impl From<WireMessage> for Message {
    fn from(wire: WireMessage) -> Self {
        let content = match wire.content {
            Value::String(text) => MessageContent::Text(text),
            _ => MessageContent::Other,
        };
        Message {
            id: wire.id,
            sender_inbox_id: InboxId(wire.sender_inbox_id),
            content,
            sent_at_ns: parse_ns(&wire.sent_at_ns),
        }
    }
}

#[derive(Debug, Deserialize)]
struct WireConversation {
    id: String,
    kind: ConversationKind,
    #[serde(default)]
    created_at_ns: Value,
    #[serde(default)]
    peer_inbox_id: Option<String>,
    #[serde(default)]
    last_active_ns: Value,
}

impl From<WireConversation> for Conversation {
    fn from(wire: WireConversation) -> Self {
        Conversation {
            id: ConversationId(wire.id),
            kind: wire.kind,
            created_at_ns: parse_ns(&wire.created_at_ns),
            peer_inbox_id: wire.peer_inbox_id.map(InboxId),
            last_active_ns: parse_ns(&wire.last_active_ns),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ReachabilityResult {
    reachable: bool,
}

#[derive(Debug, Deserialize)]
struct InboxIdResult {
    #[serde(default)]
    inbox_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AddressResult {
    #[serde(default)]
    address: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ConversationsResult {
    conversations: Vec<WireConversation>,
}

#[derive(Debug, Deserialize)]
struct MembersResult {
    members: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ConversationResult {
    conversation: WireConversation,
}

#[derive(Debug, Deserialize)]
struct MessagesResult {
    messages: Vec<WireMessage>,
}

#[derive(Debug, Deserialize)]
struct SendResult {
    message_id: String,
}

#[derive(Debug, Deserialize)]
struct ConsentResult {
    state: ConsentState,
}

// ── Client ──────────────────────────────────────────────────────────────────

type PendingMap = Arc<Mutex<HashMap<u64, oneshot::Sender<Result<Value, XmtpError>>>>>;

/// Connected handle to the helper process. One per command invocation; the
/// child is killed when the handle drops.
pub struct SidecarXmtp {
    identity: AgentIdentity,
    stdin: tokio::sync::Mutex<ChildStdin>,
    pending: PendingMap,
    events: Mutex<Option<mpsc::UnboundedReceiver<XmtpEvent>>>,
    next_request_id: AtomicU64,
    _child: Child,
}

impl SidecarXmtp {
    /// Spawn the helper and wait for its `ready` handshake. No retries: a
    /// spawn or handshake failure is fatal to the invocation.
    pub async fn connect(config: &Config) -> Result<Self, XmtpError> {
        let mut child = tokio::process::Command::new("sh")
            .arg("-c")
            .arg(&config.helper_cmd)
            .env("XMTP_WALLET_KEY", &config.wallet_key)
            .env("XMTP_DB_ENCRYPTION_KEY", &config.db_encryption_key)
            .env("XMTP_ENV", config.env.as_str())
            .env("XMTP_DB_PATH", &config.db_path)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::inherit())
            .kill_on_drop(true)
            .spawn()?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| XmtpError::Protocol("helper stdin unavailable".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| XmtpError::Protocol("helper stdout unavailable".into()))?;

        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let (ready_tx, ready_rx) = oneshot::channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        tokio::spawn(read_loop(stdout, Arc::clone(&pending), ready_tx, event_tx));

        let ready = tokio::time::timeout(CONNECT_TIMEOUT, ready_rx)
            .await
            .map_err(|_| XmtpError::Timeout)?
            .map_err(|_| XmtpError::Closed)??;

        let (protocol_version, identity) = ready;
        if protocol_version != PROTOCOL_VERSION {
            warn!(
                helper = protocol_version,
                ours = PROTOCOL_VERSION,
                "helper speaks a different protocol revision; continuing anyway"
            );
        }

        Ok(Self {
            identity,
            stdin: tokio::sync::Mutex::new(stdin),
            pending,
            events: Mutex::new(Some(event_rx)),
            next_request_id: AtomicU64::new(1),
            _child: child,
        })
    }

    async fn request(&self, cmd: HelperCmd<'_>) -> Result<Value, XmtpError> {
        let request_id = cmd.request_id();
        let (tx, rx) = oneshot::channel();
        self.pending
            .lock()
            .expect("pending map poisoned")
            .insert(request_id, tx);

        let line = serde_json::to_string(&cmd)
            .map_err(|err| XmtpError::Protocol(format!("encode request: {err}")))?;
        {
            let mut stdin = self.stdin.lock().await;
            stdin.write_all(line.as_bytes()).await?;
            stdin.write_all(b"\n").await?;
            stdin.flush().await?;
        }

        match tokio::time::timeout(REQUEST_TIMEOUT, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(XmtpError::Closed),
            Err(_) => {
                self.pending
                    .lock()
                    .expect("pending map poisoned")
                    .remove(&request_id);
                Err(XmtpError::Timeout)
            }
        }
    }

    fn next_id(&self) -> u64 {
        self.next_request_id.fetch_add(1, Ordering::Relaxed)
    }
}

fn decode<T: DeserializeOwned>(value: Value) -> Result<T, XmtpError> {
    serde_json::from_value(value).map_err(|err| XmtpError::Protocol(format!("decode result: {err}")))
}

type ReadyPayload = (u32, AgentIdentity);

async fn read_loop(
    stdout: tokio::process::ChildStdout,
    pending: PendingMap,
    ready_tx: oneshot::Sender<Result<ReadyPayload, XmtpError>>,
    event_tx: mpsc::UnboundedSender<XmtpEvent>,
) {
    let mut ready_tx = Some(ready_tx);
    let mut lines = BufReader::new(stdout).lines();

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(err) => {
                warn!("helper stdout read failed: {err}");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let msg: HelperMsg = match serde_json::from_str(&line) {
            Ok(msg) => msg,
            Err(err) => {
                warn!("unparseable helper line ({err}): {line}");
                continue;
            }
        };

        match msg {
            HelperMsg::Ready {
                protocol_version,
                address,
                inbox_id,
                debug_url,
            } => {
                let identity = AgentIdentity {
                    address,
                    inbox_id: InboxId(inbox_id),
                    debug_url,
                };
                if let Some(tx) = ready_tx.take() {
                    let _ = tx.send(Ok((protocol_version, identity)));
                }
            }
            HelperMsg::Ok { request_id, result } => {
                respond(&pending, request_id, Ok(result));
            }
            HelperMsg::Error {
                request_id: Some(request_id),
                code,
                message,
            } => {
                respond(&pending, request_id, Err(XmtpError::Sdk { code, message }));
            }
            HelperMsg::Error {
                request_id: None,
                code,
                message,
            } => {
                // Unrouted backend error. During the handshake it is fatal;
                // afterwards it belongs on the event stream.
                if let Some(tx) = ready_tx.take() {
                    let _ = tx.send(Err(XmtpError::Sdk { code, message }));
                } else {
                    let _ = event_tx.send(XmtpEvent::Error { message });
                }
            }
            HelperMsg::Message {
                conversation_id,
                message,
            } => {
                let _ = event_tx.send(XmtpEvent::Message {
                    conversation_id: ConversationId(conversation_id),
                    message: message.into(),
                });
            }
            HelperMsg::NewConversation {
                conversation_id,
                kind,
            } => {
                let conversation_id = ConversationId(conversation_id);
                let event = match kind {
                    ConversationKind::Dm => XmtpEvent::NewDm { conversation_id },
                    ConversationKind::Group => XmtpEvent::NewGroup { conversation_id },
                };
                let _ = event_tx.send(event);
            }
        }
    }

    debug!("helper stdout closed");
    let mut pending = pending.lock().expect("pending map poisoned");
    for (_, tx) in pending.drain() {
        let _ = tx.send(Err(XmtpError::Closed));
    }
}

fn respond(pending: &PendingMap, request_id: u64, result: Result<Value, XmtpError>) {
    let tx = pending
        .lock()
        .expect("pending map poisoned")
        .remove(&request_id);
    match tx {
        Some(tx) => {
            let _ = tx.send(result);
        }
        None => warn!(request_id, "reply for unknown request"),
    }
}

#[async_trait]
impl XmtpApi for SidecarXmtp {
    fn identity(&self) -> &AgentIdentity {
        &self.identity
    }

    async fn can_message(&self, address: &EthAddress) -> Result<bool, XmtpError> {
        let result = self
            .request(HelperCmd::CanMessage {
                request_id: self.next_id(),
                address: address.as_str(),
            })
            .await?;
        Ok(decode::<ReachabilityResult>(result)?.reachable)
    }

    async fn resolve_inbox_id(&self, address: &EthAddress) -> Result<Option<InboxId>, XmtpError> {
        let result = self
            .request(HelperCmd::ResolveInboxId {
                request_id: self.next_id(),
                address: address.as_str(),
            })
            .await?;
        Ok(decode::<InboxIdResult>(result)?.inbox_id.map(InboxId))
    }

    async fn resolve_address(&self, inbox_id: &InboxId) -> Result<Option<String>, XmtpError> {
        let result = self
            .request(HelperCmd::ResolveAddress {
                request_id: self.next_id(),
                inbox_id: inbox_id.as_str(),
            })
            .await?;
        Ok(decode::<AddressResult>(result)?.address)
    }

    async fn sync_conversations(&self) -> Result<(), XmtpError> {
        self.request(HelperCmd::SyncConversations {
            request_id: self.next_id(),
        })
        .await
        .map(|_| ())
    }

    async fn list_conversations(&self) -> Result<Vec<Conversation>, XmtpError> {
        let result = self
            .request(HelperCmd::ListConversations {
                request_id: self.next_id(),
            })
            .await?;
        let conversations = decode::<ConversationsResult>(result)?.conversations;
        Ok(conversations.into_iter().map(Into::into).collect())
    }

    async fn conversation_members(&self, id: &ConversationId) -> Result<Vec<String>, XmtpError> {
        let result = self
            .request(HelperCmd::ConversationMembers {
                request_id: self.next_id(),
                conversation_id: id.as_str(),
            })
            .await?;
        Ok(decode::<MembersResult>(result)?.members)
    }

    async fn create_dm(&self, address: &EthAddress) -> Result<Conversation, XmtpError> {
        let result = self
            .request(HelperCmd::CreateDm {
                request_id: self.next_id(),
                address: address.as_str(),
            })
            .await?;
        Ok(decode::<ConversationResult>(result)?.conversation.into())
    }

    async fn sync_conversation(&self, id: &ConversationId) -> Result<(), XmtpError> {
        self.request(HelperCmd::SyncConversation {
            request_id: self.next_id(),
            conversation_id: id.as_str(),
        })
        .await
        .map(|_| ())
    }

    async fn list_messages(
        &self,
        id: &ConversationId,
        limit: usize,
    ) -> Result<Vec<Message>, XmtpError> {
        let result = self
            .request(HelperCmd::ListMessages {
                request_id: self.next_id(),
                conversation_id: id.as_str(),
                limit,
            })
            .await?;
        let messages = decode::<MessagesResult>(result)?.messages;
        Ok(messages.into_iter().map(Into::into).collect())
    }

    async fn send_text(&self, id: &ConversationId, content: &str) -> Result<String, XmtpError> {
        let result = self
            .request(HelperCmd::SendText {
                request_id: self.next_id(),
                conversation_id: id.as_str(),
                content,
            })
            .await?;
        Ok(decode::<SendResult>(result)?.message_id)
    }

    async fn consent_state(&self, inbox_id: &InboxId) -> Result<ConsentState, XmtpError> {
        let result = self
            .request(HelperCmd::GetConsentState {
                request_id: self.next_id(),
                inbox_id: inbox_id.as_str(),
            })
            .await?;
        Ok(decode::<ConsentResult>(result)?.state)
    }

    async fn set_consent_state(
        &self,
        inbox_id: &InboxId,
        state: ConsentState,
    ) -> Result<(), XmtpError> {
        self.request(HelperCmd::SetConsentState {
            request_id: self.next_id(),
            inbox_id: inbox_id.as_str(),
            state,
        })
        .await
        .map(|_| ())
    }

    async fn subscribe(&self) -> Result<mpsc::UnboundedReceiver<XmtpEvent>, XmtpError> {
        let rx = self
            .events
            .lock()
            .expect("event receiver poisoned")
            .take()
            .ok_or_else(|| XmtpError::Protocol("event stream already taken".into()))?;
        self.request(HelperCmd::Subscribe {
            request_id: self.next_id(),
        })
        .await?;
        Ok(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn requests_serialize_with_cmd_tag() {
        let cmd = HelperCmd::SendText {
            request_id: 7,
            conversation_id: "c1",
            content: "hello",
        };
        let encoded = serde_json::to_value(&cmd).unwrap();
        assert_eq!(
            encoded,
            json!({
                "cmd": "send_text",
                "request_id": 7,
                "conversation_id": "c1",
                "content": "hello",
            })
        );
    }

    #[test]
    fn consent_request_uses_snake_case_state() {
        let cmd = HelperCmd::SetConsentState {
            request_id: 2,
            inbox_id: "inbox-1",
            state: ConsentState::Denied,
        };
        let encoded = serde_json::to_value(&cmd).unwrap();
        assert_eq!(encoded["state"], json!("denied"));
    }

    #[test]
    fn ready_line_parses_with_optional_debug_url() {
        let msg: HelperMsg = serde_json::from_str(
            r#"{"type":"ready","protocol_version":1,"address":"0xabc","inbox_id":"inbox-1"}"#,
        )
        .unwrap();
        match msg {
            HelperMsg::Ready {
                protocol_version,
                address,
                debug_url,
                ..
            } => {
                assert_eq!(protocol_version, 1);
                assert_eq!(address, "0xabc");
                assert!(debug_url.is_none());
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn message_event_parses_string_timestamp() {
        let msg: HelperMsg = serde_json::from_str(
            r#"{"type":"message","conversation_id":"c1","id":"m1","sender_inbox_id":"inbox-2","content":"hi","sent_at_ns":"1700000000123456789"}"#,
        )
        .unwrap();
        match msg {
            HelperMsg::Message { message, .. } => {
                let message: Message = message.into();
                assert_eq!(message.sent_at_ns, Some(1_700_000_000_123_456_789));
                assert_eq!(message.content, MessageContent::Text("hi".into()));
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn non_string_content_becomes_opaque() {
        let wire = WireMessage {
            id: "m1".into(),
            sender_inbox_id: "inbox-2".into(),
            content: json!({"kind": "attachment"}),
            sent_at_ns: json!(5),
        };
        let message: Message = wire.into();
        assert_eq!(message.content, MessageContent::Other);
    }

    #[test]
    fn error_line_parses_without_request_id() {
        let msg: HelperMsg = serde_json::from_str(
            r#"{"type":"error","code":"stream_reset","message":"subscription dropped"}"#,
        )
        .unwrap();
        match msg {
            HelperMsg::Error {
                request_id, code, ..
            } => {
                assert!(request_id.is_none());
                assert_eq!(code, "stream_reset");
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn conversation_conversion_tolerates_missing_fields() {
        let wire: WireConversation =
            serde_json::from_value(json!({"id": "c1", "kind": "group"})).unwrap();
        let conversation: Conversation = wire.into();
        assert_eq!(conversation.kind, ConversationKind::Group);
        assert!(conversation.created_at_ns.is_none());
        assert!(conversation.peer_inbox_id.is_none());
    }
}
