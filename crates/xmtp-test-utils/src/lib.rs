//! Scripted in-memory [`XmtpApi`] implementation.
//!
//! Tests seed it with peers, conversations, and messages, optionally inject
//! per-conversation failures, then run command logic against it and inspect
//! what was sent.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::mpsc;

use xmtp_agent::{
    AgentIdentity, ConsentState, Conversation, ConversationId, ConversationKind, EthAddress,
    InboxId, Message, MessageContent, XmtpApi, XmtpError, XmtpEvent,
};

struct FakeConversation {
    conversation: Conversation,
    messages: Vec<Message>,
    members: Vec<String>,
    fail_sync: bool,
    fail_members: bool,
}

#[derive(Default)]
struct State {
    reachable: HashMap<String, bool>,
    inbox_by_address: HashMap<String, InboxId>,
    address_by_inbox: HashMap<InboxId, String>,
    conversations: Vec<FakeConversation>,
    consent: HashMap<InboxId, ConsentState>,
    sent: Vec<(ConversationId, String)>,
    fail_sync_all: bool,
    next_message_id: u64,
    next_conversation_id: u64,
}

pub struct FakeXmtp {
    identity: AgentIdentity,
    state: Mutex<State>,
    event_tx: Mutex<Option<mpsc::UnboundedSender<XmtpEvent>>>,
    event_rx: Mutex<Option<mpsc::UnboundedReceiver<XmtpEvent>>>,
}

impl FakeXmtp {
    pub fn new(address: &str, inbox_id: &str) -> Self {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        Self {
            identity: AgentIdentity {
                address: address.to_string(),
                inbox_id: InboxId(inbox_id.to_string()),
                debug_url: None,
            },
            state: Mutex::new(State::default()),
            event_tx: Mutex::new(Some(event_tx)),
            event_rx: Mutex::new(Some(event_rx)),
        }
    }

    pub fn with_debug_url(mut self, url: &str) -> Self {
        self.identity.debug_url = Some(url.to_string());
        self
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().expect("fake state poisoned")
    }

    /// Register a counterparty as reachable and resolvable in both directions.
    pub fn add_peer(&self, address: &str, inbox_id: &str) {
        let mut state = self.lock();
        let address = address.to_ascii_lowercase();
        let inbox = InboxId(inbox_id.to_string());
        state.reachable.insert(address.clone(), true);
        state.inbox_by_address.insert(address.clone(), inbox.clone());
        state.address_by_inbox.insert(inbox, address);
    }

    /// Register an inbox id whose address cannot be resolved back.
    pub fn add_unresolvable_peer(&self, address: &str, inbox_id: &str) {
        let mut state = self.lock();
        let address = address.to_ascii_lowercase();
        state.reachable.insert(address.clone(), true);
        state
            .inbox_by_address
            .insert(address, InboxId(inbox_id.to_string()));
    }

    pub fn add_dm(&self, peer_inbox_id: &str) -> ConversationId {
        self.add_conversation(ConversationKind::Dm, Some(peer_inbox_id), None)
    }

    pub fn add_conversation(
        &self,
        kind: ConversationKind,
        peer_inbox_id: Option<&str>,
        created_at_ns: Option<i64>,
    ) -> ConversationId {
        let mut state = self.lock();
        state.next_conversation_id += 1;
        let id = ConversationId(format!("conv-{}", state.next_conversation_id));
        state.conversations.push(FakeConversation {
            conversation: Conversation {
                id: id.clone(),
                kind,
                created_at_ns,
                peer_inbox_id: peer_inbox_id.map(|p| InboxId(p.to_string())),
                last_active_ns: None,
            },
            messages: Vec::new(),
            members: Vec::new(),
            fail_sync: false,
            fail_members: false,
        });
        id
    }

    pub fn set_members(&self, id: &ConversationId, members: &[&str]) {
        let mut state = self.lock();
        let entry = find_mut(&mut state, id);
        entry.members = members.iter().map(|m| m.to_string()).collect();
    }

    pub fn push_message(
        &self,
        id: &ConversationId,
        sender_inbox_id: &str,
        content: &str,
        sent_at_ns: Option<i64>,
    ) {
        self.push_content(id, sender_inbox_id, MessageContent::Text(content.into()), sent_at_ns);
    }

    pub fn push_content(
        &self,
        id: &ConversationId,
        sender_inbox_id: &str,
        content: MessageContent,
        sent_at_ns: Option<i64>,
    ) {
        let mut state = self.lock();
        state.next_message_id += 1;
        let message = Message {
            id: format!("msg-{}", state.next_message_id),
            sender_inbox_id: InboxId(sender_inbox_id.to_string()),
            content,
            sent_at_ns,
        };
        let entry = find_mut(&mut state, id);
        if let Some(ns) = sent_at_ns {
            let last = entry.conversation.last_active_ns.unwrap_or(i64::MIN);
            entry.conversation.last_active_ns = Some(last.max(ns));
        }
        entry.messages.push(message);
    }

    /// Make one conversation's sync and message fetch fail.
    pub fn fail_conversation_sync(&self, id: &ConversationId) {
        let mut state = self.lock();
        find_mut(&mut state, id).fail_sync = true;
    }

    /// Make member resolution fail for one conversation.
    pub fn fail_members(&self, id: &ConversationId) {
        let mut state = self.lock();
        find_mut(&mut state, id).fail_members = true;
    }

    /// Make the top-level conversation sync fail.
    pub fn fail_sync_all(&self) {
        self.lock().fail_sync_all = true;
    }

    /// Full text of every payload transmitted, in send order.
    pub fn sent_messages(&self) -> Vec<(ConversationId, String)> {
        self.lock().sent.clone()
    }

    pub fn push_event(&self, event: XmtpEvent) {
        self.event_tx
            .lock()
            .expect("event sender poisoned")
            .as_ref()
            .expect("event stream closed")
            .send(event)
            .expect("event channel closed");
    }

    /// Close the event stream, ending a listener run once queued events drain.
    pub fn close_events(&self) {
        self.event_tx.lock().expect("event sender poisoned").take();
    }
}

fn find_mut<'a>(state: &'a mut State, id: &ConversationId) -> &'a mut FakeConversation {
    state
        .conversations
        .iter_mut()
        .find(|c| &c.conversation.id == id)
        .expect("unknown conversation id")
}

fn transport(message: &str) -> XmtpError {
    XmtpError::Sdk {
        code: "transport".into(),
        message: message.into(),
    }
}

#[async_trait]
impl XmtpApi for FakeXmtp {
    fn identity(&self) -> &AgentIdentity {
        &self.identity
    }

    async fn can_message(&self, address: &EthAddress) -> Result<bool, XmtpError> {
        Ok(*self.lock().reachable.get(address.as_str()).unwrap_or(&false))
    }

    async fn resolve_inbox_id(&self, address: &EthAddress) -> Result<Option<InboxId>, XmtpError> {
        Ok(self.lock().inbox_by_address.get(address.as_str()).cloned())
    }

    async fn resolve_address(&self, inbox_id: &InboxId) -> Result<Option<String>, XmtpError> {
        Ok(self.lock().address_by_inbox.get(inbox_id).cloned())
    }

    async fn sync_conversations(&self) -> Result<(), XmtpError> {
        if self.lock().fail_sync_all {
            return Err(transport("conversation sync failed"));
        }
        Ok(())
    }

    async fn list_conversations(&self) -> Result<Vec<Conversation>, XmtpError> {
        Ok(self
            .lock()
            .conversations
            .iter()
            .map(|c| c.conversation.clone())
            .collect())
    }

    async fn conversation_members(&self, id: &ConversationId) -> Result<Vec<String>, XmtpError> {
        let state = self.lock();
        let entry = state
            .conversations
            .iter()
            .find(|c| &c.conversation.id == id)
            .ok_or_else(|| transport("unknown conversation"))?;
        if entry.fail_members {
            return Err(transport("member resolution failed"));
        }
        Ok(entry.members.clone())
    }

    async fn create_dm(&self, address: &EthAddress) -> Result<Conversation, XmtpError> {
        let peer = match self.lock().inbox_by_address.get(address.as_str()).cloned() {
            Some(peer) => peer,
            None => {
                return Err(XmtpError::Sdk {
                    code: xmtp_agent::error::CODE_NOT_ON_NETWORK.into(),
                    message: format!("{} is not on the network", address),
                })
            }
        };
        let existing = self.lock().conversations.iter().find_map(|c| {
            (c.conversation.kind == ConversationKind::Dm
                && c.conversation.peer_inbox_id.as_ref() == Some(&peer))
            .then(|| c.conversation.clone())
        });
        if let Some(conversation) = existing {
            return Ok(conversation);
        }
        let id = self.add_dm(peer.as_str());
        let state = self.lock();
        Ok(state
            .conversations
            .iter()
            .find(|c| c.conversation.id == id)
            .expect("just created")
            .conversation
            .clone())
    }

    async fn sync_conversation(&self, id: &ConversationId) -> Result<(), XmtpError> {
        let state = self.lock();
        let entry = state
            .conversations
            .iter()
            .find(|c| &c.conversation.id == id)
            .ok_or_else(|| transport("unknown conversation"))?;
        if entry.fail_sync {
            return Err(transport("conversation sync failed"));
        }
        Ok(())
    }

    async fn list_messages(
        &self,
        id: &ConversationId,
        limit: usize,
    ) -> Result<Vec<Message>, XmtpError> {
        let state = self.lock();
        let entry = state
            .conversations
            .iter()
            .find(|c| &c.conversation.id == id)
            .ok_or_else(|| transport("unknown conversation"))?;
        if entry.fail_sync {
            return Err(transport("message fetch failed"));
        }
        let skip = entry.messages.len().saturating_sub(limit);
        Ok(entry.messages[skip..].to_vec())
    }

    async fn send_text(&self, id: &ConversationId, content: &str) -> Result<String, XmtpError> {
        let mut state = self.lock();
        state.sent.push((id.clone(), content.to_string()));
        state.next_message_id += 1;
        Ok(format!("msg-{}", state.next_message_id))
    }

    async fn consent_state(&self, inbox_id: &InboxId) -> Result<ConsentState, XmtpError> {
        Ok(*self
            .lock()
            .consent
            .get(inbox_id)
            .unwrap_or(&ConsentState::Unknown))
    }

    async fn set_consent_state(
        &self,
        inbox_id: &InboxId,
        state: ConsentState,
    ) -> Result<(), XmtpError> {
        self.lock().consent.insert(inbox_id.clone(), state);
        Ok(())
    }

    async fn subscribe(&self) -> Result<mpsc::UnboundedReceiver<XmtpEvent>, XmtpError> {
        self.event_rx
            .lock()
            .expect("event receiver poisoned")
            .take()
            .ok_or_else(|| transport("event stream already taken"))
    }
}
