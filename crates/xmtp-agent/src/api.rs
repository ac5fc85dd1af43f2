use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::XmtpError;
use crate::types::{
    AgentIdentity, ConsentState, Conversation, ConversationId, EthAddress, InboxId, Message,
    XmtpEvent,
};

/// The capability set this tooling needs from the XMTP client library.
///
/// Production commands run against [`crate::SidecarXmtp`]; tests run against
/// the in-memory fake from the `xmtp-test-utils` crate. Everything here maps
/// one-to-one onto an SDK operation, so implementations stay thin.
#[async_trait]
pub trait XmtpApi: Send + Sync {
    /// This agent's own identity, fixed at connect time.
    fn identity(&self) -> &AgentIdentity;

    /// Network-wide reachability check for one address.
    async fn can_message(&self, address: &EthAddress) -> Result<bool, XmtpError>;

    /// Resolve an address to its inbox id. `None` means the address has never
    /// registered on the network, which is a normal outcome, not an error.
    async fn resolve_inbox_id(&self, address: &EthAddress) -> Result<Option<InboxId>, XmtpError>;

    /// Resolve an inbox id back to a display address, when the inbox state
    /// carries one.
    async fn resolve_address(&self, inbox_id: &InboxId) -> Result<Option<String>, XmtpError>;

    /// Refresh the full conversation list from the network.
    async fn sync_conversations(&self) -> Result<(), XmtpError>;

    async fn list_conversations(&self) -> Result<Vec<Conversation>, XmtpError>;

    /// Best-effort member address list for one conversation.
    async fn conversation_members(&self, id: &ConversationId) -> Result<Vec<String>, XmtpError>;

    /// Open the DM with `address`, creating it on first contact.
    async fn create_dm(&self, address: &EthAddress) -> Result<Conversation, XmtpError>;

    /// Refresh one conversation's local state from the network.
    async fn sync_conversation(&self, id: &ConversationId) -> Result<(), XmtpError>;

    /// Up to `limit` most recent messages, in the order the backend yields
    /// them.
    async fn list_messages(
        &self,
        id: &ConversationId,
        limit: usize,
    ) -> Result<Vec<Message>, XmtpError>;

    /// Transmit a text payload; returns the delivery identifier.
    async fn send_text(&self, id: &ConversationId, content: &str) -> Result<String, XmtpError>;

    async fn consent_state(&self, inbox_id: &InboxId) -> Result<ConsentState, XmtpError>;

    async fn set_consent_state(
        &self,
        inbox_id: &InboxId,
        state: ConsentState,
    ) -> Result<(), XmtpError>;

    /// Start the event subscription and hand over the stream. The channel
    /// closes when the backend stops producing events.
    async fn subscribe(&self) -> Result<mpsc::UnboundedReceiver<XmtpEvent>, XmtpError>;
}
