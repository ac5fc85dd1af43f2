use anyhow::Result;
use serde_json::{json, Value};
use tracing::debug;

use xmtp_agent::{time, Conversation, ConversationKind, EthAddress, XmtpApi};

pub const DEFAULT_LIMIT: usize = 20;

/// Full sync, then every known conversation with id, creation time, and a
/// best-effort member list. A member-resolution failure drops that field for
/// the one conversation, never the listing.
pub async fn list<C: XmtpApi>(client: &C) -> Result<Value> {
    client.sync_conversations().await?;
    let conversations = client.list_conversations().await?;

    let mut results = Vec::with_capacity(conversations.len());
    for conversation in &conversations {
        let mut entry = json!({
            "id": conversation.id.as_str(),
            "type": conversation.kind.as_str(),
            "created_at": conversation.created_at_ns.and_then(time::ns_to_iso),
        });
        match client.conversation_members(&conversation.id).await {
            Ok(members) => {
                entry["members"] = json!(members);
            }
            Err(err) => {
                debug!("member resolution failed for {}: {err}", conversation.id);
            }
        }
        results.push(entry);
    }

    Ok(json!({
        "total": results.len(),
        "conversations": results,
    }))
}

/// The most recent `limit` messages exchanged with `address`. An address that
/// never registered, or one we have no conversation with yet, is a benign
/// empty result rather than an error.
pub async fn read<C: XmtpApi>(client: &C, address: &EthAddress, limit: usize) -> Result<Value> {
    client.sync_conversations().await?;

    let inbox_id = match client.resolve_inbox_id(address).await? {
        Some(inbox_id) => inbox_id,
        None => {
            return Ok(empty(address, "Address not found on XMTP"));
        }
    };

    let conversations = client.list_conversations().await?;
    let conversation = match pick_dm(&conversations, &inbox_id) {
        Some(conversation) => conversation,
        None => {
            return Ok(empty(address, "No conversation with this address yet"));
        }
    };

    client.sync_conversation(&conversation.id).await?;
    let messages = client.list_messages(&conversation.id, limit).await?;

    let own_inbox = client.identity().inbox_id.clone();
    let results: Vec<Value> = messages
        .iter()
        .map(|msg| {
            json!({
                "id": msg.id,
                "sender_inbox_id": msg.sender_inbox_id.as_str(),
                "content": msg.content.display(usize::MAX),
                "sent_at": msg.sent_at_ns.and_then(time::ns_to_iso),
                "from_self": msg.sender_inbox_id == own_inbox,
            })
        })
        .collect();

    Ok(json!({
        "with": address.as_str(),
        "count": results.len(),
        "messages": results,
    }))
}

/// The DM whose peer inbox id matches exactly; several candidates for one
/// counterparty are tie-broken by most recent activity, then creation time.
fn pick_dm<'a>(
    conversations: &'a [Conversation],
    peer: &xmtp_agent::InboxId,
) -> Option<&'a Conversation> {
    conversations
        .iter()
        .filter(|c| c.kind == ConversationKind::Dm && c.peer_inbox_id.as_ref() == Some(peer))
        .max_by_key(|c| (c.last_active_ns, c.created_at_ns))
}

fn empty(address: &EthAddress, note: &str) -> Value {
    json!({
        "with": address.as_str(),
        "count": 0,
        "messages": [],
        "note": note,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use xmtp_agent::ConversationKind;
    use xmtp_test_utils::FakeXmtp;

    const PEER: &str = "0x00000000000000000000000000000000000000aa";

    #[tokio::test]
    async fn unknown_address_yields_empty_result_with_note() {
        let fake = FakeXmtp::new("0xagent", "inbox-agent");
        let address = EthAddress::parse(PEER).unwrap();

        let report = read(&fake, &address, DEFAULT_LIMIT).await.unwrap();

        assert_eq!(report["count"], 0);
        assert_eq!(report["messages"].as_array().unwrap().len(), 0);
        assert!(report["note"].as_str().unwrap().contains("not found"));
    }

    #[tokio::test]
    async fn registered_peer_without_conversation_is_also_benign() {
        let fake = FakeXmtp::new("0xagent", "inbox-agent");
        fake.add_peer(PEER, "inbox-peer");
        let address = EthAddress::parse(PEER).unwrap();

        let report = read(&fake, &address, DEFAULT_LIMIT).await.unwrap();

        assert_eq!(report["count"], 0);
        assert!(report["note"].as_str().unwrap().contains("No conversation"));
    }

    #[tokio::test]
    async fn read_returns_recent_messages_with_self_flags() {
        let fake = FakeXmtp::new("0xagent", "inbox-agent");
        fake.add_peer(PEER, "inbox-peer");
        let dm = fake.add_dm("inbox-peer");
        fake.push_message(&dm, "inbox-peer", "hello", Some(1_000_000_000));
        fake.push_message(&dm, "inbox-agent", "hi back", Some(2_000_000_000));
        let address = EthAddress::parse(PEER).unwrap();

        let report = read(&fake, &address, DEFAULT_LIMIT).await.unwrap();

        assert_eq!(report["count"], 2);
        let messages = report["messages"].as_array().unwrap();
        assert_eq!(messages[0]["from_self"], false);
        assert_eq!(messages[1]["from_self"], true);
        assert_eq!(messages[0]["content"], "hello");
        assert!(messages[0]["sent_at"].as_str().unwrap().starts_with("1970-01-01T00:00:01"));
    }

    #[tokio::test]
    async fn read_honors_the_limit_keeping_most_recent() {
        let fake = FakeXmtp::new("0xagent", "inbox-agent");
        fake.add_peer(PEER, "inbox-peer");
        let dm = fake.add_dm("inbox-peer");
        for i in 0..30 {
            fake.push_message(&dm, "inbox-peer", &format!("msg {i}"), Some(i * 1_000_000));
        }
        let address = EthAddress::parse(PEER).unwrap();

        let report = read(&fake, &address, 5).await.unwrap();

        assert_eq!(report["count"], 5);
        let messages = report["messages"].as_array().unwrap();
        assert_eq!(messages[0]["content"], "msg 25");
        assert_eq!(messages[4]["content"], "msg 29");
    }

    #[tokio::test]
    async fn most_recently_active_dm_wins_among_candidates() {
        let fake = FakeXmtp::new("0xagent", "inbox-agent");
        fake.add_peer(PEER, "inbox-peer");
        let stale = fake.add_dm("inbox-peer");
        let active = fake.add_dm("inbox-peer");
        fake.push_message(&stale, "inbox-peer", "old", Some(1_000_000_000));
        fake.push_message(&active, "inbox-peer", "new", Some(9_000_000_000));
        let address = EthAddress::parse(PEER).unwrap();

        let report = read(&fake, &address, DEFAULT_LIMIT).await.unwrap();

        assert_eq!(report["count"], 1);
        assert_eq!(report["messages"][0]["content"], "new");
    }

    #[tokio::test]
    async fn list_includes_members_best_effort() {
        let fake = FakeXmtp::new("0xagent", "inbox-agent");
        let a = fake.add_conversation(ConversationKind::Dm, Some("inbox-peer"), Some(1_000_000));
        let b = fake.add_conversation(ConversationKind::Group, None, Some(2_000_000));
        fake.set_members(&a, &["0xagent", PEER]);
        fake.fail_members(&b);

        let report = list(&fake).await.unwrap();

        assert_eq!(report["total"], 2);
        let conversations = report["conversations"].as_array().unwrap();
        assert_eq!(conversations[0]["type"], "dm");
        assert_eq!(conversations[0]["members"].as_array().unwrap().len(), 2);
        // The failed one keeps its entry but omits the members field.
        assert_eq!(conversations[1]["type"], "group");
        assert!(conversations[1].get("members").is_none());
        assert!(conversations[1]["created_at"].as_str().is_some());
    }
}
