use anyhow::{Context, Result};
use serde_json::{json, Value};
use tracing::debug;

use xmtp_agent::{time, XmtpApi};

pub const DEFAULT_SINCE_MINUTES: u64 = 15;

/// How many recent messages to inspect per conversation. The window is short,
/// so a small bound keeps the cron-style run cheap.
const PER_CONVERSATION_FETCH: usize = 10;

/// Cutoff in nanoseconds for a window of `since_minutes` ending at `now_ms`.
fn cutoff_ns(now_ms: i64, since_minutes: u64) -> i64 {
    (now_ms - (since_minutes as i64) * 60_000) * 1_000_000
}

/// Window test: strictly after the cutoff counts as new; exactly at the
/// cutoff (or missing) does not.
fn is_new(sent_at_ns: Option<i64>, cutoff: i64) -> bool {
    matches!(sent_at_ns, Some(ns) if ns > cutoff)
}

/// One-shot new-message report for cron-style invocation. The top-level sync
/// failing is fatal; a single conversation failing is skipped.
pub async fn poll<C: XmtpApi>(client: &C, since_minutes: u64) -> Result<Value> {
    poll_at(client, since_minutes, time::now_millis()).await
}

pub(crate) async fn poll_at<C: XmtpApi>(
    client: &C,
    since_minutes: u64,
    now_ms: i64,
) -> Result<Value> {
    client
        .sync_conversations()
        .await
        .context("sync conversations")?;
    let conversations = client.list_conversations().await.context("list conversations")?;

    let cutoff = cutoff_ns(now_ms, since_minutes);
    let own_inbox = client.identity().inbox_id.clone();
    let mut collected: Vec<(i64, Value)> = Vec::new();

    for conversation in &conversations {
        let messages = match fetch_recent(client, &conversation.id).await {
            Ok(messages) => messages,
            Err(err) => {
                // One conversation failing must not abort the others.
                debug!("skipping conversation {}: {err}", conversation.id);
                continue;
            }
        };

        for msg in messages {
            if msg.sender_inbox_id == own_inbox {
                continue;
            }
            if !is_new(msg.sent_at_ns, cutoff) {
                continue;
            }

            let from = match client.resolve_address(&msg.sender_inbox_id).await {
                Ok(Some(address)) => address,
                // Fall back to the raw inbox id when no address resolves.
                Ok(None) | Err(_) => msg.sender_inbox_id.to_string(),
            };

            let ns = msg.sent_at_ns.unwrap_or(i64::MIN);
            collected.push((
                ns,
                json!({
                    "from": from,
                    "content": msg.content.display(200),
                    "conversation_id": conversation.id.as_str(),
                    "timestamp": msg.sent_at_ns.and_then(time::ns_to_iso),
                }),
            ));
        }
    }

    // Newest first.
    collected.sort_by(|a, b| b.0.cmp(&a.0));
    let messages: Vec<Value> = collected.into_iter().map(|(_, v)| v).collect();

    Ok(json!({
        "found": !messages.is_empty(),
        "count": messages.len(),
        "messages": messages,
        "since_minutes": since_minutes,
        "agent_address": client.identity().address,
        "checked_at": time::now_iso(),
    }))
}

async fn fetch_recent<C: XmtpApi>(
    client: &C,
    id: &xmtp_agent::ConversationId,
) -> Result<Vec<xmtp_agent::Message>, xmtp_agent::XmtpError> {
    client.sync_conversation(id).await?;
    client.list_messages(id, PER_CONVERSATION_FETCH).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use xmtp_agent::{ConversationKind, MessageContent};
    use xmtp_test_utils::FakeXmtp;

    const PEER: &str = "0x00000000000000000000000000000000000000aa";
    const NOW_MS: i64 = 1_700_000_000_000;

    fn minutes_ago_ns(minutes: i64) -> i64 {
        (NOW_MS - minutes * 60_000) * 1_000_000
    }

    fn fake_with_dm() -> (FakeXmtp, xmtp_agent::ConversationId) {
        let fake = FakeXmtp::new("0xagent", "inbox-agent");
        fake.add_peer(PEER, "inbox-peer");
        let dm = fake.add_dm("inbox-peer");
        (fake, dm)
    }

    #[test]
    fn window_boundary_is_exclusive_at_the_cutoff() {
        let cutoff = cutoff_ns(NOW_MS, 15);
        assert!(!is_new(Some(cutoff), cutoff));
        assert!(is_new(Some(cutoff + 1), cutoff));
        assert!(!is_new(Some(cutoff - 1), cutoff));
        assert!(!is_new(None, cutoff));
    }

    #[tokio::test]
    async fn poll_includes_only_messages_inside_the_window() {
        let (fake, dm) = fake_with_dm();
        fake.push_message(&dm, "inbox-peer", "too old", Some(minutes_ago_ns(30)));
        fake.push_message(&dm, "inbox-peer", "recent", Some(minutes_ago_ns(5)));

        let report = poll_at(&fake, 15, NOW_MS).await.unwrap();

        assert_eq!(report["found"], true);
        assert_eq!(report["count"], 1);
        assert_eq!(report["messages"][0]["content"], "recent");
        assert_eq!(report["messages"][0]["from"], PEER);
        assert_eq!(report["since_minutes"], 15);
        assert_eq!(report["agent_address"], "0xagent");
    }

    #[tokio::test]
    async fn poll_excludes_own_messages_regardless_of_timestamp() {
        let (fake, dm) = fake_with_dm();
        fake.push_message(&dm, "inbox-agent", "mine", Some(minutes_ago_ns(1)));

        let report = poll_at(&fake, 15, NOW_MS).await.unwrap();

        assert_eq!(report["found"], false);
        assert_eq!(report["count"], 0);
    }

    #[tokio::test]
    async fn poll_survives_one_failing_conversation() {
        let fake = FakeXmtp::new("0xagent", "inbox-agent");
        fake.add_peer(PEER, "inbox-peer");
        let first = fake.add_dm("inbox-peer");
        let second = fake.add_conversation(ConversationKind::Group, None, None);
        let third = fake.add_conversation(ConversationKind::Group, None, None);
        fake.push_message(&first, "inbox-peer", "one", Some(minutes_ago_ns(3)));
        fake.push_message(&second, "inbox-peer", "lost", Some(minutes_ago_ns(2)));
        fake.push_message(&third, "inbox-peer", "three", Some(minutes_ago_ns(1)));
        fake.fail_conversation_sync(&second);

        let report = poll_at(&fake, 15, NOW_MS).await.unwrap();

        assert_eq!(report["count"], 2);
        let contents: Vec<&str> = report["messages"]
            .as_array()
            .unwrap()
            .iter()
            .map(|m| m["content"].as_str().unwrap())
            .collect();
        assert_eq!(contents, vec!["three", "one"]);
    }

    #[tokio::test]
    async fn poll_sorts_newest_first() {
        let (fake, dm) = fake_with_dm();
        fake.push_message(&dm, "inbox-peer", "older", Some(minutes_ago_ns(10)));
        fake.push_message(&dm, "inbox-peer", "newer", Some(minutes_ago_ns(2)));

        let report = poll_at(&fake, 15, NOW_MS).await.unwrap();

        assert_eq!(report["messages"][0]["content"], "newer");
        assert_eq!(report["messages"][1]["content"], "older");
    }

    #[tokio::test]
    async fn poll_falls_back_to_inbox_id_when_address_does_not_resolve() {
        let fake = FakeXmtp::new("0xagent", "inbox-agent");
        fake.add_unresolvable_peer(PEER, "inbox-peer");
        let dm = fake.add_dm("inbox-peer");
        fake.push_message(&dm, "inbox-peer", "hi", Some(minutes_ago_ns(1)));

        let report = poll_at(&fake, 15, NOW_MS).await.unwrap();

        assert_eq!(report["messages"][0]["from"], "inbox-peer");
    }

    #[tokio::test]
    async fn poll_renders_non_text_content_as_placeholder() {
        let (fake, dm) = fake_with_dm();
        fake.push_content(&dm, "inbox-peer", MessageContent::Other, Some(minutes_ago_ns(1)));

        let report = poll_at(&fake, 15, NOW_MS).await.unwrap();

        assert_eq!(report["messages"][0]["content"], "[non-text content]");
    }

    #[tokio::test]
    async fn failing_top_level_sync_is_fatal() {
        let (fake, _dm) = fake_with_dm();
        fake.fail_sync_all();

        assert!(poll_at(&fake, 15, NOW_MS).await.is_err());
    }
}
