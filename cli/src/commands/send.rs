use anyhow::Result;
use serde_json::{json, Value};

use xmtp_agent::{time, EthAddress, MessageContent, XmtpApi, XmtpEnv};

/// Previews over this many characters are cut with an ellipsis marker.
const PREVIEW_CHARS: usize = 100;

/// Open (or create) the DM with `address` and transmit the full text. The
/// reported preview is truncated; the payload on the wire never is.
pub async fn send<C: XmtpApi>(client: &C, address: &EthAddress, message: &str) -> Result<Value> {
    let conversation = client.create_dm(address).await?;
    client.send_text(&conversation.id, message).await?;

    Ok(json!({
        "status": "sent",
        "to": address.as_str(),
        "from": client.identity().address,
        "message_preview": MessageContent::Text(message.to_string()).display(PREVIEW_CHARS),
        "timestamp": time::now_iso(),
    }))
}

/// Network-wide reachability check, valid whether or not the address has ever
/// been messaged.
pub async fn check<C: XmtpApi>(client: &C, address: &EthAddress, env: XmtpEnv) -> Result<Value> {
    let reachable = client.can_message(address).await?;
    Ok(json!({
        "address": address.as_str(),
        "reachable": reachable,
        "network": env.as_str(),
    }))
}

/// This agent's own address and active network. No network round trip.
pub fn info<C: XmtpApi>(client: &C, env: XmtpEnv) -> Value {
    let identity = client.identity();
    json!({
        "address": identity.address,
        "inbox_id": identity.inbox_id.as_str(),
        "network": env.as_str(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use xmtp_test_utils::FakeXmtp;

    const PEER: &str = "0x00000000000000000000000000000000000000aa";

    fn fake_with_peer() -> FakeXmtp {
        let fake = FakeXmtp::new("0xagent", "inbox-agent");
        fake.add_peer(PEER, "inbox-peer");
        fake
    }

    #[tokio::test]
    async fn send_reports_truncated_preview_but_transmits_full_text() {
        let fake = fake_with_peer();
        let address = EthAddress::parse(PEER).unwrap();
        let message: String = "m".repeat(301);

        let report = send(&fake, &address, &message).await.unwrap();

        let preview = report["message_preview"].as_str().unwrap();
        assert_eq!(preview.chars().count(), 103);
        assert!(preview.ends_with("..."));

        let sent = fake.sent_messages();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].1, message);
    }

    #[tokio::test]
    async fn send_keeps_short_messages_intact_in_preview() {
        let fake = fake_with_peer();
        let address = EthAddress::parse(PEER).unwrap();

        let report = send(&fake, &address, "hello there").await.unwrap();

        assert_eq!(report["status"], "sent");
        assert_eq!(report["message_preview"], "hello there");
        assert_eq!(report["to"], PEER);
        assert_eq!(report["from"], "0xagent");
    }

    #[tokio::test]
    async fn send_to_unregistered_address_is_a_distinguishable_error() {
        let fake = FakeXmtp::new("0xagent", "inbox-agent");
        let address = EthAddress::parse(PEER).unwrap();

        let err = send(&fake, &address, "hi").await.unwrap_err();
        let xmtp_err = err.downcast_ref::<xmtp_agent::XmtpError>().unwrap();
        assert_eq!(xmtp_err.code(), Some(xmtp_agent::error::CODE_NOT_ON_NETWORK));
        assert!(fake.sent_messages().is_empty());
    }

    #[tokio::test]
    async fn send_reuses_the_existing_dm() {
        let fake = fake_with_peer();
        let existing = fake.add_dm("inbox-peer");
        let address = EthAddress::parse(PEER).unwrap();

        send(&fake, &address, "hi").await.unwrap();

        assert_eq!(fake.sent_messages()[0].0, existing);
    }

    #[tokio::test]
    async fn check_reports_reachability_either_way() {
        let fake = fake_with_peer();
        let known = EthAddress::parse(PEER).unwrap();
        let unknown =
            EthAddress::parse("0x00000000000000000000000000000000000000bb").unwrap();

        let report = check(&fake, &known, XmtpEnv::Dev).await.unwrap();
        assert_eq!(report["reachable"], true);
        assert_eq!(report["network"], "dev");

        let report = check(&fake, &unknown, XmtpEnv::Dev).await.unwrap();
        assert_eq!(report["reachable"], false);
    }

    #[tokio::test]
    async fn info_reports_own_identity() {
        let fake = FakeXmtp::new("0xagent", "inbox-agent");
        let report = info(&fake, XmtpEnv::Production);
        assert_eq!(report["address"], "0xagent");
        assert_eq!(report["inbox_id"], "inbox-agent");
        assert_eq!(report["network"], "production");
    }
}
