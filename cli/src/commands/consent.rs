use anyhow::Result;
use serde_json::{json, Value};

use xmtp_agent::{ConsentState, EthAddress, XmtpApi};

/// Set the consent flag for the identity behind `address`. An address that
/// never registered is a normal outcome, not an error. Idempotent: repeating
/// the same mutation reports the same final state.
pub async fn set<C: XmtpApi>(
    client: &C,
    address: &EthAddress,
    state: ConsentState,
) -> Result<Value> {
    let inbox_id = match client.resolve_inbox_id(address).await? {
        Some(inbox_id) => inbox_id,
        None => return Ok(not_found(address)),
    };

    client.set_consent_state(&inbox_id, state).await?;

    let status = match state {
        ConsentState::Denied => "blocked",
        ConsentState::Allowed => "unblocked",
        ConsentState::Unknown => "updated",
    };
    Ok(json!({
        "status": status,
        "address": address.as_str(),
        "inbox_id": inbox_id.as_str(),
        "consent_state": state.label(),
    }))
}

/// Read the consent flag without mutating it.
pub async fn status<C: XmtpApi>(client: &C, address: &EthAddress) -> Result<Value> {
    let inbox_id = match client.resolve_inbox_id(address).await? {
        Some(inbox_id) => inbox_id,
        None => return Ok(not_found(address)),
    };

    let state = client.consent_state(&inbox_id).await?;
    Ok(json!({
        "address": address.as_str(),
        "inbox_id": inbox_id.as_str(),
        "consent_state": state.label(),
    }))
}

fn not_found(address: &EthAddress) -> Value {
    json!({
        "address": address.as_str(),
        "status": "not_found",
        "note": "Address not found on XMTP",
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
    async fn unregistered_address_reports_not_found() {
        let fake = FakeXmtp::new("0xagent", "inbox-agent");
        let address = EthAddress::parse(PEER).unwrap();

        for report in [
            set(&fake, &address, ConsentState::Denied).await.unwrap(),
            status(&fake, &address).await.unwrap(),
        ] {
            assert_eq!(report["status"], "not_found");
            assert_eq!(report["address"], PEER);
        }
    }

    #[tokio::test]
    async fn block_is_idempotent() {
        let fake = fake_with_peer();
        let address = EthAddress::parse(PEER).unwrap();

        let first = set(&fake, &address, ConsentState::Denied).await.unwrap();
        let second = set(&fake, &address, ConsentState::Denied).await.unwrap();

        for report in [first, second] {
            assert_eq!(report["status"], "blocked");
            assert_eq!(report["consent_state"], "Denied");
            assert_eq!(report["inbox_id"], "inbox-peer");
        }
    }

    #[tokio::test]
    async fn unblock_after_block_yields_allowed() {
        let fake = fake_with_peer();
        let address = EthAddress::parse(PEER).unwrap();

        set(&fake, &address, ConsentState::Denied).await.unwrap();
        let report = set(&fake, &address, ConsentState::Allowed).await.unwrap();
        assert_eq!(report["status"], "unblocked");
        assert_eq!(report["consent_state"], "Allowed");

        let report = status(&fake, &address).await.unwrap();
        assert_eq!(report["consent_state"], "Allowed");
    }

    #[tokio::test]
    async fn status_on_untouched_identity_is_unknown() {
        let fake = fake_with_peer();
        let address = EthAddress::parse(PEER).unwrap();

        let report = status(&fake, &address).await.unwrap();

        assert_eq!(report["consent_state"], "Unknown");
        assert_eq!(report["inbox_id"], "inbox-peer");
    }
}
