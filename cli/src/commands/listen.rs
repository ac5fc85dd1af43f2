use std::future::Future;
use std::io::Write;

use anyhow::Result;
use serde::Serialize;
use tracing::info;

use xmtp_agent::{time, XmtpApi, XmtpEnv, XmtpEvent};

/// One line of listener output. JSON mode serializes this directly; human
/// mode renders the same fields through [`render_human`].
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ListenerRecord {
    Started {
        address: String,
        network: String,
        timestamp: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        debug_url: Option<String>,
    },
    Message {
        from: String,
        from_inbox_id: String,
        content: String,
        conversation_id: String,
        timestamp: String,
    },
    NewDm {
        conversation_id: String,
        timestamp: String,
    },
    NewGroup {
        conversation_id: String,
        timestamp: String,
    },
    Error {
        error: String,
        timestamp: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Json,
    Human,
}

pub fn render_human(record: &ListenerRecord) -> String {
    match record {
        ListenerRecord::Started {
            address,
            network,
            timestamp,
            debug_url,
        } => {
            let mut text = format!(
                "listener started\n  address: {address}\n  network: {network}\n  time:    {timestamp}\n"
            );
            if let Some(url) = debug_url {
                text.push_str(&format!("  debug:   {url}\n"));
            }
            text.push_str("waiting for messages...");
            text
        }
        ListenerRecord::Message {
            from,
            from_inbox_id,
            content,
            conversation_id,
            timestamp,
        } => format!(
            "[{timestamp}] message from {from} (inbox {from_inbox_id}, conversation {conversation_id}):\n  {content}"
        ),
        ListenerRecord::NewDm {
            conversation_id,
            timestamp,
        } => format!("[{timestamp}] new dm conversation {conversation_id}"),
        ListenerRecord::NewGroup {
            conversation_id,
            timestamp,
        } => format!("[{timestamp}] new group conversation {conversation_id}"),
        ListenerRecord::Error { error, timestamp } => format!("[{timestamp}] error: {error}"),
    }
}

/// Long-running event tail. Emits records until the shutdown future resolves
/// (OS signal) or the backend's event stream ends; either way the exit is
/// clean. Per-event trouble becomes an `error` record, never a crash.
pub async fn run<C, W, F>(
    client: &C,
    env: XmtpEnv,
    mode: OutputMode,
    out: &mut W,
    shutdown: F,
) -> Result<()>
where
    C: XmtpApi,
    W: Write,
    F: Future<Output = &'static str>,
{
    let mut events = client.subscribe().await?;

    let identity = client.identity();
    emit(
        out,
        mode,
        &ListenerRecord::Started {
            address: identity.address.clone(),
            network: env.as_str().to_string(),
            timestamp: time::now_iso(),
            debug_url: identity.debug_url.clone(),
        },
    )?;

    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            event = events.recv() => {
                match event {
                    Some(event) => {
                        if let Some(record) = record_for_event(client, event).await {
                            emit(out, mode, &record)?;
                        }
                    }
                    None => {
                        info!("event stream ended");
                        return Ok(());
                    }
                }
            }
            reason = &mut shutdown => {
                info!("listener stopped ({reason})");
                return Ok(());
            }
        }
    }
}

async fn record_for_event<C: XmtpApi>(client: &C, event: XmtpEvent) -> Option<ListenerRecord> {
    match event {
        XmtpEvent::Message {
            conversation_id,
            message,
        } => {
            if message.sender_inbox_id == client.identity().inbox_id {
                return None;
            }
            // Two-step resolution: display address when the inbox state has
            // one, raw inbox id otherwise.
            let from = match client.resolve_address(&message.sender_inbox_id).await {
                Ok(Some(address)) => address,
                Ok(None) | Err(_) => message.sender_inbox_id.to_string(),
            };
            Some(ListenerRecord::Message {
                from,
                from_inbox_id: message.sender_inbox_id.to_string(),
                content: message.content.display(usize::MAX),
                conversation_id: conversation_id.to_string(),
                timestamp: time::now_iso(),
            })
        }
        XmtpEvent::NewDm { conversation_id } => Some(ListenerRecord::NewDm {
            conversation_id: conversation_id.to_string(),
            timestamp: time::now_iso(),
        }),
        XmtpEvent::NewGroup { conversation_id } => Some(ListenerRecord::NewGroup {
            conversation_id: conversation_id.to_string(),
            timestamp: time::now_iso(),
        }),
        XmtpEvent::Error { message } => Some(ListenerRecord::Error {
            error: message,
            timestamp: time::now_iso(),
        }),
    }
}

fn emit<W: Write>(out: &mut W, mode: OutputMode, record: &ListenerRecord) -> Result<()> {
    match mode {
        OutputMode::Json => {
            let line = serde_json::to_string(record).expect("json encode");
            writeln!(out, "{line}")?;
        }
        OutputMode::Human => {
            writeln!(out, "{}", render_human(record))?;
        }
    }
    out.flush()?;
    Ok(())
}
