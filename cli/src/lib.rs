//! Shared glue for the command binaries.
//!
//! Each binary is a thin clap parser over the matching module in
//! [`commands`]; command logic is generic over [`xmtp_agent::XmtpApi`] so it
//! runs unchanged against the sidecar client in production and the in-memory
//! fake in tests.

pub mod commands;
pub mod output;

use anyhow::Context;
use tracing::info;

use xmtp_agent::{Config, EthAddress, SidecarXmtp, XmtpApi};

/// stderr diagnostics; stdout stays reserved for the command's JSON result.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();
}

/// Load configuration and bring up the connected client. Fatal on missing
/// secrets or a failed handshake, before which no output has gone to stdout.
pub async fn connect() -> anyhow::Result<(Config, SidecarXmtp)> {
    let config = Config::from_env()?;
    config.ensure_db_dir()?;
    info!("connecting to XMTP network ({})...", config.env.as_str());
    let client = SidecarXmtp::connect(&config)
        .await
        .context("connect to XMTP")?;
    info!("connected as {}", client.identity().address);
    Ok((config, client))
}

/// Validate an address argument before any network activity.
pub fn parse_address(raw: &str) -> anyhow::Result<EthAddress> {
    EthAddress::parse(raw).map_err(Into::into)
}
