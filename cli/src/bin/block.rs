use anyhow::anyhow;
use clap::Parser;

use xmtp_agent::ConsentState;
use xmtp_cli::{commands, connect, init_tracing, output, parse_address};

#[derive(Debug, Parser)]
#[command(name = "block", about = "Block an ETH address on XMTP via consent state")]
struct Args {
    /// Report the current consent state instead of blocking
    #[arg(long, value_name = "ADDRESS", conflicts_with = "address")]
    status: Option<String>,

    /// ETH address to block (0x...)
    #[arg(required_unless_present = "status")]
    address: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let args = Args::parse();

    if let Some(raw) = &args.status {
        let address = parse_address(raw)?;
        let (_config, client) = connect().await?;
        output::print(commands::consent::status(&client, &address).await?);
        return Ok(());
    }

    let raw = args
        .address
        .as_deref()
        .ok_or_else(|| anyhow!("usage: block <address>"))?;
    let address = parse_address(raw)?;

    let (_config, client) = connect().await?;
    output::print(commands::consent::set(&client, &address, ConsentState::Denied).await?);
    Ok(())
}
