use anyhow::anyhow;
use clap::Parser;

use xmtp_cli::{commands, connect, init_tracing, output, parse_address};

#[derive(Debug, Parser)]
#[command(name = "history", about = "Query XMTP conversation history")]
struct Args {
    /// List all conversations instead of reading one
    #[arg(long, conflicts_with = "address")]
    list: bool,

    /// Counterparty ETH address (0x...)
    #[arg(required_unless_present = "list")]
    address: Option<String>,

    /// Max messages to return
    #[arg(long, default_value_t = commands::history::DEFAULT_LIMIT)]
    limit: usize,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let args = Args::parse();

    if args.list {
        let (_config, client) = connect().await?;
        output::print(commands::history::list(&client).await?);
        return Ok(());
    }

    let raw = args
        .address
        .as_deref()
        .ok_or_else(|| anyhow!("usage: history <address> [--limit N]"))?;
    let address = parse_address(raw)?;

    let (_config, client) = connect().await?;
    output::print(commands::history::read(&client, &address, args.limit).await?);
    Ok(())
}
