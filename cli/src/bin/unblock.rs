use clap::Parser;

use xmtp_agent::ConsentState;
use xmtp_cli::{commands, connect, init_tracing, output, parse_address};

#[derive(Debug, Parser)]
#[command(name = "unblock", about = "Unblock an ETH address on XMTP via consent state")]
struct Args {
    /// ETH address to unblock (0x...)
    address: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let args = Args::parse();
    let address = parse_address(&args.address)?;

    let (_config, client) = connect().await?;
    output::print(commands::consent::set(&client, &address, ConsentState::Allowed).await?);
    Ok(())
}
