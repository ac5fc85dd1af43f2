use clap::Parser;

use xmtp_cli::{commands, connect, init_tracing, output};

#[derive(Debug, Parser)]
#[command(
    name = "poll",
    about = "One-shot check for new XMTP messages, for cron-style invocation"
)]
struct Args {
    /// Window size in minutes
    #[arg(long, default_value_t = commands::poll::DEFAULT_SINCE_MINUTES)]
    since: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let args = Args::parse();

    let (_config, client) = connect().await?;
    output::print(commands::poll::poll(&client, args.since).await?);
    Ok(())
}
