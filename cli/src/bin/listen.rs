use anyhow::Context;
use clap::Parser;
use tokio::signal::unix::{signal, SignalKind};

use xmtp_cli::commands::listen::OutputMode;
use xmtp_cli::{commands, connect, init_tracing};

#[derive(Debug, Parser)]
#[command(
    name = "listen",
    about = "Listen for incoming XMTP events and emit one record per event"
)]
struct Args {
    /// One JSON object per line (default)
    #[arg(long, conflicts_with = "human")]
    json: bool,

    /// Human-readable rendering of the same event stream
    #[arg(long)]
    human: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let args = Args::parse();
    let mode = if args.human {
        OutputMode::Human
    } else {
        OutputMode::Json
    };

    let (config, client) = connect().await?;

    let mut term = signal(SignalKind::terminate()).context("install SIGTERM handler")?;
    let shutdown = async move {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => "SIGINT",
            _ = term.recv() => "SIGTERM",
        }
    };

    let mut stdout = std::io::stdout();
    commands::listen::run(&client, config.env, mode, &mut stdout, shutdown).await
}
