use anyhow::{anyhow, bail};
use clap::Parser;

use xmtp_agent::{error::CODE_NOT_ON_NETWORK, EthAddress, XmtpError};
use xmtp_cli::{commands, connect, init_tracing, output, parse_address};

#[derive(Debug, Parser)]
#[command(name = "send", about = "Send an XMTP message to an ETH address")]
struct Args {
    /// Check whether an address is reachable on XMTP instead of sending
    #[arg(long, value_name = "ADDRESS", conflicts_with_all = ["info", "address"])]
    check: Option<String>,

    /// Show this agent's own address and active network
    #[arg(long, conflicts_with = "address")]
    info: bool,

    /// Recipient ETH address (0x...)
    #[arg(required_unless_present_any = ["check", "info"])]
    address: Option<String>,

    /// Message text (remaining words are joined with spaces)
    #[arg(trailing_var_arg = true)]
    message: Vec<String>,
}

enum Action {
    Info,
    Check(EthAddress),
    Send(EthAddress, String),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let args = Args::parse();

    // Arguments are validated in full before anything touches the network.
    let action = if args.info {
        Action::Info
    } else if let Some(raw) = &args.check {
        Action::Check(parse_address(raw)?)
    } else {
        let raw = args
            .address
            .as_deref()
            .ok_or_else(|| anyhow!("usage: send <address> <message>"))?;
        let message = args.message.join(" ");
        if message.is_empty() {
            bail!("usage: send <address> <message>");
        }
        Action::Send(parse_address(raw)?, message)
    };

    let (config, client) = connect().await?;

    match action {
        Action::Info => output::print(commands::send::info(&client, config.env)),
        Action::Check(address) => {
            output::print(commands::send::check(&client, &address, config.env).await?)
        }
        Action::Send(address, message) => {
            match commands::send::send(&client, &address, &message).await {
                Ok(report) => output::print(report),
                Err(err) => {
                    let unreachable = err
                        .downcast_ref::<XmtpError>()
                        .and_then(|e| e.code())
                        == Some(CODE_NOT_ON_NETWORK);
                    if unreachable {
                        eprintln!("hint: the address may not have registered on XMTP yet");
                        eprintln!("hint: check with: send --check {address}");
                    }
                    return Err(err);
                }
            }
        }
    }

    Ok(())
}
