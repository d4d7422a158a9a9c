//! Command-line surface.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "brokerctl")]
#[command(about = "Publish to and subscribe through the local broker")]
pub struct Cli {
    /// Broker socket path. Defaults to $BROKER_CLIENT_BASE_DIR/broker.sock or
    /// ~/.broker/broker.sock
    #[arg(long, global = true, env = "BROKER_CLIENT_SOCKET")]
    pub socket: Option<PathBuf>,

    /// Also write logs to brokerctl.log in this directory
    #[arg(long, global = true)]
    pub log_dir: Option<PathBuf>,

    /// Log at debug level
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Publish one message and wait for the broker's ack
    Publish(PublishArgs),

    /// Subscribe and print each message as a JSON line
    Subscribe(SubscribeArgs),
}

#[derive(Args, Debug)]
pub struct PublishArgs {
    #[arg(long)]
    pub channel: String,

    #[arg(long)]
    pub event: String,

    /// Message body, sent as UTF-8 bytes
    #[arg(long, default_value = "")]
    pub payload: String,

    /// Wait for the broker to confirm the upstream publish (publish.ack.v1)
    #[arg(long)]
    pub ack: bool,

    /// Acknowledgement timeout in milliseconds (0 = client default)
    #[arg(long, default_value = "5000")]
    pub timeout_ms: u64,
}

#[derive(Args, Debug)]
pub struct SubscribeArgs {
    /// Subscription id, chosen by the caller
    #[arg(long)]
    pub id: String,

    #[arg(long)]
    pub channel: String,

    /// Only deliver this event name
    #[arg(long)]
    pub event: Option<String>,

    /// Exit after this many messages
    #[arg(long)]
    pub count: Option<usize>,
}
