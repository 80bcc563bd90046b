use std::net::SocketAddr;

use clap::{Args, Parser, Subcommand};

use crate::server::DEFAULT_REPLY;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the minimal server that answers each client once.
    Server(ServerArgs),
    /// Connect to a chat server and chat from the terminal.
    Client(ClientArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ServerArgs {
    /// Socket address the server should bind to. Use port 0 for an ephemeral port.
    #[arg(long, default_value = "127.0.0.1:1300")]
    pub listen: SocketAddr,

    /// Line sent back to every client.
    #[arg(long, default_value = DEFAULT_REPLY)]
    pub reply: String,
}

#[derive(Args, Debug, Clone)]
pub struct ClientArgs {
    /// Host name or IP address of the chat server.
    #[arg(long, default_value = "localhost")]
    pub host: String,

    /// TCP port of the chat server.
    #[arg(long, default_value_t = 1300)]
    pub port: u16,

    /// Log in with this username right after connecting.
    #[arg(long)]
    pub username: Option<String>,

    /// Refresh the user list every SECS seconds.
    #[arg(long, value_name = "SECS")]
    pub poll_users: Option<u64>,

    /// Give up connecting after SECS seconds.
    #[arg(long, value_name = "SECS")]
    pub connect_timeout: Option<u64>,

    /// Print events as JSON lines instead of text.
    #[arg(long)]
    pub json: bool,
}
