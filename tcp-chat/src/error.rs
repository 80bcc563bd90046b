use std::io;

use thiserror::Error;

/// Why a [`ChatClient`](crate::client::ChatClient) operation failed.
///
/// Server-reported problems (`loginerr`, `msgerr`, `cmderr`) are not errors
/// here; they arrive as [`ChatEvent`](crate::event::ChatEvent)s.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("error connecting to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("timed out connecting to {addr}")]
    ConnectTimeout { addr: String },

    #[error("already connected or connecting to a server")]
    AlreadyConnected,

    #[error("connection was closed; create a new client to reconnect")]
    SessionClosed,

    #[error("cannot send command as client is not connected to a server")]
    NotConnected,

    #[error("{0} was empty or blank")]
    Blank(&'static str),

    #[error("recipient '{0}' must be a single username without spaces")]
    InvalidRecipient(String),

    #[error("command must fit on a single line")]
    MultiLine,

    #[error("error sending command to server: {0}")]
    Send(#[source] io::Error),
}
