//! Line-based chat over a single TCP connection.
//!
//! The wire format is one command or response per line (see [`protocol`]).
//! Each module owns one concern:
//!
//! - [`client`] holds the connection, sends commands and runs the dispatch
//!   task that turns server lines into events.
//! - [`event`] defines [`event::ChatEvent`], the [`event::ChatListener`]
//!   observer trait and the registry that fans events out.
//! - [`protocol`] encodes client commands, classifies server lines and
//!   provides async line read/write helpers.
//! - [`message`] is the chat message value handed to listeners.
//! - [`error`] lists the ways a client operation can fail locally.
//! - [`server`] is a minimal accept-loop server used to exercise the transport.
//! - [`cli`] and [`console`] back the `tcp-chat` binary.
//!
//! Integration tests drive [`client::ChatClient`] against scripted servers
//! and the binary against itself.

pub mod cli;
pub mod client;
pub mod console;
pub mod error;
pub mod event;
pub mod message;
pub mod protocol;
pub mod server;
