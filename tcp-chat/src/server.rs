//! Minimal chat server: accept loop plus a one-shot handler per connection.
//!
//! Each connection gets its own task that reads a single line, answers with a
//! fixed reply and hangs up. It exercises the transport and line framing; the
//! full protocol is whatever [`crate::protocol::parse_response`] understands.

use std::{future::Future, net::SocketAddr, sync::Arc};

use anyhow::{Context, Result};
use tokio::{
    io::{AsyncBufRead, AsyncWrite, AsyncWriteExt, BufReader},
    net::{TcpListener, TcpStream},
    select,
};
use tracing::{debug, info, warn};

use crate::protocol::{read_line, write_line};

/// Reply sent to every client when none is configured.
pub const DEFAULT_REPLY: &str = "cmderr this server answers one line and hangs up";

pub struct Server {
    listener: TcpListener,
    reply: Arc<str>,
}

impl Server {
    pub fn new(listener: TcpListener) -> Self {
        Self::with_reply(listener, DEFAULT_REPLY)
    }

    pub fn with_reply(listener: TcpListener, reply: impl Into<Arc<str>>) -> Self {
        Self {
            listener,
            reply: reply.into(),
        }
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accepts clients until `shutdown` resolves.
    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send,
    {
        let Server { listener, reply } = self;
        tokio::pin!(shutdown);

        loop {
            select! {
                _ = &mut shutdown => {
                    info!("server shutting down");
                    break;
                }
                accept_result = listener.accept() => {
                    handle_accept_result(accept_result, &reply);
                }
            }
        }

        Ok(())
    }

    pub async fn run_until_ctrl_c(self) -> Result<()> {
        self.run_until(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                warn!(error = ?err, "failed to install ctrl-c handler");
            }
        })
        .await
    }
}

fn handle_accept_result(result: std::io::Result<(TcpStream, SocketAddr)>, reply: &Arc<str>) {
    match result {
        Ok((stream, peer)) => spawn_connection_handler(stream, peer, reply),
        Err(err) => warn!(error = ?err, "failed to accept connection"),
    }
}

fn spawn_connection_handler(stream: TcpStream, peer: SocketAddr, reply: &Arc<str>) {
    let reply = Arc::clone(reply);
    tokio::spawn(async move {
        debug!(%peer, "client connected");
        if let Err(err) = handle_connection(stream, &reply).await {
            warn!(peer = %peer, error = ?err, "client connection closed with error");
        }
    });
}

async fn handle_connection(stream: TcpStream, reply: &str) -> Result<()> {
    let peer = stream.peer_addr().ok();
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);

    answer_once(&mut reader, &mut writer, reply).await?;
    writer
        .shutdown()
        .await
        .context("failed to close client connection")?;

    debug!(?peer, "client connection closed");
    Ok(())
}

/// Reads one line and writes `reply`. A client that hangs up without sending
/// anything gets no reply.
async fn answer_once<R, W>(reader: &mut R, writer: &mut W, reply: &str) -> Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let Some(line) = read_line(reader).await.context("failed to read client line")? else {
        debug!("client left before sending a line");
        return Ok(None);
    };

    info!(line = %line, "client sent");
    write_line(writer, reply)
        .await
        .context("failed to write reply")?;
    Ok(Some(line))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn answers_the_first_line_with_the_reply() {
        let (client, server) = tokio::io::duplex(1024);
        let (server_read, mut server_write) = tokio::io::split(server);
        let mut server_read = BufReader::new(server_read);
        let (client_read, mut client_write) = tokio::io::split(client);
        let mut client_read = BufReader::new(client_read);

        write_line(&mut client_write, "help")
            .await
            .expect("client write");
        let received = answer_once(&mut server_read, &mut server_write, "cmderr nope")
            .await
            .expect("answer");
        assert_eq!(received.as_deref(), Some("help"));

        let reply = read_line(&mut client_read).await.expect("client read");
        assert_eq!(reply.as_deref(), Some("cmderr nope"));
    }

    #[tokio::test]
    async fn silent_client_gets_no_reply() {
        let (client, server) = tokio::io::duplex(1024);
        let (server_read, mut server_write) = tokio::io::split(server);
        let mut server_read = BufReader::new(server_read);
        drop(client);

        let received = answer_once(&mut server_read, &mut server_write, DEFAULT_REPLY)
            .await
            .expect("answer");
        assert_eq!(received, None);
    }

    #[test]
    fn default_reply_is_a_protocol_line() {
        assert!(matches!(
            crate::protocol::parse_response(DEFAULT_REPLY),
            Some(crate::event::ChatEvent::CommandError { .. })
        ));
    }
}
