//! Client side of the chat protocol.
//!
//! [`ChatClient`] owns one TCP connection. Commands are written from whatever
//! task calls the send methods; responses are read by a dispatch task that
//! `connect` spawns and that lives exactly as long as the connection. That
//! task is the only place listeners are called from.
//!
//! A client goes `Idle -> Connecting -> Connected -> Closed` and never back,
//! except that a failed connect returns to `Idle`. To reconnect after a
//! close, build a new client.

use std::{
    io,
    net::SocketAddr,
    sync::{
        Arc, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use tokio::{
    io::{AsyncWriteExt, BufReader},
    net::{
        TcpStream,
        tcp::{OwnedReadHalf, OwnedWriteHalf},
    },
    select,
    sync::watch,
    task::JoinHandle,
    time,
};
use tracing::{debug, info, warn};

use crate::{
    error::ClientError,
    event::{ChatEvent, ChatListener, ListenerRegistry},
    protocol::{self, ClientCommand},
};

/// Settings applied to every connection a client makes.
#[derive(Debug, Clone, Default)]
pub struct ClientConfig {
    /// Upper bound on TCP connection establishment. `None` waits as long as
    /// the operating system does.
    pub connect_timeout: Option<Duration>,
}

/// Handle to a chat connection. Cloning shares the same connection.
#[derive(Clone)]
pub struct ChatClient {
    shared: Arc<Shared>,
}

struct Shared {
    config: ClientConfig,
    // Never held across an await.
    state: Mutex<ConnectionState>,
    active: AtomicBool,
    listeners: ListenerRegistry,
    last_error: Mutex<Option<String>>,
    // Set once the dispatch task has delivered its final event.
    finished: watch::Sender<bool>,
}

enum ConnectionState {
    Idle,
    Connecting,
    Connected(Session),
    Closed,
}

struct Session {
    peer: SocketAddr,
    writer: Arc<tokio::sync::Mutex<OwnedWriteHalf>>,
    // Flipping this stops the dispatch loop and abandons in-flight writes.
    close: watch::Sender<bool>,
}

/// Holds the `Connecting` state; dropping it before a session is installed
/// puts the client back to `Idle`.
struct ConnectAttempt<'a> {
    shared: &'a Shared,
}

impl Drop for ConnectAttempt<'_> {
    fn drop(&mut self) {
        let mut state = self.shared.lock_state();
        if matches!(*state, ConnectionState::Connecting) {
            *state = ConnectionState::Idle;
        }
    }
}

/// Marks the dispatch task as finished even if a listener panics.
struct DispatchFinished(Arc<Shared>);

impl Drop for DispatchFinished {
    fn drop(&mut self) {
        self.0.finished.send_replace(true);
    }
}

impl Default for ChatClient {
    fn default() -> Self {
        Self::new()
    }
}

impl ChatClient {
    pub fn new() -> Self {
        Self::with_config(ClientConfig::default())
    }

    pub fn with_config(config: ClientConfig) -> Self {
        let (finished, _) = watch::channel(false);
        Self {
            shared: Arc::new(Shared {
                config,
                state: Mutex::new(ConnectionState::Idle),
                active: AtomicBool::new(false),
                listeners: ListenerRegistry::new(),
                last_error: Mutex::new(None),
                finished,
            }),
        }
    }

    /// Opens the connection and starts dispatching server lines to listeners.
    ///
    /// Fails with [`ClientError::AlreadyConnected`] while a connection is open
    /// or being opened and with [`ClientError::SessionClosed`] once it has been
    /// closed; the live socket, if any, is left untouched.
    pub async fn connect(&self, host: &str, port: u16) -> Result<(), ClientError> {
        let _attempt = self
            .shared
            .begin_connect()
            .map_err(|err| self.shared.fail(err))?;

        let (stream, peer) = self
            .shared
            .open_stream(host, port)
            .await
            .map_err(|err| self.shared.fail(err))?;

        self.shared.install(stream, peer);
        info!(%peer, "connected to chat server");
        Ok(())
    }

    /// Closes the connection and returns once listeners have seen
    /// [`ChatEvent::Disconnected`].
    ///
    /// Safe to call repeatedly, concurrently, or on a client that never
    /// connected. Never waits on a write that the server is not reading.
    pub async fn disconnect(&self) {
        if let Some(mut finished) = self.shared.close() {
            let _ = finished.wait_for(|done| *done).await;
        }
    }

    /// True while the connection is open. Never blocks.
    pub fn is_active(&self) -> bool {
        self.shared.active.load(Ordering::SeqCst)
    }

    /// Description of the most recent failure, or an empty string.
    pub fn last_error(&self) -> String {
        self.shared.last_error().unwrap_or_default()
    }

    pub fn add_listener(&self, listener: Arc<dyn ChatListener>) {
        self.shared.listeners.add(listener);
    }

    pub fn remove_listener(&self, listener: &Arc<dyn ChatListener>) {
        self.shared.listeners.remove(listener);
    }

    /// Writes one raw command line and flushes it.
    pub async fn send_command(&self, line: &str) -> Result<(), ClientError> {
        self.shared
            .send_line(line)
            .await
            .map_err(|err| self.shared.fail(err))
    }

    pub async fn send_public_message(&self, text: &str) -> Result<(), ClientError> {
        let text = self.shared.require("message", text)?;
        self.send(ClientCommand::PublicMessage {
            text: text.to_string(),
        })
        .await
    }

    /// The recipient must be a single username; the text may contain spaces.
    pub async fn send_private_message(&self, recipient: &str, text: &str) -> Result<(), ClientError> {
        let recipient = self.shared.require("recipient", recipient)?;
        if recipient.contains(char::is_whitespace) {
            return Err(self
                .shared
                .fail(ClientError::InvalidRecipient(recipient.to_string())));
        }
        let text = self.shared.require("message", text)?;
        self.send(ClientCommand::PrivateMessage {
            recipient: recipient.to_string(),
            text: text.to_string(),
        })
        .await
    }

    /// Asks the server to log us in. The verdict arrives later as
    /// [`ChatEvent::LoginResult`].
    pub async fn try_login(&self, username: &str) -> Result<(), ClientError> {
        let username = self.shared.require("username", username)?;
        self.send(ClientCommand::Login {
            username: username.to_string(),
        })
        .await
    }

    pub async fn refresh_user_list(&self) -> Result<(), ClientError> {
        self.send(ClientCommand::Users).await
    }

    pub async fn ask_supported_commands(&self) -> Result<(), ClientError> {
        self.send(ClientCommand::Help).await
    }

    /// Requests the user list every `period` until the connection closes.
    pub fn spawn_user_list_polling(&self, period: Duration) -> JoinHandle<()> {
        let client = self.clone();
        tokio::spawn(async move {
            let mut ticker = time::interval(period);
            ticker.set_missed_tick_behavior(time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if !client.is_active() {
                    break;
                }
                if let Err(error) = client.refresh_user_list().await {
                    debug!(%error, "user list refresh failed");
                }
            }
            debug!("user list polling stopped");
        })
    }

    async fn send(&self, command: ClientCommand) -> Result<(), ClientError> {
        self.send_command(&command.to_string()).await
    }
}

impl Shared {
    fn lock_state(&self) -> MutexGuard<'_, ConnectionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn begin_connect(&self) -> Result<ConnectAttempt<'_>, ClientError> {
        let mut state = self.lock_state();
        match *state {
            ConnectionState::Idle => {
                *state = ConnectionState::Connecting;
                Ok(ConnectAttempt { shared: self })
            }
            ConnectionState::Connecting | ConnectionState::Connected(_) => {
                Err(ClientError::AlreadyConnected)
            }
            ConnectionState::Closed => Err(ClientError::SessionClosed),
        }
    }

    async fn open_stream(&self, host: &str, port: u16) -> Result<(TcpStream, SocketAddr), ClientError> {
        let addr = format!("{host}:{port}");
        let connecting = TcpStream::connect((host, port));
        let result = match self.config.connect_timeout {
            Some(limit) => match time::timeout(limit, connecting).await {
                Ok(result) => result,
                Err(_) => return Err(ClientError::ConnectTimeout { addr }),
            },
            None => connecting.await,
        };
        result
            .and_then(|stream| {
                let peer = stream.peer_addr()?;
                Ok((stream, peer))
            })
            .map_err(|source| ClientError::Connect { addr, source })
    }

    fn install(self: &Arc<Self>, stream: TcpStream, peer: SocketAddr) {
        let (reader, writer) = stream.into_split();
        let writer = Arc::new(tokio::sync::Mutex::new(writer));
        let (close, closed) = watch::channel(false);

        let mut state = self.lock_state();
        tokio::spawn(dispatch_loop(
            Arc::clone(self),
            peer,
            BufReader::new(reader),
            Arc::clone(&writer),
            closed,
        ));
        *state = ConnectionState::Connected(Session {
            peer,
            writer,
            close,
        });
        self.active.store(true, Ordering::SeqCst);
    }

    async fn send_line(&self, line: &str) -> Result<(), ClientError> {
        if line.trim().is_empty() {
            return Err(ClientError::Blank("command"));
        }
        if line.contains(['\r', '\n']) {
            return Err(ClientError::MultiLine);
        }

        let (peer, writer, mut closed) = {
            let state = self.lock_state();
            let ConnectionState::Connected(session) = &*state else {
                return Err(ClientError::NotConnected);
            };
            (
                session.peer,
                Arc::clone(&session.writer),
                session.close.subscribe(),
            )
        };

        select! {
            biased;
            _ = wait_closed(&mut closed) => return Err(ClientError::NotConnected),
            written = write_locked(&writer, line) => written.map_err(ClientError::Send)?,
        }
        debug!(%peer, line, "sent command");
        Ok(())
    }

    /// Moves an open session to `Closed` and signals the dispatch task.
    ///
    /// Returns a receiver that turns `true` once the dispatch task is done,
    /// or `None` if no connection was ever established.
    fn close(&self) -> Option<watch::Receiver<bool>> {
        let mut state = self.lock_state();
        match std::mem::replace(&mut *state, ConnectionState::Closed) {
            ConnectionState::Connected(session) => {
                self.active.store(false, Ordering::SeqCst);
                drop(state);
                debug!(peer = %session.peer, "closing connection");
                session.close.send_replace(true);
            }
            ConnectionState::Closed => {}
            previous => {
                *state = previous;
                return None;
            }
        }
        Some(self.finished.subscribe())
    }

    fn dispatch_line(&self, line: &str) {
        match protocol::parse_response(line) {
            Some(event) => self.listeners.notify(&event),
            None => debug!(line, "ignoring unrecognized server line"),
        }
    }

    fn require<'a>(&self, what: &'static str, value: &'a str) -> Result<&'a str, ClientError> {
        let value = value.trim();
        if value.is_empty() {
            return Err(self.fail(ClientError::Blank(what)));
        }
        Ok(value)
    }

    fn fail(&self, err: ClientError) -> ClientError {
        self.record_error(err.to_string());
        err
    }

    fn record_error(&self, description: String) {
        *self.last_error.lock().unwrap_or_else(PoisonError::into_inner) = Some(description);
    }

    fn last_error(&self) -> Option<String> {
        self.last_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

async fn wait_closed(closed: &mut watch::Receiver<bool>) {
    // A dropped sender means the session is gone as well.
    let _ = closed.wait_for(|closed| *closed).await;
}

async fn write_locked(writer: &tokio::sync::Mutex<OwnedWriteHalf>, line: &str) -> io::Result<()> {
    let mut writer = writer.lock().await;
    protocol::write_line(&mut *writer, line).await
}

/// Reads server lines until disconnect, end of stream or a read error, then
/// closes the socket and tells listeners. Every event, `Disconnected`
/// included, is delivered from this task.
async fn dispatch_loop(
    shared: Arc<Shared>,
    peer: SocketAddr,
    mut reader: BufReader<OwnedReadHalf>,
    writer: Arc<tokio::sync::Mutex<OwnedWriteHalf>>,
    mut closed: watch::Receiver<bool>,
) {
    let _finished = DispatchFinished(Arc::clone(&shared));

    loop {
        select! {
            biased;
            _ = wait_closed(&mut closed) => {
                debug!("dispatch loop stopped by disconnect");
                break;
            }
            line = protocol::read_line(&mut reader) => {
                match line {
                    Ok(Some(line)) => shared.dispatch_line(&line),
                    Ok(None) => {
                        info!("server closed the connection");
                        break;
                    }
                    Err(error) => {
                        warn!(?error, "failed to read from server");
                        shared.record_error(format!("error receiving message from server: {error}"));
                        break;
                    }
                }
            }
        }
    }

    // No-op after an explicit disconnect.
    let _ = shared.close();
    drop(reader);

    // Pending writes bail out on the close signal, so this lock is released.
    let mut writer = writer.lock().await;
    if let Err(error) = writer.shutdown().await {
        debug!(%peer, ?error, "socket shutdown failed");
        shared.record_error(format!("error disconnecting from the server: {error}"));
    }
    drop(writer);

    info!(%peer, "disconnected from chat server");
    shared.listeners.notify(&ChatEvent::Disconnected);
}
