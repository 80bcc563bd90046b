//! Server events and the observers that receive them.
//!
//! A [`ChatClient`](crate::client::ChatClient) turns each recognised server
//! line into a [`ChatEvent`] and hands it to every registered
//! [`ChatListener`], in registration order, on the connection's dispatch task.
//! Callbacks run inline with the read loop, so a slow listener delays every
//! line behind it.

use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::debug;

use crate::message::TextMessage;

/// Something the server told us, or the end of the connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatEvent {
    LoginResult {
        success: bool,
        error: Option<String>,
    },
    MessageReceived(TextMessage),
    MessageError { error: String },
    UserList { usernames: Vec<String> },
    SupportedCommands { commands: Vec<String> },
    CommandError { error: String },
    Disconnected,
}

/// Observer of a chat connection.
///
/// Every callback has an empty default body, so implementors override only
/// the events they care about. [`on_event`](ChatListener::on_event) routes a
/// [`ChatEvent`] to the matching callback; override it instead to receive all
/// events through one method.
pub trait ChatListener: Send + Sync {
    fn on_login_result(&self, _success: bool, _error: Option<&str>) {}

    fn on_message_received(&self, _message: &TextMessage) {}

    fn on_message_error(&self, _error: &str) {}

    fn on_user_list(&self, _usernames: &[String]) {}

    fn on_supported_commands(&self, _commands: &[String]) {}

    fn on_command_error(&self, _error: &str) {}

    fn on_disconnect(&self) {}

    fn on_event(&self, event: &ChatEvent) {
        match event {
            ChatEvent::LoginResult { success, error } => {
                self.on_login_result(*success, error.as_deref())
            }
            ChatEvent::MessageReceived(message) => self.on_message_received(message),
            ChatEvent::MessageError { error } => self.on_message_error(error),
            ChatEvent::UserList { usernames } => self.on_user_list(usernames),
            ChatEvent::SupportedCommands { commands } => self.on_supported_commands(commands),
            ChatEvent::CommandError { error } => self.on_command_error(error),
            ChatEvent::Disconnected => self.on_disconnect(),
        }
    }
}

/// Ordered set of listeners, unique by allocation.
#[derive(Default)]
pub struct ListenerRegistry {
    listeners: Mutex<Vec<Arc<dyn ChatListener>>>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `listener` unless the same `Arc` is already registered.
    pub fn add(&self, listener: Arc<dyn ChatListener>) {
        let mut listeners = self.lock();
        if !listeners.iter().any(|known| same_listener(known, &listener)) {
            listeners.push(listener);
        }
    }

    pub fn remove(&self, listener: &Arc<dyn ChatListener>) {
        self.lock().retain(|known| !same_listener(known, listener));
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Delivers `event` to a snapshot of the registered listeners.
    ///
    /// Changes made to the registry from inside a callback take effect with
    /// the next event.
    pub fn notify(&self, event: &ChatEvent) {
        let snapshot = self.lock().clone();
        debug!(listeners = snapshot.len(), ?event, "dispatching event");
        for listener in snapshot {
            listener.on_event(event);
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Arc<dyn ChatListener>>> {
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// Compares data pointers only; vtable addresses are not stable across codegen units.
fn same_listener(a: &Arc<dyn ChatListener>, b: &Arc<dyn ChatListener>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

/// Listener that forwards every event into an unbounded channel.
///
/// Useful when the consumer wants to handle events on its own task instead of
/// inside the dispatch loop.
pub struct EventForwarder {
    sender: mpsc::UnboundedSender<ChatEvent>,
}

impl EventForwarder {
    pub fn channel() -> (Arc<Self>, mpsc::UnboundedReceiver<ChatEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Arc::new(Self { sender }), receiver)
    }
}

impl ChatListener for EventForwarder {
    fn on_event(&self, event: &ChatEvent) {
        if self.sender.send(event.clone()).is_err() {
            debug!("event receiver dropped; discarding event");
        }
    }
}
