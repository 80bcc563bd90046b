use std::{thread, time::Duration};

use anyhow::{Context, Result};
use tokio::{
    io::{self, AsyncWriteExt},
    select,
    sync::mpsc,
};
use tracing::{info, warn};

use crate::{
    cli::ClientArgs,
    client::{ChatClient, ClientConfig},
    error::ClientError,
    event::{ChatEvent, EventForwarder},
    message::TextMessage,
};

/// One line typed at the prompt.
#[derive(Debug, PartialEq, Eq)]
pub enum ConsoleInput {
    Public(String),
    Private { recipient: String, text: String },
    Login(String),
    Users,
    Help,
    Quit,
    Empty,
}

impl ConsoleInput {
    /// `/privmsg <user> <text>` needs all three parts; anything short of that
    /// is sent publicly as typed.
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        if line.is_empty() {
            return ConsoleInput::Empty;
        }

        let (word, rest) = line.split_once(' ').unwrap_or((line, ""));
        match word {
            "/quit" => ConsoleInput::Quit,
            "/users" => ConsoleInput::Users,
            "/help" => ConsoleInput::Help,
            "/login" => ConsoleInput::Login(rest.trim().to_string()),
            "/privmsg" => match rest.split_once(' ') {
                Some((recipient, text)) if !recipient.is_empty() => ConsoleInput::Private {
                    recipient: recipient.to_string(),
                    text: text.to_string(),
                },
                _ => ConsoleInput::Public(line.to_string()),
            },
            _ => ConsoleInput::Public(line.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

pub async fn run(args: ClientArgs) -> Result<()> {
    let client = ChatClient::with_config(ClientConfig {
        connect_timeout: args.connect_timeout.map(Duration::from_secs),
    });
    let (forwarder, mut events) = EventForwarder::channel();
    client.add_listener(forwarder);

    client
        .connect(&args.host, args.port)
        .await
        .with_context(|| format!("failed to connect to {}:{}", args.host, args.port))?;
    info!(host = %args.host, port = args.port, "connected");

    if let Some(username) = &args.username {
        report_failure(client.try_login(username).await).await?;
    }
    let poller = args
        .poll_users
        .map(|secs| client.spawn_user_list_polling(Duration::from_secs(secs)));

    let format = if args.json {
        OutputFormat::Json
    } else {
        OutputFormat::Text
    };
    let mut input = spawn_stdin_reader();

    loop {
        select! {
            event = events.recv() => {
                let Some(event) = event else { break };
                write_stdout(&render_event(&event, format)?).await?;
                if event == ChatEvent::Disconnected {
                    break;
                }
            }
            line = input.recv() => {
                let Some(line) = line else { break };
                if !handle_stdin_input(&line, &client, format).await? {
                    break;
                }
            }
            ctrl_c = tokio::signal::ctrl_c() => {
                handle_ctrl_c(ctrl_c);
                break;
            }
        }
    }

    client.disconnect().await;
    if let Some(poller) = poller {
        poller.abort();
    }
    Ok(())
}

// Blocking reads live on a plain thread so a pending read never holds the
// runtime open at exit. The channel closes on end of input.
fn spawn_stdin_reader() -> mpsc::Receiver<String> {
    let (sender, receiver) = mpsc::channel(16);
    thread::spawn(move || {
        for line in std::io::stdin().lines() {
            let Ok(line) = line else { break };
            if sender.blocking_send(line).is_err() {
                break;
            }
        }
    });
    receiver
}

async fn handle_stdin_input(input: &str, client: &ChatClient, format: OutputFormat) -> Result<bool> {
    let outcome = match ConsoleInput::parse(input) {
        ConsoleInput::Empty => return Ok(true),
        ConsoleInput::Quit => {
            write_stdout("*** leaving chat").await?;
            return Ok(false);
        }
        ConsoleInput::Public(text) => {
            let sent = client.send_public_message(&text).await;
            if sent.is_ok() && format == OutputFormat::Text {
                write_stdout(&TextMessage::new("you", false, text).to_string()).await?;
            }
            sent
        }
        ConsoleInput::Private { recipient, text } => {
            let sent = client.send_private_message(&recipient, &text).await;
            if sent.is_ok() && format == OutputFormat::Text {
                write_stdout(&format!("(private to {recipient}) you: {text}")).await?;
            }
            sent
        }
        ConsoleInput::Login(username) => client.try_login(&username).await,
        ConsoleInput::Users => client.refresh_user_list().await,
        ConsoleInput::Help => client.ask_supported_commands().await,
    };

    report_failure(outcome).await?;
    Ok(true)
}

async fn report_failure(outcome: Result<(), ClientError>) -> io::Result<()> {
    match outcome {
        Ok(()) => Ok(()),
        Err(err) => write_stderr(&format!("!!! {err}")).await,
    }
}

fn handle_ctrl_c(result: io::Result<()>) {
    if let Err(error) = result {
        warn!(?error, "ctrl-c handler failed");
    }
}

pub fn render_event(event: &ChatEvent, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Json => serde_json::to_string(event).context("failed to encode event"),
        OutputFormat::Text => Ok(describe_event(event)),
    }
}

fn describe_event(event: &ChatEvent) -> String {
    match event {
        ChatEvent::LoginResult { success: true, .. } => "*** login successful".to_string(),
        ChatEvent::LoginResult { error, .. } => {
            format!("!!! login failed: {}", error.as_deref().unwrap_or_default())
        }
        ChatEvent::MessageReceived(message) => message.to_string(),
        ChatEvent::MessageError { error } => format!("!!! message not delivered: {error}"),
        ChatEvent::UserList { usernames } => {
            format!("*** users online: {}", usernames.join(", "))
        }
        ChatEvent::SupportedCommands { commands } => {
            format!("*** supported commands: {}", commands.join(", "))
        }
        ChatEvent::CommandError { error } => format!("!!! command error: {error}"),
        ChatEvent::Disconnected => "*** disconnected from server".to_string(),
    }
}

async fn write_stdout(line: &str) -> io::Result<()> {
    let mut stdout = tokio::io::stdout();
    stdout.write_all(line.as_bytes()).await?;
    stdout.write_all(b"\n").await?;
    stdout.flush().await
}

async fn write_stderr(line: &str) -> io::Result<()> {
    let mut stderr = tokio::io::stderr();
    stderr.write_all(line.as_bytes()).await?;
    stderr.write_all(b"\n").await?;
    stderr.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_slash_commands() {
        assert_eq!(ConsoleInput::parse("/quit\n"), ConsoleInput::Quit);
        assert_eq!(ConsoleInput::parse("/users"), ConsoleInput::Users);
        assert_eq!(ConsoleInput::parse("/help"), ConsoleInput::Help);
        assert_eq!(
            ConsoleInput::parse("/login alice"),
            ConsoleInput::Login("alice".into())
        );
        assert_eq!(ConsoleInput::parse("   "), ConsoleInput::Empty);
    }

    #[test]
    fn privmsg_needs_recipient_and_text() {
        assert_eq!(
            ConsoleInput::parse("/privmsg bob meet at noon"),
            ConsoleInput::Private {
                recipient: "bob".into(),
                text: "meet at noon".into()
            }
        );
        assert_eq!(
            ConsoleInput::parse("/privmsg bob"),
            ConsoleInput::Public("/privmsg bob".into())
        );
    }

    #[test]
    fn everything_else_is_public() {
        assert_eq!(
            ConsoleInput::parse("hello everyone\n"),
            ConsoleInput::Public("hello everyone".into())
        );
    }

    #[test]
    fn text_rendering() {
        let rendered = render_event(
            &ChatEvent::UserList {
                usernames: vec!["alice".into(), "bob".into()],
            },
            OutputFormat::Text,
        )
        .expect("render");
        assert_eq!(rendered, "*** users online: alice, bob");

        let rendered = render_event(
            &ChatEvent::LoginResult {
                success: false,
                error: Some("name taken".into()),
            },
            OutputFormat::Text,
        )
        .expect("render");
        assert_eq!(rendered, "!!! login failed: name taken");
    }

    #[test]
    fn json_rendering() {
        let rendered = render_event(
            &ChatEvent::CommandError {
                error: "unknown".into(),
            },
            OutputFormat::Json,
        )
        .expect("render");
        assert_eq!(rendered, r#"{"type":"command_error","error":"unknown"}"#);
    }
}
