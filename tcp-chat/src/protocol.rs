//! Line-oriented wire format shared by the client and the server skeleton.
//!
//! Every command and every response is one line of UTF-8 text terminated by
//! `\n`. The first space-delimited token is the keyword; the rest of the line
//! is its argument. Free-text fields (message bodies, error reasons) run to the
//! end of the line and may contain spaces.

use std::{fmt, io};

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

use crate::{event::ChatEvent, message::TextMessage};

const LINE_ENDINGS: &[char] = &['\n', '\r'];

/// A request from the client to the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientCommand {
    Login { username: String },
    PublicMessage { text: String },
    PrivateMessage { recipient: String, text: String },
    Users,
    Help,
}

impl fmt::Display for ClientCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientCommand::Login { username } => write!(f, "login {username}"),
            ClientCommand::PublicMessage { text } => write!(f, "msg {text}"),
            ClientCommand::PrivateMessage { recipient, text } => {
                write!(f, "privmsg {recipient} {text}")
            }
            ClientCommand::Users => f.write_str("users"),
            ClientCommand::Help => f.write_str("help"),
        }
    }
}

/// Classifies one server line into the event it announces.
///
/// Returns `None` for keywords this client does not know. Keywords are
/// matched case-sensitively.
pub fn parse_response(line: &str) -> Option<ChatEvent> {
    let line = line.trim();
    let (keyword, argument) = match line.split_once(' ') {
        Some((keyword, rest)) => (keyword, rest.trim()),
        None => (line, ""),
    };

    let event = match keyword {
        "loginok" => ChatEvent::LoginResult {
            success: true,
            error: None,
        },
        "loginerr" => ChatEvent::LoginResult {
            success: false,
            error: Some(argument.to_string()),
        },
        "users" => ChatEvent::UserList {
            usernames: split_words(argument),
        },
        "msg" => ChatEvent::MessageReceived(parse_text_message(argument, false)),
        "privmsg" => ChatEvent::MessageReceived(parse_text_message(argument, true)),
        "msgerr" => ChatEvent::MessageError {
            error: argument.to_string(),
        },
        "cmderr" => ChatEvent::CommandError {
            error: argument.to_string(),
        },
        "supported" => ChatEvent::SupportedCommands {
            commands: split_words(argument),
        },
        _ => return None,
    };
    Some(event)
}

// A sender with nothing after it carries an empty text.
fn parse_text_message(argument: &str, private: bool) -> TextMessage {
    match argument.split_once(' ') {
        Some((sender, text)) => TextMessage::new(sender, private, text),
        None => TextMessage::new(argument, private, ""),
    }
}

fn split_words(argument: &str) -> Vec<String> {
    argument
        .split(' ')
        .filter(|word| !word.is_empty())
        .map(str::to_string)
        .collect()
}

/// Reads one line, without its terminator. `Ok(None)` means end of stream.
///
/// Bytes that are not valid UTF-8 become U+FFFD; only I/O failures are errors.
pub async fn read_line<R>(reader: &mut R) -> io::Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
{
    let mut buf = Vec::new();
    let bytes = reader.read_until(b'\n', &mut buf).await?;
    if bytes == 0 {
        return Ok(None);
    }

    let line = String::from_utf8_lossy(&buf);
    Ok(Some(line.trim_end_matches(LINE_ENDINGS).to_string()))
}

/// Writes `line` plus a newline and flushes, so each command leaves at once.
pub async fn write_line<W>(writer: &mut W, line: &str) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut encoded = Vec::with_capacity(line.len() + 1);
    encoded.extend_from_slice(line.as_bytes());
    encoded.push(b'\n');
    writer.write_all(&encoded).await?;
    writer.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commands_encode_to_wire_lines() {
        let login = ClientCommand::Login {
            username: "alice".into(),
        };
        assert_eq!(login.to_string(), "login alice");

        let private = ClientCommand::PrivateMessage {
            recipient: "bob".into(),
            text: "see you at noon".into(),
        };
        assert_eq!(private.to_string(), "privmsg bob see you at noon");

        assert_eq!(ClientCommand::Users.to_string(), "users");
        assert_eq!(ClientCommand::Help.to_string(), "help");
    }

    #[test]
    fn login_responses() {
        assert_eq!(
            parse_response("loginok"),
            Some(ChatEvent::LoginResult {
                success: true,
                error: None
            })
        );
        assert_eq!(
            parse_response("loginerr bad username"),
            Some(ChatEvent::LoginResult {
                success: false,
                error: Some("bad username".into())
            })
        );
    }

    #[test]
    fn messages_keep_spaces_in_text() {
        assert_eq!(
            parse_response("msg alice hello there"),
            Some(ChatEvent::MessageReceived(TextMessage::new(
                "alice",
                false,
                "hello there"
            )))
        );
        assert_eq!(
            parse_response("privmsg bob secret text"),
            Some(ChatEvent::MessageReceived(TextMessage::new(
                "bob",
                true,
                "secret text"
            )))
        );
    }

    #[test]
    fn message_without_text_has_empty_body() {
        assert_eq!(
            parse_response("msg alice"),
            Some(ChatEvent::MessageReceived(TextMessage::new("alice", false, "")))
        );
        assert_eq!(
            parse_response("privmsg"),
            Some(ChatEvent::MessageReceived(TextMessage::new("", true, "")))
        );
    }

    #[test]
    fn lists_preserve_order() {
        assert_eq!(
            parse_response("users alice bob carol"),
            Some(ChatEvent::UserList {
                usernames: vec!["alice".into(), "bob".into(), "carol".into()]
            })
        );
        assert_eq!(
            parse_response("users"),
            Some(ChatEvent::UserList { usernames: vec![] })
        );
        assert_eq!(
            parse_response("supported login msg  help"),
            Some(ChatEvent::SupportedCommands {
                commands: vec!["login".into(), "msg".into(), "help".into()]
            })
        );
    }

    #[test]
    fn error_responses_carry_whole_remainder() {
        assert_eq!(
            parse_response("msgerr recipient not found"),
            Some(ChatEvent::MessageError {
                error: "recipient not found".into()
            })
        );
        assert_eq!(
            parse_response("cmderr unknown command\r"),
            Some(ChatEvent::CommandError {
                error: "unknown command".into()
            })
        );
    }

    #[test]
    fn unknown_and_miscased_keywords_are_ignored() {
        assert_eq!(parse_response("joke why did the chicken"), None);
        assert_eq!(parse_response("LOGINOK"), None);
        assert_eq!(parse_response(""), None);
    }

    #[tokio::test]
    async fn lines_round_trip_over_a_stream() {
        let (mut writer, reader) = tokio::io::duplex(1024);
        let mut reader = tokio::io::BufReader::new(reader);

        write_line(&mut writer, "msg hello").await.expect("write line");
        writer
            .write_all(b"users a b\r\n")
            .await
            .expect("write raw line");
        drop(writer);

        assert_eq!(
            read_line(&mut reader).await.expect("first line").as_deref(),
            Some("msg hello")
        );
        assert_eq!(
            read_line(&mut reader).await.expect("second line").as_deref(),
            Some("users a b")
        );
        assert_eq!(read_line(&mut reader).await.expect("eof"), None);
    }

    #[tokio::test]
    async fn invalid_utf8_is_replaced_not_fatal() {
        let (mut writer, reader) = tokio::io::duplex(1024);
        let mut reader = tokio::io::BufReader::new(reader);

        writer
            .write_all(b"msg alice caf\xe9\nloginok\n")
            .await
            .expect("write raw lines");
        drop(writer);

        assert_eq!(
            read_line(&mut reader).await.expect("lossy line").as_deref(),
            Some("msg alice caf\u{FFFD}")
        );
        assert_eq!(
            read_line(&mut reader).await.expect("next line").as_deref(),
            Some("loginok")
        );
        assert_eq!(read_line(&mut reader).await.expect("eof"), None);
    }
}
