use std::fmt;

use serde::Serialize;

/// One chat message, either received from the server or echoed locally.
///
/// Two messages are equal when sender, visibility and text all match.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct TextMessage {
    sender: String,
    private: bool,
    text: String,
}

impl TextMessage {
    pub fn new(sender: impl Into<String>, private: bool, text: impl Into<String>) -> Self {
        Self {
            sender: sender.into(),
            private,
            text: text.into(),
        }
    }

    pub fn sender(&self) -> &str {
        &self.sender
    }

    pub fn is_private(&self) -> bool {
        self.private
    }

    pub fn text(&self) -> &str {
        &self.text
    }
}

impl fmt::Display for TextMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.private {
            write!(f, "(private) {}: {}", self.sender, self.text)
        } else {
            write!(f, "{}: {}", self.sender, self.text)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equality_covers_every_field() {
        let base = TextMessage::new("alice", false, "hi");
        assert_eq!(base, TextMessage::new("alice", false, "hi"));
        assert_ne!(base, TextMessage::new("bob", false, "hi"));
        assert_ne!(base, TextMessage::new("alice", true, "hi"));
        assert_ne!(base, TextMessage::new("alice", false, "hello"));
    }

    #[test]
    fn display_marks_private_messages() {
        assert_eq!(TextMessage::new("alice", false, "hi").to_string(), "alice: hi");
        assert_eq!(
            TextMessage::new("bob", true, "psst").to_string(),
            "(private) bob: psst"
        );
    }
}
