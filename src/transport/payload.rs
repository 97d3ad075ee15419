//! Message payload type.
//!
//! Payloads are opaque to the coordinator: it buffers and hands them out
//! without looking inside.

// ============================================================================
// Imports
// ============================================================================

use tokio_tungstenite::tungstenite::Message;

// ============================================================================
// Payload
// ============================================================================

/// A single message sent or received over the socket.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Payload {
    /// UTF-8 text message.
    Text(String),
    /// Binary message.
    Binary(Vec<u8>),
}

impl Payload {
    /// Returns the text content, if this is a text message.
    #[inline]
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            Self::Binary(_) => None,
        }
    }

    /// Returns the raw bytes of the message.
    #[inline]
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Text(text) => text.as_bytes(),
            Self::Binary(data) => data,
        }
    }

    /// Consumes the payload, returning its bytes.
    #[inline]
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        match self {
            Self::Text(text) => text.into_bytes(),
            Self::Binary(data) => data,
        }
    }

    /// Returns `true` for text messages.
    #[inline]
    #[must_use]
    pub const fn is_text(&self) -> bool {
        matches!(self, Self::Text(_))
    }

    /// Length in bytes.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    /// Returns `true` for a zero-length payload.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Converts into a tungstenite data frame.
    pub(crate) fn into_message(self) -> Message {
        match self {
            Self::Text(text) => Message::Text(text.into()),
            Self::Binary(data) => Message::Binary(data.into()),
        }
    }
}

// ============================================================================
// Conversions
// ============================================================================

impl From<String> for Payload {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<&str> for Payload {
    fn from(text: &str) -> Self {
        Self::Text(text.to_owned())
    }
}

impl From<Vec<u8>> for Payload {
    fn from(data: Vec<u8>) -> Self {
        Self::Binary(data)
    }
}

impl From<&[u8]> for Payload {
    fn from(data: &[u8]) -> Self {
        Self::Binary(data.to_vec())
    }
}

impl<const N: usize> From<[u8; N]> for Payload {
    fn from(data: [u8; N]) -> Self {
        Self::Binary(data.to_vec())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_payload() {
        let payload = Payload::from("hello");
        assert!(payload.is_text());
        assert_eq!(payload.as_text(), Some("hello"));
        assert_eq!(payload.len(), 5);
    }

    #[test]
    fn test_binary_payload() {
        let payload = Payload::from(vec![1u8, 2, 3]);
        assert!(!payload.is_text());
        assert_eq!(payload.as_text(), None);
        assert_eq!(payload.as_bytes(), &[1, 2, 3]);
        assert_eq!(payload.into_bytes(), vec![1, 2, 3]);
    }

    #[test]
    fn test_empty_payload() {
        assert!(Payload::from("").is_empty());
        assert!(Payload::from([0u8; 0]).is_empty());
    }

    #[test]
    fn test_into_message() {
        assert!(matches!(Payload::from("x").into_message(), Message::Text(_)));
        assert!(matches!(
            Payload::from([9u8]).into_message(),
            Message::Binary(_)
        ));
    }
}
