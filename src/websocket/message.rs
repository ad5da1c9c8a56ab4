use axum::body::Bytes;
use axum::extract::ws::{Message, Utf8Bytes};
use serde::Serialize;

/// Kind of a data frame relayed to a room
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Text,
    Binary,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Binary => "binary",
        }
    }
}

/// A data frame broadcast to every member of a room.
///
/// Payloads are reference counted, so cloning a message for each member's
/// outbound queue never copies the bytes.
#[derive(Debug, Clone)]
pub enum RoomMessage {
    Text(Utf8Bytes),
    Binary(Bytes),
}

impl RoomMessage {
    pub fn text(text: impl Into<Utf8Bytes>) -> Self {
        Self::Text(text.into())
    }

    pub fn binary(bytes: impl Into<Bytes>) -> Self {
        Self::Binary(bytes.into())
    }

    pub fn kind(&self) -> MessageKind {
        match self {
            Self::Text(_) => MessageKind::Text,
            Self::Binary(_) => MessageKind::Binary,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Text(text) => text.as_str().len(),
            Self::Binary(bytes) => bytes.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Extract a room message from an inbound frame. Control frames yield `None`.
    pub fn from_ws(message: Message) -> Option<Self> {
        match message {
            Message::Text(text) => Some(Self::Text(text)),
            Message::Binary(bytes) => Some(Self::Binary(bytes)),
            Message::Ping(_) | Message::Pong(_) | Message::Close(_) => None,
        }
    }

    pub fn into_ws(self) -> Message {
        match self {
            Self::Text(text) => Message::Text(text),
            Self::Binary(bytes) => Message::Binary(bytes),
        }
    }
}

/// Items placed on a connection's outbound queue.
#[derive(Debug, Clone)]
pub enum OutboundMessage {
    /// Broadcast payload from a room member
    Room(RoomMessage),
    /// Server heartbeat
    Ping,
}

impl OutboundMessage {
    pub fn into_ws(self) -> Message {
        match self {
            Self::Room(message) => message.into_ws(),
            Self::Ping => Message::Ping(Bytes::new()),
        }
    }
}

impl From<RoomMessage> for OutboundMessage {
    fn from(message: RoomMessage) -> Self {
        Self::Room(message)
    }
}
