//! Types for streaming subscriptions

use std::time::Duration;

use thiserror::Error;

/// Event type used when the stream does not name one
pub const DEFAULT_EVENT_TYPE: &str = "message";

/// One dispatched event from the stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseMessage {
    /// Event type (`message` unless the server sent an `event:` field)
    pub event: String,

    /// Data payload, verbatim
    pub data: String,

    /// Last event ID in effect when this event was dispatched
    pub id: Option<String>,
}

impl SseMessage {
    /// Unnamed event carrying `data`
    pub fn new(data: impl Into<String>) -> Self {
        Self {
            event: DEFAULT_EVENT_TYPE.to_string(),
            data: data.into(),
            id: None,
        }
    }

    /// Whether this is a plain `message` event (the only kind shown to sinks)
    pub fn is_message(&self) -> bool {
        self.event == DEFAULT_EVENT_TYPE
    }
}

/// Item produced by a parsed stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseEvent {
    /// A complete event
    Message(SseMessage),

    /// Server-requested reconnection delay (`retry:` field)
    Retry(Duration),
}

/// Why a stream cannot be resumed
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TerminalError {
    /// Server answered with a status that will not change on retry
    #[error("Server rejected stream ({status}): {message}")]
    Rejected { status: u16, message: String },

    /// Server answered 204 No Content, asking the client to stop
    #[error("Server ended the stream with 204 No Content")]
    NoContent,

    /// Response was not an event stream
    #[error("Unexpected content type: {0}")]
    UnsupportedContentType(String),

    /// The request itself could not be built
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Configured reconnect attempts ran out
    #[error("Gave up after {attempts} reconnection attempts")]
    RetriesExhausted { attempts: u32 },

    /// The sink panicked while displaying a status
    #[error("Status sink panicked: {0}")]
    SinkPanicked(String),
}

/// Failure reported by a transport
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// Connectivity lost; reconnecting is expected to help
    #[error("Stream interrupted: {0}")]
    Interrupted(String),

    /// The endpoint will not serve this stream
    #[error(transparent)]
    Terminal(#[from] TerminalError),
}

impl TransportError {
    pub fn interrupted(reason: impl Into<String>) -> Self {
        Self::Interrupted(reason.into())
    }

    /// Check if the subscription should reconnect after this error
    pub fn should_reconnect(&self) -> bool {
        matches!(self, TransportError::Interrupted(_))
    }
}

/// Result type for transport operations
pub type TransportResult<T> = std::result::Result<T, TransportError>;

/// Why a subscription reached `Closed`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// The caller closed or dropped the subscription
    Cancelled,

    /// The transport failed in a way that rules out reconnecting
    Terminal(TerminalError),
}

/// Caller-visible subscription state
///
/// An interrupted connection is reported as `Connecting` while the
/// subscription waits to reconnect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionState {
    Connecting,
    Open,
    Closed(CloseReason),
}

impl SubscriptionState {
    pub fn is_closed(&self) -> bool {
        matches!(self, SubscriptionState::Closed(_))
    }

    pub fn is_open(&self) -> bool {
        matches!(self, SubscriptionState::Open)
    }

    /// The terminal error, if the subscription closed because of one
    pub fn terminal_error(&self) -> Option<&TerminalError> {
        match self {
            SubscriptionState::Closed(CloseReason::Terminal(e)) => Some(e),
            _ => None,
        }
    }
}
