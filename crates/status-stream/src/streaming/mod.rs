//! Streaming support for status subscriptions
//!
//! Provides SSE (Server-Sent Events) streaming with automatic reconnection.
//!
//! # Example
//!
//! ```no_run
//! use status_stream::{LatestStatus, StatusClient};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = StatusClient::new("http://localhost:5000")?;
//!
//! let status = LatestStatus::new();
//! let subscription = client.open("checkout-api", status.clone())?;
//!
//! // The sink now follows the server; wait for a terminal failure
//! let reason = subscription.closed().await;
//! eprintln!("Stream closed: {:?}, last status: {:?}", reason, status.get());
//! # Ok(())
//! # }
//! ```

mod backoff;
mod parser;
mod subscription;
mod transport;
mod types;

pub use backoff::{ReconnectPolicy, MIN_RETRY_DELAY};
pub use parser::SseParser;
pub use subscription::Subscription;
pub use transport::{
    classify_status, ConnectRequest, EventStream, HttpTransport, Transport,
    EVENT_STREAM_CONTENT_TYPE, LAST_EVENT_ID, MAX_LINE_LENGTH,
};
pub use types::{
    CloseReason, SseEvent, SseMessage, SubscriptionState, TerminalError, TransportError,
    TransportResult, DEFAULT_EVENT_TYPE,
};
