//! Service Status Stream Client
//!
//! Follows the live status of a named service over a Server-Sent Events
//! stream at `/service/stream/{identifier}` and writes each status message
//! to a sink, reconnecting on its own after interruptions.
//!
//! # Example
//!
//! ```rust,no_run
//! use status_stream::{FnSink, StatusClient};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = StatusClient::new("http://localhost:5000")?;
//!
//!     let subscription = client.open(
//!         "checkout-api",
//!         FnSink::new(|status: &str| println!("checkout-api: {}", status)),
//!     )?;
//!
//!     tokio::signal::ctrl_c().await?;
//!     subscription.close();
//!
//!     Ok(())
//! }
//! ```
//!
//! # Failures
//!
//! Interruptions (refused connections, dropped streams, 5xx answers) are
//! retried with backoff and never reported as errors. A server that
//! rejects the stream (404, 204, wrong content type) closes the
//! subscription; watch for it with [`Subscription::closed`].
//!
//! # Testing
//!
//! The `testing` module provides a scripted in-memory transport and an
//! HTTP status feed:
//!
//! ```rust,ignore
//! use status_stream::testing::{RecordingSink, StatusFeed, TestServer};
//!
//! let feed = StatusFeed::new();
//! let server = TestServer::start(feed.router()).await?;
//! let sink = RecordingSink::new();
//! let sub = server.client.open("checkout-api", sink.clone())?;
//! feed.publish("checkout-api", "healthy");
//! ```

mod client;
pub mod config;
mod error;
pub mod sink;
pub mod streaming;
pub mod testing;
mod types;

pub use client::StatusClient;
pub use config::ClientConfig;
pub use error::{Result, StatusStreamError};
pub use sink::{FnSink, LatestStatus, StatusSink};
pub use types::ServiceIdentifier;

// Re-export streaming types for convenience
pub use streaming::{
    CloseReason, ReconnectPolicy, Subscription, SubscriptionState, TerminalError,
    TransportError,
};
