//! Test utilities for status-stream
//!
//! Provides an in-memory transport for driving subscriptions step by step,
//! a recording sink, and an HTTP server that publishes status streams.

use std::collections::{HashMap, VecDeque};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use parking_lot::Mutex;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::config::ClientConfig;
use crate::sink::StatusSink;
use crate::streaming::{
    ConnectRequest, EventStream, ReconnectPolicy, SseEvent, SseMessage, TerminalError,
    Transport, TransportError, TransportResult, LAST_EVENT_ID,
};
use crate::{Result, StatusClient};

// =============================================================================
// Recording sink
// =============================================================================

/// Sink that keeps every value it was asked to display
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    writes: Arc<Mutex<Vec<String>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// All writes, oldest first
    pub fn writes(&self) -> Vec<String> {
        self.writes.lock().clone()
    }

    /// The value currently shown
    pub fn last(&self) -> Option<String> {
        self.writes.lock().last().cloned()
    }
}

impl StatusSink for RecordingSink {
    fn display(&self, text: &str) {
        self.writes.lock().push(text.to_string());
    }
}

// =============================================================================
// Scripted transport
// =============================================================================

enum ScriptedOutcome {
    Connect(mpsc::UnboundedReceiver<TransportResult<SseEvent>>),
    Fail(TransportError),
}

#[derive(Default)]
struct ScriptedInner {
    outcomes: Mutex<VecDeque<ScriptedOutcome>>,
    requests: Mutex<Vec<ConnectRequest>>,
}

/// In-memory transport with scripted connection outcomes
///
/// Each `connect` call takes the next queued outcome. With nothing queued,
/// `connect` never completes, which keeps a subscription parked in
/// `Connecting`.
#[derive(Clone, Default)]
pub struct ScriptedTransport {
    inner: Arc<ScriptedInner>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a successful connection and return its control handle
    pub fn push_connection(&self) -> ScriptedConnection {
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner
            .outcomes
            .lock()
            .push_back(ScriptedOutcome::Connect(rx));
        ScriptedConnection { tx }
    }

    /// Queue a failed connection attempt
    pub fn push_failure(&self, error: TransportError) {
        self.inner
            .outcomes
            .lock()
            .push_back(ScriptedOutcome::Fail(error));
    }

    /// Number of connection attempts so far
    pub fn connect_count(&self) -> usize {
        self.inner.requests.lock().len()
    }

    /// Every connection request, oldest first
    pub fn requests(&self) -> Vec<ConnectRequest> {
        self.inner.requests.lock().clone()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn connect(&self, request: &ConnectRequest) -> TransportResult<EventStream> {
        self.inner.requests.lock().push(request.clone());
        let outcome = self.inner.outcomes.lock().pop_front();

        match outcome {
            Some(ScriptedOutcome::Connect(rx)) => Ok(Box::pin(UnboundedReceiverStream::new(rx))),
            Some(ScriptedOutcome::Fail(e)) => Err(e),
            None => futures::future::pending().await,
        }
    }
}

/// Control handle for one scripted connection
pub struct ScriptedConnection {
    tx: mpsc::UnboundedSender<TransportResult<SseEvent>>,
}

impl ScriptedConnection {
    /// Deliver an unnamed event carrying `data`
    pub fn send(&self, data: impl Into<String>) {
        self.send_event(SseEvent::Message(SseMessage::new(data)));
    }

    /// Deliver any parsed event
    pub fn send_event(&self, event: SseEvent) {
        let _ = self.tx.send(Ok(event));
    }

    /// Drop the connection with a recoverable error
    pub fn interrupt(&self, reason: impl Into<String>) {
        let _ = self.tx.send(Err(TransportError::interrupted(reason)));
    }

    /// Fail the connection permanently
    pub fn fail(&self, error: TerminalError) {
        let _ = self.tx.send(Err(error.into()));
    }

    /// End the stream cleanly, as a server closing the connection would
    pub fn end(self) {}

    /// Whether the subscription has let go of this connection
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

// =============================================================================
// Status feed server
// =============================================================================

#[derive(Debug, Clone)]
enum FeedCommand {
    Publish {
        identifier: String,
        data: String,
        id: Option<String>,
    },
    Disconnect,
}

#[derive(Debug, Clone, Copy)]
enum FeedOverride {
    Status(StatusCode),
    Html,
}

/// One request received by a [`StatusFeed`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedRequest {
    pub identifier: String,
    pub last_event_id: Option<String>,
}

struct FeedInner {
    commands: broadcast::Sender<FeedCommand>,
    overrides: Mutex<HashMap<String, FeedOverride>>,
    requests: Mutex<Vec<FeedRequest>>,
}

/// HTTP status stream publisher for tests
///
/// Serves `GET /service/stream/{identifier}` as an event stream. Tests push
/// payloads, cut every open connection, or make an identifier answer with
/// an error status.
#[derive(Clone)]
pub struct StatusFeed {
    inner: Arc<FeedInner>,
}

impl Default for StatusFeed {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusFeed {
    pub fn new() -> Self {
        let (commands, _) = broadcast::channel(256);
        Self {
            inner: Arc::new(FeedInner {
                commands,
                overrides: Mutex::new(HashMap::new()),
                requests: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Router serving the stream endpoint
    pub fn router(&self) -> Router {
        Router::new()
            .route("/service/stream/{identifier}", get(stream_status))
            .with_state(self.clone())
    }

    /// Send `data` to every open stream for `identifier`
    pub fn publish(&self, identifier: &str, data: &str) {
        self.send(FeedCommand::Publish {
            identifier: identifier.to_string(),
            data: data.to_string(),
            id: None,
        });
    }

    /// Send `data` tagged with an event ID
    pub fn publish_with_id(&self, identifier: &str, data: &str, id: &str) {
        self.send(FeedCommand::Publish {
            identifier: identifier.to_string(),
            data: data.to_string(),
            id: Some(id.to_string()),
        });
    }

    /// End every open stream; clients see the connection close
    pub fn disconnect_all(&self) {
        self.send(FeedCommand::Disconnect);
    }

    /// Answer future requests for `identifier` with `status`
    pub fn reject(&self, identifier: &str, status: StatusCode) {
        self.inner
            .overrides
            .lock()
            .insert(identifier.to_string(), FeedOverride::Status(status));
    }

    /// Answer future requests for `identifier` with an HTML page
    pub fn serve_html(&self, identifier: &str) {
        self.inner
            .overrides
            .lock()
            .insert(identifier.to_string(), FeedOverride::Html);
    }

    /// Serve `identifier` normally again
    pub fn accept(&self, identifier: &str) {
        self.inner.overrides.lock().remove(identifier);
    }

    /// Requests received so far
    pub fn requests(&self) -> Vec<FeedRequest> {
        self.inner.requests.lock().clone()
    }

    /// Requests received for `identifier`
    pub fn request_count(&self, identifier: &str) -> usize {
        self.inner
            .requests
            .lock()
            .iter()
            .filter(|r| r.identifier == identifier)
            .count()
    }

    fn send(&self, command: FeedCommand) {
        // No receivers just means no open streams
        let _ = self.inner.commands.send(command);
    }
}

/// GET /service/stream/{identifier}
async fn stream_status(
    State(feed): State<StatusFeed>,
    Path(identifier): Path<String>,
    headers: HeaderMap,
) -> Response {
    let last_event_id = headers
        .get(LAST_EVENT_ID)
        .and_then(|v| v.to_str().ok())
        .map(String::from);
    feed.inner.requests.lock().push(FeedRequest {
        identifier: identifier.clone(),
        last_event_id,
    });

    let override_response = feed.inner.overrides.lock().get(&identifier).copied();
    match override_response {
        Some(FeedOverride::Status(status)) => return (status, "rejected").into_response(),
        Some(FeedOverride::Html) => return Html("<p>not a stream</p>").into_response(),
        None => {}
    }

    let mut rx = feed.inner.commands.subscribe();
    let stream = async_stream::stream! {
        loop {
            match rx.recv().await {
                Ok(FeedCommand::Publish { identifier: target, data, id }) => {
                    if target != identifier {
                        continue;
                    }
                    let mut event = Event::default().data(data);
                    if let Some(id) = id {
                        event = event.id(id);
                    }
                    yield Ok::<_, Infallible>(event);
                }
                Ok(FeedCommand::Disconnect) | Err(broadcast::error::RecvError::Closed) => break,
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
            }
        }
    };

    Sse::new(stream).keep_alive(KeepAlive::default()).into_response()
}

// =============================================================================
// Test server
// =============================================================================

/// A status server on an ephemeral port that stops when dropped
pub struct TestServer {
    pub addr: SocketAddr,
    pub client: StatusClient,
    shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
    handle: Option<tokio::task::JoinHandle<()>>,
}

impl TestServer {
    /// Create a new test server from an axum Router
    ///
    /// The client reconnects after a fixed 20 ms so tests stay fast.
    ///
    /// # Example
    ///
    /// ```ignore
    /// use status_stream::testing::{StatusFeed, TestServer};
    ///
    /// let feed = StatusFeed::new();
    /// let server = TestServer::start(feed.router()).await?;
    /// let sub = server.client.open("checkout-api", sink)?;
    /// ```
    pub async fn start(router: Router) -> Result<Self> {
        let config = ClientConfig {
            reconnect: ReconnectPolicy::fixed(Duration::from_millis(20)),
            ..ClientConfig::default()
        };
        Self::start_with_config(router, config).await
    }

    /// Create a new test server with a custom client configuration
    pub async fn start_with_config(router: Router, config: ClientConfig) -> Result<Self> {
        // Bind to any available port
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();

        // Spawn the server
        let handle = tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
                .ok();
        });

        // Give server a moment to start
        tokio::time::sleep(Duration::from_millis(10)).await;

        let base_url = format!("http://{}", addr);
        let client = StatusClient::with_config(&base_url, config)?;

        Ok(Self {
            addr,
            client,
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        })
    }

    /// Get the base URL of the test server
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        // Open event streams would hold a graceful shutdown forever
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

/// Wait for a condition with timeout
pub async fn wait_for<F, Fut>(condition: F, timeout: Duration) -> bool
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;

    while tokio::time::Instant::now() < deadline {
        if condition().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    false
}
