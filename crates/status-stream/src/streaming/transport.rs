//! Stream transports
//!
//! A transport turns a URL into a stream of parsed SSE events and sorts
//! failures into the two classes the subscription acts on: interruptions,
//! which are retried, and terminal errors, which close the subscription.

use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{Stream, StreamExt};
use reqwest::header::{ACCEPT, CACHE_CONTROL, CONTENT_TYPE};
use reqwest::{Client, Response, StatusCode};
use tracing::{debug, trace};
use url::Url;

use super::parser::SseParser;
use super::types::{SseEvent, TerminalError, TransportError, TransportResult};

/// Header carrying the last seen event ID on reconnect
pub const LAST_EVENT_ID: &str = "Last-Event-ID";

/// Content type every event stream response must carry
pub const EVENT_STREAM_CONTENT_TYPE: &str = "text/event-stream";

/// Longest response body quoted in a rejection error
const MAX_ERROR_BODY: usize = 200;

/// Longest line a server may send before the connection is dropped
pub const MAX_LINE_LENGTH: usize = 1024 * 1024;

/// Stream of parsed events from one connection
///
/// Ends with `None` when the server closes the connection cleanly.
pub type EventStream = Pin<Box<dyn Stream<Item = TransportResult<SseEvent>> + Send>>;

/// One connection attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectRequest {
    pub url: Url,
    pub last_event_id: Option<String>,
}

impl ConnectRequest {
    pub fn new(url: Url) -> Self {
        Self {
            url,
            last_event_id: None,
        }
    }
}

/// Opens event stream connections
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Open one connection
    ///
    /// Returns once the server has accepted the stream; events then arrive
    /// through the returned stream.
    async fn connect(&self, request: &ConnectRequest) -> TransportResult<EventStream>;
}

/// Event stream transport over HTTP
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    /// Use an existing HTTP client
    ///
    /// The client must not have an overall request timeout, or long-lived
    /// streams will be cut off by it.
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn connect(&self, request: &ConnectRequest) -> TransportResult<EventStream> {
        debug!("Connecting to SSE stream: {}", request.url);

        let mut builder = self
            .client
            .get(request.url.clone())
            .header(ACCEPT, EVENT_STREAM_CONTENT_TYPE)
            .header(CACHE_CONTROL, "no-cache");
        if let Some(id) = &request.last_event_id {
            builder = builder.header(LAST_EVENT_ID, id);
        }

        let response = builder.send().await.map_err(classify_request_error)?;

        let status = response.status();
        if !status.is_success() {
            let message = read_error_body(response).await;
            return Err(classify_status(status, message));
        }
        if status == StatusCode::NO_CONTENT {
            return Err(TerminalError::NoContent.into());
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        if !is_event_stream(&content_type) {
            return Err(TerminalError::UnsupportedContentType(content_type).into());
        }

        Ok(parse_body(response.bytes_stream()))
    }
}

/// Parse a response body into events
///
/// A body error or a line longer than [`MAX_LINE_LENGTH`] ends the stream
/// with an interruption.
fn parse_body<S, E>(body: S) -> EventStream
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    let mut body = Box::pin(body);
    let stream = async_stream::stream! {
        let mut parser = SseParser::new();
        while let Some(chunk) = body.next().await {
            match chunk {
                Ok(bytes) => {
                    trace!("SSE chunk of {} bytes", bytes.len());
                    for event in parser.feed(bytes) {
                        yield Ok(event);
                    }
                    if parser.pending_len() > MAX_LINE_LENGTH {
                        yield Err(TransportError::interrupted(format!(
                            "line longer than {} bytes",
                            MAX_LINE_LENGTH
                        )));
                        return;
                    }
                }
                Err(e) => {
                    yield Err(TransportError::interrupted(e.to_string()));
                    return;
                }
            }
        }
    };

    Box::pin(stream)
}

/// Read the start of an error body, never more than [`MAX_ERROR_BODY`]
async fn read_error_body(response: Response) -> String {
    let mut body = Box::pin(response.bytes_stream());
    let mut buf = Vec::new();
    while buf.len() <= MAX_ERROR_BODY {
        match body.next().await {
            Some(Ok(chunk)) => buf.extend_from_slice(&chunk),
            _ => break,
        }
    }
    truncate(String::from_utf8_lossy(&buf).into_owned())
}

/// Sort a failed response status into retryable or terminal
pub fn classify_status(status: StatusCode, message: String) -> TransportError {
    if status.is_server_error()
        || status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
    {
        TransportError::interrupted(format!("server returned {}", status))
    } else {
        TerminalError::Rejected {
            status: status.as_u16(),
            message,
        }
        .into()
    }
}

fn classify_request_error(e: reqwest::Error) -> TransportError {
    if e.is_builder() {
        TerminalError::InvalidRequest(e.to_string()).into()
    } else {
        TransportError::interrupted(e.to_string())
    }
}

fn is_event_stream(content_type: &str) -> bool {
    content_type
        .split(';')
        .next()
        .map(|essence| essence.trim().eq_ignore_ascii_case(EVENT_STREAM_CONTENT_TYPE))
        .unwrap_or(false)
}

fn truncate(mut message: String) -> String {
    if message.len() > MAX_ERROR_BODY {
        let mut end = MAX_ERROR_BODY;
        while !message.is_char_boundary(end) {
            end -= 1;
        }
        message.truncate(end);
        message.push_str("...");
    }
    message
}
