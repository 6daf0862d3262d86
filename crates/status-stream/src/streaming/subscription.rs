//! Subscription implementation

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use futures::stream::StreamExt;
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};
use url::Url;

use super::backoff::{Backoff, ReconnectPolicy};
use super::transport::{ConnectRequest, Transport};
use super::types::{CloseReason, SseEvent, SubscriptionState, TerminalError, TransportError};
use crate::error::{Result, StatusStreamError};
use crate::sink::StatusSink;

/// A live status subscription
///
/// Owns one background task that keeps a single stream connection open,
/// reconnecting after interruptions, and writes every `message` event's
/// payload to the sink in arrival order.
///
/// # Lifecycle
///
/// - Created via `StatusClient::open()` or `Subscription::open()`
/// - `Connecting -> Open -> (Connecting -> Open)* -> Closed`
/// - Call `close()` to stop it; dropping the handle closes it too
///
/// # Example
///
/// ```ignore
/// let status = LatestStatus::new();
/// let sub = client.open("checkout-api", status.clone())?;
///
/// // ... later
/// sub.close();
/// ```
pub struct Subscription {
    /// Stream endpoint
    url: Url,

    /// State shared with the connection task
    shared: Arc<Shared>,

    /// Receiver for state changes
    state_rx: watch::Receiver<SubscriptionState>,

    /// Connection task
    task: JoinHandle<()>,
}

struct Shared {
    /// `None` once closed; no write can happen after it is taken
    sink: Mutex<Option<Box<dyn StatusSink>>>,

    state_tx: watch::Sender<SubscriptionState>,
}

impl Shared {
    /// Write one payload; returns false once the subscription is closed
    ///
    /// A panicking sink closes the subscription instead of unwinding
    /// through the connection task.
    fn display(&self, text: &str) -> bool {
        let guard = self.sink.lock();
        let Some(sink) = guard.as_ref() else {
            return false;
        };
        let result = panic::catch_unwind(AssertUnwindSafe(|| sink.display(text)));
        drop(guard);

        match result {
            Ok(()) => true,
            Err(payload) => {
                let error = TerminalError::SinkPanicked(panic_message(payload.as_ref()));
                warn!("Status sink failed: {}", error);
                self.close(CloseReason::Terminal(error));
                false
            }
        }
    }

    /// Move to a non-closed state, unless already closed
    fn set_state(&self, state: SubscriptionState) {
        self.state_tx.send_if_modified(|current| {
            if current.is_closed() || *current == state {
                false
            } else {
                *current = state;
                true
            }
        });
    }

    /// Close with `reason`; returns false if already closed
    fn close(&self, reason: CloseReason) -> bool {
        let mut guard = self.sink.lock();
        let Some(sink) = guard.take() else {
            return false;
        };
        // Published under the sink lock so state and sink agree
        self.state_tx.send_replace(SubscriptionState::Closed(reason));
        drop(guard);
        drop(sink);
        true
    }
}

impl Subscription {
    /// Open a subscription over `transport`
    ///
    /// The connection task starts before this returns. Connection failures
    /// are never reported here; they surface through [`Subscription::state`].
    /// Fails only when called outside a Tokio runtime.
    pub fn open<T, S>(transport: T, url: Url, sink: S, policy: ReconnectPolicy) -> Result<Self>
    where
        T: Transport,
        S: StatusSink + 'static,
    {
        let handle = Handle::try_current().map_err(|e| StatusStreamError::Runtime(e.to_string()))?;

        let (state_tx, state_rx) = watch::channel(SubscriptionState::Connecting);
        let shared = Arc::new(Shared {
            sink: Mutex::new(Some(Box::new(sink))),
            state_tx,
        });

        let task = handle.spawn(run_connection_loop(
            transport,
            url.clone(),
            policy,
            shared.clone(),
        ));

        Ok(Self {
            url,
            shared,
            state_rx,
            task,
        })
    }

    /// Get the stream URL
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Get the current state
    pub fn state(&self) -> SubscriptionState {
        self.state_rx.borrow().clone()
    }

    /// Check if the subscription is closed
    pub fn is_closed(&self) -> bool {
        self.state_rx.borrow().is_closed()
    }

    /// Subscribe to state changes
    pub fn watch_state(&self) -> watch::Receiver<SubscriptionState> {
        self.state_rx.clone()
    }

    /// Wait until the subscription is closed and return why
    pub async fn closed(&self) -> CloseReason {
        let mut rx = self.state_rx.clone();
        let state = match rx.wait_for(SubscriptionState::is_closed).await {
            Ok(state) => state.clone(),
            Err(_) => SubscriptionState::Closed(CloseReason::Cancelled),
        };
        match state {
            SubscriptionState::Closed(reason) => reason,
            _ => CloseReason::Cancelled,
        }
    }

    /// Close the subscription
    ///
    /// The connection is dropped and, once this returns, the sink receives
    /// no further writes. A value already displayed stays displayed.
    /// Closing again has no effect.
    pub fn close(&self) {
        if self.shared.close(CloseReason::Cancelled) {
            info!("Closed status subscription: {}", self.url);
        }
        self.task.abort();
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("url", &self.url.as_str())
            .field("state", &*self.state_rx.borrow())
            .finish()
    }
}

/// Run the connection loop with reconnection logic
async fn run_connection_loop<T: Transport>(
    transport: T,
    url: Url,
    policy: ReconnectPolicy,
    shared: Arc<Shared>,
) {
    let mut backoff = Backoff::new(policy);
    let mut last_event_id: Option<String> = None;

    loop {
        shared.set_state(SubscriptionState::Connecting);

        let request = ConnectRequest {
            url: url.clone(),
            last_event_id: last_event_id.clone(),
        };

        let reason = match transport.connect(&request).await {
            Ok(mut stream) => {
                debug!("Status stream open: {}", url);
                shared.set_state(SubscriptionState::Open);
                backoff.reset();

                loop {
                    match stream.next().await {
                        Some(Ok(SseEvent::Message(msg))) => {
                            last_event_id = msg.id.clone();
                            if !msg.is_message() {
                                trace!("Ignoring '{}' event", msg.event);
                                continue;
                            }
                            if !shared.display(&msg.data) {
                                return;
                            }
                        }
                        Some(Ok(SseEvent::Retry(delay))) => {
                            debug!("Server set reconnection delay to {:?}", delay);
                            backoff.set_initial_delay(delay);
                        }
                        Some(Err(TransportError::Interrupted(reason))) => break reason,
                        Some(Err(TransportError::Terminal(e))) => {
                            fail(&shared, &url, e);
                            return;
                        }
                        None => break "server closed the stream".to_string(),
                    }
                }
            }
            Err(TransportError::Interrupted(reason)) => reason,
            Err(TransportError::Terminal(e)) => {
                fail(&shared, &url, e);
                return;
            }
        };

        match backoff.next_delay() {
            Some(delay) => {
                warn!(
                    "Status stream {} interrupted ({}), reconnect attempt {} in {:?}",
                    url,
                    reason,
                    backoff.attempts(),
                    delay
                );
                shared.set_state(SubscriptionState::Connecting);
                tokio::time::sleep(delay).await;
            }
            None => {
                let attempts = backoff.attempts();
                fail(&shared, &url, TerminalError::RetriesExhausted { attempts });
                return;
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn fail(shared: &Shared, url: &Url, error: TerminalError) {
    warn!("Status stream {} failed permanently: {}", url, error);
    shared.close(CloseReason::Terminal(error));
}
