//! Status sinks
//!
//! A sink is the write-only end of a subscription: it receives each status
//! payload and makes it visible. The subscription never reads it back.

use std::sync::Arc;

use parking_lot::RwLock;

/// Something that can display the latest status text
///
/// Implementations should not panic; a panicking sink closes its
/// subscription with [`crate::TerminalError::SinkPanicked`]. Each call
/// replaces whatever was shown before; the subscription never asks a sink
/// to append.
pub trait StatusSink: Send + Sync {
    /// Show `text` in place of the previous value
    fn display(&self, text: &str);
}

impl<T: StatusSink + ?Sized> StatusSink for Arc<T> {
    fn display(&self, text: &str) {
        (**self).display(text)
    }
}

impl<T: StatusSink + ?Sized> StatusSink for Box<T> {
    fn display(&self, text: &str) {
        (**self).display(text)
    }
}

/// Adapter turning a closure into a sink
pub struct FnSink<F>(F);

impl<F> FnSink<F>
where
    F: Fn(&str) + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

impl<F> StatusSink for FnSink<F>
where
    F: Fn(&str) + Send + Sync,
{
    fn display(&self, text: &str) {
        (self.0)(text)
    }
}

/// Shared cell holding the most recently displayed status
///
/// Clones share the same cell, so one clone can be handed to a
/// subscription while another is read elsewhere.
#[derive(Debug, Clone, Default)]
pub struct LatestStatus {
    inner: Arc<RwLock<Option<String>>>,
}

impl LatestStatus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current value, `None` until the first status arrives
    pub fn get(&self) -> Option<String> {
        self.inner.read().clone()
    }
}

impl StatusSink for LatestStatus {
    fn display(&self, text: &str) {
        *self.inner.write() = Some(text.to_string());
    }
}
