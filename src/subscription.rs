//! Signal subscriptions shared between the clones of a handle.

use std::sync::Arc;

use futures_util::{
    lock::Mutex,
    stream::{AbortHandle, Abortable},
    StreamExt,
};

use crate::transport::{SignalEnvelope, SignalStream};

/// A cancellable signal subscription.
///
/// Clones refer to the same subscription, and every signal is delivered to exactly one caller of
/// [`Subscription::next`]. The subscription is released at the transport when it is cancelled or
/// its stream ends.
#[derive(Clone)]
pub struct Subscription {
    stream: Arc<Mutex<Option<Abortable<SignalStream>>>>,
    abort: AbortHandle,
}

impl Subscription {
    pub(crate) fn new(stream: SignalStream) -> Self {
        let (abort, registration) = AbortHandle::new_pair();
        Self {
            stream: Arc::new(Mutex::new(Some(Abortable::new(stream, registration)))),
            abort,
        }
    }

    /// Waits for the next signal.
    ///
    /// Returns `None` once the subscription has been cancelled or the underlying stream ended.
    pub async fn next(&self) -> Option<SignalEnvelope> {
        let mut guard = self.stream.lock().await;
        let next = match guard.as_mut() {
            Some(stream) => stream.next().await,
            None => return None,
        };
        if next.is_none() {
            // Unregister at the transport.
            *guard = None;
        }
        next
    }

    /// Ends the subscription.
    ///
    /// Pending and future calls to [`Subscription::next`] return `None`. Cancelling more than
    /// once is a no-op.
    pub fn cancel(&self) {
        if self.abort.is_aborted() {
            return;
        }
        // Wake up any consumer first, then drop the stream if nobody is holding it. If a consumer
        // is, it drops the stream itself when it observes the end.
        self.abort.abort();
        if let Some(mut guard) = self.stream.try_lock() {
            *guard = None;
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.abort.is_aborted()
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}
