//! Subscription handles and engine events.

use crate::error::SyncError;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;

/// An owned one-shot closure that releases a resource when called.
pub type Unsubscribe = Box<dyn FnOnce() + Send + Sync>;

#[derive(Default)]
struct Teardowns {
    closed: bool,
    pending: Vec<Unsubscribe>,
}

/// Composite subscription.
///
/// Collects teardowns (listener closes, child subscriptions, registry
/// drains) and runs each exactly once on [`cancel`](Self::cancel), newest
/// first. A teardown added after cancellation runs immediately. Clones share
/// the same state.
#[derive(Clone, Default)]
pub struct Subscription {
    inner: Arc<Mutex<Teardowns>>,
}

impl Subscription {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a teardown.
    pub fn add<F>(&self, teardown: F)
    where
        F: FnOnce() + Send + Sync + 'static,
    {
        let mut state = self.inner.lock();
        if state.closed {
            drop(state);
            teardown();
            return;
        }
        state.pending.push(Box::new(teardown));
    }

    /// Cancel `child` when this subscription is cancelled.
    pub fn add_child(&self, child: &Subscription) {
        let child = child.clone();
        self.add(move || child.cancel());
    }

    /// Run every teardown. Returns once all of them, and everything they
    /// cancel transitively, have finished. Later calls do nothing.
    pub fn cancel(&self) {
        let pending = {
            let mut state = self.inner.lock();
            if state.closed {
                return;
            }
            state.closed = true;
            std::mem::take(&mut state.pending)
        };

        for teardown in pending.into_iter().rev() {
            teardown();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }

    /// Teardowns waiting to run.
    pub fn pending(&self) -> usize {
        self.inner.lock().pending.len()
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.lock();
        f.debug_struct("Subscription")
            .field("closed", &state.closed)
            .field("pending", &state.pending.len())
            .finish()
    }
}

/// Events reported to the caller of a sync.
#[derive(Clone, Debug, PartialEq)]
pub enum SyncEvent {
    /// A listener or store write failed. Its subtree has already been torn down.
    Failed { path: String, error: SyncError },

    /// A recoverable inconsistency was reported and skipped.
    Inconsistency { path: String, error: SyncError },

    /// A listener's sequence ended.
    Completed { path: String },
}

impl SyncEvent {
    pub fn path(&self) -> &str {
        match self {
            SyncEvent::Failed { path, .. } => path,
            SyncEvent::Inconsistency { path, .. } => path,
            SyncEvent::Completed { path } => path,
        }
    }
}

/// Handle to a running sync.
///
/// Active while any member query is active. Cancelling, or dropping the
/// handle, stops every listener opened for it.
pub struct SyncHandle {
    root: Subscription,
    members: Vec<Subscription>,
    /// Channel to receive events.
    pub receiver: crossbeam_channel::Receiver<SyncEvent>,
}

impl SyncHandle {
    pub(crate) fn new(
        root: Subscription,
        members: Vec<Subscription>,
        receiver: crossbeam_channel::Receiver<SyncEvent>,
    ) -> Self {
        Self {
            root,
            members,
            receiver,
        }
    }

    pub fn is_active(&self) -> bool {
        !self.root.is_closed() && self.members.iter().any(|m| !m.is_closed())
    }

    pub fn cancel(&self) {
        self.root.cancel();
    }

    /// Receive the next event (blocking).
    pub fn recv(&self) -> Result<SyncEvent, crossbeam_channel::RecvError> {
        self.receiver.recv()
    }

    /// Try to receive an event (non-blocking).
    pub fn try_recv(&self) -> Result<SyncEvent, crossbeam_channel::TryRecvError> {
        self.receiver.try_recv()
    }

    /// Receive with timeout.
    pub fn recv_timeout(
        &self,
        timeout: std::time::Duration,
    ) -> Result<SyncEvent, crossbeam_channel::RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }

    /// Every event received so far, without blocking.
    pub fn drain_events(&self) -> Vec<SyncEvent> {
        self.receiver.try_iter().collect()
    }
}

impl Drop for SyncHandle {
    fn drop(&mut self) {
        self.root.cancel();
    }
}

impl fmt::Debug for SyncHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncHandle")
            .field("active", &self.is_active())
            .field("members", &self.members.len())
            .finish()
    }
}
