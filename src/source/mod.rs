//! Remote source abstraction.
//!
//! The engine never talks to a concrete backend. It asks a [`RemoteSource`]
//! for listeners and receives emissions through sinks:
//! - Document listeners emit the full current value, or `None` once the
//!   document no longer exists.
//! - Collection listeners emit ordered change batches, one per remote
//!   transaction.
//!
//! Opening a listener must not deliver into the sink synchronously; the first
//! emission arrives from the source's own delivery path.

mod mock;

use crate::error::Result;
use crate::subscriptions::Unsubscribe;
use crate::types::{ChangeBatch, Emission, Entity, QueryFilter};
use std::fmt;
use std::sync::Arc;

pub use mock::MockSource;

/// Receives document emissions.
pub type DocumentSink = Arc<dyn Fn(Emission<Option<Entity>>) + Send + Sync>;

/// Receives collection change batches.
pub type BatchSink = Arc<dyn Fn(Emission<ChangeBatch>) + Send + Sync>;

/// Capability to watch remote documents and collections.
pub trait RemoteSource: Send + Sync {
    /// Watch a single document.
    fn watch_document(&self, path: &str, sink: DocumentSink) -> Result<Listener>;

    /// Watch a collection's change feed.
    fn watch_collection(
        &self,
        path: &str,
        filter: Option<&QueryFilter>,
        sink: BatchSink,
    ) -> Result<Listener>;
}

/// An open remote listener. Closed exactly once, on [`close`](Self::close)
/// or on drop.
pub struct Listener {
    path: String,
    release: Option<Unsubscribe>,
}

impl Listener {
    pub fn new<F>(path: impl Into<String>, release: F) -> Self
    where
        F: FnOnce() + Send + Sync + 'static,
    {
        Self {
            path: path.into(),
            release: Some(Box::new(release)),
        }
    }

    /// Path being listened to.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn close(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for Listener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listener")
            .field("path", &self.path)
            .field("open", &self.release.is_some())
            .finish()
    }
}
