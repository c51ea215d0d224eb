//! In-memory remote source for tests and benchmarks.

use super::{BatchSink, DocumentSink, Listener, RemoteSource};
use crate::error::{Result, SyncError};
use crate::path;
use crate::types::{parse_batch, ChangeBatch, Emission, Entity, QueryFilter};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::{Arc, Weak};

enum Feed {
    Document(DocumentSink),
    Collection {
        filter: Option<QueryFilter>,
        sink: BatchSink,
    },
}

struct Watcher {
    id: u64,
    path: String,
    feed: Feed,
    /// Set after a terminal emission; the sequence delivers nothing more.
    ended: bool,
}

#[derive(Default)]
struct MockState {
    watchers: Vec<Watcher>,
    next_id: u64,
    opened: usize,
    closed: usize,
    rejected: HashSet<String>,
}

/// Remote source whose emissions are pushed by the caller.
///
/// Emissions are delivered on the calling thread. The internal lock is
/// released before any sink runs, so sinks may open and close listeners.
#[derive(Clone, Default)]
pub struct MockSource {
    state: Arc<Mutex<MockState>>,
}

fn normalize(p: &str) -> String {
    path::segments(p).collect::<Vec<_>>().join("/")
}

impl MockSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver the current value of a document. Non-object values are
    /// delivered as "document missing".
    pub fn emit_document(&self, path: &str, value: Value) -> usize {
        let data = match value {
            Value::Object(map) => Some(map),
            _ => None,
        };
        self.deliver_document(path, Emission::Next(data))
    }

    /// Report that a document no longer exists.
    pub fn remove_document(&self, path: &str) -> usize {
        self.deliver_document(path, Emission::Next(None))
    }

    /// Deliver one change batch to every listener of a collection.
    pub fn emit_batch(&self, path: &str, batch: ChangeBatch) -> usize {
        let sinks = self.collection_sinks(path, false);
        for sink in &sinks {
            sink(Emission::Next(batch.clone()));
        }
        sinks.len()
    }

    /// Deliver a batch given in its wire shape (see [`parse_batch`]).
    pub fn emit_batch_json(&self, path: &str, batch: Value) -> Result<usize> {
        Ok(self.emit_batch(path, parse_batch(batch)?))
    }

    /// Fail every listener on `path`.
    pub fn fail(&self, path: &str, message: &str) -> usize {
        let delivered = self.deliver_document(path, Emission::Failed(message.to_string()));
        let sinks = self.collection_sinks(path, true);
        for sink in &sinks {
            sink(Emission::Failed(message.to_string()));
        }
        delivered + sinks.len()
    }

    /// Complete every listener on `path`.
    pub fn complete(&self, path: &str) -> usize {
        let delivered = self.deliver_document(path, Emission::Completed);
        let sinks = self.collection_sinks(path, true);
        for sink in &sinks {
            sink(Emission::Completed);
        }
        delivered + sinks.len()
    }

    /// Make every later watch on `path` fail to open.
    pub fn reject(&self, path: &str) {
        self.state.lock().rejected.insert(normalize(path));
    }

    /// Listeners opened so far.
    pub fn opened(&self) -> usize {
        self.state.lock().opened
    }

    /// Listeners closed so far.
    pub fn closed(&self) -> usize {
        self.state.lock().closed
    }

    /// Listeners currently open.
    pub fn active(&self) -> usize {
        self.state.lock().watchers.len()
    }

    pub fn is_watching(&self, path: &str) -> bool {
        self.watchers(path) > 0
    }

    /// Open listeners on `path`.
    pub fn watchers(&self, path: &str) -> usize {
        let path = normalize(path);
        self.state
            .lock()
            .watchers
            .iter()
            .filter(|w| w.path == path)
            .count()
    }

    /// Filter passed by the first open collection listener on `path`.
    pub fn filter_for(&self, path: &str) -> Option<QueryFilter> {
        let path = normalize(path);
        self.state.lock().watchers.iter().find_map(|w| match &w.feed {
            Feed::Collection { filter, .. } if w.path == path => filter.clone(),
            _ => None,
        })
    }

    /// Paths with at least one open listener, sorted.
    pub fn watched_paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self
            .state
            .lock()
            .watchers
            .iter()
            .map(|w| w.path.clone())
            .collect();
        paths.sort();
        paths.dedup();
        paths
    }

    fn deliver_document(&self, path: &str, emission: Emission<Option<Entity>>) -> usize {
        let terminal = emission.is_terminal();
        let path = normalize(path);
        let sinks: Vec<DocumentSink> = {
            let mut state = self.state.lock();
            state
                .watchers
                .iter_mut()
                .filter(|w| w.path == path && !w.ended)
                .filter_map(|w| match &w.feed {
                    Feed::Document(sink) => {
                        w.ended = terminal;
                        Some(Arc::clone(sink))
                    }
                    Feed::Collection { .. } => None,
                })
                .collect()
        };
        for sink in &sinks {
            sink(emission.clone());
        }
        sinks.len()
    }

    fn collection_sinks(&self, path: &str, terminal: bool) -> Vec<BatchSink> {
        let path = normalize(path);
        let mut state = self.state.lock();
        state
            .watchers
            .iter_mut()
            .filter(|w| w.path == path && !w.ended)
            .filter_map(|w| match &w.feed {
                Feed::Collection { sink, .. } => {
                    w.ended = terminal;
                    Some(Arc::clone(sink))
                }
                Feed::Document(_) => None,
            })
            .collect()
    }

    fn register(&self, path: &str, feed: Feed) -> Result<Listener> {
        let path = normalize(path);
        let mut state = self.state.lock();
        if state.rejected.contains(&path) {
            return Err(SyncError::UpstreamListenerFailure {
                path,
                message: "watch rejected".to_string(),
            });
        }

        let id = state.next_id;
        state.next_id += 1;
        state.opened += 1;
        state.watchers.push(Watcher {
            id,
            path: path.clone(),
            feed,
            ended: false,
        });

        let weak: Weak<Mutex<MockState>> = Arc::downgrade(&self.state);
        Ok(Listener::new(path, move || {
            if let Some(state) = weak.upgrade() {
                let mut state = state.lock();
                let before = state.watchers.len();
                state.watchers.retain(|w| w.id != id);
                if state.watchers.len() < before {
                    state.closed += 1;
                }
            }
        }))
    }
}

impl RemoteSource for MockSource {
    fn watch_document(&self, path: &str, sink: DocumentSink) -> Result<Listener> {
        self.register(path, Feed::Document(sink))
    }

    fn watch_collection(
        &self,
        path: &str,
        filter: Option<&QueryFilter>,
        sink: BatchSink,
    ) -> Result<Listener> {
        self.register(
            path,
            Feed::Collection {
                filter: filter.cloned(),
                sink,
            },
        )
    }
}
