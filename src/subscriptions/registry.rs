//! Per-collection map from entity id to its children's subscription.

use super::types::Subscription;
use std::collections::HashMap;

/// Entity id -> subscription feeding that entity's children.
///
/// Owned by exactly one collection listener and guarded by that listener's
/// mutex. Entries are inserted on `added` and removed on `removed` or when the
/// listener is torn down.
#[derive(Debug, Default)]
pub struct Registry {
    entries: HashMap<String, Subscription>,
    closed: bool,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the owning listener has been torn down.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Register `handle` under `id`, returning the handle it replaces.
    pub fn register(
        &mut self,
        id: impl Into<String>,
        handle: Subscription,
    ) -> Option<Subscription> {
        self.entries.insert(id.into(), handle)
    }

    pub fn deregister(&mut self, id: &str) -> Option<Subscription> {
        self.entries.remove(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Registered ids, sorted.
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.entries.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Mark closed and hand back every handle for cancellation.
    pub fn close(&mut self) -> Vec<Subscription> {
        self.closed = true;
        self.entries.drain().map(|(_, handle)| handle).collect()
    }
}
