//! Configuration for the sync engine.

use crate::source::RemoteSource;
use crate::store::EntityStore;
use std::fmt;
use std::sync::Arc;

/// What to do with a record whose document stops existing (a `None`
/// emission or end of the document's sequence).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum MissingDocumentPolicy {
    /// Remove the record (or clear the nested field / array element).
    #[default]
    Clear,
    /// Leave the last known value in place.
    Keep,
}

/// Configuration for sync operations.
#[derive(Clone, Debug)]
pub struct SyncConfig {
    /// Field that carries an entity's id.
    /// Default: "id"
    pub id_key: String,

    /// Max buffered events per sync handle before new events are dropped.
    /// Default: 1000
    pub event_buffer: usize,

    /// Default: [`MissingDocumentPolicy::Clear`]
    pub missing_document: MissingDocumentPolicy,
}

impl SyncConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_id_key(mut self, id_key: impl Into<String>) -> Self {
        self.id_key = id_key.into();
        self
    }

    pub fn with_event_buffer(mut self, size: usize) -> Self {
        self.event_buffer = size;
        self
    }

    pub fn with_missing_document(mut self, policy: MissingDocumentPolicy) -> Self {
        self.missing_document = policy;
        self
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            id_key: "id".to_string(),
            event_buffer: 1000,
            missing_document: MissingDocumentPolicy::Clear,
        }
    }
}

/// Everything a sync needs: configuration, where data comes from and where
/// it goes.
#[derive(Clone)]
pub struct SyncContext {
    pub config: SyncConfig,
    pub source: Arc<dyn RemoteSource>,
    pub store: Arc<dyn EntityStore>,
}

impl SyncContext {
    pub fn new(source: Arc<dyn RemoteSource>, store: Arc<dyn EntityStore>) -> Self {
        Self {
            config: SyncConfig::default(),
            source,
            store,
        }
    }

    pub fn with_config(mut self, config: SyncConfig) -> Self {
        self.config = config;
        self
    }
}

impl fmt::Debug for SyncContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncContext")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
