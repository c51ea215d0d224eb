//! Query descriptor model.

use crate::path;
use crate::types::{Entity, QueryFilter};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Function of the parent entity producing a child spec.
pub type LazyFn = Arc<dyn Fn(&Entity) -> Subquery + Send + Sync>;

/// What to sync into one field of a parent entity.
#[derive(Clone)]
pub enum Subquery {
    /// Stored verbatim, no listener.
    Static(Value),
    /// Listen to one descriptor.
    Single(QueryDescriptor),
    /// Fan-out; every member contributes to one array field.
    Array(Vec<Subquery>),
    /// Resolved once against the parent when the parent becomes known.
    Lazy(LazyFn),
}

impl Subquery {
    pub fn value(value: impl Into<Value>) -> Self {
        Subquery::Static(value.into())
    }

    pub fn lazy<F>(f: F) -> Self
    where
        F: Fn(&Entity) -> Subquery + Send + Sync + 'static,
    {
        Subquery::Lazy(Arc::new(f))
    }
}

impl fmt::Debug for Subquery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Subquery::Static(value) => f.debug_tuple("Static").field(value).finish(),
            Subquery::Single(desc) => f.debug_tuple("Single").field(desc).finish(),
            Subquery::Array(items) => f.debug_tuple("Array").field(items).finish(),
            Subquery::Lazy(_) => f.write_str("Lazy(..)"),
        }
    }
}

impl From<QueryDescriptor> for Subquery {
    fn from(desc: QueryDescriptor) -> Self {
        Subquery::Single(desc)
    }
}

impl From<Vec<QueryDescriptor>> for Subquery {
    fn from(descs: Vec<QueryDescriptor>) -> Self {
        Subquery::Array(descs.into_iter().map(Subquery::Single).collect())
    }
}

impl From<Value> for Subquery {
    fn from(value: Value) -> Self {
        Subquery::Static(value)
    }
}

/// Describes a listen target and how to fill its children.
#[derive(Clone, Debug)]
pub struct QueryDescriptor {
    /// Slash-delimited remote address.
    pub path: String,

    /// Passed through to collection listeners untouched.
    pub filter: Option<QueryFilter>,

    /// Per-field child specs. Fields not listed are stored as delivered.
    pub children: BTreeMap<String, Subquery>,
}

impl QueryDescriptor {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            filter: None,
            children: BTreeMap::new(),
        }
    }

    pub fn with_filter(mut self, filter: QueryFilter) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Declare a child spec for `key`.
    pub fn child(mut self, key: impl Into<String>, spec: impl Into<Subquery>) -> Self {
        self.children.insert(key.into(), spec.into());
        self
    }

    pub fn is_document(&self) -> bool {
        path::is_document_path(&self.path)
    }

    /// Last path segment; the entity id for document descriptors.
    pub fn id(&self) -> Option<&str> {
        path::last_segment(&self.path)
    }

    /// Field names filled by child listeners rather than by this document.
    pub fn child_keys(&self) -> Vec<String> {
        self.children.keys().cloned().collect()
    }
}

/// Descriptor for a collection, optionally filtered.
pub fn collection_descriptor(
    path: impl Into<String>,
    filter: Option<QueryFilter>,
) -> QueryDescriptor {
    QueryDescriptor {
        filter,
        ..QueryDescriptor::new(path)
    }
}

/// Descriptor for a single document.
pub fn document_descriptor(path: impl Into<String>) -> QueryDescriptor {
    QueryDescriptor::new(path)
}

/// Input to [`SyncEngine::sync`](crate::sync::SyncEngine::sync).
#[derive(Clone, Debug)]
pub enum SyncTarget {
    /// Bare path, synced without children.
    Path(String),
    Descriptor(QueryDescriptor),
    /// Independent members combined into one handle.
    Many(Vec<SyncTarget>),
}

impl From<&str> for SyncTarget {
    fn from(path: &str) -> Self {
        SyncTarget::Path(path.to_string())
    }
}

impl From<String> for SyncTarget {
    fn from(path: String) -> Self {
        SyncTarget::Path(path)
    }
}

impl From<QueryDescriptor> for SyncTarget {
    fn from(desc: QueryDescriptor) -> Self {
        SyncTarget::Descriptor(desc)
    }
}

impl From<Vec<QueryDescriptor>> for SyncTarget {
    fn from(descs: Vec<QueryDescriptor>) -> Self {
        SyncTarget::Many(descs.into_iter().map(SyncTarget::Descriptor).collect())
    }
}

impl From<Vec<SyncTarget>> for SyncTarget {
    fn from(targets: Vec<SyncTarget>) -> Self {
        SyncTarget::Many(targets)
    }
}
