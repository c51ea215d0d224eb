//! # treesync
//!
//! Keeps a flat, id-addressed entity store in sync with a hierarchical remote
//! source, where documents declare nested documents and collections.
//!
//! ## Core Concepts
//!
//! - **Queries**: a path plus per-field child specs (static, nested,
//!   fan-out, or a function of the parent entity)
//! - **Flows**: one live listener per document or collection node
//! - **Projection**: remote changes land on the right field of the right
//!   flat record
//! - **Subscriptions**: owned, composite handles; removing an entity
//!   cancels everything beneath it
//!
//! ## Example
//!
//! ```ignore
//! use treesync::{
//!     collection_descriptor, document_descriptor, MemoryStore, MockSource, SyncContext,
//!     SyncEngine,
//! };
//!
//! let source = Arc::new(MockSource::new());
//! let store = Arc::new(MemoryStore::new());
//! let engine = SyncEngine::new(SyncContext::new(source.clone(), store.clone()));
//!
//! let handle = engine.sync(
//!     document_descriptor("users/u1")
//!         .child("todos", collection_descriptor("users/u1/todos", None)),
//! )?;
//!
//! source.emit_document("users/u1", json!({"name": "Ann"}));
//! // store now holds {"id": "u1", "name": "Ann", "todos": []}
//! ```

pub mod config;
pub mod error;
pub mod path;
pub mod projection;
pub mod query;
pub mod source;
pub mod store;
pub mod subscriptions;
pub mod sync;
pub mod types;

// Re-exports
pub use config::{MissingDocumentPolicy, SyncConfig, SyncContext};
pub use error::{Result, SyncError};
pub use path::is_document_path;
pub use projection::{Placement, Projector};
pub use query::{
    collection_descriptor, document_descriptor, is_valid_query, resolve, validate_target,
    Concrete, QueryDescriptor, Subquery, SyncTarget,
};
pub use source::{BatchSink, DocumentSink, Listener, MockSource, RemoteSource};
pub use store::{EntityStore, MemoryStore, Patch, Replace};
pub use subscriptions::{Registry, Subscription, SyncEvent, SyncHandle, Unsubscribe};
pub use sync::SyncEngine;
pub use types::*;
