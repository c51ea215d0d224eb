//! Subscription lifecycle.
//!
//! Every listener the engine opens is owned by exactly one [`Subscription`].
//! Subscriptions form a tree that mirrors the synced data:
//! - the [`SyncHandle`] owns one subscription per top-level query;
//! - a collection listener owns a [`Registry`] with one subscription per
//!   entity it has added;
//! - an entity's subscription owns the listeners of its children, which in
//!   turn own their own registries.
//!
//! Cancelling any node tears down its whole subtree before returning.
//!
//! # Example
//!
//! ```ignore
//! let handle = engine.sync(collection_descriptor("teams", None))?;
//!
//! loop {
//!     match handle.recv() {
//!         Ok(SyncEvent::Failed { path, error }) => eprintln!("{}: {}", path, error),
//!         Ok(_) => {}
//!         Err(_) => break,
//!     }
//! }
//! ```

mod registry;
mod types;

pub use registry::Registry;
pub use types::{Subscription, SyncEvent, SyncHandle, Unsubscribe};
