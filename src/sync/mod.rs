//! Subscription orchestration.
//!
//! [`SyncEngine::sync`] walks a query and opens one listener per node:
//! - document paths get a value listener whose emissions replace one entity;
//! - collection paths get a change-batch listener whose `added` / `modified`
//!   / `removed` events create, patch and delete entities.
//!
//! Every entity that declares children gets its own subscription, opened
//! when the entity first appears and cancelled, with everything below it,
//! when the entity goes away.

mod children;
mod collection;
mod document;
mod engine;

pub use engine::SyncEngine;
