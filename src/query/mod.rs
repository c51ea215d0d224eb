//! Query descriptors: what to listen to and how children are filled.
//!
//! A [`QueryDescriptor`] names a remote path and, per field, a [`Subquery`]
//! telling the engine how to fill that field: a static value, another
//! descriptor, a fan-out array, or a function of the parent entity.
//!
//! # Example
//!
//! ```ignore
//! let query = collection_descriptor("teams", None)
//!     .child("members", Subquery::lazy(|team| {
//!         let id = team["id"].as_str().unwrap_or_default();
//!         collection_descriptor(format!("teams/{}/members", id), None).into()
//!     }));
//! ```

mod resolve;
mod types;
mod validate;

pub use resolve::{resolve, Concrete};
pub use types::{
    collection_descriptor, document_descriptor, LazyFn, QueryDescriptor, Subquery, SyncTarget,
};
pub use validate::{is_valid_query, validate_descriptor, validate_target};
