//! Subquery resolution against a parent entity.

use super::types::{QueryDescriptor, Subquery};
use crate::types::Entity;
use serde_json::Value;

/// A child spec with every function already applied.
#[derive(Clone, Debug)]
pub enum Concrete {
    Static(Value),
    Query(QueryDescriptor),
    /// Flattened fan-out members, in declaration order.
    Fan(Vec<Concrete>),
}

/// Resolve `spec` for `parent`.
///
/// Each function reached is called exactly once. Nested arrays are flattened
/// into a single fan-out.
pub fn resolve(spec: &Subquery, parent: &Entity) -> Concrete {
    match spec {
        Subquery::Static(value) => Concrete::Static(value.clone()),
        Subquery::Single(desc) => Concrete::Query(desc.clone()),
        Subquery::Lazy(f) => resolve(&f(parent), parent),
        Subquery::Array(items) => {
            let mut flat = Vec::with_capacity(items.len());
            for item in items {
                match resolve(item, parent) {
                    Concrete::Fan(inner) => flat.extend(inner),
                    other => flat.push(other),
                }
            }
            Concrete::Fan(flat)
        }
    }
}
