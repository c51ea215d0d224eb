//! Recursive child sync for one parent entity.

use super::engine::{open_query, Session};
use crate::error::Result;
use crate::projection::Placement;
use crate::query::{resolve, validate_descriptor, Concrete, Subquery};
use crate::subscriptions::Subscription;
use crate::types::{Entity, Slot};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::trace;

/// Resolve and open every child of the entity at `slot`. All listeners are
/// owned by `owner`. A child that cannot be opened is reported and skipped;
/// its siblings still open.
pub(super) fn open(
    session: &Arc<Session>,
    children: &BTreeMap<String, Subquery>,
    slot: &Slot,
    parent: &Entity,
    owner: &Subscription,
) {
    for (key, spec) in children {
        let concrete = resolve(spec, parent);
        if let Err(error) = open_field(session, key, concrete, slot, owner) {
            session.fail(&slot.field(key.as_str()).to_string(), error);
        }
    }
}

fn open_field(
    session: &Arc<Session>,
    key: &str,
    concrete: Concrete,
    slot: &Slot,
    owner: &Subscription,
) -> Result<()> {
    let projector = session.projector();

    match concrete {
        Concrete::Static(value) => {
            trace!(slot = %slot, key, "static child");
            projector.set_field(slot, key, value)
        }
        Concrete::Query(desc) => {
            validate_descriptor(&desc)?;
            if !desc.is_document() {
                projector.init_array(slot, key, Vec::new())?;
            }
            let placement = Placement::Field {
                parent: slot.clone(),
                key: key.to_string(),
            };
            open_query(session, &desc, placement, owner).map(|_| ())
        }
        Concrete::Fan(items) => {
            let mut statics: Vec<Value> = Vec::new();
            let mut queries = Vec::new();
            for item in items {
                match item {
                    Concrete::Static(value) => statics.push(value),
                    Concrete::Query(desc) => {
                        validate_descriptor(&desc)?;
                        queries.push(desc);
                    }
                    // resolve() flattens fan-outs
                    Concrete::Fan(_) => {}
                }
            }

            projector.init_array(slot, key, statics)?;
            let placement = Placement::Element {
                parent: slot.clone(),
                key: key.to_string(),
            };
            // One subscription for every member of the field.
            let field = Subscription::new();
            owner.add_child(&field);
            for desc in &queries {
                if let Err(error) = open_query(session, desc, placement.clone(), &field) {
                    field.cancel();
                    return Err(error);
                }
            }
            Ok(())
        }
    }
}
