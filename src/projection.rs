//! Change projection: turns remote emissions into flat-store writes.
//!
//! Root entities are whole records. Nested entities live inside a root
//! record, either as the value of a field or as an id-keyed element of an
//! array field. Nested writes go through [`EntityStore::update`] with a
//! computed patch that rewrites only the affected top-level field. A write
//! whose slot no longer resolves (its record or element is gone) is skipped,
//! so late emissions never resurrect removed data.

use crate::error::Result;
use crate::store::{EntityStore, Patch};
use crate::types::{entity_id, with_id, Entity, Slot, Step};
use serde_json::Value;
use tracing::trace;

/// Where entities emitted by one listener are written.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Placement {
    /// Each entity is its own record.
    Root,
    /// The entity is the value of `parent.key`.
    Field { parent: Slot, key: String },
    /// The entity is an element of the array at `parent.key`, matched by id.
    Element { parent: Slot, key: String },
}

impl Placement {
    /// Slot of the entity `id` written through this placement.
    pub fn slot_for(&self, id: &str) -> Slot {
        match self {
            Placement::Root => Slot::root(id),
            Placement::Field { parent, key } => parent.field(key.as_str()),
            Placement::Element { parent, key } => parent.element(key.as_str(), id),
        }
    }

    /// Placement of the members of a collection listened to here. Collection
    /// members always land as array elements, except at the root.
    pub fn members(&self) -> Placement {
        match self {
            Placement::Root => Placement::Root,
            Placement::Field { parent, key } | Placement::Element { parent, key } => {
                Placement::Element {
                    parent: parent.clone(),
                    key: key.clone(),
                }
            }
        }
    }
}

/// Writes entities into an [`EntityStore`].
pub struct Projector<'a> {
    store: &'a dyn EntityStore,
    id_key: &'a str,
}

impl<'a> Projector<'a> {
    pub fn new(store: &'a dyn EntityStore, id_key: &'a str) -> Self {
        Self { store, id_key }
    }

    /// Write `{id_key: id, ...data}` with full-replace semantics.
    ///
    /// Fields in `keep` are owned by child listeners; their current values
    /// survive the replace.
    pub fn put_entity(
        &self,
        placement: &Placement,
        id: &str,
        data: Entity,
        keep: &[String],
    ) -> Result<()> {
        let mut entity = with_id(self.id_key, id, data);
        match placement {
            Placement::Root if keep.is_empty() => self.store.upsert(id, entity),
            Placement::Root => {
                let keep = keep.to_vec();
                self.store.upsert_with(
                    id,
                    Box::new(move |old: Option<&Entity>| {
                        if let Some(old) = old {
                            carry(old, &mut entity, &keep);
                        }
                        entity
                    }),
                )
            }
            Placement::Field { parent, key } => {
                let keep = keep.to_vec();
                self.mutate(parent, key, move |target| {
                    if let Value::Object(old) = target {
                        carry(old, &mut entity, &keep);
                    }
                    *target = Value::Object(entity);
                })
            }
            Placement::Element { parent, key } => {
                let keep = keep.to_vec();
                let id_key = self.id_key.to_string();
                self.mutate(parent, key, move |target| {
                    with_array(target, |items| upsert_element(items, &id_key, entity, &keep));
                })
            }
        }
    }

    /// Merge top-level fields of `data` into the entity.
    pub fn merge_entity(&self, placement: &Placement, id: &str, data: Entity) -> Result<()> {
        match placement {
            Placement::Root => {
                if !self.store.update(id, Patch::Merge(data))? {
                    trace!(id, "merge skipped, record missing");
                }
                Ok(())
            }
            Placement::Field { parent, key } => self.mutate(parent, key, move |target| {
                if let Value::Object(obj) = target {
                    obj.extend(data);
                }
            }),
            Placement::Element { parent, key } => {
                let id_key = self.id_key.to_string();
                let id = id.to_string();
                self.mutate(parent, key, move |target| {
                    if let Value::Array(items) = target {
                        merge_element(items, &id_key, &id, data);
                    }
                })
            }
        }
    }

    /// Remove the entity: the whole record, the field value (set to null) or
    /// the array element.
    pub fn drop_entity(&self, placement: &Placement, id: &str) -> Result<()> {
        match placement {
            Placement::Root => self.store.remove(id).map(|_| ()),
            Placement::Field { parent, key } => {
                self.mutate(parent, key, |target| *target = Value::Null)
            }
            Placement::Element { parent, key } => {
                let id_key = self.id_key.to_string();
                let id = id.to_string();
                self.mutate(parent, key, move |target| {
                    if let Value::Array(items) = target {
                        remove_element(items, &id_key, &id);
                    }
                })
            }
        }
    }

    /// Set `slot.key` to `value`.
    pub fn set_field(&self, slot: &Slot, key: &str, value: Value) -> Result<()> {
        self.mutate(slot, key, move |target| *target = value)
    }

    /// Reset `slot.key` to an array holding `items`.
    pub fn init_array(&self, slot: &Slot, key: &str, items: Vec<Value>) -> Result<()> {
        self.set_field(slot, key, Value::Array(items))
    }

    /// Apply `op` to the value at `slot.key`.
    fn mutate<F>(&self, slot: &Slot, key: &str, op: F) -> Result<()>
    where
        F: FnOnce(&mut Value) + Send + 'static,
    {
        let target = slot.field(key);
        let (head, rest) = match target.steps.split_first() {
            Some((Step::Field(head), rest)) => (head.clone(), rest.to_vec()),
            // A slot never starts with an element step.
            _ => return Ok(()),
        };
        let id_key = self.id_key.to_string();

        let applied = self.store.update(
            &slot.root,
            Patch::compute(move |current| {
                let mut top = current.get(&head).cloned().unwrap_or(Value::Null);
                let mut partial = Entity::new();
                if let Some(value) = navigate_mut(&mut top, &rest, &id_key) {
                    op(value);
                    partial.insert(head, top);
                }
                partial
            }),
        )?;

        if !applied {
            trace!(slot = %target, "write skipped, record missing");
        }
        Ok(())
    }
}

/// Copy the `keep` fields of `old` over `new`.
fn carry(old: &Entity, new: &mut Entity, keep: &[String]) {
    for key in keep {
        if let Some(value) = old.get(key) {
            new.insert(key.clone(), value.clone());
        }
    }
}

fn with_array(value: &mut Value, f: impl FnOnce(&mut Vec<Value>)) {
    if !value.is_array() {
        *value = Value::Array(Vec::new());
    }
    if let Value::Array(items) = value {
        f(items);
    }
}

/// Follow `steps` below `value`. A missing final field is created as null;
/// anything else missing yields `None`.
pub fn navigate_mut<'v>(
    value: &'v mut Value,
    steps: &[Step],
    id_key: &str,
) -> Option<&'v mut Value> {
    let mut current = value;
    for (i, step) in steps.iter().enumerate() {
        let last = i + 1 == steps.len();
        current = match step {
            Step::Field(key) if last => current
                .as_object_mut()?
                .entry(key.clone())
                .or_insert(Value::Null),
            Step::Field(key) => current.as_object_mut()?.get_mut(key)?,
            Step::Element(id) => current
                .as_array_mut()?
                .iter_mut()
                .find(|item| entity_id(item, id_key) == Some(id.as_str()))?,
        };
    }
    Some(current)
}

/// Insert `element`, or replace the element with the same id. Fields in
/// `keep` survive a replace.
pub fn upsert_element(items: &mut Vec<Value>, id_key: &str, mut element: Entity, keep: &[String]) {
    let id = element.get(id_key).and_then(Value::as_str).map(str::to_string);
    let existing = id.as_deref().and_then(|id| {
        items
            .iter_mut()
            .find(|item| entity_id(item, id_key) == Some(id))
    });

    match existing {
        Some(slot) => {
            if let Value::Object(old) = slot {
                carry(old, &mut element, keep);
            }
            *slot = Value::Object(element);
        }
        None => items.push(Value::Object(element)),
    }
}

/// Merge `data` into the element with `id`. Returns whether it was found.
pub fn merge_element(items: &mut [Value], id_key: &str, id: &str, data: Entity) -> bool {
    match items
        .iter_mut()
        .find(|item| entity_id(item, id_key) == Some(id))
        .and_then(Value::as_object_mut)
    {
        Some(obj) => {
            obj.extend(data);
            true
        }
        None => false,
    }
}

/// Remove the element with `id`. Returns whether one was removed.
pub fn remove_element(items: &mut Vec<Value>, id_key: &str, id: &str) -> bool {
    let before = items.len();
    items.retain(|item| entity_id(item, id_key) != Some(id));
    items.len() < before
}
