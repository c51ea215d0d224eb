//! Core types for the sync engine.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// A flat record: an id field plus arbitrary domain fields.
pub type Entity = Map<String, Value>;

/// Kind of a change delivered by a collection listener.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Added,
    Modified,
    Removed,
}

/// A single document change inside a collection batch.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DocumentChange {
    #[serde(rename = "type")]
    pub kind: ChangeKind,
    pub id: String,
    #[serde(default)]
    pub data: Entity,
}

impl DocumentChange {
    pub fn added(id: impl Into<String>, data: Entity) -> Self {
        Self {
            kind: ChangeKind::Added,
            id: id.into(),
            data,
        }
    }

    pub fn modified(id: impl Into<String>, data: Entity) -> Self {
        Self {
            kind: ChangeKind::Modified,
            id: id.into(),
            data,
        }
    }

    pub fn removed(id: impl Into<String>) -> Self {
        Self {
            kind: ChangeKind::Removed,
            id: id.into(),
            data: Entity::new(),
        }
    }
}

/// Changes from one remote transaction, in delivery order.
pub type ChangeBatch = Vec<DocumentChange>;

/// Parse a batch from its wire shape: an array of
/// `{"type": "added" | "modified" | "removed", "id": ..., "data": {...}}`.
pub fn parse_batch(value: Value) -> Result<ChangeBatch> {
    Ok(serde_json::from_value(value)?)
}

/// One item of a listener's sequence.
#[derive(Clone, Debug, PartialEq)]
pub enum Emission<T> {
    /// Next value.
    Next(T),
    /// The sequence errored. Terminal.
    Failed(String),
    /// The sequence ended. Terminal.
    Completed,
}

impl<T> Emission<T> {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Emission::Next(_))
    }
}

/// Opaque remote-side filter/sort/limit, passed through to the source.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QueryFilter(pub Value);

impl QueryFilter {
    pub fn new(spec: Value) -> Self {
        QueryFilter(spec)
    }
}

/// One step from a record down to a nested entity.
#[derive(Clone, PartialEq, Eq, Hash)]
pub enum Step {
    /// Object field by name.
    Field(String),
    /// Array element whose id field equals the given id.
    Element(String),
}

impl fmt::Debug for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::Field(key) => write!(f, ".{}", key),
            Step::Element(id) => write!(f, "[{}]", id),
        }
    }
}

/// Location of an entity in the flat store.
///
/// Root entities have no steps. A todo embedded in `users/u1` under the
/// `todos` field lives at `u1.todos[t1]`.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Slot {
    pub root: String,
    pub steps: Vec<Step>,
}

impl Slot {
    /// Slot of a top-level record.
    pub fn root(id: impl Into<String>) -> Self {
        Self {
            root: id.into(),
            steps: Vec::new(),
        }
    }

    pub fn is_root(&self) -> bool {
        self.steps.is_empty()
    }

    /// Slot of the value stored under `key` of this entity.
    pub fn field(&self, key: impl Into<String>) -> Self {
        let mut steps = self.steps.clone();
        steps.push(Step::Field(key.into()));
        Self {
            root: self.root.clone(),
            steps,
        }
    }

    /// Slot of the element `id` in the array stored under `key`.
    pub fn element(&self, key: impl Into<String>, id: impl Into<String>) -> Self {
        let mut slot = self.field(key);
        slot.steps.push(Step::Element(id.into()));
        slot
    }
}

impl fmt::Debug for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.root)?;
        for step in &self.steps {
            write!(f, "{:?}", step)?;
        }
        Ok(())
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Build `{id_key: id, ...data}`. The id always wins over a same-named data field.
pub fn with_id(id_key: &str, id: &str, mut data: Entity) -> Entity {
    data.insert(id_key.to_string(), Value::String(id.to_string()));
    data
}

/// Read the id of an entity value, if it carries one.
pub fn entity_id<'a>(value: &'a Value, id_key: &str) -> Option<&'a str> {
    value.get(id_key).and_then(Value::as_str)
}
