//! Query shape validation and parsing of dynamic (JSON) queries.

use super::types::{QueryDescriptor, Subquery, SyncTarget};
use crate::error::{Result, SyncError};
use crate::path;
use crate::types::QueryFilter;
use serde_json::{Map, Value};

/// Check that a descriptor and every statically known child is well formed.
///
/// Lazy children can only be checked once resolved.
pub fn validate_descriptor(desc: &QueryDescriptor) -> Result<()> {
    if path::segments(&desc.path).next().is_none() {
        return Err(SyncError::InvalidQueryShape(format!(
            "empty path {:?}",
            desc.path
        )));
    }

    if desc.filter.is_some() && desc.is_document() {
        return Err(SyncError::InvalidQueryShape(format!(
            "filter on document path {}",
            desc.path
        )));
    }

    for (key, spec) in &desc.children {
        if key.is_empty() {
            return Err(SyncError::InvalidQueryShape(format!(
                "empty child key under {}",
                desc.path
            )));
        }
        validate_subquery(spec)?;
    }

    Ok(())
}

fn validate_subquery(spec: &Subquery) -> Result<()> {
    match spec {
        Subquery::Static(_) | Subquery::Lazy(_) => Ok(()),
        Subquery::Single(desc) => validate_descriptor(desc),
        Subquery::Array(items) => items.iter().try_for_each(validate_subquery),
    }
}

/// Check a sync target before any listener is opened.
pub fn validate_target(target: &SyncTarget) -> Result<()> {
    match target {
        SyncTarget::Path(p) => validate_descriptor(&QueryDescriptor::new(p.as_str())),
        SyncTarget::Descriptor(desc) => validate_descriptor(desc),
        SyncTarget::Many(members) => {
            if members.is_empty() {
                return Err(SyncError::InvalidQueryShape("empty query list".into()));
            }
            members.iter().try_for_each(validate_target)
        }
    }
}

impl SyncTarget {
    /// Parse a dynamically shaped query: a path string, an array of queries,
    /// or an object with a string `path`, optional `filter` (alias `queryFn`)
    /// and optional `children` map.
    pub fn from_json(value: &Value) -> Result<Self> {
        match value {
            Value::String(p) => Ok(SyncTarget::Path(p.clone())),
            Value::Array(items) => items
                .iter()
                .map(SyncTarget::from_json)
                .collect::<Result<Vec<_>>>()
                .map(SyncTarget::Many),
            Value::Object(obj) => descriptor_from_object(obj).map(SyncTarget::Descriptor),
            other => Err(SyncError::InvalidQueryShape(format!(
                "expected path, descriptor or array, got {}",
                other
            ))),
        }
    }
}

fn is_descriptor(value: &Value) -> bool {
    value.get("path").map_or(false, Value::is_string)
}

fn descriptor_from_object(obj: &Map<String, Value>) -> Result<QueryDescriptor> {
    let path = obj
        .get("path")
        .and_then(Value::as_str)
        .ok_or_else(|| SyncError::InvalidQueryShape("descriptor without string path".into()))?;

    let mut desc = QueryDescriptor::new(path);
    desc.filter = obj
        .get("filter")
        .or_else(|| obj.get("queryFn"))
        .cloned()
        .map(QueryFilter);

    match obj.get("children") {
        None | Some(Value::Null) => {}
        Some(Value::Object(children)) => {
            for (key, child) in children {
                desc.children.insert(key.clone(), subquery_from_json(child)?);
            }
        }
        Some(other) => {
            return Err(SyncError::InvalidQueryShape(format!(
                "children of {} must be an object, got {}",
                path, other
            )))
        }
    }

    Ok(desc)
}

fn subquery_from_json(value: &Value) -> Result<Subquery> {
    match value {
        Value::Object(obj) if is_descriptor(value) => {
            descriptor_from_object(obj).map(Subquery::Single)
        }
        Value::Array(items) if items.iter().any(|i| is_descriptor(i) || i.is_array()) => items
            .iter()
            .map(subquery_from_json)
            .collect::<Result<Vec<_>>>()
            .map(Subquery::Array),
        other => Ok(Subquery::Static(other.clone())),
    }
}

/// Whether `value` parses into a valid sync target.
pub fn is_valid_query(value: &Value) -> bool {
    SyncTarget::from_json(value)
        .and_then(|target| validate_target(&target))
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::types::{collection_descriptor, document_descriptor};
    use serde_json::json;

    #[test]
    fn test_parse_nested() {
        let target = SyncTarget::from_json(&json!({
            "path": "users/u1",
            "children": {
                "todos": {"path": "users/u1/todos", "queryFn": {"limit": 10}},
                "friends": [{"path": "users/u2"}, {"path": "users/u3"}],
                "tags": ["a", "b"],
                "role": "admin"
            }
        }))
        .unwrap();

        let desc = match target {
            SyncTarget::Descriptor(desc) => desc,
            other => panic!("Expected Descriptor, got {:?}", other),
        };
        assert_eq!(desc.path, "users/u1");
        match &desc.children["todos"] {
            Subquery::Single(todos) => {
                assert_eq!(todos.filter, Some(QueryFilter(json!({"limit": 10}))))
            }
            other => panic!("Expected Single, got {:?}", other),
        }
        assert!(matches!(&desc.children["friends"], Subquery::Array(items) if items.len() == 2));
        assert!(matches!(&desc.children["tags"], Subquery::Static(Value::Array(_))));
        assert!(matches!(&desc.children["role"], Subquery::Static(_)));
    }

    #[test]
    fn test_parse_rejects_bad_shapes() {
        for bad in [json!(42), json!(null), json!({"name": "x"}), json!({"path": 3})] {
            let err = SyncTarget::from_json(&bad).unwrap_err();
            assert!(matches!(err, SyncError::InvalidQueryShape(_)), "{}", bad);
        }
        assert!(SyncTarget::from_json(&json!(["users", 7])).is_err());
        assert!(SyncTarget::from_json(&json!({"path": "users", "children": [1]})).is_err());
    }

    #[test]
    fn test_validate() {
        assert!(validate_target(&"users".into()).is_ok());
        assert!(validate_target(&"".into()).is_err());
        assert!(validate_target(&"//".into()).is_err());
        assert!(validate_target(&SyncTarget::Many(vec![])).is_err());

        let bad_child =
            document_descriptor("users/u1").child("todos", collection_descriptor("", None));
        assert!(validate_target(&bad_child.into()).is_err());

        let filtered_doc = document_descriptor("users/u1").with_filter(QueryFilter(json!({})));
        assert!(validate_target(&filtered_doc.into()).is_err());

        let empty_key = document_descriptor("users/u1").child("", json!(1));
        assert!(validate_target(&empty_key.into()).is_err());
    }

    #[test]
    fn test_is_valid_query() {
        assert!(is_valid_query(&json!("users")));
        assert!(is_valid_query(&json!(["users", {"path": "teams/t1"}])));
        assert!(!is_valid_query(&json!([])));
        assert!(!is_valid_query(&json!(true)));
    }
}
