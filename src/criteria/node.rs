//! Criteria tree nodes.

use serde_json::Value;

use crate::metadata::{EntityProperty, ReferenceKind};

use super::operators::{is_group_operator, is_raw_key, is_scalar, is_value_operator};
use crate::query::joins::PIVOT_SUFFIX;

/// Payload of a criteria node.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Scalar(Value),
    Array(Vec<CriteriaNode>),
    /// Children in key order; every child has a `key`.
    Object(Vec<CriteriaNode>),
}

impl Payload {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Payload::Scalar(_) => "scalar",
            Payload::Array(_) => "array",
            Payload::Object(_) => "object",
        }
    }
}

/// One node of the criteria tree.
///
/// `path` identifies the relation chain leading here (`Author.books.tags`) and
/// is what joins are keyed by. Branch indexes of multi-element `$and` groups
/// are kept in `indexed_path` and only enter a child's path when the child is
/// a to-many relation.
#[derive(Debug, Clone, PartialEq)]
pub struct CriteriaNode {
    /// Entity the payload is evaluated against.
    pub entity: String,
    pub key: Option<String>,
    /// Property of the parent entity named by `key`.
    pub property: Option<EntityProperty>,
    pub payload: Payload,
    pub path: String,
    pub indexed_path: String,
    /// Path of the parent; `None` at the root.
    pub parent_path: Option<String>,
    pub index: Option<usize>,
}

impl CriteriaNode {
    pub(crate) fn new(
        entity: &str,
        parent: Option<&CriteriaNode>,
        key: Option<&str>,
        property: Option<EntityProperty>,
        raw_payload: &Value,
        index: Option<usize>,
    ) -> Self {
        let add_parent_index = property.as_ref().is_some_and(|p| p.kind.is_to_many());
        let base = match parent {
            Some(parent) if add_parent_index => parent.indexed_path.clone(),
            Some(parent) => parent.path.clone(),
            None => entity.to_string(),
        };
        let segment = match key {
            Some(key) if !is_group_operator(key) => format!(".{}", key),
            _ => String::new(),
        };
        let own_index = index.map(|i| format!("[{}]", i)).unwrap_or_default();

        let mut path = format!("{}{}", base, segment);
        let mut indexed_path = format!("{}{}{}", base, own_index, segment);
        if is_pivot_join(key, property.as_ref(), raw_payload) {
            path.push_str(PIVOT_SUFFIX);
            indexed_path.push_str(PIVOT_SUFFIX);
        }

        Self {
            entity: entity.to_string(),
            key: key.map(Into::into),
            property,
            payload: Payload::Scalar(Value::Null),
            path,
            indexed_path,
            parent_path: parent.map(|p| p.path.clone()),
            index,
        }
    }

    pub fn is_root(&self) -> bool {
        self.parent_path.is_none()
    }

    /// Key of a child object node; children of objects always carry one.
    pub(crate) fn field(&self) -> &str {
        self.key.as_deref().unwrap_or_default()
    }

    pub(crate) fn is_raw_key(&self) -> bool {
        self.key.as_deref().is_some_and(is_raw_key)
    }

    /// Keys of an object payload.
    pub(crate) fn child_keys(&self) -> Vec<&str> {
        match &self.payload {
            Payload::Object(children) => children.iter().map(CriteriaNode::field).collect(),
            _ => Vec::new(),
        }
    }

    /// Whether a processed payload compares this node's relation directly,
    /// by key value or operators, rather than through nested criteria.
    fn compares_directly(&self, payload: &Value) -> bool {
        let scalar = is_scalar(payload) || self.is_raw_key();
        let operator = match payload {
            Value::Object(map) => map.keys().all(|k| is_value_operator(k)),
            _ => false,
        };
        scalar || operator
    }

    /// Nested criteria on a relation or embeddable whose processed keys move
    /// up into the parent.
    pub fn should_inline(&self, payload: &Value) -> bool {
        let Some(prop) = &self.property else {
            return false;
        };
        prop.kind != ReferenceKind::Scalar && payload.is_object() && !self.compares_directly(payload)
    }

    /// Criteria on a relation that is matched against key columns.
    pub fn should_rename(&self, payload: &Value) -> bool {
        let Some(prop) = &self.property else {
            return false;
        };
        if prop.join_columns.len() > 1 && prop.kind.is_relation() {
            return true;
        }
        match prop.kind {
            ReferenceKind::OneToOne => !prop.owner,
            ReferenceKind::OneToMany | ReferenceKind::ManyToMany => self.compares_directly(payload),
            _ => false,
        }
    }
}

/// Scalar or operator criteria on a many-to-many only need the pivot table.
fn is_pivot_join(key: Option<&str>, property: Option<&EntityProperty>, payload: &Value) -> bool {
    let (Some(key), Some(prop)) = (key, property) else {
        return false;
    };
    if prop.kind != ReferenceKind::ManyToMany {
        return false;
    }
    let operator = match payload {
        Value::Object(map) => map.keys().all(|k| is_value_operator(k)),
        _ => false,
    };
    is_scalar(payload) || is_raw_key(key) || operator
}
