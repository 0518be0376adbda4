//! Builds criteria trees from JSON, resolving every key against metadata.

use serde_json::{json, Map, Value};
use tracing::trace;

use crate::error::{QueryError, QueryResult};
use crate::metadata::{EntityMetadata, EntityProperty, MetadataProvider, ReferenceKind};

use super::node::{CriteriaNode, Payload};
use super::operators::{is_operator, is_raw_key, is_scalar, is_unknown_operator, split_composite};

/// Build the tree for `payload` evaluated against `entity`.
pub fn create_node(
    metadata: &dyn MetadataProvider,
    entity: &str,
    payload: &Value,
) -> QueryResult<CriteriaNode> {
    metadata.get(entity)?;
    build(metadata, entity, payload, None, None, None)
}

fn build(
    metadata: &dyn MetadataProvider,
    entity: &str,
    payload: &Value,
    parent: Option<&CriteriaNode>,
    key: Option<&str>,
    index: Option<usize>,
) -> QueryResult<CriteriaNode> {
    if let Some(key) = key.filter(|k| is_unknown_operator(k)) {
        return Err(QueryError::UnknownOperator(key.to_string()));
    }

    let property = resolve_property(metadata, parent, key)?;
    let mut node = CriteriaNode::new(entity, parent, key, property, payload, index);
    let scalar = is_scalar(payload) || key.is_some_and(is_raw_key);

    let built = match payload {
        Value::Array(items) if !scalar => {
            // only multi-element $and branches get their own join paths
            let branching = key == Some("$and") && items.len() > 1;
            let children = items
                .iter()
                .enumerate()
                .map(|(i, item)| build(metadata, entity, item, Some(&node), None, branching.then_some(i)))
                .collect::<QueryResult<Vec<_>>>()?;
            Payload::Array(children)
        }
        Value::Object(map) if !scalar => {
            let meta = metadata.find(entity);
            let children = map
                .iter()
                .map(|(k, v)| build_object_item(metadata, entity, meta, &node, k, v))
                .collect::<QueryResult<Vec<_>>>()?;
            Payload::Object(children)
        }
        _ => Payload::Scalar(payload.clone()),
    };
    trace!(entity, key = ?key, kind = built.kind_name(), "classified criteria node");
    node.payload = built;

    Ok(node)
}

fn build_object_item(
    metadata: &dyn MetadataProvider,
    entity: &str,
    meta: Option<&EntityMetadata>,
    node: &CriteriaNode,
    key: &str,
    value: &Value,
) -> QueryResult<CriteriaNode> {
    let prop = meta.and_then(|m| m.prop(key));
    let child_entity = match prop {
        Some(p) if p.is_relation() => p.target_name().unwrap_or(entity),
        _ => entity,
    };

    // a list on a field means membership
    let normalized;
    let value = if value.is_array() && !is_operator(key) && !is_raw_key(key) {
        normalized = json!({ "$in": value });
        &normalized
    } else {
        value
    };

    match prop {
        Some(prop) if prop.kind == ReferenceKind::Embedded => {
            let flattened = flatten_embedded(entity, prop, value)?;
            build(metadata, entity, &flattened, Some(node), Some(key), None)
        }
        _ => build(metadata, child_entity, value, Some(node), Some(key), None),
    }
}

/// Rewrite criteria on an embeddable to its flattened properties.
fn flatten_embedded(entity: &str, prop: &EntityProperty, value: &Value) -> QueryResult<Value> {
    let mut flattened = Map::new();

    match value {
        Value::Null => {
            for name in prop.embedded.values() {
                flattened.insert(name.clone(), Value::Null);
            }
        }
        Value::Object(map) => {
            if map.keys().any(|k| is_operator(k)) {
                return Err(QueryError::OperatorInEmbeddable {
                    entity: entity.to_string(),
                    property: prop.name.clone(),
                });
            }
            for (k, v) in map {
                let name = prop.embedded.get(k).ok_or_else(|| QueryError::InvalidEmbeddableQuery {
                    entity: entity.to_string(),
                    property: prop.name.clone(),
                    key: k.clone(),
                })?;
                flattened.insert(name.clone(), v.clone());
            }
        }
        _ => {
            return Err(QueryError::invalid_criteria(format!(
                "embedded property {}.{} must be queried with an object",
                entity, prop.name
            )))
        }
    }

    Ok(Value::Object(flattened))
}

/// Property of the parent entity named by `key`, matched by name or column.
fn resolve_property(
    metadata: &dyn MetadataProvider,
    parent: Option<&CriteriaNode>,
    key: Option<&str>,
) -> QueryResult<Option<EntityProperty>> {
    let (Some(parent), Some(key)) = (parent, key) else {
        return Ok(None);
    };
    let Some(meta) = metadata.find(&parent.entity) else {
        return Ok(None);
    };
    if split_composite(key).len() > 1 {
        return Ok(None);
    }

    let prop = meta.prop(key).or_else(|| {
        meta.properties
            .iter()
            .find(|p| p.persist && p.field_names.len() == 1 && p.field_names[0] == key)
    });
    if prop.is_some() {
        return Ok(prop.cloned());
    }

    let known_column = meta.properties.iter().any(|p| p.field_names.iter().any(|f| f == key));
    // prefixed, cast, operator and raw keys are resolved later
    if !known_column && !key.contains('.') && !key.contains("::") && !is_operator(key) && !is_raw_key(key) {
        return Err(QueryError::unknown_property(&parent.entity, key));
    }

    Ok(None)
}
