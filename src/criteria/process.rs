//! Criteria tree processing.
//!
//! Processing walks the tree once, registering the joins relation criteria
//! need and returning the criteria with every key rewritten to the column it
//! compares, qualified by the alias of the table that holds it.

use serde_json::{Map, Value};
use tracing::trace;

use crate::error::QueryResult;
use crate::metadata::{EntityProperty, ReferenceKind};
use crate::query::{JoinKind, QueryBuilder};

use super::node::{CriteriaNode, Payload};
use super::operators::{
    composite_key, is_group_operator, is_operator, is_raw_key, is_value_operator, split_composite,
};

/// Placeholder for the owner alias in formulas and raw keys.
pub const ALIAS_PLACEHOLDER: &str = "{alias}";

impl CriteriaNode {
    /// Process the tree against `qb`; `alias` defaults to the root alias.
    pub fn process(&self, qb: &mut QueryBuilder<'_>, alias: Option<&str>) -> QueryResult<Value> {
        match &self.payload {
            Payload::Scalar(value) => self.process_scalar(qb, alias, value),
            Payload::Array(items) => items
                .iter()
                .map(|item| item.process(qb, alias))
                .collect::<QueryResult<Vec<_>>>()
                .map(Value::Array),
            Payload::Object(children) => self.process_object(qb, alias, children),
        }
    }

    /// Whether processing will add joins to `qb`.
    pub fn will_auto_join(&self, qb: &QueryBuilder<'_>) -> bool {
        match &self.payload {
            Payload::Scalar(_) => self.should_join(qb.alias_for_join_path(&self.path).as_deref()),
            Payload::Array(items) => items.iter().any(|item| item.will_auto_join(qb)),
            Payload::Object(children) => {
                let nested = self.nested_alias(qb);
                self.should_auto_join(qb, nested.as_deref())
                    || children.iter().any(|child| child.will_auto_join(qb))
            }
        }
    }

    fn nested_alias(&self, qb: &QueryBuilder<'_>) -> Option<String> {
        if self.is_root() {
            return None;
        }
        qb.alias_for_join_path(&self.path)
    }

    fn process_scalar(
        &self,
        qb: &mut QueryBuilder<'_>,
        alias: Option<&str>,
        value: &Value,
    ) -> QueryResult<Value> {
        let nested_alias = qb.alias_for_join_path(&self.path);

        if let (true, Some(prop)) = (self.should_join(nested_alias.as_deref()), &self.property) {
            let owner = alias.map(str::to_string).unwrap_or_else(|| qb.root_alias().to_string());
            let target = prop.pivot_table.as_deref().unwrap_or(&self.entity);
            let nested = qb.next_alias(target);
            let kind = match prop.kind {
                ReferenceKind::ManyToMany => JoinKind::Pivot,
                _ => JoinKind::Left,
            };
            qb.join_reference(&owner, &prop.name, &nested, kind, None, Some(self.path.clone()))?;

            // the inverse side has no column; select the owner key under the property name
            let parent_is_root = self.parent_path.as_deref().is_some_and(|p| !p.contains('.'));
            if prop.is_one_to_one_inverse() && parent_is_root {
                qb.add_inverse_select(&prop.name, &nested)?;
            }
        }

        Ok(value.clone())
    }

    fn should_join(&self, nested_alias: Option<&str>) -> bool {
        let Some(prop) = &self.property else {
            return false;
        };
        if self.is_root() || nested_alias.is_some() {
            return false;
        }
        match prop.kind {
            ReferenceKind::OneToMany | ReferenceKind::ManyToMany => true,
            ReferenceKind::OneToOne => !prop.owner,
            _ => false,
        }
    }

    fn should_auto_join(&self, qb: &QueryBuilder<'_>, nested_alias: Option<&str>) -> bool {
        let Some(prop) = &self.property else {
            return false;
        };
        if self.is_root() || nested_alias.is_some() {
            return false;
        }
        if matches!(prop.kind, ReferenceKind::Scalar | ReferenceKind::Embedded) {
            return false;
        }

        let keys = self.child_keys();
        let root_prefix = format!("{}.", qb.root_alias());
        if keys.iter().all(|k| k.starts_with(&root_prefix)) {
            return false;
        }

        let known_key = prop.holds_foreign_key();
        let operator_keys = known_key && keys.iter().all(|k| is_value_operator(k));
        let primary_keys = known_key && self.only_primary_keys(qb);

        !operator_keys && !primary_keys
    }

    /// Criteria on a to-one relation naming only the target's primary key,
    /// which the owner's foreign key already holds.
    fn only_primary_keys(&self, qb: &QueryBuilder<'_>) -> bool {
        let Some(meta) = qb.metadata().find(&self.entity) else {
            return false;
        };
        let Payload::Object(children) = &self.payload else {
            return false;
        };

        children.iter().all(|child| {
            let key = child.field();
            if !meta.primary_keys.iter().any(|pk| pk == key) {
                return false;
            }
            let pk_prop = meta.prop(key);
            let nested = match &child.payload {
                Payload::Object(grand) if pk_prop.is_some_and(EntityProperty::holds_foreign_key) => grand,
                _ => return true,
            };
            let target = pk_prop
                .and_then(|p| p.target_name())
                .and_then(|t| qb.metadata().find(t));
            match target {
                Some(target) => nested.iter().all(|g| target.primary_keys.iter().any(|pk| pk == g.field())),
                None => false,
            }
        })
    }

    fn auto_join(&self, qb: &mut QueryBuilder<'_>, owner_alias: &str) -> QueryResult<String> {
        let Some(prop) = &self.property else {
            return Ok(owner_alias.to_string());
        };
        let pivot_only = prop.kind == ReferenceKind::ManyToMany && self.path.ends_with("[pivot]");
        let (kind, name) = match (pivot_only, prop.pivot_table.as_deref()) {
            (true, Some(pivot)) => (JoinKind::Pivot, pivot),
            _ => (JoinKind::Left, self.entity.as_str()),
        };

        let alias = qb.next_alias(name);
        trace!(path = %self.path, alias = %alias, "auto-joining relation");
        qb.join_reference(owner_alias, &prop.name, &alias, kind, None, Some(self.path.clone()))?;
        Ok(alias)
    }

    fn process_object(
        &self,
        qb: &mut QueryBuilder<'_>,
        alias: Option<&str>,
        children: &[CriteriaNode],
    ) -> QueryResult<Value> {
        let owner_alias = alias.map(str::to_string).unwrap_or_else(|| qb.root_alias().to_string());
        let nested_alias = self.nested_alias(qb);
        let mut alias = nested_alias.clone().unwrap_or_else(|| owner_alias.clone());

        if self.should_auto_join(qb, nested_alias.as_deref()) {
            alias = self.auto_join(qb, &owner_alias)?;
        }

        let child_alias_param = if self.property.is_some() { &alias } else { &owner_alias };
        let mut out = Map::new();

        for child in children {
            let field = child.field();
            let payload = child.process(qb, Some(child_alias_param))?;

            // `{"relation": {}}` places no condition on the relation
            let relation = child.property.as_ref().is_some_and(|p| p.target_name().is_some());
            if relation && payload.as_object().is_some_and(Map::is_empty) {
                trace!(path = %child.path, "skipping empty relation criteria");
                continue;
            }

            if child.should_inline(&payload) {
                let child_alias = qb.alias_for_join_path(&child.path);
                let qualifier = qb.aliased().then_some(alias.as_str());
                self.inline_child_payload(qb, &mut out, payload, child, qualifier, child_alias.as_deref())?;
            } else if child.should_rename(&payload) {
                let key = child.rename_field_to_pk(qb);
                inline_condition(&mut out, key, payload);
            } else if is_raw_key(field) {
                inline_condition(&mut out, field.replace(ALIAS_PLACEHOLDER, &alias), payload);
            } else if is_operator(field) {
                inline_condition(&mut out, field.to_string(), payload);
            } else if field.contains('.') {
                let key = qb.resolve_dotted_key(field)?;
                inline_condition(&mut out, key, payload);
            } else {
                let primary = self.key.is_some() && self.is_primary_key(qb, field);
                let virtual_prop = child
                    .property
                    .as_ref()
                    .is_some_and(|p| !p.persist && p.formula.is_none());
                let qualify = qb.aliased() && !primary && !virtual_prop;
                inline_condition(&mut out, field_key(child.property.as_ref(), field, &alias, qualify), payload);
            }
        }

        Ok(Value::Object(out))
    }

    fn is_primary_key(&self, qb: &QueryBuilder<'_>, field: &str) -> bool {
        qb.metadata()
            .find(&self.entity)
            .is_some_and(|m| m.primary_keys.iter().any(|pk| pk == field))
    }

    /// Key columns a relation is compared by.
    fn rename_field_to_pk(&self, qb: &QueryBuilder<'_>) -> String {
        let Some(prop) = &self.property else {
            return self.field().to_string();
        };
        let join_alias = qb.alias_for_join_path(&self.path);

        if join_alias.is_none() && prop.holds_foreign_key() {
            let alias = self
                .parent_path
                .as_deref()
                .and_then(|p| qb.alias_for_join_path(p))
                .unwrap_or_else(|| qb.root_alias().to_string());
            return qualified_columns(&alias, &prop.join_columns);
        }

        let alias = join_alias.unwrap_or_else(|| qb.root_alias().to_string());
        match prop.kind {
            ReferenceKind::ManyToMany => qualified_columns(&alias, &prop.inverse_join_columns),
            _ => qualified_columns(&alias, &prop.referenced_column_names),
        }
    }

    /// Move processed criteria of `child` into `out`.
    fn inline_child_payload(
        &self,
        qb: &QueryBuilder<'_>,
        out: &mut Map<String, Value>,
        payload: Value,
        child: &CriteriaNode,
        alias: Option<&str>,
        child_alias: Option<&str>,
    ) -> QueryResult<()> {
        let Value::Object(map) = payload else {
            return Ok(());
        };
        let Some(prop) = child.property.as_ref() else {
            return Ok(());
        };

        for (k, v) in map {
            if is_value_operator(&k) {
                let key = field_key(Some(prop), child.field(), alias.unwrap_or_default(), alias.is_some());
                merge_operator(out, key, k, v);
            } else if is_group_operator(&k) && v.is_array() {
                let mut branches = Vec::new();
                if let Value::Array(items) = v {
                    for item in items {
                        let mut branch = Map::new();
                        self.inline_child_payload(qb, &mut branch, item, child, alias, child_alias)?;
                        branches.push(Value::Object(branch));
                    }
                }
                inline_condition(out, k, Value::Array(branches));
            } else if k.contains('.') || is_operator(&k) || child_alias.is_none() {
                let index = prop.referenced_column_names.iter().position(|c| *c == k);
                let key = match index {
                    Some(i) if child_alias.is_none() && !prop.kind.is_to_many() => {
                        let column = prop.join_columns.get(i).cloned().unwrap_or(k);
                        match alias {
                            Some(alias) => format!("{}.{}", alias, column),
                            None => column,
                        }
                    }
                    _ => k,
                };
                inline_condition(out, key, v);
            } else if let Some(child_alias) = child_alias {
                inline_condition(out, format!("{}.{}", child_alias, k), v);
            }
        }

        Ok(())
    }
}

/// Criteria key for a property: its column(s) or its formula.
fn field_key(prop: Option<&EntityProperty>, field: &str, alias: &str, qualify: bool) -> String {
    let Some(prop) = prop else {
        let keys: Vec<String> = split_composite(field)
            .into_iter()
            .map(|c| qualify_column(alias, c, qualify))
            .collect();
        return composite_key(&keys);
    };

    if let Some(formula) = &prop.formula {
        return if qualify {
            formula.replace(ALIAS_PLACEHOLDER, alias)
        } else {
            formula.replace(&format!("{}.", ALIAS_PLACEHOLDER), "")
        };
    }

    let columns: Vec<String> = if prop.field_names.is_empty() {
        vec![field.to_string()]
    } else {
        prop.field_names.clone()
    };
    let keys: Vec<String> = columns
        .iter()
        .map(|c| qualify_column(alias, c, qualify))
        .collect();
    composite_key(&keys)
}

fn qualify_column(alias: &str, column: &str, qualify: bool) -> String {
    if qualify && !alias.is_empty() {
        format!("{}.{}", alias, column)
    } else {
        column.to_string()
    }
}

fn qualified_columns(alias: &str, columns: &[String]) -> String {
    let keys: Vec<String> = columns.iter().map(|c| format!("{}.{}", alias, c)).collect();
    composite_key(&keys)
}

/// Insert `key: value`, moving both sides of a collision into `$and`.
pub(crate) fn inline_condition(out: &mut Map<String, Value>, key: String, value: Value) {
    let Some(existing) = out.shift_remove(&key) else {
        out.insert(key, value);
        return;
    };

    let mut first = Map::new();
    first.insert(key.clone(), existing);
    let mut second = Map::new();
    second.insert(key, value);

    match out.get_mut("$and") {
        Some(Value::Array(items)) => {
            items.push(Value::Object(first));
            items.push(Value::Object(second));
        }
        _ => {
            out.insert(
                "$and".into(),
                Value::Array(vec![Value::Object(first), Value::Object(second)]),
            );
        }
    }
}

/// Add `op: value` to the operator map at `key`.
fn merge_operator(out: &mut Map<String, Value>, key: String, op: String, value: Value) {
    match out.get_mut(&key) {
        Some(Value::Object(ops)) if !ops.contains_key(&op) => {
            ops.insert(op, value);
        }
        Some(_) => {
            let mut ops = Map::new();
            ops.insert(op, value);
            inline_condition(out, key, Value::Object(ops));
        }
        None => {
            let mut ops = Map::new();
            ops.insert(op, value);
            out.insert(key, Value::Object(ops));
        }
    }
}
