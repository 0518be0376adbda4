//! Join descriptors and the per-builder join registry.
//!
//! A join is keyed by `owner_alias.property#alias` and remembers the criteria
//! path that created it, so later references to the same relation path reuse
//! the alias instead of joining twice.

use serde_json::{Map, Value};

use crate::metadata::{EntityMetadata, EntityProperty, ReferenceKind};
use crate::sql::query::Query;

use super::enums::JoinKind;

/// Suffix distinguishing a pivot-table join path from the target join path.
pub const PIVOT_SUFFIX: &str = "[pivot]";

/// One joined table.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinSpec {
    pub key: String,
    pub table: String,
    pub schema: Option<String>,
    pub alias: String,
    pub kind: JoinKind,
    pub owner_alias: String,
    pub property: String,
    /// `None` for derived-table joins.
    pub relation: Option<ReferenceKind>,
    /// Entity at `alias`; the pivot table name for pivot joins.
    pub target: String,
    /// Columns on this join's table.
    pub join_columns: Vec<String>,
    /// Columns on the owner's table, paired with `join_columns`.
    pub primary_keys: Vec<String>,
    pub inverse_join_columns: Vec<String>,
    /// Alias of the target join reached through this pivot join.
    pub inverse_alias: Option<String>,
    pub path: String,
    /// Extra ON criteria, already alias-qualified.
    pub cond: Map<String, Value>,
    /// `cond` before populate-where pushdown.
    pub original_cond: Option<Map<String, Value>>,
    pub subquery: Option<Box<Query>>,
    /// Aliases of joins rendered inside this join's parentheses.
    pub nested: Vec<String>,
    /// Columns of the joined table are selected.
    pub selected: bool,
    /// Requested through a populate hint.
    pub populated: bool,
}

impl JoinSpec {
    fn relation_join(
        owner_alias: &str,
        prop: &EntityProperty,
        alias: &str,
        kind: JoinKind,
        table: &EntityMetadata,
    ) -> Self {
        Self {
            key: format!("{}.{}#{}", owner_alias, prop.name, alias),
            table: table.table.clone(),
            schema: table.schema.clone(),
            alias: alias.to_string(),
            kind,
            owner_alias: owner_alias.to_string(),
            property: prop.name.clone(),
            relation: Some(prop.kind),
            target: table.name.clone(),
            join_columns: Vec::new(),
            primary_keys: Vec::new(),
            inverse_join_columns: Vec::new(),
            inverse_alias: None,
            path: String::new(),
            cond: Map::new(),
            original_cond: None,
            subquery: None,
            nested: Vec::new(),
            selected: false,
            populated: false,
        }
    }

    /// Join through a foreign key held by the owner.
    pub fn many_to_one(
        owner_alias: &str,
        prop: &EntityProperty,
        target: &EntityMetadata,
        alias: &str,
        kind: JoinKind,
    ) -> Self {
        Self {
            join_columns: prop.referenced_column_names.clone(),
            primary_keys: prop.join_columns.clone(),
            ..Self::relation_join(owner_alias, prop, alias, kind, target)
        }
    }

    /// One-to-many or one-to-one join; `mapped` is the owning property on
    /// the target for inverse sides.
    pub fn one_to_reference(
        owner_alias: &str,
        prop: &EntityProperty,
        mapped: Option<&EntityProperty>,
        target: &EntityMetadata,
        alias: &str,
        kind: JoinKind,
    ) -> Self {
        let (join_columns, primary_keys) = match (prop.owner, mapped) {
            (false, Some(owning)) => (
                owning.join_columns.clone(),
                owning.referenced_column_names.clone(),
            ),
            (false, None) => (prop.join_columns.clone(), Vec::new()),
            (true, _) => (
                prop.referenced_column_names.clone(),
                prop.join_columns.clone(),
            ),
        };

        Self {
            join_columns,
            primary_keys,
            inverse_join_columns: prop.referenced_column_names.clone(),
            ..Self::relation_join(owner_alias, prop, alias, kind, target)
        }
    }

    /// Pivot join of a many-to-many, plus the target join unless `kind` is
    /// [`JoinKind::Pivot`].
    pub fn many_to_many(
        owner_alias: &str,
        prop: &EntityProperty,
        target: &EntityMetadata,
        alias: &str,
        pivot_alias: &str,
        kind: JoinKind,
        path: &str,
    ) -> Vec<Self> {
        let pivot_table = prop.pivot_table.clone().unwrap_or_default();
        let pivot_path = if path.ends_with(PIVOT_SUFFIX) {
            path.to_string()
        } else {
            format!("{}{}", path, PIVOT_SUFFIX)
        };
        let pivot_kind = match kind {
            JoinKind::Inner => JoinKind::Inner,
            _ => JoinKind::Pivot,
        };

        let pivot = Self {
            key: format!("{}.{}#{}", owner_alias, prop.name, pivot_alias),
            table: pivot_table.clone(),
            schema: target.schema.clone(),
            alias: pivot_alias.to_string(),
            kind: pivot_kind,
            owner_alias: owner_alias.to_string(),
            property: prop.name.clone(),
            relation: Some(prop.kind),
            target: pivot_table,
            join_columns: prop.join_columns.clone(),
            primary_keys: prop.referenced_column_names.clone(),
            inverse_join_columns: prop.inverse_join_columns.clone(),
            inverse_alias: (kind != JoinKind::Pivot).then(|| alias.to_string()),
            path: pivot_path,
            cond: Map::new(),
            original_cond: None,
            subquery: None,
            nested: Vec::new(),
            selected: false,
            populated: false,
        };

        if kind == JoinKind::Pivot {
            return vec![pivot];
        }

        let target_join = Self {
            key: format!("{}.{}#{}", pivot_alias, prop.name, alias),
            join_columns: target.pk_columns(),
            primary_keys: prop.inverse_join_columns.clone(),
            path: path.to_string(),
            ..Self::relation_join(pivot_alias, prop, alias, kind, target)
        };

        vec![pivot, target_join]
    }

    /// Join of a derived table.
    pub fn derived(owner_alias: &str, query: Query, alias: &str, kind: JoinKind, entity: &str) -> Self {
        Self {
            key: format!("{}.__subquery__#{}", owner_alias, alias),
            table: String::new(),
            schema: None,
            alias: alias.to_string(),
            kind,
            owner_alias: owner_alias.to_string(),
            property: "__subquery__".into(),
            relation: None,
            target: entity.to_string(),
            join_columns: Vec::new(),
            primary_keys: Vec::new(),
            inverse_join_columns: Vec::new(),
            inverse_alias: None,
            path: format!("{}.__subquery__#{}", owner_alias, alias),
            cond: Map::new(),
            original_cond: None,
            subquery: Some(Box::new(query)),
            nested: Vec::new(),
            selected: false,
            populated: false,
        }
    }

    pub fn is_pivot(&self) -> bool {
        self.path.ends_with(PIVOT_SUFFIX)
    }

    pub fn is_to_many(&self) -> bool {
        self.relation.is_some_and(ReferenceKind::is_to_many)
    }
}

/// Joins of one builder, in creation order.
#[derive(Debug, Clone, Default)]
pub struct JoinRegistry {
    joins: Vec<JoinSpec>,
}

impl JoinRegistry {
    /// Add a join, replacing one with the same key.
    pub fn insert(&mut self, spec: JoinSpec) {
        match self.joins.iter_mut().find(|j| j.key == spec.key) {
            Some(existing) => *existing = spec,
            None => self.joins.push(spec),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &JoinSpec> {
        self.joins.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut JoinSpec> {
        self.joins.iter_mut()
    }

    pub fn by_alias(&self, alias: &str) -> Option<&JoinSpec> {
        self.joins.iter().find(|j| j.alias == alias)
    }

    pub fn by_alias_mut(&mut self, alias: &str) -> Option<&mut JoinSpec> {
        self.joins.iter_mut().find(|j| j.alias == alias)
    }

    pub fn by_path(&self, path: &str) -> Option<&JoinSpec> {
        self.joins.iter().find(|j| j.path == path)
    }

    /// Join of `owner_alias.property`, if any.
    pub fn by_property(&self, owner_alias: &str, property: &str) -> Option<&JoinSpec> {
        self.joins
            .iter()
            .find(|j| j.owner_alias == owner_alias && j.property == property)
    }

    /// Alias that criteria reaching `path` should qualify columns with.
    pub fn alias_for_path(&self, path: &str) -> Option<String> {
        let join = self.by_path(path)?;
        if join.is_pivot() {
            return Some(join.alias.clone());
        }
        Some(join.inverse_alias.clone().unwrap_or_else(|| join.alias.clone()))
    }

    pub fn has_to_many(&self) -> bool {
        self.joins.iter().any(JoinSpec::is_to_many)
    }

    pub fn retain(&mut self, keep: impl FnMut(&JoinSpec) -> bool) {
        self.joins.retain(keep);
    }

    pub fn clear(&mut self) {
        self.joins.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.joins.is_empty()
    }

    pub fn len(&self) -> usize {
        self.joins.len()
    }
}
