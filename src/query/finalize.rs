//! One-shot finalization of a builder before assembly.

use std::collections::BTreeMap;

use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::criteria::create_node;
use crate::criteria::inline_condition;
use crate::error::{QueryError, QueryResult};
use crate::metadata::EntityMetadata;
use crate::sql::{raw_sql, ExprExt};

use super::builder::{Field, QueryBuilder};
use super::condition::Predicate;
use super::enums::{JoinKind, PopulateFilter, PopulateWhere, QueryFlag, QueryKind};

impl QueryBuilder<'_> {
    /// Apply implicit joins, conditions and wrappers. Runs once.
    ///
    /// A failed pass leaves the builder as it was before the call, so later
    /// terminal calls fail the same way.
    pub(crate) fn finalize(&mut self) -> QueryResult<()> {
        if self.finalized {
            return Ok(());
        }

        let snapshot = self.clone();
        match self.run_finalize() {
            Ok(()) => {
                self.finalized = true;
                Ok(())
            }
            Err(err) => {
                *self = snapshot;
                Err(err)
            }
        }
    }

    fn run_finalize(&mut self) -> QueryResult<()> {
        let kind = *self.kind.get_or_insert(QueryKind::Select);
        let metadata = self.metadata;
        let meta = metadata.get(&self.entity)?;

        if kind == QueryKind::Select && self.fields.is_empty() {
            self.fields.push(Field::from("*"));
        }
        self.validate(kind)?;

        if meta.is_sti_child() && kind != QueryKind::Insert && kind != QueryKind::Truncate {
            let alias = self.alias.clone();
            let cond = self.discriminator_condition(meta, &alias);
            let predicate = Predicate::Criteria(Value::Object(cond));
            self.cond = Some(match self.cond.take() {
                Some(existing) => existing.and(predicate),
                None => predicate,
            });
        }

        if kind == QueryKind::Select {
            self.apply_populate(meta)?;
            self.apply_formulas(meta);
        }
        if kind.is_read() {
            self.apply_populate_where()?;
            self.apply_nested_joins();
        }

        if kind == QueryKind::Select
            && self.group_by.is_empty()
            && self.joins.has_to_many()
            && !self.flags.contains(&QueryFlag::DisablePaginate)
        {
            self.flags.insert(QueryFlag::Paginate);
        }
        if self.flags.contains(&QueryFlag::Paginate) && (self.limit.is_some() || self.offset.is_some()) {
            self.wrap_paginate_subquery()?;
        }
        if self.flags.contains(&QueryFlag::UpdateSubQuery) || self.flags.contains(&QueryFlag::DeleteSubQuery) {
            self.wrap_modify_subquery()?;
        }

        debug!(
            entity = %self.entity,
            kind = kind.as_str(),
            joins = self.joins.len(),
            flags = ?self.flags,
            "finalized query"
        );
        Ok(())
    }

    fn validate(&self, kind: QueryKind) -> QueryResult<()> {
        match kind {
            QueryKind::Insert | QueryKind::Update if self.data.is_empty() => {
                Err(QueryError::MissingData(kind.as_str()))
            }
            QueryKind::Select if self.fields.is_empty() => Err(QueryError::MissingFields),
            _ => Ok(()),
        }
    }

    // =========================================================================
    // Populate
    // =========================================================================

    fn apply_populate(&mut self, meta: &EntityMetadata) -> QueryResult<()> {
        let selects_all = self.fields.iter().any(|f| matches!(f, Field::Key(k) if k == "*"));
        let auto_owner = selects_all && self.flags.contains(&QueryFlag::AutoJoinOneToOneOwner);

        // inverse one-to-one sides have no column on the root table
        let requested: Vec<String> = self
            .fields
            .iter()
            .filter_map(|f| match f {
                Field::Key(k) => Some(k.clone()),
                Field::Expr(_) => None,
            })
            .collect();
        for prop in meta.properties.iter().filter(|p| p.is_one_to_one_inverse()) {
            if !(auto_owner || requested.contains(&prop.name)) {
                continue;
            }
            let root = self.alias.clone();
            let alias = match self.joins.by_property(&root, &prop.name) {
                Some(join) => join.alias.clone(),
                None => {
                    let target = prop.target_name().unwrap_or(&prop.name);
                    let alias = self.next_alias(target);
                    self.join_reference(&root, &prop.name, &alias, JoinKind::Left, None, None)?;
                    alias
                }
            };
            self.add_inverse_select(&prop.name, &alias)?;
        }
        self.fields
            .retain(|f| !matches!(f, Field::Key(k) if meta.prop(k).is_some_and(|p| p.is_one_to_one_inverse())));

        let hints = std::mem::take(&mut self.populate);
        for hint in &hints {
            self.populate_path(hint)?;
        }
        self.populate = hints;
        Ok(())
    }

    /// Join every segment of `hint` and select the joined columns.
    fn populate_path(&mut self, hint: &str) -> QueryResult<()> {
        let metadata = self.metadata;
        let mut owner_alias = self.alias.clone();
        let mut owner_entity = self.entity.clone();
        let mut path = self.entity.clone();

        for segment in hint.split('.').filter(|s| !s.is_empty()) {
            path = format!("{}.{}", path, segment);
            let owner = metadata.get(&owner_entity)?;
            let prop = owner
                .prop(segment)
                .ok_or_else(|| QueryError::unknown_property(&owner.name, segment))?;
            let target = prop.target_name().ok_or_else(|| QueryError::NotARelation {
                entity: owner.name.clone(),
                property: segment.to_string(),
            })?;

            let alias = match self.joins.alias_for_path(&path) {
                Some(alias) => alias,
                None => {
                    let alias = self.next_alias(target);
                    self.join_reference(&owner_alias, segment, &alias, JoinKind::Left, None, Some(path.clone()))?;
                    alias
                }
            };
            if let Some(join) = self.joins.by_alias_mut(&alias) {
                join.selected = true;
                join.populated = true;
            }

            owner_alias = alias;
            owner_entity = target.to_string();
        }
        Ok(())
    }

    /// Formula properties of the root when selecting everything.
    fn apply_formulas(&mut self, meta: &EntityMetadata) {
        let root_star = format!("{}.*", self.alias);
        let selects_all = self
            .fields
            .iter()
            .any(|f| matches!(f, Field::Key(k) if k == "*" || *k == root_star));
        if !selects_all {
            return;
        }

        for prop in meta.formulas() {
            let Some(formula) = prop.formula.as_deref() else {
                continue;
            };
            let sql = formula.replace(crate::criteria::ALIAS_PLACEHOLDER, &self.alias);
            self.fields.push(Field::Expr(raw_sql(&sql).alias(&prop.name)));
        }
    }

    // =========================================================================
    // Populate where
    // =========================================================================

    fn apply_populate_where(&mut self) -> QueryResult<()> {
        self.original_cond = self.cond.clone();
        for join in self.joins.iter_mut() {
            join.original_cond = Some(join.cond.clone());
        }

        let filter = self
            .populate_where
            .clone()
            .unwrap_or(PopulateFilter::Policy(self.options.populate_where));

        match filter {
            PopulateFilter::Policy(PopulateWhere::All) => Ok(()),
            PopulateFilter::Policy(PopulateWhere::Infer) => {
                if let Some(cond) = self.cond.take() {
                    self.cond = self.push_down(cond);
                }
                Ok(())
            }
            PopulateFilter::Criteria(criteria) => {
                let metadata = self.metadata;
                let node = create_node(metadata, &self.entity, &criteria)?;
                // joins requested by these criteria are not added to the query
                let mut scratch = self.clone();
                if let Value::Object(map) = node.process(&mut scratch, None)? {
                    for key in self.push_fragments(map).keys() {
                        warn!(key = %key, "populate where fragment matches no join, ignoring");
                    }
                }
                Ok(())
            }
        }
    }

    /// Move criteria on outer-joined aliases from WHERE into their ON clause.
    fn push_down(&mut self, cond: Predicate) -> Option<Predicate> {
        match cond {
            Predicate::Criteria(Value::Object(map)) => {
                let rest = self.push_fragments(map);
                (!rest.is_empty()).then(|| Predicate::Criteria(Value::Object(rest)))
            }
            Predicate::And(items) => {
                let rest: Vec<Predicate> = items.into_iter().filter_map(|p| self.push_down(p)).collect();
                match rest.len() {
                    0 => None,
                    1 => rest.into_iter().next(),
                    _ => Some(Predicate::And(rest)),
                }
            }
            other => Some(other),
        }
    }

    /// Push `alias.column` entries into matching joins; returns the rest.
    fn push_fragments(&mut self, map: Map<String, Value>) -> Map<String, Value> {
        let mut rest = Map::new();
        for (key, value) in map {
            let alias = key.split_once('.').map(|(alias, _)| alias.to_string());
            let join = alias
                .as_deref()
                .filter(|alias| *alias != self.alias)
                .and_then(|alias| self.joins.by_alias_mut(alias))
                .filter(|join| matches!(join.kind, JoinKind::Left | JoinKind::NestedLeft | JoinKind::Pivot));

            match join {
                Some(join) => {
                    debug!(alias = %join.alias, key = %key, "moved condition into join");
                    inline_condition(&mut join.cond, key, value);
                }
                None => {
                    if let Some(alias) = alias.filter(|a| *a != self.alias && self.aliases.get(a).is_some()) {
                        warn!(alias = %alias, key = %key, "condition stays in where, alias is not an outer join");
                    }
                    rest.insert(key, value);
                }
            }
        }
        rest
    }

    // =========================================================================
    // Nested joins
    // =========================================================================

    /// Render inner joins under outer joins inside the parent's parentheses.
    fn apply_nested_joins(&mut self) {
        if self.flags.contains(&QueryFlag::DisableNestedInnerJoin) {
            return;
        }

        let order: Vec<(String, String, JoinKind)> = self
            .joins
            .iter()
            .map(|j| (j.alias.clone(), j.owner_alias.clone(), j.kind))
            .collect();
        let mut kinds: BTreeMap<String, JoinKind> =
            order.iter().map(|(alias, _, kind)| (alias.clone(), *kind)).collect();

        for (alias, owner, kind) in order {
            let Some(parent) = kinds.get(&owner).copied() else {
                continue;
            };
            let nested = match (kind, parent) {
                (JoinKind::Inner, JoinKind::Left | JoinKind::Pivot | JoinKind::NestedLeft) => JoinKind::NestedInner,
                (JoinKind::Left, JoinKind::NestedInner | JoinKind::NestedLeft) => JoinKind::NestedLeft,
                _ => continue,
            };

            kinds.insert(alias.clone(), nested);
            if let Some(join) = self.joins.by_alias_mut(&alias) {
                join.kind = nested;
            }
            if let Some(parent) = self.joins.by_alias_mut(&owner) {
                parent.nested.push(alias);
            }
        }
    }
}
