//! The query builder session.
//!
//! A [`QueryBuilder`] collects the pieces of one statement. Criteria are
//! processed as soon as they are added, so joins and aliases exist before
//! finalize runs. Finalize runs once, on the first terminal call; after it
//! every mutator fails with [`QueryError::AlreadyFinalized`].
//!
//! # Example
//!
//! ```ignore
//! use criteria_sql::prelude::*;
//! use serde_json::json;
//!
//! let mut qb = QueryBuilder::new(&registry, "Author")?;
//! qb.select(["*"])?
//!     .filter(json!({ "name": "Jon", "books": { "title": "Dune" } }))?
//!     .limit(10)?;
//! let compiled = qb.compile()?;
//! ```

use std::collections::BTreeSet;

use serde_json::{Map, Value};
use tracing::debug;

use crate::connection::{CompiledQuery, TransactionContext};
use crate::criteria::create_node;
use crate::criteria::operators::composite_key;
use crate::error::{QueryError, QueryResult};
use crate::metadata::{EntityMetadata, MetadataProvider, MetadataProviderExt, ReferenceKind};
use crate::sql::{table_col, Expr, ExprExt, SelectExpr, SqlDialect, Statement};

use super::aliases::AliasRegistry;
use super::condition::Predicate;
use super::enums::{
    CompilerOptions, JoinKind, LockMode, MergeData, PopulateFilter, QueryFlag, QueryKind,
};
use super::joins::{JoinRegistry, JoinSpec, PIVOT_SUFFIX};

/// One requested select item.
#[derive(Debug, Clone, PartialEq)]
pub enum Field {
    /// Property name, `alias.property`, `alias.*`, `*` or a raw SQL expression.
    Key(String),
    Expr(SelectExpr),
}

impl From<&str> for Field {
    fn from(key: &str) -> Self {
        Field::Key(key.to_string())
    }
}

impl From<String> for Field {
    fn from(key: String) -> Self {
        Field::Key(key)
    }
}

impl From<SelectExpr> for Field {
    fn from(expr: SelectExpr) -> Self {
        Field::Expr(expr)
    }
}

impl From<Expr> for Field {
    fn from(expr: Expr) -> Self {
        Field::Expr(SelectExpr::new(expr))
    }
}

/// How an upsert resolves a conflict.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum ConflictResolution {
    Ignore,
    Merge(MergeData),
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ConflictSpec {
    /// Conflict target properties.
    pub fields: Vec<String>,
    pub resolution: Option<ConflictResolution>,
    /// Processed criteria for `ON CONFLICT ... WHERE`.
    pub filter: Option<Value>,
}

/// Builds one SQL statement for an entity.
#[derive(Debug, Clone)]
pub struct QueryBuilder<'m> {
    pub(crate) metadata: &'m dyn MetadataProvider,
    pub(crate) options: CompilerOptions,
    pub(crate) entity: String,
    /// Alias of the root table.
    pub(crate) alias: String,
    pub(crate) aliases: AliasRegistry,
    pub(crate) joins: JoinRegistry,
    pub(crate) kind: Option<QueryKind>,
    pub(crate) fields: Vec<Field>,
    /// Selects added while processing criteria.
    pub(crate) extra_fields: Vec<SelectExpr>,
    pub(crate) distinct: bool,
    pub(crate) count_field: Option<String>,
    pub(crate) data: Vec<Map<String, Value>>,
    pub(crate) cond: Option<Predicate>,
    /// `cond` before populate-where pushdown.
    pub(crate) original_cond: Option<Predicate>,
    pub(crate) order_by: Vec<Map<String, Value>>,
    pub(crate) group_by: Vec<String>,
    pub(crate) having: Option<Predicate>,
    pub(crate) limit: Option<u64>,
    pub(crate) offset: Option<u64>,
    pub(crate) lock_mode: LockMode,
    pub(crate) lock_tables: Vec<String>,
    pub(crate) on_conflict: Option<ConflictSpec>,
    pub(crate) returning: Vec<String>,
    pub(crate) populate: Vec<String>,
    pub(crate) populate_where: Option<PopulateFilter>,
    pub(crate) flags: BTreeSet<QueryFlag>,
    pub(crate) transaction: Option<TransactionContext>,
    pub(crate) finalized: bool,
    pub(crate) statement: Option<Statement>,
}

impl<'m> QueryBuilder<'m> {
    /// Builder for `entity` with default options.
    pub fn new(metadata: &'m dyn MetadataProvider, entity: &str) -> QueryResult<Self> {
        Self::with_options(metadata, entity, None, CompilerOptions::default())
    }

    /// Builder with an explicit root alias.
    pub fn with_alias(
        metadata: &'m dyn MetadataProvider,
        entity: &str,
        alias: &str,
    ) -> QueryResult<Self> {
        Self::with_options(metadata, entity, Some(alias), CompilerOptions::default())
    }

    pub fn with_options(
        metadata: &'m dyn MetadataProvider,
        entity: &str,
        alias: Option<&str>,
        options: CompilerOptions,
    ) -> QueryResult<Self> {
        let meta = metadata.get(entity)?;
        if meta.table.is_empty() {
            return Err(QueryError::MissingTable(entity.to_string()));
        }

        let aliases = AliasRegistry::with_root(&meta.name, alias, metadata.naming());
        let root = aliases.names().first().cloned().unwrap_or_default();

        let mut flags = BTreeSet::new();
        if options.auto_join_one_to_one_owner {
            flags.insert(QueryFlag::AutoJoinOneToOneOwner);
        }
        if !options.paginate {
            flags.insert(QueryFlag::DisablePaginate);
        }

        debug!(entity = %meta.name, alias = %root, dialect = %options.dialect, "created query builder");

        Ok(Self {
            metadata,
            options,
            entity: meta.name.clone(),
            alias: root,
            aliases,
            joins: JoinRegistry::default(),
            kind: None,
            fields: Vec::new(),
            extra_fields: Vec::new(),
            distinct: false,
            count_field: None,
            data: Vec::new(),
            cond: None,
            original_cond: None,
            order_by: Vec::new(),
            group_by: Vec::new(),
            having: None,
            limit: None,
            offset: None,
            lock_mode: LockMode::None,
            lock_tables: Vec::new(),
            on_conflict: None,
            returning: Vec::new(),
            populate: Vec::new(),
            populate_where: None,
            flags,
            transaction: None,
            finalized: false,
            statement: None,
        })
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn entity(&self) -> &str {
        &self.entity
    }

    /// Alias of the root table.
    pub fn alias(&self) -> &str {
        &self.alias
    }

    pub fn kind(&self) -> Option<QueryKind> {
        self.kind
    }

    pub fn options(&self) -> &CompilerOptions {
        &self.options
    }

    pub fn has_flag(&self, flag: QueryFlag) -> bool {
        self.flags.contains(&flag)
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    /// Joins registered so far, in creation order.
    pub fn joins(&self) -> impl Iterator<Item = &JoinSpec> {
        self.joins.iter()
    }

    /// Every registered alias, root first.
    pub fn alias_names(&self) -> Vec<String> {
        self.aliases.names()
    }

    /// Alias criteria at `path` resolve to.
    pub fn alias_for_join_path(&self, path: &str) -> Option<String> {
        if path == self.entity {
            return Some(self.alias.clone());
        }
        self.joins.alias_for_path(path)
    }

    // =========================================================================
    // Operation
    // =========================================================================

    fn ensure_not_finalized(&self) -> QueryResult<()> {
        if self.finalized {
            return Err(QueryError::AlreadyFinalized);
        }
        Ok(())
    }

    fn init(&mut self, kind: QueryKind) -> QueryResult<()> {
        self.ensure_not_finalized()?;
        if let Some(current) = self.kind.filter(|current| *current != kind) {
            return Err(QueryError::OperationAlreadySet {
                current: current.as_str(),
                requested: kind.as_str(),
            });
        }
        // criteria processed before the operation was known are aliased for a select
        if matches!(kind, QueryKind::Update | QueryKind::Delete) && self.cond.is_some() {
            return Err(QueryError::MissingPredecessor {
                method: "filter",
                required: kind.as_str(),
            });
        }
        self.kind = Some(kind);
        Ok(())
    }

    /// Select `fields`, replacing earlier ones.
    pub fn select<F: Into<Field>>(
        &mut self,
        fields: impl IntoIterator<Item = F>,
    ) -> QueryResult<&mut Self> {
        self.init(QueryKind::Select)?;
        self.fields = fields.into_iter().map(Into::into).collect();
        if self.fields.is_empty() {
            return Err(QueryError::MissingFields);
        }
        Ok(self)
    }

    pub fn add_select<F: Into<Field>>(
        &mut self,
        fields: impl IntoIterator<Item = F>,
    ) -> QueryResult<&mut Self> {
        self.init(QueryKind::Select)?;
        self.fields.extend(fields.into_iter().map(Into::into));
        Ok(self)
    }

    pub fn distinct(&mut self) -> QueryResult<&mut Self> {
        self.ensure_not_finalized()?;
        self.distinct = true;
        Ok(self)
    }

    /// Count rows, or values of `field`. Distinct is implied when to-many
    /// joins are present.
    pub fn count(&mut self, field: Option<&str>, distinct: bool) -> QueryResult<&mut Self> {
        self.init(QueryKind::Count)?;
        self.count_field = field.map(Into::into);
        self.distinct = distinct;
        Ok(self)
    }

    /// Insert one row (object) or several (array of objects).
    pub fn insert(&mut self, data: Value) -> QueryResult<&mut Self> {
        self.init(QueryKind::Insert)?;
        self.data = data_rows(data, "insert")?;
        Ok(self)
    }

    pub fn update(&mut self, data: Value) -> QueryResult<&mut Self> {
        self.init(QueryKind::Update)?;
        let mut rows = data_rows(data, "update")?;
        if rows.len() != 1 {
            return Err(QueryError::invalid_criteria("update expects a single object of changes"));
        }
        self.data = rows.drain(..).collect();
        Ok(self)
    }

    pub fn delete(&mut self) -> QueryResult<&mut Self> {
        self.init(QueryKind::Delete)?;
        Ok(self)
    }

    pub fn truncate(&mut self) -> QueryResult<&mut Self> {
        self.init(QueryKind::Truncate)?;
        Ok(self)
    }

    // =========================================================================
    // Conditions
    // =========================================================================

    /// Replace the WHERE criteria. A scalar or list matches primary keys.
    pub fn filter(&mut self, criteria: Value) -> QueryResult<&mut Self> {
        self.ensure_not_finalized()?;
        self.cond = self.criteria_predicate(criteria)?;
        Ok(self)
    }

    pub fn and_filter(&mut self, criteria: Value) -> QueryResult<&mut Self> {
        self.ensure_not_finalized()?;
        if let Some(predicate) = self.criteria_predicate(criteria)? {
            self.cond = Some(match self.cond.take() {
                Some(existing) => existing.and(predicate),
                None => predicate,
            });
        }
        Ok(self)
    }

    pub fn or_filter(&mut self, criteria: Value) -> QueryResult<&mut Self> {
        self.ensure_not_finalized()?;
        if let Some(predicate) = self.criteria_predicate(criteria)? {
            self.cond = Some(match self.cond.take() {
                Some(existing) => existing.or(predicate),
                None => predicate,
            });
        }
        Ok(self)
    }

    /// Replace the WHERE criteria with raw SQL; `?` markers bind `params`.
    pub fn filter_raw(&mut self, sql: &str, params: Vec<Value>) -> QueryResult<&mut Self> {
        self.ensure_not_finalized()?;
        self.cond = Some(raw_predicate(sql, params));
        Ok(self)
    }

    pub fn and_filter_raw(&mut self, sql: &str, params: Vec<Value>) -> QueryResult<&mut Self> {
        self.ensure_not_finalized()?;
        let predicate = raw_predicate(sql, params);
        self.cond = Some(match self.cond.take() {
            Some(existing) => existing.and(predicate),
            None => predicate,
        });
        Ok(self)
    }

    pub fn or_filter_raw(&mut self, sql: &str, params: Vec<Value>) -> QueryResult<&mut Self> {
        self.ensure_not_finalized()?;
        let predicate = raw_predicate(sql, params);
        self.cond = Some(match self.cond.take() {
            Some(existing) => existing.or(predicate),
            None => predicate,
        });
        Ok(self)
    }

    pub fn having(&mut self, criteria: Value) -> QueryResult<&mut Self> {
        self.ensure_not_finalized()?;
        self.having = self.criteria_predicate(criteria)?;
        Ok(self)
    }

    pub fn having_raw(&mut self, sql: &str, params: Vec<Value>) -> QueryResult<&mut Self> {
        self.ensure_not_finalized()?;
        self.having = Some(raw_predicate(sql, params));
        Ok(self)
    }

    fn criteria_predicate(&mut self, criteria: Value) -> QueryResult<Option<Predicate>> {
        let criteria = self.expand_primary_key(criteria)?;
        if criteria.as_object().is_some_and(Map::is_empty) {
            return Ok(None);
        }

        let metadata = self.metadata;
        let node = create_node(metadata, &self.entity, &criteria)?;

        let subquery_flag = match self.kind {
            Some(QueryKind::Update) => Some(QueryFlag::UpdateSubQuery),
            Some(QueryKind::Delete) => Some(QueryFlag::DeleteSubQuery),
            _ => None,
        };
        if let Some(flag) = subquery_flag.filter(|_| node.will_auto_join(self)) {
            debug!(entity = %self.entity, flag = ?flag, "criteria need joins, modifying through a subquery");
            self.flags.insert(flag);
        }

        let processed = node.process(self, None)?;
        Ok(Some(Predicate::Criteria(processed)))
    }

    /// Primary key shorthand: `5` or `[1, 2]` means `{pk: ...}`.
    fn expand_primary_key(&self, criteria: Value) -> QueryResult<Value> {
        if criteria.is_object() {
            return Ok(criteria);
        }

        let meta = self.metadata.get(&self.entity)?;
        let key = if meta.primary_keys.len() == 1 {
            meta.primary_keys[0].clone()
        } else {
            composite_key(&meta.pk_columns())
        };

        let mut map = Map::new();
        map.insert(key, criteria);
        Ok(Value::Object(map))
    }

    // =========================================================================
    // Joins
    // =========================================================================

    /// Join a relation; `field` is `property` (of the root) or `alias.property`.
    pub fn join(
        &mut self,
        field: &str,
        alias: &str,
        cond: Option<Value>,
        kind: JoinKind,
    ) -> QueryResult<&mut Self> {
        self.ensure_not_finalized()?;
        let (owner_alias, property) = match field.split_once('.') {
            Some((owner, property)) => (owner.to_string(), property.to_string()),
            None => (self.alias.clone(), field.to_string()),
        };
        self.join_reference(&owner_alias, &property, alias, kind, cond.as_ref(), None)?;
        Ok(self)
    }

    pub fn left_join(&mut self, field: &str, alias: &str) -> QueryResult<&mut Self> {
        self.join(field, alias, None, JoinKind::Left)
    }

    pub fn inner_join(&mut self, field: &str, alias: &str) -> QueryResult<&mut Self> {
        self.join(field, alias, None, JoinKind::Inner)
    }

    /// Join a relation and select all of its columns.
    pub fn join_and_select(
        &mut self,
        field: &str,
        alias: &str,
        cond: Option<Value>,
        kind: JoinKind,
    ) -> QueryResult<&mut Self> {
        self.join(field, alias, cond, kind)?;
        if let Some(join) = self.joins.by_alias_mut(alias) {
            join.selected = true;
        }
        if self.kind.is_none() {
            self.kind = Some(QueryKind::Select);
        }
        Ok(self)
    }

    pub fn left_join_and_select(&mut self, field: &str, alias: &str) -> QueryResult<&mut Self> {
        self.join_and_select(field, alias, None, JoinKind::Left)
    }

    pub fn inner_join_and_select(&mut self, field: &str, alias: &str) -> QueryResult<&mut Self> {
        self.join_and_select(field, alias, None, JoinKind::Inner)
    }

    /// Join another builder's query as a derived table.
    ///
    /// `cond` is criteria on the root entity; column comparisons are written
    /// as raw keys, e.g. `{"a0.id = s.author_id": []}`.
    pub fn join_subquery(
        &mut self,
        mut subquery: QueryBuilder<'_>,
        alias: &str,
        cond: Option<Value>,
        kind: JoinKind,
    ) -> QueryResult<&mut Self> {
        self.ensure_not_finalized()?;
        let query = subquery.select_statement()?;
        self.aliases.register(alias, &subquery.entity, true)?;

        let mut spec = JoinSpec::derived(&self.alias, query, alias, kind, &subquery.entity);
        if let Some(cond) = cond {
            let metadata = self.metadata;
            let node = create_node(metadata, &self.entity, &cond)?;
            if let Value::Object(map) = node.process(self, None)? {
                spec.cond = map;
            }
        }
        self.joins.insert(spec);
        Ok(self)
    }

    /// Add the joins for `owner_alias.prop_name` under `alias`.
    pub(crate) fn join_reference(
        &mut self,
        owner_alias: &str,
        prop_name: &str,
        alias: &str,
        kind: JoinKind,
        cond: Option<&Value>,
        path: Option<String>,
    ) -> QueryResult<()> {
        let metadata = self.metadata;
        let owner_entity = self.aliases.require(owner_alias)?.entity.clone();
        let owner = metadata.get(&owner_entity)?;
        let prop = owner
            .prop(prop_name)
            .ok_or_else(|| QueryError::unknown_property(&owner.name, prop_name))?;
        let not_a_relation = || QueryError::NotARelation {
            entity: owner.name.clone(),
            property: prop_name.to_string(),
        };
        if !prop.is_relation() {
            return Err(not_a_relation());
        }
        let target = metadata.get(prop.target_name().ok_or_else(not_a_relation)?)?;
        if self.aliases.get(alias).is_some() {
            return Err(QueryError::AliasInUse(alias.to_string()));
        }

        let path = match path {
            Some(path) => path,
            None => format!("{}.{}", self.join_path_of(owner_alias), prop.name),
        };

        let mut specs = match prop.kind {
            ReferenceKind::ManyToOne => {
                vec![JoinSpec::many_to_one(owner_alias, prop, target, alias, kind)]
            }
            ReferenceKind::OneToOne | ReferenceKind::OneToMany => {
                let mapped = prop.mapped_by.as_deref().and_then(|m| target.prop(m));
                vec![JoinSpec::one_to_reference(owner_alias, prop, mapped, target, alias, kind)]
            }
            ReferenceKind::ManyToMany => {
                let pivot_table = prop.pivot_table.clone().unwrap_or_default();
                let pivot_alias = if kind == JoinKind::Pivot {
                    alias.to_string()
                } else {
                    let pivot_path = format!("{}{}", path.trim_end_matches(PIVOT_SUFFIX), PIVOT_SUFFIX);
                    match self.joins.by_path(&pivot_path) {
                        Some(existing) => existing.alias.clone(),
                        None => self.next_alias(&pivot_table),
                    }
                };
                JoinSpec::many_to_many(owner_alias, prop, target, alias, &pivot_alias, kind, &path)
            }
            ReferenceKind::Scalar | ReferenceKind::Embedded => return Err(not_a_relation()),
        };

        for spec in &mut specs {
            if spec.path.is_empty() {
                spec.path = path.clone();
            }
            if self.aliases.get(&spec.alias).is_none() {
                self.aliases.register(&spec.alias, &spec.target, false)?;
            }
        }
        for spec in specs {
            self.joins.insert(spec);
        }

        debug!(owner = owner_alias, property = prop_name, alias, kind = ?kind, path = %path, "joined relation");

        // pivot-only joins never reach the target table
        if kind == JoinKind::Pivot {
            return Ok(());
        }

        let mut extra = Map::new();
        if let Some(filter) = &prop.filter {
            extra.extend(self.join_condition(target, filter, alias)?);
        }
        if let Some(cond) = cond {
            extra.extend(self.join_condition(target, cond, alias)?);
        }
        if target.is_sti_child() {
            extra.extend(self.discriminator_condition(target, alias));
        }
        if let Some(join) = self.joins.by_alias_mut(alias) {
            join.cond.extend(extra);
        }

        Ok(())
    }

    fn join_condition(
        &mut self,
        target: &EntityMetadata,
        criteria: &Value,
        alias: &str,
    ) -> QueryResult<Map<String, Value>> {
        let metadata = self.metadata;
        let node = create_node(metadata, &target.name, criteria)?;
        match node.process(self, Some(alias))? {
            Value::Object(map) => Ok(map),
            _ => Ok(Map::new()),
        }
    }

    /// `alias.discriminator IN (values of entity and its subtypes)`
    pub(crate) fn discriminator_condition(
        &self,
        entity: &EntityMetadata,
        alias: &str,
    ) -> Map<String, Value> {
        let mut cond = Map::new();
        let Some(column) = entity.discriminator_column.as_deref() else {
            return cond;
        };
        let values = self.metadata.discriminator_values(entity);
        let value = match values.as_slice() {
            [single] => Value::String(single.clone()),
            _ => {
                let mut ops = Map::new();
                ops.insert("$in".into(), values.into_iter().map(Value::String).collect());
                Value::Object(ops)
            }
        };
        cond.insert(format!("{}.{}", alias, column), value);
        cond
    }

    fn join_path_of(&self, alias: &str) -> String {
        if alias == self.alias {
            return self.entity.clone();
        }
        self.joins
            .by_alias(alias)
            .map(|j| j.path.trim_end_matches(PIVOT_SUFFIX).to_string())
            .unwrap_or_else(|| self.entity.clone())
    }

    // =========================================================================
    // Ordering, grouping, paging
    // =========================================================================

    /// Order by criteria-shaped maps, e.g. `{"books": {"title": "desc nulls last"}}`.
    pub fn order_by(&mut self, order: Value) -> QueryResult<&mut Self> {
        self.ensure_not_finalized()?;
        let items = match order {
            Value::Array(items) => items,
            other => vec![other],
        };

        for item in items {
            if !item.is_object() {
                return Err(QueryError::invalid_criteria(format!(
                    "order by expects an object, got {}",
                    item
                )));
            }
            let metadata = self.metadata;
            let node = create_node(metadata, &self.entity, &item)?;
            if let Value::Object(map) = node.process(self, None)? {
                self.order_by.push(map);
            }
        }
        Ok(self)
    }

    pub fn group_by(&mut self, fields: &[&str]) -> QueryResult<&mut Self> {
        self.ensure_not_finalized()?;
        for field in fields {
            let key = self.column_key(field)?;
            self.group_by.push(key);
        }
        Ok(self)
    }

    pub fn limit(&mut self, limit: u64) -> QueryResult<&mut Self> {
        self.ensure_not_finalized()?;
        self.limit = Some(limit);
        Ok(self)
    }

    pub fn offset(&mut self, offset: u64) -> QueryResult<&mut Self> {
        self.ensure_not_finalized()?;
        self.offset = Some(offset);
        Ok(self)
    }

    // =========================================================================
    // Locks and transactions
    // =========================================================================

    pub fn set_transaction(&mut self, ctx: TransactionContext) -> QueryResult<&mut Self> {
        self.ensure_not_finalized()?;
        self.transaction = Some(ctx);
        Ok(self)
    }

    /// Lock the selected rows; `tables` restricts the lock to these aliases.
    pub fn set_lock_mode(&mut self, mode: LockMode, tables: &[&str]) -> QueryResult<&mut Self> {
        self.ensure_not_finalized()?;
        let dialect = self.options.dialect;

        if mode.is_pessimistic() && self.transaction.is_none() {
            return Err(QueryError::TransactionRequired);
        }
        if mode == LockMode::Optimistic
            && self.metadata.get(&self.entity)?.version_property().is_none()
        {
            return Err(QueryError::NotVersioned(self.entity.clone()));
        }
        if mode.is_pessimistic() && !dialect.supports_row_locking() {
            return Err(QueryError::unsupported(dialect.name(), "row locking"));
        }
        for table in tables {
            self.aliases.require(table)?;
        }

        self.lock_mode = mode;
        self.lock_tables = tables.iter().map(|t| t.to_string()).collect();
        Ok(self)
    }

    // =========================================================================
    // Upserts and returning
    // =========================================================================

    /// Conflict target for an insert; follow with [`ignore`](Self::ignore)
    /// or [`merge`](Self::merge).
    pub fn on_conflict(&mut self, fields: &[&str]) -> QueryResult<&mut Self> {
        self.ensure_not_finalized()?;
        if self.kind != Some(QueryKind::Insert) {
            return Err(QueryError::MissingPredecessor {
                method: "on_conflict",
                required: "insert",
            });
        }
        self.on_conflict = Some(ConflictSpec {
            fields: fields.iter().map(|f| f.to_string()).collect(),
            resolution: None,
            filter: None,
        });
        Ok(self)
    }

    pub fn ignore(&mut self) -> QueryResult<&mut Self> {
        self.resolve_conflict("ignore", ConflictResolution::Ignore)
    }

    pub fn merge(&mut self, data: MergeData) -> QueryResult<&mut Self> {
        self.resolve_conflict("merge", ConflictResolution::Merge(data))
    }

    fn resolve_conflict(
        &mut self,
        method: &'static str,
        resolution: ConflictResolution,
    ) -> QueryResult<&mut Self> {
        self.ensure_not_finalized()?;
        let spec = self.on_conflict.as_mut().ok_or(QueryError::MissingPredecessor {
            method,
            required: "on_conflict",
        })?;
        spec.resolution = Some(resolution);
        Ok(self)
    }

    /// Only update conflicting rows matching `criteria`.
    pub fn on_conflict_where(&mut self, criteria: Value) -> QueryResult<&mut Self> {
        self.ensure_not_finalized()?;
        if self.on_conflict.is_none() {
            return Err(QueryError::MissingPredecessor {
                method: "on_conflict_where",
                required: "on_conflict",
            });
        }
        let metadata = self.metadata;
        let node = create_node(metadata, &self.entity, &criteria)?;
        let processed = node.process(self, None)?;
        if let Some(spec) = self.on_conflict.as_mut() {
            spec.filter = Some(processed);
        }
        Ok(self)
    }

    pub fn returning(&mut self, fields: &[&str]) -> QueryResult<&mut Self> {
        self.ensure_not_finalized()?;
        self.returning = fields.iter().map(|f| f.to_string()).collect();
        Ok(self)
    }

    // =========================================================================
    // Populate
    // =========================================================================

    /// Join and select relation paths such as `books.tags`.
    pub fn populate(&mut self, paths: &[&str]) -> QueryResult<&mut Self> {
        self.ensure_not_finalized()?;
        self.populate.extend(paths.iter().map(|p| p.to_string()));
        Ok(self)
    }

    /// Override the populate-where policy of the options.
    pub fn populate_where(&mut self, filter: impl Into<PopulateFilter>) -> QueryResult<&mut Self> {
        self.ensure_not_finalized()?;
        self.populate_where = Some(filter.into());
        Ok(self)
    }

    pub fn set_flag(&mut self, flag: QueryFlag) -> QueryResult<&mut Self> {
        self.ensure_not_finalized()?;
        self.flags.insert(flag);
        Ok(self)
    }

    pub fn unset_flag(&mut self, flag: QueryFlag) -> QueryResult<&mut Self> {
        self.ensure_not_finalized()?;
        self.flags.remove(&flag);
        Ok(self)
    }

    // =========================================================================
    // Terminal operations
    // =========================================================================

    /// The finalized statement. Finalizes on first use.
    pub fn statement(&mut self) -> QueryResult<Statement> {
        if let Some(statement) = &self.statement {
            return Ok(statement.clone());
        }
        self.finalize()?;
        let statement = self.assemble()?;
        self.statement = Some(statement.clone());
        Ok(statement)
    }

    /// SQL text and parameters in the dialect's placeholder style.
    pub fn compile(&mut self) -> QueryResult<CompiledQuery> {
        let dialect = self.options.dialect;
        let tokens = self.statement()?.to_tokens(dialect);
        let compiled = CompiledQuery {
            sql: tokens.serialize(dialect),
            params: tokens.params(),
            placeholders: dialect.placeholder_style(),
        };
        debug!(entity = %self.entity, sql = %compiled.sql, params = compiled.params.len(), "compiled query");
        Ok(compiled)
    }

    pub fn get_query(&mut self) -> QueryResult<String> {
        Ok(self.compile()?.sql)
    }

    pub fn get_params(&mut self) -> QueryResult<Vec<Value>> {
        Ok(self.compile()?.params)
    }

    /// SQL with parameters inlined as literals. For logging only.
    pub fn get_formatted_query(&mut self) -> QueryResult<String> {
        let dialect = self.options.dialect;
        Ok(self.statement()?.to_tokens(dialect).serialize_inline(dialect))
    }

    /// The finalized select, for use as a subquery.
    pub fn select_statement(&mut self) -> QueryResult<crate::sql::Query> {
        match self.statement()? {
            Statement::Select(query) => Ok(query),
            _ => Err(QueryError::invalid_criteria(format!(
                "only select queries can be used as subqueries, got {}",
                self.kind.map(QueryKind::as_str).unwrap_or("select")
            ))),
        }
    }

    // =========================================================================
    // Criteria processing support
    // =========================================================================

    pub(crate) fn metadata(&self) -> &'m dyn MetadataProvider {
        self.metadata
    }

    pub(crate) fn root_alias(&self) -> &str {
        &self.alias
    }

    /// Whether column keys carry table aliases.
    pub(crate) fn aliased(&self) -> bool {
        match self.kind {
            None => true,
            Some(kind) if kind.is_read() => true,
            Some(_) => {
                self.flags.contains(&QueryFlag::UpdateSubQuery)
                    || self.flags.contains(&QueryFlag::DeleteSubQuery)
            }
        }
    }

    pub(crate) fn next_alias(&mut self, name: &str) -> String {
        let naming = self.metadata.naming();
        self.aliases.next_alias(name, naming)
    }

    /// Select the key of the relation joined under `alias` as `property`.
    pub(crate) fn add_inverse_select(&mut self, property: &str, alias: &str) -> QueryResult<()> {
        if !matches!(self.kind, None | Some(QueryKind::Select)) {
            return Ok(());
        }
        let entity = self.aliases.require(alias)?.entity.clone();
        let meta = self.metadata.get(&entity)?;
        let Some(pk) = meta.pk_columns().into_iter().next() else {
            return Ok(());
        };

        let select = table_col(alias, &pk).alias(property);
        if !self.extra_fields.contains(&select) {
            self.extra_fields.push(select);
        }
        Ok(())
    }

    /// Column key for `alias.property`, which must use a known alias.
    pub(crate) fn resolve_dotted_key(&self, key: &str) -> QueryResult<String> {
        let Some((alias, field)) = key.split_once('.') else {
            return Ok(key.to_string());
        };
        let entity = &self.aliases.require(alias)?.entity;
        let prop = self.metadata.find(entity).and_then(|m| m.prop(field));

        if let Some(formula) = prop.and_then(|p| p.formula.as_deref()) {
            return Ok(formula.replace("{alias}", alias));
        }
        let columns: Vec<String> = match prop {
            Some(p) if !p.field_names.is_empty() => p.field_names.clone(),
            _ => vec![field.to_string()],
        };

        let unqualified = !self.aliased() && alias == self.alias;
        let keys: Vec<String> = columns
            .into_iter()
            .map(|c| if unqualified { c } else { format!("{}.{}", alias, c) })
            .collect();
        Ok(composite_key(&keys))
    }

    /// Column key for a root property or `alias.property`.
    pub(crate) fn column_key(&self, field: &str) -> QueryResult<String> {
        if field.contains('.') {
            return self.resolve_dotted_key(field);
        }
        let key = format!("{}.{}", self.alias, field);
        self.resolve_dotted_key(&key)
    }
}

fn raw_predicate(sql: &str, params: Vec<Value>) -> Predicate {
    Predicate::Raw {
        sql: sql.to_string(),
        params,
    }
}

fn data_rows(data: Value, operation: &'static str) -> QueryResult<Vec<Map<String, Value>>> {
    let rows = match data {
        Value::Object(map) => vec![map],
        Value::Array(items) => items
            .into_iter()
            .map(|item| match item {
                Value::Object(map) => Ok(map),
                other => Err(QueryError::invalid_criteria(format!(
                    "{} rows must be objects, got {}",
                    operation, other
                ))),
            })
            .collect::<QueryResult<Vec<_>>>()?,
        Value::Null => Vec::new(),
        other => {
            return Err(QueryError::invalid_criteria(format!(
                "{} data must be an object, got {}",
                operation, other
            )))
        }
    };
    if rows.is_empty() {
        return Err(QueryError::MissingData(operation));
    }
    Ok(rows)
}
