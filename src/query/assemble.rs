//! Turns a finalized builder into a [`Statement`].

use serde_json::{Map, Value};

use crate::criteria::operators::{is_raw_key, split_composite};
use crate::error::{QueryError, QueryResult};
use crate::metadata::{EntityMetadata, EntityProperty, ReferenceKind};
use crate::sql::{
    count, count_distinct, param, raw_sql, star, table_col, table_star, tuple, ConflictValue,
    Delete, Expr, ExprExt, Insert, Join, JoinType, LockClause, NullsOrder, OnConflict, OrderByExpr,
    Query, SelectExpr, SortDir, SqlDialect, Statement, TableRef, Truncate, Update, UpsertStyle,
};

use super::builder::{ConflictResolution, Field, QueryBuilder};
use super::condition::ConditionCompiler;
use super::enums::{JoinKind, MergeData, QueryKind};
use super::joins::JoinSpec;

impl QueryBuilder<'_> {
    pub(crate) fn assemble(&self) -> QueryResult<Statement> {
        let meta = self.metadata.get(&self.entity)?;
        match self.kind.unwrap_or(QueryKind::Select) {
            QueryKind::Select => self.select_query().map(Statement::Select),
            QueryKind::Count => self.count_query().map(Statement::Select),
            QueryKind::Insert => self.insert_statement(meta).map(Statement::Insert),
            QueryKind::Update => self.update_statement(meta).map(Statement::Update),
            QueryKind::Delete => self.delete_statement(meta).map(Statement::Delete),
            QueryKind::Truncate => Ok(Statement::Truncate(
                Truncate::table(&meta.table).schema(meta.schema.as_deref()),
            )),
        }
    }

    fn compiler(&self) -> ConditionCompiler<'_> {
        let compiler = ConditionCompiler::new(self.options.dialect);
        if self.aliased() {
            compiler
        } else {
            compiler.strip_alias(&self.alias)
        }
    }

    fn root_table(&self, meta: &EntityMetadata) -> TableRef {
        TableRef::new(&meta.table)
            .with_schema(meta.schema.as_deref())
            .with_alias(&self.alias)
    }

    // =========================================================================
    // SELECT
    // =========================================================================

    pub(crate) fn select_query(&self) -> QueryResult<Query> {
        let meta = self.metadata.get(&self.entity)?;
        let compiler = self.compiler();

        let mut select = Vec::new();
        for field in &self.fields {
            select.extend(self.select_field(meta, field)?);
        }
        select.extend(self.extra_fields.iter().cloned());
        select.extend(self.joined_columns()?);
        if select.is_empty() {
            return Err(QueryError::MissingFields);
        }

        let mut query = Query::new().select(select).from(self.root_table(meta));
        query.distinct = self.distinct;
        self.apply_clauses(&mut query, &compiler)?;
        query.order_by = self.order_exprs(&compiler)?;
        query = query.paginate(self.limit, self.offset);
        query.lock = self.lock_clause();
        Ok(query)
    }

    fn count_query(&self) -> QueryResult<Query> {
        let meta = self.metadata.get(&self.entity)?;
        let compiler = self.compiler();

        let distinct = self.distinct || self.joins.has_to_many();
        let target = match &self.count_field {
            Some(field) => {
                let key = self.column_key(field)?;
                compiler.column(&key)
            }
            None if distinct => {
                let pks = meta
                    .pk_columns()
                    .iter()
                    .map(|pk| table_col(&self.alias, pk))
                    .collect();
                tuple(pks)
            }
            None => star(),
        };
        let expr = if distinct { count_distinct(target) } else { count(target) };

        let mut query = Query::new()
            .select(vec![expr.alias("count")])
            .from(self.root_table(meta));
        self.apply_clauses(&mut query, &compiler)?;
        query.lock = self.lock_clause();
        Ok(query)
    }

    /// Joins, WHERE, GROUP BY and HAVING.
    fn apply_clauses(&self, query: &mut Query, compiler: &ConditionCompiler<'_>) -> QueryResult<()> {
        for join in self.joins.iter().filter(|j| !j.kind.is_nested()) {
            query.joins.push(self.render_join(join, compiler)?);
        }
        if let Some(cond) = &self.cond {
            query.where_clause = compiler.predicate(cond)?;
        }
        query.group_by = self.group_by.iter().map(|key| key_expr(compiler, key)).collect();
        if let Some(having) = &self.having {
            query.having = compiler.predicate(having)?;
        }
        Ok(())
    }

    fn select_field(&self, meta: &EntityMetadata, field: &Field) -> QueryResult<Vec<SelectExpr>> {
        let key = match field {
            Field::Expr(select) => return Ok(vec![select.clone()]),
            Field::Key(key) => key.as_str(),
        };

        if key == "*" {
            return Ok(vec![SelectExpr::new(table_star(&self.alias))]);
        }
        if let Some(alias) = key.strip_suffix(".*") {
            self.aliases.require(alias)?;
            return Ok(vec![SelectExpr::new(table_star(alias))]);
        }
        if is_raw_key(key) {
            return Ok(vec![SelectExpr::new(raw_sql(key))]);
        }

        let (alias, name) = match key.split_once('.') {
            Some((alias, name)) => (alias, name),
            None => (self.alias.as_str(), key),
        };
        let entity = &self.aliases.require(alias)?.entity;
        let owner = if *entity == meta.name { Some(meta) } else { self.metadata.find(entity) };
        let Some(prop) = owner.and_then(|m| m.prop(name)) else {
            return Ok(vec![SelectExpr::new(table_col(alias, name))]);
        };

        if let Some(formula) = &prop.formula {
            let sql = formula.replace(crate::criteria::ALIAS_PLACEHOLDER, alias);
            return Ok(vec![raw_sql(&sql).alias(&prop.name)]);
        }
        let owner = owner.unwrap_or(meta);
        Ok(property_columns(owner, prop)
            .into_iter()
            .map(|column| SelectExpr::new(table_col(alias, &column)))
            .collect())
    }

    /// `alias.column AS alias__column` for every selected join.
    fn joined_columns(&self) -> QueryResult<Vec<SelectExpr>> {
        let mut columns = Vec::new();
        for join in self.joins.iter().filter(|j| j.selected && !j.is_pivot()) {
            let Some(target) = self.metadata.find(&join.target) else {
                continue;
            };
            for prop in target.properties.iter().filter(|p| p.persist && p.formula.is_none()) {
                for column in &prop.field_names {
                    let select = table_col(&join.alias, column).alias(&format!("{}__{}", join.alias, column));
                    if !columns.contains(&select) {
                        columns.push(select);
                    }
                }
            }
        }
        Ok(columns)
    }

    fn render_join(&self, spec: &JoinSpec, compiler: &ConditionCompiler<'_>) -> QueryResult<Join> {
        let table = match &spec.subquery {
            Some(query) => TableRef::derived((**query).clone(), &spec.alias),
            None => TableRef::new(&spec.table)
                .with_schema(spec.schema.as_deref())
                .with_alias(&spec.alias),
        };

        let mut on: Vec<Expr> = spec
            .primary_keys
            .iter()
            .zip(&spec.join_columns)
            .map(|(owner, column)| table_col(&spec.owner_alias, owner).eq(table_col(&spec.alias, column)))
            .collect();
        if !spec.cond.is_empty() {
            on.extend(compiler.criteria(&Value::Object(spec.cond.clone()))?.map(Expr::grouped));
        }
        if on.is_empty() {
            on.push(raw_sql("1 = 1"));
        }

        let join_type = match spec.kind {
            JoinKind::Inner | JoinKind::NestedInner => JoinType::Inner,
            JoinKind::Left | JoinKind::NestedLeft | JoinKind::Pivot => JoinType::Left,
        };
        let mut join = Join::new(join_type, table, crate::sql::expr::conjunction(on));
        for alias in &spec.nested {
            if let Some(child) = self.joins.by_alias(alias) {
                join.nested.push(self.render_join(child, compiler)?);
            }
        }
        Ok(join)
    }

    fn order_exprs(&self, compiler: &ConditionCompiler<'_>) -> QueryResult<Vec<OrderByExpr>> {
        let mut exprs = Vec::new();
        for map in &self.order_by {
            for (key, value) in map {
                let (dir, nulls) = parse_direction(key, value)?;
                let columns: Vec<&str> = if is_raw_key(key) { vec![key.as_str()] } else { split_composite(key) };
                for column in columns {
                    exprs.push(OrderByExpr {
                        expr: key_expr(compiler, column),
                        dir: Some(dir),
                        nulls,
                    });
                }
            }
        }
        Ok(exprs)
    }

    fn lock_clause(&self) -> Option<LockClause> {
        self.lock_mode.clause().map(|(strength, wait)| LockClause {
            strength,
            wait,
            tables: self.lock_tables.clone(),
        })
    }

    // =========================================================================
    // INSERT / UPDATE / DELETE
    // =========================================================================

    fn insert_statement(&self, meta: &EntityMetadata) -> QueryResult<Insert> {
        if self.data.is_empty() {
            return Err(QueryError::MissingData("insert"));
        }

        let mut rows = Vec::with_capacity(self.data.len());
        let mut columns: Vec<String> = Vec::new();
        for data in &self.data {
            let row = self.row_columns(meta, data)?;
            for (column, _) in &row {
                if !columns.contains(column) {
                    columns.push(column.clone());
                }
            }
            rows.push(row);
        }

        let identity = meta
            .properties
            .iter()
            .filter(|p| p.autoincrement)
            .any(|p| self.data.iter().any(|row| row.get(&p.name).is_some_and(|v| !v.is_null())));

        let mut insert = Insert::into(&meta.table)
            .schema(meta.schema.as_deref())
            .columns(columns.clone())
            .identity_insert(identity)
            .returning(self.returning_columns(meta));
        for row in rows {
            let values: Vec<Expr> = columns
                .iter()
                .map(|column| match row.iter().find(|(c, _)| c == column) {
                    Some((_, value)) => param(value.clone()),
                    None => raw_sql("DEFAULT"),
                })
                .collect();
            insert = insert.values(values);
        }

        if let Some(conflict) = self.conflict_clause(meta, &columns)? {
            insert = insert.on_conflict(conflict);
        }
        Ok(insert)
    }

    fn conflict_clause(&self, meta: &EntityMetadata, columns: &[String]) -> QueryResult<Option<OnConflict>> {
        let Some(spec) = &self.on_conflict else {
            return Ok(None);
        };
        let dialect = self.options.dialect;
        let style = dialect.upsert_style();
        if style == UpsertStyle::None {
            return Err(QueryError::unsupported(dialect.name(), "upsert"));
        }

        let target: Vec<String> = spec
            .fields
            .iter()
            .flat_map(|field| match meta.prop(field) {
                Some(prop) => property_columns(meta, prop),
                None => vec![field.clone()],
            })
            .collect();
        if style == UpsertStyle::Merge && target.is_empty() {
            return Err(QueryError::MissingConflictTarget);
        }

        let set: Vec<(String, ConflictValue)> = match &spec.resolution {
            None | Some(ConflictResolution::Ignore) => Vec::new(),
            Some(ConflictResolution::Merge(MergeData::All)) => columns
                .iter()
                .filter(|c| !target.contains(c))
                .map(|c| (c.clone(), ConflictValue::Excluded(c.clone())))
                .collect(),
            Some(ConflictResolution::Merge(MergeData::Fields(fields))) => fields
                .iter()
                .flat_map(|field| match meta.prop(field) {
                    Some(prop) => property_columns(meta, prop),
                    None => vec![field.clone()],
                })
                .map(|c| (c.clone(), ConflictValue::Excluded(c)))
                .collect(),
            Some(ConflictResolution::Merge(MergeData::Values(values))) => self
                .row_columns(meta, values)?
                .into_iter()
                .map(|(c, v)| (c, ConflictValue::Value(param(v))))
                .collect(),
        };

        let mut conflict = if set.is_empty() {
            OnConflict::do_nothing(target)
        } else {
            OnConflict::do_update(target, set)
        };

        if let Some(filter) = &spec.filter {
            if style != UpsertStyle::OnConflict {
                return Err(QueryError::unsupported(dialect.name(), "conditional upsert"));
            }
            if let Some(expr) = self.compiler().criteria(filter)? {
                conflict = conflict.filter(expr);
            }
        }
        Ok(Some(conflict))
    }

    fn update_statement(&self, meta: &EntityMetadata) -> QueryResult<Update> {
        let data = self.data.first().ok_or(QueryError::MissingData("update"))?;
        let changes = self.row_columns(meta, data)?;
        if changes.is_empty() {
            return Err(QueryError::MissingData("update"));
        }

        let mut update = Update::table(&meta.table).schema(meta.schema.as_deref());
        for (column, value) in changes {
            update = update.set(column, param(value));
        }
        if let Some(expr) = self.where_expr()? {
            update = update.filter(expr);
        }
        Ok(update.returning(self.returning_columns(meta)))
    }

    fn delete_statement(&self, meta: &EntityMetadata) -> QueryResult<Delete> {
        let mut delete = Delete::from(&meta.table).schema(meta.schema.as_deref());
        if let Some(expr) = self.where_expr()? {
            delete = delete.filter(expr);
        }
        Ok(delete.returning(self.returning_columns(meta)))
    }

    fn where_expr(&self) -> QueryResult<Option<Expr>> {
        match &self.cond {
            Some(cond) => self.compiler().predicate(cond),
            None => Ok(None),
        }
    }

    fn returning_columns(&self, meta: &EntityMetadata) -> Vec<String> {
        self.returning
            .iter()
            .flat_map(|field| match meta.prop(field) {
                Some(prop) => property_columns(meta, prop),
                None => vec![field.clone()],
            })
            .collect()
    }

    /// Columns and values written for one data row.
    fn row_columns(&self, meta: &EntityMetadata, data: &Map<String, Value>) -> QueryResult<Vec<(String, Value)>> {
        let mut row = Vec::new();
        for (key, value) in data {
            let prop = meta
                .prop(key)
                .or_else(|| meta.properties.iter().find(|p| p.field_names.len() == 1 && p.field_names[0] == *key))
                .ok_or_else(|| QueryError::unknown_property(&meta.name, key))?;

            match prop.kind {
                ReferenceKind::Embedded => {
                    for (part, flattened) in &prop.embedded {
                        let part_value = value.get(part).cloned().unwrap_or(Value::Null);
                        if value.is_null() || value.get(part).is_some() {
                            if let Some(column) = meta.prop(flattened).and_then(|p| p.field_names.first()) {
                                row.push((column.clone(), part_value));
                            }
                        }
                    }
                }
                _ if prop.holds_foreign_key() => {
                    let values = self.foreign_key_values(prop, value)?;
                    row.extend(prop.join_columns.iter().cloned().zip(values));
                }
                _ if prop.is_relation() || prop.formula.is_some() || !prop.persist => {}
                _ => {
                    if let Some(column) = prop.field_names.first() {
                        row.push((column.clone(), value.clone()));
                    }
                }
            }
        }
        Ok(row)
    }

    /// Key values for a foreign key given as a value, list or entity object.
    fn foreign_key_values(&self, prop: &EntityProperty, value: &Value) -> QueryResult<Vec<Value>> {
        match value {
            Value::Array(items) => Ok(items.clone()),
            Value::Object(map) => {
                let target = self.metadata.get(prop.target_name().unwrap_or_default())?;
                Ok(target
                    .primary_keys
                    .iter()
                    .map(|pk| map.get(pk).cloned().unwrap_or(Value::Null))
                    .collect())
            }
            other => Ok(vec![other.clone()]),
        }
    }
}

/// Columns a property maps to; embeddables expand to their parts.
fn property_columns(meta: &EntityMetadata, prop: &EntityProperty) -> Vec<String> {
    if prop.kind != ReferenceKind::Embedded {
        return prop.field_names.clone();
    }
    prop.embedded
        .values()
        .filter_map(|name| meta.prop(name))
        .flat_map(|p| p.field_names.iter().cloned())
        .collect()
}

fn key_expr(compiler: &ConditionCompiler<'_>, key: &str) -> Expr {
    if is_raw_key(key) {
        raw_sql(key)
    } else {
        compiler.column(key)
    }
}

/// `asc`, `desc nulls last`, `1`, `-1` and similar.
fn parse_direction(key: &str, value: &Value) -> QueryResult<(SortDir, Option<NullsOrder>)> {
    let invalid = || QueryError::invalid_criteria(format!("invalid order direction for {}: {}", key, value));

    match value {
        Value::Number(n) => match n.as_i64() {
            Some(n) if n < 0 => Ok((SortDir::Desc, None)),
            Some(_) => Ok((SortDir::Asc, None)),
            None => Err(invalid()),
        },
        Value::String(s) => {
            let normalized = s.to_lowercase().replace('_', " ");
            let words: Vec<&str> = normalized.split_whitespace().collect();
            let dir = match words.first() {
                Some(&"asc") => SortDir::Asc,
                Some(&"desc") => SortDir::Desc,
                _ => return Err(invalid()),
            };
            let nulls = match &words[1..] {
                [] => None,
                ["nulls", "first"] => Some(NullsOrder::First),
                ["nulls", "last"] => Some(NullsOrder::Last),
                _ => return Err(invalid()),
            };
            Ok((dir, nulls))
        }
        _ => Err(invalid()),
    }
}
