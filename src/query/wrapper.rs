//! Primary-key subquery wrappers.
//!
//! Pagination over to-many joins limits distinct roots instead of joined
//! rows, and updates or deletes whose criteria need joins select the
//! affected keys first.

use std::collections::BTreeSet;

use tracing::debug;

use crate::error::QueryResult;
use crate::sql::{min, table_col, Expr, Query, SelectExpr, SqlDialect, TableRef};

use super::builder::{Field, QueryBuilder};
use super::condition::Predicate;
use super::enums::{LockMode, QueryFlag, QueryKind};

impl QueryBuilder<'_> {
    /// Replace limit/offset with `pk IN (SELECT pk FROM (paged keys) AS root)`.
    pub(crate) fn wrap_paginate_subquery(&mut self) -> QueryResult<()> {
        let meta = self.metadata.get(&self.entity)?;
        let root = self.alias.clone();
        let pks = meta.pk_columns();
        let pk_keys: Vec<String> = pks.iter().map(|pk| format!("{}.{}", root, pk)).collect();

        let mut inner = self.clone();
        inner.fields = pk_keys.iter().map(|k| Field::Key(k.clone())).collect();
        inner.extra_fields.clear();
        inner.distinct = false;
        inner.group_by = pk_keys.clone();
        inner.cond = self.original_cond.clone();
        inner.lock_mode = LockMode::None;
        inner.lock_tables.clear();
        inner.flags.remove(&QueryFlag::Paginate);
        for join in inner.joins.iter_mut() {
            if let Some(original) = join.original_cond.clone() {
                join.cond = original;
            }
            join.selected = false;
        }

        let mut paged = inner.select_query()?;
        for order in paged.order_by.iter_mut() {
            if !is_column_of(&order.expr, &root, &pks) {
                order.expr = min(order.expr.clone());
            }
        }

        let select: Vec<SelectExpr> = pks.iter().map(|pk| SelectExpr::new(table_col(&root, pk))).collect();
        let keys = Query::new().select(select).from(TableRef::derived(paged, &root));

        self.cond = Some(Predicate::InSubquery {
            columns: pk_keys,
            query: Box::new(keys),
        });
        self.limit = None;
        self.offset = None;
        self.prune_joins();

        debug!(entity = %self.entity, joins = self.joins.len(), "paginating through primary key subquery");
        Ok(())
    }

    /// Replace the criteria of an update or delete with `pk IN (subquery)`.
    pub(crate) fn wrap_modify_subquery(&mut self) -> QueryResult<()> {
        let meta = self.metadata.get(&self.entity)?;
        let root = self.alias.clone();
        let pks = meta.pk_columns();

        let mut keys = self.clone();
        keys.kind = Some(QueryKind::Select);
        keys.fields = pks.iter().map(|pk| Field::Key(format!("{}.{}", root, pk))).collect();
        keys.extra_fields.clear();
        keys.data.clear();
        keys.returning.clear();
        keys.order_by.clear();
        let mut query = keys.select_query()?;

        let dialect = self.options.dialect;
        if dialect.requires_derived_table_for_self_subquery() {
            let select: Vec<SelectExpr> = pks.iter().map(|pk| SelectExpr::new(table_col(&root, pk))).collect();
            query = Query::new().select(select).from(TableRef::derived(query, &root));
        }

        self.cond = Some(Predicate::InSubquery {
            columns: pks,
            query: Box::new(query),
        });
        self.joins.clear();

        debug!(
            entity = %self.entity,
            kind = ?self.kind,
            dialect = %dialect,
            "modifying through primary key subquery"
        );
        Ok(())
    }

    /// Drop joins the outer paginated query no longer needs.
    fn prune_joins(&mut self) {
        let mut keep = self.referenced_aliases();
        for join in self.joins.iter() {
            if join.selected || join.populated {
                keep.insert(join.alias.clone());
            }
        }

        // keep the chain back to the root
        loop {
            let owners: Vec<String> = self
                .joins
                .iter()
                .filter(|j| keep.contains(&j.alias) && !keep.contains(&j.owner_alias))
                .map(|j| j.owner_alias.clone())
                .collect();
            if owners.is_empty() {
                break;
            }
            keep.extend(owners);
        }

        self.joins.retain(|j| keep.contains(&j.alias));
        for join in self.joins.iter_mut() {
            join.nested.retain(|alias| keep.contains(alias));
        }
    }

    /// Aliases named by selected fields and ordering.
    fn referenced_aliases(&self) -> BTreeSet<String> {
        let mut aliases = BTreeSet::new();
        let mut add_key = |key: &str| {
            if let Some((alias, _)) = key.split_once('.') {
                aliases.insert(alias.to_string());
            }
        };

        for field in &self.fields {
            match field {
                Field::Key(key) => add_key(key),
                Field::Expr(select) => {
                    if let Some(alias) = expr_table(&select.expr) {
                        add_key(&format!("{}.", alias));
                    }
                }
            }
        }
        for select in &self.extra_fields {
            if let Some(alias) = expr_table(&select.expr) {
                add_key(&format!("{}.", alias));
            }
        }
        for order in &self.order_by {
            for key in order.keys() {
                add_key(key);
            }
        }
        aliases
    }
}

fn expr_table(expr: &Expr) -> Option<&str> {
    match expr {
        Expr::Column { table, .. } => table.as_deref(),
        _ => None,
    }
}

fn is_column_of(expr: &Expr, alias: &str, columns: &[String]) -> bool {
    match expr {
        Expr::Column { table, column } => {
            table.as_deref() == Some(alias) && columns.iter().any(|c| c == column)
        }
        _ => false,
    }
}
