//! Criteria processing: relation auto-joins, operators and key resolution.

mod fixtures;

use criteria_sql::sql::Dialect;
use criteria_sql::QueryError;
use fixtures::{assert_valid_sql, builder, registry};
use serde_json::json;

// ============================================================================
// Relations
// ============================================================================

#[test]
fn test_one_to_many_criteria_joins_once() {
    let registry = registry();
    let mut qb = builder(&registry, "Author", Dialect::DuckDb);
    qb.select(["*"]).unwrap();
    qb.filter(json!({"name": "Jon", "books": {"title": "Dune"}})).unwrap();

    let compiled = qb.compile().unwrap();
    assert_eq!(
        compiled.sql,
        "SELECT \"a0\".* FROM \"author\" AS \"a0\" LEFT JOIN \"book\" AS \"b1\" ON \"a0\".\"id\" = \"b1\".\"author_id\" WHERE \"a0\".\"name\" = ? AND \"b1\".\"title\" = ?"
    );
    assert_eq!(compiled.params, vec![json!("Jon"), json!("Dune")]);
    assert_valid_sql(&compiled.sql, Dialect::DuckDb);
}

#[test]
fn test_same_relation_path_reuses_alias() {
    let registry = registry();
    let mut qb = builder(&registry, "Author", Dialect::DuckDb);
    qb.filter(json!({"books": {"title": "Dune"}})).unwrap();
    qb.and_filter(json!({"books": {"price": {"$gt": 10}}})).unwrap();
    qb.order_by(json!({"books": {"title": "asc"}})).unwrap();

    assert_eq!(qb.joins().count(), 1);
    assert_eq!(qb.alias_for_join_path("Author.books").as_deref(), Some("b1"));

    let sql = qb.get_query().unwrap();
    assert_eq!(sql.matches("JOIN").count(), 1, "{}", sql);
    assert!(sql.ends_with("ORDER BY \"b1\".\"title\" ASC"), "{}", sql);
}

#[test]
fn test_many_to_one_primary_key_uses_foreign_key_column() {
    let registry = registry();

    let mut qb = builder(&registry, "Book", Dialect::DuckDb);
    qb.filter(json!({"author": 1})).unwrap();
    assert_eq!(
        qb.get_query().unwrap(),
        "SELECT \"b0\".* FROM \"book\" AS \"b0\" WHERE \"b0\".\"author_id\" = ?"
    );

    let mut qb = builder(&registry, "Book", Dialect::DuckDb);
    qb.filter(json!({"author": {"id": 1}})).unwrap();
    assert_eq!(qb.joins().count(), 0);
    assert!(qb.get_query().unwrap().ends_with("WHERE \"b0\".\"author_id\" = ?"));
}

#[test]
fn test_many_to_one_nested_criteria_joins_target() {
    let registry = registry();
    let mut qb = builder(&registry, "Book", Dialect::Postgres);
    qb.filter(json!({"author": {"name": "Jon"}})).unwrap();

    let sql = qb.get_query().unwrap();
    assert_eq!(
        sql,
        "SELECT \"b0\".* FROM \"book\" AS \"b0\" LEFT JOIN \"author\" AS \"a1\" ON \"b0\".\"author_id\" = \"a1\".\"id\" WHERE \"a1\".\"name\" = $1"
    );
    assert_valid_sql(&sql, Dialect::Postgres);
}

#[test]
fn test_scalar_many_to_many_joins_pivot_only() {
    let registry = registry();
    let mut qb = builder(&registry, "Book", Dialect::DuckDb);
    qb.filter(json!({"tags": "tag-id-123"})).unwrap();

    let compiled = qb.compile().unwrap();
    assert_eq!(
        compiled.sql,
        "SELECT \"b0\".* FROM \"book\" AS \"b0\" LEFT JOIN \"book_tags\" AS \"b1\" ON \"b0\".\"id\" = \"b1\".\"book_id\" WHERE \"b1\".\"tag_id\" = ?"
    );
    assert!(!compiled.sql.contains("\"tag\""));
    assert_eq!(compiled.params, vec![json!("tag-id-123")]);
}

#[test]
fn test_nested_many_to_many_joins_pivot_and_target() {
    let registry = registry();
    let mut qb = builder(&registry, "Book", Dialect::DuckDb);
    qb.filter(json!({"tags": {"name": "sci-fi"}})).unwrap();

    let sql = qb.get_query().unwrap();
    assert_eq!(
        sql,
        "SELECT \"b0\".* FROM \"book\" AS \"b0\" LEFT JOIN \"book_tags\" AS \"b2\" ON \"b0\".\"id\" = \"b2\".\"book_id\" LEFT JOIN \"tag\" AS \"t1\" ON \"b2\".\"tag_id\" = \"t1\".\"id\" WHERE \"t1\".\"name\" = ?"
    );
    assert_valid_sql(&sql, Dialect::DuckDb);
}

#[test]
fn test_list_on_many_to_many_matches_pivot_keys() {
    let registry = registry();
    let mut qb = builder(&registry, "Book", Dialect::DuckDb);
    qb.filter(json!({"tags": [1, 2]})).unwrap();

    let sql = qb.get_query().unwrap();
    assert!(sql.ends_with("WHERE \"b1\".\"tag_id\" IN (?, ?)"), "{}", sql);
}

// ============================================================================
// Operators
// ============================================================================

#[test]
fn test_operator_pair_on_one_column() {
    let registry = registry();
    let mut qb = builder(&registry, "Author", Dialect::DuckDb);
    qb.filter(json!({"age": {"$gt": 5, "$lt": 10}})).unwrap();

    let compiled = qb.compile().unwrap();
    assert!(
        compiled.sql.ends_with("WHERE \"a0\".\"age\" > ? AND \"a0\".\"age\" < ?"),
        "{}",
        compiled.sql
    );
    assert_eq!(compiled.params, vec![json!(5), json!(10)]);
}

#[test]
fn test_list_means_membership() {
    let registry = registry();
    let mut qb = builder(&registry, "Author", Dialect::DuckDb);
    qb.filter(json!({"id": [1, 2, 3], "name": {"$nin": ["a", "b"]}})).unwrap();

    let sql = qb.get_query().unwrap();
    assert!(
        sql.ends_with("WHERE \"a0\".\"id\" IN (?, ?, ?) AND \"a0\".\"name\" NOT IN (?, ?)"),
        "{}",
        sql
    );
}

#[test]
fn test_or_and_not_groups() {
    let registry = registry();
    let mut qb = builder(&registry, "Author", Dialect::DuckDb);
    qb.filter(json!({
        "$or": [{"name": "Jon"}, {"age": {"$gte": 30}}],
        "$not": {"version": null}
    }))
    .unwrap();

    let sql = qb.get_query().unwrap();
    assert!(
        sql.ends_with("WHERE (\"a0\".\"name\" = ? OR \"a0\".\"age\" >= ?) AND NOT (\"a0\".\"version\" IS NULL)"),
        "{}",
        sql
    );
    assert_valid_sql(&sql, Dialect::DuckDb);
}

#[test]
fn test_null_comparisons() {
    let registry = registry();
    let mut qb = builder(&registry, "Author", Dialect::DuckDb);
    qb.filter(json!({"name": null, "age": {"$ne": null}})).unwrap();

    let compiled = qb.compile().unwrap();
    assert!(compiled.sql.ends_with("\"a0\".\"name\" IS NULL AND \"a0\".\"age\" IS NOT NULL"));
    assert!(compiled.params.is_empty());
}

#[test]
fn test_raw_key_binds_parameters() {
    let registry = registry();
    let mut qb = builder(&registry, "Author", Dialect::Postgres);
    qb.filter(json!({"lower({alias}.name) = ?": ["jon"], "age": 3})).unwrap();

    let compiled = qb.compile().unwrap();
    assert!(
        compiled.sql.ends_with("WHERE lower(a0.name) = $1 AND \"a0\".\"age\" = $2"),
        "{}",
        compiled.sql
    );
    assert_eq!(compiled.params, vec![json!("jon"), json!(3)]);
}

#[test]
fn test_unknown_operator_is_rejected() {
    let registry = registry();
    let mut qb = builder(&registry, "Author", Dialect::DuckDb);

    let err = qb.filter(json!({"age": {"$between": [1, 2]}})).unwrap_err();
    assert_eq!(err, QueryError::UnknownOperator("$between".into()));
}

// ============================================================================
// Key resolution
// ============================================================================

#[test]
fn test_unknown_property_is_rejected() {
    let registry = registry();
    let mut qb = builder(&registry, "Author", Dialect::DuckDb);

    let err = qb.filter(json!({"books": {"isbn": "123"}})).unwrap_err();
    assert_eq!(
        err,
        QueryError::UnknownProperty {
            entity: "Book".into(),
            property: "isbn".into()
        }
    );
}

#[test]
fn test_dotted_key_needs_known_alias() {
    let registry = registry();
    let mut qb = builder(&registry, "Author", Dialect::DuckDb);
    qb.left_join("books", "b").unwrap();
    qb.filter(json!({"b.title": "Dune"})).unwrap();
    assert!(qb.get_query().unwrap().ends_with("WHERE \"b\".\"title\" = ?"));

    let mut qb = builder(&registry, "Author", Dialect::DuckDb);
    let err = qb.filter(json!({"x.title": "Dune"})).unwrap_err();
    assert!(matches!(err, QueryError::UnknownAlias { ref alias, .. } if alias == "x"));
}

#[test]
fn test_embedded_criteria_use_flattened_columns() {
    let registry = registry();
    let mut qb = builder(&registry, "Author", Dialect::DuckDb);
    qb.filter(json!({"address": {"city": "Paris"}})).unwrap();
    assert!(qb.get_query().unwrap().ends_with("WHERE \"a0\".\"address_city\" = ?"));

    let mut qb = builder(&registry, "Author", Dialect::DuckDb);
    let err = qb.filter(json!({"address": {"$or": [{"city": "Paris"}]}})).unwrap_err();
    assert!(matches!(err, QueryError::OperatorInEmbeddable { .. }));

    let err = qb.filter(json!({"address": {"zip": "75001"}})).unwrap_err();
    assert_eq!(
        err,
        QueryError::InvalidEmbeddableQuery {
            entity: "Author".into(),
            property: "address".into(),
            key: "zip".into()
        }
    );
}

#[test]
fn test_empty_criteria_adds_no_where() {
    let registry = registry();
    let mut qb = builder(&registry, "Author", Dialect::DuckDb);
    qb.filter(json!({})).unwrap();

    assert_eq!(qb.get_query().unwrap(), "SELECT \"a0\".* FROM \"author\" AS \"a0\"");
}

#[test]
fn test_empty_relation_criteria_is_ignored() {
    let registry = registry();
    let mut qb = builder(&registry, "Author", Dialect::DuckDb);
    qb.filter(json!({"name": "Jon", "books": {}})).unwrap();

    let compiled = qb.compile().unwrap();
    assert_eq!(
        compiled.sql,
        "SELECT \"a0\".* FROM \"author\" AS \"a0\" WHERE \"a0\".\"name\" = ?"
    );
    assert_eq!(compiled.params, vec![json!("Jon")]);
    assert_eq!(qb.joins().count(), 0);
}
