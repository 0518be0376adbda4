//! INSERT, UPDATE, DELETE and TRUNCATE through the builder.

mod fixtures;

use criteria_sql::query::QueryFlag;
use criteria_sql::sql::Dialect;
use criteria_sql::QueryError;
use fixtures::{assert_valid_sql, builder, registry};
use serde_json::json;

// ============================================================================
// UPDATE / DELETE
// ============================================================================

#[test]
fn test_update_by_primary_key() {
    let registry = registry();
    let mut qb = builder(&registry, "Author", Dialect::Postgres);
    qb.update(json!({"name": "Frank"})).unwrap();
    qb.filter(json!(7)).unwrap();

    let compiled = qb.compile().unwrap();
    assert_eq!(compiled.sql, "UPDATE \"author\" SET \"name\" = $1 WHERE \"id\" = $2");
    assert_eq!(compiled.params, vec![json!("Frank"), json!(7)]);
    assert_valid_sql(&compiled.sql, Dialect::Postgres);
}

#[test]
fn test_update_embedded_and_foreign_key_values() {
    let registry = registry();
    let mut qb = builder(&registry, "Book", Dialect::DuckDb);
    qb.update(json!({"author": {"id": 3}, "title": "Dune"})).unwrap();
    qb.filter(json!({"id": 1})).unwrap();

    let compiled = qb.compile().unwrap();
    assert_eq!(
        compiled.sql,
        "UPDATE \"book\" SET \"author_id\" = ?, \"title\" = ? WHERE \"id\" = ?"
    );
    assert_eq!(compiled.params, vec![json!(3), json!("Dune"), json!(1)]);
}

#[test]
fn test_update_with_relation_criteria_selects_keys_first() {
    let registry = registry();
    let mut qb = builder(&registry, "Author", Dialect::Postgres);
    qb.update(json!({"name": "x"})).unwrap();
    qb.filter(json!({"books": {"title": "Dune"}})).unwrap();
    assert!(qb.has_flag(QueryFlag::UpdateSubQuery));

    let compiled = qb.compile().unwrap();
    assert_eq!(
        compiled.sql,
        "UPDATE \"author\" SET \"name\" = $1 WHERE \"id\" IN (SELECT \"a0\".\"id\" FROM \"author\" AS \"a0\" LEFT JOIN \"book\" AS \"b1\" ON \"a0\".\"id\" = \"b1\".\"author_id\" WHERE \"b1\".\"title\" = $2)"
    );
    assert_eq!(compiled.params, vec![json!("x"), json!("Dune")]);
    assert_valid_sql(&compiled.sql, Dialect::Postgres);
}

#[test]
fn test_mysql_wraps_self_subquery_in_derived_table() {
    let registry = registry();
    let mut qb = builder(&registry, "Author", Dialect::MySql);
    qb.delete().unwrap();
    qb.filter(json!({"books": {"title": "Dune"}})).unwrap();

    let sql = qb.get_query().unwrap();
    assert!(
        sql.starts_with("DELETE FROM `author` WHERE `id` IN (SELECT `a0`.`id` FROM (SELECT `a0`.`id` FROM `author` AS `a0` LEFT JOIN `book` AS `b1`"),
        "{}",
        sql
    );
    assert!(sql.ends_with(") AS `a0`)"), "{}", sql);
    assert_valid_sql(&sql, Dialect::MySql);
}

#[test]
fn test_delete_subtype_filters_discriminator() {
    let registry = registry();
    let mut qb = builder(&registry, "Employee", Dialect::DuckDb);
    qb.delete().unwrap();

    let compiled = qb.compile().unwrap();
    assert_eq!(compiled.sql, "DELETE FROM \"person\" WHERE \"type\" IN (?, ?)");
    assert_eq!(compiled.params, vec![json!("employee"), json!("manager")]);
}

#[test]
fn test_filter_before_delete_is_rejected() {
    let registry = registry();
    let mut qb = builder(&registry, "Author", Dialect::DuckDb);
    qb.filter(json!({"name": "x"})).unwrap();

    assert_eq!(
        qb.delete().unwrap_err(),
        QueryError::MissingPredecessor {
            method: "filter",
            required: "delete"
        }
    );
}

#[test]
fn test_returning_per_dialect() {
    let registry = registry();

    let mut qb = builder(&registry, "Author", Dialect::Postgres);
    qb.update(json!({"name": "x"})).unwrap();
    qb.filter(json!({"id": 1})).unwrap();
    qb.returning(&["id", "version"]).unwrap();
    assert!(qb.get_query().unwrap().ends_with("RETURNING \"id\", \"version\""));

    let mut qb = builder(&registry, "Author", Dialect::TSql);
    qb.delete().unwrap();
    qb.filter(json!({"id": 1})).unwrap();
    qb.returning(&["id"]).unwrap();
    assert_eq!(
        qb.get_query().unwrap(),
        "DELETE FROM [author] OUTPUT DELETED.[id] WHERE [id] = @p1"
    );
}

// ============================================================================
// INSERT
// ============================================================================

#[test]
fn test_insert_rows_fill_missing_columns_with_default() {
    let registry = registry();
    let mut qb = builder(&registry, "Author", Dialect::DuckDb);
    qb.insert(json!([{"name": "a", "age": 1}, {"name": "b"}])).unwrap();

    let compiled = qb.compile().unwrap();
    assert_eq!(
        compiled.sql,
        "INSERT INTO \"author\" (\"name\", \"age\") VALUES (?, ?), (?, DEFAULT)"
    );
    assert_eq!(compiled.params, vec![json!("a"), json!(1), json!("b")]);
}

#[test]
fn test_insert_flattens_embedded_and_relations() {
    let registry = registry();
    let mut qb = builder(&registry, "Book", Dialect::Postgres);
    qb.insert(json!({"title": "Dune", "author": {"id": 3}, "publisher": 9})).unwrap();
    assert_eq!(
        qb.get_query().unwrap(),
        "INSERT INTO \"book\" (\"title\", \"author_id\", \"publisher_id\") VALUES ($1, $2, $3)"
    );

    let mut qb = builder(&registry, "Author", Dialect::Postgres);
    qb.insert(json!({"name": "Jon", "address": {"city": "Paris"}})).unwrap();
    assert_eq!(
        qb.get_query().unwrap(),
        "INSERT INTO \"author\" (\"name\", \"address_city\") VALUES ($1, $2)"
    );
}

#[test]
fn test_insert_explicit_identity_on_tsql() {
    let registry = registry();
    let mut qb = builder(&registry, "Author", Dialect::TSql);
    qb.insert(json!({"id": 5, "name": "Jon"})).unwrap();

    assert_eq!(
        qb.get_query().unwrap(),
        "SET IDENTITY_INSERT [author] ON; INSERT INTO [author] ([id], [name]) VALUES (@p1, @p2); SET IDENTITY_INSERT [author] OFF;"
    );
}

#[test]
fn test_insert_requires_data() {
    let registry = registry();
    let mut qb = builder(&registry, "Author", Dialect::DuckDb);

    assert_eq!(qb.insert(json!([])).unwrap_err(), QueryError::MissingData("insert"));
}

#[test]
fn test_insert_unknown_property() {
    let registry = registry();
    let mut qb = builder(&registry, "Author", Dialect::DuckDb);
    qb.insert(json!({"nickname": "J"})).unwrap();

    assert!(matches!(
        qb.compile().unwrap_err(),
        QueryError::UnknownProperty { ref property, .. } if property == "nickname"
    ));
}

// ============================================================================
// TRUNCATE
// ============================================================================

#[test]
fn test_truncate_per_dialect() {
    let registry = registry();

    let mut qb = builder(&registry, "Author", Dialect::Postgres);
    qb.truncate().unwrap();
    assert_eq!(
        qb.get_query().unwrap(),
        "TRUNCATE TABLE \"author\" RESTART IDENTITY CASCADE"
    );

    let mut qb = builder(&registry, "Author", Dialect::MySql);
    qb.truncate().unwrap();
    assert_eq!(qb.get_query().unwrap(), "TRUNCATE TABLE `author`");
}
