//! The same builder session rendered for every dialect.

mod fixtures;

use criteria_sql::sql::Dialect;
use criteria_sql::QueryError;
use fixtures::{assert_valid_sql, builder, registry};
use insta::assert_snapshot;
use serde_json::{json, Value};

fn adults_page(dialect: Dialect) -> String {
    let registry = registry();
    let mut qb = builder(&registry, "Author", dialect);
    qb.filter(json!({"age": {"$gte": 18}})).unwrap();
    qb.order_by(json!({"name": "desc nulls last"})).unwrap();
    qb.limit(10).unwrap().offset(20).unwrap();
    qb.get_query().unwrap()
}

fn name_filter(dialect: Dialect, criteria: Value) -> Result<String, QueryError> {
    let registry = registry();
    let mut qb = builder(&registry, "Author", dialect);
    qb.filter(json!({ "name": criteria }))?;
    qb.get_query()
}

#[test]
fn test_postgres() {
    let sql = adults_page(Dialect::Postgres);
    assert_snapshot!(sql, @r#"SELECT "a0".* FROM "author" AS "a0" WHERE "a0"."age" >= $1 ORDER BY "a0"."name" DESC NULLS LAST LIMIT $2 OFFSET $3"#);
    assert_valid_sql(&sql, Dialect::Postgres);
}

#[test]
fn test_redshift() {
    let sql = adults_page(Dialect::Redshift);
    assert_snapshot!(sql, @r#"SELECT "a0".* FROM "author" AS "a0" WHERE "a0"."age" >= $1 ORDER BY "a0"."name" DESC NULLS LAST LIMIT $2 OFFSET $3"#);
}

#[test]
fn test_duckdb() {
    let sql = adults_page(Dialect::DuckDb);
    assert_snapshot!(sql, @r#"SELECT "a0".* FROM "author" AS "a0" WHERE "a0"."age" >= ? ORDER BY "a0"."name" DESC NULLS LAST LIMIT ? OFFSET ?"#);
    assert_valid_sql(&sql, Dialect::DuckDb);
}

#[test]
fn test_snowflake() {
    let sql = adults_page(Dialect::Snowflake);
    assert_snapshot!(sql, @r#"SELECT "a0".* FROM "author" AS "a0" WHERE "a0"."age" >= ? ORDER BY "a0"."name" DESC NULLS LAST LIMIT ? OFFSET ?"#);
    assert_valid_sql(&sql, Dialect::Snowflake);
}

#[test]
fn test_mysql_emulates_nulls_ordering() {
    let sql = adults_page(Dialect::MySql);
    assert_snapshot!(sql, @"SELECT `a0`.* FROM `author` AS `a0` WHERE `a0`.`age` >= ? ORDER BY CASE WHEN `a0`.`name` IS NULL THEN 1 ELSE 0 END, `a0`.`name` DESC LIMIT ? OFFSET ?");
    assert_valid_sql(&sql, Dialect::MySql);
}

#[test]
fn test_tsql_offset_fetch() {
    let sql = adults_page(Dialect::TSql);
    assert_snapshot!(sql, @"SELECT [a0].* FROM [author] AS [a0] WHERE [a0].[age] >= @p1 ORDER BY CASE WHEN [a0].[name] IS NULL THEN 1 ELSE 0 END, [a0].[name] DESC OFFSET @p2 ROWS FETCH NEXT @p3 ROWS ONLY");

    let registry = registry();
    let mut qb = builder(&registry, "Author", Dialect::TSql);
    qb.limit(5).unwrap();
    assert_eq!(qb.get_query().unwrap(), "SELECT TOP (@p1) [a0].* FROM [author] AS [a0]");
}

// ============================================================================
// Operators with dialect-specific spelling
// ============================================================================

#[test]
fn test_ilike() {
    let pattern = json!({"$ilike": "j%"});
    assert!(name_filter(Dialect::Postgres, pattern.clone())
        .unwrap()
        .ends_with("WHERE \"a0\".\"name\" ILIKE $1"));
    assert!(name_filter(Dialect::MySql, pattern.clone())
        .unwrap()
        .ends_with("WHERE LOWER(`a0`.`name`) LIKE LOWER(?)"));
    assert!(name_filter(Dialect::TSql, pattern)
        .unwrap()
        .ends_with("WHERE LOWER([a0].[name]) LIKE LOWER(@p1)"));
}

#[test]
fn test_regex() {
    let pattern = json!({"$re": "^J"});
    assert!(name_filter(Dialect::Postgres, pattern.clone())
        .unwrap()
        .ends_with("WHERE \"a0\".\"name\" ~ $1"));
    assert!(name_filter(Dialect::MySql, pattern.clone())
        .unwrap()
        .ends_with("WHERE `a0`.`name` REGEXP ?"));
    assert!(name_filter(Dialect::DuckDb, pattern.clone())
        .unwrap()
        .ends_with("WHERE regexp_matches(\"a0\".\"name\", ?)"));
    assert!(name_filter(Dialect::Snowflake, pattern.clone())
        .unwrap()
        .ends_with("WHERE REGEXP_LIKE(\"a0\".\"name\", ?)"));
    assert_eq!(
        name_filter(Dialect::TSql, pattern).unwrap_err(),
        QueryError::Unsupported {
            dialect: "tsql",
            feature: "$re".into()
        }
    );
}

#[test]
fn test_array_operators() {
    assert!(name_filter(Dialect::Postgres, json!({"$overlap": ["a", "b"]}))
        .unwrap()
        .ends_with("WHERE \"a0\".\"name\" && $1"));
    assert!(matches!(
        name_filter(Dialect::DuckDb, json!({"$contains": ["a"]})).unwrap_err(),
        QueryError::Unsupported { dialect: "duckdb", .. }
    ));
}

#[test]
fn test_identifier_quoting() {
    let registry = registry();
    for (dialect, expected) in [
        (Dialect::Postgres, "SELECT \"a0\".\"name\" FROM \"author\" AS \"a0\""),
        (Dialect::MySql, "SELECT `a0`.`name` FROM `author` AS `a0`"),
        (Dialect::TSql, "SELECT [a0].[name] FROM [author] AS [a0]"),
    ] {
        let mut qb = builder(&registry, "Author", dialect);
        qb.select(["name"]).unwrap();
        assert_eq!(qb.get_query().unwrap(), expected, "{}", dialect);
    }
}
