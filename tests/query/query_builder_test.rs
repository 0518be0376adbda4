//! QueryBuilder sessions: selection, joins, grouping and the finalize lifecycle.

mod fixtures;

use criteria_sql::query::{JoinKind, PopulateFilter, PopulateWhere, QueryKind};
use criteria_sql::sql::Dialect;
use criteria_sql::QueryError;
use fixtures::{assert_valid_sql, builder, registry};
use serde_json::json;

// ============================================================================
// Selection
// ============================================================================

#[test]
fn test_select_properties() {
    let registry = registry();
    let mut qb = builder(&registry, "Author", Dialect::DuckDb);
    qb.select(["id", "name", "address"]).unwrap();

    assert_eq!(
        qb.get_query().unwrap(),
        "SELECT \"a0\".\"id\", \"a0\".\"name\", \"a0\".\"address_city\", \"a0\".\"address_street\" FROM \"author\" AS \"a0\""
    );
}

#[test]
fn test_default_selection_is_root_star() {
    let registry = registry();
    let mut qb = builder(&registry, "Author", Dialect::TSql);
    qb.filter(json!({"name": "Jon"})).unwrap();

    assert_eq!(
        qb.get_query().unwrap(),
        "SELECT [a0].* FROM [author] AS [a0] WHERE [a0].[name] = @p1"
    );
    assert_eq!(qb.kind(), Some(QueryKind::Select));
}

#[test]
fn test_distinct() {
    let registry = registry();
    let mut qb = builder(&registry, "Author", Dialect::DuckDb);
    qb.select(["name"]).unwrap().distinct().unwrap();

    assert_eq!(
        qb.get_query().unwrap(),
        "SELECT DISTINCT \"a0\".\"name\" FROM \"author\" AS \"a0\""
    );
}

#[test]
fn test_inverse_one_to_one_field_selects_owner_key() {
    let registry = registry();
    let mut qb = builder(&registry, "Author", Dialect::DuckDb);
    qb.select(["id", "profile"]).unwrap();

    let sql = qb.get_query().unwrap();
    assert_eq!(
        sql,
        "SELECT \"a0\".\"id\", \"p1\".\"id\" AS \"profile\" FROM \"author\" AS \"a0\" LEFT JOIN \"profile\" AS \"p1\" ON \"a0\".\"id\" = \"p1\".\"author_id\""
    );
    assert_valid_sql(&sql, Dialect::DuckDb);
}

// ============================================================================
// Joins
// ============================================================================

#[test]
fn test_join_and_select_projects_joined_columns() {
    let registry = registry();
    let mut qb = builder(&registry, "Author", Dialect::DuckDb);
    qb.left_join_and_select("books", "b").unwrap();

    let sql = qb.get_query().unwrap();
    assert_eq!(
        sql,
        "SELECT \"a0\".*, \"b\".\"id\" AS \"b__id\", \"b\".\"title\" AS \"b__title\", \"b\".\"price\" AS \"b__price\", \"b\".\"author_id\" AS \"b__author_id\", \"b\".\"publisher_id\" AS \"b__publisher_id\" FROM \"author\" AS \"a0\" LEFT JOIN \"book\" AS \"b\" ON \"a0\".\"id\" = \"b\".\"author_id\""
    );
    assert_valid_sql(&sql, Dialect::DuckDb);
}

#[test]
fn test_join_with_extra_condition() {
    let registry = registry();
    let mut qb = builder(&registry, "Author", Dialect::Postgres);
    qb.join("books", "b", Some(json!({"price": {"$lt": 20}})), JoinKind::Inner)
        .unwrap();

    let compiled = qb.compile().unwrap();
    assert_eq!(
        compiled.sql,
        "SELECT \"a0\".* FROM \"author\" AS \"a0\" INNER JOIN \"book\" AS \"b\" ON \"a0\".\"id\" = \"b\".\"author_id\" AND \"b\".\"price\" < $1"
    );
    assert_eq!(compiled.params, vec![json!(20)]);
}

#[test]
fn test_inner_join_under_left_join_renders_nested() {
    let registry = registry();
    let mut qb = builder(&registry, "Author", Dialect::Postgres);
    qb.left_join("books", "b").unwrap();
    qb.inner_join("b.publisher", "p").unwrap();

    let sql = qb.get_query().unwrap();
    assert_eq!(
        sql,
        "SELECT \"a0\".* FROM \"author\" AS \"a0\" LEFT JOIN (\"book\" AS \"b\" INNER JOIN \"publisher\" AS \"p\" ON \"b\".\"publisher_id\" = \"p\".\"id\") ON \"a0\".\"id\" = \"b\".\"author_id\""
    );
    assert_valid_sql(&sql, Dialect::Postgres);
}

#[test]
fn test_join_subquery_as_derived_table() {
    let registry = registry();

    let mut totals = builder(&registry, "Book", Dialect::DuckDb);
    totals.select(["author", "count(b0.id) as total"]).unwrap();
    totals.group_by(&["author"]).unwrap();

    let mut qb = builder(&registry, "Author", Dialect::DuckDb);
    qb.select(["*", "s.total"]).unwrap();
    qb.join_subquery(totals, "s", Some(json!({"a0.id = s.author_id": []})), JoinKind::Left)
        .unwrap();

    let sql = qb.get_query().unwrap();
    assert_eq!(
        sql,
        "SELECT \"a0\".*, \"s\".\"total\" FROM \"author\" AS \"a0\" LEFT JOIN (SELECT \"b0\".\"author_id\", count(b0.id) as total FROM \"book\" AS \"b0\" GROUP BY \"b0\".\"author_id\") AS \"s\" ON a0.id = s.author_id"
    );
    assert_valid_sql(&sql, Dialect::DuckDb);
}

#[test]
fn test_populate_selects_relation() {
    let registry = registry();
    let mut qb = builder(&registry, "Book", Dialect::DuckDb);
    qb.populate(&["publisher"]).unwrap();

    let sql = qb.get_query().unwrap();
    assert_eq!(
        sql,
        "SELECT \"b0\".*, \"p1\".\"id\" AS \"p1__id\", \"p1\".\"name\" AS \"p1__name\" FROM \"book\" AS \"b0\" LEFT JOIN \"publisher\" AS \"p1\" ON \"b0\".\"publisher_id\" = \"p1\".\"id\""
    );
}

#[test]
fn test_populate_where_infer_moves_filter_into_join() {
    let registry = registry();
    let mut qb = builder(&registry, "Author", Dialect::DuckDb);
    qb.populate(&["books"]).unwrap();
    qb.populate_where(PopulateWhere::Infer).unwrap();
    qb.filter(json!({"books": {"title": "Dune"}})).unwrap();

    let sql = qb.get_query().unwrap();
    assert!(
        sql.ends_with("LEFT JOIN \"book\" AS \"b1\" ON \"a0\".\"id\" = \"b1\".\"author_id\" AND \"b1\".\"title\" = ?"),
        "{}",
        sql
    );
    assert!(!sql.contains("WHERE"), "{}", sql);
}

#[test]
fn test_populate_where_all_keeps_filter_in_where() {
    let registry = registry();
    let mut qb = builder(&registry, "Author", Dialect::DuckDb);
    qb.populate(&["books"]).unwrap();
    qb.filter(json!({"books": {"title": "Dune"}})).unwrap();

    let sql = qb.get_query().unwrap();
    assert!(sql.ends_with("WHERE \"b1\".\"title\" = ?"), "{}", sql);
}

#[test]
fn test_populate_where_criteria_go_into_join() {
    let registry = registry();
    let mut qb = builder(&registry, "Author", Dialect::DuckDb);
    qb.populate(&["books"]).unwrap();
    qb.populate_where(PopulateFilter::Criteria(json!({"books": {"title": "x"}}))).unwrap();
    qb.filter(json!({"name": "Jon"})).unwrap();

    let compiled = qb.compile().unwrap();
    assert!(
        compiled.sql.ends_with(
            "LEFT JOIN \"book\" AS \"b1\" ON \"a0\".\"id\" = \"b1\".\"author_id\" AND \"b1\".\"title\" = ? WHERE \"a0\".\"name\" = ?"
        ),
        "{}",
        compiled.sql
    );
    assert_eq!(compiled.params, vec![json!("x"), json!("Jon")]);
    assert_valid_sql(&compiled.sql, Dialect::DuckDb);
}

#[test]
fn test_populate_where_criteria_on_unpopulated_relation_are_dropped() {
    let registry = registry();
    let mut qb = builder(&registry, "Author", Dialect::DuckDb);
    qb.populate(&["books"]).unwrap();
    qb.populate_where(PopulateFilter::Criteria(json!({"books": {"title": "x"}, "profile": {"bio": "y"}})))
        .unwrap();

    let compiled = qb.compile().unwrap();
    assert!(!compiled.sql.contains("\"profile\""), "{}", compiled.sql);
    assert!(
        compiled.sql.ends_with("AND \"b1\".\"title\" = ?"),
        "{}",
        compiled.sql
    );
    assert_eq!(compiled.params, vec![json!("x")]);
    assert_eq!(qb.joins().count(), 1);
}

// ============================================================================
// Conditions, grouping, counting
// ============================================================================

#[test]
fn test_or_filter_with_raw_sql() {
    let registry = registry();
    let mut qb = builder(&registry, "Author", Dialect::DuckDb);
    qb.filter(json!({"name": "Jon"})).unwrap();
    qb.or_filter_raw("a0.age > ?", vec![json!(30)]).unwrap();

    let compiled = qb.compile().unwrap();
    assert!(
        compiled.sql.ends_with("WHERE (\"a0\".\"name\" = ? OR (a0.age > ?))"),
        "{}",
        compiled.sql
    );
    assert_eq!(compiled.params, vec![json!("Jon"), json!(30)]);
}

#[test]
fn test_group_by_and_having() {
    let registry = registry();
    let mut qb = builder(&registry, "Author", Dialect::DuckDb);
    qb.select(["name", "count(a0.id) as c"]).unwrap();
    qb.group_by(&["name"]).unwrap();
    qb.having(json!({"count(a0.id) > ?": [1]})).unwrap();

    let sql = qb.get_query().unwrap();
    assert_eq!(
        sql,
        "SELECT \"a0\".\"name\", count(a0.id) as c FROM \"author\" AS \"a0\" GROUP BY \"a0\".\"name\" HAVING count(a0.id) > ?"
    );
    assert_valid_sql(&sql, Dialect::DuckDb);
}

#[test]
fn test_count_rows() {
    let registry = registry();
    let mut qb = builder(&registry, "Author", Dialect::DuckDb);
    qb.count(None, false).unwrap();

    assert_eq!(
        qb.get_query().unwrap(),
        "SELECT COUNT(*) AS \"count\" FROM \"author\" AS \"a0\""
    );
}

#[test]
fn test_count_is_distinct_over_to_many_joins() {
    let registry = registry();
    let mut qb = builder(&registry, "Author", Dialect::DuckDb);
    qb.count(None, false).unwrap();
    qb.filter(json!({"books": {"title": "Dune"}})).unwrap();

    let sql = qb.get_query().unwrap();
    assert!(
        sql.starts_with("SELECT COUNT(DISTINCT \"a0\".\"id\") AS \"count\" FROM \"author\" AS \"a0\" LEFT JOIN"),
        "{}",
        sql
    );
    assert_valid_sql(&sql, Dialect::DuckDb);
}

#[test]
fn test_single_table_inheritance_discriminator() {
    let registry = registry();

    let mut qb = builder(&registry, "Employee", Dialect::DuckDb);
    qb.filter(json!({"salary": {"$gt": 10}})).unwrap();
    let compiled = qb.compile().unwrap();
    assert_eq!(
        compiled.sql,
        "SELECT \"e0\".* FROM \"person\" AS \"e0\" WHERE \"e0\".\"salary\" > ? AND \"e0\".\"type\" IN (?, ?)"
    );
    assert_eq!(compiled.params, vec![json!(10), json!("employee"), json!("manager")]);

    let mut qb = builder(&registry, "Manager", Dialect::DuckDb);
    assert!(qb.get_query().unwrap().ends_with("WHERE \"m0\".\"type\" = ?"));

    let mut qb = builder(&registry, "Person", Dialect::DuckDb);
    assert!(!qb.get_query().unwrap().contains("WHERE"));
}

// ============================================================================
// Lifecycle
// ============================================================================

#[test]
fn test_recompile_is_identical() {
    let registry = registry();
    let mut qb = builder(&registry, "Author", Dialect::Postgres);
    qb.filter(json!({"books": {"tags": {"name": "x"}}})).unwrap();
    qb.limit(3).unwrap();

    let first = qb.compile().unwrap();
    let second = qb.compile().unwrap();
    assert_eq!(first, second);
    assert_eq!(qb.get_params().unwrap(), first.params);
}

#[test]
fn test_finalized_builder_rejects_changes() {
    let registry = registry();
    let mut qb = builder(&registry, "Author", Dialect::DuckDb);
    qb.filter(json!({"name": "Jon"})).unwrap();
    let mut copy = qb.clone();

    qb.get_query().unwrap();
    assert!(qb.is_finalized());
    assert_eq!(qb.limit(1).unwrap_err(), QueryError::AlreadyFinalized);
    assert_eq!(qb.populate(&["books"]).unwrap_err(), QueryError::AlreadyFinalized);

    copy.limit(1).unwrap();
    assert!(copy.get_query().unwrap().ends_with("LIMIT ?"));
}

#[test]
fn test_failed_compile_fails_again() {
    let registry = registry();
    let mut qb = builder(&registry, "Author", Dialect::DuckDb);
    qb.select(["*"]).unwrap();
    qb.populate(&["books", "nope"]).unwrap();
    qb.limit(2).unwrap();

    let expected = QueryError::UnknownProperty {
        entity: "Author".into(),
        property: "nope".into(),
    };
    assert_eq!(qb.compile().unwrap_err(), expected);
    assert_eq!(qb.compile().unwrap_err(), expected);
    assert_eq!(qb.get_query().unwrap_err(), expected);
    assert!(!qb.is_finalized());
}

#[test]
fn test_formatted_query_inlines_values() {
    let registry = registry();
    let mut qb = builder(&registry, "Author", Dialect::DuckDb);
    qb.filter(json!({"name": "O'Brien", "age": 40})).unwrap();

    assert_eq!(
        qb.get_formatted_query().unwrap(),
        "SELECT \"a0\".* FROM \"author\" AS \"a0\" WHERE \"a0\".\"name\" = 'O''Brien' AND \"a0\".\"age\" = 40"
    );
}

#[test]
fn test_unknown_entity() {
    let registry = registry();
    let err = criteria_sql::QueryBuilder::new(&registry, "Ghost").unwrap_err();
    assert_eq!(err, QueryError::UnknownEntity("Ghost".into()));
}
