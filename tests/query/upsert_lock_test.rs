//! Upserts and row locks across dialects.

mod fixtures;

use criteria_sql::connection::TransactionContext;
use criteria_sql::query::{LockMode, MergeData};
use criteria_sql::sql::Dialect;
use criteria_sql::QueryError;
use fixtures::{assert_valid_sql, builder, registry};
use serde_json::json;

// ============================================================================
// Upserts
// ============================================================================

#[test]
fn test_on_conflict_without_resolution_does_nothing() {
    let registry = registry();
    let mut qb = builder(&registry, "Author", Dialect::Postgres);
    qb.insert(json!({"id": 1, "name": "Jon"})).unwrap();
    qb.on_conflict(&["id"]).unwrap();

    let sql = qb.get_query().unwrap();
    assert_eq!(
        sql,
        "INSERT INTO \"author\" (\"id\", \"name\") VALUES ($1, $2) ON CONFLICT (\"id\") DO NOTHING"
    );
    assert_valid_sql(&sql, Dialect::Postgres);
}

#[test]
fn test_merge_all_updates_non_target_columns() {
    let registry = registry();
    let mut qb = builder(&registry, "Author", Dialect::Postgres);
    qb.insert(json!({"id": 1, "name": "Jon", "age": 40})).unwrap();
    qb.on_conflict(&["id"]).unwrap().merge(MergeData::All).unwrap();

    assert_eq!(
        qb.get_query().unwrap(),
        "INSERT INTO \"author\" (\"id\", \"name\", \"age\") VALUES ($1, $2, $3) ON CONFLICT (\"id\") DO UPDATE SET \"name\" = excluded.\"name\", \"age\" = excluded.\"age\""
    );
}

#[test]
fn test_merge_fields_and_values() {
    let registry = registry();

    let mut qb = builder(&registry, "Author", Dialect::DuckDb);
    qb.insert(json!({"id": 1, "name": "Jon", "age": 40})).unwrap();
    qb.on_conflict(&["id"]).unwrap();
    qb.merge(MergeData::Fields(vec!["age".into()])).unwrap();
    assert!(qb
        .get_query()
        .unwrap()
        .ends_with("ON CONFLICT (\"id\") DO UPDATE SET \"age\" = excluded.\"age\""));

    let mut values = serde_json::Map::new();
    values.insert("name".into(), json!("renamed"));
    let mut qb = builder(&registry, "Author", Dialect::Postgres);
    qb.insert(json!({"id": 1, "name": "Jon"})).unwrap();
    qb.on_conflict(&["id"]).unwrap();
    qb.merge(MergeData::Values(values)).unwrap();

    let compiled = qb.compile().unwrap();
    assert!(compiled.sql.ends_with("DO UPDATE SET \"name\" = $3"), "{}", compiled.sql);
    assert_eq!(compiled.params, vec![json!(1), json!("Jon"), json!("renamed")]);
}

#[test]
fn test_conditional_merge() {
    let registry = registry();
    let mut qb = builder(&registry, "Author", Dialect::Postgres);
    qb.insert(json!({"id": 1, "name": "Jon"})).unwrap();
    qb.on_conflict(&["id"]).unwrap().merge(MergeData::All).unwrap();
    qb.on_conflict_where(json!({"version": {"$lt": 3}})).unwrap();

    let compiled = qb.compile().unwrap();
    assert!(
        compiled.sql.ends_with("DO UPDATE SET \"name\" = excluded.\"name\" WHERE \"version\" < $3"),
        "{}",
        compiled.sql
    );

    let mut qb = builder(&registry, "Author", Dialect::TSql);
    qb.insert(json!({"name": "Jon"})).unwrap();
    qb.on_conflict(&["name"]).unwrap().merge(MergeData::All).unwrap();
    qb.on_conflict_where(json!({"version": {"$lt": 3}})).unwrap();
    assert!(matches!(
        qb.compile().unwrap_err(),
        QueryError::Unsupported { dialect: "tsql", .. }
    ));
}

#[test]
fn test_mysql_upserts() {
    let registry = registry();

    let mut qb = builder(&registry, "Author", Dialect::MySql);
    qb.insert(json!({"id": 1, "name": "Jon"})).unwrap();
    qb.on_conflict(&["id"]).unwrap().ignore().unwrap();
    assert_eq!(
        qb.get_query().unwrap(),
        "INSERT IGNORE INTO `author` (`id`, `name`) VALUES (?, ?)"
    );

    let mut qb = builder(&registry, "Author", Dialect::MySql);
    qb.insert(json!({"id": 1, "name": "Jon"})).unwrap();
    qb.on_conflict(&["id"]).unwrap().merge(MergeData::All).unwrap();
    let sql = qb.get_query().unwrap();
    assert_eq!(
        sql,
        "INSERT INTO `author` (`id`, `name`) VALUES (?, ?) ON DUPLICATE KEY UPDATE `name` = VALUES(`name`)"
    );
    assert_valid_sql(&sql, Dialect::MySql);
}

#[test]
fn test_tsql_upsert_is_a_merge() {
    let registry = registry();
    let mut qb = builder(&registry, "Author", Dialect::TSql);
    qb.insert(json!({"name": "Jon", "age": 3})).unwrap();
    qb.on_conflict(&["name"]).unwrap().merge(MergeData::All).unwrap();

    assert_eq!(
        qb.get_query().unwrap(),
        "MERGE INTO [author] USING (VALUES (@p1, @p2)) AS [tsource] ([name], [age]) ON [author].[name] = [tsource].[name] WHEN MATCHED THEN UPDATE SET [age] = [tsource].[age] WHEN NOT MATCHED THEN INSERT ([name], [age]) VALUES ([tsource].[name], [tsource].[age]);"
    );
}

#[test]
fn test_merge_needs_conflict_target() {
    let registry = registry();
    let mut qb = builder(&registry, "Author", Dialect::Snowflake);
    qb.insert(json!({"name": "Jon"})).unwrap();
    qb.on_conflict(&[]).unwrap().ignore().unwrap();

    assert_eq!(qb.compile().unwrap_err(), QueryError::MissingConflictTarget);
}

#[test]
fn test_redshift_has_no_upsert() {
    let registry = registry();
    let mut qb = builder(&registry, "Author", Dialect::Redshift);
    qb.insert(json!({"name": "Jon"})).unwrap();
    qb.on_conflict(&["name"]).unwrap().ignore().unwrap();

    assert_eq!(
        qb.compile().unwrap_err(),
        QueryError::Unsupported {
            dialect: "redshift",
            feature: "upsert".into()
        }
    );
}

#[test]
fn test_upsert_calls_need_their_predecessor() {
    let registry = registry();

    let mut qb = builder(&registry, "Author", Dialect::Postgres);
    qb.select(["*"]).unwrap();
    assert_eq!(
        qb.on_conflict(&["id"]).unwrap_err(),
        QueryError::MissingPredecessor {
            method: "on_conflict",
            required: "insert"
        }
    );

    let mut qb = builder(&registry, "Author", Dialect::Postgres);
    qb.insert(json!({"name": "Jon"})).unwrap();
    assert_eq!(
        qb.ignore().unwrap_err(),
        QueryError::MissingPredecessor {
            method: "ignore",
            required: "on_conflict"
        }
    );
}

// ============================================================================
// Locks
// ============================================================================

fn locked(dialect: Dialect, mode: LockMode, tables: &[&str]) -> String {
    let registry = registry();
    let mut qb = builder(&registry, "Author", dialect);
    qb.filter(json!({"id": 1})).unwrap();
    qb.set_transaction(TransactionContext::new("tx-1")).unwrap();
    qb.set_lock_mode(mode, tables).unwrap();
    qb.get_query().unwrap()
}

#[test]
fn test_postgres_lock_clauses() {
    let base = "SELECT \"a0\".* FROM \"author\" AS \"a0\" WHERE \"a0\".\"id\" = $1";

    assert_eq!(
        locked(Dialect::Postgres, LockMode::PessimisticWrite, &[]),
        format!("{} FOR UPDATE", base)
    );
    assert_eq!(
        locked(Dialect::Postgres, LockMode::PessimisticRead, &[]),
        format!("{} FOR SHARE", base)
    );
    assert_eq!(
        locked(Dialect::Postgres, LockMode::PessimisticPartialWrite, &["a0"]),
        format!("{} FOR UPDATE OF \"a0\" SKIP LOCKED", base)
    );
    assert_eq!(
        locked(Dialect::Postgres, LockMode::PessimisticReadOrFail, &[]),
        format!("{} FOR SHARE NOWAIT", base)
    );
}

#[test]
fn test_mysql_shared_lock_spelling() {
    let sql = locked(Dialect::MySql, LockMode::PessimisticRead, &[]);
    assert!(sql.ends_with("LOCK IN SHARE MODE"), "{}", sql);

    let sql = locked(Dialect::MySql, LockMode::PessimisticPartialRead, &[]);
    assert!(sql.ends_with("FOR SHARE SKIP LOCKED"), "{}", sql);
}

#[test]
fn test_tsql_locks_are_table_hints() {
    assert_eq!(
        locked(Dialect::TSql, LockMode::PessimisticWrite, &[]),
        "SELECT [a0].* FROM [author] AS [a0] WITH (UPDLOCK) WHERE [a0].[id] = @p1"
    );
    assert!(locked(Dialect::TSql, LockMode::PessimisticPartialWrite, &[])
        .contains("WITH (UPDLOCK, READPAST)"));
}

#[test]
fn test_lock_preconditions() {
    let registry = registry();

    let mut qb = builder(&registry, "Author", Dialect::Postgres);
    assert_eq!(
        qb.set_lock_mode(LockMode::PessimisticWrite, &[]).unwrap_err(),
        QueryError::TransactionRequired
    );

    let mut qb = builder(&registry, "Author", Dialect::DuckDb);
    qb.set_transaction(TransactionContext::new("tx-1")).unwrap();
    assert!(matches!(
        qb.set_lock_mode(LockMode::PessimisticWrite, &[]).unwrap_err(),
        QueryError::Unsupported { dialect: "duckdb", .. }
    ));

    let mut qb = builder(&registry, "Author", Dialect::Postgres);
    qb.set_transaction(TransactionContext::new("tx-1")).unwrap();
    assert_eq!(
        qb.set_lock_mode(LockMode::PessimisticWrite, &["zz"]).unwrap_err(),
        QueryError::UnknownAlias {
            alias: "zz".into(),
            available: vec!["a0".into()]
        }
    );
}

#[test]
fn test_optimistic_lock_needs_version() {
    let registry = registry();

    let mut qb = builder(&registry, "Book", Dialect::Postgres);
    assert_eq!(
        qb.set_lock_mode(LockMode::Optimistic, &[]).unwrap_err(),
        QueryError::NotVersioned("Book".into())
    );

    let mut qb = builder(&registry, "Author", Dialect::Postgres);
    qb.set_lock_mode(LockMode::Optimistic, &[]).unwrap();
    assert!(!qb.get_query().unwrap().contains("FOR "));
}
