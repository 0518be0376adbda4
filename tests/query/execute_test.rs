//! Running compiled queries through a driver.

mod fixtures;

use async_trait::async_trait;
use criteria_sql::prelude::*;
use fixtures::{builder, registry};
use serde_json::{json, Map};
use tokio::sync::Mutex;

/// Driver that records every call and answers by mode.
#[derive(Default)]
struct Recorder {
    calls: Mutex<Vec<(CompiledQuery, ExecuteMode, Option<TransactionContext>)>>,
    fail: bool,
}

#[async_trait]
impl Connection for Recorder {
    async fn execute(
        &self,
        query: &CompiledQuery,
        mode: ExecuteMode,
        ctx: Option<&TransactionContext>,
    ) -> Result<QueryOutcome, ConnectionError> {
        if self.fail {
            return Err(ConnectionError::Statement("syntax error".into()));
        }
        self.calls
            .lock()
            .await
            .push((query.clone(), mode, ctx.cloned()));

        let mut row = Map::new();
        row.insert("id".into(), json!(1));
        Ok(match mode {
            ExecuteMode::All => QueryOutcome::Rows(vec![row]),
            ExecuteMode::Get => QueryOutcome::Row(Some(row)),
            ExecuteMode::Run => QueryOutcome::Affected {
                rows: 1,
                insert_id: Some(json!(1)),
            },
        })
    }
}

#[tokio::test]
async fn test_select_returns_all_rows() {
    let registry = registry();
    let conn = Recorder::default();
    let mut qb = builder(&registry, "Author", Dialect::Postgres);
    qb.filter(json!({"name": "Jon"})).unwrap();

    let outcome = qb.execute(&conn, None).await.unwrap();
    assert!(matches!(outcome, QueryOutcome::Rows(ref rows) if rows.len() == 1));

    let calls = conn.calls.lock().await;
    assert_eq!(calls.len(), 1);
    let (query, mode, ctx) = &calls[0];
    assert_eq!(
        query.sql,
        "SELECT \"a0\".* FROM \"author\" AS \"a0\" WHERE \"a0\".\"name\" = $1"
    );
    assert_eq!(query.params, vec![json!("Jon")]);
    assert_eq!(query.placeholders, PlaceholderStyle::Dollar);
    assert_eq!(*mode, ExecuteMode::All);
    assert!(ctx.is_none());
}

#[tokio::test]
async fn test_modes_default_by_statement_kind() {
    let registry = registry();
    let conn = Recorder::default();

    let mut qb = builder(&registry, "Author", Dialect::DuckDb);
    qb.count(None, false).unwrap();
    assert!(matches!(
        qb.execute(&conn, None).await.unwrap(),
        QueryOutcome::Row(Some(_))
    ));

    let mut qb = builder(&registry, "Author", Dialect::DuckDb);
    qb.insert(json!({"name": "Jon"})).unwrap();
    assert_eq!(
        qb.execute(&conn, None).await.unwrap(),
        QueryOutcome::Affected {
            rows: 1,
            insert_id: Some(json!(1))
        }
    );

    let mut qb = builder(&registry, "Author", Dialect::DuckDb);
    qb.filter(json!({"id": 1})).unwrap();
    qb.execute(&conn, Some(ExecuteMode::Get)).await.unwrap();

    let modes: Vec<ExecuteMode> = conn.calls.lock().await.iter().map(|c| c.1).collect();
    assert_eq!(modes, vec![ExecuteMode::Get, ExecuteMode::Run, ExecuteMode::Get]);
}

#[tokio::test]
async fn test_transaction_is_passed_to_driver() {
    let registry = registry();
    let conn = Recorder::default();
    let mut qb = builder(&registry, "Author", Dialect::Postgres);
    qb.filter(json!({"id": 1})).unwrap();
    qb.set_transaction(TransactionContext::new("tx-9").read_only())
        .unwrap();
    qb.set_lock_mode(LockMode::PessimisticRead, &[]).unwrap();

    qb.execute(&conn, None).await.unwrap();

    let calls = conn.calls.lock().await;
    let (query, _, ctx) = &calls[0];
    assert!(query.sql.ends_with("FOR SHARE"), "{}", query.sql);
    assert_eq!(ctx.as_ref().map(|c| c.id.as_str()), Some("tx-9"));
    assert!(ctx.as_ref().is_some_and(|c| c.read_only));
}

#[tokio::test]
async fn test_errors_surface_from_both_sides() {
    let registry = registry();

    let failing = Recorder {
        fail: true,
        ..Recorder::default()
    };
    let mut qb = builder(&registry, "Author", Dialect::DuckDb);
    assert_eq!(
        qb.execute(&failing, None).await.unwrap_err(),
        ExecuteError::Connection(ConnectionError::Statement("syntax error".into()))
    );

    let conn = Recorder::default();
    let mut qb = builder(&registry, "Author", Dialect::Redshift);
    qb.insert(json!({"name": "Jon"})).unwrap();
    qb.on_conflict(&["name"]).unwrap().ignore().unwrap();
    assert!(matches!(
        qb.execute(&conn, None).await.unwrap_err(),
        ExecuteError::Query(QueryError::Unsupported { .. })
    ));
    assert!(conn.calls.lock().await.is_empty());
}
