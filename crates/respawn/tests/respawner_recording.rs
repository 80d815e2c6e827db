//! Orchestration tests against a scripted connection that records every call.

#![allow(clippy::manual_async_fn)]

use std::future::Future;
use std::sync::Mutex;

use asupersync::runtime::RuntimeBuilder;
use asupersync::{CancelKind, Cx, Outcome};

use respawn::error::{DiscoveryErrorKind, DiscoveryStage, QueryError, QueryErrorKind};
use respawn::{Connection, DbAdapter, Error, Respawner, RespawnerOptions, Row, Table, Value};

/// Answers catalog queries from canned result sets (first matching pattern
/// wins) and records every statement it is asked to run.
#[derive(Default)]
struct RecordingConnection {
    responses: Vec<(&'static str, Vec<Row>)>,
    fail_query: Option<&'static str>,
    fail_execute: Option<&'static str>,
    cancel_after: Option<&'static str>,
    queries: Mutex<Vec<String>>,
    executed: Mutex<Vec<String>>,
}

impl RecordingConnection {
    fn respond(mut self, pattern: &'static str, rows: Vec<Row>) -> Self {
        self.responses.push((pattern, rows));
        self
    }

    fn fail_query(mut self, pattern: &'static str) -> Self {
        self.fail_query = Some(pattern);
        self
    }

    fn fail_execute(mut self, pattern: &'static str) -> Self {
        self.fail_execute = Some(pattern);
        self
    }

    /// Cancel the caller's context once a query matching `pattern` has run.
    fn cancel_after(mut self, pattern: &'static str) -> Self {
        self.cancel_after = Some(pattern);
        self
    }

    fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }

    fn executed(&self) -> Vec<String> {
        self.executed.lock().unwrap().clone()
    }

    fn failure(sql: &str) -> Error {
        Error::Query(QueryError {
            kind: QueryErrorKind::Permission,
            message: "permission denied".to_string(),
            sql: Some(sql.to_string()),
            source: None,
        })
    }
}

impl Connection for RecordingConnection {
    fn query(&self, cx: &Cx, sql: &str) -> impl Future<Output = Outcome<Vec<Row>, Error>> + Send {
        async move {
            self.queries.lock().unwrap().push(sql.to_string());
            if self.fail_query.is_some_and(|p| sql.contains(p)) {
                return Outcome::Err(Self::failure(sql));
            }
            if self.cancel_after.is_some_and(|p| sql.contains(p)) {
                cx.cancel_fast(CancelKind::User);
            }
            let rows = self
                .responses
                .iter()
                .find(|(pattern, _)| sql.contains(pattern))
                .map(|(_, rows)| rows.clone())
                .unwrap_or_default();
            Outcome::Ok(rows)
        }
    }

    fn execute(&self, _cx: &Cx, sql: &str) -> impl Future<Output = Outcome<u64, Error>> + Send {
        async move {
            self.executed.lock().unwrap().push(sql.to_string());
            if self.fail_execute.is_some_and(|p| sql.contains(p)) {
                return Outcome::Err(Self::failure(sql));
            }
            Outcome::Ok(0)
        }
    }
}

fn rows(columns: &[&str], data: &[&[&str]]) -> Vec<Row> {
    data.iter()
        .map(|values| {
            Row::new(
                columns.iter().map(|c| (*c).to_string()).collect(),
                values.iter().map(|v| Value::from(*v)).collect(),
            )
        })
        .collect()
}

fn tables(data: &[&[&str]]) -> Vec<Row> {
    rows(&["table_schema", "table_name"], data)
}

fn relationships(data: &[&[&str]]) -> Vec<Row> {
    rows(
        &[
            "parent_schema",
            "parent_table",
            "referenced_schema",
            "referenced_table",
            "constraint_name",
        ],
        data,
    )
}

fn unwrap_outcome<T>(outcome: Outcome<T, Error>) -> T {
    match outcome {
        Outcome::Ok(v) => v,
        Outcome::Err(e) => panic!("unexpected error: {e}"),
        Outcome::Cancelled(r) => panic!("cancelled: {r:?}"),
        Outcome::Panicked(p) => panic!("panicked: {p:?}"),
    }
}

fn expect_err<T: std::fmt::Debug>(outcome: Outcome<T, Error>) -> Error {
    match outcome {
        Outcome::Err(e) => e,
        other => panic!("expected error, got {other:?}"),
    }
}

fn block_on<F: Future>(f: impl FnOnce(Cx) -> F) -> F::Output {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();
    rt.block_on(f(cx))
}

/// A SQL Server catalog with one temporal table and one identity table.
fn sqlserver_catalog() -> RecordingConnection {
    RecordingConnection::default()
        .respond(
            "sys.foreign_keys",
            relationships(&[
                &["dbo", "Order", "dbo", "Customer", "FK_Order_Customer"],
                &["dbo", "Account", "dbo", "Customer", "FK_Account_Customer"],
            ]),
        )
        .respond(
            "sys.identity_columns",
            tables(&[&["dbo", "Order"], &["other", "NotInPlan"]]),
        )
        .respond("SERVERPROPERTY", rows(&["supports_temporal_tables"], &[&["1"]]))
        .respond(
            "temporal_type = 2",
            rows(
                &["table_schema", "table_name", "history_schema", "history_table"],
                &[&["dbo", "Account", "dbo", "AccountHistory"]],
            ),
        )
        .respond(
            "sys.tables",
            tables(&[
                &["dbo", "Account"],
                &["dbo", "AccountHistory"],
                &["dbo", "Customer"],
                &["dbo", "Order"],
            ]),
        )
}

fn sqlserver_options() -> RespawnerOptions {
    RespawnerOptions::builder()
        .db_adapter(DbAdapter::SqlServer)
        .with_reseed(true)
        .check_temporal_tables(true)
        .build()
        .unwrap()
}

const VERSIONING_OFF: &str = "ALTER TABLE [dbo].[Account] SET (SYSTEM_VERSIONING = OFF);\n";
const VERSIONING_ON: &str = "ALTER TABLE [dbo].[Account] SET (SYSTEM_VERSIONING = ON \
                             (HISTORY_TABLE = [dbo].[AccountHistory]));\n";

#[test]
fn create_renders_every_script_and_reset_runs_them_in_order() {
    let conn = sqlserver_catalog();
    let (respawner, conn) = block_on(|cx| async move {
        let respawner = unwrap_outcome(Respawner::create(&cx, &conn, sqlserver_options()).await);
        unwrap_outcome(respawner.reset(&cx, &conn).await);
        (respawner, conn)
    });

    assert_eq!(
        respawner.delete_sql(),
        "DELETE FROM [dbo].[Account];\n\
         DELETE FROM [dbo].[AccountHistory];\n\
         DELETE FROM [dbo].[Order];\n\
         DELETE FROM [dbo].[Customer];\n"
    );
    assert_eq!(
        respawner.reseed_sql(),
        Some("DBCC CHECKIDENT ('[dbo].[Order]', RESEED, 0);\n")
    );
    assert_eq!(respawner.temporal_tables().len(), 1);
    assert_eq!(respawner.tables_to_delete().len(), 4);

    let executed = conn.executed();
    assert_eq!(
        executed,
        vec![
            VERSIONING_OFF.to_string(),
            respawner.delete_sql().to_string(),
            respawner.reseed_sql().unwrap().to_string(),
            VERSIONING_ON.to_string(),
        ]
    );

    // tables, relationships, identities, probe, temporal tables
    let queries = conn.queries();
    assert_eq!(queries.len(), 5);
    assert!(queries[0].contains("FROM sys.tables AS t"));
    assert!(queries[1].contains("sys.foreign_keys"));
    assert!(queries[2].contains("sys.identity_columns"));
    assert!(queries[3].contains("SERVERPROPERTY"));
    assert!(queries[4].contains("temporal_type = 2"));
}

#[test]
fn reset_is_repeatable_without_new_discovery() {
    let conn = sqlserver_catalog();
    let (queries_after_create, executed) = block_on(|cx| async move {
        let respawner = unwrap_outcome(Respawner::create(&cx, &conn, sqlserver_options()).await);
        let queries_after_create = conn.queries().len();
        unwrap_outcome(respawner.reset(&cx, &conn).await);
        unwrap_outcome(respawner.reset(&cx, &conn).await);
        assert_eq!(conn.queries().len(), queries_after_create);
        (queries_after_create, conn.executed())
    });
    assert_eq!(queries_after_create, 5);
    assert_eq!(executed.len(), 8);
    assert_eq!(executed[0..4], executed[4..8]);
}

#[test]
fn failed_delete_still_restores_system_versioning() {
    let conn = sqlserver_catalog().fail_execute("DELETE FROM");
    let (err, executed) = block_on(|cx| async move {
        let respawner = unwrap_outcome(Respawner::create(&cx, &conn, sqlserver_options()).await);
        let err = expect_err(respawner.reset(&cx, &conn).await);
        (err, conn.executed())
    });

    let Error::Query(q) = err else {
        panic!("expected the delete failure, got {err:?}");
    };
    assert!(q.sql.unwrap().contains("DELETE FROM [dbo].[Account]"));
    // off, delete (failed), on; no reseed after a failed delete
    assert_eq!(executed.len(), 3);
    assert_eq!(executed[0], VERSIONING_OFF);
    assert_eq!(executed[2], VERSIONING_ON);
}

#[test]
fn temporal_tables_skipped_when_server_lacks_support() {
    let conn = RecordingConnection::default()
        .respond("sys.foreign_keys", Vec::new())
        .respond("sys.identity_columns", Vec::new())
        .respond("SERVERPROPERTY", rows(&["supports_temporal_tables"], &[&["0"]]))
        .respond("sys.tables", tables(&[&["dbo", "Foo"]]));
    let (respawner, queries) = block_on(|cx| async move {
        let respawner = unwrap_outcome(Respawner::create(&cx, &conn, sqlserver_options()).await);
        (respawner, conn.queries())
    });
    assert!(respawner.temporal_tables().is_empty());
    assert!(respawner.reseed_sql().is_none());
    assert!(!queries.iter().any(|q| q.contains("temporal_type = 2")));
}

#[test]
fn temporal_check_is_a_no_op_on_engines_without_it() {
    let conn = RecordingConnection::default()
        .respond("pg_constraint", Vec::new())
        .respond("pg_class", tables(&[&["public", "foo"]]));
    let options = RespawnerOptions::builder()
        .db_adapter(DbAdapter::Postgres)
        .check_temporal_tables(true)
        .build()
        .unwrap();
    let queries = block_on(|cx| async move {
        let respawner = unwrap_outcome(Respawner::create(&cx, &conn, options).await);
        assert!(respawner.temporal_tables().is_empty());
        conn.queries()
    });
    assert_eq!(queries.len(), 2);
}

#[test]
fn relationship_discovery_failure_aborts_creation() {
    let conn = sqlserver_catalog().fail_query("sys.foreign_keys");
    let (err, executed) = block_on(|cx| async move {
        let err = expect_err(Respawner::create(&cx, &conn, sqlserver_options()).await);
        (err, conn.executed())
    });

    let Error::Discovery(d) = err else {
        panic!("expected discovery error, got {err:?}");
    };
    assert_eq!(d.stage, DiscoveryStage::Relationships);
    assert_eq!(d.kind, DiscoveryErrorKind::QueryFailed);
    assert!(d.sql.unwrap().contains("sys.foreign_keys"));
    assert!(matches!(d.source.as_deref(), Some(Error::Query(_))));
    assert!(executed.is_empty());
}

#[test]
fn empty_discovery_is_an_error() {
    let conn = RecordingConnection::default();
    let options = RespawnerOptions::for_adapter(DbAdapter::MySql);
    let err = block_on(|cx| async move { expect_err(Respawner::create(&cx, &conn, options).await) });
    let Error::Discovery(d) = err else {
        panic!("expected discovery error, got {err:?}");
    };
    assert_eq!(d.kind, DiscoveryErrorKind::NoTables);
    assert!(d.message.contains("No tables found"));
}

#[test]
fn malformed_rows_are_discovery_errors_with_sql() {
    let conn = RecordingConnection::default().respond(
        "information_schema.TABLES",
        rows(&["schema", "name"], &[&["app", "users"]]),
    );
    let options = RespawnerOptions::for_adapter(DbAdapter::MySql);
    let err = block_on(|cx| async move { expect_err(Respawner::create(&cx, &conn, options).await) });
    let Error::Discovery(d) = err else {
        panic!("expected discovery error, got {err:?}");
    };
    assert_eq!(d.kind, DiscoveryErrorKind::MalformedRow);
    assert!(d.sql.unwrap().contains("information_schema.TABLES"));
}

#[test]
fn filters_are_reapplied_to_discovered_rows() {
    // The scripted catalog ignores the SQL predicates; the in-memory filter must still hold.
    let conn = RecordingConnection::default()
        .respond(
            "pg_constraint",
            relationships(&[
                &["public", "orders", "public", "customers", "orders_customer_fk"],
                &["public", "orders", "public", "orders", "orders_parent_fk"],
            ]),
        )
        .respond(
            "pg_class",
            tables(&[
                &["public", "customers"],
                &["public", "orders"],
                &["audit", "log"],
            ]),
        );
    let options = RespawnerOptions::builder()
        .db_adapter(DbAdapter::Postgres)
        .tables_to_ignore(["Customers"])
        .schemas_to_exclude(["audit"])
        .build()
        .unwrap();

    let respawner = block_on(|cx| async move {
        unwrap_outcome(Respawner::create(&cx, &conn, options).await)
    });

    assert_eq!(
        respawner.tables_to_delete(),
        &[Table::with_schema("public", "orders")]
    );
    assert_eq!(
        respawner.delete_sql(),
        "ALTER TABLE \"public\".\"orders\" DISABLE TRIGGER ALL;\n\
         DELETE FROM \"public\".\"orders\";\n\
         ALTER TABLE \"public\".\"orders\" ENABLE TRIGGER ALL;\n"
    );
}

#[test]
fn report_json_describes_the_checkpoint() {
    let conn = RecordingConnection::default()
        .respond(
            "pg_constraint",
            relationships(&[
                &["public", "parent", "public", "child", "parent_child_fk"],
                &["public", "child", "public", "parent", "child_parent_fk"],
            ]),
        )
        .respond("pg_class", tables(&[&["public", "parent"], &["public", "child"]]));
    let respawner = block_on(|cx| async move {
        unwrap_outcome(
            Respawner::create(&cx, &conn, RespawnerOptions::for_adapter(DbAdapter::Postgres))
                .await,
        )
    });

    assert!(respawner.plan().has_cycles());
    let json: serde_json::Value = serde_json::from_str(&respawner.report_json().unwrap()).unwrap();
    assert_eq!(json["dialect"], "postgres");
    assert_eq!(json["relationships"], 2);
    assert_eq!(json["plan"]["cyclic_group"].as_array().unwrap().len(), 2);
    assert!(json["delete_sql"].as_str().unwrap().contains("DISABLE TRIGGER ALL"));
}

fn cyclic_postgres_catalog() -> RecordingConnection {
    RecordingConnection::default()
        .respond(
            "pg_constraint",
            relationships(&[
                &["public", "parent", "public", "child", "parent_child_fk"],
                &["public", "child", "public", "parent", "child_parent_fk"],
            ]),
        )
        .respond("pg_class", tables(&[&["public", "parent"], &["public", "child"]]))
}

#[test]
fn failed_delete_restores_suspended_constraints() {
    let conn = cyclic_postgres_catalog().fail_execute("DELETE FROM");
    let (respawner, err, executed) = block_on(|cx| async move {
        let respawner = unwrap_outcome(
            Respawner::create(&cx, &conn, RespawnerOptions::for_adapter(DbAdapter::Postgres))
                .await,
        );
        let err = expect_err(respawner.reset(&cx, &conn).await);
        (respawner, err, conn.executed())
    });

    let Error::Query(q) = err else {
        panic!("expected the delete failure, got {err:?}");
    };
    assert!(q.sql.unwrap().contains("DISABLE TRIGGER ALL"));
    assert_eq!(
        respawner.restore_sql(),
        Some(
            "ALTER TABLE \"public\".\"child\" ENABLE TRIGGER ALL;\n\
             ALTER TABLE \"public\".\"parent\" ENABLE TRIGGER ALL;\n"
        )
    );
    assert_eq!(
        executed,
        vec![
            respawner.delete_sql().to_string(),
            respawner.restore_sql().unwrap().to_string(),
        ]
    );
}

#[test]
fn acyclic_failed_delete_has_nothing_to_restore() {
    let conn = sqlserver_catalog().fail_execute("DELETE FROM");
    let options = RespawnerOptions::for_adapter(DbAdapter::SqlServer);
    let (restore_sql, executed) = block_on(|cx| async move {
        let respawner = unwrap_outcome(Respawner::create(&cx, &conn, options).await);
        expect_err(respawner.reset(&cx, &conn).await);
        (respawner.restore_sql().map(str::to_string), conn.executed())
    });
    assert!(restore_sql.is_none());
    assert_eq!(executed.len(), 1);
}

#[test]
fn cancelled_context_aborts_creation_before_any_query() {
    let conn = cyclic_postgres_catalog();
    let (outcome, queries) = block_on(|cx| async move {
        cx.cancel_fast(CancelKind::User);
        let outcome =
            Respawner::create(&cx, &conn, RespawnerOptions::for_adapter(DbAdapter::Postgres))
                .await;
        (outcome, conn.queries())
    });
    assert!(
        matches!(outcome, Outcome::Cancelled(_)),
        "expected cancellation, got {outcome:?}"
    );
    assert!(queries.is_empty());
}

#[test]
fn cancellation_between_discovery_queries_stops_creation() {
    let conn = cyclic_postgres_catalog().cancel_after("pg_class");
    let (outcome, queries, executed) = block_on(|cx| async move {
        let outcome =
            Respawner::create(&cx, &conn, RespawnerOptions::for_adapter(DbAdapter::Postgres))
                .await;
        (outcome, conn.queries(), conn.executed())
    });
    assert!(
        matches!(outcome, Outcome::Cancelled(_)),
        "expected cancellation, got {outcome:?}"
    );
    // the table query ran; the relationship query never did
    assert_eq!(queries.len(), 1);
    assert!(!queries[0].contains("pg_constraint"));
    assert!(executed.is_empty());
}
