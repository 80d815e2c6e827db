use std::time::{Duration, SystemTime, UNIX_EPOCH};

use asupersync::runtime::RuntimeBuilder;
use asupersync::{Cx, Outcome};

use respawn_core::{Connection, Error, QueryErrorKind, Value};
use respawn_sqlite::{SqliteConfig, SqliteConnection};

fn unwrap_outcome<T>(outcome: Outcome<T, Error>) -> T {
    match outcome {
        Outcome::Ok(v) => v,
        Outcome::Err(e) => panic!("unexpected error: {e}"),
        Outcome::Cancelled(r) => panic!("cancelled: {r:?}"),
        Outcome::Panicked(p) => panic!("panicked: {p:?}"),
    }
}

fn temp_db_path(prefix: &str) -> std::path::PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_else(|_| Duration::from_secs(0))
        .as_nanos();
    std::env::temp_dir().join(format!("{prefix}_{}_{nanos}.db", std::process::id()))
}

#[test]
fn sqlite_query_and_execute_through_trait() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();
    let conn = SqliteConnection::open_memory().expect("open sqlite");

    rt.block_on(async {
        unwrap_outcome(
            conn.execute(&cx, "CREATE TABLE t (id INTEGER PRIMARY KEY, name TEXT);")
                .await,
        );
        let changes = unwrap_outcome(
            conn.execute(&cx, "INSERT INTO t (name) VALUES ('a'), ('b');")
                .await,
        );
        assert_eq!(changes, 2);

        let rows = unwrap_outcome(conn.query(&cx, "SELECT id, name FROM t ORDER BY id").await);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].get_named("name"), Some(&Value::Text("b".into())));
    });
}

#[test]
fn sqlite_constraint_errors_surface_as_outcome_err() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();
    let conn = SqliteConnection::open_memory().expect("open sqlite");

    rt.block_on(async {
        unwrap_outcome(
            conn.execute(
                &cx,
                "CREATE TABLE p (id INTEGER PRIMARY KEY);\
                 CREATE TABLE c (id INTEGER PRIMARY KEY, p_id INTEGER REFERENCES p(id));\
                 INSERT INTO p VALUES (1);\
                 INSERT INTO c VALUES (1, 1);",
            )
            .await,
        );

        match conn.execute(&cx, "DELETE FROM p;").await {
            Outcome::Err(Error::Query(q)) => assert_eq!(q.kind, QueryErrorKind::Constraint),
            other => panic!("expected constraint error, got {other:?}"),
        }
    });
}

#[test]
fn sqlite_file_database_persists_between_connections() {
    let path = temp_db_path("respawn_sqlite_file");
    {
        let conn = SqliteConnection::open(&path).expect("open file db");
        conn.execute_sync("CREATE TABLE t (v INTEGER); INSERT INTO t VALUES (7);")
            .expect("seed");
    }
    {
        let conn = SqliteConnection::open_with(
            SqliteConfig::file(&path).busy_timeout(Duration::from_millis(100)),
        )
        .expect("reopen file db");
        let rows = conn.query_sync("SELECT v FROM t").expect("select");
        assert_eq!(rows[0].get(0), Some(&Value::BigInt(7)));
    }
    let _ = std::fs::remove_file(&path);
}

#[test]
fn sqlite_open_reports_connection_errors() {
    let path = std::env::temp_dir()
        .join("respawn_missing_dir_for_tests")
        .join("nested")
        .join("db.sqlite");
    let err = SqliteConnection::open(&path).unwrap_err();
    assert!(matches!(err, Error::Connection(_)));
}
