//! Catalog discovery.
//!
//! Runs the adapter's discovery queries on a caller-supplied connection and
//! decodes the rows into [`Table`], [`Relationship`], [`Identity`] and
//! [`TemporalTable`] values. Every decoded value is passed through
//! [`RespawnerOptions::admits`] as well, so a row the SQL filter let through
//! is still dropped when the in-memory filter rejects it. A relationship is
//! kept only when both of its ends are admitted.
//!
//! Failures are reported as `Error::Discovery` carrying the stage and the SQL
//! that was running.

use respawn_core::{
    Connection, Cx, DiscoveryStage, Error, Outcome, Relationship, RespawnerOptions, Result, Row,
    Table, TemporalTable, Value,
};
use serde::Serialize;

use crate::dialect::DialectAdapter;

/// An object whose counter is reset by reseeding: a table, and on engines
/// that keep counters in separate objects, the owned sequence.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Identity {
    pub table: Table,
    pub sequence: Option<Table>,
}

impl Identity {
    /// A table-level counter (AUTO_INCREMENT, IDENTITY, sqlite_sequence).
    pub fn table(table: Table) -> Self {
        Self {
            table,
            sequence: None,
        }
    }

    /// A sequence owned by a column of `table`.
    pub fn sequence(table: Table, sequence: Table) -> Self {
        Self {
            table,
            sequence: Some(sequence),
        }
    }
}

// ==================== Row decoding ====================

fn required_text(row: &Row, column: &str, stage: DiscoveryStage) -> Result<String> {
    match row.get_named(column) {
        Some(Value::Text(s)) if !s.is_empty() => Ok(s.clone()),
        Some(Value::Bytes(b)) => String::from_utf8(b.clone()).map_err(|_| {
            Error::malformed_row(stage, format!("column `{column}` is not valid UTF-8"))
        }),
        Some(Value::Null) => Err(Error::malformed_row(
            stage,
            format!("column `{column}` is NULL"),
        )),
        Some(Value::Text(_)) => Err(Error::malformed_row(
            stage,
            format!("column `{column}` is empty"),
        )),
        Some(other) => Err(Error::malformed_row(
            stage,
            format!("column `{column}` is not text: {other:?}"),
        )),
        None => Err(Error::malformed_row(
            stage,
            format!("missing column `{column}`"),
        )),
    }
}

fn optional_text(row: &Row, column: &str, stage: DiscoveryStage) -> Result<Option<String>> {
    match row.get_named(column) {
        None | Some(Value::Null) => Ok(None),
        Some(_) => required_text(row, column, stage).map(Some),
    }
}

fn decode_table(row: &Row, schema_col: &str, name_col: &str, stage: DiscoveryStage) -> Result<Table> {
    let name = required_text(row, name_col, stage)?;
    Ok(match optional_text(row, schema_col, stage)? {
        Some(schema) => Table::with_schema(schema, name),
        None => Table::new(name),
    })
}

/// Decode `table_schema`/`table_name` rows.
pub fn decode_tables(rows: &[Row]) -> Result<Vec<Table>> {
    rows.iter()
        .map(|row| decode_table(row, "table_schema", "table_name", DiscoveryStage::Tables))
        .collect()
}

/// Decode relationship rows. A NULL `constraint_name` becomes an empty name.
pub fn decode_relationships(rows: &[Row]) -> Result<Vec<Relationship>> {
    let stage = DiscoveryStage::Relationships;
    rows.iter()
        .map(|row| {
            Ok(Relationship::new(
                decode_table(row, "parent_schema", "parent_table", stage)?,
                decode_table(row, "referenced_schema", "referenced_table", stage)?,
                optional_text(row, "constraint_name", stage)?.unwrap_or_default(),
            ))
        })
        .collect()
}

/// Decode identity rows; `sequence_name` is optional.
pub fn decode_identities(rows: &[Row]) -> Result<Vec<Identity>> {
    let stage = DiscoveryStage::Identities;
    rows.iter()
        .map(|row| {
            let table = decode_table(row, "table_schema", "table_name", stage)?;
            Ok(match optional_text(row, "sequence_name", stage)? {
                Some(name) => {
                    let sequence = match optional_text(row, "sequence_schema", stage)? {
                        Some(schema) => Table::with_schema(schema, name),
                        None => Table::new(name),
                    };
                    Identity::sequence(table, sequence)
                }
                None => Identity::table(table),
            })
        })
        .collect()
}

/// Decode temporal table rows.
pub fn decode_temporal_tables(rows: &[Row]) -> Result<Vec<TemporalTable>> {
    let stage = DiscoveryStage::TemporalTables;
    rows.iter()
        .map(|row| {
            Ok(TemporalTable::new(
                decode_table(row, "table_schema", "table_name", stage)?,
                decode_table(row, "history_schema", "history_table", stage)?,
            ))
        })
        .collect()
}

/// Decode the single-value answer of a temporal support probe.
pub fn decode_temporal_support(rows: &[Row]) -> Result<bool> {
    rows.first()
        .and_then(|row| row.get(0))
        .map(Value::is_truthy)
        .ok_or_else(|| {
            Error::malformed_row(DiscoveryStage::TemporalSupport, "probe returned no rows")
        })
}

// ==================== Discovery ====================

/// Run one catalog query, wrapping failures as discovery errors for `stage`.
async fn catalog_query<C: Connection>(
    cx: &Cx,
    conn: &C,
    stage: DiscoveryStage,
    sql: &str,
) -> Outcome<Vec<Row>, Error> {
    if let Some(reason) = cx.cancel_reason() {
        return Outcome::Cancelled(reason);
    }
    tracing::trace!(stage = stage.as_str(), sql = %sql, "Running discovery query");
    match conn.query(cx, sql).await {
        Outcome::Ok(rows) => Outcome::Ok(rows),
        Outcome::Err(e) => Outcome::Err(Error::discovery_failed(stage, sql, e)),
        Outcome::Cancelled(r) => Outcome::Cancelled(r),
        Outcome::Panicked(p) => Outcome::Panicked(p),
    }
}

/// Query, decode and attach the SQL to any decoding error.
async fn discover<C, T>(
    cx: &Cx,
    conn: &C,
    stage: DiscoveryStage,
    sql: &str,
    decode: fn(&[Row]) -> Result<T>,
) -> Outcome<T, Error>
where
    C: Connection,
{
    let rows = match catalog_query(cx, conn, stage, sql).await {
        Outcome::Ok(rows) => rows,
        Outcome::Err(e) => return Outcome::Err(e),
        Outcome::Cancelled(r) => return Outcome::Cancelled(r),
        Outcome::Panicked(p) => return Outcome::Panicked(p),
    };
    match decode(&rows) {
        Ok(value) => Outcome::Ok(value),
        Err(e) => Outcome::Err(e.with_discovery_sql(sql)),
    }
}

/// Discover the tables the options admit.
#[tracing::instrument(level = "debug", skip(cx, conn, adapter, options), fields(dialect = adapter.dialect()))]
pub async fn discover_tables<C: Connection>(
    cx: &Cx,
    conn: &C,
    adapter: &dyn DialectAdapter,
    options: &RespawnerOptions,
) -> Outcome<Vec<Table>, Error> {
    let sql = adapter.build_table_command_text(options);
    let mut tables =
        match discover(cx, conn, DiscoveryStage::Tables, &sql, decode_tables).await {
            Outcome::Ok(tables) => tables,
            Outcome::Err(e) => return Outcome::Err(e),
            Outcome::Cancelled(r) => return Outcome::Cancelled(r),
            Outcome::Panicked(p) => return Outcome::Panicked(p),
        };
    tables.retain(|t| options.admits(t));
    tables.sort();
    tables.dedup();
    tracing::debug!(count = tables.len(), "Discovered tables");
    Outcome::Ok(tables)
}

/// Discover foreign keys whose two ends are both admitted.
#[tracing::instrument(level = "debug", skip(cx, conn, adapter, options), fields(dialect = adapter.dialect()))]
pub async fn discover_relationships<C: Connection>(
    cx: &Cx,
    conn: &C,
    adapter: &dyn DialectAdapter,
    options: &RespawnerOptions,
) -> Outcome<Vec<Relationship>, Error> {
    let sql = adapter.build_relationship_command_text(options);
    let mut relationships = match discover(
        cx,
        conn,
        DiscoveryStage::Relationships,
        &sql,
        decode_relationships,
    )
    .await
    {
        Outcome::Ok(relationships) => relationships,
        Outcome::Err(e) => return Outcome::Err(e),
        Outcome::Cancelled(r) => return Outcome::Cancelled(r),
        Outcome::Panicked(p) => return Outcome::Panicked(p),
    };
    relationships
        .retain(|r| options.admits(&r.parent_table) && options.admits(&r.referenced_table));
    tracing::debug!(count = relationships.len(), "Discovered relationships");
    Outcome::Ok(relationships)
}

/// Discover identity counters. Empty when the engine has no reseed concept.
#[tracing::instrument(level = "debug", skip(cx, conn, adapter, options), fields(dialect = adapter.dialect()))]
pub async fn discover_identities<C: Connection>(
    cx: &Cx,
    conn: &C,
    adapter: &dyn DialectAdapter,
    options: &RespawnerOptions,
) -> Outcome<Vec<Identity>, Error> {
    let Some(sql) = adapter.build_identity_command_text(options) else {
        return Outcome::Ok(Vec::new());
    };
    let mut identities =
        match discover(cx, conn, DiscoveryStage::Identities, &sql, decode_identities).await {
            Outcome::Ok(identities) => identities,
            Outcome::Err(e) => return Outcome::Err(e),
            Outcome::Cancelled(r) => return Outcome::Cancelled(r),
            Outcome::Panicked(p) => return Outcome::Panicked(p),
        };
    identities.retain(|i| options.admits(&i.table));
    tracing::debug!(count = identities.len(), "Discovered identities");
    Outcome::Ok(identities)
}

/// Ask the server whether it supports system-versioned tables.
///
/// Engines without the concept answer `false` without touching the connection.
pub async fn probe_temporal_support<C: Connection>(
    cx: &Cx,
    conn: &C,
    adapter: &dyn DialectAdapter,
) -> Outcome<bool, Error> {
    let Some(sql) = adapter.build_temporal_support_command_text() else {
        return Outcome::Ok(false);
    };
    discover(
        cx,
        conn,
        DiscoveryStage::TemporalSupport,
        &sql,
        decode_temporal_support,
    )
    .await
}

/// Discover system-versioned tables the options admit.
#[tracing::instrument(level = "debug", skip(cx, conn, adapter, options), fields(dialect = adapter.dialect()))]
pub async fn discover_temporal_tables<C: Connection>(
    cx: &Cx,
    conn: &C,
    adapter: &dyn DialectAdapter,
    options: &RespawnerOptions,
) -> Outcome<Vec<TemporalTable>, Error> {
    let sql = match adapter.build_temporal_table_command_text(options) {
        Ok(sql) => sql,
        Err(e) => return Outcome::Err(e),
    };
    let mut temporal = match discover(
        cx,
        conn,
        DiscoveryStage::TemporalTables,
        &sql,
        decode_temporal_tables,
    )
    .await
    {
        Outcome::Ok(temporal) => temporal,
        Outcome::Err(e) => return Outcome::Err(e),
        Outcome::Cancelled(r) => return Outcome::Cancelled(r),
        Outcome::Panicked(p) => return Outcome::Panicked(p),
    };
    temporal.retain(|t| options.admits(&t.table));
    tracing::debug!(count = temporal.len(), "Discovered temporal tables");
    Outcome::Ok(temporal)
}
