//! The driver contract.
//!
//! Respawn never owns, opens or pools connections. Callers hand a `Connection`
//! to each discovery or reset call and keep full control of its lifetime. The
//! planner needs exactly two capabilities: run a catalog query and get rows
//! back, and run a self-contained script whose result is not interesting.
//!
//! Implementations must not interleave the two calls of one caller with other
//! users of the same connection; serializing access is the caller's job.

// Allow `impl Future` return types in trait methods - intentional for async trait compat
#![allow(clippy::manual_async_fn)]

use std::future::Future;

use asupersync::{Cx, Outcome};

use crate::error::Error;
use crate::row::Row;

/// A live database connection as seen by the planner.
pub trait Connection: Send + Sync {
    /// Run a query that returns rows (catalog discovery).
    ///
    /// The SQL text is fully self-contained; no parameters are bound.
    fn query(&self, cx: &Cx, sql: &str) -> impl Future<Output = Outcome<Vec<Row>, Error>> + Send;

    /// Run a script of one or more `;`-terminated statements.
    ///
    /// Returns the number of affected rows when the driver can report it.
    fn execute(&self, cx: &Cx, sql: &str) -> impl Future<Output = Outcome<u64, Error>> + Send;
}
