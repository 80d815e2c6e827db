//! SQLite connection configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

/// Where the database lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqliteLocation {
    /// A private in-memory database, gone when the connection closes.
    Memory,
    /// A database file, created if missing.
    File(PathBuf),
}

/// Connection parameters for [`SqliteConnection`](crate::SqliteConnection).
#[derive(Debug, Clone)]
pub struct SqliteConfig {
    pub location: SqliteLocation,

    /// Run `PRAGMA foreign_keys = ON` after opening. SQLite leaves foreign key
    /// enforcement off unless asked, so this defaults to `true`.
    pub foreign_keys: bool,

    /// How long a statement waits on a locked database before failing.
    pub busy_timeout: Duration,
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            location: SqliteLocation::Memory,
            foreign_keys: true,
            busy_timeout: Duration::from_secs(5),
        }
    }
}

impl SqliteConfig {
    /// Configuration for a private in-memory database.
    pub fn memory() -> Self {
        Self::default()
    }

    /// Configuration for a database file.
    pub fn file(path: impl AsRef<Path>) -> Self {
        Self {
            location: SqliteLocation::File(path.as_ref().to_path_buf()),
            ..Self::default()
        }
    }

    /// Enable or disable foreign key enforcement on open.
    pub fn foreign_keys(mut self, enabled: bool) -> Self {
        self.foreign_keys = enabled;
        self
    }

    /// Set the busy timeout.
    pub fn busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    /// A short description for logs.
    pub fn describe(&self) -> String {
        match &self.location {
            SqliteLocation::Memory => ":memory:".to_string(),
            SqliteLocation::File(path) => path.display().to_string(),
        }
    }
}
