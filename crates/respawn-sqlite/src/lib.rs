//! SQLite driver for Respawn Rust.
//!
//! `respawn-sqlite` implements [`respawn_core::Connection`] on top of
//! [rusqlite](https://docs.rs/rusqlite) with a bundled SQLite, so checkpoints
//! can be created and reset against file or in-memory databases without a
//! system library.
//!
//! ```ignore
//! let conn = SqliteConnection::open("test.db")?;
//! let respawner = Respawner::create(&cx, &conn, options).await;
//! ```

pub mod config;
pub mod connection;

pub use config::{SqliteConfig, SqliteLocation};
pub use connection::SqliteConnection;
