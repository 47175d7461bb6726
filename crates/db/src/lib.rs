//! SQLite persistence for poapbot: connection pool, migrations, and the
//! rule / reaction-ledger / delivery-log repositories.
//!
//! Repository traits live in [`repositories`] alongside their SQL
//! implementations; in-memory counterparts back the engine tests.

pub mod connection;
pub mod migrations;
pub mod repositories;

pub use connection::{connect, connect_with_settings, DbPool};
