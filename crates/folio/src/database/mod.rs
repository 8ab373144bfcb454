/*
 *  Copyright 2025-2026 Colliery Software
 *
 *  Licensed under the Apache License, Version 2.0 (the "License");
 *  you may not use this file except in compliance with the License.
 *  You may obtain a copy of the License at
 *
 *      http://www.apache.org/licenses/LICENSE-2.0
 *
 *  Unless required by applicable law or agreed to in writing, software
 *  distributed under the License is distributed on an "AS IS" BASIS,
 *  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 *  See the License for the specific language governing permissions and
 *  limitations under the License.
 */

//! Database layer: connection pooling, schema definitions and migrations.

pub mod connection;
pub mod schema;
pub mod universal_types;

pub use connection::{AnyPool, BackendType, Database};
pub use universal_types::{UniversalTimestamp, UniversalUuid};

use diesel::prelude::*;
use diesel::{PgConnection, SqliteConnection};
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};

use crate::error::DatabaseError;

pub const POSTGRES_MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations/postgres");
pub const SQLITE_MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations/sqlite");

/// Applies pending PostgreSQL migrations on an open connection.
pub fn run_migrations_postgres(conn: &mut PgConnection) -> Result<(), DatabaseError> {
    conn.run_pending_migrations(POSTGRES_MIGRATIONS)
        .map_err(|e| DatabaseError::Migration(e.to_string()))?;
    Ok(())
}

/// Applies pending SQLite migrations on an open connection.
///
/// WAL mode and a busy timeout are set first so readers keep working while
/// a claim transaction holds the write lock.
pub fn run_migrations_sqlite(conn: &mut SqliteConnection) -> Result<(), DatabaseError> {
    diesel::sql_query("PRAGMA journal_mode=WAL;")
        .execute(conn)
        .map_err(|e| DatabaseError::Migration(format!("Failed to set WAL mode: {}", e)))?;
    diesel::sql_query("PRAGMA busy_timeout=30000;")
        .execute(conn)
        .map_err(|e| DatabaseError::Migration(format!("Failed to set busy_timeout: {}", e)))?;

    conn.run_pending_migrations(SQLITE_MIGRATIONS)
        .map_err(|e| DatabaseError::Migration(e.to_string()))?;
    Ok(())
}
