// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Key Store Schema
//!
//! The schema version lives in SQLite's `user_version` header field. Pending
//! steps and the version bump run in one exclusive transaction, so a database
//! is always at exactly one of the versions listed in [`SCHEMA`].

use rusqlite::{Connection, TransactionBehavior};

use super::StorageError;

/// One schema step. Versions start at 1 and increase by one.
pub struct Migration {
    pub version: u32,
    pub name: &'static str,
    pub sql: &'static str,
}

/// The key store schema, oldest step first.
pub const SCHEMA: &[Migration] = &[
    Migration {
        version: 1,
        name: "key_material_and_sessions",
        sql: "CREATE TABLE local_identity (
                id INTEGER PRIMARY KEY CHECK (id = 0),
                seed_encrypted BLOB NOT NULL,
                created_at INTEGER NOT NULL
            );
            CREATE TABLE sessions (
                name TEXT NOT NULL,
                device_id INTEGER NOT NULL,
                state_encrypted BLOB NOT NULL,
                updated_at INTEGER NOT NULL,
                PRIMARY KEY (name, device_id)
            );
            CREATE TABLE pre_keys (
                id INTEGER PRIMARY KEY,
                record_encrypted BLOB NOT NULL
            );
            CREATE TABLE signed_pre_keys (
                id INTEGER PRIMARY KEY,
                record_encrypted BLOB NOT NULL,
                created_at INTEGER NOT NULL
            );",
    },
    Migration {
        version: 2,
        name: "remote_identities",
        sql: "CREATE TABLE remote_identities (
                name TEXT NOT NULL,
                device_id INTEGER NOT NULL,
                identity_key BLOB NOT NULL,
                first_seen INTEGER NOT NULL,
                PRIMARY KEY (name, device_id)
            );",
    },
];

/// Version stored in the database header; 0 for a fresh file.
pub fn schema_version(conn: &Connection) -> Result<u32, StorageError> {
    Ok(conn.pragma_query_value(None, "user_version", |row| row.get(0))?)
}

/// Brings `conn` up to the last step of `steps`. Returns the resulting
/// version.
pub fn migrate(conn: &mut Connection, steps: &[Migration]) -> Result<u32, StorageError> {
    let from = schema_version(conn)?;
    let target = steps.last().map_or(0, |m| m.version);
    if from > target {
        return Err(StorageError::Migration(format!(
            "database is at schema v{from}, this build only knows v{target}"
        )));
    }

    let tx = conn.transaction_with_behavior(TransactionBehavior::Exclusive)?;
    let mut version = from;
    for step in steps.iter().filter(|m| m.version > from) {
        if step.version != version + 1 {
            return Err(StorageError::Migration(format!(
                "schema step v{} follows v{version}",
                step.version
            )));
        }
        tx.execute_batch(step.sql).map_err(|e| {
            StorageError::Migration(format!("v{} '{}': {e}", step.version, step.name))
        })?;
        version = step.version;
    }
    tx.pragma_update(None, "user_version", version)?;
    tx.commit()?;

    if version != from {
        tracing::debug!(from, to = version, "key store schema migrated");
    }
    Ok(version)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrate_twice_is_a_no_op() {
        let mut conn = Connection::open_in_memory().unwrap();

        assert_eq!(migrate(&mut conn, SCHEMA).unwrap(), 2);
        assert_eq!(migrate(&mut conn, SCHEMA).unwrap(), 2);
        assert_eq!(schema_version(&conn).unwrap(), 2);
    }

    #[test]
    fn test_failed_step_leaves_database_untouched() {
        let mut conn = Connection::open_in_memory().unwrap();
        let steps = [
            Migration {
                version: 1,
                name: "ok",
                sql: "CREATE TABLE a (x INTEGER);",
            },
            Migration {
                version: 2,
                name: "broken",
                sql: "CREATE TABLE oops (",
            },
        ];

        let result = migrate(&mut conn, &steps);

        assert!(matches!(result, Err(StorageError::Migration(_))));
        assert_eq!(schema_version(&conn).unwrap(), 0);
        let tables: u32 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE name = 'a'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(tables, 0);
    }

    #[test]
    fn test_gap_in_steps_rejected() {
        let mut conn = Connection::open_in_memory().unwrap();
        let steps = [Migration {
            version: 2,
            name: "skips_one",
            sql: "CREATE TABLE a (x INTEGER);",
        }];

        assert!(matches!(
            migrate(&mut conn, &steps),
            Err(StorageError::Migration(_))
        ));
    }

    #[test]
    fn test_newer_database_rejected() {
        let mut conn = Connection::open_in_memory().unwrap();
        conn.pragma_update(None, "user_version", 9).unwrap();

        assert!(matches!(
            migrate(&mut conn, SCHEMA),
            Err(StorageError::Migration(_))
        ));
    }
}
