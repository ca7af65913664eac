// ABOUTME: Database management for multi-tenant credential and entity storage
// ABOUTME: Owns the SQLite pool, the token encryption key, and schema migrations
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Tether Labs

//! # Database Management
//!
//! SQLite persistence for the integration framework. Tokens are encrypted
//! before they reach a row and decrypted on read; the rest of each record is
//! stored as plain columns plus JSON maps for vendor-specific fields.

mod credentials;
mod entities;

use crate::errors::{AppError, AppResult};
use crate::models::JsonMap;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Pool, Sqlite, SqlitePool};

/// Database manager for credential and entity storage
#[derive(Clone)]
pub struct Database {
    pool: Pool<Sqlite>,
    encryption_key: Vec<u8>,
}

impl Database {
    /// Create a new database connection and run migrations
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established or a
    /// migration fails.
    pub async fn new(database_url: &str, encryption_key: Vec<u8>) -> AppResult<Self> {
        // Ensure SQLite creates the database file if it doesn't exist
        let connection_options = if database_url.starts_with("sqlite:") {
            format!("{database_url}?mode=rwc")
        } else {
            database_url.to_owned()
        };

        // An in-memory SQLite database exists per connection; pin the pool to one
        let pool = if database_url.contains(":memory:") {
            SqlitePoolOptions::new()
                .max_connections(1)
                .connect(database_url)
                .await?
        } else {
            SqlitePool::connect(&connection_options).await?
        };

        let db = Self {
            pool,
            encryption_key,
        };

        db.migrate().await?;

        Ok(db)
    }

    /// Get a reference to the database pool for advanced operations
    #[must_use]
    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    /// Token encryption key for this database
    pub(crate) fn encryption_key(&self) -> &[u8] {
        &self.encryption_key
    }

    /// Run database migrations
    ///
    /// # Errors
    ///
    /// Returns an error if table or index creation fails.
    pub async fn migrate(&self) -> AppResult<()> {
        self.migrate_credentials().await?;
        self.migrate_entities().await?;
        Ok(())
    }
}

/// Serialize a JSON map for storage in a TEXT column
pub(crate) fn json_map_to_column(map: &JsonMap) -> AppResult<String> {
    Ok(serde_json::to_string(&serde_json::Value::Object(
        map.clone(),
    ))?)
}

/// Parse a TEXT column back into a JSON map
pub(crate) fn json_map_from_column(raw: &str) -> AppResult<JsonMap> {
    let value: serde_json::Value = serde_json::from_str(raw)?;
    Ok(value.as_object().cloned().unwrap_or_default())
}

/// Build `AND`-joined predicates matching every field of an identifier map
///
/// Each key becomes `json_extract(identifiers, '$."key"') IS
/// json_extract(?, '$."key"')`; the caller binds the serialized identifier
/// map once per key. Keys are interpolated into the SQL, so they are
/// restricted to identifier-safe characters.
pub(crate) fn identifier_predicates(identifiers: &JsonMap) -> AppResult<String> {
    let mut clauses = String::new();
    for key in identifiers.keys() {
        if key.is_empty()
            || !key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            return Err(AppError::invalid_input(format!(
                "Identifier key '{key}' contains unsupported characters"
            )));
        }
        clauses.push_str(&format!(
            " AND json_extract(identifiers, '$.\"{key}\"') IS json_extract(?, '$.\"{key}\"')"
        ));
    }
    Ok(clauses)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn identifier_predicates_reject_hostile_keys() {
        let mut map = JsonMap::new();
        map.insert("ok_key1".into(), "v".into());
        assert!(identifier_predicates(&map).is_ok());

        let mut map = JsonMap::new();
        map.insert("bad') OR 1=1 --".into(), "v".into());
        assert!(identifier_predicates(&map).is_err());
    }

    #[test]
    fn json_map_column_round_trips() {
        let mut map = JsonMap::new();
        map.insert("external_id".into(), "org-1".into());
        map.insert("count".into(), 3.into());
        let raw = json_map_to_column(&map).unwrap();
        assert_eq!(json_map_from_column(&raw).unwrap(), map);
    }
}
