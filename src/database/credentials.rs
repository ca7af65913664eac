// ABOUTME: Credential database operations with token encryption at rest
// ABOUTME: Handles storage, retrieval, identifier matching, and validity flagging
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Tether Labs

use super::{identifier_predicates, json_map_from_column, json_map_to_column, Database};
use crate::errors::AppResult;
use crate::models::{Credential, EncryptedToken, JsonMap};
use chrono::Utc;
use sqlx::Row;
use uuid::Uuid;

impl Database {
    /// Create the `credentials` table
    ///
    /// # Errors
    ///
    /// Returns an error if table or index creation fails.
    pub(super) async fn migrate_credentials(&self) -> AppResult<()> {
        // No UNIQUE constraint on the identifier set: duplicate detection is
        // the manager's 0/1/>1 rule, and a concurrent create can still race
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS credentials (
                id TEXT PRIMARY KEY,
                user_id TEXT,
                module TEXT NOT NULL,
                access_token TEXT NOT NULL,
                refresh_token TEXT,
                expires_at DATETIME,
                auth_is_valid BOOLEAN NOT NULL DEFAULT TRUE,
                identifiers TEXT NOT NULL DEFAULT '{}',
                details TEXT NOT NULL DEFAULT '{}',
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
            )
            ",
        )
        .execute(self.pool())
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_credentials_user ON credentials(user_id)",
        )
        .execute(self.pool())
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_credentials_module ON credentials(module)",
        )
        .execute(self.pool())
        .await?;

        Ok(())
    }

    /// Upsert a credential by record id
    ///
    /// Tokens are encrypted before storage. The upsert key is the record id:
    /// the manager resolves identifier matches to an existing id first, and a
    /// zero-match insert arrives here with a fresh id.
    ///
    /// # Errors
    ///
    /// Returns an error if encryption or the database operation fails.
    pub async fn upsert_credential(&self, credential: &Credential) -> AppResult<()> {
        let encrypted = EncryptedToken::new(
            &credential.access_token,
            credential.refresh_token.as_deref(),
            self.encryption_key(),
        )?;

        sqlx::query(
            r"
            INSERT INTO credentials (
                id, user_id, module, access_token, refresh_token,
                expires_at, auth_is_valid, identifiers, details,
                created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (id)
            DO UPDATE SET
                user_id = EXCLUDED.user_id,
                access_token = EXCLUDED.access_token,
                refresh_token = EXCLUDED.refresh_token,
                expires_at = EXCLUDED.expires_at,
                auth_is_valid = EXCLUDED.auth_is_valid,
                identifiers = EXCLUDED.identifiers,
                details = EXCLUDED.details,
                updated_at = EXCLUDED.updated_at
            ",
        )
        .bind(credential.id.to_string())
        .bind(credential.user_id.map(|id| id.to_string()))
        .bind(&credential.module)
        .bind(&encrypted.access_token)
        .bind(&encrypted.refresh_token)
        .bind(credential.expires_at)
        .bind(credential.auth_is_valid)
        .bind(json_map_to_column(&credential.identifiers)?)
        .bind(json_map_to_column(&credential.details)?)
        .bind(credential.created_at)
        .bind(Utc::now())
        .execute(self.pool())
        .await?;

        Ok(())
    }

    /// Get a credential by id, decrypting its tokens
    ///
    /// # Errors
    ///
    /// Returns an error if the query or decryption fails.
    pub async fn get_credential(&self, id: Uuid) -> AppResult<Option<Credential>> {
        let row = sqlx::query(
            r"
            SELECT id, user_id, module, access_token, refresh_token,
                   expires_at, auth_is_valid, identifiers, details,
                   created_at, updated_at
            FROM credentials
            WHERE id = $1
            ",
        )
        .bind(id.to_string())
        .fetch_optional(self.pool())
        .await?;

        row.map(|row| self.row_to_credential(&row)).transpose()
    }

    /// Find credentials whose identifier map contains every given field
    ///
    /// # Errors
    ///
    /// Returns an error if an identifier key is malformed or the query fails.
    pub async fn find_credentials_by_identifiers(
        &self,
        module: &str,
        identifiers: &JsonMap,
    ) -> AppResult<Vec<Credential>> {
        let predicates = identifier_predicates(identifiers)?;
        let sql = format!(
            r"
            SELECT id, user_id, module, access_token, refresh_token,
                   expires_at, auth_is_valid, identifiers, details,
                   created_at, updated_at
            FROM credentials
            WHERE module = ?{predicates}
            ORDER BY created_at
            "
        );
        let needle = json_map_to_column(identifiers)?;

        let mut query = sqlx::query(&sql).bind(module);
        for _ in identifiers.keys() {
            query = query.bind(&needle);
        }
        let rows = query.fetch_all(self.pool()).await?;

        rows.iter().map(|row| self.row_to_credential(row)).collect()
    }

    /// Set the `auth_is_valid` flag on a credential
    ///
    /// # Errors
    ///
    /// Returns an error if the database update fails.
    pub async fn set_credential_validity(
        &self,
        id: Uuid,
        auth_is_valid: bool,
    ) -> AppResult<()> {
        sqlx::query(
            r"
            UPDATE credentials
            SET auth_is_valid = $2, updated_at = $3
            WHERE id = $1
            ",
        )
        .bind(id.to_string())
        .bind(auth_is_valid)
        .bind(Utc::now())
        .execute(self.pool())
        .await?;

        Ok(())
    }

    /// Convert a database row to a [`Credential`], decrypting tokens
    fn row_to_credential(&self, row: &sqlx::sqlite::SqliteRow) -> AppResult<Credential> {
        let encrypted = EncryptedToken {
            access_token: row.get("access_token"),
            refresh_token: row.get("refresh_token"),
        };
        let decrypted = encrypted.decrypt(self.encryption_key())?;

        let user_id: Option<String> = row.get("user_id");
        let identifiers: String = row.get("identifiers");
        let details: String = row.get("details");

        Ok(Credential {
            id: Uuid::parse_str(&row.get::<String, _>("id"))?,
            user_id: user_id.as_deref().map(Uuid::parse_str).transpose()?,
            module: row.get("module"),
            access_token: decrypted.access_token,
            refresh_token: decrypted.refresh_token,
            expires_at: row.get("expires_at"),
            auth_is_valid: row.get("auth_is_valid"),
            identifiers: json_map_from_column(&identifiers)?,
            details: json_map_from_column(&details)?,
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        })
    }
}
