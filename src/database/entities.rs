// ABOUTME: Entity database operations for externally-linked accounts
// ABOUTME: Handles storage, identifier matching, per-user listing, and credential detachment
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Tether Labs

use super::{identifier_predicates, json_map_from_column, json_map_to_column, Database};
use crate::errors::AppResult;
use crate::models::{Entity, JsonMap};
use chrono::Utc;
use sqlx::Row;
use uuid::Uuid;

impl Database {
    /// Create the `entities` table
    ///
    /// # Errors
    ///
    /// Returns an error if table or index creation fails.
    pub(super) async fn migrate_entities(&self) -> AppResult<()> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS entities (
                id TEXT PRIMARY KEY,
                user_id TEXT,
                module TEXT NOT NULL,
                credential_id TEXT REFERENCES credentials(id),
                external_id TEXT,
                name TEXT,
                identifiers TEXT NOT NULL DEFAULT '{}',
                details TEXT NOT NULL DEFAULT '{}',
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
            )
            ",
        )
        .execute(self.pool())
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_entities_user ON entities(user_id)")
            .execute(self.pool())
            .await?;

        // Deliberately not UNIQUE: the >1-match rule detects duplicates
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_entities_module_external ON entities(module, external_id)",
        )
        .execute(self.pool())
        .await?;

        Ok(())
    }

    /// Upsert an entity by record id
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub async fn upsert_entity(&self, entity: &Entity) -> AppResult<()> {
        sqlx::query(
            r"
            INSERT INTO entities (
                id, user_id, module, credential_id, external_id, name,
                identifiers, details, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (id)
            DO UPDATE SET
                user_id = EXCLUDED.user_id,
                credential_id = EXCLUDED.credential_id,
                external_id = EXCLUDED.external_id,
                name = EXCLUDED.name,
                identifiers = EXCLUDED.identifiers,
                details = EXCLUDED.details,
                updated_at = EXCLUDED.updated_at
            ",
        )
        .bind(entity.id.to_string())
        .bind(entity.user_id.map(|id| id.to_string()))
        .bind(&entity.module)
        .bind(entity.credential_id.map(|id| id.to_string()))
        .bind(&entity.external_id)
        .bind(&entity.name)
        .bind(json_map_to_column(&entity.identifiers)?)
        .bind(json_map_to_column(&entity.details)?)
        .bind(entity.created_at)
        .bind(Utc::now())
        .execute(self.pool())
        .await?;

        Ok(())
    }

    /// Get an entity by id
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn get_entity(&self, id: Uuid) -> AppResult<Option<Entity>> {
        let row = sqlx::query(
            r"
            SELECT id, user_id, module, credential_id, external_id, name,
                   identifiers, details, created_at, updated_at
            FROM entities
            WHERE id = $1
            ",
        )
        .bind(id.to_string())
        .fetch_optional(self.pool())
        .await?;

        row.map(|row| Self::row_to_entity(&row)).transpose()
    }

    /// Find entities whose identifier map contains every given field
    ///
    /// # Errors
    ///
    /// Returns an error if an identifier key is malformed or the query fails.
    pub async fn find_entities_by_identifiers(
        &self,
        module: &str,
        identifiers: &JsonMap,
    ) -> AppResult<Vec<Entity>> {
        let predicates = identifier_predicates(identifiers)?;
        let sql = format!(
            r"
            SELECT id, user_id, module, credential_id, external_id, name,
                   identifiers, details, created_at, updated_at
            FROM entities
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

        rows.iter().map(Self::row_to_entity).collect()
    }

    /// List a user's entities for one module, newest last
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn entities_for_user(
        &self,
        user_id: Uuid,
        module: &str,
    ) -> AppResult<Vec<Entity>> {
        let rows = sqlx::query(
            r"
            SELECT id, user_id, module, credential_id, external_id, name,
                   identifiers, details, created_at, updated_at
            FROM entities
            WHERE user_id = $1 AND module = $2
            ORDER BY created_at
            ",
        )
        .bind(user_id.to_string())
        .bind(module)
        .fetch_all(self.pool())
        .await?;

        rows.iter().map(Self::row_to_entity).collect()
    }

    /// Point an entity at a credential, or detach it with `None`
    ///
    /// # Errors
    ///
    /// Returns an error if the database update fails.
    pub async fn set_entity_credential(
        &self,
        entity_id: Uuid,
        credential_id: Option<Uuid>,
    ) -> AppResult<()> {
        sqlx::query(
            r"
            UPDATE entities
            SET credential_id = $2, updated_at = $3
            WHERE id = $1
            ",
        )
        .bind(entity_id.to_string())
        .bind(credential_id.map(|id| id.to_string()))
        .bind(Utc::now())
        .execute(self.pool())
        .await?;

        Ok(())
    }

    /// Convert a database row to an [`Entity`]
    fn row_to_entity(row: &sqlx::sqlite::SqliteRow) -> AppResult<Entity> {
        let user_id: Option<String> = row.get("user_id");
        let credential_id: Option<String> = row.get("credential_id");
        let identifiers: String = row.get("identifiers");
        let details: String = row.get("details");

        Ok(Entity {
            id: Uuid::parse_str(&row.get::<String, _>("id"))?,
            user_id: user_id.as_deref().map(Uuid::parse_str).transpose()?,
            module: row.get("module"),
            credential_id: credential_id.as_deref().map(Uuid::parse_str).transpose()?,
            external_id: row.get("external_id"),
            name: row.get("name"),
            identifiers: json_map_from_column(&identifiers)?,
            details: json_map_from_column(&details)?,
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        })
    }
}
