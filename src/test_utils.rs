// ABOUTME: Test utilities for creating records and mock integrations in a consistent way
// ABOUTME: Centralizes fixture construction for unit and integration tests
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Tether Labs

use crate::database::Database;
use crate::errors::AppResult;
use crate::models::{Credential, Entity, JsonMap, TokenData};
use chrono::{Duration, Utc};
use uuid::Uuid;

#[cfg(feature = "module-synthetic")]
use crate::auth::AuthManager;
#[cfg(feature = "module-synthetic")]
use crate::models::InstanceParams;
#[cfg(feature = "module-synthetic")]
use crate::modules::synthetic::SyntheticModule;
#[cfg(feature = "module-synthetic")]
use std::sync::Arc;

/// Generate a throwaway 32-byte encryption key
#[must_use]
pub fn test_encryption_key() -> Vec<u8> {
    use rand::RngCore;
    let mut key = vec![0u8; 32];
    rand::rngs::OsRng.fill_bytes(&mut key);
    key
}

/// Create an in-memory database with a throwaway encryption key
///
/// # Errors
///
/// Returns an error if the connection or migrations fail.
pub async fn create_test_database() -> AppResult<Database> {
    Database::new("sqlite::memory:", test_encryption_key()).await
}

/// Create a test credential with default token material
#[must_use]
pub fn create_test_credential(user_id: Uuid, module: &str) -> Credential {
    let mut identifiers = JsonMap::new();
    identifiers.insert("user_id".into(), user_id.to_string().into());
    Credential::new(
        Some(user_id),
        module.to_owned(),
        &TokenData {
            access_token: "test_access_token".into(),
            refresh_token: Some("test_refresh_token".into()),
            expires_at: Some(Utc::now() + Duration::hours(6)),
            scope: Some("all".into()),
        },
        identifiers,
        JsonMap::new(),
    )
}

/// Create a test entity linked to the given credential
#[must_use]
pub fn create_test_entity(
    user_id: Uuid,
    module: &str,
    credential_id: Option<Uuid>,
    external_id: &str,
) -> Entity {
    let mut identifiers = JsonMap::new();
    identifiers.insert("external_id".into(), external_id.into());
    identifiers.insert("user_id".into(), user_id.to_string().into());
    let mut details = JsonMap::new();
    details.insert("name".into(), "Test user".into());
    Entity::new(
        Some(user_id),
        module.to_owned(),
        credential_id,
        identifiers,
        details,
    )
}

/// A seeded integration fixture backed by the synthetic module
#[cfg(feature = "module-synthetic")]
pub struct MockIntegration {
    /// The backing in-memory database
    pub database: Database,
    /// Owner of the seeded records
    pub user_id: Uuid,
    /// Placeholder credential shared by both entities
    pub credential: Credential,
    /// One fully-identified entity and one bare entity
    pub entities: Vec<Entity>,
    /// Manager instantiated against the first entity
    pub manager: AuthManager,
}

/// Construct a seeded mock integration
///
/// Seeds a placeholder credential keyed by the owning user, one entity with
/// full vendor identity, one bare entity, and a synthetic-module manager
/// loaded from the first entity.
///
/// # Errors
///
/// Returns an error if seeding or manager construction fails.
#[cfg(feature = "module-synthetic")]
pub async fn create_mock_integration() -> AppResult<MockIntegration> {
    let database = create_test_database().await?;
    let user_id = Uuid::new_v4();

    // Placeholder credential keyed by the owning user, completed by the
    // first real authorization
    let mut identifiers = JsonMap::new();
    identifiers.insert("user_id".into(), user_id.to_string().into());
    let credential = Credential::new(
        Some(user_id),
        "synthetic".into(),
        &TokenData {
            access_token: "pending-authorization".into(),
            refresh_token: None,
            expires_at: None,
            scope: None,
        },
        identifiers.clone(),
        JsonMap::new(),
    );
    database.upsert_credential(&credential).await?;

    let entity1 = create_test_entity(user_id, "synthetic", Some(credential.id), "1234567890123456");
    database.upsert_entity(&entity1).await?;

    let entity2 = Entity::new(
        Some(user_id),
        "synthetic".into(),
        Some(credential.id),
        identifiers,
        JsonMap::new(),
    );
    database.upsert_entity(&entity2).await?;

    let manager = AuthManager::get_instance(
        database.clone(),
        Arc::new(SyntheticModule::new()),
        InstanceParams::for_entity(user_id, entity1.id),
    )
    .await?;

    Ok(MockIntegration {
        database,
        user_id,
        credential,
        entities: vec![entity1, entity2],
        manager,
    })
}
