// ABOUTME: Authorization lifecycle tests covering callbacks, entity resolution, and invalidation
// ABOUTME: Exercises the manager end to end against the offline synthetic module
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::missing_panics_doc,
    clippy::similar_names
)]

use std::sync::Arc;
use tether_integrations::auth::AuthManager;
use tether_integrations::errors::AppError;
use tether_integrations::models::{
    CallbackParams, EntityDetails, InstanceParams, JsonMap, TokenData,
};
use tether_integrations::modules::events::TokenEvent;
use tether_integrations::modules::synthetic::SyntheticModule;
use tether_integrations::test_utils::{
    create_mock_integration, create_test_credential, create_test_database, create_test_entity,
};
use uuid::Uuid;

async fn manager_for_user(
    database: tether_integrations::database::Database,
    user_id: Uuid,
) -> AuthManager {
    AuthManager::get_instance(
        database,
        Arc::new(SyntheticModule::new()),
        InstanceParams::for_user(user_id),
    )
    .await
    .expect("Failed to create manager")
}

#[tokio::test]
async fn authorization_callback_creates_credential_and_entity() {
    let database = create_test_database().await.expect("Failed to create database");
    let user_id = Uuid::new_v4();
    let mut manager = manager_for_user(database.clone(), user_id).await;

    let outcome = manager
        .process_authorization_callback(&CallbackParams::from_code("abc"))
        .await
        .expect("Callback processing failed");

    assert_eq!(outcome.module_type, "synthetic");

    let credential = database
        .get_credential(outcome.credential_id)
        .await
        .expect("Failed to load credential")
        .expect("Credential not persisted");
    assert!(credential.auth_is_valid);
    assert_eq!(credential.access_token, "synthetic-access-abc");
    assert_eq!(credential.user_id, Some(user_id));

    let entity = database
        .get_entity(outcome.entity_id)
        .await
        .expect("Failed to load entity")
        .expect("Entity not persisted");
    assert_eq!(entity.external_id.as_deref(), Some("1234567890123456"));
    assert_eq!(entity.credential_id, Some(outcome.credential_id));
    assert_eq!(entity.name.as_deref(), Some("Test user"));
}

#[tokio::test]
async fn repeated_callback_reuses_credential_and_entity() {
    let database = create_test_database().await.expect("Failed to create database");
    let user_id = Uuid::new_v4();

    let mut first = manager_for_user(database.clone(), user_id).await;
    let outcome1 = first
        .process_authorization_callback(&CallbackParams::from_code("abc"))
        .await
        .expect("First callback failed");

    let mut second = manager_for_user(database.clone(), user_id).await;
    let outcome2 = second
        .process_authorization_callback(&CallbackParams::from_code("def"))
        .await
        .expect("Second callback failed");

    assert_eq!(outcome1.credential_id, outcome2.credential_id);
    assert_eq!(outcome1.entity_id, outcome2.entity_id);

    // Re-authorization rotated the stored token material
    let credential = database
        .get_credential(outcome1.credential_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(credential.access_token, "synthetic-access-def");
}

#[tokio::test]
async fn ambiguous_entity_identifiers_fail_without_mutation() {
    let database = create_test_database().await.expect("Failed to create database");
    let user_id = Uuid::new_v4();

    let credential = create_test_credential(user_id, "synthetic");
    database.upsert_credential(&credential).await.unwrap();

    // Two entities carrying the same identifier set
    let dupe1 = create_test_entity(user_id, "synthetic", Some(credential.id), "org-1");
    let dupe2 = create_test_entity(user_id, "synthetic", Some(credential.id), "org-1");
    database.upsert_entity(&dupe1).await.unwrap();
    database.upsert_entity(&dupe2).await.unwrap();

    let mut manager = AuthManager::get_instance(
        database.clone(),
        Arc::new(SyntheticModule::new()),
        InstanceParams::for_credential(user_id, credential.id),
    )
    .await
    .unwrap();

    let err = manager
        .find_or_create_entity(EntityDetails {
            identifiers: dupe1.identifiers.clone(),
            details: JsonMap::new(),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::AmbiguousIdentity(_)));

    // No third entity appeared
    let matches = database
        .find_entities_by_identifiers("synthetic", &dupe1.identifiers)
        .await
        .unwrap();
    assert_eq!(matches.len(), 2);
}

#[tokio::test]
async fn ambiguous_credential_identifiers_fail() {
    let database = create_test_database().await.expect("Failed to create database");
    let user_id = Uuid::new_v4();

    // Two credentials carrying the same identifier set
    let dupe1 = create_test_credential(user_id, "synthetic");
    let dupe2 = create_test_credential(user_id, "synthetic");
    database.upsert_credential(&dupe1).await.unwrap();
    database.upsert_credential(&dupe2).await.unwrap();

    let mut manager = manager_for_user(database.clone(), user_id).await;

    let details = tether_integrations::models::CredentialDetails {
        identifiers: dupe1.identifiers.clone(),
        details: JsonMap::new(),
        token: TokenData {
            access_token: "new-access".into(),
            refresh_token: None,
            expires_at: None,
            scope: None,
        },
    };
    let err = manager.update_or_create_credential(details).await.unwrap_err();
    assert!(matches!(err, AppError::AmbiguousIdentity(_)));

    // Neither duplicate was touched
    let persisted = database.get_credential(dupe1.id).await.unwrap().unwrap();
    assert_eq!(persisted.access_token, "test_access_token");
}

#[tokio::test]
async fn single_identifier_match_is_reused() {
    let database = create_test_database().await.expect("Failed to create database");
    let user_id = Uuid::new_v4();

    let credential = create_test_credential(user_id, "synthetic");
    database.upsert_credential(&credential).await.unwrap();
    let existing = create_test_entity(user_id, "synthetic", Some(credential.id), "org-1");
    database.upsert_entity(&existing).await.unwrap();

    let mut manager = AuthManager::get_instance(
        database.clone(),
        Arc::new(SyntheticModule::new()),
        InstanceParams::for_credential(user_id, credential.id),
    )
    .await
    .unwrap();

    let entity = manager
        .find_or_create_entity(EntityDetails {
            identifiers: existing.identifiers.clone(),
            details: JsonMap::new(),
        })
        .await
        .unwrap();
    assert_eq!(entity.id, existing.id);
}

#[tokio::test]
async fn credential_validity_round_trip() {
    let database = create_test_database().await.expect("Failed to create database");
    let user_id = Uuid::new_v4();

    let credential = create_test_credential(user_id, "synthetic");
    assert!(credential.auth_is_valid);
    database.upsert_credential(&credential).await.unwrap();

    let mut manager = AuthManager::get_instance(
        database.clone(),
        Arc::new(SyntheticModule::new()),
        InstanceParams::for_credential(user_id, credential.id),
    )
    .await
    .unwrap();

    manager.mark_credentials_invalid().await.unwrap();

    let persisted = database.get_credential(credential.id).await.unwrap().unwrap();
    assert!(!persisted.auth_is_valid);
}

#[tokio::test]
async fn instance_by_entity_and_by_credential_share_tokens() {
    let database = create_test_database().await.expect("Failed to create database");
    let user_id = Uuid::new_v4();

    let credential = create_test_credential(user_id, "synthetic");
    database.upsert_credential(&credential).await.unwrap();
    let entity = create_test_entity(user_id, "synthetic", Some(credential.id), "org-1");
    database.upsert_entity(&entity).await.unwrap();

    let by_entity = AuthManager::get_instance(
        database.clone(),
        Arc::new(SyntheticModule::new()),
        InstanceParams::for_entity(user_id, entity.id),
    )
    .await
    .unwrap();

    let by_credential = AuthManager::get_instance(
        database.clone(),
        Arc::new(SyntheticModule::new()),
        InstanceParams::for_credential(user_id, credential.id),
    )
    .await
    .unwrap();

    assert_eq!(
        by_entity.api().access_token(),
        by_credential.api().access_token()
    );
    assert_eq!(
        by_entity.credential().map(|c| c.id),
        by_credential.credential().map(|c| c.id)
    );
}

#[tokio::test]
async fn unresolvable_ids_fail_instantiation() {
    let database = create_test_database().await.expect("Failed to create database");
    let user_id = Uuid::new_v4();

    let err = AuthManager::get_instance(
        database,
        Arc::new(SyntheticModule::new()),
        InstanceParams::for_entity(user_id, Uuid::new_v4()),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
async fn refresh_failure_leaves_auth_invalid() {
    let database = create_test_database().await.expect("Failed to create database");
    let user_id = Uuid::new_v4();

    let mut credential = create_test_credential(user_id, "synthetic");
    credential.access_token = "nolongervalid".into();
    credential.refresh_token = Some("nolongervalideither".into());
    database.upsert_credential(&credential).await.unwrap();
    let entity = create_test_entity(user_id, "synthetic", Some(credential.id), "org-1");
    database.upsert_entity(&entity).await.unwrap();

    let mut manager = AuthManager::get_instance(
        database.clone(),
        Arc::new(SyntheticModule::new()),
        InstanceParams::for_entity(user_id, entity.id),
    )
    .await
    .unwrap();

    let auth_ok = manager.test_auth().await.expect("test_auth crashed");
    assert!(!auth_ok);

    let persisted = database.get_credential(credential.id).await.unwrap().unwrap();
    assert!(!persisted.auth_is_valid);
}

#[tokio::test]
async fn successful_refresh_persists_rotated_tokens() {
    let database = create_test_database().await.expect("Failed to create database");
    let user_id = Uuid::new_v4();

    let mut credential = create_test_credential(user_id, "synthetic");
    credential.access_token = "nolongervalid".into();
    credential.refresh_token = Some("still-good".into());
    database.upsert_credential(&credential).await.unwrap();

    let mut manager = AuthManager::get_instance(
        database.clone(),
        Arc::new(SyntheticModule::new()),
        InstanceParams::for_credential(user_id, credential.id),
    )
    .await
    .unwrap();

    let auth_ok = manager.test_auth().await.expect("test_auth crashed");
    assert!(auth_ok);

    let persisted = database.get_credential(credential.id).await.unwrap().unwrap();
    assert_eq!(persisted.access_token, "still-good:rotated-access");
    assert!(persisted.auth_is_valid);
}

#[tokio::test]
async fn refreshed_notification_persists_new_token_material() {
    let database = create_test_database().await.expect("Failed to create database");
    let user_id = Uuid::new_v4();

    let credential = create_test_credential(user_id, "synthetic");
    database.upsert_credential(&credential).await.unwrap();

    let mut manager = AuthManager::get_instance(
        database.clone(),
        Arc::new(SyntheticModule::new()),
        InstanceParams::for_credential(user_id, credential.id),
    )
    .await
    .unwrap();

    let rotated = TokenData {
        access_token: "rotated-access".into(),
        refresh_token: Some("rotated-refresh".into()),
        expires_at: None,
        scope: Some("all".into()),
    };
    manager.api().set_tokens(&rotated);
    manager
        .receive_notification(TokenEvent::Refreshed(rotated))
        .await
        .unwrap();

    let persisted = database.get_credential(credential.id).await.unwrap().unwrap();
    assert_eq!(persisted.access_token, "rotated-access");
    assert_eq!(persisted.refresh_token.as_deref(), Some("rotated-refresh"));
}

#[tokio::test]
async fn deauthorize_detaches_entity_and_invalidates_credential() {
    let mock = create_mock_integration().await.expect("Harness failed");
    let mut manager = mock.manager;

    manager.deauthorize().await.unwrap();

    assert!(manager.api().access_token().is_none());

    let entity = mock
        .database
        .get_entity(mock.entities[0].id)
        .await
        .unwrap()
        .unwrap();
    assert!(entity.credential_id.is_none());

    let credential = mock
        .database
        .get_credential(mock.credential.id)
        .await
        .unwrap()
        .unwrap();
    assert!(!credential.auth_is_valid);
}

#[tokio::test]
async fn mock_integration_seeds_a_ready_manager() {
    let mock = create_mock_integration().await.expect("Harness failed");

    assert_eq!(mock.entities.len(), 2);
    assert_eq!(
        mock.manager.api().access_token().as_deref(),
        Some("pending-authorization")
    );
    assert_eq!(mock.manager.entity().map(|e| e.id), Some(mock.entities[0].id));
    assert_eq!(
        mock.manager.credential().map(|c| c.id),
        Some(mock.credential.id)
    );
}

#[tokio::test]
async fn placeholder_credential_is_completed_by_authorization() {
    let mock = create_mock_integration().await.expect("Harness failed");
    let mut manager = mock.manager;

    let outcome = manager
        .process_authorization_callback(&CallbackParams::from_code("xyz"))
        .await
        .expect("Callback processing failed");

    // The placeholder row was reused, not duplicated
    assert_eq!(outcome.credential_id, mock.credential.id);

    let credential = mock
        .database
        .get_credential(mock.credential.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(credential.access_token, "synthetic-access-xyz");
}

#[tokio::test]
async fn entities_for_user_lists_display_references() {
    let mock = create_mock_integration().await.expect("Harness failed");

    let references = mock
        .manager
        .entities_for_user(mock.user_id)
        .await
        .expect("Listing failed");

    assert_eq!(references.len(), 2);
    assert!(references.iter().all(|r| r.module_type == "synthetic"));
    assert!(references
        .iter()
        .any(|r| r.external_id.as_deref() == Some("1234567890123456")));
}

#[tokio::test]
async fn authorization_requirements_validate_for_synthetic() {
    let database = create_test_database().await.expect("Failed to create database");
    let manager = manager_for_user(database, Uuid::new_v4()).await;

    let requirements = manager.authorization_requirements().unwrap();
    assert!(!requirements.url.is_empty());
    assert!(manager.validate_authorization_requirements().unwrap());
}
