// ABOUTME: Authorization lifecycle manager coordinating one credential+entity+module binding
// ABOUTME: Handles callback processing, identifier-based upserts, and token-event dispatch
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Tether Labs

//! # Authorization Manager
//!
//! A transient orchestration object binding one credential, entity, vendor
//! module, and API client for the duration of a request. Credential state
//! changes observed mid-request arrive as [`TokenEvent`]s; the manager drains
//! them after each delegated vendor call and persists the outcome.

use crate::database::Database;
use crate::errors::{AppError, AppResult};
use crate::models::{
    AuthorizationOutcome, AuthorizationRequirements, CallbackParams, Credential,
    CredentialDetails, Entity, EntityDetails, EntityReference, InstanceParams,
};
use crate::modules::client::ApiClient;
use crate::modules::events::{token_event_channel, TokenEvent, TokenEventReceiver};
use crate::modules::AuthModule;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Per-request authorization lifecycle manager
pub struct AuthManager {
    database: Database,
    module: Arc<dyn AuthModule>,
    user_id: Option<Uuid>,
    credential: Option<Credential>,
    entity: Option<Entity>,
    api: ApiClient,
    events: TokenEventReceiver,
}

impl std::fmt::Debug for AuthManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthManager")
            .field("module", &self.module.name())
            .field("user_id", &self.user_id)
            .finish_non_exhaustive()
    }
}

impl AuthManager {
    /// Load records referenced by `params` and construct a ready manager
    ///
    /// The API client is built from the module's static environment config
    /// merged with credential-derived parameters.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::NotFound`] if a referenced entity or credential id
    /// does not resolve.
    pub async fn get_instance(
        database: Database,
        module: Arc<dyn AuthModule>,
        params: InstanceParams,
    ) -> AppResult<Self> {
        let mut entity = None;
        let mut credential = None;

        if let Some(entity_id) = params.entity_id {
            let loaded = database
                .get_entity(entity_id)
                .await?
                .ok_or_else(|| AppError::not_found(format!("Entity {entity_id}")))?;
            if let Some(credential_id) = loaded.credential_id {
                credential = Some(
                    database
                        .get_credential(credential_id)
                        .await?
                        .ok_or_else(|| {
                            AppError::not_found(format!("Credential {credential_id}"))
                        })?,
                );
            }
            entity = Some(loaded);
        } else if let Some(credential_id) = params.credential_id {
            credential = Some(
                database
                    .get_credential(credential_id)
                    .await?
                    .ok_or_else(|| AppError::not_found(format!("Credential {credential_id}")))?,
            );
        }

        let (events_tx, events) = token_event_channel();
        let api_params = module.api_params_from_credential(credential.as_ref());
        let api = ApiClient::new(
            module.name(),
            module.oauth_config().clone(),
            api_params,
            events_tx,
        );

        debug!(
            module = module.name(),
            has_credential = credential.is_some(),
            has_entity = entity.is_some(),
            "auth manager instantiated"
        );

        Ok(Self {
            database,
            module,
            user_id: params.user_id,
            credential,
            entity,
            api,
            events,
        })
    }

    /// Vendor module name this manager serves
    #[must_use]
    pub fn module_name(&self) -> &'static str {
        self.module.name()
    }

    /// The vendor API client for this instance
    #[must_use]
    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    /// Currently loaded credential, if any
    #[must_use]
    pub fn credential(&self) -> Option<&Credential> {
        self.credential.as_ref()
    }

    /// Currently loaded entity, if any
    #[must_use]
    pub fn entity(&self) -> Option<&Entity> {
        self.entity.as_ref()
    }

    /// OAuth redirect descriptor for starting an authorization flow
    ///
    /// # Errors
    ///
    /// Returns a configuration error when required client settings are absent.
    pub fn authorization_requirements(&self) -> AppResult<AuthorizationRequirements> {
        self.module.authorization_requirements()
    }

    /// Check that the module's redirect descriptor is usable
    ///
    /// # Errors
    ///
    /// Returns an error if the descriptor cannot be built at all.
    pub fn validate_authorization_requirements(&self) -> AppResult<bool> {
        Ok(self.authorization_requirements()?.is_valid())
    }

    /// Exchange an OAuth callback for tokens and resolve the linked entity
    ///
    /// The module publishes a token-refreshed event during the exchange;
    /// draining it persists the credential before the entity is resolved.
    ///
    /// # Errors
    ///
    /// Returns an error if the exchange fails, the identity is ambiguous, or
    /// persistence fails.
    pub async fn process_authorization_callback(
        &mut self,
        params: &CallbackParams,
    ) -> AppResult<AuthorizationOutcome> {
        let token = self.module.get_token(&self.api, params).await?;
        self.process_pending_events().await?;

        let credential_id = self
            .credential
            .as_ref()
            .map(|credential| credential.id)
            .ok_or_else(|| {
                AppError::internal("module completed token exchange without publishing tokens")
            })?;

        let entity_details = self
            .module
            .get_entity_details(&self.api, params, &token, self.user_id)
            .await?;
        let entity = self.find_or_create_entity(entity_details).await?;

        info!(
            module = self.module.name(),
            %credential_id,
            entity_id = %entity.id,
            "authorization callback completed"
        );

        Ok(AuthorizationOutcome {
            credential_id,
            entity_id: entity.id,
            module_type: self.module.name().to_owned(),
        })
    }

    /// Resolve an entity by its identifier set, creating one if none exists
    ///
    /// Zero matches creates an entity owning the current credential; exactly
    /// one match is reused; more than one match is fatal and mutates nothing.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::AmbiguousIdentity`] on duplicate matches, or an
    /// error if no credential is loaded for a create.
    pub async fn find_or_create_entity(
        &mut self,
        entity_details: EntityDetails,
    ) -> AppResult<Entity> {
        let mut matches = self
            .database
            .find_entities_by_identifiers(self.module.name(), &entity_details.identifiers)
            .await?;

        if matches.len() > 1 {
            return Err(AppError::ambiguous_identity(format!(
                "{} entities matched identifiers {}",
                matches.len(),
                serde_json::Value::Object(entity_details.identifiers),
            )));
        }

        let entity = if let Some(existing) = matches.pop() {
            debug!(module = self.module.name(), entity_id = %existing.id, "entity reused");
            existing
        } else {
            let credential_id = self.credential.as_ref().map(|c| c.id).ok_or_else(|| {
                AppError::invalid_input("cannot create an entity without a loaded credential")
            })?;
            let created = Entity::new(
                self.user_id,
                self.module.name().to_owned(),
                Some(credential_id),
                entity_details.identifiers,
                entity_details.details,
            );
            self.database.upsert_entity(&created).await?;
            info!(module = self.module.name(), entity_id = %created.id, "entity created");
            created
        };

        self.entity = Some(entity.clone());
        Ok(entity)
    }

    /// Persist credential material, matching an existing row by identifiers
    ///
    /// With no credential loaded, the identifier set is searched: more than
    /// one match is fatal, one match becomes the upsert target, and zero
    /// matches means no prior credential exists, so a fresh row is inserted.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::AmbiguousIdentity`] on duplicate matches or an
    /// error if persistence fails.
    pub async fn update_or_create_credential(
        &mut self,
        credential_details: CredentialDetails,
    ) -> AppResult<Credential> {
        if self.credential.is_none() {
            let mut matches = self
                .database
                .find_credentials_by_identifiers(
                    self.module.name(),
                    &credential_details.identifiers,
                )
                .await?;
            if matches.len() > 1 {
                return Err(AppError::ambiguous_identity(format!(
                    "{} credentials matched identifiers {}",
                    matches.len(),
                    serde_json::Value::Object(credential_details.identifiers),
                )));
            }
            self.credential = matches.pop();
        }

        let credential = if let Some(mut existing) = self.credential.take() {
            existing.access_token = credential_details.token.access_token.clone();
            existing.refresh_token = credential_details.token.refresh_token.clone();
            existing.expires_at = credential_details.token.expires_at;
            // Fresh token material means authorization works again
            existing.auth_is_valid = true;
            existing.user_id = existing.user_id.or(self.user_id);
            existing.identifiers.extend(credential_details.identifiers);
            existing.details.extend(credential_details.details);
            existing
        } else {
            Credential::new(
                self.user_id,
                self.module.name().to_owned(),
                &credential_details.token,
                credential_details.identifiers,
                credential_details.details,
            )
        };

        self.database.upsert_credential(&credential).await?;
        debug!(module = self.module.name(), credential_id = %credential.id, "credential persisted");

        self.credential = Some(credential.clone());
        Ok(credential)
    }

    /// Dispatch one token-state notification
    ///
    /// # Errors
    ///
    /// Returns an error if handling the notification fails to persist state.
    pub async fn receive_notification(&mut self, event: TokenEvent) -> AppResult<()> {
        match event {
            TokenEvent::Refreshed(_) => {
                let details = self
                    .module
                    .get_credential_details(&self.api, self.user_id)
                    .await?;
                self.update_or_create_credential(details).await?;
            }
            TokenEvent::Deauthorized => self.deauthorize().await?,
            TokenEvent::InvalidAuth => self.mark_credentials_invalid().await?,
        }
        Ok(())
    }

    /// Drain and dispatch every pending token event
    ///
    /// # Errors
    ///
    /// Returns the first notification-handling error encountered.
    pub async fn process_pending_events(&mut self) -> AppResult<()> {
        while let Ok(event) = self.events.try_recv() {
            self.receive_notification(event).await?;
        }
        Ok(())
    }

    /// Flag the loaded credential as invalid without deleting it
    ///
    /// Soft invalidation: the row survives and a later authorization flow
    /// restores it.
    ///
    /// # Errors
    ///
    /// Returns an error if the database update fails.
    pub async fn mark_credentials_invalid(&mut self) -> AppResult<()> {
        if let Some(credential) = self.credential.as_mut() {
            credential.auth_is_valid = false;
            self.database
                .set_credential_validity(credential.id, false)
                .await?;
            warn!(
                module = self.module.name(),
                credential_id = %credential.id,
                "credential flagged invalid"
            );
        } else {
            warn!(
                module = self.module.name(),
                "invalid-auth notification with no credential loaded"
            );
        }
        Ok(())
    }

    /// Tear down after the vendor revoked the grant
    ///
    /// Clears in-memory tokens, soft-invalidates the credential, and detaches
    /// it from the loaded entity.
    ///
    /// # Errors
    ///
    /// Returns an error if a database update fails.
    pub async fn deauthorize(&mut self) -> AppResult<()> {
        self.api.clear_tokens();
        self.mark_credentials_invalid().await?;

        if let Some(entity) = self.entity.as_mut() {
            if entity.credential_id.is_some() {
                self.database.set_entity_credential(entity.id, None).await?;
                entity.credential_id = None;
                info!(
                    module = self.module.name(),
                    entity_id = %entity.id,
                    "entity detached from credential"
                );
            }
        }
        Ok(())
    }

    /// Prove the loaded credential works, refreshing if the module supports it
    ///
    /// Auth failures are converted into persisted `auth_is_valid = false`
    /// state via the event channel and reported as `Ok(false)` rather than
    /// propagated as a crash.
    ///
    /// # Errors
    ///
    /// Returns non-auth errors (transport, persistence) unchanged.
    pub async fn test_auth(&mut self) -> AppResult<bool> {
        let result = self.module.test_auth(&self.api).await;
        self.process_pending_events().await?;

        match result {
            Ok(()) => Ok(true),
            Err(err) if err.is_auth_failure() => {
                warn!(module = self.module.name(), error = %err, "auth test failed");
                Ok(false)
            }
            Err(err) => Err(err),
        }
    }

    /// List a user's entities for this module as display references
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn entities_for_user(&self, user_id: Uuid) -> AppResult<Vec<EntityReference>> {
        let entities = self
            .database
            .entities_for_user(user_id, self.module.name())
            .await?;
        Ok(entities.iter().map(EntityReference::from).collect())
    }
}
