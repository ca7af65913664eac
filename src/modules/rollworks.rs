// ABOUTME: RollWorks (NextRoll) vendor module binding OAuth2 flows to the module SPI
// ABOUTME: Exchanges authorization codes and resolves the advertisable organization identity
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Tether Labs

use crate::config::{load_module_env_config, ModuleEnvDefaults, ModuleOAuthConfig};
use crate::errors::{AppError, AppResult};
use crate::models::{
    AuthorizationRequirements, CallbackParams, CredentialDetails, EntityDetails, JsonMap,
    TokenData,
};
use crate::modules::client::ApiClient;
use crate::modules::events::TokenEvent;
use crate::modules::{oauth2_requirements, AuthModule};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde::Deserialize;
use uuid::Uuid;

const DEFAULTS: ModuleEnvDefaults = ModuleEnvDefaults {
    auth_url: "https://services.adroll.com/auth/authorize",
    token_url: "https://services.adroll.com/auth/token",
    api_base_url: "https://services.adroll.com/api/v1",
    revoke_url: None,
    scopes: &["universal"],
};

const SCOPE_SEPARATOR: &str = " ";

/// RollWorks integration module
pub struct RollworksModule {
    config: ModuleOAuthConfig,
}

/// NextRoll token endpoint response
#[derive(Debug, Deserialize)]
struct RollworksTokenResponse {
    access_token: String,
    refresh_token: Option<String>,
    expires_in: Option<i64>,
    scope: Option<String>,
}

/// Envelope NextRoll wraps API payloads in
#[derive(Debug, Deserialize)]
struct RollworksEnvelope<T> {
    results: T,
}

/// Current organization payload
#[derive(Debug, Deserialize)]
struct RollworksOrganization {
    eid: String,
    name: Option<String>,
}

impl RollworksModule {
    /// Create the module from `TETHER_ROLLWORKS_*` environment configuration
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            config: load_module_env_config("rollworks", &DEFAULTS),
        }
    }

    /// Create the module from explicit configuration
    #[must_use]
    pub fn with_config(config: ModuleOAuthConfig) -> Self {
        Self { config }
    }

    fn token_data(response: RollworksTokenResponse) -> TokenData {
        TokenData {
            access_token: response.access_token,
            refresh_token: response.refresh_token,
            expires_at: response
                .expires_in
                .map(|seconds| Utc::now() + Duration::seconds(seconds)),
            scope: response.scope,
        }
    }

    fn required<'a>(value: &'a Option<String>, field: &'static str) -> AppResult<&'a str> {
        value
            .as_deref()
            .ok_or_else(|| AppError::config(format!("rollworks: {field} not configured")))
    }

    async fn refresh(&self, api: &ApiClient) -> AppResult<TokenData> {
        let refresh_token = api
            .refresh_token()
            .ok_or_else(|| AppError::auth_failed("rollworks: no refresh token loaded"))?;
        let client_id = Self::required(&self.config.client_id, "client_id")?;
        let client_secret = Self::required(&self.config.client_secret, "client_secret")?;

        let response: RollworksTokenResponse = api
            .post_token_form(
                &self.config.token_url,
                &[
                    ("client_id", client_id),
                    ("client_secret", client_secret),
                    ("grant_type", "refresh_token"),
                    ("refresh_token", &refresh_token),
                ],
            )
            .await?;

        let token = Self::token_data(response);
        api.set_tokens(&token);
        api.notify(TokenEvent::Refreshed(token.clone()));
        Ok(token)
    }

    async fn current_organization(api: &ApiClient) -> AppResult<RollworksOrganization> {
        let body = api.get_json("/organization/get").await?;
        let envelope: RollworksEnvelope<RollworksOrganization> = serde_json::from_value(body)?;
        Ok(envelope.results)
    }
}

#[async_trait]
impl AuthModule for RollworksModule {
    fn name(&self) -> &'static str {
        "rollworks"
    }

    fn display_name(&self) -> &'static str {
        "RollWorks"
    }

    fn oauth_config(&self) -> &ModuleOAuthConfig {
        &self.config
    }

    fn authorization_requirements(&self) -> AppResult<AuthorizationRequirements> {
        oauth2_requirements(self.name(), &self.config, SCOPE_SEPARATOR)
    }

    async fn get_token(&self, api: &ApiClient, params: &CallbackParams) -> AppResult<TokenData> {
        let client_id = Self::required(&self.config.client_id, "client_id")?;
        let client_secret = Self::required(&self.config.client_secret, "client_secret")?;
        let redirect_uri = Self::required(&self.config.redirect_uri, "redirect_uri")?;

        let response: RollworksTokenResponse = api
            .post_token_form(
                &self.config.token_url,
                &[
                    ("client_id", client_id),
                    ("client_secret", client_secret),
                    ("redirect_uri", redirect_uri),
                    ("grant_type", "authorization_code"),
                    ("code", &params.code),
                ],
            )
            .await?;

        let token = Self::token_data(response);
        api.set_tokens(&token);
        api.notify(TokenEvent::Refreshed(token.clone()));
        Ok(token)
    }

    async fn get_entity_details(
        &self,
        api: &ApiClient,
        _params: &CallbackParams,
        _token: &TokenData,
        user_id: Option<Uuid>,
    ) -> AppResult<EntityDetails> {
        let organization = Self::current_organization(api).await?;

        let mut identifiers = JsonMap::new();
        identifiers.insert("external_id".into(), organization.eid.clone().into());
        if let Some(user_id) = user_id {
            identifiers.insert("user_id".into(), user_id.to_string().into());
        }
        let mut details = JsonMap::new();
        details.insert(
            "name".into(),
            organization.name.unwrap_or(organization.eid).into(),
        );

        Ok(EntityDetails {
            identifiers,
            details,
        })
    }

    async fn get_credential_details(
        &self,
        api: &ApiClient,
        user_id: Option<Uuid>,
    ) -> AppResult<CredentialDetails> {
        let access_token = api
            .access_token()
            .ok_or_else(|| AppError::auth_failed("rollworks: no access token loaded"))?;
        let token = TokenData {
            access_token,
            refresh_token: api.refresh_token(),
            expires_at: api.expires_at(),
            scope: Some(self.config.scope_string(SCOPE_SEPARATOR)),
        };

        let mut identifiers = JsonMap::new();
        if let Some(user_id) = user_id {
            identifiers.insert("user_id".into(), user_id.to_string().into());
        } else {
            let organization = Self::current_organization(api).await?;
            identifiers.insert("organization_eid".into(), organization.eid.into());
        }

        Ok(CredentialDetails {
            identifiers,
            details: JsonMap::new(),
            token,
        })
    }

    async fn test_auth(&self, api: &ApiClient) -> AppResult<()> {
        match Self::current_organization(api).await {
            Ok(_) => Ok(()),
            Err(err) if err.is_auth_failure() => {
                if let Err(refresh_err) = self.refresh(api).await {
                    api.notify(TokenEvent::InvalidAuth);
                    return Err(refresh_err);
                }
                match Self::current_organization(api).await {
                    Ok(_) => Ok(()),
                    Err(retry_err) => {
                        if retry_err.is_auth_failure() {
                            api.notify(TokenEvent::InvalidAuth);
                        }
                        Err(retry_err)
                    }
                }
            }
            Err(err) => Err(err),
        }
    }
}
