// ABOUTME: Outreach vendor module binding OAuth2 flows to the module SPI
// ABOUTME: Exchanges authorization codes, refreshes tokens, and resolves the Outreach user identity
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
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use uuid::Uuid;

const DEFAULTS: ModuleEnvDefaults = ModuleEnvDefaults {
    auth_url: "https://api.outreach.io/oauth/authorize",
    token_url: "https://api.outreach.io/oauth/token",
    api_base_url: "https://api.outreach.io/api/v2",
    revoke_url: None,
    scopes: &["users.read", "accounts.read"],
};

// Outreach scopes are space-separated in the authorize URL
const SCOPE_SEPARATOR: &str = " ";

/// Outreach integration module
pub struct OutreachModule {
    config: ModuleOAuthConfig,
}

/// Outreach token endpoint response
#[derive(Debug, Deserialize)]
struct OutreachTokenResponse {
    access_token: String,
    refresh_token: Option<String>,
    expires_in: Option<i64>,
    created_at: Option<i64>,
    scope: Option<String>,
}

impl OutreachModule {
    /// Create the module from `TETHER_OUTREACH_*` environment configuration
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            config: load_module_env_config("outreach", &DEFAULTS),
        }
    }

    /// Create the module from explicit configuration
    #[must_use]
    pub fn with_config(config: ModuleOAuthConfig) -> Self {
        Self { config }
    }

    fn token_data(response: OutreachTokenResponse) -> TokenData {
        let issued_at = response
            .created_at
            .and_then(|ts| DateTime::from_timestamp(ts, 0))
            .unwrap_or_else(Utc::now);
        TokenData {
            access_token: response.access_token,
            refresh_token: response.refresh_token,
            expires_at: response
                .expires_in
                .map(|seconds| issued_at + Duration::seconds(seconds)),
            scope: response.scope,
        }
    }

    fn required<'a>(value: &'a Option<String>, field: &'static str) -> AppResult<&'a str> {
        value
            .as_deref()
            .ok_or_else(|| AppError::config(format!("outreach: {field} not configured")))
    }

    /// Run the refresh grant and publish the outcome
    async fn refresh(&self, api: &ApiClient) -> AppResult<TokenData> {
        let refresh_token = api
            .refresh_token()
            .ok_or_else(|| AppError::auth_failed("outreach: no refresh token loaded"))?;
        let client_id = Self::required(&self.config.client_id, "client_id")?;
        let client_secret = Self::required(&self.config.client_secret, "client_secret")?;

        let response: OutreachTokenResponse = api
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

    /// Record ids arrive as JSON numbers; normalize to an unquoted string
    fn value_to_id(value: &serde_json::Value) -> String {
        value
            .as_str()
            .map_or_else(|| value.to_string(), ToOwned::to_owned)
    }

    /// Fetch the authenticated Outreach user record
    async fn current_user(api: &ApiClient) -> AppResult<serde_json::Value> {
        let body = api.get_json("/users/me").await?;
        body.get("data").cloned().ok_or_else(|| {
            AppError::Http("outreach: /users/me response missing data envelope".into())
        })
    }
}

#[async_trait]
impl AuthModule for OutreachModule {
    fn name(&self) -> &'static str {
        "outreach"
    }

    fn display_name(&self) -> &'static str {
        "Outreach"
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

        let response: OutreachTokenResponse = api
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
        let user = Self::current_user(api).await?;
        let attributes = user.get("attributes").cloned().unwrap_or_default();

        let external_id = user
            .get("id")
            .map(Self::value_to_id)
            .ok_or_else(|| AppError::Http("outreach: user record missing id".into()))?;
        let email = attributes.get("email").and_then(|v| v.as_str());
        let name = attributes
            .get("name")
            .and_then(|v| v.as_str())
            .or(email)
            .unwrap_or("Outreach user");

        let mut identifiers = JsonMap::new();
        identifiers.insert("external_id".into(), external_id.into());
        if let Some(user_id) = user_id {
            identifiers.insert("user_id".into(), user_id.to_string().into());
        }
        let mut details = JsonMap::new();
        details.insert("name".into(), name.into());
        if let Some(email) = email {
            details.insert("email".into(), email.into());
        }

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
            .ok_or_else(|| AppError::auth_failed("outreach: no access token loaded"))?;
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
            let user = Self::current_user(api).await?;
            let external_id = user
                .get("id")
                .map(Self::value_to_id)
                .ok_or_else(|| AppError::Http("outreach: user record missing id".into()))?;
            identifiers.insert("external_id".into(), external_id.into());
        }

        Ok(CredentialDetails {
            identifiers,
            details: JsonMap::new(),
            token,
        })
    }

    async fn test_auth(&self, api: &ApiClient) -> AppResult<()> {
        match api.get_json("/users/me").await {
            Ok(_) => Ok(()),
            Err(err) if err.is_auth_failure() => {
                if let Err(refresh_err) = self.refresh(api).await {
                    api.notify(TokenEvent::InvalidAuth);
                    return Err(refresh_err);
                }
                match api.get_json("/users/me").await {
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

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn token_data_derives_expiry_from_created_at() {
        let response = OutreachTokenResponse {
            access_token: "at".into(),
            refresh_token: Some("rt".into()),
            expires_in: Some(7200),
            created_at: Some(1_700_000_000),
            scope: Some("users.read".into()),
        };
        let token = OutreachModule::token_data(response);
        let expected = DateTime::from_timestamp(1_700_000_000 + 7200, 0).unwrap();
        assert_eq!(token.expires_at, Some(expected));
    }

    #[test]
    fn requirements_fail_without_client_settings() {
        let module = OutreachModule::with_config(ModuleOAuthConfig {
            auth_url: DEFAULTS.auth_url.into(),
            token_url: DEFAULTS.token_url.into(),
            api_base_url: DEFAULTS.api_base_url.into(),
            enabled: true,
            ..ModuleOAuthConfig::default()
        });
        assert!(module.authorization_requirements().is_err());
    }
}
