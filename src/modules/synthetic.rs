// ABOUTME: Offline synthetic vendor module with deterministic token behavior
// ABOUTME: Drives the mock integration harness and lifecycle tests without network access
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Tether Labs

//! # Synthetic Module
//!
//! A vendor module with no real backend. Any authorization code is accepted,
//! refresh rotates tokens deterministically, and a token containing the
//! substring `"invalid"` is rejected the way a real vendor rejects a revoked
//! token. Registered by default so the full authorization lifecycle can be
//! exercised offline.

use crate::config::ModuleOAuthConfig;
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
use uuid::Uuid;

/// The external account the synthetic vendor pretends to expose
#[derive(Debug, Clone)]
pub struct SyntheticAccount {
    /// Vendor-side account identifier
    pub external_id: String,
    /// Account display name
    pub name: String,
}

impl Default for SyntheticAccount {
    fn default() -> Self {
        Self {
            external_id: "1234567890123456".into(),
            name: "Test user".into(),
        }
    }
}

/// Offline vendor module for tests and local development
pub struct SyntheticModule {
    config: ModuleOAuthConfig,
    account: SyntheticAccount,
}

impl SyntheticModule {
    /// Module with the default synthetic account
    #[must_use]
    pub fn new() -> Self {
        Self::with_account(SyntheticAccount::default())
    }

    /// Module exposing a specific synthetic account
    #[must_use]
    pub fn with_account(account: SyntheticAccount) -> Self {
        Self {
            config: ModuleOAuthConfig {
                client_id: Some("synthetic-client".into()),
                client_secret: Some("synthetic-secret".into()),
                redirect_uri: Some("http://localhost/callback/synthetic".into()),
                auth_url: "http://localhost/synthetic/authorize".into(),
                token_url: "http://localhost/synthetic/token".into(),
                api_base_url: "http://localhost/synthetic/api".into(),
                revoke_url: None,
                scopes: vec!["all".into()],
                enabled: true,
            },
            account,
        }
    }

    /// A token is rejected once it carries the `invalid` marker
    fn token_rejected(token: &str) -> bool {
        token.contains("invalid")
    }

    fn current_token(api: &ApiClient) -> AppResult<TokenData> {
        let access_token = api
            .access_token()
            .ok_or_else(|| AppError::auth_failed("synthetic: no access token loaded"))?;
        Ok(TokenData {
            access_token,
            refresh_token: api.refresh_token(),
            expires_at: api.expires_at(),
            scope: Some("all".into()),
        })
    }
}

impl Default for SyntheticModule {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AuthModule for SyntheticModule {
    fn name(&self) -> &'static str {
        "synthetic"
    }

    fn display_name(&self) -> &'static str {
        "Synthetic"
    }

    fn oauth_config(&self) -> &ModuleOAuthConfig {
        &self.config
    }

    fn authorization_requirements(&self) -> AppResult<AuthorizationRequirements> {
        oauth2_requirements(self.name(), &self.config, " ")
    }

    async fn get_token(&self, api: &ApiClient, params: &CallbackParams) -> AppResult<TokenData> {
        if params.code.is_empty() {
            return Err(AppError::token_exchange("synthetic: empty authorization code"));
        }
        let token = TokenData {
            access_token: format!("synthetic-access-{}", params.code),
            refresh_token: Some(format!("synthetic-refresh-{}", params.code)),
            expires_at: Some(Utc::now() + Duration::hours(1)),
            scope: Some("all".into()),
        };
        api.set_tokens(&token);
        api.notify(TokenEvent::Refreshed(token.clone()));
        Ok(token)
    }

    async fn get_entity_details(
        &self,
        _api: &ApiClient,
        _params: &CallbackParams,
        _token: &TokenData,
        user_id: Option<Uuid>,
    ) -> AppResult<EntityDetails> {
        let mut identifiers = JsonMap::new();
        identifiers.insert("external_id".into(), self.account.external_id.clone().into());
        if let Some(user_id) = user_id {
            identifiers.insert("user_id".into(), user_id.to_string().into());
        }
        let mut details = JsonMap::new();
        details.insert("name".into(), self.account.name.clone().into());
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
        let token = Self::current_token(api)?;

        let mut identifiers = JsonMap::new();
        if let Some(user_id) = user_id {
            identifiers.insert("user_id".into(), user_id.to_string().into());
        } else {
            identifiers.insert("account_id".into(), self.account.external_id.clone().into());
        }
        let mut details = JsonMap::new();
        details.insert("account_id".into(), self.account.external_id.clone().into());

        Ok(CredentialDetails {
            identifiers,
            details,
            token,
        })
    }

    async fn test_auth(&self, api: &ApiClient) -> AppResult<()> {
        let access_token = api
            .access_token()
            .ok_or_else(|| AppError::auth_failed("synthetic: no access token loaded"))?;

        if !Self::token_rejected(&access_token) {
            return Ok(());
        }

        // Access token rejected; attempt the refresh grant
        let refresh_token = api.refresh_token();
        match refresh_token {
            Some(refresh) if !Self::token_rejected(&refresh) => {
                let token = TokenData {
                    access_token: format!("{refresh}:rotated-access"),
                    refresh_token: Some(format!("{refresh}:rotated")),
                    expires_at: Some(Utc::now() + Duration::hours(1)),
                    scope: Some("all".into()),
                };
                api.set_tokens(&token);
                api.notify(TokenEvent::Refreshed(token));
                Ok(())
            }
            _ => {
                api.notify(TokenEvent::InvalidAuth);
                Err(AppError::auth_failed("synthetic: error refreshing credential"))
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::modules::events::token_event_channel;
    use crate::modules::ApiParams;

    fn api(params: ApiParams) -> (ApiClient, crate::modules::events::TokenEventReceiver) {
        let (tx, rx) = token_event_channel();
        let module = SyntheticModule::new();
        (
            ApiClient::new("synthetic", module.config.clone(), params, tx),
            rx,
        )
    }

    #[tokio::test]
    async fn any_code_exchanges_for_tokens() {
        let module = SyntheticModule::new();
        let (client, mut rx) = api(ApiParams::default());
        let token = module
            .get_token(&client, &CallbackParams::from_code("abc"))
            .await
            .unwrap();
        assert_eq!(token.access_token, "synthetic-access-abc");
        assert!(matches!(rx.try_recv(), Ok(TokenEvent::Refreshed(_))));
    }

    #[tokio::test]
    async fn rejected_access_with_good_refresh_rotates() {
        let module = SyntheticModule::new();
        let (client, mut rx) = api(ApiParams {
            access_token: Some("nolongervalid".into()),
            refresh_token: Some("still-good".into()),
            expires_at: None,
        });
        module.test_auth(&client).await.unwrap();
        assert_eq!(
            client.access_token().as_deref(),
            Some("still-good:rotated-access")
        );
        assert!(matches!(rx.try_recv(), Ok(TokenEvent::Refreshed(_))));
    }

    #[tokio::test]
    async fn rejected_refresh_publishes_invalid_auth() {
        let module = SyntheticModule::new();
        let (client, mut rx) = api(ApiParams {
            access_token: Some("nolongervalid".into()),
            refresh_token: Some("nolongervalideither".into()),
            expires_at: None,
        });
        let err = module.test_auth(&client).await.unwrap_err();
        assert!(err.is_auth_failure());
        assert!(matches!(rx.try_recv(), Ok(TokenEvent::InvalidAuth)));
    }
}
