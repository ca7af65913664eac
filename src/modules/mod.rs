// ABOUTME: Vendor module SPI defining the contract every integration must implement
// ABOUTME: Organizes the generic API client, token events, registry, and concrete bindings
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Tether Labs

//! # Vendor Module SPI
//!
//! The contract a vendor integration implements to plug into the framework.
//! Where the original design raised "not defined in the class" errors at
//! runtime for missing overrides, [`AuthModule`] requires the auth methods at
//! compile time; a vendor that cannot implement one does not build.

pub mod client;
pub mod events;
pub mod registry;

#[cfg(feature = "module-outreach")]
pub mod outreach;
#[cfg(feature = "module-rollworks")]
pub mod rollworks;
#[cfg(feature = "module-synthetic")]
pub mod synthetic;

use crate::config::ModuleOAuthConfig;
use crate::errors::{AppError, AppResult};
use crate::models::{
    AuthType, AuthorizationRequirements, CallbackParams, Credential, CredentialDetails,
    EntityDetails, TokenData,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use client::ApiClient;
use uuid::Uuid;

/// Token parameters merged into an [`ApiClient`] at construction time
#[derive(Debug, Clone, Default)]
pub struct ApiParams {
    /// Access token loaded from a credential
    pub access_token: Option<String>,
    /// Refresh token loaded from a credential
    pub refresh_token: Option<String>,
    /// Token expiry loaded from a credential
    pub expires_at: Option<DateTime<Utc>>,
}

/// Contract implemented by every vendor integration module
///
/// Implementations that exchange or refresh tokens must publish
/// [`events::TokenEvent::Refreshed`] on the client so the manager persists
/// the new material; irrecoverable auth failures publish
/// [`events::TokenEvent::InvalidAuth`] before returning the error.
#[async_trait]
pub trait AuthModule: Send + Sync {
    /// Stable module name used for registry lookup and record tagging
    fn name(&self) -> &'static str;

    /// Human-readable vendor name
    fn display_name(&self) -> &'static str {
        self.name()
    }

    /// Static OAuth configuration for this module
    fn oauth_config(&self) -> &ModuleOAuthConfig;

    /// OAuth redirect descriptor for starting an authorization flow
    ///
    /// # Errors
    ///
    /// Returns a configuration error when required client settings are absent.
    fn authorization_requirements(&self) -> AppResult<AuthorizationRequirements>;

    /// Map a loaded credential onto client token parameters
    ///
    /// The default covers every bearer-token vendor; modules with extra
    /// connection material (org ids, instance URLs) override it.
    fn api_params_from_credential(&self, credential: Option<&Credential>) -> ApiParams {
        credential.map_or_else(ApiParams::default, |cred| ApiParams {
            access_token: Some(cred.access_token.clone()),
            refresh_token: cred.refresh_token.clone(),
            expires_at: cred.expires_at,
        })
    }

    /// Exchange an authorization callback for tokens
    async fn get_token(&self, api: &ApiClient, params: &CallbackParams) -> AppResult<TokenData>;

    /// Extract the external account identity reached by the authorization
    async fn get_entity_details(
        &self,
        api: &ApiClient,
        params: &CallbackParams,
        token: &TokenData,
        user_id: Option<Uuid>,
    ) -> AppResult<EntityDetails>;

    /// Extract the credential identity and current token material
    async fn get_credential_details(
        &self,
        api: &ApiClient,
        user_id: Option<Uuid>,
    ) -> AppResult<CredentialDetails>;

    /// Issue a cheap authenticated request to prove the credential works
    ///
    /// Implementations should attempt a token refresh on a 401 and publish
    /// the outcome as a token event before returning.
    async fn test_auth(&self, api: &ApiClient) -> AppResult<()>;
}

impl std::fmt::Debug for dyn AuthModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthModule")
            .field("name", &self.name())
            .finish()
    }
}

/// Build a standard OAuth2 authorization redirect URL
///
/// # Errors
///
/// Returns a configuration error if the module has no client id or redirect
/// URI configured.
pub fn build_authorization_url(
    module: &str,
    config: &ModuleOAuthConfig,
    scope_separator: &str,
    state: Option<&str>,
) -> AppResult<String> {
    let client_id = config
        .client_id
        .as_deref()
        .ok_or_else(|| AppError::config(format!("{module}: client_id not configured")))?;
    let redirect_uri = config
        .redirect_uri
        .as_deref()
        .ok_or_else(|| AppError::config(format!("{module}: redirect_uri not configured")))?;

    let mut url = format!(
        "{}?client_id={}&redirect_uri={}&response_type=code&scope={}",
        config.auth_url,
        urlencoding::encode(client_id),
        urlencoding::encode(redirect_uri),
        urlencoding::encode(&config.scope_string(scope_separator)),
    );
    if let Some(state) = state {
        url.push_str(&format!("&state={}", urlencoding::encode(state)));
    }
    Ok(url)
}

/// Standard OAuth2 requirements descriptor shared by the bundled modules
pub(crate) fn oauth2_requirements(
    module: &str,
    config: &ModuleOAuthConfig,
    scope_separator: &str,
) -> AppResult<AuthorizationRequirements> {
    Ok(AuthorizationRequirements {
        url: build_authorization_url(module, config, scope_separator, None)?,
        auth_type: AuthType::Oauth2,
        data: None,
    })
}
