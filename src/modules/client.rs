// ABOUTME: Generic authenticated HTTP client handed to vendor modules
// ABOUTME: Holds merged env and credential parameters plus the token event channel
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Tether Labs

use crate::config::ModuleOAuthConfig;
use crate::errors::{AppError, AppResult};
use crate::models::TokenData;
use crate::modules::events::{TokenEvent, TokenEventSender};
use crate::modules::ApiParams;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use std::sync::{Mutex, PoisonError};
use tracing::warn;

/// Authenticated HTTP client bound to one vendor module instance
///
/// Constructed by the manager from static environment config merged with
/// credential-derived parameters. Token state lives behind a mutex so a
/// mid-request refresh can swap tokens without `&mut` plumbing; execution is
/// single-request cooperative, so there is no contention.
pub struct ApiClient {
    module: &'static str,
    config: ModuleOAuthConfig,
    http: reqwest::Client,
    tokens: Mutex<ApiParams>,
    events: TokenEventSender,
}

impl ApiClient {
    /// Create a client from config, initial token parameters, and an event sender
    #[must_use]
    pub fn new(
        module: &'static str,
        config: ModuleOAuthConfig,
        params: ApiParams,
        events: TokenEventSender,
    ) -> Self {
        Self {
            module,
            config,
            http: reqwest::Client::new(),
            tokens: Mutex::new(params),
            events,
        }
    }

    /// Vendor module name this client serves
    #[must_use]
    pub fn module(&self) -> &'static str {
        self.module
    }

    /// Static OAuth configuration for the module
    #[must_use]
    pub fn config(&self) -> &ModuleOAuthConfig {
        &self.config
    }

    /// Underlying HTTP client for vendor-specific requests
    #[must_use]
    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    /// Current access token, if one is loaded
    #[must_use]
    pub fn access_token(&self) -> Option<String> {
        self.lock_tokens().access_token.clone()
    }

    /// Current refresh token, if one is loaded
    #[must_use]
    pub fn refresh_token(&self) -> Option<String> {
        self.lock_tokens().refresh_token.clone()
    }

    /// Current token expiry, if known
    #[must_use]
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.lock_tokens().expires_at
    }

    /// Replace the loaded token state with fresh material
    pub fn set_tokens(&self, token: &TokenData) {
        let mut tokens = self.lock_tokens();
        tokens.access_token = Some(token.access_token.clone());
        tokens.refresh_token = token
            .refresh_token
            .clone()
            .or_else(|| tokens.refresh_token.clone());
        tokens.expires_at = token.expires_at;
    }

    /// Drop all loaded token state
    pub fn clear_tokens(&self) {
        *self.lock_tokens() = ApiParams::default();
    }

    /// Publish a token-state event to the manager
    pub fn notify(&self, event: TokenEvent) {
        if self.events.send(event).is_err() {
            warn!(module = self.module, "token event dropped: receiver gone");
        }
    }

    /// GET a JSON resource with bearer auth
    ///
    /// Relative paths are resolved against the module's API base URL. A 401
    /// is surfaced as an auth failure so callers can attempt a refresh.
    ///
    /// # Errors
    ///
    /// Returns an error if no access token is loaded, the request fails, or
    /// the vendor responds with a non-success status.
    pub async fn get_json(&self, path: &str) -> AppResult<serde_json::Value> {
        let access_token = self
            .access_token()
            .ok_or_else(|| AppError::auth_failed(format!("{}: no access token loaded", self.module)))?;

        let url = if path.starts_with("http") {
            path.to_owned()
        } else {
            format!("{}{path}", self.config.api_base_url)
        };

        let response = self
            .http
            .get(&url)
            .bearer_auth(access_token)
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(AppError::auth_failed(format!(
                "{} returned 401 for {path}",
                self.module
            )));
        }
        if !status.is_success() {
            return Err(AppError::Http(format!(
                "{} returned {status} for {path}",
                self.module
            )));
        }

        Ok(response.json().await?)
    }

    /// POST a form to a token endpoint and parse the response
    ///
    /// # Errors
    ///
    /// Returns a token-exchange error on any non-success status or an
    /// unparseable body.
    pub async fn post_token_form<T: DeserializeOwned>(
        &self,
        url: &str,
        form: &[(&str, &str)],
    ) -> AppResult<T> {
        let response = self.http.post(url).form(form).send().await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(AppError::token_exchange(format!(
                "{} token endpoint returned {status}: {body}",
                self.module
            )));
        }

        serde_json::from_str(&body)
            .map_err(|e| AppError::token_exchange(format!("{}: parse error: {e}", self.module)))
    }

    fn lock_tokens(&self) -> std::sync::MutexGuard<'_, ApiParams> {
        self.tokens.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::modules::events::token_event_channel;

    fn client() -> (ApiClient, crate::modules::events::TokenEventReceiver) {
        let (tx, rx) = token_event_channel();
        (
            ApiClient::new(
                "synthetic",
                ModuleOAuthConfig::default(),
                ApiParams::default(),
                tx,
            ),
            rx,
        )
    }

    #[test]
    fn set_tokens_keeps_prior_refresh_token() {
        let (api, _rx) = client();
        api.set_tokens(&TokenData {
            access_token: "a1".into(),
            refresh_token: Some("r1".into()),
            expires_at: None,
            scope: None,
        });
        // Refresh responses often omit the refresh token; keep the old one
        api.set_tokens(&TokenData {
            access_token: "a2".into(),
            refresh_token: None,
            expires_at: None,
            scope: None,
        });
        assert_eq!(api.access_token().as_deref(), Some("a2"));
        assert_eq!(api.refresh_token().as_deref(), Some("r1"));
    }

    #[test]
    fn clear_tokens_drops_everything() {
        let (api, _rx) = client();
        api.set_tokens(&TokenData {
            access_token: "a1".into(),
            refresh_token: Some("r1".into()),
            expires_at: None,
            scope: None,
        });
        api.clear_tokens();
        assert!(api.access_token().is_none());
        assert!(api.refresh_token().is_none());
    }

    #[test]
    fn notify_publishes_to_the_channel() {
        let (api, mut rx) = client();
        api.notify(TokenEvent::Deauthorized);
        assert!(matches!(rx.try_recv(), Ok(TokenEvent::Deauthorized)));
    }
}
