// ABOUTME: OAuth configuration types for vendor module authentication
// ABOUTME: Loads client credentials, endpoint URLs, and scopes from the environment
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Tether Labs

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::env;
use tracing::{info, warn};

/// OAuth configuration for one vendor module
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ModuleOAuthConfig {
    /// OAuth client ID
    pub client_id: Option<String>,
    /// OAuth client secret
    pub client_secret: Option<String>,
    /// OAuth redirect URI
    pub redirect_uri: Option<String>,
    /// Authorization endpoint URL
    pub auth_url: String,
    /// Token endpoint URL
    pub token_url: String,
    /// Vendor API base URL
    pub api_base_url: String,
    /// Token revocation endpoint URL, when the vendor has one
    pub revoke_url: Option<String>,
    /// OAuth scopes to request
    pub scopes: Vec<String>,
    /// Enable this module
    pub enabled: bool,
}

impl ModuleOAuthConfig {
    /// Compute SHA-256 fingerprint of the client secret (first 8 hex chars)
    ///
    /// Allows comparing secrets in logs without exposing actual values.
    #[must_use]
    pub fn secret_fingerprint(&self) -> Option<String> {
        self.client_secret.as_ref().map(|secret| {
            let mut hasher = Sha256::new();
            hasher.update(secret.as_bytes());
            let result = hasher.finalize();
            format!("{result:x}").chars().take(8).collect()
        })
    }

    /// Validate client credentials and log diagnostics
    ///
    /// Returns true if the credentials appear usable for an OAuth flow.
    pub fn validate_and_log(&self, module_name: &str) -> bool {
        if !self.enabled {
            info!("OAuth module {module_name} is disabled");
            return true;
        }

        let client_id_ok = matches!(&self.client_id, Some(id) if !id.is_empty());
        if !client_id_ok {
            warn!("OAuth module {module_name}: client_id is missing or empty");
            return false;
        }

        let client_secret_ok = matches!(&self.client_secret, Some(secret) if !secret.is_empty());
        if !client_secret_ok {
            warn!("OAuth module {module_name}: client_secret is missing or empty");
            return false;
        }

        if let Some(fingerprint) = self.secret_fingerprint() {
            info!("OAuth module {module_name}: client secret fingerprint {fingerprint}");
        }
        true
    }

    /// Scopes joined the way the vendor expects them in a request
    #[must_use]
    pub fn scope_string(&self, separator: &str) -> String {
        self.scopes.join(separator)
    }
}

/// Static endpoint defaults for one vendor module
#[derive(Debug, Clone, Copy)]
pub struct ModuleEnvDefaults {
    /// Default authorization endpoint
    pub auth_url: &'static str,
    /// Default token endpoint
    pub token_url: &'static str,
    /// Default API base URL
    pub api_base_url: &'static str,
    /// Default revocation endpoint
    pub revoke_url: Option<&'static str>,
    /// Default scopes
    pub scopes: &'static [&'static str],
}

/// Load a module's OAuth configuration from environment variables
///
/// Environment variable format, with fallback to legacy unprefixed names:
///
/// ```text
/// export TETHER_OUTREACH_CLIENT_ID=your_client_id
/// export TETHER_OUTREACH_CLIENT_SECRET=your_secret
/// export TETHER_OUTREACH_REDIRECT_URI=https://app.example.com/callback/outreach
/// export TETHER_OUTREACH_SCOPES="users.read,accounts.read"
/// # Optional URL overrides
/// export TETHER_OUTREACH_AUTH_URL=https://custom.example.com/oauth/authorize
/// ```
#[must_use]
pub fn load_module_env_config(module: &str, defaults: &ModuleEnvDefaults) -> ModuleOAuthConfig {
    let module_upper = module.to_uppercase();

    // Client credentials fall back to legacy env vars for backward compatibility
    let client_id = env::var(format!("TETHER_{module_upper}_CLIENT_ID"))
        .or_else(|_| env::var(format!("{module_upper}_CLIENT_ID")))
        .ok();

    let client_secret = env::var(format!("TETHER_{module_upper}_CLIENT_SECRET"))
        .or_else(|_| env::var(format!("{module_upper}_CLIENT_SECRET")))
        .ok();

    let redirect_uri = env::var(format!("TETHER_{module_upper}_REDIRECT_URI"))
        .or_else(|_| env::var(format!("{module_upper}_REDIRECT_URI")))
        .ok();

    let auth_url = env::var(format!("TETHER_{module_upper}_AUTH_URL"))
        .unwrap_or_else(|_| defaults.auth_url.to_owned());

    let token_url = env::var(format!("TETHER_{module_upper}_TOKEN_URL"))
        .unwrap_or_else(|_| defaults.token_url.to_owned());

    let api_base_url = env::var(format!("TETHER_{module_upper}_API_BASE_URL"))
        .unwrap_or_else(|_| defaults.api_base_url.to_owned());

    let revoke_url = env::var(format!("TETHER_{module_upper}_REVOKE_URL"))
        .ok()
        .or_else(|| defaults.revoke_url.map(ToOwned::to_owned));

    let scopes = env::var(format!("TETHER_{module_upper}_SCOPES"))
        .ok()
        .map_or_else(
            || defaults.scopes.iter().map(|s| (*s).to_owned()).collect(),
            |raw| parse_scopes(&raw),
        );

    ModuleOAuthConfig {
        client_id,
        client_secret,
        redirect_uri,
        auth_url,
        token_url,
        api_base_url,
        revoke_url,
        scopes,
        enabled: true,
    }
}

/// Parse comma-separated scopes
#[must_use]
pub fn parse_scopes(scopes_str: &str) -> Vec<String> {
    scopes_str
        .split(',')
        .map(|s| s.trim().to_owned())
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    const DEFAULTS: ModuleEnvDefaults = ModuleEnvDefaults {
        auth_url: "https://vendor.example/oauth/authorize",
        token_url: "https://vendor.example/oauth/token",
        api_base_url: "https://vendor.example/api/v1",
        revoke_url: None,
        scopes: &["read"],
    };

    #[test]
    fn defaults_apply_when_env_is_empty() {
        let config = load_module_env_config("cfgtest_defaults", &DEFAULTS);
        assert!(config.client_id.is_none());
        assert_eq!(config.auth_url, DEFAULTS.auth_url);
        assert_eq!(config.scopes, vec!["read".to_owned()]);
        assert!(config.enabled);
    }

    #[test]
    fn prefixed_vars_win_over_defaults() {
        env::set_var("TETHER_CFGTEST_PREFIXED_CLIENT_ID", "abc123");
        env::set_var("TETHER_CFGTEST_PREFIXED_SCOPES", "users.read, accounts.read");
        let config = load_module_env_config("cfgtest_prefixed", &DEFAULTS);
        assert_eq!(config.client_id.as_deref(), Some("abc123"));
        assert_eq!(
            config.scopes,
            vec!["users.read".to_owned(), "accounts.read".to_owned()]
        );
        env::remove_var("TETHER_CFGTEST_PREFIXED_CLIENT_ID");
        env::remove_var("TETHER_CFGTEST_PREFIXED_SCOPES");
    }

    #[test]
    fn legacy_vars_are_honored() {
        env::set_var("CFGTEST_LEGACY_CLIENT_ID", "legacy-id");
        let config = load_module_env_config("cfgtest_legacy", &DEFAULTS);
        assert_eq!(config.client_id.as_deref(), Some("legacy-id"));
        env::remove_var("CFGTEST_LEGACY_CLIENT_ID");
    }

    #[test]
    fn fingerprint_is_stable_and_short() {
        let config = ModuleOAuthConfig {
            client_secret: Some("super-secret".into()),
            ..ModuleOAuthConfig::default()
        };
        let fp = config.secret_fingerprint().unwrap();
        assert_eq!(fp.len(), 8);
        assert_eq!(fp, config.secret_fingerprint().unwrap());
    }

    #[test]
    fn validation_flags_missing_credentials() {
        let config = ModuleOAuthConfig {
            enabled: true,
            ..ModuleOAuthConfig::default()
        };
        assert!(!config.validate_and_log("cfgtest_missing"));

        let config = ModuleOAuthConfig {
            enabled: true,
            client_id: Some("id".into()),
            client_secret: Some("secret".into()),
            ..ModuleOAuthConfig::default()
        };
        assert!(config.validate_and_log("cfgtest_present"));
    }

    #[test]
    fn empty_scope_segments_are_dropped() {
        assert_eq!(parse_scopes("a, ,b,"), vec!["a".to_owned(), "b".to_owned()]);
    }
}
