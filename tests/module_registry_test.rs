// ABOUTME: Module registry and SPI contract tests
// ABOUTME: Covers builtin registration, lookup failures, and authorization descriptors
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::missing_panics_doc)]

use std::sync::Arc;
use tether_integrations::config::ModuleOAuthConfig;
use tether_integrations::errors::AppError;
use tether_integrations::models::AuthType;
use tether_integrations::modules::outreach::OutreachModule;
use tether_integrations::modules::registry::ModuleRegistry;
use tether_integrations::modules::synthetic::{SyntheticAccount, SyntheticModule};
use tether_integrations::modules::AuthModule;

#[test]
fn registry_registers_builtin_modules() {
    let registry = ModuleRegistry::new();
    let names = registry.module_names();
    assert_eq!(names, vec!["outreach", "rollworks", "synthetic"]);
}

#[test]
fn unknown_module_lookup_is_unsupported() {
    let registry = ModuleRegistry::new();
    assert!(registry.get("hubspot").is_none());
    let err = registry.require("hubspot").unwrap_err();
    assert!(matches!(err, AppError::UnsupportedModule(_)));
}

#[test]
fn custom_module_can_be_registered() {
    let mut registry = ModuleRegistry::empty();
    assert!(registry.module_names().is_empty());

    registry.register(Arc::new(SyntheticModule::with_account(SyntheticAccount {
        external_id: "acct-77".into(),
        name: "Custom".into(),
    })));
    assert_eq!(registry.module_names(), vec!["synthetic"]);
    assert!(registry.require("synthetic").is_ok());
}

#[test]
fn synthetic_requirements_are_valid_oauth2() {
    let registry = ModuleRegistry::new();
    let module = registry.require("synthetic").unwrap();

    let requirements = module.authorization_requirements().unwrap();
    assert_eq!(requirements.auth_type, AuthType::Oauth2);
    assert!(requirements.is_valid());
    assert!(requirements.url.contains("client_id=synthetic-client"));
}

#[test]
fn outreach_requirements_reflect_explicit_config() {
    let module = OutreachModule::with_config(ModuleOAuthConfig {
        client_id: Some("outreach-client".into()),
        client_secret: Some("outreach-secret".into()),
        redirect_uri: Some("https://app.example.com/callback/outreach".into()),
        auth_url: "https://api.outreach.io/oauth/authorize".into(),
        token_url: "https://api.outreach.io/oauth/token".into(),
        api_base_url: "https://api.outreach.io/api/v2".into(),
        revoke_url: None,
        scopes: vec!["users.read".into(), "accounts.read".into()],
        enabled: true,
    });

    let requirements = module.authorization_requirements().unwrap();
    assert!(requirements
        .url
        .starts_with("https://api.outreach.io/oauth/authorize?client_id=outreach-client"));
    assert!(requirements.url.contains("scope=users.read%20accounts.read"));
    assert!(requirements.is_valid());
}

#[test]
fn registry_replaces_modules_registered_under_the_same_name() {
    let mut registry = ModuleRegistry::empty();
    registry.register(Arc::new(SyntheticModule::new()));
    registry.register(Arc::new(SyntheticModule::with_account(SyntheticAccount {
        external_id: "acct-2".into(),
        name: "Second".into(),
    })));
    assert_eq!(registry.module_names().len(), 1);
}
