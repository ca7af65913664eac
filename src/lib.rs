// ABOUTME: Main library entry point for the Tether integration module framework
// ABOUTME: Wires credential persistence, vendor modules, and the authorization lifecycle manager
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Tether Labs

#![deny(unsafe_code)]

//! # Tether Integrations
//!
//! A multi-tenant integration module framework. Each module wraps one
//! third-party SaaS API, manages its OAuth credential lifecycle, and persists
//! normalized Credential/Entity records in SQLite.
//!
//! ## Architecture
//!
//! - **Models**: normalized Credential and Entity records with vendor-specific
//!   extension fields attached by composition
//! - **Database**: SQLite persistence with AES-256-GCM token encryption at rest
//! - **Modules**: the per-vendor SPI ([`modules::AuthModule`]) plus concrete
//!   bindings (Outreach, RollWorks, and an offline synthetic vendor)
//! - **Auth**: the authorization lifecycle manager ([`auth::AuthManager`])
//!   coordinating credential creation, token refresh, entity resolution, and
//!   notification-driven invalidation
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tether_integrations::auth::AuthManager;
//! use tether_integrations::database::Database;
//! use tether_integrations::errors::AppResult;
//! use tether_integrations::models::InstanceParams;
//! use tether_integrations::modules::registry::ModuleRegistry;
//!
//! #[tokio::main]
//! async fn main() -> AppResult<()> {
//!     let database = Database::new("sqlite:tether.db", vec![0u8; 32]).await?;
//!     let registry = ModuleRegistry::new();
//!     let module = registry.require("outreach")?;
//!
//!     let manager = AuthManager::get_instance(
//!         database,
//!         module,
//!         InstanceParams::for_user(uuid::Uuid::new_v4()),
//!     )
//!     .await?;
//!
//!     let requirements = manager.authorization_requirements()?;
//!     println!("redirect to {}", requirements.url);
//!     Ok(())
//! }
//! ```

/// Authorization lifecycle manager
pub mod auth;

/// Environment-driven module configuration
pub mod config;

/// SQLite persistence for credential and entity records
pub mod database;

/// Unified error types
pub mod errors;

/// Structured logging setup
pub mod logging;

/// Normalized record types and token encryption
pub mod models;

/// Vendor module SPI, registry, and concrete bindings
pub mod modules;

/// Test data builders and the mock integration harness
pub mod test_utils;
