// ABOUTME: Configuration module for environment-driven settings
// ABOUTME: Centralizes OAuth module configuration loading
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Tether Labs

//! Configuration management

/// OAuth configuration per vendor module
pub mod oauth;

pub use oauth::{load_module_env_config, ModuleEnvDefaults, ModuleOAuthConfig};
