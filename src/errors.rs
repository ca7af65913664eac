// ABOUTME: Unified error handling for the integration framework
// ABOUTME: Defines the AppError taxonomy shared by persistence, modules, and the auth manager
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Tether Labs

//! # Unified Error Handling
//!
//! Central error taxonomy for the crate. Three classes matter to callers:
//! identity-ambiguity errors ([`AppError::AmbiguousIdentity`]) are fatal and
//! never mutate state; auth failures ([`AppError::AuthFailed`],
//! [`AppError::TokenExchangeFailed`]) are caught by the manager and converted
//! into persisted credential state; everything else is surfaced as-is.

use thiserror::Error;

/// Result type alias using [`AppError`]
pub type AppResult<T> = Result<T, AppError>;

/// Application error type covering all library operations
#[derive(Debug, Error)]
pub enum AppError {
    /// A referenced record id did not resolve
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Multiple records matched supposedly-unique identifiers
    #[error("Multiple records found with the same identifiers: {0}")]
    AmbiguousIdentity(String),

    /// Requested module is not registered
    #[error("Module not supported: {0}")]
    UnsupportedModule(String),

    /// Authenticated call was rejected and could not be recovered by refresh
    #[error("Authentication failed: {0}")]
    AuthFailed(String),

    /// OAuth code or refresh-token exchange failed
    #[error("Token exchange failed: {0}")]
    TokenExchangeFailed(String),

    /// Database operation failed
    #[error("Database error: {0}")]
    Database(String),

    /// Configuration is missing or invalid
    #[error("Configuration error: {0}")]
    Config(String),

    /// Caller-provided input failed validation
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// JSON serialization or deserialization failed
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Token encryption or decryption failed
    #[error("Encryption error: {0}")]
    Crypto(String),

    /// HTTP transport failure talking to a vendor API
    #[error("HTTP error: {0}")]
    Http(String),

    /// Invariant violation inside the library
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Create a not-found error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create an identity-ambiguity error
    pub fn ambiguous_identity(msg: impl Into<String>) -> Self {
        Self::AmbiguousIdentity(msg.into())
    }

    /// Create an auth-failure error
    pub fn auth_failed(msg: impl Into<String>) -> Self {
        Self::AuthFailed(msg.into())
    }

    /// Create a token-exchange error
    pub fn token_exchange(msg: impl Into<String>) -> Self {
        Self::TokenExchangeFailed(msg.into())
    }

    /// Create a database error
    pub fn database(msg: impl Into<String>) -> Self {
        Self::Database(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an invalid-input error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Whether this error belongs to the auth-failure class that the manager
    /// converts into persisted `auth_is_valid = false` state
    #[must_use]
    pub const fn is_auth_failure(&self) -> bool {
        matches!(self, Self::AuthFailed(_) | Self::TokenExchangeFailed(_))
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        Self::Database(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        Self::Http(err.to_string())
    }
}

impl From<ring::error::Unspecified> for AppError {
    fn from(_: ring::error::Unspecified) -> Self {
        Self::Crypto("AEAD operation failed".into())
    }
}

impl From<base64::DecodeError> for AppError {
    fn from(err: base64::DecodeError) -> Self {
        Self::Crypto(format!("Base64 decode failed: {err}"))
    }
}

impl From<uuid::Error> for AppError {
    fn from(err: uuid::Error) -> Self {
        Self::InvalidInput(format!("Invalid UUID: {err}"))
    }
}
