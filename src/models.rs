// ABOUTME: Normalized record types for credentials, entities, and authorization flows
// ABOUTME: Includes AES-256-GCM token encryption used by the persistence layer
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Tether Labs

//! # Data Models
//!
//! Normalized Credential and Entity records shared by every vendor module.
//! Vendor-specific fields are attached by composition: each record carries a
//! JSON `identifiers` map (the fields that key the record during upserts and
//! lookups) and a JSON `details` map (everything else the vendor reports).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::{AppError, AppResult};

/// Vendor-specific extension fields attached to a record
pub type JsonMap = serde_json::Map<String, serde_json::Value>;

/// Token material returned by a vendor token exchange or refresh
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenData {
    /// Plain text access token
    pub access_token: String,
    /// Plain text refresh token, when the vendor issues one
    pub refresh_token: Option<String>,
    /// When the access token expires, when the vendor reports it
    pub expires_at: Option<DateTime<Utc>>,
    /// Granted scopes as reported by the vendor
    pub scope: Option<String>,
}

/// A stored OAuth credential for one vendor module
///
/// Tokens are plain text on this in-memory type; the persistence layer
/// encrypts them before they touch disk and decrypts them on read.
#[derive(Debug, Clone)]
pub struct Credential {
    /// Unique identifier for this credential record
    pub id: Uuid,
    /// Account owner, when known
    pub user_id: Option<Uuid>,
    /// Vendor module name (outreach, rollworks, ...)
    pub module: String,
    /// Plain text access token
    pub access_token: String,
    /// Plain text refresh token
    pub refresh_token: Option<String>,
    /// When the access token expires
    pub expires_at: Option<DateTime<Utc>>,
    /// False once an irrecoverable auth failure has been observed
    pub auth_is_valid: bool,
    /// Vendor-specific identity fields used for upsert matching
    pub identifiers: JsonMap,
    /// Vendor-specific extension fields
    pub details: JsonMap,
    /// When this credential was first stored
    pub created_at: DateTime<Utc>,
    /// When this credential was last updated
    pub updated_at: DateTime<Utc>,
}

impl Credential {
    /// Create a new credential from freshly exchanged token material
    #[must_use]
    pub fn new(
        user_id: Option<Uuid>,
        module: String,
        token: &TokenData,
        identifiers: JsonMap,
        details: JsonMap,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id,
            module,
            access_token: token.access_token.clone(),
            refresh_token: token.refresh_token.clone(),
            expires_at: token.expires_at,
            auth_is_valid: true,
            identifiers,
            details,
            created_at: now,
            updated_at: now,
        }
    }

    /// Check if the access token is expired
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.expires_at
            .is_some_and(|expires_at| Utc::now() > expires_at)
    }

    /// Check if the token should be refreshed (expires within 5 minutes)
    #[must_use]
    pub fn needs_refresh(&self) -> bool {
        self.expires_at.is_some_and(|expires_at| {
            Utc::now() + chrono::Duration::minutes(5) >= expires_at
        })
    }
}

/// One external account linked to a credential
#[derive(Debug, Clone)]
pub struct Entity {
    /// Unique identifier for this entity record
    pub id: Uuid,
    /// Account owner, when known
    pub user_id: Option<Uuid>,
    /// Vendor module name
    pub module: String,
    /// Credential this entity authenticates with; cleared on deauthorization
    pub credential_id: Option<Uuid>,
    /// Vendor-side account identifier
    pub external_id: Option<String>,
    /// Human-readable account name
    pub name: Option<String>,
    /// Vendor-specific identity fields used for lookup matching
    pub identifiers: JsonMap,
    /// Vendor-specific extension fields
    pub details: JsonMap,
    /// When this entity was first stored
    pub created_at: DateTime<Utc>,
    /// When this entity was last updated
    pub updated_at: DateTime<Utc>,
}

impl Entity {
    /// Create a new entity owning the given credential
    #[must_use]
    pub fn new(
        user_id: Option<Uuid>,
        module: String,
        credential_id: Option<Uuid>,
        identifiers: JsonMap,
        details: JsonMap,
    ) -> Self {
        let external_id = string_field(&identifiers, "external_id")
            .or_else(|| string_field(&details, "external_id"));
        let name = string_field(&details, "name").or_else(|| string_field(&identifiers, "name"));
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id,
            module,
            credential_id,
            external_id,
            name,
            identifiers,
            details,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Non-internal entity fields exposed to listing callers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityReference {
    /// Entity record id
    pub id: Uuid,
    /// Vendor module name
    pub module_type: String,
    /// Vendor-side account identifier
    pub external_id: Option<String>,
    /// Human-readable account name
    pub name: Option<String>,
}

impl From<&Entity> for EntityReference {
    fn from(entity: &Entity) -> Self {
        Self {
            id: entity.id,
            module_type: entity.module.clone(),
            external_id: entity.external_id.clone(),
            name: entity.name.clone(),
        }
    }
}

/// Entity identity extracted by a vendor module after authorization
#[derive(Debug, Clone, Default)]
pub struct EntityDetails {
    /// Fields that key the entity during lookups
    pub identifiers: JsonMap,
    /// Everything else worth persisting
    pub details: JsonMap,
}

/// Credential material extracted by a vendor module
#[derive(Debug, Clone)]
pub struct CredentialDetails {
    /// Fields that key the credential during upsert matching
    pub identifiers: JsonMap,
    /// Everything else worth persisting
    pub details: JsonMap,
    /// Current token material
    pub token: TokenData,
}

/// Supported authorization schemes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthType {
    /// Three-legged OAuth 1.0a
    Oauth1,
    /// OAuth 2.0 authorization-code flow
    Oauth2,
    /// Static API key entered by the user
    ApiKey,
    /// Username/password basic auth
    Basic,
}

impl std::fmt::Display for AuthType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Oauth1 => "oauth1",
            Self::Oauth2 => "oauth2",
            Self::ApiKey => "api_key",
            Self::Basic => "basic",
        };
        f.write_str(name)
    }
}

/// OAuth redirect descriptor returned by `authorization_requirements`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorizationRequirements {
    /// Redirect URL for the authorization flow
    pub url: String,
    /// Authorization scheme
    pub auth_type: AuthType,
    /// Extra fields the front end must collect, when any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Vec<String>>,
}

impl AuthorizationRequirements {
    /// An `oauth1`/`oauth2` descriptor without a redirect URL is unusable
    #[must_use]
    pub fn is_valid(&self) -> bool {
        match self.auth_type {
            AuthType::Oauth1 | AuthType::Oauth2 => !self.url.is_empty(),
            AuthType::ApiKey | AuthType::Basic => true,
        }
    }
}

/// OAuth callback payload forwarded to `process_authorization_callback`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CallbackParams {
    /// Authorization code from the vendor redirect
    pub code: String,
    /// Opaque state parameter round-tripped through the flow
    pub state: Option<String>,
    /// Any additional vendor-specific callback fields
    #[serde(default)]
    pub extra: JsonMap,
}

impl CallbackParams {
    /// Build params from a bare authorization code
    #[must_use]
    pub fn from_code(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            state: None,
            extra: JsonMap::new(),
        }
    }
}

/// Result of a completed authorization callback
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorizationOutcome {
    /// Persisted credential record id
    pub credential_id: Uuid,
    /// Persisted entity record id
    pub entity_id: Uuid,
    /// Vendor module name
    pub module_type: String,
}

/// Lookup parameters for [`crate::auth::AuthManager::get_instance`]
#[derive(Debug, Clone, Default)]
pub struct InstanceParams {
    /// Account owner for the instance
    pub user_id: Option<Uuid>,
    /// Load this entity (and its credential)
    pub entity_id: Option<Uuid>,
    /// Load this credential directly
    pub credential_id: Option<Uuid>,
}

impl InstanceParams {
    /// Instance bound to a user with no pre-existing records
    #[must_use]
    pub fn for_user(user_id: Uuid) -> Self {
        Self {
            user_id: Some(user_id),
            ..Self::default()
        }
    }

    /// Instance loading an entity and its credential
    #[must_use]
    pub fn for_entity(user_id: Uuid, entity_id: Uuid) -> Self {
        Self {
            user_id: Some(user_id),
            entity_id: Some(entity_id),
            credential_id: None,
        }
    }

    /// Instance loading a credential directly
    #[must_use]
    pub fn for_credential(user_id: Uuid, credential_id: Uuid) -> Self {
        Self {
            user_id: Some(user_id),
            entity_id: None,
            credential_id: Some(credential_id),
        }
    }
}

/// Extract a string field from a JSON map
fn string_field(map: &JsonMap, key: &str) -> Option<String> {
    map.get(key).and_then(|v| v.as_str()).map(ToOwned::to_owned)
}

/// Encrypted token pair as stored at rest
///
/// Tokens are encrypted with AES-256-GCM. Each ciphertext has its 12-byte
/// nonce prepended and is base64 encoded: `[nonce][ciphertext+tag]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncryptedToken {
    /// Encrypted access token
    pub access_token: String,
    /// Encrypted refresh token, when present
    pub refresh_token: Option<String>,
}

/// Decrypted token pair, never persisted
#[derive(Debug, Clone)]
pub struct DecryptedToken {
    /// Plain text access token
    pub access_token: String,
    /// Plain text refresh token
    pub refresh_token: Option<String>,
}

impl EncryptedToken {
    /// Encrypt a token pair, each with an independent nonce
    ///
    /// # Errors
    ///
    /// Returns an error if the encryption key is not 32 bytes or sealing fails.
    pub fn new(
        access_token: &str,
        refresh_token: Option<&str>,
        encryption_key: &[u8],
    ) -> AppResult<Self> {
        Ok(Self {
            access_token: seal(access_token, encryption_key)?,
            refresh_token: refresh_token
                .map(|token| seal(token, encryption_key))
                .transpose()?,
        })
    }

    /// Decrypt the token pair for use
    ///
    /// # Errors
    ///
    /// Returns an error if decryption fails, a nonce is malformed, or the
    /// encryption key does not match.
    pub fn decrypt(&self, encryption_key: &[u8]) -> AppResult<DecryptedToken> {
        Ok(DecryptedToken {
            access_token: open(&self.access_token, encryption_key)?,
            refresh_token: self
                .refresh_token
                .as_deref()
                .map(|token| open(token, encryption_key))
                .transpose()?,
        })
    }
}

/// Encrypt one value with a fresh nonce prepended to the ciphertext
fn seal(plaintext: &str, encryption_key: &[u8]) -> AppResult<String> {
    use base64::{engine::general_purpose, Engine as _};
    use ring::aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM};
    use ring::rand::{SecureRandom, SystemRandom};

    let rng = SystemRandom::new();
    let mut nonce_bytes = [0u8; 12];
    rng.fill(&mut nonce_bytes)?;
    let nonce = Nonce::assume_unique_for_key(nonce_bytes);

    let unbound_key = UnboundKey::new(&AES_256_GCM, encryption_key)?;
    let key = LessSafeKey::new(unbound_key);

    let mut data = plaintext.as_bytes().to_vec();
    key.seal_in_place_append_tag(nonce, Aad::empty(), &mut data)?;

    let mut combined = nonce_bytes.to_vec();
    combined.extend(data);
    Ok(general_purpose::STANDARD.encode(combined))
}

/// Decrypt one value, extracting the nonce from the prepended bytes
fn open(ciphertext: &str, encryption_key: &[u8]) -> AppResult<String> {
    use base64::{engine::general_purpose, Engine as _};
    use ring::aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM};

    let combined = general_purpose::STANDARD.decode(ciphertext)?;
    if combined.len() < 12 {
        return Err(AppError::Crypto("Ciphertext too short".into()));
    }

    let (nonce_bytes, data) = combined.split_at(12);
    let nonce_array: [u8; 12] = nonce_bytes
        .try_into()
        .map_err(|_| AppError::Crypto("Malformed nonce".into()))?;
    let nonce = Nonce::assume_unique_for_key(nonce_array);

    let unbound_key = UnboundKey::new(&AES_256_GCM, encryption_key)?;
    let key = LessSafeKey::new(unbound_key);

    let mut buffer = data.to_vec();
    let plaintext = key.open_in_place(nonce, Aad::empty(), &mut buffer)?;
    String::from_utf8(plaintext.to_vec())
        .map_err(|e| AppError::Crypto(format!("Invalid UTF-8 in decrypted token: {e}")))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn key() -> Vec<u8> {
        vec![7u8; 32]
    }

    #[test]
    fn token_pair_round_trips() {
        let encrypted =
            EncryptedToken::new("access-123", Some("refresh-456"), &key()).unwrap();
        assert_ne!(encrypted.access_token, "access-123");

        let decrypted = encrypted.decrypt(&key()).unwrap();
        assert_eq!(decrypted.access_token, "access-123");
        assert_eq!(decrypted.refresh_token.as_deref(), Some("refresh-456"));
    }

    #[test]
    fn missing_refresh_token_stays_absent() {
        let encrypted = EncryptedToken::new("access-only", None, &key()).unwrap();
        assert!(encrypted.refresh_token.is_none());
        let decrypted = encrypted.decrypt(&key()).unwrap();
        assert!(decrypted.refresh_token.is_none());
    }

    #[test]
    fn wrong_key_fails_to_decrypt() {
        let encrypted = EncryptedToken::new("access", None, &key()).unwrap();
        let result = encrypted.decrypt(&vec![9u8; 32]);
        assert!(result.is_err());
    }

    #[test]
    fn independent_nonces_per_value() {
        let a = seal("same-token", &key()).unwrap();
        let b = seal("same-token", &key()).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn new_credential_defaults_to_valid_auth() {
        let token = TokenData {
            access_token: "at".into(),
            refresh_token: None,
            expires_at: None,
            scope: None,
        };
        let credential =
            Credential::new(None, "synthetic".into(), &token, JsonMap::new(), JsonMap::new());
        assert!(credential.auth_is_valid);
        assert!(!credential.is_expired());
    }

    #[test]
    fn expired_token_is_reported() {
        let token = TokenData {
            access_token: "at".into(),
            refresh_token: None,
            expires_at: Some(Utc::now() - chrono::Duration::hours(1)),
            scope: None,
        };
        let credential =
            Credential::new(None, "synthetic".into(), &token, JsonMap::new(), JsonMap::new());
        assert!(credential.is_expired());
        assert!(credential.needs_refresh());
    }

    #[test]
    fn entity_promotes_known_fields_from_maps() {
        let mut identifiers = JsonMap::new();
        identifiers.insert("external_id".into(), "org-42".into());
        let mut details = JsonMap::new();
        details.insert("name".into(), "Acme".into());

        let entity = Entity::new(None, "outreach".into(), None, identifiers, details);
        assert_eq!(entity.external_id.as_deref(), Some("org-42"));
        assert_eq!(entity.name.as_deref(), Some("Acme"));
    }

    #[test]
    fn oauth_requirements_need_a_url() {
        let requirements = AuthorizationRequirements {
            url: String::new(),
            auth_type: AuthType::Oauth2,
            data: None,
        };
        assert!(!requirements.is_valid());

        let requirements = AuthorizationRequirements {
            url: "https://vendor.example/authorize".into(),
            auth_type: AuthType::Oauth2,
            data: None,
        };
        assert!(requirements.is_valid());
    }
}
