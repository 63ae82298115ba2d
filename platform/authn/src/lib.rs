//! Staff authentication: HS256 bearer tokens carrying a user id and roles.

use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum AuthnError {
    #[error("token rejected: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),
    #[error("unknown role {0}")]
    UnknownRole(String),
}

#[derive(Clone)]
pub struct AuthConfig {
    secret: Vec<u8>,
    pub token_ttl_minutes: i64,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("secret", &"<redacted>")
            .field("token_ttl_minutes", &self.token_ttl_minutes)
            .finish()
    }
}

impl AuthConfig {
    pub fn new(secret: impl Into<Vec<u8>>, token_ttl_minutes: i64) -> Self {
        Self {
            secret: secret.into(),
            token_ttl_minutes,
        }
    }

    fn encoding_key(&self) -> EncodingKey {
        EncodingKey::from_secret(&self.secret)
    }

    fn decoding_key(&self) -> DecodingKey {
        DecodingKey::from_secret(&self.secret)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClaims {
    pub sub: Uuid,
    pub roles: Vec<String>,
    pub exp: usize,
    pub iat: usize,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum UserRole {
    Owner,
    Admin,
    Staff,
    Viewer,
}

impl UserRole {
    pub fn as_str(self) -> &'static str {
        match self {
            UserRole::Owner => "OWNER",
            UserRole::Admin => "ADMIN",
            UserRole::Staff => "STAFF",
            UserRole::Viewer => "VIEWER",
        }
    }

    pub fn parse(value: &str) -> Result<Self, AuthnError> {
        match value.trim().to_ascii_uppercase().as_str() {
            "OWNER" => Ok(UserRole::Owner),
            "ADMIN" => Ok(UserRole::Admin),
            "STAFF" => Ok(UserRole::Staff),
            "VIEWER" => Ok(UserRole::Viewer),
            _ => Err(AuthnError::UnknownRole(value.to_string())),
        }
    }

    pub fn level(self) -> u8 {
        match self {
            UserRole::Owner => 4,
            UserRole::Admin => 3,
            UserRole::Staff => 2,
            UserRole::Viewer => 1,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub user_id: Uuid,
    pub roles: Vec<UserRole>,
}

impl CurrentUser {
    pub fn has_role(&self, role: UserRole) -> bool {
        self.roles.iter().any(|r| r.level() >= role.level())
    }

    pub fn highest_role(&self) -> Option<UserRole> {
        self.roles.iter().copied().max_by_key(|r| r.level())
    }
}

pub fn issue_token(
    user_id: Uuid,
    roles: &[UserRole],
    config: &AuthConfig,
) -> Result<String, AuthnError> {
    let now = Utc::now();
    let exp = now
        .checked_add_signed(Duration::minutes(config.token_ttl_minutes))
        .unwrap_or(now)
        .timestamp() as usize;
    let claims = SessionClaims {
        sub: user_id,
        roles: roles.iter().map(|r| r.as_str().to_string()).collect(),
        exp,
        iat: now.timestamp() as usize,
    };
    Ok(jsonwebtoken::encode(
        &Header::default(),
        &claims,
        &config.encoding_key(),
    )?)
}

pub fn decode_token(token: &str, config: &AuthConfig) -> Result<SessionClaims, AuthnError> {
    let data =
        jsonwebtoken::decode::<SessionClaims>(token, &config.decoding_key(), &Validation::default())?;
    Ok(data.claims)
}

/// Validate a bearer token and resolve the caller. Unknown role names are
/// dropped rather than failing the whole token.
pub fn authenticate(token: &str, config: &AuthConfig) -> Result<CurrentUser, AuthnError> {
    let claims = decode_token(token, config)?;
    let roles = claims
        .roles
        .iter()
        .filter_map(|raw| UserRole::parse(raw).ok())
        .collect();
    Ok(CurrentUser {
        user_id: claims.sub,
        roles,
    })
}
