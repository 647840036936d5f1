//! Bearer-token issuance and verification (HS256 JWT).

use crate::errors::AuthError;
use crate::DEFAULT_TOKEN_TTL_SECS;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use shared_types::{Role, UserId};

/// JWT claims carried by every platform token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    /// User identity.
    pub sub: String,
    /// Platform role.
    pub role: Role,
    /// Expiry, seconds since epoch. Validated at decode time.
    pub exp: i64,
    /// Issued-at, seconds since epoch.
    pub iat: i64,
    /// 2-character school code from registration, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub school: Option<String>,
}

impl Claims {
    /// The user ID these claims identify.
    #[must_use]
    pub fn user_id(&self) -> UserId {
        UserId::from(self.sub.as_str())
    }
}

/// Issues and verifies platform tokens against one symmetric secret.
pub struct TokenAuthority {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
}

impl TokenAuthority {
    /// Build from the shared HS256 secret.
    #[must_use]
    pub fn new(secret: &[u8]) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.leeway = 0;
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            validation,
        }
    }

    /// Issue a token for `user_id` with the default lifetime.
    pub fn issue(&self, user_id: &UserId, role: Role) -> Result<String, AuthError> {
        self.issue_with_ttl(user_id, role, DEFAULT_TOKEN_TTL_SECS)
    }

    /// Issue a token carrying the user's school code.
    pub fn issue_for_school(
        &self,
        user_id: &UserId,
        role: Role,
        school: &str,
    ) -> Result<String, AuthError> {
        self.issue_claims(user_id, role, DEFAULT_TOKEN_TTL_SECS, Some(school.to_string()))
    }

    /// Issue a token with an explicit lifetime in seconds.
    pub fn issue_with_ttl(
        &self,
        user_id: &UserId,
        role: Role,
        ttl_secs: i64,
    ) -> Result<String, AuthError> {
        self.issue_claims(user_id, role, ttl_secs, None)
    }

    fn issue_claims(
        &self,
        user_id: &UserId,
        role: Role,
        ttl_secs: i64,
        school: Option<String>,
    ) -> Result<String, AuthError> {
        let now = Utc::now();
        let claims = Claims {
            sub: user_id.to_string(),
            role,
            exp: (now + Duration::seconds(ttl_secs)).timestamp(),
            iat: now.timestamp(),
            school,
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|_| AuthError::TokenInvalid)
    }

    /// Verify a token. Expired or unsigned tokens are rejected.
    pub fn verify(&self, token: &str) -> Result<Claims, AuthError> {
        decode::<Claims>(token, &self.decoding, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::TokenExpired,
                _ => AuthError::TokenInvalid,
            })
    }
}
