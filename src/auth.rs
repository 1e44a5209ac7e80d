//! JWT verification and request extractors.
//!
//! Identity is delegated to the auth provider; this service only verifies
//! HS256 bearer tokens signed with the shared secret and trusts the `sub`
//! claim as the account id.

use std::sync::Arc;

use axum::{extract::FromRequestParts, http::header, http::request::Parts};
use axum_extra::headers::{authorization::Bearer, Authorization, HeaderMapExt};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::{
    error::{Error, Result},
    AppState,
};

/// Token lifetime for locally issued tokens.
const TOKEN_TTL_HOURS: i64 = 24;

/// JWT claims carried by a bearer token.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Account id (auth provider's user id).
    pub sub: String,
    /// Expiration time (unix seconds).
    pub exp: i64,
    /// Issued-at time (unix seconds).
    pub iat: i64,
}

/// Generate a signed token for an account id.
///
/// # Errors
///    - Returns `Error::Jwt` if signing fails.
pub fn generate_token(account_id: &str, secret: &str) -> Result<String> {
    let now = Utc::now();
    let claims = Claims {
        sub: account_id.to_string(),
        exp: (now + Duration::hours(TOKEN_TTL_HOURS)).timestamp(),
        iat: now.timestamp(),
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;
    Ok(token)
}

/// Verify a token's signature and expiry, returning its claims.
///
/// # Errors
///    - Returns `Error::Jwt` if the token is invalid or expired.
pub fn verify_token(token: &str, secret: &str) -> Result<Claims> {
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )?;
    Ok(data.claims)
}

/// Extractor for a required authenticated user. Rejects with 401 when the
/// bearer token is missing or invalid.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub account_id: String,
}

impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = Error;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> std::result::Result<Self, Self::Rejection> {
        let bearer: Authorization<Bearer> = parts
            .headers
            .typed_get()
            .ok_or_else(|| Error::AuthFailed("missing bearer token".to_string()))?;
        let claims = verify_token(bearer.token(), &state.config.security.jwt_secret)?;
        Ok(Self {
            account_id: claims.sub,
        })
    }
}

/// Extractor for an optional authenticated user.
///
/// No `Authorization` header means a guest (`None`). A header that is
/// present but fails verification still rejects with 401, so expired
/// clients notice instead of silently downgrading to the guest path.
#[derive(Debug, Clone)]
pub struct MaybeAuthUser(pub Option<AuthUser>);

impl FromRequestParts<Arc<AppState>> for MaybeAuthUser {
    type Rejection = Error;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> std::result::Result<Self, Self::Rejection> {
        if parts.headers.get(header::AUTHORIZATION).is_none() {
            return Ok(Self(None));
        }
        let user = AuthUser::from_request_parts(parts, state).await?;
        Ok(Self(Some(user)))
    }
}

/// Extractor guarding the admin surface with the static `x-admin-token`
/// header.
#[derive(Debug, Clone, Copy)]
pub struct AdminAuth;

impl FromRequestParts<Arc<AppState>> for AdminAuth {
    type Rejection = Error;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> std::result::Result<Self, Self::Rejection> {
        let presented = parts
            .headers
            .get("x-admin-token")
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| Error::AuthFailed("missing admin token".to_string()))?;

        if presented != state.config.security.admin_token {
            return Err(Error::AuthFailed("invalid admin token".to_string()));
        }
        Ok(Self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_round_trip() {
        let token = generate_token("u_123", "test-secret").unwrap();
        let claims = verify_token(&token, "test-secret").unwrap();

        assert_eq!(claims.sub, "u_123");
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let token = generate_token("u_123", "test-secret").unwrap();
        assert!(verify_token(&token, "other-secret").is_err());
    }

    #[test]
    fn test_expired_token_rejected() {
        let past = Utc::now() - Duration::hours(2);
        let claims = Claims {
            sub: "u_123".to_string(),
            exp: past.timestamp(),
            iat: (past - Duration::hours(24)).timestamp(),
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(b"test-secret"),
        )
        .unwrap();

        assert!(verify_token(&token, "test-secret").is_err());
    }

    #[test]
    fn test_garbage_token_rejected() {
        assert!(verify_token("not-a-jwt", "test-secret").is_err());
    }
}
