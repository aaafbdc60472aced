//! Admin authentication.
//!
//! A single administrator account is configured at startup. Logging in yields
//! an HS256-signed JWT that must be presented as `Authorization: Bearer
//! <token>` on every `/admin/*` route except login. Handlers opt in by taking
//! an [`Admin`] argument.

use crate::server::{
    error::{ApiError, ApiResult},
    service::state::AppState,
};
use axum::{
    extract::FromRequestParts,
    http::{HeaderMap, header::AUTHORIZATION, request::Parts},
};
use chrono::Utc;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    iat: i64,
    exp: i64,
}

/// Issues and verifies admin bearer tokens.
pub struct Authenticator {
    username: String,
    password: String,
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: chrono::Duration,
}

impl Authenticator {
    pub fn new(username: &str, password: &str, secret: &str, ttl: chrono::Duration) -> Self {
        Self {
            username: username.to_string(),
            password: password.to_string(),
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl,
        }
    }

    /// Checks the credentials and returns a signed token for the admin.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::InvalidCredentials`] on a mismatch.
    pub fn login(&self, username: &str, password: &str) -> ApiResult<String> {
        if username != self.username || password != self.password {
            return Err(ApiError::InvalidCredentials);
        }

        let now = Utc::now();
        let claims = Claims {
            sub: self.username.clone(),
            iat: now.timestamp(),
            exp: (now + self.ttl).timestamp(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding).map_err(|e| {
            ApiError::Internal {
                context: format!("failed to sign token: {e}"),
            }
        })
    }

    /// Verifies signature and expiry of `token`.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Unauthorized`] for any invalid token.
    pub fn verify(&self, token: &str) -> ApiResult<Admin> {
        let data = decode::<Claims>(token, &self.decoding, &Validation::new(Algorithm::HS256))
            .map_err(|e| {
                tracing::debug!(error = %e, "rejected bearer token");
                ApiError::Unauthorized
            })?;
        if data.claims.sub != self.username {
            return Err(ApiError::Unauthorized);
        }
        Ok(Admin {
            username: data.claims.sub,
        })
    }
}

/// Proof that the request carried a valid admin bearer token.
#[derive(Debug, Clone)]
pub struct Admin {
    pub username: String,
}

impl Admin {
    /// Verifies the `Authorization: Bearer` header in `headers`.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Unauthorized`] if the header is missing or the
    /// token is invalid.
    pub fn from_headers(headers: &HeaderMap, auth: &Authenticator) -> ApiResult<Self> {
        let token = headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .ok_or(ApiError::Unauthorized)?;
        auth.verify(token)
    }
}

impl FromRequestParts<AppState> for Admin {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> ApiResult<Self> {
        Self::from_headers(&parts.headers, &state.auth)
    }
}
