//! Panel credential checks.
//!
//! The dashboard signs in with a single username/password pair. The check
//! sits behind [`CredentialVerifier`] so deployments (and tests) can inject
//! their own source of truth; [`StaticCredentials`] reads the pair from the
//! `[auth]` configuration section.
//!
//! When `auth.enabled` is set, data endpoints require HTTP Basic credentials:
//!
//! ```text
//! Authorization: Basic base64(username:password)
//! ```
//!
//! # Configuration
//!
//! - `SERIALDESK_AUTH_ENABLED` - Require credentials on data endpoints
//! - `SERIALDESK_AUTH_USERNAME` - Username (`env:VAR` supported)
//! - `SERIALDESK_AUTH_PASSWORD` - Password (`env:VAR` supported)

use axum::{
    extract::{Request, State},
    http::{header, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::sync::Arc;
use tracing::warn;

use crate::config::{resolve_secret, AuthConfig};
use crate::errors::LicenseResult;
use crate::server::api_error::{ApiError, ErrorCode};

/// Decides whether a username/password pair may use the panel.
pub trait CredentialVerifier: Send + Sync {
    fn verify(&self, username: &str, password: &str) -> bool;
}

/// A single configured credential pair.
#[derive(Clone)]
pub struct StaticCredentials {
    username: String,
    password: String,
}

impl StaticCredentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Build from `[auth]`, resolving `env:` indirection.
    pub fn from_config(config: &AuthConfig) -> LicenseResult<Self> {
        Ok(Self::new(
            resolve_secret(&config.username)?,
            resolve_secret(&config.password)?,
        ))
    }
}

impl std::fmt::Debug for StaticCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticCredentials")
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

/// Compare without short-circuiting on the first differing byte.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

impl CredentialVerifier for StaticCredentials {
    fn verify(&self, username: &str, password: &str) -> bool {
        // Both halves are always compared.
        let user_ok = constant_time_eq(self.username.as_bytes(), username.as_bytes());
        let pass_ok = constant_time_eq(self.password.as_bytes(), password.as_bytes());
        user_ok & pass_ok
    }
}

/// Authentication errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// Missing Authorization header
    MissingCredentials,
    /// Authorization header is not `Basic <base64(user:pass)>`
    InvalidHeader,
    /// Verifier rejected the pair
    InvalidCredentials,
}

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthError::MissingCredentials => write!(f, "missing credentials"),
            AuthError::InvalidHeader => write!(f, "invalid authorization header format"),
            AuthError::InvalidCredentials => write!(f, "invalid credentials"),
        }
    }
}

impl std::error::Error for AuthError {}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let mut response =
            ApiError::with_message(ErrorCode::Unauthorized, self.to_string()).into_response();
        response.headers_mut().insert(
            header::WWW_AUTHENTICATE,
            HeaderValue::from_static("Basic realm=\"serialdesk\""),
        );
        response
    }
}

/// Split a `Basic` Authorization header value into username and password.
pub fn parse_basic_header(value: &str) -> Result<(String, String), AuthError> {
    let encoded = value
        .strip_prefix("Basic ")
        .ok_or(AuthError::InvalidHeader)?
        .trim();
    let decoded = STANDARD
        .decode(encoded)
        .map_err(|_| AuthError::InvalidHeader)?;
    let pair = String::from_utf8(decoded).map_err(|_| AuthError::InvalidHeader)?;
    let (username, password) = pair.split_once(':').ok_or(AuthError::InvalidHeader)?;
    Ok((username.to_string(), password.to_string()))
}

/// Credential state shared with the middleware and the login handler.
#[derive(Clone)]
pub struct AuthState {
    /// Whether data endpoints require credentials
    pub enabled: bool,
    /// Verifier used for Basic credentials and `/login`
    pub verifier: Option<Arc<dyn CredentialVerifier>>,
}

impl AuthState {
    /// Create auth state from configuration.
    pub fn from_config(config: &AuthConfig) -> LicenseResult<Self> {
        if !config.enabled {
            return Ok(Self::disabled());
        }
        let credentials = StaticCredentials::from_config(config)?;
        Ok(Self::with_verifier(Arc::new(credentials)))
    }

    /// Require credentials checked by `verifier`.
    pub fn with_verifier(verifier: Arc<dyn CredentialVerifier>) -> Self {
        Self {
            enabled: true,
            verifier: Some(verifier),
        }
    }

    /// Create a disabled auth state.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            verifier: None,
        }
    }

    /// Check a pair against the verifier. Always false when no verifier is set.
    pub fn check(&self, username: &str, password: &str) -> bool {
        self.verifier
            .as_ref()
            .is_some_and(|v| v.verify(username, password))
    }
}

impl std::fmt::Debug for AuthState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthState")
            .field("enabled", &self.enabled)
            .finish()
    }
}

/// Middleware requiring Basic credentials when auth is enabled.
pub async fn require_basic_auth(
    State(auth): State<AuthState>,
    request: Request,
    next: Next,
) -> Response {
    if !auth.enabled {
        return next.run(request).await;
    }

    let result = request
        .headers()
        .get(header::AUTHORIZATION)
        .ok_or(AuthError::MissingCredentials)
        .and_then(|v| v.to_str().map_err(|_| AuthError::InvalidHeader))
        .and_then(parse_basic_header)
        .and_then(|(user, pass)| {
            if auth.check(&user, &pass) {
                Ok(())
            } else {
                Err(AuthError::InvalidCredentials)
            }
        });

    match result {
        Ok(()) => next.run(request).await,
        Err(e) => {
            warn!(path = %request.uri().path(), "Rejected request: {}", e);
            e.into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn basic(user: &str, pass: &str) -> String {
        format!("Basic {}", STANDARD.encode(format!("{user}:{pass}")))
    }

    #[test]
    fn static_credentials_verify() {
        let creds = StaticCredentials::new("admin", "hunter2");
        assert!(creds.verify("admin", "hunter2"));
        assert!(!creds.verify("admin", "hunter3"));
        assert!(!creds.verify("root", "hunter2"));
        assert!(!creds.verify("", ""));
    }

    #[test]
    fn parse_basic_header_roundtrip() {
        let (user, pass) = parse_basic_header(&basic("admin", "p:w")).unwrap();
        assert_eq!(user, "admin");
        assert_eq!(pass, "p:w");
    }

    #[test]
    fn parse_basic_header_rejects_other_schemes() {
        assert_eq!(
            parse_basic_header("Bearer abc"),
            Err(AuthError::InvalidHeader)
        );
        assert_eq!(
            parse_basic_header("Basic !!!not-base64"),
            Err(AuthError::InvalidHeader)
        );
    }

    #[test]
    fn disabled_state_rejects_every_login() {
        let auth = AuthState::disabled();
        assert!(!auth.enabled);
        assert!(!auth.check("admin", "admin"));
    }

    #[test]
    fn config_builds_enabled_state() {
        let config = AuthConfig {
            enabled: true,
            username: "admin".to_string(),
            password: "secret".to_string(),
        };
        let auth = AuthState::from_config(&config).unwrap();
        assert!(auth.enabled);
        assert!(auth.check("admin", "secret"));
    }
}
