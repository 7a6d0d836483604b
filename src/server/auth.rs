//! JWT authentication for the Seatgate admin API.
//!
//! Admins log in with email and password at `POST /api/auth/login` and
//! receive an HS256 bearer token. Protected handlers take an
//! [`AuthenticatedAdmin`] argument, which rejects the request unless it
//! carries a valid `Authorization: Bearer <token>` header.
//!
//! It is only available when the `jwt-auth` feature is enabled.
//!
//! # Configuration
//!
//! Set via environment variables or config.toml:
//! - `SEATGATE_JWT_SECRET` - Required secret key for HS256 signing
//! - `auth.jwt_issuer` - Expected issuer claim (default: "seatgate")
//! - `auth.jwt_audience` - Expected audience claim (default: "seatgate-admin")
//! - `SEATGATE_TOKEN_EXPIRATION_SECS` - Token validity (default: 86400)

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    async_trait,
    extract::{rejection::JsonRejection, ConnectInfo, FromRef, FromRequestParts, State},
    http::{request::Parts, HeaderMap},
    response::{IntoResponse, Response},
    Json,
};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, TokenData, Validation};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::AuthConfig;
use crate::errors::{LicenseError, LicenseResult};
use crate::server::api_error::{ApiError, ErrorCode};
use crate::server::handlers::{source_address, AppState};
use crate::server::logging::AuditKind;

/// JWT claims structure.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// Subject (admin email)
    pub sub: String,
    /// Issued at (Unix timestamp)
    pub iat: u64,
    /// Expiration time (Unix timestamp)
    pub exp: u64,
    /// Issuer
    pub iss: String,
    /// Audience
    pub aud: String,
}

/// Admin identity extracted from a valid bearer token.
#[derive(Debug, Clone)]
pub struct AuthenticatedAdmin {
    pub email: String,
    pub claims: Claims,
}

/// Authentication errors.
#[derive(Debug, Clone)]
pub enum AuthError {
    /// Missing Authorization header
    MissingToken,
    /// Invalid Authorization header format
    InvalidHeader,
    /// Token validation failed
    InvalidToken(String),
    /// Token has expired
    TokenExpired,
    /// Auth is not configured/enabled
    AuthDisabled,
}

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthError::MissingToken => write!(f, "missing authorization token"),
            AuthError::InvalidHeader => write!(f, "invalid authorization header format"),
            AuthError::InvalidToken(msg) => write!(f, "invalid token: {msg}"),
            AuthError::TokenExpired => write!(f, "token has expired"),
            AuthError::AuthDisabled => write!(f, "authentication is not enabled"),
        }
    }
}

impl std::error::Error for AuthError {}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        let code = match &err {
            AuthError::MissingToken => ErrorCode::MissingToken,
            AuthError::InvalidHeader => ErrorCode::InvalidHeader,
            AuthError::InvalidToken(_) => ErrorCode::InvalidToken,
            AuthError::TokenExpired => ErrorCode::TokenExpired,
            AuthError::AuthDisabled => ErrorCode::AuthDisabled,
        };
        // Token parser details are not echoed back.
        ApiError::new(code)
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        ApiError::from(self).into_response()
    }
}

/// JWT validator for token verification.
#[derive(Clone)]
pub struct JwtValidator {
    decoding_key: DecodingKey,
    encoding_key: EncodingKey,
    validation: Validation,
    issuer: String,
    audience: String,
    expiration_secs: u64,
}

impl JwtValidator {
    /// Create a new JWT validator from auth configuration.
    pub fn from_config(config: &AuthConfig) -> LicenseResult<Self> {
        if config.jwt_secret.is_empty() {
            return Err(LicenseError::ConfigError(
                "jwt_secret is required for JWT authentication".to_string(),
            ));
        }

        // Resolve secret (support env: prefix for environment variable)
        let secret = if let Some(env_var) = config.jwt_secret.strip_prefix("env:") {
            std::env::var(env_var).map_err(|_| {
                LicenseError::ConfigError(format!(
                    "environment variable '{env_var}' not found for jwt_secret"
                ))
            })?
        } else {
            config.jwt_secret.clone()
        };

        let mut validation = Validation::new(jsonwebtoken::Algorithm::HS256);
        validation.set_issuer(&[&config.jwt_issuer]);
        validation.set_audience(&[&config.jwt_audience]);
        validation.validate_exp = true;

        Ok(Self {
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            validation,
            issuer: config.jwt_issuer.clone(),
            audience: config.jwt_audience.clone(),
            expiration_secs: config.token_expiration_secs,
        })
    }

    /// Validate a JWT token and extract claims.
    pub fn validate_token(&self, token: &str) -> Result<TokenData<Claims>, AuthError> {
        decode::<Claims>(token, &self.decoding_key, &self.validation).map_err(|e| match e.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::TokenExpired,
            _ => AuthError::InvalidToken(e.to_string()),
        })
    }

    /// Create a new session token for an admin.
    pub fn create_token(&self, subject: &str) -> LicenseResult<String> {
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map_err(|e| LicenseError::ServerError(format!("system time error: {e}")))?
            .as_secs();

        let claims = Claims {
            sub: subject.to_string(),
            iat: now,
            exp: now + self.expiration_secs,
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
        };

        encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|e| LicenseError::TokenError(format!("failed to create token: {e}")))
    }
}

impl std::fmt::Debug for JwtValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtValidator")
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .field("expiration_secs", &self.expiration_secs)
            .finish()
    }
}

/// Authentication part of the application state.
#[derive(Clone)]
pub struct AuthState {
    /// Whether auth is enabled
    pub enabled: bool,
    /// JWT validator (None if auth is disabled)
    pub validator: Option<Arc<JwtValidator>>,
}

impl AuthState {
    /// Create auth state from configuration.
    pub fn from_config(config: &AuthConfig) -> LicenseResult<Self> {
        if !config.enabled {
            return Ok(Self::disabled());
        }

        let validator = JwtValidator::from_config(config)?;
        Ok(Self {
            enabled: true,
            validator: Some(Arc::new(validator)),
        })
    }

    /// Create a disabled auth state.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            validator: None,
        }
    }

    fn active_validator(&self) -> Result<&JwtValidator, AuthError> {
        if !self.enabled {
            return Err(AuthError::AuthDisabled);
        }
        self.validator.as_deref().ok_or(AuthError::AuthDisabled)
    }
}

impl std::fmt::Debug for AuthState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthState")
            .field("enabled", &self.enabled)
            .finish()
    }
}

impl FromRef<AppState> for AuthState {
    fn from_ref(state: &AppState) -> Self {
        state.auth.clone()
    }
}

/// Pull the bearer token out of the `Authorization` header.
fn bearer_token(headers: &HeaderMap) -> Result<&str, AuthError> {
    let header = headers
        .get(axum::http::header::AUTHORIZATION)
        .ok_or(AuthError::MissingToken)?
        .to_str()
        .map_err(|_| AuthError::InvalidHeader)?;

    header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or(AuthError::InvalidHeader)
}

/// Axum extractor for authenticated admin requests.
///
/// ```rust,ignore
/// async fn protected_handler(admin: AuthenticatedAdmin) -> impl IntoResponse {
///     format!("Hello, {}!", admin.email)
/// }
/// ```
#[async_trait]
impl<S> FromRequestParts<S> for AuthenticatedAdmin
where
    S: Send + Sync,
    AuthState: FromRef<S>,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let auth_state = AuthState::from_ref(state);
        let validator = auth_state.active_validator()?;

        let token = bearer_token(&parts.headers)?;
        let claims = validator.validate_token(token)?.claims;

        Ok(AuthenticatedAdmin {
            email: claims.sub.clone(),
            claims,
        })
    }
}

// ============================================================================
// Login
// ============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub token: String,
}

/// `POST /api/auth/login`
///
/// Unknown admins and wrong passwords get the same `bad_credentials` answer.
pub async fn login_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    peer: Option<ConnectInfo<SocketAddr>>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<LoginResponse>, ApiError> {
    let validator = state.auth.active_validator()?;
    let Json(req) = payload
        .map_err(|e| ApiError::with_message(ErrorCode::InvalidRequest, e.body_text()))?;

    let email = req.email.unwrap_or_default();
    let password = req.password.unwrap_or_default();
    let email = email.trim();
    if email.is_empty() || password.is_empty() {
        return Err(ApiError::new(ErrorCode::BadCredentials));
    }

    let Some(admin) = state.db.get_admin_by_email(email).await? else {
        warn!("Login attempt for unknown admin {email}");
        return Err(ApiError::new(ErrorCode::BadCredentials));
    };

    if !state
        .hasher
        .verify_async(password, admin.secret_hash.clone())
        .await?
    {
        warn!("Login attempt with wrong password for {email}");
        return Err(ApiError::new(ErrorCode::BadCredentials));
    }

    let token = validator.create_token(&admin.email)?;
    let source = source_address(&headers, peer.as_ref());
    state
        .audit(AuditKind::AdminLogin, &admin.email, source.as_deref())
        .await?;
    info!("Admin {} logged in", admin.email);

    Ok(Json(LoginResponse { token }))
}
