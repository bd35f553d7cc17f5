use axum::{
    async_trait,
    extract::{FromRequestParts, State},
    http::request::Parts,
    Json,
};
use axum_extra::extract::cookie::{Cookie, CookieJar};
use lazy_static::lazy_static;
use std::sync::Arc;
use tracing::{debug, error, info};

use super::error::ApiError;
use crate::config::{AuthConfig, CookieConfig};
use crate::crypto::{hash_password, verify_password};
use crate::db::{DbPool, LoginRequest, LoginResponse, User};
use crate::AppState;

/// Name of the cookie carrying the session token
pub const SESSION_COOKIE: &str = "session";

lazy_static! {
    /// Verified against when the username is unknown, so a missing user costs
    /// the same as a wrong password.
    static ref DUMMY_HASH: String =
        hash_password("chatledger-unknown-user").unwrap_or_default();
}

/// Create the configured admin account if it does not exist yet.
///
/// Missing admin credentials are not an error; the bootstrap is skipped.
pub async fn ensure_admin_user(db: &DbPool, auth: &AuthConfig) -> anyhow::Result<()> {
    let Some((username, password)) = auth.admin_credentials() else {
        info!("ADMIN_USERNAME/ADMIN_PASSWORD not set, admin user not created");
        return Ok(());
    };

    if User::find_by_username(db, username).await?.is_some() {
        debug!(username, "Admin user already exists");
        return Ok(());
    }

    let password_hash = hash_password(password)
        .map_err(|e| anyhow::anyhow!("Failed to hash admin password: {}", e))?;
    User::create(db, username, &password_hash).await?;

    info!(username, "Admin user created");
    Ok(())
}

/// Verify a login attempt. With no stored hash (unknown user) the dummy hash
/// is checked instead, and its first use computes it, so call this off the
/// async runtime.
fn check_login_password(password: &str, stored_hash: Option<&str>) -> bool {
    match stored_hash {
        Some(hash) => verify_password(password, hash),
        None => {
            verify_password(password, &DUMMY_HASH);
            false
        }
    }
}

/// Build the session cookie for a freshly issued token
pub fn session_cookie(token: String, config: &CookieConfig) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, token))
        .path("/")
        .http_only(true)
        .same_site(config.same_site)
        .secure(config.secure)
        .build()
}

/// Login endpoint
///
/// POST /login
pub async fn login(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Json(request): Json<LoginRequest>,
) -> Result<(CookieJar, Json<LoginResponse>), ApiError> {
    let user = User::find_by_username(&state.db, &request.username).await?;

    let stored_hash = user.as_ref().map(|u| u.password_hash.clone());
    let password = request.password;
    let verified = tokio::task::spawn_blocking(move || {
        check_login_password(&password, stored_hash.as_deref())
    })
    .await
    .map_err(|e| {
        error!(error = %e, "Password verification task failed");
        ApiError::internal("Internal Server Error")
    })?;

    let user = match user {
        Some(user) if verified => user,
        _ => {
            info!(username = %request.username, "Login failed");
            return Err(ApiError::unauthorized());
        }
    };

    let token = state.authenticator.issue(&user.username).map_err(|e| {
        error!(error = %e, "Failed to sign session token");
        ApiError::internal("Internal Server Error")
    })?;

    info!(username = %user.username, "Login succeeded");

    let jar = jar.add(session_cookie(token, &state.config.cookie));
    Ok((jar, Json(LoginResponse::ok())))
}

/// An authenticated caller, taken from a valid `session` cookie.
///
/// Handlers that take this extractor are rejected with 401 before they run
/// when the cookie is missing, tampered with or expired.
#[derive(Debug, Clone)]
pub struct SessionUser {
    pub username: String,
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for SessionUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let jar = CookieJar::from_headers(&parts.headers);
        let token = jar.get(SESSION_COOKIE).map(|c| c.value());
        let claims = state.authenticator.verify(token)?;
        Ok(SessionUser {
            username: claims.sub,
        })
    }
}
