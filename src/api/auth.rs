use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use axum::{extract::State, Json};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;

use super::authz::{Identity, RequestIdentity, SESSION_COOKIE};
use super::error::ApiError;
use super::validation::{normalize_email, validate_name, validate_password};
use crate::db::{
    format_timestamp, Artist, DbPool, LoginRequest, LoginResponse, OtpPurpose, Role, Session,
    Setting, User, UserResponse,
};
use crate::error::{Error, FieldErrorsBuilder};
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct StatusMessage {
    pub status: &'static str,
    pub message: String,
}

impl StatusMessage {
    pub fn success(message: impl Into<String>) -> Json<Self> {
        Json(Self {
            status: "success",
            message: message.into(),
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct SendOtpRequest {
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct VerifyOtpRequest {
    pub email: String,
    pub otp: String,
}

#[derive(Debug, Deserialize)]
pub struct SendSignupOtpRequest {
    pub email: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct VerifySignupOtpRequest {
    pub email: String,
    pub name: String,
    pub password: String,
    pub otp: String,
}

#[derive(Debug, Serialize)]
pub struct MeResponse {
    pub status: &'static str,
    pub user: UserResponse,
}

/// Hash a password using Argon2
pub fn hash_password(password: &str) -> Result<String, argon2::password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    let hash = argon2.hash_password(password.as_bytes(), &salt)?;
    Ok(hash.to_string())
}

/// Verify a password against a hash
pub fn verify_password(password: &str, hash: &str) -> bool {
    let parsed_hash = match PasswordHash::new(hash) {
        Ok(h) => h,
        Err(_) => return false,
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok()
}

/// Generate a random session token
fn generate_token() -> String {
    let mut rng = rand::rng();
    let bytes: [u8; 32] = rng.random();
    hex::encode(bytes)
}

/// Hash a token for storage; only the hash ever reaches the database
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

fn hash_or_internal(password: &str) -> Result<String, ApiError> {
    hash_password(password)
        .map_err(|e| Error::Internal(format!("Failed to hash password: {}", e)).into())
}

/// Create a session for `user` and hand the token back as JSON and cookie
async fn start_session(
    state: &AppState,
    jar: CookieJar,
    user: User,
    message: &str,
) -> Result<(CookieJar, Json<LoginResponse>), ApiError> {
    let token = generate_token();
    let ttl = chrono::Duration::hours(state.config.auth.session_ttl_hours);
    let expires_at = format_timestamp(chrono::Utc::now() + ttl);
    Session::create(&state.db, &user.email, &hash_token(&token), &expires_at).await?;

    let cookie = Cookie::build((SESSION_COOKIE, token.clone()))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .build();

    let redirect = user.role().landing_path();
    tracing::info!(email = %user.email, role = %user.role, "Session started");

    Ok((
        jar.add(cookie),
        Json(LoginResponse {
            status: "success",
            message: message.to_string(),
            token,
            user: UserResponse::from(user),
            redirect,
        }),
    ))
}

/// POST /auth/login - password login
pub async fn login(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Json(request): Json<LoginRequest>,
) -> Result<(CookieJar, Json<LoginResponse>), ApiError> {
    let email = normalize_email(&request.email);
    let user = User::find_by_email(&state.db, &email)
        .await?
        .filter(|user| verify_password(&request.password, &user.password_hash))
        .ok_or_else(|| ApiError::unauthorized("Invalid email or password"))?;

    start_session(&state, jar, user, "Login successful").await
}

/// POST /auth/send-otp - email a login code to an existing account
pub async fn send_otp(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SendOtpRequest>,
) -> Result<Json<StatusMessage>, ApiError> {
    state
        .otp
        .request_code(&request.email, OtpPurpose::Login, None)
        .await
        .map_err(|e| match e {
            Error::NotFound(_) => ApiError::not_found("No account found with this email address"),
            other => other.into(),
        })?;

    Ok(StatusMessage::success("OTP sent to your email"))
}

/// POST /auth/verify-otp - exchange a login code for a session
pub async fn verify_otp(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Json(request): Json<VerifyOtpRequest>,
) -> Result<(CookieJar, Json<LoginResponse>), ApiError> {
    state
        .otp
        .verify_code(&request.email, &request.otp, OtpPurpose::Login)
        .await?;

    let email = normalize_email(&request.email);
    let user = User::find_by_email(&state.db, &email)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    start_session(&state, jar, user, "Login successful").await
}

/// POST /auth/send-signup-otp - email a signup code to a new address
pub async fn send_signup_otp(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SendSignupOtpRequest>,
) -> Result<Json<StatusMessage>, ApiError> {
    state
        .otp
        .request_code(&request.email, OtpPurpose::Signup, Some(&request.name))
        .await?;

    Ok(StatusMessage::success("Verification code sent to your email"))
}

/// POST /auth/verify-signup-otp - create the account and sign in
pub async fn verify_signup_otp(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Json(request): Json<VerifySignupOtpRequest>,
) -> Result<(CookieJar, Json<LoginResponse>), ApiError> {
    // Check the account fields first so a typo does not burn the code
    let mut errors = FieldErrorsBuilder::new();
    if let Err(msg) = validate_name(&request.name) {
        errors.add("name", msg);
    }
    if let Err(msg) = validate_password(&request.password) {
        errors.add("password", msg);
    }
    errors.finish()?;

    state
        .otp
        .verify_code(&request.email, &request.otp, OtpPurpose::Signup)
        .await?;

    let email = normalize_email(&request.email);
    let name = request.name.trim();
    let password_hash = hash_or_internal(&request.password)?;

    if let Err(e) = User::create(&state.db, &email, name, &password_hash, Role::User).await {
        let duplicate = matches!(
            &e,
            sqlx::Error::Database(db_err) if db_err.is_unique_violation()
        );
        return Err(if duplicate {
            ApiError::conflict("An account with this email already exists")
        } else {
            e.into()
        });
    }
    tracing::info!(email = %email, "Created account");

    if let Err(e) = state.notifier.send_welcome_email(&email, name).await {
        tracing::warn!(email = %email, error = %e, "Failed to send welcome email");
    }

    let user = User::find_by_email(&state.db, &email)
        .await?
        .ok_or_else(|| ApiError::internal("Account vanished after creation"))?;
    start_session(&state, jar, user, "Account created successfully").await
}

/// POST /auth/logout - end the current session, if any
pub async fn logout(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    RequestIdentity(identity): RequestIdentity,
) -> Result<(CookieJar, Json<StatusMessage>), ApiError> {
    if let Some(identity) = identity {
        Session::delete(&state.db, &identity.session_id).await?;
        tracing::info!(email = %identity.email, "Logged out");
    }

    Ok((
        jar.remove(Cookie::build(SESSION_COOKIE).path("/").build()),
        StatusMessage::success("Logged out successfully"),
    ))
}

/// GET /auth/me - the signed-in user
pub async fn me(
    State(state): State<Arc<AppState>>,
    identity: Identity,
) -> Result<Json<MeResponse>, ApiError> {
    let user = User::find_by_email(&state.db, &identity.email)
        .await?
        .ok_or_else(|| ApiError::unauthorized("Authentication required"))?;

    Ok(Json(MeResponse {
        status: "success",
        user: UserResponse::from(user),
    }))
}

/// POST /auth/upgrade-to-artist - turn a customer account into an artist account
pub async fn upgrade_to_artist(
    State(state): State<Arc<AppState>>,
    identity: Identity,
) -> Result<Json<StatusMessage>, ApiError> {
    match identity.role {
        Role::User => {}
        Role::Artist => return Err(ApiError::conflict("You are already an artist")),
        Role::Admin => {
            return Err(ApiError::conflict(
                "Administrator accounts cannot be converted to artist accounts",
            ))
        }
    }

    let approved = Setting::artists_auto_approved(&state.db).await?;

    let mut tx = state.db.begin().await?;
    User::set_role(&mut *tx, &identity.email, Role::Artist).await?;
    Artist::create_for(&mut tx, &identity.email, approved).await?;
    tx.commit().await?;

    tracing::info!(email = %identity.email, approved, "Upgraded account to artist");

    let message = if approved {
        "You are now an artist!"
    } else {
        "You are now an artist! Your profile will be visible once an administrator approves it."
    };
    Ok(StatusMessage::success(message))
}

/// Create the bootstrap admin account when configured and missing
pub async fn ensure_admin_user(
    db: &DbPool,
    email: Option<&str>,
    password: Option<&str>,
) -> anyhow::Result<()> {
    let (Some(email), Some(password)) = (email, password) else {
        return Ok(());
    };
    let email = normalize_email(email);

    if User::exists(db, &email).await? {
        return Ok(());
    }

    if let Err(msg) = validate_password(password) {
        anyhow::bail!("auth.admin_password is not acceptable: {}", msg);
    }

    let password_hash =
        hash_password(password).map_err(|e| anyhow::anyhow!("Failed to hash password: {}", e))?;
    User::create(db, &email, "Administrator", &password_hash, Role::Admin).await?;
    tracing::info!(email = %email, "Created bootstrap admin account");
    Ok(())
}
