//! Request-scoped identity and capability checks.
//!
//! [`identity_middleware`] runs on every request, resolves the caller from a
//! bearer token or the session cookie and stores a [`RequestIdentity`] in the
//! request extensions. Route groups gate on [`require_capability`]; handlers
//! that need more call [`Identity::require`].

use axum::{
    async_trait,
    body::Body,
    extract::{FromRequestParts, State},
    http::{header, request::Parts, HeaderMap, Request},
    middleware::Next,
    response::Response,
};
use axum_extra::extract::cookie::CookieJar;
use std::sync::Arc;

use super::auth::hash_token;
use super::error::ApiError;
use crate::db::{Role, Session};
use crate::error::Error;
use crate::AppState;

pub const SESSION_COOKIE: &str = "artbay_session";

/// What a caller may do, from least to most privileged
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Capability {
    Guest,
    User,
    Artist,
    Admin,
}

impl From<Role> for Capability {
    fn from(role: Role) -> Self {
        match role {
            Role::User => Capability::User,
            Role::Artist => Capability::Artist,
            Role::Admin => Capability::Admin,
        }
    }
}

/// A signed-in caller
#[derive(Debug, Clone)]
pub struct Identity {
    pub email: String,
    pub name: String,
    pub role: Role,
    pub session_id: String,
}

impl Identity {
    pub fn capability(&self) -> Capability {
        self.role.into()
    }

    /// Fail with `Forbidden` unless this caller has at least `required`
    pub fn require(&self, required: Capability) -> Result<(), Error> {
        if self.capability() >= required {
            Ok(())
        } else {
            Err(Error::Forbidden)
        }
    }
}

/// The identity resolved for this request, if any
#[derive(Debug, Clone, Default)]
pub struct RequestIdentity(pub Option<Identity>);

impl RequestIdentity {
    pub fn capability(&self) -> Capability {
        self.0
            .as_ref()
            .map(Identity::capability)
            .unwrap_or(Capability::Guest)
    }

    /// 401 for guests, 403 for callers below `required`
    pub fn check(&self, required: Capability) -> Result<(), Error> {
        match &self.0 {
            None if required > Capability::Guest => Err(Error::Unauthorized),
            None => Ok(()),
            Some(identity) => identity.require(required),
        }
    }
}

/// Bearer token from the Authorization header, else the session cookie
pub fn extract_token(headers: &HeaderMap) -> Option<String> {
    if let Some(value) = headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
    {
        if let Some(token) = value.strip_prefix("Bearer ") {
            let token = token.trim();
            if !token.is_empty() {
                return Some(token.to_string());
            }
        }
    }

    CookieJar::from_headers(headers)
        .get(SESSION_COOKIE)
        .map(|cookie| cookie.value().to_string())
        .filter(|value| !value.is_empty())
}

/// Resolve the caller once per request
pub async fn identity_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let identity = match extract_token(request.headers()) {
        Some(token) => Session::find_valid(&state.db, &hash_token(&token))
            .await?
            .map(|(session, user)| Identity {
                role: user.role(),
                email: user.email,
                name: user.name,
                session_id: session.id,
            }),
        None => None,
    };

    request.extensions_mut().insert(RequestIdentity(identity));
    Ok(next.run(request).await)
}

/// Reject callers below `required` before the handler runs.
///
/// Mount with `middleware::from_fn_with_state(Capability::User, require_capability)`.
pub async fn require_capability(
    State(required): State<Capability>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    request
        .extensions()
        .get::<RequestIdentity>()
        .cloned()
        .unwrap_or_default()
        .check(required)?;
    Ok(next.run(request).await)
}

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for RequestIdentity {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts
            .extensions
            .get::<RequestIdentity>()
            .cloned()
            .unwrap_or_default())
    }
}

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for Identity {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        RequestIdentity::from_request_parts(parts, state)
            .await?
            .0
            .ok_or_else(|| Error::Unauthorized.into())
    }
}
