use std::sync::Arc;

use crate::observability;
use crate::token::{TokenService, TOKEN_TTL_SECS};

/// Name of the session cookie carrying the token.
pub const SESSION_COOKIE: &str = "hallpass_session";

/// Response header signalling the client that its cookie token expired.
pub const EXPIRED_HEADER: &str = "X-Token-Expired";

/// The request identity established by the filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub username: String,
    pub role: Option<String>,
    pub authorities: Vec<String>,
}

/// What the HTTP layer must do with the request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessDecision {
    /// Token validated — downstream handlers see this principal.
    Authenticated(AuthenticatedUser),
    /// No usable token. Not an error: downstream access-control policy
    /// decides whether anonymous is enough.
    Anonymous,
    /// A cookie-borne token failed validation: clear the cookie and
    /// answer 401 with the [`EXPIRED_HEADER`] signal.
    RejectedCookie,
}

/// Cookie directive for the HTTP layer — set on login, cleared on
/// logout or on a rejected cookie token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionCookie {
    pub name: &'static str,
    pub value: Option<String>,
    pub max_age_secs: u64,
    pub http_only: bool,
    pub secure: bool,
    pub path: &'static str,
}

pub fn session_cookie(token: String) -> SessionCookie {
    SessionCookie {
        name: SESSION_COOKIE,
        value: Some(token),
        max_age_secs: TOKEN_TTL_SECS,
        http_only: true,
        secure: true,
        path: "/",
    }
}

pub fn clear_session_cookie() -> SessionCookie {
    SessionCookie {
        name: SESSION_COOKIE,
        value: None,
        max_age_secs: 0,
        http_only: true,
        secure: true,
        path: "/",
    }
}

/// Structural pre-check before attempting full validation: a compact
/// signed token has exactly three dot-separated segments.
pub fn looks_like_token(candidate: &str) -> bool {
    candidate.trim().split('.').count() == 3
}

/// Strip the `Bearer ` scheme off an Authorization header value.
pub fn bearer_token(header: &str) -> Option<&str> {
    header.strip_prefix("Bearer ")
}

/// Per-request gate: resolves a candidate token (session cookie first,
/// Bearer header as fallback) to an authenticated principal. Runs
/// before any authorization decision downstream.
pub struct AccessFilter {
    tokens: Arc<TokenService>,
}

impl AccessFilter {
    pub fn new(tokens: Arc<TokenService>) -> Self {
        Self { tokens }
    }

    pub fn authenticate(
        &self,
        session_cookie: Option<&str>,
        authorization: Option<&str>,
    ) -> AccessDecision {
        let (candidate, from_cookie) = match session_cookie {
            Some(cookie) => (Some(cookie), true),
            None => (authorization.and_then(bearer_token), false),
        };

        let Some(token) = candidate else {
            // Absence of a token is not an error — proceed anonymous.
            return AccessDecision::Anonymous;
        };
        if !looks_like_token(token) {
            return AccessDecision::Anonymous;
        }

        match self.validate(token) {
            Some(user) => {
                tracing::debug!(subject = %user.username, "request authenticated");
                AccessDecision::Authenticated(user)
            }
            None if from_cookie => {
                metrics::counter!(observability::AUTH_REJECTED_TOTAL).increment(1);
                tracing::debug!("clearing invalid session cookie");
                AccessDecision::RejectedCookie
            }
            None => {
                // Header tokens fail open: downstream policy decides.
                metrics::counter!(observability::AUTH_REJECTED_TOTAL).increment(1);
                AccessDecision::Anonymous
            }
        }
    }

    fn validate(&self, token: &str) -> Option<AuthenticatedUser> {
        let username = self.tokens.username(token)?;
        if self.tokens.is_revoked(token) {
            tracing::warn!(subject = %username, "rejected blacklisted token");
            return None;
        }
        if !self.tokens.is_valid(token, &username) {
            return None;
        }
        Some(AuthenticatedUser {
            username,
            role: self.tokens.role(token),
            authorities: self.tokens.authorities(token),
        })
    }
}
