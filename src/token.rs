use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use dashmap::DashSet;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::observability;

/// Session token lifetime: one hour from issuance.
pub const TOKEN_TTL_SECS: u64 = 3600;

#[derive(Debug, PartialEq, Eq)]
pub enum TokenError {
    Expired,
    Malformed,
    Signature,
    /// The configured signing secret is not valid Base64 (or empty).
    InvalidKey,
}

impl std::fmt::Display for TokenError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TokenError::Expired => write!(f, "token expired"),
            TokenError::Malformed => write!(f, "token structurally invalid"),
            TokenError::Signature => write!(f, "token signature does not verify"),
            TokenError::InvalidKey => write!(f, "signing secret is not valid Base64"),
        }
    }
}

impl std::error::Error for TokenError {}

/// Wire claims: `{sub, username, role, userId, email, iat, exp}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(rename = "userId", skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub iat: u64,
    pub exp: u64,
}

/// The authenticated user a token is minted for. Password verification
/// happens upstream; this is its output.
#[derive(Debug, Clone)]
pub struct Principal {
    pub username: String,
    pub role: String,
    pub user_id: String,
    pub email: String,
}

/// Thread-safe registry of explicitly invalidated token strings.
/// Injected so a durable or expiring store can be swapped in later.
pub trait RevocationSet: Send + Sync {
    fn insert(&self, token: &str);
    fn contains(&self, token: &str) -> bool;
}

/// Process-wide blacklist of logged-out tokens. Append-only and never
/// persisted: a restart clears it, and nothing prunes entries whose
/// tokens have long since expired — they accumulate for the process
/// lifetime.
#[derive(Default)]
pub struct InMemoryRevocationSet {
    tokens: DashSet<String>,
}

impl RevocationSet for InMemoryRevocationSet {
    fn insert(&self, token: &str) {
        self.tokens.insert(token.to_string());
    }

    fn contains(&self, token: &str) -> bool {
        self.tokens.contains(token)
    }
}

/// Issues, parses and validates HS256-signed session tokens, and keeps
/// the revocation set for logged-out tokens.
pub struct TokenService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    revoked: Arc<dyn RevocationSet>,
}

impl TokenService {
    /// `secret` is the Base64-encoded signing key from configuration.
    pub fn new(secret: &str) -> Result<Self, TokenError> {
        Self::with_revocation_set(secret, Arc::new(InMemoryRevocationSet::default()))
    }

    pub fn with_revocation_set(
        secret: &str,
        revoked: Arc<dyn RevocationSet>,
    ) -> Result<Self, TokenError> {
        let key = BASE64.decode(secret).map_err(|_| TokenError::InvalidKey)?;
        if key.is_empty() {
            return Err(TokenError::InvalidKey);
        }
        Ok(Self {
            encoding: EncodingKey::from_secret(&key),
            decoding: DecodingKey::from_secret(&key),
            revoked,
        })
    }

    pub fn issue(&self, principal: &Principal) -> Result<String, TokenError> {
        let iat = now_secs();
        let claims = Claims {
            sub: principal.username.clone(),
            username: Some(principal.username.clone()),
            role: Some(principal.role.clone()),
            user_id: Some(principal.user_id.clone()),
            email: Some(principal.email.clone()),
            name: None,
            iat,
            exp: iat + TOKEN_TTL_SECS,
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|_| TokenError::Signature)?;
        metrics::counter!(observability::TOKENS_ISSUED_TOTAL).increment(1);
        tracing::debug!(subject = %principal.username, "issued session token");
        Ok(token)
    }

    /// Verify signature and expiry (no leeway) and return the claims.
    pub fn parse(&self, token: &str) -> Result<Claims, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        decode::<Claims>(token, &self.decoding, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => TokenError::Expired,
                ErrorKind::InvalidSignature => TokenError::Signature,
                _ => TokenError::Malformed,
            })
    }

    /// Full check: not revoked, decodes, subject matches, not expired.
    pub fn is_valid(&self, token: &str, expected_subject: &str) -> bool {
        if self.revoked.contains(token) {
            return false;
        }
        match self.parse(token) {
            Ok(claims) => claims.sub == expected_subject,
            Err(_) => false,
        }
    }

    pub fn is_revoked(&self, token: &str) -> bool {
        self.revoked.contains(token)
    }

    /// Blacklist the exact token string (logout). Any other token the
    /// same subject holds stays valid until its own expiry.
    pub fn revoke(&self, token: &str) {
        self.revoked.insert(token);
        metrics::counter!(observability::TOKENS_REVOKED_TOTAL).increment(1);
    }

    // Claim helpers degrade to empty on any parse failure — callers that
    // need to distinguish failure go through `parse`/`is_valid`.

    /// Prioritized fallback chain: username → email → name → subject.
    pub fn username(&self, token: &str) -> Option<String> {
        let claims = self.parse(token).ok()?;
        claims
            .username
            .or(claims.email)
            .or(claims.name)
            .or(Some(claims.sub))
    }

    pub fn role(&self, token: &str) -> Option<String> {
        self.parse(token).ok()?.role
    }

    pub fn email(&self, token: &str) -> Option<String> {
        self.parse(token).ok()?.email
    }

    /// `ROLE_`-prefixed authorities derived from the role claim.
    pub fn authorities(&self, token: &str) -> Vec<String> {
        match self.parse(token) {
            Ok(Claims { role: Some(role), .. }) => vec![format!("ROLE_{role}")],
            _ => Vec::new(),
        }
    }
}

pub(crate) fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET_BYTES: [u8; 32] = [7u8; 32];

    fn secret() -> String {
        BASE64.encode(SECRET_BYTES)
    }

    fn service() -> TokenService {
        TokenService::new(&secret()).unwrap()
    }

    fn alice() -> Principal {
        Principal {
            username: "alice".into(),
            role: "ADMIN".into(),
            user_id: "17".into(),
            email: "alice@campus.edu".into(),
        }
    }

    /// Mint a token with arbitrary claims using the same key the
    /// service holds — stands in for "a later login".
    fn sign(claims: &Claims) -> String {
        encode(
            &Header::new(Algorithm::HS256),
            claims,
            &EncodingKey::from_secret(&SECRET_BYTES),
        )
        .unwrap()
    }

    fn claims_for(sub: &str, iat: u64, exp: u64) -> Claims {
        Claims {
            sub: sub.into(),
            username: Some(sub.into()),
            role: Some("USER".into()),
            user_id: None,
            email: None,
            name: None,
            iat,
            exp,
        }
    }

    #[test]
    fn issue_then_validate() {
        let svc = service();
        let token = svc.issue(&alice()).unwrap();
        assert!(svc.is_valid(&token, "alice"));
        assert!(!svc.is_valid(&token, "bob"));

        let claims = svc.parse(&token).unwrap();
        assert_eq!(claims.sub, "alice");
        assert_eq!(claims.exp, claims.iat + TOKEN_TTL_SECS);
    }

    #[test]
    fn claim_helpers() {
        let svc = service();
        let token = svc.issue(&alice()).unwrap();
        assert_eq!(svc.username(&token).as_deref(), Some("alice"));
        assert_eq!(svc.role(&token).as_deref(), Some("ADMIN"));
        assert_eq!(svc.email(&token).as_deref(), Some("alice@campus.edu"));
        assert_eq!(svc.authorities(&token), vec!["ROLE_ADMIN".to_string()]);
    }

    #[test]
    fn claim_helpers_degrade_on_garbage() {
        let svc = service();
        assert_eq!(svc.username("not-a-token"), None);
        assert_eq!(svc.role("not-a-token"), None);
        assert!(svc.authorities("not-a-token").is_empty());
    }

    #[test]
    fn username_fallback_chain() {
        let svc = service();
        let now = now_secs();

        // No username claim → email wins
        let mut c = claims_for("subject", now, now + 600);
        c.username = None;
        c.email = Some("fallback@campus.edu".into());
        assert_eq!(
            svc.username(&sign(&c)).as_deref(),
            Some("fallback@campus.edu")
        );

        // No username/email → name wins
        c.email = None;
        c.name = Some("Display Name".into());
        assert_eq!(svc.username(&sign(&c)).as_deref(), Some("Display Name"));

        // Nothing else → subject
        c.name = None;
        assert_eq!(svc.username(&sign(&c)).as_deref(), Some("subject"));
    }

    #[test]
    fn expired_token_rejected() {
        let svc = service();
        let now = now_secs();
        let token = sign(&claims_for("alice", now - 7200, now - 1));
        assert_eq!(svc.parse(&token), Err(TokenError::Expired));
        assert!(!svc.is_valid(&token, "alice"));
        // helpers degrade rather than propagate
        assert_eq!(svc.username(&token), None);
    }

    #[test]
    fn malformed_token_rejected() {
        let svc = service();
        assert_eq!(svc.parse("garbage"), Err(TokenError::Malformed));
        assert_eq!(svc.parse("a.b.c"), Err(TokenError::Malformed));
    }

    #[test]
    fn foreign_signature_rejected() {
        let svc = service();
        let now = now_secs();
        let foreign = encode(
            &Header::new(Algorithm::HS256),
            &claims_for("alice", now, now + 600),
            &EncodingKey::from_secret(b"some-other-key-entirely-000000000"),
        )
        .unwrap();
        assert_eq!(svc.parse(&foreign), Err(TokenError::Signature));
        assert!(!svc.is_valid(&foreign, "alice"));
    }

    #[test]
    fn revocation_is_per_token_string() {
        let svc = service();
        let first = svc.issue(&alice()).unwrap();
        assert!(svc.is_valid(&first, "alice"));

        svc.revoke(&first);
        assert!(svc.is_revoked(&first));
        assert!(!svc.is_valid(&first, "alice"));
        // parse itself is unaffected — the blacklist gates validity only
        assert!(svc.parse(&first).is_ok());

        // A later login mints a distinct token string; it stays valid.
        let now = now_secs();
        let mut c = claims_for("alice", now + 5, now + 5 + TOKEN_TTL_SECS);
        c.role = Some("ADMIN".into());
        let second = sign(&c);
        assert_ne!(first, second);
        assert!(svc.is_valid(&second, "alice"));
    }

    #[test]
    fn bad_secret_rejected() {
        assert!(matches!(
            TokenService::new("!!not base64!!"),
            Err(TokenError::InvalidKey)
        ));
        assert!(matches!(TokenService::new(""), Err(TokenError::InvalidKey)));
    }

    #[test]
    fn claims_wire_shape() {
        let svc = service();
        let token = svc.issue(&alice()).unwrap();
        let claims = svc.parse(&token).unwrap();
        let json = serde_json::to_value(&claims).unwrap();
        assert_eq!(json["sub"], "alice");
        assert_eq!(json["username"], "alice");
        assert_eq!(json["role"], "ADMIN");
        assert_eq!(json["userId"], "17");
        assert_eq!(json["email"], "alice@campus.edu");
        assert!(json["iat"].is_u64());
        assert!(json["exp"].is_u64());
        // unset optional claims stay off the wire
        assert!(json.get("name").is_none());
    }
}
