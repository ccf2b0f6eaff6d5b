//! Session credentials and request validation
//!
//! Sessions are stateless bearer tokens in compact JWS form
//! (`header.claims.mac`, base64url) with an HMAC-SHA256 tag under the
//! server secret. Holders can read their claims but cannot forge or
//! extend them. Nothing is stored server-side; validity is a function of
//! the token and the clock.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD as B64URL, Engine};
use chrono::{DateTime, Duration, TimeZone, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::config::SessionSecret;
use crate::types::Username;

type HmacSha256 = Hmac<Sha256>;

const TOKEN_ALG: &str = "HS256";

/// Why a credential was rejected
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    #[error("malformed token")]
    Malformed,
    #[error("unsupported token algorithm: {0}")]
    UnsupportedAlgorithm(String),
    #[error("token signature mismatch")]
    BadSignature,
    #[error("token expired")]
    Expired,
    #[error("session key unusable: {0}")]
    Key(String),
}

#[derive(Debug, Serialize, Deserialize)]
struct TokenHeader {
    alg: String,
    typ: String,
}

/// Claims carried by a session credential (unix seconds)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionClaims {
    pub sub: Username,
    pub iat: i64,
    pub exp: i64,
}

/// A freshly issued credential
#[derive(Debug, Clone)]
pub struct SessionCredential {
    pub token: String,
    pub subject: Username,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

pub struct SessionAuthenticator {
    secret: SessionSecret,
    ttl: Duration,
}

impl SessionAuthenticator {
    pub fn new(secret: SessionSecret, ttl: Duration) -> Self {
        Self { secret, ttl }
    }

    /// Issue a credential for `subject`. Callers check registration.
    pub fn issue(&self, subject: &str) -> Result<SessionCredential, TokenError> {
        self.issue_at(subject, Utc::now())
    }

    pub fn issue_at(
        &self,
        subject: &str,
        now: DateTime<Utc>,
    ) -> Result<SessionCredential, TokenError> {
        let issued_at = truncate_to_secs(now);
        let expires_at = issued_at + self.ttl;

        let header = TokenHeader {
            alg: TOKEN_ALG.into(),
            typ: "JWT".into(),
        };
        let claims = SessionClaims {
            sub: subject.to_string(),
            iat: issued_at.timestamp(),
            exp: expires_at.timestamp(),
        };

        let header_json = serde_json::to_vec(&header).map_err(|_| TokenError::Malformed)?;
        let claims_json = serde_json::to_vec(&claims).map_err(|_| TokenError::Malformed)?;
        let signing_input = format!(
            "{}.{}",
            B64URL.encode(header_json),
            B64URL.encode(claims_json)
        );

        let mut mac = self.keyed_mac()?;
        mac.update(signing_input.as_bytes());
        let tag = mac.finalize().into_bytes();

        Ok(SessionCredential {
            token: format!("{}.{}", signing_input, B64URL.encode(tag)),
            subject: claims.sub,
            issued_at,
            expires_at,
        })
    }

    /// Validate against the current wall clock
    pub fn validate(&self, token: &str) -> Result<SessionClaims, TokenError> {
        self.validate_at(token, Utc::now())
    }

    pub fn validate_at(&self, token: &str, now: DateTime<Utc>) -> Result<SessionClaims, TokenError> {
        let mut parts = token.trim().split('.');
        let (header_b64, claims_b64, tag_b64) = match (parts.next(), parts.next(), parts.next()) {
            (Some(h), Some(c), Some(t)) if parts.next().is_none() => (h, c, t),
            _ => return Err(TokenError::Malformed),
        };

        let header: TokenHeader = decode_segment(header_b64)?;
        if header.alg != TOKEN_ALG {
            return Err(TokenError::UnsupportedAlgorithm(header.alg));
        }

        let tag = B64URL
            .decode(tag_b64)
            .map_err(|_| TokenError::Malformed)?;
        let mut mac = self.keyed_mac()?;
        mac.update(header_b64.as_bytes());
        mac.update(b".");
        mac.update(claims_b64.as_bytes());
        mac.verify_slice(&tag)
            .map_err(|_| TokenError::BadSignature)?;

        let claims: SessionClaims = decode_segment(claims_b64)?;
        if claims.sub.is_empty() {
            return Err(TokenError::Malformed);
        }
        if now.timestamp() >= claims.exp {
            return Err(TokenError::Expired);
        }

        Ok(claims)
    }

    fn keyed_mac(&self) -> Result<HmacSha256, TokenError> {
        HmacSha256::new_from_slice(self.secret.as_bytes()).map_err(|e| TokenError::Key(e.to_string()))
    }
}

impl SessionClaims {
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_opt(self.exp, 0).single()
    }
}

fn decode_segment<T: for<'de> Deserialize<'de>>(segment: &str) -> Result<T, TokenError> {
    let bytes = B64URL.decode(segment).map_err(|_| TokenError::Malformed)?;
    serde_json::from_slice(&bytes).map_err(|_| TokenError::Malformed)
}

fn truncate_to_secs(t: DateTime<Utc>) -> DateTime<Utc> {
    Utc.timestamp_opt(t.timestamp(), 0).single().unwrap_or(t)
}

/// Pull the token out of an `Authorization: Bearer <token>` header value
///
/// Returns `None` when the scheme is not bearer; `Some("")` when it is
/// bearer but carries no token.
pub fn bearer_token(header_value: &str) -> Option<&str> {
    let value = header_value.trim_start();
    let scheme = value.get(..6)?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let rest = &value[6..];
    if !rest.is_empty() && !rest.starts_with(char::is_whitespace) {
        return None;
    }
    Some(rest.trim())
}

// ============ Validation Functions ============

/// Validate a username
pub fn validate_username(name: &str) -> Result<(), &'static str> {
    if name.is_empty() {
        return Err("Username cannot be empty");
    }
    if name.len() > 64 {
        return Err("Username must be at most 64 characters");
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.')
    {
        return Err("Username must contain only alphanumeric characters, underscores, hyphens, and dots");
    }
    Ok(())
}

/// Reduce an uploaded filename to a bare name
pub fn normalize_filename(name: Option<&str>) -> String {
    let base = name
        .and_then(|n| n.rsplit(['/', '\\']).next())
        .map(|n| n.trim())
        .unwrap_or("");
    if base.is_empty() || base == "." || base == ".." {
        return "document".to_string();
    }
    base.chars().filter(|c| !c.is_control()).take(255).collect()
}
