//! Core types for the relay service
//!
//! Identities, mailbox entries and the request/response shapes of the
//! HTTP surface.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Registered username (unique, case-sensitive)
pub type Username = String;

// ============ Identity Types ============

/// A username bound to one Ed25519 public key
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Identity {
    pub username: Username,
    /// PEM SubjectPublicKeyInfo as uploaded
    pub public_key_pem: String,
    /// SHA256 of the raw 32-byte key (hex)
    pub fingerprint: String,
    pub registered_at: DateTime<Utc>,
}

// ============ Mailbox Types ============

/// One relayed message, as stored and as returned from the inbox
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MailboxEntry {
    pub id: Uuid,
    /// Always the session subject of the relaying request
    pub sender: Username,
    #[serde(flatten)]
    pub body: MailboxBody,
    /// Hex signature over the body's signed bytes
    pub signature: String,
    pub received_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MailboxBody {
    Text {
        message: String,
    },
    Document {
        filename: String,
        #[serde(rename = "content_base64", with = "base64_bytes")]
        content: Vec<u8>,
    },
}

impl MailboxBody {
    /// The exact bytes the sender signed
    pub fn signed_bytes(&self) -> &[u8] {
        match self {
            MailboxBody::Text { message } => message.as_bytes(),
            MailboxBody::Document { content, .. } => content,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            MailboxBody::Text { .. } => "text",
            MailboxBody::Document { .. } => "document",
        }
    }
}

mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&BASE64.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        BASE64.decode(s.as_bytes()).map_err(serde::de::Error::custom)
    }
}

// ============ API Request Types ============

/// Session request (form)
#[derive(Debug, Deserialize)]
pub struct TokenRequest {
    pub username: String,
}

/// Verify a third party's signed text (form)
#[derive(Debug, Deserialize)]
pub struct VerifyTextRequest {
    pub sender: String,
    pub message: String,
    pub signature_hex: String,
}

/// Relay signed text to a recipient (form)
///
/// Carries no sender field: the sender is the session subject.
#[derive(Debug, Deserialize)]
pub struct RelayTextRequest {
    pub to: String,
    pub message: String,
    pub signature_hex: String,
}

/// Audit trail query params
#[derive(Debug, Deserialize, Default)]
pub struct AuditQuery {
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

// ============ Response Types ============

/// Standard API response wrapper
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            hint: None,
        }
    }
}

impl ApiResponse<()> {
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
            hint: None,
        }
    }

    pub fn error_with_hint(message: impl Into<String>, hint: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
            hint: Some(hint.into()),
        }
    }
}

/// Registration response
#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub message: String,
    pub identity: Identity,
}

/// Bearer credential handed out by POST /token
#[derive(Debug, Clone, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_at: DateTime<Utc>,
}

/// Successful verification
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VerifyResponse {
    /// Always "VALID"; failures are errors
    pub status: String,
    pub signed_by: Username,
    pub verified_by: Username,
}

/// Receipt for a relayed entry
#[derive(Debug, Clone, Serialize)]
pub struct RelayReceipt {
    pub message: String,
    pub id: Uuid,
    pub to: Username,
    #[serde(rename = "type")]
    pub kind: String,
    pub received_at: DateTime<Utc>,
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub time: DateTime<Utc>,
    pub uptime_seconds: u64,
    pub identities_count: usize,
    pub mailbox_entries: usize,
    pub audit_entries: usize,
}
