//! Application state for the relay service
//!
//! Owns the three durable stores and the session authenticator, and
//! implements the protocol operations on top of them. Each store locks
//! independently; nothing here takes a process-wide lock.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use uuid::Uuid;

use crate::audit_log::{Actor, AuditLog};
use crate::auth::{bearer_token, validate_username, SessionAuthenticator};
use crate::config::Config;
use crate::crypto::{decode_signature_hex, verify, Verification};
use crate::error::{ApiError, ApiResult};
use crate::mailbox::Mailbox;
use crate::registry::IdentityRegistry;
use crate::types::*;

/// Global application state
pub struct AppState {
    pub registry: IdentityRegistry,
    pub sessions: SessionAuthenticator,
    pub mailbox: Mailbox,
    pub audit: AuditLog,
    pub config: Config,
    /// Start time for uptime calculation
    pub start_time: Instant,
}

impl AppState {
    pub fn new(config: Config) -> Arc<Self> {
        Arc::new(Self {
            registry: IdentityRegistry::new(config.identities_path()),
            sessions: SessionAuthenticator::new(config.session_secret.clone(), config.session_ttl),
            mailbox: Mailbox::new(config.mailboxes_path()),
            audit: AuditLog::new(config.audit_log_path()),
            config,
            start_time: Instant::now(),
        })
    }

    /// Load all stores from disk
    pub async fn load_from_disk(&self) -> anyhow::Result<()> {
        let identities = self.registry.load().await?;
        let deposits = self.mailbox.load().await?;
        let audit_entries = self.audit.load().await?;

        tracing::info!(
            "Loaded state: {} identities, {} mailbox entries, {} audit entries",
            identities,
            deposits,
            audit_entries
        );
        Ok(())
    }

    // ============ Identity Operations ============

    /// Register a username with an uploaded PEM public key
    pub async fn register(&self, username: &str, key_material: &[u8]) -> ApiResult<Identity> {
        validate_username(username).map_err(ApiError::bad_request)?;
        self.registry.register(username, key_material).await
    }

    /// Issue a session for a registered username
    ///
    /// Knowing a registered username is enough; no proof of key possession
    /// is asked for.
    pub async fn issue_session(&self, username: &str) -> ApiResult<TokenResponse> {
        if !self.registry.contains(username).await {
            return Err(ApiError::NotRegistered("User not registered".into()));
        }

        let credential = self
            .sessions
            .issue(username)
            .map_err(|e| ApiError::internal(e.to_string()))?;

        tracing::debug!("Issued session for {} until {}", username, credential.expires_at);
        Ok(TokenResponse {
            access_token: credential.token,
            token_type: "bearer".into(),
            expires_at: credential.expires_at,
        })
    }

    /// Resolve a bearer token to its subject
    pub fn authenticate(&self, token: &str) -> ApiResult<Username> {
        self.sessions
            .validate(token)
            .map(|claims| claims.sub)
            .map_err(|e| {
                tracing::debug!("Rejected session credential: {}", e);
                ApiError::Unauthorized
            })
    }

    /// Best-effort actor for the audit trail; never fails
    pub fn resolve_actor(&self, authorization: Option<&str>) -> Actor {
        match authorization.and_then(bearer_token) {
            None => Actor::Anonymous,
            Some(token) => match self.sessions.validate(token) {
                Ok(claims) => Actor::user(claims.sub),
                Err(_) => Actor::InvalidToken,
            },
        }
    }

    // ============ Verification ============

    /// Check `signature_hex` over `payload` against `sender`'s registered key
    ///
    /// `verifier` is the session subject asking; it is only echoed back.
    pub async fn verify_payload(
        &self,
        verifier: &str,
        sender: &str,
        payload: &[u8],
        signature_hex: &str,
    ) -> ApiResult<VerifyResponse> {
        let public_key = self
            .registry
            .public_key(sender)
            .await
            .map_err(|e| match e {
                ApiError::NotFound(_) => ApiError::not_found("Sender not registered"),
                other => other,
            })?;

        let signature = decode_signature_hex(signature_hex)?;
        check(verify(&public_key, payload, &signature))?;

        Ok(VerifyResponse {
            status: "VALID".into(),
            signed_by: sender.to_string(),
            verified_by: verifier.to_string(),
        })
    }

    // ============ Relay ============

    /// Verify and enqueue a payload from `sender` to `recipient`
    ///
    /// `sender` must be the subject of the caller's validated session.
    /// Nothing is written unless the signature verifies.
    pub async fn relay(
        &self,
        sender: &str,
        recipient: &str,
        body: MailboxBody,
        signature_hex: &str,
    ) -> ApiResult<RelayReceipt> {
        if recipient.is_empty() {
            return Err(ApiError::bad_request("Recipient cannot be empty"));
        }
        if self.config.require_registered_recipient && !self.registry.contains(recipient).await {
            return Err(ApiError::not_found("Recipient not registered"));
        }

        // Sessions are only issued to registered users and registrations are permanent
        let public_key = self
            .registry
            .public_key(sender)
            .await
            .map_err(|_| ApiError::Unauthorized)?;

        let signature = decode_signature_hex(signature_hex)?;
        check(verify(&public_key, body.signed_bytes(), &signature))?;

        let entry = MailboxEntry {
            id: Uuid::new_v4(),
            sender: sender.to_string(),
            body,
            signature: hex::encode(&signature),
            received_at: Utc::now(),
        };
        let receipt = RelayReceipt {
            message: match entry.body {
                MailboxBody::Text { .. } => "Text relayed".into(),
                MailboxBody::Document { .. } => "Document relayed".into(),
            },
            id: entry.id,
            to: recipient.to_string(),
            kind: entry.body.kind().to_string(),
            received_at: entry.received_at,
        };

        self.mailbox.deposit(recipient, entry).await?;
        tracing::info!("Relayed {} {} from {} to {}", receipt.kind, receipt.id, sender, recipient);

        Ok(receipt)
    }

    /// Everything queued for `owner`, in receipt order
    pub async fn inbox(&self, owner: &str) -> Vec<MailboxEntry> {
        self.mailbox.drain(owner).await
    }

    /// Get health info
    pub async fn health(&self) -> HealthResponse {
        HealthResponse {
            status: "OK".into(),
            version: self.config.version.clone(),
            time: Utc::now(),
            uptime_seconds: self.start_time.elapsed().as_secs(),
            identities_count: self.registry.len().await,
            mailbox_entries: self.mailbox.total(),
            audit_entries: self.audit.len().await,
        }
    }
}

fn check(verdict: Verification) -> ApiResult<()> {
    match verdict {
        Verification::Valid => Ok(()),
        Verification::Invalid => Err(ApiError::SignatureInvalid),
        Verification::MalformedSignature => Err(ApiError::MalformedSignature(
            "Ed25519 signature must be 64 bytes".into(),
        )),
    }
}
