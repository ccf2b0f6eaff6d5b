//! Identity registry
//!
//! Binds each username to exactly one Ed25519 public key. Registration is
//! append-only: a bound key is never replaced or removed.

use std::collections::HashMap;
use std::path::PathBuf;

use chrono::Utc;
use ed25519_dalek::VerifyingKey;
use tokio::sync::RwLock;

use crate::crypto::{fingerprint, parse_public_key_bytes, parse_public_key_pem, CryptoResult};
use crate::error::{ApiError, ApiResult};
use crate::storage::Journal;
use crate::types::{Identity, Username};

pub struct IdentityRegistry {
    identities: RwLock<HashMap<Username, Identity>>,
    journal: Journal<Identity>,
}

impl IdentityRegistry {
    pub fn new(path: PathBuf) -> Self {
        Self {
            identities: RwLock::new(HashMap::new()),
            journal: Journal::new(path),
        }
    }

    /// Replay the journal into memory
    pub async fn load(&self) -> anyhow::Result<usize> {
        let records = self.journal.replay().await?;
        let mut identities = self.identities.write().await;

        for identity in records {
            if identities.contains_key(&identity.username) {
                tracing::warn!(
                    "Ignoring duplicate registration for {} in {}",
                    identity.username,
                    self.journal.path().display()
                );
                continue;
            }
            identities.insert(identity.username.clone(), identity);
        }

        Ok(identities.len())
    }

    /// Bind `username` to the PEM public key in `key_material`
    ///
    /// A taken username is reported before the key is looked at.
    pub async fn register(&self, username: &str, key_material: &[u8]) -> ApiResult<Identity> {
        let mut identities = self.identities.write().await;
        if identities.contains_key(username) {
            return Err(ApiError::AlreadyExists("User exists".into()));
        }

        let key = parse_public_key_bytes(key_material)?;
        let pem = String::from_utf8_lossy(key_material).trim().to_string();

        let identity = Identity {
            username: username.to_string(),
            public_key_pem: pem,
            fingerprint: fingerprint(&key),
            registered_at: Utc::now(),
        };

        self.journal
            .append(&identity)
            .await
            .map_err(|e| ApiError::internal(format!("Failed to persist identity: {}", e)))?;
        identities.insert(identity.username.clone(), identity.clone());

        tracing::info!("Registered identity: {} ({})", identity.username, &identity.fingerprint[..16]);
        Ok(identity)
    }

    pub async fn lookup(&self, username: &str) -> ApiResult<Identity> {
        self.identities
            .read()
            .await
            .get(username)
            .cloned()
            .ok_or_else(|| ApiError::not_found(format!("User {} not registered", username)))
    }

    /// Registered key for `username`, decoded for verification
    pub async fn public_key(&self, username: &str) -> ApiResult<VerifyingKey> {
        let identity = self.lookup(username).await?;
        Ok(identity.verifying_key()?)
    }

    pub async fn contains(&self, username: &str) -> bool {
        self.identities.read().await.contains_key(username)
    }

    pub async fn len(&self) -> usize {
        self.identities.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.identities.read().await.is_empty()
    }
}

impl Identity {
    pub fn verifying_key(&self) -> CryptoResult<VerifyingKey> {
        parse_public_key_pem(&self.public_key_pem)
    }
}
