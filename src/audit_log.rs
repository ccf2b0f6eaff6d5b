//! Append-only audit trail
//!
//! One entry per inbound request, success or failure, in arrival order.
//! The actor is resolved best-effort from the bearer credential; failing
//! to resolve it is recorded, never fatal.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::storage::Journal;
use crate::types::Username;

/// Monotonically increasing entry number, starting at 1
pub type AuditSequence = u64;

/// Who made a request, as far as the credential tells
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Actor {
    User { username: Username },
    Anonymous,
    InvalidToken,
}

impl Actor {
    pub fn user(username: impl Into<Username>) -> Self {
        Actor::User {
            username: username.into(),
        }
    }

    pub fn username(&self) -> Option<&str> {
        match self {
            Actor::User { username } => Some(username.as_str()),
            _ => None,
        }
    }
}

impl fmt::Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Actor::User { username } => f.write_str(username),
            Actor::Anonymous => f.write_str("anonymous"),
            Actor::InvalidToken => f.write_str("invalid-token"),
        }
    }
}

/// A single audit entry
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuditEntry {
    pub seq: AuditSequence,
    pub timestamp: DateTime<Utc>,
    pub method: String,
    pub path: String,
    pub actor: Actor,
    /// HTTP status of the response
    pub status: u16,
}

struct Entries {
    all: Vec<AuditEntry>,
    /// username -> indices into `all`
    by_user: HashMap<Username, Vec<usize>>,
}

impl Entries {
    fn push(&mut self, entry: AuditEntry) {
        let idx = self.all.len();
        if let Some(name) = entry.actor.username() {
            self.by_user.entry(name.to_string()).or_default().push(idx);
        }
        self.all.push(entry);
    }
}

pub struct AuditLog {
    entries: RwLock<Entries>,
    journal: Journal<AuditEntry>,
}

impl AuditLog {
    pub fn new(path: PathBuf) -> Self {
        Self {
            entries: RwLock::new(Entries {
                all: Vec::new(),
                by_user: HashMap::new(),
            }),
            journal: Journal::new(path),
        }
    }

    /// Replay the journal into memory
    pub async fn load(&self) -> anyhow::Result<usize> {
        let records = self.journal.replay().await?;
        let mut entries = self.entries.write().await;
        for entry in records {
            entries.push(entry);
        }
        Ok(entries.all.len())
    }

    /// Append an entry for a completed request
    ///
    /// Sequence numbers are assigned under the write lock, so `seq` order
    /// and journal order agree.
    pub async fn record(
        &self,
        method: &str,
        path: &str,
        actor: Actor,
        status: u16,
    ) -> anyhow::Result<AuditEntry> {
        let mut entries = self.entries.write().await;
        let seq = entries.all.last().map_or(1, |e| e.seq + 1);

        let entry = AuditEntry {
            seq,
            timestamp: Utc::now(),
            method: method.to_string(),
            path: path.to_string(),
            actor,
            status,
        };

        self.journal.append(&entry).await?;
        entries.push(entry.clone());
        Ok(entry)
    }

    /// Entries made by `username`, most recent first
    pub async fn by_actor(&self, username: &str, limit: usize, offset: usize) -> Vec<AuditEntry> {
        let entries = self.entries.read().await;
        entries
            .by_user
            .get(username)
            .map(|indices| {
                indices
                    .iter()
                    .rev()
                    .skip(offset)
                    .take(limit)
                    .filter_map(|&idx| entries.all.get(idx).cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Most recent entries, newest first
    pub async fn recent(&self, limit: usize) -> Vec<AuditEntry> {
        self.entries
            .read()
            .await
            .all
            .iter()
            .rev()
            .take(limit)
            .cloned()
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.all.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.all.is_empty()
    }
}
