//! Per-recipient relay mailboxes
//!
//! Each recipient has an append-only queue; insertion order is delivery
//! order. Reads are non-destructive, so an owner sees the same (growing)
//! sequence on every drain.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::{ApiError, ApiResult};
use crate::storage::Journal;
use crate::types::{MailboxEntry, Username};

/// Journal record: one deposited entry and who it is for
#[derive(Debug, Serialize, Deserialize)]
struct Deposit {
    recipient: Username,
    entry: MailboxEntry,
}

pub struct Mailbox {
    boxes: RwLock<HashMap<Username, Vec<MailboxEntry>>>,
    total: AtomicUsize,
    journal: Journal<Deposit>,
}

impl Mailbox {
    pub fn new(path: PathBuf) -> Self {
        Self {
            boxes: RwLock::new(HashMap::new()),
            total: AtomicUsize::new(0),
            journal: Journal::new(path),
        }
    }

    /// Replay the journal into memory
    pub async fn load(&self) -> anyhow::Result<usize> {
        let records = self.journal.replay().await?;
        let mut boxes = self.boxes.write().await;
        let count = records.len();

        for Deposit { recipient, entry } in records {
            boxes.entry(recipient).or_default().push(entry);
        }
        self.total
            .store(boxes.values().map(Vec::len).sum(), Ordering::SeqCst);

        Ok(count)
    }

    /// Append `entry` to the recipient's queue
    ///
    /// Any recipient string is accepted here; whether recipients must be
    /// registered is decided by the caller.
    pub async fn deposit(&self, recipient: &str, entry: MailboxEntry) -> ApiResult<()> {
        let mut boxes = self.boxes.write().await;

        let record = Deposit {
            recipient: recipient.to_string(),
            entry,
        };
        self.journal
            .append(&record)
            .await
            .map_err(|e| ApiError::internal(format!("Failed to persist mailbox entry: {}", e)))?;

        boxes.entry(record.recipient).or_default().push(record.entry);
        self.total.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    /// Every entry queued for `owner`, oldest first
    pub async fn drain(&self, owner: &str) -> Vec<MailboxEntry> {
        self.boxes
            .read()
            .await
            .get(owner)
            .cloned()
            .unwrap_or_default()
    }

    pub async fn count(&self, owner: &str) -> usize {
        self.boxes.read().await.get(owner).map_or(0, Vec::len)
    }

    /// Entries across all mailboxes
    pub fn total(&self) -> usize {
        self.total.load(Ordering::SeqCst)
    }
}
