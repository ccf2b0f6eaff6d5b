//! Append-only JSON Lines journal
//!
//! Each durable store (identities, mailboxes, audit trail) owns one
//! journal. Records are appended one per line and synced before the
//! append returns. Callers serialize appends with their own store lock.

use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;

pub struct Journal<T> {
    path: PathBuf,
    _record: PhantomData<fn(T) -> T>,
}

impl<T: Serialize + DeserializeOwned> Journal<T> {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            _record: PhantomData,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read every record in file order
    ///
    /// A missing file is an empty journal. Lines that fail to parse (a torn
    /// final write after a crash, typically) are skipped with a warning.
    pub async fn replay(&self) -> anyhow::Result<Vec<T>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let text = tokio::fs::read_to_string(&self.path).await?;
        let mut records = Vec::new();

        for (lineno, line) in text.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str(line) {
                Ok(record) => records.push(record),
                Err(e) => tracing::warn!(
                    "Skipping unreadable record at {}:{}: {}",
                    self.path.display(),
                    lineno + 1,
                    e
                ),
            }
        }

        // Terminate a torn tail so the next append starts on its own line
        if !text.is_empty() && !text.ends_with('\n') {
            let mut file = OpenOptions::new().append(true).open(&self.path).await?;
            file.write_all(b"\n").await?;
            file.sync_data().await?;
        }

        Ok(records)
    }

    /// Append one record and sync it to disk
    pub async fn append(&self, record: &T) -> anyhow::Result<()> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(&line).await?;
        file.sync_data().await?;
        Ok(())
    }
}
