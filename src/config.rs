use std::env;
use std::fmt;
use std::path::PathBuf;

use chrono::Duration;

/// HMAC key for session credentials. Debug output is redacted.
#[derive(Clone)]
pub struct SessionSecret(Vec<u8>);

impl SessionSecret {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// 32 random bytes; credentials signed with it die with the process
    pub fn random() -> Self {
        let bytes: [u8; 32] = rand::random();
        Self(bytes.to_vec())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for SessionSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SessionSecret(..)")
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub version: String,
    pub host: String,
    pub port: u16,
    pub data_dir: PathBuf,
    pub session_secret: SessionSecret,
    pub session_ttl: Duration,
    pub max_document_bytes: usize,
    pub require_registered_recipient: bool,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port: env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(8080),
            data_dir: env::var("DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./data")),
            session_secret: match env::var("SESSION_SECRET") {
                Ok(s) if !s.is_empty() => SessionSecret::new(s.into_bytes()),
                _ => {
                    tracing::warn!(
                        "SESSION_SECRET not set, using a random key; sessions will not survive a restart"
                    );
                    SessionSecret::random()
                }
            },
            session_ttl: Duration::minutes(
                env::var("SESSION_TTL_MINUTES")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .filter(|m: &i64| *m > 0)
                    .unwrap_or(60),
            ),
            max_document_bytes: env::var("MAX_DOCUMENT_BYTES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(10 * 1024 * 1024),
            require_registered_recipient: env::var("REQUIRE_REGISTERED_RECIPIENT")
                .ok()
                .map(|s| !matches!(s.to_ascii_lowercase().as_str(), "0" | "false" | "no"))
                .unwrap_or(true),
        }
    }

    pub fn identities_path(&self) -> PathBuf {
        self.data_dir.join("identities.jsonl")
    }

    pub fn mailboxes_path(&self) -> PathBuf {
        self.data_dir.join("mailboxes.jsonl")
    }

    pub fn audit_log_path(&self) -> PathBuf {
        self.data_dir.join("audit_log.jsonl")
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}
