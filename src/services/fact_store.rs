//! Fact store adapters.
//!
//! [`InMemoryFactStore`] keeps facts for the lifetime of the process.
//! [`JsonlFactStore`] appends one JSON record per line and re-reads the file
//! on every listing, skipping lines it cannot parse.

use crate::services::{Fact, FactStore, ServiceError};
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Mutex;
use tokio::io::AsyncWriteExt;
use tracing::warn;

/// Process-local fact store.
#[derive(Debug, Default)]
pub struct InMemoryFactStore {
    facts: Mutex<Vec<Fact>>,
}

impl InMemoryFactStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl FactStore for InMemoryFactStore {
    async fn record_fact(&self, text: &str, category: &str) -> Result<(), ServiceError> {
        let mut facts = self.facts.lock().unwrap_or_else(|e| e.into_inner());
        facts.push(Fact::new(text, category));
        Ok(())
    }

    async fn list_facts(&self) -> Result<Vec<Fact>, ServiceError> {
        let facts = self.facts.lock().unwrap_or_else(|e| e.into_inner());
        Ok(facts.clone())
    }
}

/// Append-only JSON-lines fact store.
#[derive(Debug)]
pub struct JsonlFactStore {
    path: PathBuf,
    write_lock: tokio::sync::Mutex<()>,
}

impl JsonlFactStore {
    /// Create a store bound to `path`. The file is created on first write.
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Backing file path.
    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

#[async_trait]
impl FactStore for JsonlFactStore {
    async fn record_fact(&self, text: &str, category: &str) -> Result<(), ServiceError> {
        let line = serde_json::to_string(&Fact::new(text, category))
            .map_err(|e| ServiceError::InvalidResponse(format!("failed to encode fact: {e}")))?;

        let _guard = self.write_lock.lock().await;
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                ServiceError::Unavailable(format!("failed to create fact store directory: {e}"))
            })?;
        }

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| ServiceError::Unavailable(format!("failed to open fact store: {e}")))?;
        file.write_all(format!("{line}\n").as_bytes())
            .await
            .map_err(|e| ServiceError::Unavailable(format!("failed to append fact: {e}")))?;
        file.flush()
            .await
            .map_err(|e| ServiceError::Unavailable(format!("failed to flush fact store: {e}")))?;
        Ok(())
    }

    async fn list_facts(&self) -> Result<Vec<Fact>, ServiceError> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(ServiceError::Unavailable(format!(
                    "failed to read fact store: {e}"
                )));
            }
        };

        let mut facts = Vec::new();
        for line in content.lines() {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            match serde_json::from_str::<Fact>(trimmed) {
                Ok(fact) => facts.push(fact),
                Err(e) => {
                    warn!(
                        "ignoring malformed fact line in {}: {e}",
                        self.path.display()
                    );
                }
            }
        }
        Ok(facts)
    }
}
