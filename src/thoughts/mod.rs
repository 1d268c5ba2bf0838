//! Two-tier reasoning log.
//!
//! Every finalized reply writes its reasoning twice: to a per-day cold
//! archive that only grows, and to a bounded per-session hot file that the
//! fetch/summarize commands read from.

pub mod cold;
pub mod hot;

use crate::config::Config;
use crate::error::StoreError;
use chrono::Local;
use cold::ColdLog;
use hot::{HotEntry, HotLog};
use std::path::PathBuf;
use tokio::sync::Mutex;

/// Logged in place of an empty thought.
pub const NO_THOUGHT: &str = "[NO_THOUGHT]";

#[derive(Debug)]
pub struct HybridLogStore {
    hot: HotLog,
    cold: ColdLog,
    /// Serializes read-modify-write cycles on hot files.
    write_lock: Mutex<()>,
}

impl HybridLogStore {
    pub fn new(hot_dir: impl Into<PathBuf>, cold_dir: impl Into<PathBuf>, limit: usize) -> Self {
        Self {
            hot: HotLog::new(hot_dir, limit),
            cold: ColdLog::new(cold_dir),
            write_lock: Mutex::new(()),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.hot_log_dir(),
            config.cold_log_dir(),
            config.thought_log.history_limit,
        )
    }

    /// Cold append, then hot read-modify-write. File work runs on the
    /// blocking pool.
    pub async fn append(&self, session_id: &str, content: &str) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        let hot = self.hot.clone();
        let cold = self.cold.clone();
        let session_id = session_id.to_string();
        let content = content.to_string();
        tokio::task::spawn_blocking(move || {
            let now = Local::now();
            cold.append(&session_id, &content, now)?;
            hot.push(&session_id, &content, now)
        })
        .await
        .map_err(|e| StoreError::Join(e.to_string()))?
    }

    /// Entry `index` (1 = most recent) of the session's hot log.
    pub async fn read(&self, session_id: &str, index: usize) -> Result<Option<HotEntry>, StoreError> {
        let hot = self.hot.clone();
        let session_id = session_id.to_string();
        tokio::task::spawn_blocking(move || hot.get(&session_id, index))
            .await
            .map_err(|e| StoreError::Join(e.to_string()))?
    }

    /// Whole hot log, most recent first.
    pub async fn entries(&self, session_id: &str) -> Result<Vec<HotEntry>, StoreError> {
        let hot = self.hot.clone();
        let session_id = session_id.to_string();
        tokio::task::spawn_blocking(move || hot.load(&session_id))
            .await
            .map_err(|e| StoreError::Join(e.to_string()))?
    }
}
