use crate::error::StoreError;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HotEntry {
    pub time: String,
    pub content: String,
}

/// Session ids carry platform separators (`qq:group:123`); keep file names portable.
pub fn sanitize_session_id(session_id: &str) -> String {
    session_id
        .chars()
        .map(|c| match c {
            ':' | '\\' | '/' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            other => other,
        })
        .collect()
}

fn io_error(path: &Path, source: std::io::Error) -> StoreError {
    StoreError::Io {
        path: path.display().to_string(),
        source,
    }
}

/// One JSON file per session, newest entry first, at most `limit` entries.
#[derive(Debug, Clone)]
pub struct HotLog {
    dir: PathBuf,
    limit: usize,
}

impl HotLog {
    pub fn new(dir: impl Into<PathBuf>, limit: usize) -> Self {
        Self {
            dir: dir.into(),
            limit: limit.max(1),
        }
    }

    pub fn path_for(&self, session_id: &str) -> PathBuf {
        self.dir
            .join(format!("{}.json", sanitize_session_id(session_id)))
    }

    pub fn load(&self, session_id: &str) -> Result<Vec<HotEntry>, StoreError> {
        let path = self.path_for(session_id);
        let raw = match std::fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(io_error(&path, e)),
        };
        if raw.trim().is_empty() {
            return Ok(Vec::new());
        }
        serde_json::from_str(&raw).map_err(|e| StoreError::Corrupt {
            path: path.display().to_string(),
            message: e.to_string(),
        })
    }

    /// Insert at the front and drop the oldest beyond the limit.
    pub fn push(
        &self,
        session_id: &str,
        content: &str,
        now: DateTime<Local>,
    ) -> Result<(), StoreError> {
        let mut entries = match self.load(session_id) {
            Ok(entries) => entries,
            Err(StoreError::Corrupt { path, message }) => {
                tracing::warn!(%path, %message, "hot log unreadable, starting a fresh one");
                Vec::new()
            }
            Err(e) => return Err(e),
        };
        entries.insert(
            0,
            HotEntry {
                time: now.format(TIME_FORMAT).to_string(),
                content: content.to_string(),
            },
        );
        entries.truncate(self.limit);

        std::fs::create_dir_all(&self.dir).map_err(|e| io_error(&self.dir, e))?;
        let path = self.path_for(session_id);
        let tmp = path.with_extension("json.tmp");
        let data = serde_json::to_vec_pretty(&entries).map_err(|e| StoreError::Corrupt {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        std::fs::write(&tmp, data).map_err(|e| io_error(&tmp, e))?;
        std::fs::rename(&tmp, &path).map_err(|e| io_error(&path, e))
    }

    /// 1-based, most recent first.
    pub fn get(&self, session_id: &str, index: usize) -> Result<Option<HotEntry>, StoreError> {
        if index == 0 {
            return Ok(None);
        }
        Ok(self.load(session_id)?.into_iter().nth(index - 1))
    }
}
