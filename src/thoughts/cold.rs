use crate::error::StoreError;
use chrono::{DateTime, Local, NaiveDate};
use std::io::Write;
use std::path::PathBuf;

const SEPARATOR_WIDTH: usize = 40;

/// Append-only archive, one file per calendar day. Never read back here.
#[derive(Debug, Clone)]
pub struct ColdLog {
    dir: PathBuf,
}

impl ColdLog {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, date: NaiveDate) -> PathBuf {
        self.dir
            .join(format!("{}_thought.log", date.format("%Y-%m-%d")))
    }

    pub fn append(
        &self,
        session_id: &str,
        content: &str,
        now: DateTime<Local>,
    ) -> Result<(), StoreError> {
        std::fs::create_dir_all(&self.dir).map_err(|source| StoreError::Io {
            path: self.dir.display().to_string(),
            source,
        })?;
        let path = self.path_for(now.date_naive());
        let record = format!(
            "[{}] [Session: {session_id}]\n{content}\n{}\n",
            now.format("%H:%M:%S"),
            "-".repeat(SEPARATOR_WIDTH)
        );
        std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .and_then(|mut file| file.write_all(record.as_bytes()))
            .map_err(|source| StoreError::Io {
                path: path.display().to_string(),
                source,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    #[test]
    fn appends_records_in_write_order() {
        let tmp = TempDir::new().unwrap();
        let log = ColdLog::new(tmp.path());
        let at = Local.with_ymd_and_hms(2025, 3, 9, 14, 5, 7).unwrap();

        log.append("qq:1", "first", at).unwrap();
        log.append("qq:2", "second\nline", at).unwrap();

        let path = tmp.path().join("2025-03-09_thought.log");
        let raw = std::fs::read_to_string(path).unwrap();
        let dashes = "-".repeat(40);
        assert_eq!(
            raw,
            format!(
                "[14:05:07] [Session: qq:1]\nfirst\n{dashes}\n[14:05:07] [Session: qq:2]\nsecond\nline\n{dashes}\n"
            )
        );
    }

    #[test]
    fn days_go_to_separate_files() {
        let tmp = TempDir::new().unwrap();
        let log = ColdLog::new(tmp.path());
        log.append("s", "a", Local.with_ymd_and_hms(2025, 1, 1, 23, 59, 0).unwrap())
            .unwrap();
        log.append("s", "b", Local.with_ymd_and_hms(2025, 1, 2, 0, 1, 0).unwrap())
            .unwrap();
        assert!(tmp.path().join("2025-01-01_thought.log").exists());
        assert!(tmp.path().join("2025-01-02_thought.log").exists());
    }
}
