use std::path::{Path, PathBuf};

use chrono::Local;
use iris_core::error::AppError;
use iris_core::models::Record;
use iris_core::traits::RecordSink;

/// Writes each batch as a pretty-printed JSON array to
/// `<dir>/<label>_<YYYYMMDD_HHMMSS>.json`.
///
/// Non-ASCII text is written verbatim. The directory is created on demand.
#[derive(Debug, Clone)]
pub struct JsonFileSink {
    dir: PathBuf,
}

impl JsonFileSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// First free path for `stem`, appending `_1`, `_2`, ... on collision.
    async fn free_path(&self, stem: &str) -> PathBuf {
        let mut path = self.dir.join(format!("{stem}.json"));
        let mut n = 1;
        while tokio::fs::try_exists(&path).await.unwrap_or(false) {
            path = self.dir.join(format!("{stem}_{n}.json"));
            n += 1;
        }
        path
    }
}

impl RecordSink for JsonFileSink {
    async fn persist(&self, label: &str, records: &[Record]) -> Result<PathBuf, AppError> {
        tokio::fs::create_dir_all(&self.dir).await.map_err(|e| {
            AppError::PersistenceError(format!(
                "Failed to create output directory {}: {e}",
                self.dir.display()
            ))
        })?;

        let stem = format!(
            "{}_{}",
            sanitize(label),
            Local::now().format("%Y%m%d_%H%M%S")
        );
        let path = self.free_path(&stem).await;

        let json = serde_json::to_string_pretty(records)?;
        tokio::fs::write(&path, json).await.map_err(|e| {
            AppError::PersistenceError(format!("Failed to write {}: {e}", path.display()))
        })?;

        Ok(path)
    }
}

/// Keep labels usable as a single file-name component.
fn sanitize(label: &str) -> String {
    let cleaned: String = label
        .trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_whitespace() => '_',
            c => c,
        })
        .collect();
    if cleaned.is_empty() {
        "batch".to_string()
    } else {
        cleaned
    }
}
