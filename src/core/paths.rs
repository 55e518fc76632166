//! Cross-platform application paths

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;

use crate::error::{Error, Result};

#[derive(Debug, Clone)]
pub struct AppPaths {
    data_dir: PathBuf,
}

impl AppPaths {
    pub fn new() -> Result<Self> {
        let base = dirs::data_dir()
            .ok_or_else(|| Error::Config("could not determine data directory".to_string()))?;
        Self::at(base.join("schizoid"))
    }

    /// Uses `data_dir` instead of the platform default, creating it if needed.
    pub fn at(data_dir: impl Into<PathBuf>) -> Result<Self> {
        let data_dir = data_dir.into();
        fs::create_dir_all(&data_dir)?;
        Ok(Self { data_dir })
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn records_dir(&self) -> PathBuf {
        self.data_dir.join("records")
    }

    pub fn debug_log_dir(&self) -> PathBuf {
        self.data_dir.join("debug")
    }

    pub fn config_file(&self) -> PathBuf {
        self.data_dir.join("config.json")
    }

    pub fn log_file(&self) -> PathBuf {
        self.data_dir.join("schizoid.log")
    }

    /// Output file for one run: `records/<subject>-<UTC timestamp>.json`.
    pub fn record_file(&self, subject: &str) -> PathBuf {
        let stamp = Utc::now().format("%Y%m%dT%H%M%S");
        let subject: String = subject
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.records_dir().join(format!("{subject}-{stamp}.json"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_under_data_dir() {
        let dir = tempfile::tempdir().unwrap();
        let paths = AppPaths::at(dir.path().join("app")).unwrap();
        assert!(paths.data_dir().is_dir());
        assert_eq!(paths.config_file(), dir.path().join("app").join("config.json"));
        assert_eq!(paths.debug_log_dir(), dir.path().join("app").join("debug"));

        let record = paths.record_file("s 01/../x");
        assert_eq!(record.parent(), Some(paths.records_dir().as_path()));
        let name = record.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("s_01____x-"));
        assert!(name.ends_with(".json"));
    }
}
