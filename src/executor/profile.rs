//! Read-only view of the user profile directory

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::core::error::AgentResult;

/// Summary of the profile files
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ProfileStatus {
    /// Whether the profile directory exists
    pub exists: bool,
    /// Number of markdown files
    pub total_files: usize,
    /// Most recent modification time of any profile file
    pub last_modified: Option<DateTime<Local>>,
    /// File counts per top-level sub-directory ("root" for top-level files)
    pub categories: BTreeMap<String, usize>,
}

/// Something that can describe the current state of the user profile
pub trait ProfileSource: Send + Sync {
    fn status(&self) -> AgentResult<ProfileStatus>;
}

/// Profile stored as markdown files under a directory
#[derive(Debug, Clone)]
pub struct FsProfileSource {
    root: PathBuf,
}

impl FsProfileSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn scan(&self, dir: &Path, category: Option<&str>, status: &mut ProfileStatus) -> AgentResult<()> {
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let path = entry.path();
            let metadata = entry.metadata()?;

            if metadata.is_dir() {
                let name = entry.file_name().to_string_lossy().to_string();
                self.scan(&path, Some(category.unwrap_or(&name)), status)?;
                continue;
            }
            if path.extension().and_then(|e| e.to_str()) != Some("md") {
                continue;
            }

            status.total_files += 1;
            *status
                .categories
                .entry(category.unwrap_or("root").to_string())
                .or_insert(0) += 1;

            if let Ok(modified) = metadata.modified() {
                let modified: DateTime<Local> = modified.into();
                if status.last_modified.map_or(true, |last| modified > last) {
                    status.last_modified = Some(modified);
                }
            }
        }
        Ok(())
    }
}

impl ProfileSource for FsProfileSource {
    fn status(&self) -> AgentResult<ProfileStatus> {
        let mut status = ProfileStatus::default();
        if !self.root.is_dir() {
            debug!("Profile directory {} does not exist", self.root.display());
            return Ok(status);
        }

        status.exists = true;
        self.scan(&self.root, None, &mut status)?;
        Ok(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_directory_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let status = FsProfileSource::new(dir.path().join("nope")).status().unwrap();
        assert!(!status.exists);
        assert_eq!(status.total_files, 0);
    }

    #[test]
    fn test_counts_markdown_by_category() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("about.md"), "# me").unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();
        fs::create_dir_all(dir.path().join("work").join("projects")).unwrap();
        fs::write(dir.path().join("work").join("role.md"), "# role").unwrap();
        fs::write(dir.path().join("work").join("projects").join("agent.md"), "# agent").unwrap();

        let status = FsProfileSource::new(dir.path()).status().unwrap();
        assert!(status.exists);
        assert_eq!(status.total_files, 3);
        assert_eq!(status.categories.get("root"), Some(&1));
        assert_eq!(status.categories.get("work"), Some(&2));
        assert!(status.last_modified.is_some());
    }
}
