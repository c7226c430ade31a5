use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::app::ports::ArchiveSource;
use crate::domain::{ArchiveEntry, Disease};
use crate::error::{AnalysisError, Result};

/// Reads already extracted source archives:
/// `{root}/cases/{DENGBR23.csv,..}` and `{root}/climate/{year}/*`
#[derive(Debug, Clone)]
pub struct DirectoryArchive {
    root: PathBuf,
}

impl DirectoryArchive {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

fn archive_error(path: &Path, reason: impl Into<String>) -> AnalysisError {
    AnalysisError::Archive {
        source_name: path.display().to_string(),
        reason: reason.into(),
    }
}

impl ArchiveSource for DirectoryArchive {
    fn case_archive(&self, disease: Disease, year: i32) -> Result<Vec<ArchiveEntry>> {
        let name = disease.source_file_name(year);
        let path = self.root.join("cases").join(&name);
        let bytes = fs::read(&path).map_err(|e| archive_error(&path, e.to_string()))?;
        if bytes.is_empty() {
            return Err(archive_error(&path, "file is empty"));
        }
        info!("Read case source {} ({} bytes)", path.display(), bytes.len());
        Ok(vec![ArchiveEntry { name, bytes }])
    }

    fn climate_archive(&self, year: i32) -> Result<Vec<ArchiveEntry>> {
        let dir = self.root.join("climate").join(year.to_string());
        let listing = fs::read_dir(&dir).map_err(|e| archive_error(&dir, e.to_string()))?;

        let mut entries = Vec::new();
        for item in listing {
            let path = item.map_err(|e| archive_error(&dir, e.to_string()))?.path();
            if !path.is_file() {
                continue;
            }
            let Some(name) = path.file_name().map(|n| n.to_string_lossy().into_owned()) else {
                continue;
            };
            let bytes = fs::read(&path).map_err(|e| archive_error(&path, e.to_string()))?;
            debug!("Read station file {}", name);
            entries.push(ArchiveEntry { name, bytes });
        }

        if entries.is_empty() {
            return Err(archive_error(&dir, "no files"));
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        info!("Read {} files from {}", entries.len(), dir.display());
        Ok(entries)
    }
}
