//! Filesystem artifact cache. Each blob is stored next to a `.sha256`
//! sidecar holding its hex digest; a blob whose digest does not match is
//! treated as corrupt, removed and reported absent.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::{Duration, SystemTime};

use chrono::Datelike;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::app::ports::ArtifactCache;
use crate::config::CacheConfig;
use crate::domain::Disease;
use crate::error::{AnalysisError, Result};
use crate::observability::metrics;

const CHECKSUM_EXTENSION: &str = "sha256";

/// Family of cached artifacts, one directory each
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DatasetKind {
    Cases,
    Climate,
    Correlation,
}

impl DatasetKind {
    pub const ALL: [DatasetKind; 3] = [DatasetKind::Cases, DatasetKind::Climate, DatasetKind::Correlation];

    pub fn as_str(&self) -> &'static str {
        match self {
            DatasetKind::Cases => "cases",
            DatasetKind::Climate => "climate",
            DatasetKind::Correlation => "correlation",
        }
    }

    pub fn dir_name(&self) -> &'static str {
        match self {
            DatasetKind::Cases => "arboviruses",
            DatasetKind::Climate => "climate",
            DatasetKind::Correlation => "correlation",
        }
    }
}

impl fmt::Display for DatasetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DatasetKind {
    type Err = AnalysisError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "cases" | "arboviruses" => Ok(DatasetKind::Cases),
            "climate" => Ok(DatasetKind::Climate),
            "correlation" => Ok(DatasetKind::Correlation),
            other => Err(AnalysisError::UnknownDatasetKind(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub kind: DatasetKind,
    pub entity: Option<String>,
    pub year: i32,
    pub variant: Option<String>,
}

impl CacheKey {
    /// `variant` tags the cleaning calibration when the output depends on it
    pub fn cases(disease: Disease, year: i32, variant: Option<String>) -> Self {
        Self {
            kind: DatasetKind::Cases,
            entity: Some(disease.name().to_string()),
            year,
            variant,
        }
    }

    pub fn climate(year: i32) -> Self {
        Self {
            kind: DatasetKind::Climate,
            entity: None,
            year,
            variant: None,
        }
    }

    pub fn correlation(disease: Disease, year: i32, variant: impl Into<String>) -> Self {
        Self {
            kind: DatasetKind::Correlation,
            entity: Some(disease.name().to_string()),
            year,
            variant: Some(variant.into()),
        }
    }

    pub fn file_name(&self) -> String {
        let entity = self.entity.as_deref().unwrap_or("unknown");
        match self.kind {
            DatasetKind::Cases => match &self.variant {
                Some(variant) => format!("{}_{}_{}.json", entity, variant, self.year),
                None => format!("{}_{}.json", entity, self.year),
            },
            DatasetKind::Climate => format!("climate_{}.json", self.year),
            DatasetKind::Correlation => format!(
                "{}_{}_{}.json",
                entity,
                self.variant.as_deref().unwrap_or("climate"),
                self.year
            ),
        }
    }

    /// Path relative to the cache root
    pub fn relative_path(&self) -> PathBuf {
        Path::new(self.kind.dir_name()).join(self.file_name())
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.relative_path().display())
    }
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

fn checksum_path(blob: &Path) -> PathBuf {
    let mut name = blob.as_os_str().to_owned();
    name.push(".");
    name.push(CHECKSUM_EXTENSION);
    PathBuf::from(name)
}

fn remove_if_present(path: &Path) -> Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}

/// Cache rooted at a directory. Artifacts of the current calendar year
/// expire after `ttl`; past years never expire.
#[derive(Debug, Clone)]
pub struct FsArtifactCache {
    root: PathBuf,
    ttl: Duration,
    current_year: i32,
}

impl FsArtifactCache {
    pub fn new(root: impl Into<PathBuf>, ttl: Duration) -> Self {
        Self {
            root: root.into(),
            ttl,
            current_year: chrono::Local::now().year(),
        }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(config.dir.clone(), Duration::from_secs(config.ttl_hours * 3600))
    }

    /// Overrides the year considered current for expiry
    pub fn with_current_year(mut self, year: i32) -> Self {
        self.current_year = year;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, key: &CacheKey) -> PathBuf {
        self.root.join(key.relative_path())
    }

    fn is_stale(&self, key: &CacheKey, path: &Path) -> bool {
        if key.year != self.current_year {
            return false;
        }
        let modified = match fs::metadata(path).and_then(|m| m.modified()) {
            Ok(modified) => modified,
            Err(_) => return true,
        };
        let age = SystemTime::now()
            .duration_since(modified)
            .unwrap_or(Duration::ZERO);
        age >= self.ttl
    }

    fn remove_blob(&self, path: &Path) -> Result<bool> {
        let removed = remove_if_present(path)?;
        remove_if_present(&checksum_path(path))?;
        Ok(removed)
    }
}

impl ArtifactCache for FsArtifactCache {
    fn exists(&self, key: &CacheKey) -> bool {
        let path = self.path_for(key);
        path.is_file() && checksum_path(&path).is_file() && !self.is_stale(key, &path)
    }

    fn load(&self, key: &CacheKey) -> Result<Option<Vec<u8>>> {
        let path = self.path_for(key);
        if !path.is_file() {
            debug!("Cache miss: {}", key);
            metrics::cache::miss(key.kind.as_str());
            return Ok(None);
        }
        if self.is_stale(key, &path) {
            info!("Cached artifact {} is older than {:?}, removing", key, self.ttl);
            self.remove_blob(&path)?;
            metrics::cache::miss(key.kind.as_str());
            return Ok(None);
        }

        let bytes = fs::read(&path)?;
        let expected = fs::read_to_string(checksum_path(&path)).ok();
        if expected.as_deref().map(str::trim) != Some(sha256_hex(&bytes).as_str()) {
            warn!("Cached artifact {} failed its checksum, removing", key);
            self.remove_blob(&path)?;
            metrics::cache::miss(key.kind.as_str());
            return Ok(None);
        }

        debug!("Cache hit: {}", key);
        metrics::cache::hit(key.kind.as_str());
        Ok(Some(bytes))
    }

    fn save(&self, key: &CacheKey, bytes: &[u8]) -> Result<()> {
        let path = self.path_for(key);
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        fs::write(&path, bytes)?;
        fs::write(checksum_path(&path), sha256_hex(bytes))?;
        debug!("Cached {} ({} bytes)", key, bytes.len());
        Ok(())
    }

    fn invalidate(&self, key: &CacheKey) -> Result<bool> {
        self.remove_blob(&self.path_for(key))
    }

    fn invalidate_all(&self, kind: Option<DatasetKind>) -> Result<usize> {
        let kinds: Vec<DatasetKind> = match kind {
            Some(kind) => vec![kind],
            None => DatasetKind::ALL.to_vec(),
        };
        let mut removed = 0;
        for kind in kinds {
            let dir = self.root.join(kind.dir_name());
            if !dir.is_dir() {
                continue;
            }
            for entry in fs::read_dir(&dir)? {
                let path = entry?.path();
                if !path.is_file() {
                    continue;
                }
                let is_checksum = path
                    .extension()
                    .is_some_and(|ext| ext == CHECKSUM_EXTENSION);
                fs::remove_file(&path)?;
                if !is_checksum {
                    removed += 1;
                }
            }
        }
        info!("Removed {} cached artifacts", removed);
        Ok(removed)
    }
}

/// Loads a typed JSON artifact. A blob that no longer deserializes is
/// dropped and reported absent.
pub fn load_json<T: DeserializeOwned>(cache: &dyn ArtifactCache, key: &CacheKey) -> Result<Option<T>> {
    let Some(bytes) = cache.load(key)? else {
        return Ok(None);
    };
    match serde_json::from_slice(&bytes) {
        Ok(value) => Ok(Some(value)),
        Err(e) => {
            warn!("Cached artifact {} is unreadable ({}), removing", key, e);
            cache.invalidate(key)?;
            Ok(None)
        }
    }
}

pub fn save_json<T: Serialize>(cache: &dyn ArtifactCache, key: &CacheKey, value: &T) -> Result<()> {
    let bytes = serde_json::to_vec(value)?;
    cache.save(key, &bytes)
}
