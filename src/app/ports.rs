use crate::domain::{ArchiveEntry, Disease};
use crate::error::Result;
use crate::gateway::cache::{CacheKey, DatasetKind};

/// Persistent store for computed artifacts, keyed by dataset kind,
/// entity, year and variant
pub trait ArtifactCache: Send + Sync {
    /// Whether a fresh artifact is stored under `key`
    fn exists(&self, key: &CacheKey) -> bool;
    /// Stored bytes, or `None` when absent, stale or corrupt
    fn load(&self, key: &CacheKey) -> Result<Option<Vec<u8>>>;
    fn save(&self, key: &CacheKey, bytes: &[u8]) -> Result<()>;
    /// Removes one artifact; `true` if something was removed
    fn invalidate(&self, key: &CacheKey) -> Result<bool>;
    /// Removes every artifact of `kind` (all kinds when `None`)
    fn invalidate_all(&self, kind: Option<DatasetKind>) -> Result<usize>;
}

/// Provider of the raw source files
pub trait ArchiveSource: Send + Sync {
    fn case_archive(&self, disease: Disease, year: i32) -> Result<Vec<ArchiveEntry>>;
    fn climate_archive(&self, year: i32) -> Result<Vec<ArchiveEntry>>;
}
