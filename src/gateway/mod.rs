pub mod archive;
pub mod cache;

pub use archive::DirectoryArchive;
pub use cache::{load_json, save_json, CacheKey, DatasetKind, FsArtifactCache};
