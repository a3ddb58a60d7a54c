//! Cover-image lookup against an asset store keyed by opaque identifiers.
//!
//! Absence is the expected case, not an error: an empty identifier, an
//! identifier that is not a plain file name, or a missing object all resolve
//! to `None`. Callers degrade gracefully (a release without a resolvable
//! cover is still included in the newsletter body, just without an image).

mod fs;
mod memory;

pub use fs::FsAssetStore;
pub use memory::InMemoryAssets;

use async_trait::async_trait;

/// Asset store I/O failure other than "object not found".
#[derive(Debug, thiserror::Error)]
pub enum AssetError {
    #[error("asset store I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Binary asset content plus its mime type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Asset {
    pub content: Vec<u8>,
    pub mime: String,
}

/// Lookup of a cover image by its opaque identifier.
#[async_trait]
pub trait AssetStore: Send + Sync + 'static {
    /// Resolve `id` to an asset, or `None` when the identifier is empty or
    /// the underlying object does not exist.
    async fn resolve(&self, id: &str) -> Result<Option<Asset>, AssetError>;
}
