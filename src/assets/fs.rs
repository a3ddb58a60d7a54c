use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use async_trait::async_trait;

use super::{Asset, AssetError, AssetStore};

/// Filesystem-backed [`AssetStore`].
///
/// Assets live as flat files under a single root directory; the identifier
/// is the file name. Identifiers containing path separators are treated as
/// absent rather than resolved, so an identifier can never escape the root.
#[derive(Debug, Clone)]
pub struct FsAssetStore {
    root: PathBuf,
}

impl FsAssetStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Accept only identifiers that are a bare file name.
    fn file_name(id: &str) -> Option<&OsStr> {
        let path = Path::new(id);
        match path.file_name() {
            Some(name) if name == path.as_os_str() => Some(name),
            _ => None,
        }
    }
}

#[async_trait]
impl AssetStore for FsAssetStore {
    async fn resolve(&self, id: &str) -> Result<Option<Asset>, AssetError> {
        if id.is_empty() {
            return Ok(None);
        }
        let Some(name) = Self::file_name(id) else {
            tracing::warn!(asset_id = %id, "asset identifier is not a plain file name");
            return Ok(None);
        };

        let path = self.root.join(name);
        match tokio::fs::read(&path).await {
            Ok(content) => {
                let mime = mime_guess::from_path(&path)
                    .first_or_octet_stream()
                    .to_string();
                Ok(Some(Asset { content, mime }))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(AssetError::Io(e)),
        }
    }
}
