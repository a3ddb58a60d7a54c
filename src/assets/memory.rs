use std::collections::HashMap;

use async_trait::async_trait;

use super::{Asset, AssetError, AssetStore};

/// In-memory [`AssetStore`] for development and testing.
#[derive(Clone, Default)]
pub struct InMemoryAssets {
    assets: HashMap<String, Asset>,
}

impl InMemoryAssets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(mut self, id: impl Into<String>, content: Vec<u8>, mime: impl Into<String>) -> Self {
        self.assets.insert(
            id.into(),
            Asset {
                content,
                mime: mime.into(),
            },
        );
        self
    }
}

#[async_trait]
impl AssetStore for InMemoryAssets {
    async fn resolve(&self, id: &str) -> Result<Option<Asset>, AssetError> {
        if id.is_empty() {
            return Ok(None);
        }
        Ok(self.assets.get(id).cloned())
    }
}
