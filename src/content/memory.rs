use async_trait::async_trait;

use super::{ContentSource, ReleaseItem, ReleaseWindow, ResolutionError, Subscriber};

/// In-memory [`ContentSource`] for development and testing.
///
/// Holds the full subscriber and release lists and answers both queries by
/// filtering them, preserving insertion order. Not durable.
#[derive(Clone, Default)]
pub struct InMemoryCatalog {
    subscribers: Vec<Subscriber>,
    releases: Vec<ReleaseItem>,
}

impl InMemoryCatalog {
    pub fn new(subscribers: Vec<Subscriber>, releases: Vec<ReleaseItem>) -> Self {
        Self {
            subscribers,
            releases,
        }
    }
}

#[async_trait]
impl ContentSource for InMemoryCatalog {
    async fn subscribers(&self) -> Result<Vec<Subscriber>, ResolutionError> {
        Ok(self
            .subscribers
            .iter()
            .filter(|s| s.subscribed)
            .cloned()
            .collect())
    }

    async fn upcoming_releases(
        &self,
        window: ReleaseWindow,
    ) -> Result<Vec<ReleaseItem>, ResolutionError> {
        Ok(self
            .releases
            .iter()
            .filter(|r| window.contains(r.release_date))
            .cloned()
            .collect())
    }
}
