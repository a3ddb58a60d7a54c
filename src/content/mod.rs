//! Read-only access to subscribers and upcoming releases.
//!
//! The catalog and user stores live outside this crate. The dispatch core
//! only depends on the two queries of [`ContentSource`]: the current
//! subscriber list and the releases falling inside a forward-looking date
//! window. Both are side-effect free and safe to call repeatedly within one
//! cycle.

mod memory;

pub use memory::InMemoryCatalog;

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Content store unreachable or returning malformed data.
///
/// Fatal to the cycle that encounters it: resolution happens before any
/// send is attempted.
#[derive(Debug, thiserror::Error)]
pub enum ResolutionError {
    #[error("content store unavailable: {0}")]
    Unavailable(String),

    #[error("malformed content data: {0}")]
    Malformed(String),
}

/// A newsletter recipient, owned by the external user store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subscriber {
    pub id: Uuid,
    pub email: String,
    pub subscribed: bool,
}

/// A title with a release date inside the current window, owned by the
/// external catalog store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReleaseItem {
    pub title: String,
    pub release_date: NaiveDate,
    pub description: String,
    /// Opaque cover-image key in the asset store, if the title has one.
    #[serde(default)]
    pub cover_asset: Option<String>,
}

/// Inclusive date range selecting releases eligible for one cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl ReleaseWindow {
    /// Compute the window for a cycle starting at `now`.
    ///
    /// "Today" is `now` truncated to a calendar date in the reference
    /// timezone; the window runs from today through `today + days`,
    /// both ends inclusive.
    pub fn from_cycle_start(now: DateTime<Utc>, timezone: Tz, days: u32) -> Self {
        let today = now.with_timezone(&timezone).date_naive();
        Self {
            start: today,
            end: today + Duration::days(i64::from(days)),
        }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}

impl std::fmt::Display for ReleaseWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}..={}", self.start, self.end)
    }
}

/// The two read queries the dispatch core consumes.
///
/// Implementations must preserve the backing store's insertion order and
/// must not mutate anything. A database-backed implementation belongs to
/// the surrounding application; [`InMemoryCatalog`] covers development and
/// testing.
#[async_trait]
pub trait ContentSource: Send + Sync + 'static {
    /// All subscribers whose subscription flag is set.
    ///
    /// The whole set is loaded without pagination. Newsletter audiences are
    /// assumed small; this is a documented limitation, not a silent cap.
    async fn subscribers(&self) -> Result<Vec<Subscriber>, ResolutionError>;

    /// Releases whose release date falls inside `window`.
    async fn upcoming_releases(
        &self,
        window: ReleaseWindow,
    ) -> Result<Vec<ReleaseItem>, ResolutionError>;
}
