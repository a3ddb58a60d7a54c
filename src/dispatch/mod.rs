//! The dispatch orchestrator: one cycle of resolve, render, deliver.
//!
//! A cycle captures the subscriber and release sets once, then walks the
//! subscribers in resolver order. Each subscriber's render/send pair is
//! independent: a failure is recorded as that subscriber's outcome and the
//! loop continues. Only a content-resolution failure, which happens before
//! any send is attempted, fails the cycle as a whole.
//!
//! Manual runs and scheduled runs both enter through
//! [`Dispatcher::run_cycle`], so their behavior is identical.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use tokio::sync::watch;
use uuid::Uuid;

use crate::assets::AssetStore;
use crate::content::{ContentSource, ReleaseItem, ReleaseWindow, Subscriber};
use crate::delivery::{DeliveryEngine, MailTransport};
use crate::render::Renderer;

/// Days the release window extends past "today" when none is configured.
pub const DEFAULT_WINDOW_DAYS: u32 = 7;

/// Why a cycle performed no deliveries. Not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NoSubscribers,
    NoReleases,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoSubscribers => write!(f, "no_subscribers"),
            Self::NoReleases => write!(f, "no_releases"),
        }
    }
}

/// Terminal state of one subscriber's render/send pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Sent,
    Failed { reason: String },
}

/// One subscriber's outcome within a cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriberOutcome {
    pub subscriber_id: Uuid,
    pub email: String,
    pub outcome: Outcome,
}

/// Final status of a cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleStatus {
    /// Empty inputs; no deliveries attempted.
    Skipped(SkipReason),
    /// Every subscriber was processed. Individual failures do not change
    /// this status.
    Completed,
    /// Shutdown was observed mid-cycle; remaining subscribers were not
    /// attempted.
    Cancelled,
    /// Content resolution failed before the per-subscriber loop started.
    Failed { reason: String },
}

/// Result of one dispatch cycle, suitable for logging. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    pub window: ReleaseWindow,
    pub status: CycleStatus,
    /// Per-subscriber outcomes in resolver order. Empty for skipped and
    /// failed cycles.
    pub outcomes: Vec<SubscriberOutcome>,
}

impl CycleReport {
    fn new(window: ReleaseWindow, status: CycleStatus) -> Self {
        Self {
            window,
            status,
            outcomes: Vec::new(),
        }
    }

    pub fn sent(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| o.outcome == Outcome::Sent)
            .count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.sent()
    }

    /// Human-readable one-cycle summary, with per-failure reasons.
    pub fn summary(&self) -> String {
        let mut out = match &self.status {
            CycleStatus::Skipped(reason) => format!("dispatch cycle skipped: {reason}"),
            CycleStatus::Completed => format!(
                "dispatch cycle completed: {} sent, {} failed",
                self.sent(),
                self.failed()
            ),
            CycleStatus::Cancelled => format!(
                "dispatch cycle cancelled after {} subscribers ({} sent, {} failed)",
                self.outcomes.len(),
                self.sent(),
                self.failed()
            ),
            CycleStatus::Failed { reason } => format!("dispatch cycle failed: {reason}"),
        };
        for outcome in &self.outcomes {
            if let Outcome::Failed { reason } = &outcome.outcome {
                out.push_str(&format!("\n  failed {}: {}", outcome.email, reason));
            }
        }
        out
    }
}

/// Coordinates one resolve, render, deliver pipeline per trigger firing.
pub struct Dispatcher<C, A, T>
where
    C: ContentSource,
    A: AssetStore,
    T: MailTransport,
{
    content: C,
    assets: A,
    delivery: DeliveryEngine<T>,
    timezone: Tz,
    window_days: u32,
}

impl<C, A, T> Dispatcher<C, A, T>
where
    C: ContentSource,
    A: AssetStore,
    T: MailTransport,
{
    pub fn new(
        content: C,
        assets: A,
        delivery: DeliveryEngine<T>,
        timezone: Tz,
        window_days: u32,
    ) -> Self {
        Self {
            content,
            assets,
            delivery,
            timezone,
            window_days,
        }
    }

    /// Run one dispatch cycle anchored at `now`.
    ///
    /// Always returns a report; resolution failures are captured as status
    /// `Failed` rather than propagated. The shutdown signal is checked
    /// before each subscriber's render/send pair; once observed, the cycle
    /// finishes the current subscriber and reports `Cancelled`.
    pub async fn run_cycle(
        &self,
        now: DateTime<Utc>,
        shutdown: &watch::Receiver<bool>,
    ) -> CycleReport {
        let window = ReleaseWindow::from_cycle_start(now, self.timezone, self.window_days);
        tracing::info!(window = %window, "starting dispatch cycle");

        let subscribers = match self.content.subscribers().await {
            Ok(subscribers) => subscribers,
            Err(e) => {
                tracing::error!(error = %e, "subscriber resolution failed");
                return CycleReport::new(window, CycleStatus::Failed { reason: e.to_string() });
            }
        };
        let releases = match self.content.upcoming_releases(window).await {
            Ok(releases) => releases,
            Err(e) => {
                tracing::error!(error = %e, "release resolution failed");
                return CycleReport::new(window, CycleStatus::Failed { reason: e.to_string() });
            }
        };

        if subscribers.is_empty() {
            tracing::info!("no subscribed users, skipping cycle");
            return CycleReport::new(window, CycleStatus::Skipped(SkipReason::NoSubscribers));
        }
        if releases.is_empty() {
            tracing::info!(window = %window, "no releases in window, skipping cycle");
            return CycleReport::new(window, CycleStatus::Skipped(SkipReason::NoReleases));
        }

        tracing::info!(
            subscribers = subscribers.len(),
            releases = releases.len(),
            "dispatching newsletter"
        );

        let renderer = Renderer::new(&self.assets);
        let mut report = CycleReport::new(window, CycleStatus::Completed);

        for subscriber in &subscribers {
            if *shutdown.borrow() {
                tracing::warn!(
                    remaining = subscribers.len() - report.outcomes.len(),
                    "shutdown observed, abandoning cycle"
                );
                report.status = CycleStatus::Cancelled;
                break;
            }
            let outcome = self.dispatch_one(subscriber, &renderer, &releases).await;
            report.outcomes.push(SubscriberOutcome {
                subscriber_id: subscriber.id,
                email: subscriber.email.clone(),
                outcome,
            });
        }

        report
    }

    async fn dispatch_one(
        &self,
        subscriber: &Subscriber,
        renderer: &Renderer<'_, A>,
        releases: &[ReleaseItem],
    ) -> Outcome {
        let message = match renderer.render(subscriber, releases).await {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!(email = %subscriber.email, error = %e, "render failed");
                return Outcome::Failed {
                    reason: e.to_string(),
                };
            }
        };

        match self.delivery.send(&message).await {
            Ok(()) => {
                tracing::info!(email = %subscriber.email, "newsletter sent");
                Outcome::Sent
            }
            Err(e) => {
                tracing::warn!(email = %subscriber.email, error = %e, "delivery failed");
                Outcome::Failed {
                    reason: e.to_string(),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn window() -> ReleaseWindow {
        let start = NaiveDate::from_ymd_opt(2024, 3, 4).unwrap();
        ReleaseWindow {
            start,
            end: start + chrono::Duration::days(7),
        }
    }

    fn outcome(email: &str, outcome: Outcome) -> SubscriberOutcome {
        SubscriberOutcome {
            subscriber_id: Uuid::new_v4(),
            email: email.to_string(),
            outcome,
        }
    }

    #[test]
    fn summary_counts_and_lists_failures() {
        let mut report = CycleReport::new(window(), CycleStatus::Completed);
        report.outcomes.push(outcome("a@example.com", Outcome::Sent));
        report.outcomes.push(outcome(
            "b@example.com",
            Outcome::Failed {
                reason: "transport error: refused".to_string(),
            },
        ));

        let summary = report.summary();
        assert!(summary.contains("1 sent, 1 failed"));
        assert!(summary.contains("b@example.com"));
        assert!(summary.contains("refused"));
    }

    #[test]
    fn summary_names_the_skip_reason() {
        let report = CycleReport::new(window(), CycleStatus::Skipped(SkipReason::NoReleases));
        assert!(report.summary().contains("no_releases"));
    }
}
