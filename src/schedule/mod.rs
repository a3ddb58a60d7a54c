//! Recurring trigger with durable at-most-once slot firing.
//!
//! The trigger maintains a cron-style rule evaluated in the reference
//! timezone. On each check it computes every slot that has elapsed since
//! the last processed one, fires a dispatch cycle per slot, and records the
//! slot in [`ScheduleState`] only after the cycle returns. Re-firing a slot
//! is therefore impossible across restarts, while a crash mid-cycle leaves
//! the slot unmarked and it runs again (at-least-once on crash, documented
//! behavior). Between checks the loop sleeps until the next occurrence; it
//! does no work while idle.

mod state;

pub use state::{FileStateStore, MemoryStateStore, ScheduleState, StateError, StateStore};

use std::str::FromStr;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tokio::sync::watch;

use crate::assets::AssetStore;
use crate::content::ContentSource;
use crate::delivery::MailTransport;
use crate::dispatch::{CycleReport, CycleStatus, Dispatcher};

/// Monday 08:30 in the reference timezone.
pub const DEFAULT_SCHEDULE: &str = "0 30 8 * * Mon";

#[derive(Debug, thiserror::Error)]
pub enum ScheduleError {
    #[error("invalid cron schedule: {0}")]
    InvalidRule(String),

    #[error(transparent)]
    State(#[from] StateError),
}

/// Serde-friendly wrapper around [`cron::Schedule`].
///
/// Cron expression format:
/// ```text
/// sec   min   hour   day_of_month   month   day_of_week
/// 0     30    8      *              *       Mon
/// ```
#[derive(Debug, Clone)]
pub struct ScheduleRule(cron::Schedule);

impl ScheduleRule {
    /// All slots in `(after, now]`, oldest first, as UTC instants.
    pub fn due_between(
        &self,
        after: DateTime<Utc>,
        now: DateTime<Utc>,
        timezone: Tz,
    ) -> Vec<DateTime<Utc>> {
        self.0
            .after(&after.with_timezone(&timezone))
            .map(|slot| slot.with_timezone(&Utc))
            .take_while(|slot| *slot <= now)
            .collect()
    }

    /// The first slot strictly after `now`.
    pub fn next_after(&self, now: DateTime<Utc>, timezone: Tz) -> Option<DateTime<Utc>> {
        self.0
            .after(&now.with_timezone(&timezone))
            .next()
            .map(|slot| slot.with_timezone(&Utc))
    }
}

impl FromStr for ScheduleRule {
    type Err = ScheduleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        cron::Schedule::from_str(s)
            .map(Self)
            .map_err(|_| ScheduleError::InvalidRule(s.to_string()))
    }
}

impl std::fmt::Display for ScheduleRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(&self.0, f)
    }
}

impl Serialize for ScheduleRule {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.0.to_string())
    }
}

impl<'de> Deserialize<'de> for ScheduleRule {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::from_str(&s).map_err(serde::de::Error::custom)
    }
}

/// Drives the dispatcher from a recurring calendar rule.
pub struct Trigger<S, C, A, T>
where
    S: StateStore,
    C: ContentSource,
    A: AssetStore,
    T: MailTransport,
{
    rule: ScheduleRule,
    timezone: Tz,
    store: S,
    dispatcher: Dispatcher<C, A, T>,
}

impl<S, C, A, T> Trigger<S, C, A, T>
where
    S: StateStore,
    C: ContentSource,
    A: AssetStore,
    T: MailTransport,
{
    pub fn new(rule: ScheduleRule, timezone: Tz, store: S, dispatcher: Dispatcher<C, A, T>) -> Self {
        Self {
            rule,
            timezone,
            store,
            dispatcher,
        }
    }

    /// Run the trigger loop until the shutdown signal flips.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<(), ScheduleError> {
        let mut state = self.store.load().await?;
        if state.last_slot.is_none() {
            // First ever run: anchor at startup so slots from before the
            // service existed never fire.
            state.last_slot = Some(Utc::now());
            self.store.save(&state).await?;
        }

        tracing::info!(rule = %self.rule, timezone = %self.timezone, "⏳ dispatch scheduler running");

        loop {
            if *shutdown.borrow() {
                break;
            }

            self.process_due(&mut state, Utc::now(), &shutdown).await?;

            let Some(next) = self.rule.next_after(Utc::now(), self.timezone) else {
                tracing::warn!(rule = %self.rule, "schedule has no future occurrences, stopping");
                break;
            };
            let wait = (next - Utc::now())
                .to_std()
                .unwrap_or(std::time::Duration::ZERO);
            tracing::debug!(next = %next, "sleeping until next slot");

            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                _ = shutdown.changed() => {
                    tracing::info!("scheduler shutting down");
                    break;
                }
            }
        }

        Ok(())
    }

    /// Fire a cycle for every unprocessed slot up to `now`, marking each
    /// slot processed only after its cycle returns.
    ///
    /// A cycle cancelled by shutdown leaves its slot unmarked and stops the
    /// catch-up, so the slot re-fires on the next start.
    pub async fn process_due(
        &self,
        state: &mut ScheduleState,
        now: DateTime<Utc>,
        shutdown: &watch::Receiver<bool>,
    ) -> Result<Vec<CycleReport>, ScheduleError> {
        let Some(anchor) = state.last_slot else {
            return Ok(Vec::new());
        };

        let mut reports = Vec::new();
        for slot in self.rule.due_between(anchor, now, self.timezone) {
            if *shutdown.borrow() {
                break;
            }
            tracing::info!(slot = %slot, "firing scheduled dispatch");

            let report = self.dispatcher.run_cycle(now, shutdown).await;
            tracing::info!("{}", report.summary());

            let cancelled = report.status == CycleStatus::Cancelled;
            reports.push(report);
            if cancelled {
                break;
            }

            state.last_slot = Some(slot);
            self.store.save(state).await?;
        }
        Ok(reports)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use chrono_tz::UTC;

    fn mondays() -> ScheduleRule {
        DEFAULT_SCHEDULE.parse().unwrap()
    }

    #[test]
    fn rejects_garbage_expressions() {
        assert!(matches!(
            "not a cron".parse::<ScheduleRule>(),
            Err(ScheduleError::InvalidRule(_))
        ));
    }

    #[test]
    fn no_slots_when_none_elapsed() {
        // Monday 2024-03-04; the next slot is 08:30 the following Monday.
        let after = Utc.with_ymd_and_hms(2024, 3, 4, 9, 0, 0).unwrap();
        let now = Utc.with_ymd_and_hms(2024, 3, 5, 9, 0, 0).unwrap();

        assert!(mondays().due_between(after, now, UTC).is_empty());
    }

    #[test]
    fn one_slot_after_it_passes() {
        let after = Utc.with_ymd_and_hms(2024, 3, 3, 12, 0, 0).unwrap();
        let now = Utc.with_ymd_and_hms(2024, 3, 4, 9, 0, 0).unwrap();

        let due = mondays().due_between(after, now, UTC);
        assert_eq!(
            due,
            vec![Utc.with_ymd_and_hms(2024, 3, 4, 8, 30, 0).unwrap()]
        );
    }

    #[test]
    fn downtime_yields_every_missed_slot_in_order() {
        let after = Utc.with_ymd_and_hms(2024, 3, 3, 12, 0, 0).unwrap();
        let now = Utc.with_ymd_and_hms(2024, 3, 18, 9, 0, 0).unwrap();

        let due = mondays().due_between(after, now, UTC);
        assert_eq!(
            due,
            vec![
                Utc.with_ymd_and_hms(2024, 3, 4, 8, 30, 0).unwrap(),
                Utc.with_ymd_and_hms(2024, 3, 11, 8, 30, 0).unwrap(),
                Utc.with_ymd_and_hms(2024, 3, 18, 8, 30, 0).unwrap(),
            ]
        );
    }

    #[test]
    fn processed_slot_is_not_due_again() {
        // Anchor exactly on a slot: slots are strictly after the anchor.
        let after = Utc.with_ymd_and_hms(2024, 3, 4, 8, 30, 0).unwrap();
        let now = Utc.with_ymd_and_hms(2024, 3, 4, 9, 0, 0).unwrap();

        assert!(mondays().due_between(after, now, UTC).is_empty());
    }

    #[test]
    fn slots_follow_the_reference_timezone() {
        let rule = mondays();
        let after = Utc.with_ymd_and_hms(2024, 3, 3, 12, 0, 0).unwrap();
        let now = Utc.with_ymd_and_hms(2024, 3, 4, 23, 59, 0).unwrap();

        // Monday 08:30 in Tokyo is Sunday 23:30 UTC.
        let due = rule.due_between(after, now, chrono_tz::Asia::Tokyo);
        assert_eq!(
            due,
            vec![Utc.with_ymd_and_hms(2024, 3, 3, 23, 30, 0).unwrap()]
        );
    }

    #[test]
    fn next_after_returns_the_upcoming_slot() {
        let now = Utc.with_ymd_and_hms(2024, 3, 4, 9, 0, 0).unwrap();

        assert_eq!(
            mondays().next_after(now, UTC),
            Some(Utc.with_ymd_and_hms(2024, 3, 11, 8, 30, 0).unwrap())
        );
    }
}
