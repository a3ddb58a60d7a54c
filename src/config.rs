//! Environment-based configuration.
//!
//! Every policy knob of the dispatch pipeline lives here: the cron rule and
//! reference timezone, the release window length, the minimum inter-send
//! spacing, the schedule-state path, and the SMTP transport settings.
//! Values come from the environment (a `.env` file is honoured), with
//! defaults for everything except the SMTP host and sender address.

use std::path::PathBuf;
use std::time::Duration;

use chrono_tz::Tz;
use serde::Deserialize;

pub use config::ConfigError;

use crate::delivery::{SmtpConfig, DEFAULT_SEND_SPACING};
use crate::dispatch::DEFAULT_WINDOW_DAYS;
use crate::schedule::{ScheduleRule, DEFAULT_SCHEDULE};

/// Full service configuration.
///
/// | Variable | Required | Description |
/// |----------|----------|-------------|
/// | `SMTP_HOST` | Yes | SMTP server hostname |
/// | `SMTP_FROM` | Yes | Sender address |
/// | `SMTP_PORT` | No | Port (default: 587) |
/// | `SMTP_USERNAME` / `SMTP_PASSWORD` | No | Credentials |
/// | `SMTP_TLS` | No | `starttls` (default), `tls`, or `none` |
/// | `SMTP_TIMEOUT` | No | Connection timeout seconds (default: 10) |
/// | `SCHEDULE` | No | Cron rule (default: Monday 08:30) |
/// | `TIMEZONE` | No | Reference timezone (default: UTC) |
/// | `WINDOW_DAYS` | No | Release window length (default: 7) |
/// | `SEND_SPACING_SECS` | No | Minimum gap between sends (default: 10) |
/// | `STATE_PATH` | No | Schedule state file (default: `gazette-state.json`) |
/// | `ASSET_DIR` | No | Cover image directory (default: `assets`) |
/// | `SUBSCRIBERS_PATH` / `RELEASES_PATH` | No | Development catalog data |
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub schedule: ScheduleRule,
    pub timezone: Tz,
    pub window_days: u32,
    pub send_spacing_secs: u64,
    pub state_path: PathBuf,
    pub asset_dir: PathBuf,
    pub subscribers_path: PathBuf,
    pub releases_path: PathBuf,
    pub smtp: SmtpConfig,
}

/// The non-SMTP settings. Deserialized separately from [`SmtpConfig`] so
/// both read the same flat environment namespace.
#[derive(Debug, Clone, Deserialize)]
struct CoreConfig {
    #[serde(default = "default_schedule")]
    schedule: ScheduleRule,

    #[serde(default = "default_timezone")]
    timezone: Tz,

    #[serde(default = "default_window_days")]
    window_days: u32,

    #[serde(default = "default_send_spacing_secs")]
    send_spacing_secs: u64,

    #[serde(default = "default_state_path")]
    state_path: PathBuf,

    #[serde(default = "default_asset_dir")]
    asset_dir: PathBuf,

    #[serde(default = "default_subscribers_path")]
    subscribers_path: PathBuf,

    #[serde(default = "default_releases_path")]
    releases_path: PathBuf,
}

impl AppConfig {
    /// Load the configuration from the environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let source = config::Config::builder()
            .add_source(config::Environment::default())
            .build()?;
        Self::from_source(source)
    }

    fn from_source(source: config::Config) -> Result<Self, ConfigError> {
        let core: CoreConfig = source.clone().try_deserialize()?;
        let smtp: SmtpConfig = source.try_deserialize()?;

        Ok(Self {
            schedule: core.schedule,
            timezone: core.timezone,
            window_days: core.window_days,
            send_spacing_secs: core.send_spacing_secs,
            state_path: core.state_path,
            asset_dir: core.asset_dir,
            subscribers_path: core.subscribers_path,
            releases_path: core.releases_path,
            smtp,
        })
    }

    pub fn send_spacing(&self) -> Duration {
        Duration::from_secs(self.send_spacing_secs)
    }
}

fn default_schedule() -> ScheduleRule {
    DEFAULT_SCHEDULE.parse().expect("default schedule parses")
}

fn default_timezone() -> Tz {
    chrono_tz::UTC
}

fn default_window_days() -> u32 {
    DEFAULT_WINDOW_DAYS
}

fn default_send_spacing_secs() -> u64 {
    DEFAULT_SEND_SPACING.as_secs()
}

fn default_state_path() -> PathBuf {
    PathBuf::from("gazette-state.json")
}

fn default_asset_dir() -> PathBuf {
    PathBuf::from("assets")
}

fn default_subscribers_path() -> PathBuf {
    PathBuf::from("data/subscribers.json")
}

fn default_releases_path() -> PathBuf {
    PathBuf::from("data/releases.json")
}
