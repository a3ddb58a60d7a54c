//! Scheduled release-newsletter dispatch.
//!
//! # Architecture
//!
//! - [`content`]: read-only queries for subscribers and upcoming releases.
//! - [`assets`]: cover-image lookup by opaque identifier.
//! - [`render`]: deterministic per-recipient newsletter rendering with
//!   `item_<index>` content-id embedding.
//! - [`delivery`]: outbound transport with a minimum inter-send spacing.
//! - [`dispatch`]: the orchestrator driving one resolve/render/deliver
//!   cycle per trigger firing.
//! - [`schedule`]: recurring cron trigger with durable at-most-once slot
//!   firing.
//! - [`config`]: environment-based configuration.
//!
//! # Quick Start
//!
//! ```ignore
//! let config = AppConfig::from_env()?;
//! let delivery = DeliveryEngine::new(
//!     SmtpTransport::from_config(&config.smtp)?,
//!     config.smtp.from.clone(),
//!     config.send_spacing(),
//! );
//! let dispatcher = Dispatcher::new(catalog, assets, delivery, config.timezone, config.window_days);
//!
//! // One manual cycle:
//! let report = dispatcher.run_cycle(Utc::now(), &shutdown).await;
//! println!("{}", report.summary());
//!
//! // Or the recurring trigger:
//! let trigger = Trigger::new(config.schedule, config.timezone, state_store, dispatcher);
//! trigger.run(shutdown).await?;
//! ```

pub mod assets;
pub mod config;
pub mod content;
pub mod delivery;
pub mod dispatch;
pub mod render;
pub mod schedule;

pub use crate::config::AppConfig;
pub use crate::dispatch::{CycleReport, CycleStatus, Dispatcher};
