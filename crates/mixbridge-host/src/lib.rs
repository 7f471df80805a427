//! Host capability surface for mixer plugins.
//!
//! [`HostApi`] turns every host capability into either a direct channel
//! send/invoke or a throttled indicator update, manages per-entity event
//! subscriptions, answers close requests and reports process statistics on a
//! heartbeat.

pub mod api;
pub mod config;
pub mod data;
pub mod error;
pub mod notify;
pub mod stats;
pub mod throttle;

pub use api::{clamp_throttle, HostApi, MAX_THROTTLE_MS, MIN_THROTTLE_MS};
pub use config::{HostConfig, DEFAULT_HOST_NAME};
pub use data::{AssignmentData, ButtonTypeData, Manifest};
pub use error::{HostError, Result};
pub use notify::{LogNotifier, Notification, Notifier};
pub use stats::{CpuSampler, ProcessStats};
pub use throttle::{clamp_level, IndicatorThrottle};
