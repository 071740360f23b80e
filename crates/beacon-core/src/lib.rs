//! Shared types, configuration, errors, and session events for Beacon.

pub mod config;
pub mod error;
pub mod events;
pub mod types;

pub use config::BeaconConfig;
pub use error::{BeaconError, Result};
pub use events::{Notification, NotificationKind, NotificationLevel, SessionEvent};
pub use types::*;
