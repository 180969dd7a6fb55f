//! Notification fan-out after a decision
//!
//! - `event` - JSON payload delivered to channels
//! - `channel` - `NotificationChannel` trait, webhook and log channels
//! - `dispatcher` - queue and background worker with a single retry per channel

pub mod channel;
pub mod dispatcher;
pub mod event;

pub use channel::{LogChannel, NotificationChannel, WebhookChannel};
pub use dispatcher::{DispatchStats, DispatchWorker, NotificationDispatcher};
pub use event::NotificationEvent;
