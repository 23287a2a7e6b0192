//! # Feature: Scheduled Delivery
//!
//! Deferred message delivery: callers enqueue a message with a recipient,
//! a body, and a send time; a periodic sweeper delivers due messages and
//! applies a bounded-retry policy with fixed backoff when delivery fails.
//! Messages queued while the gateway is down are held without burning
//! retries until connectivity returns.
//!
//! - **Version**: 1.0.0
//! - **Since**: 0.1.0
//! - **Toggleable**: false

pub mod store;
pub mod sweeper;

pub use store::{MessageStore, ScheduledMessage};
pub use sweeper::{DeliverySweeper, SweepPolicy};
