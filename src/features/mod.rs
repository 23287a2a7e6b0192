//! # Features
//!
//! Feature modules for the courier bot.

pub mod commands;
pub mod scheduler;

pub use commands::{parse_schedule_command, ScheduleCommandError};
pub use scheduler::{DeliverySweeper, MessageStore, ScheduledMessage, SweepPolicy};
