// Core layer - shared types and configuration
pub mod core;

// Features layer - all feature modules
pub mod features;

// Transport layer - chat capability consumed by the scheduler
pub mod transport;

// Re-export core config for convenience
pub use crate::core::Config;

// Re-export feature items
pub use features::{
    // Commands
    parse_schedule_command, ScheduleCommandError,
    // Scheduler
    DeliverySweeper, MessageStore, ScheduledMessage, SweepPolicy,
};

// Re-export transport items
pub use transport::{ChatTransport, ConnectionState, DiscordTransport};
