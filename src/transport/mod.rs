//! # Transport Layer
//!
//! The chat capability the scheduler depends on: send a message to a
//! recipient, and report current gateway connectivity. The scheduler only
//! sees the [`ChatTransport`] trait, so tests substitute a double and the
//! production bot plugs in [`DiscordTransport`].
//!
//! - **Version**: 1.0.0
//! - **Since**: 0.1.0
//! - **Toggleable**: false

use anyhow::{Context, Result};
use async_trait::async_trait;
use serenity::http::Http;
use serenity::model::id::ChannelId;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Outbound message capability with a connectivity signal.
///
/// `send` must resolve in bounded time; the sweeper does not impose its own
/// timeout on it.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Delivers `content` to the recipient identified by the opaque
    /// transport-level string `recipient`.
    async fn send(&self, recipient: &str, content: &str) -> Result<()>;

    /// Snapshot of current gateway connectivity. Read-only for the scheduler;
    /// driven by transport lifecycle events.
    fn is_connected(&self) -> bool;
}

/// Shared connectivity flag, flipped by gateway lifecycle events
/// (ready / resume / shard stage changes) and read by the sweeper.
#[derive(Clone, Default)]
pub struct ConnectionState(Arc<AtomicBool>);

impl ConnectionState {
    /// Starts disconnected; the ready event flips it on.
    pub fn new() -> Self {
        ConnectionState(Arc::new(AtomicBool::new(false)))
    }

    pub fn set_connected(&self, connected: bool) {
        self.0.store(connected, Ordering::SeqCst);
    }

    pub fn is_connected(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Production transport backed by the Discord REST API.
///
/// Recipients are channel ids in string form; the command parser upstream is
/// responsible for normalizing mentions to bare ids.
pub struct DiscordTransport {
    http: Arc<Http>,
    connection: ConnectionState,
}

impl DiscordTransport {
    pub fn new(http: Arc<Http>, connection: ConnectionState) -> Self {
        DiscordTransport { http, connection }
    }
}

#[async_trait]
impl ChatTransport for DiscordTransport {
    async fn send(&self, recipient: &str, content: &str) -> Result<()> {
        // An unparsable recipient is a delivery failure, subject to the same
        // retry policy as a failed API call.
        let channel_id: u64 = recipient
            .parse()
            .with_context(|| format!("recipient '{recipient}' is not a channel id"))?;

        ChannelId(channel_id)
            .say(&self.http, content)
            .await
            .with_context(|| format!("failed to deliver message to channel {channel_id}"))?;

        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connection.is_connected()
    }
}
