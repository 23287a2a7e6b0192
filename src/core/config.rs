//! Environment-driven configuration.
//!
//! All settings come from environment variables (loaded from `.env` by the
//! binary before this runs). Only the Discord token is required; everything
//! else has a sensible default.

use anyhow::{bail, Context, Result};
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Runtime configuration for the bot.
#[derive(Debug, Clone)]
pub struct Config {
    /// Discord bot token (`DISCORD_TOKEN`, required).
    pub discord_token: String,
    /// Default log filter when `RUST_LOG` is unset (`LOG_LEVEL`, default `info`).
    pub log_level: String,
    /// How often the delivery sweeper scans the queue
    /// (`SWEEP_INTERVAL_SECS`, default 60).
    pub sweep_interval: Duration,
    /// Delivery attempts allowed per message before it is dropped
    /// (`MAX_RETRIES`, default 3).
    pub max_retries: u32,
    /// Delay added to a message's send time after a failed attempt
    /// (`RETRY_BACKOFF_SECS`, default 30).
    pub retry_backoff: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let discord_token =
            env::var("DISCORD_TOKEN").context("DISCORD_TOKEN environment variable must be set")?;

        let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let sweep_interval_secs: u64 = parse_var("SWEEP_INTERVAL_SECS", 60)?;
        if sweep_interval_secs == 0 {
            bail!("SWEEP_INTERVAL_SECS must be at least 1");
        }

        let max_retries: u32 = parse_var("MAX_RETRIES", 3)?;
        let retry_backoff_secs: u64 = parse_var("RETRY_BACKOFF_SECS", 30)?;

        Ok(Config {
            discord_token,
            log_level,
            sweep_interval: Duration::from_secs(sweep_interval_secs),
            max_retries,
            retry_backoff: Duration::from_secs(retry_backoff_secs),
        })
    }
}

/// Reads a numeric env var, falling back to `default` when unset.
/// A set-but-unparsable value is a startup error, not a silent default.
fn parse_var<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(value) => value
            .trim()
            .parse()
            .with_context(|| format!("{name} must be a number, got '{value}'")),
        Err(_) => Ok(default),
    }
}
