//! # Feature: Scheduler Commands
//!
//! Parses `scheduler { ... }` chat commands into scheduled messages.
//!
//! A command is the word `scheduler` followed by a JSON object with `to`
//! (channel id or `<#id>` mention), `message`, and `when` (RFC 3339,
//! `YYYY-MM-DD HH:MM` UTC, or a relative `in N minutes` form). Validation
//! happens here, upstream of the scheduler core: the store accepts whatever
//! it is given.
//!
//! - **Version**: 1.0.0
//! - **Since**: 0.2.0
//! - **Toggleable**: true

use crate::features::scheduler::ScheduledMessage;
use chrono::{DateTime, Duration, NaiveDateTime, TimeZone, Utc};
use regex::Regex;
use serde::Deserialize;
use std::fmt;

const COMMAND_KEYWORD: &str = "scheduler";

/// Raw command payload as the user typed it. Fields are optional so a
/// missing one produces a targeted reply instead of a JSON error.
#[derive(Debug, Deserialize)]
struct ScheduleRequest {
    to: Option<String>,
    message: Option<String>,
    when: Option<String>,
}

/// Why a scheduler command was rejected. Each variant maps to the reply
/// shown to the user who issued it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleCommandError {
    InvalidJson,
    MissingFields,
    InvalidRecipient,
    InvalidTime,
}

impl ScheduleCommandError {
    pub fn user_reply(&self) -> &'static str {
        match self {
            ScheduleCommandError::InvalidJson => {
                "⚠️ Invalid JSON format. Example: scheduler { \"to\": \"123456789\", \"message\": \"Reminder\", \"when\": \"in 2 hours\" }"
            }
            ScheduleCommandError::MissingFields => {
                "⚠️ Missing required fields: to, message, when"
            }
            ScheduleCommandError::InvalidRecipient => {
                "⚠️ Invalid recipient - expected a channel id or #channel mention"
            }
            ScheduleCommandError::InvalidTime => "⚠️ Invalid time format in \"when\" field",
        }
    }
}

impl fmt::Display for ScheduleCommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.user_reply())
    }
}

/// Recognizes and parses a scheduler command.
///
/// Returns `None` when `body` is not a scheduler command at all, so ordinary
/// chatter passes through untouched. `now` anchors relative times.
pub fn parse_schedule_command(
    body: &str,
    now: DateTime<Utc>,
) -> Option<Result<ScheduledMessage, ScheduleCommandError>> {
    let body = body.trim();
    // Checked slice: chat text can put a multibyte char across the boundary
    let keyword = body.get(..COMMAND_KEYWORD.len())?;
    if !keyword.eq_ignore_ascii_case(COMMAND_KEYWORD) {
        return None;
    }

    let payload = body[COMMAND_KEYWORD.len()..].trim();
    Some(parse_request(payload, now))
}

fn parse_request(
    payload: &str,
    now: DateTime<Utc>,
) -> Result<ScheduledMessage, ScheduleCommandError> {
    let request: ScheduleRequest =
        serde_json::from_str(payload).map_err(|_| ScheduleCommandError::InvalidJson)?;

    let (Some(to), Some(message), Some(when)) = (request.to, request.message, request.when) else {
        return Err(ScheduleCommandError::MissingFields);
    };
    if to.trim().is_empty() || message.is_empty() || when.trim().is_empty() {
        return Err(ScheduleCommandError::MissingFields);
    }

    let recipient = normalize_recipient(&to).ok_or(ScheduleCommandError::InvalidRecipient)?;
    let send_at = parse_when(when.trim(), now).ok_or(ScheduleCommandError::InvalidTime)?;

    Ok(ScheduledMessage::new(recipient, message, send_at))
}

/// Accepts a bare channel id or a `<#id>` channel mention, normalized to the
/// bare id the transport expects.
fn normalize_recipient(raw: &str) -> Option<String> {
    let re = Regex::new(r"^(?:<#(\d+)>|(\d+))$").ok()?;
    let caps = re.captures(raw.trim())?;
    let id = caps.get(1).or_else(|| caps.get(2))?;
    Some(id.as_str().to_string())
}

/// Absolute or relative send time. A past time is allowed; it is simply due
/// on the next sweep.
fn parse_when(raw: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M") {
        return Some(Utc.from_utc_datetime(&naive));
    }
    parse_relative(raw, now)
}

/// `in N seconds|minutes|hours|days`, singular or plural.
fn parse_relative(raw: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let lowered = raw.to_ascii_lowercase();
    let rest = lowered.strip_prefix("in ")?;

    let mut parts = rest.split_whitespace();
    let amount: i64 = parts.next()?.parse().ok()?;
    let unit = parts.next()?;
    if parts.next().is_some() || amount < 0 {
        return None;
    }

    // Fallible constructors: amounts come straight from chat, and an
    // out-of-range delta must be a rejection, not a panic
    let delta = match unit.trim_end_matches('s') {
        "second" | "sec" => Duration::try_seconds(amount),
        "minute" | "min" => Duration::try_minutes(amount),
        "hour" | "hr" => Duration::try_hours(amount),
        "day" => Duration::try_days(amount),
        _ => return None,
    }?;

    now.checked_add_signed(delta)
}
