//! Messaging guard: allowed hours, phone normalisation and duplicate
//! windows shared by every engine.

use std::sync::LazyLock;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime, TimeDelta, Timelike};
use regex::Regex;

use crate::config::MessagingConfig;
use crate::error::GatewayError;

static NON_DIGIT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\D").unwrap());

/// Local hours during which customers may be messaged: `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessagingWindow {
    pub start_hour: u32,
    pub end_hour: u32,
}

impl MessagingWindow {
    pub fn new(start_hour: u32, end_hour: u32) -> Self {
        Self {
            start_hour,
            end_hour,
        }
    }

    pub fn is_open(&self, now: NaiveDateTime) -> bool {
        let hour = now.hour();
        hour >= self.start_hour && hour < self.end_hour
    }
}

impl From<&MessagingConfig> for MessagingWindow {
    fn from(config: &MessagingConfig) -> Self {
        Self::new(config.start_hour, config.end_hour)
    }
}

impl Default for MessagingWindow {
    fn default() -> Self {
        Self::new(8, 19)
    }
}

/// Digits-only WhatsApp destination including the country code.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PhoneNumber(String);

impl PhoneNumber {
    /// Strip everything but digits and prefix `country_code` when the rest
    /// looks like a national number (10 or 11 digits). Valid numbers end up
    /// with 12 or 13 digits.
    pub fn parse(raw: &str, country_code: &str) -> Result<Self, GatewayError> {
        let mut digits = NON_DIGIT.replace_all(raw, "").into_owned();
        if digits.len() == 10 || digits.len() == 11 {
            digits.insert_str(0, country_code);
        }
        if (12..=13).contains(&digits.len()) {
            Ok(Self(digits))
        } else {
            Err(GatewayError::InvalidPhone(raw.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PhoneNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// How far back a prior attempt blocks a new one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DedupWindow {
    /// Any attempt on the same calendar day.
    SameDay,
    /// Any attempt within the last `n` calendar days, today included.
    TrailingDays(i64),
}

impl DedupWindow {
    /// Half-open `[since, until)` range of log timestamps to look at.
    pub fn range(&self, today: NaiveDate) -> (NaiveDateTime, NaiveDateTime) {
        let until = NaiveDateTime::new(today, NaiveTime::MIN) + TimeDelta::days(1);
        let since = match self {
            Self::SameDay => until - TimeDelta::days(1),
            Self::TrailingDays(n) => until - TimeDelta::days((*n).max(1)),
        };
        (since, until)
    }
}
