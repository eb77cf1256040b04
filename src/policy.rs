use chrono::{DateTime, Datelike, Local, Timelike};
use serde::{Deserialize, Serialize};

/// Minutes in a day; valid minute-of-day offsets are `0..MINUTES_PER_DAY`
pub const MINUTES_PER_DAY: u32 = 24 * 60;

/// Global time-limit and quiet-hours configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeLimitPolicy {
    /// Default daily budget for newly discovered devices (0 = unlimited)
    #[serde(default)]
    pub daily_limit_ms: u64,

    #[serde(default)]
    pub quiet_hours_enabled: bool,

    /// Minute of day the quiet window opens
    #[serde(default = "default_quiet_start")]
    pub quiet_hours_start: u32,

    /// Minute of day the quiet window closes (inclusive)
    #[serde(default = "default_quiet_end")]
    pub quiet_hours_end: u32,
}

fn default_quiet_start() -> u32 {
    22 * 60
}

fn default_quiet_end() -> u32 {
    7 * 60
}

impl Default for TimeLimitPolicy {
    fn default() -> Self {
        Self {
            daily_limit_ms: 0,
            quiet_hours_enabled: false,
            quiet_hours_start: default_quiet_start(),
            quiet_hours_end: default_quiet_end(),
        }
    }
}

impl TimeLimitPolicy {
    /// Whether quiet hours cover the given minute of the day
    ///
    /// A window with `start >= end` wraps past midnight.
    pub fn is_quiet_hours_active_at(&self, current_minutes: u32) -> bool {
        if !self.quiet_hours_enabled {
            return false;
        }

        let start = self.quiet_hours_start;
        let end = self.quiet_hours_end;

        if start < end {
            (start..=end).contains(&current_minutes)
        } else {
            current_minutes >= start || current_minutes <= end
        }
    }

    /// Whether quiet hours are active at the given local time
    pub fn is_quiet_hours_active(&self, now: &DateTime<Local>) -> bool {
        self.is_quiet_hours_active_at(minute_of_day(now))
    }

    /// Check minute offsets are within a day
    pub fn validate(&self) -> anyhow::Result<()> {
        for (label, value) in [("start", self.quiet_hours_start), ("end", self.quiet_hours_end)] {
            if value >= MINUTES_PER_DAY {
                anyhow::bail!(
                    "Quiet hours {} must be a minute of the day (0-{}), got {}",
                    label,
                    MINUTES_PER_DAY - 1,
                    value
                );
            }
        }
        Ok(())
    }
}

/// Minutes since local midnight
pub fn minute_of_day<T: Timelike>(time: &T) -> u32 {
    time.hour() * 60 + time.minute()
}

/// Day of the year used as the daily-rollover key
pub fn day_of_year(now: &DateTime<Local>) -> u32 {
    now.ordinal()
}

/// Parse `HH:MM` into a minute-of-day offset
pub fn parse_minute_of_day(value: &str) -> anyhow::Result<u32> {
    let (hours, minutes) = value
        .trim()
        .split_once(':')
        .ok_or_else(|| anyhow::anyhow!("Expected HH:MM, got '{}'", value))?;

    let hours: u32 = hours
        .parse()
        .map_err(|_| anyhow::anyhow!("Invalid hour in '{}'", value))?;
    let minutes: u32 = minutes
        .parse()
        .map_err(|_| anyhow::anyhow!("Invalid minute in '{}'", value))?;

    if hours > 23 || minutes > 59 {
        anyhow::bail!("Time out of range: '{}'", value);
    }

    Ok(hours * 60 + minutes)
}

/// Format a minute-of-day offset as `HH:MM`
pub fn format_minute_of_day(minutes: u32) -> String {
    format!("{:02}:{:02}", minutes / 60, minutes % 60)
}

/// Source of local wall-clock time
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Local>;
}

/// The system clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Local> {
        Local::now()
    }
}
