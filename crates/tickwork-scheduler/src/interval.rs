use std::fmt;

use chrono::{DateTime, Duration, Local, LocalResult, NaiveDateTime, NaiveTime, TimeZone, Timelike};

use crate::error::{AgentError, Result};

/// Granularity of a fixed-interval schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeUnit {
    Seconds,
    Minutes,
    Hours,
}

impl TimeUnit {
    fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "s" | "sec" | "secs" | "second" | "seconds" => Some(TimeUnit::Seconds),
            "m" | "min" | "mins" | "minute" | "minutes" => Some(TimeUnit::Minutes),
            "h" | "hr" | "hrs" | "hour" | "hours" => Some(TimeUnit::Hours),
            _ => None,
        }
    }

    fn seconds(self) -> i64 {
        match self {
            TimeUnit::Seconds => 1,
            TimeUnit::Minutes => 60,
            TimeUnit::Hours => 3600,
        }
    }

    fn label(self) -> &'static str {
        match self {
            TimeUnit::Seconds => "second(s)",
            TimeUnit::Minutes => "minute(s)",
            TimeUnit::Hours => "hour(s)",
        }
    }
}

/// Longest accepted interval: 366 days.
pub const MAX_INTERVAL_SECS: i64 = 366 * 24 * 3600;

/// A `(magnitude, unit)` pair such as "30 seconds" or "2h".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeInterval {
    magnitude: u32,
    unit: TimeUnit,
}

impl TimeInterval {
    pub fn new(magnitude: u32, unit: TimeUnit) -> Result<Self> {
        if magnitude == 0 {
            return Err(AgentError::Configuration(
                "interval magnitude must be > 0".to_string(),
            ));
        }
        if i64::from(magnitude) * unit.seconds() > MAX_INTERVAL_SECS {
            return Err(AgentError::Configuration(format!(
                "interval of {magnitude} {} exceeds 366 days",
                unit.label()
            )));
        }
        Ok(Self { magnitude, unit })
    }

    /// Parse `"<n> <unit>"` or `"<n><unit>"`, case-insensitive.
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        let split = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
        let (digits, unit) = s.split_at(split);
        let bad = || AgentError::Configuration(format!("invalid interval: '{s}'"));

        let magnitude: u32 = digits.parse().map_err(|_| bad())?;
        let unit = TimeUnit::parse(unit.trim()).ok_or_else(bad)?;
        Self::new(magnitude, unit)
    }

    pub fn magnitude(&self) -> u32 {
        self.magnitude
    }

    pub fn unit(&self) -> TimeUnit {
        self.unit
    }

    pub fn as_duration(&self) -> Duration {
        Duration::seconds(i64::from(self.magnitude) * self.unit.seconds())
    }

    pub fn as_std(&self) -> std::time::Duration {
        std::time::Duration::from_secs(u64::from(self.magnitude) * self.unit.seconds() as u64)
    }

    /// "30 second(s)", "5 minute(s)", …
    pub fn describe(&self) -> String {
        format!("{} {}", self.magnitude, self.unit.label())
    }
}

impl fmt::Display for TimeInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.describe())
    }
}

/// First fire instant strictly after `now`, aligned to a multiple of the
/// interval on the unit's calendar field.
///
/// Every 5 minutes lands on :00/:05/:10…, every 2 hours on 00:00/02:00/…,
/// second-granularity intervals on an exact second boundary. Fields smaller
/// than the unit are zeroed.
pub fn next_aligned_fire(now: NaiveDateTime, interval: TimeInterval) -> NaiveDateTime {
    let n = i64::from(interval.magnitude);
    let value = i64::from(match interval.unit {
        TimeUnit::Seconds => now.second(),
        TimeUnit::Minutes => now.minute(),
        TimeUnit::Hours => now.hour(),
    });

    let diff = (n - value % n) % n;
    let mut candidate = now + Duration::seconds(interval.unit.seconds() * diff);
    if candidate <= now {
        candidate += interval.as_duration();
    }
    truncate_below(candidate, interval.unit)
}

fn truncate_below(dt: NaiveDateTime, unit: TimeUnit) -> NaiveDateTime {
    let (h, m, s) = match unit {
        TimeUnit::Seconds => (dt.hour(), dt.minute(), dt.second()),
        TimeUnit::Minutes => (dt.hour(), dt.minute(), 0),
        TimeUnit::Hours => (dt.hour(), 0, 0),
    };
    NaiveTime::from_hms_opt(h, m, s)
        .map(|t| dt.date().and_time(t))
        .unwrap_or(dt)
}

/// Interpret a wall-clock instant in the local time zone.
///
/// Ambiguous instants (DST fall-back) resolve to the earlier one; instants
/// inside a DST gap are read as UTC so the schedule still advances.
pub fn to_local(naive: NaiveDateTime) -> DateTime<Local> {
    match Local.from_local_datetime(&naive) {
        LocalResult::Single(t) => t,
        LocalResult::Ambiguous(early, _) => early,
        LocalResult::None => Local.from_utc_datetime(&naive),
    }
}
