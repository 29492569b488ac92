//! Standard 5-field unix cron expressions.
//!
//! Evaluation is delegated to the `cron` crate, which expects a leading
//! seconds field and numbers Sunday as 1. Expressions are normalised once at
//! parse time: a `0` seconds field is prepended and the day-of-week field
//! (0–7, with 0 and 7 both Sunday) is expanded into a list of day names.
//!
//! When both day-of-month and day-of-week are restricted (neither starts
//! with `*`), a day matches if it satisfies either field. The `cron` crate
//! intersects the two, so such expressions are evaluated as two schedules
//! and the earlier occurrence wins.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, TimeZone};

use crate::error::{AgentError, Result};

const DAY_ABBREVIATIONS: [&str; 7] = ["SUN", "MON", "TUE", "WED", "THU", "FRI", "SAT"];
const WEEKDAY_NAMES: [&str; 7] = [
    "Sunday",
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
];
const MONTH_NAMES: [&str; 12] = [
    "January",
    "February",
    "March",
    "April",
    "May",
    "June",
    "July",
    "August",
    "September",
    "October",
    "November",
    "December",
];

/// A parsed cron expression plus its human-readable description.
#[derive(Clone)]
pub struct CronExpression {
    expression: String,
    description: String,
    /// One schedule, or two when day-of-month and day-of-week are both
    /// restricted.
    schedules: Vec<::cron::Schedule>,
}

impl CronExpression {
    pub fn parse(expression: &str) -> Result<Self> {
        let expression = expression.split_whitespace().collect::<Vec<_>>().join(" ");
        let fields: Vec<&str> = expression.split(' ').collect();
        if fields.len() != 5 {
            return Err(AgentError::Configuration(format!(
                "cron expression '{expression}' must have 5 fields, found {}",
                fields.len()
            )));
        }
        let (minute, hour, dom, month, dow) =
            (fields[0], fields[1], fields[2], fields[3], fields[4]);

        let days = normalize_day_of_week(dow).ok_or_else(|| {
            AgentError::Configuration(format!("invalid day-of-week field in '{expression}'"))
        })?;
        let either_day = !dom.starts_with('*') && !dow.starts_with('*');
        let six_fields = if either_day {
            vec![
                format!("0 {minute} {hour} {dom} {month} *"),
                format!("0 {minute} {hour} * {month} {days}"),
            ]
        } else {
            vec![format!("0 {minute} {hour} {dom} {month} {days}")]
        };

        let schedules = six_fields
            .iter()
            .map(|six| ::cron::Schedule::from_str(six))
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| {
                AgentError::Configuration(format!("invalid cron expression '{expression}': {e}"))
            })?;

        let description = describe(&fields);
        Ok(Self {
            expression,
            description,
            schedules,
        })
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// e.g. "at 00:00, on Sunday".
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Next occurrence strictly after `after`, or `None` when the expression
    /// can never fire again.
    pub fn next_after<Tz: TimeZone>(&self, after: &DateTime<Tz>) -> Option<DateTime<Tz>> {
        self.schedules
            .iter()
            .filter_map(|schedule| schedule.after(after).next())
            .min()
    }
}

impl fmt::Debug for CronExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CronExpression")
            .field("expression", &self.expression)
            .field("description", &self.description)
            .finish()
    }
}

impl fmt::Display for CronExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.expression, self.description)
    }
}

/// Expand a unix day-of-week field into a comma-separated list of day names.
///
/// Ranges and steps run over 0–7 before 7 folds onto Sunday, so `1-7/2` is
/// Monday, Wednesday, Friday and Sunday. Returns `None` for malformed items.
fn normalize_day_of_week(field: &str) -> Option<String> {
    if field == "*" {
        return Some(field.to_string());
    }
    let mut days = [false; 7];
    for item in field.split(',') {
        let (range, step) = match item.split_once('/') {
            Some((range, step)) => (range, step.parse::<usize>().ok().filter(|s| *s > 0)?),
            None => (item, 1),
        };
        let (from, to) = match range.split_once('-') {
            Some((from, to)) => (day_number(from)?, day_number(to)?),
            None if range == "*" => (0, 7),
            None if step > 1 => (day_number(range)?, 7),
            None => {
                let day = day_number(range)?;
                (day, day)
            }
        };
        if from > to {
            return None;
        }
        for day in (from..=to).step_by(step) {
            days[day % 7] = true;
        }
    }
    let names: Vec<&str> = days
        .iter()
        .zip(DAY_ABBREVIATIONS)
        .filter_map(|(on, name)| on.then_some(name))
        .collect();
    Some(names.join(","))
}

/// 0–7 for numbers, 0–6 for three-letter day names.
fn day_number(token: &str) -> Option<usize> {
    let token = token.trim();
    match token.parse::<usize>() {
        Ok(n) => (n <= 7).then_some(n),
        Err(_) => {
            let upper = token.to_ascii_uppercase();
            DAY_ABBREVIATIONS.iter().position(|d| *d == upper)
        }
    }
}

fn describe(fields: &[&str]) -> String {
    let (minute, hour, dom, month, dow) = (fields[0], fields[1], fields[2], fields[3], fields[4]);
    let mut parts = Vec::new();

    match (minute.parse::<u32>(), hour.parse::<u32>()) {
        (Ok(m), Ok(h)) => parts.push(format!("at {h:02}:{m:02}")),
        _ => {
            parts.push(match minute {
                "*" => "every minute".to_string(),
                m if m.starts_with("*/") => format!("every {} minutes", &m[2..]),
                m if m.parse::<u32>().is_ok() => format!("at minute {m}"),
                m => format!("at minutes {m}"),
            });
            match hour {
                "*" => {}
                h if h.starts_with("*/") => parts.push(format!("every {} hours", &h[2..])),
                h if h.parse::<u32>().is_ok() => parts.push(format!("during hour {h}")),
                h => parts.push(format!("during hours {h}")),
            }
        }
    }

    let dom_part = (dom != "*").then(|| format!("on day-of-month {dom}"));
    let dow_part = (dow != "*").then(|| format!("on {}", describe_list(dow, weekday_name)));
    let either_day = !dom.starts_with('*') && !dow.starts_with('*');
    match (dom_part, dow_part) {
        (Some(d), Some(w)) if either_day => parts.push(format!("{d} or {w}")),
        (d, w) => parts.extend(d.into_iter().chain(w)),
    }
    if month != "*" {
        parts.push(format!("in {}", describe_list(month, month_name)));
    }
    parts.join(", ")
}

fn describe_list(field: &str, name: fn(&str) -> String) -> String {
    field
        .split(',')
        .map(|item| match item.split_once('-') {
            Some((from, to)) if !item.contains('/') => {
                format!("{} through {}", name(from), name(to))
            }
            _ if item.contains('/') || item == "*" => item.to_string(),
            _ => name(item),
        })
        .collect::<Vec<_>>()
        .join(", ")
}

fn weekday_name(token: &str) -> String {
    match token.parse::<usize>() {
        Ok(n) => WEEKDAY_NAMES.get(n % 7).map_or_else(|| token.to_string(), |d| d.to_string()),
        Err(_) => {
            let upper = token.to_ascii_uppercase();
            DAY_ABBREVIATIONS
                .iter()
                .position(|d| *d == upper)
                .map_or_else(|| token.to_string(), |i| WEEKDAY_NAMES[i].to_string())
        }
    }
}

fn month_name(token: &str) -> String {
    match token.parse::<usize>() {
        Ok(n) if (1..=12).contains(&n) => MONTH_NAMES[n - 1].to_string(),
        _ => token.to_string(),
    }
}
