use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Local};
use serde::Serialize;
use tickwork_core::AgentState;

use crate::agent::Agent;

const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const NULL: &str = "null";

/// One line of an agent listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AgentSummary {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub state: AgentState,
    pub hidden: bool,
}

impl AgentSummary {
    pub fn of(agent: &Agent) -> Self {
        Self {
            name: agent.name().to_string(),
            kind: agent.kind().to_string(),
            state: agent.state(),
            hidden: agent.hidden(),
        }
    }
}

/// Rendered status of a single agent, as shown to operators.
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub state: AgentState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub start_date: String,
    pub last_execution_date: String,
    pub last_execution_duration: String,
    pub average_execution_duration: String,
    pub execution_count: u64,
    pub failure_count: u64,
    pub schedule: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_execution: Option<String>,
}

impl StatusReport {
    pub fn of(agent: &Agent) -> Self {
        let snapshot = agent.snapshot();
        Self {
            name: agent.name().to_string(),
            kind: agent.kind().to_string(),
            state: snapshot.state,
            description: agent.configuration().description().map(str::to_string),
            start_date: format_date(snapshot.start_date),
            last_execution_date: format_date(snapshot.last_execution_date),
            last_execution_duration: format_duration(snapshot.last_execution_duration),
            average_execution_duration: format_duration(
                (snapshot.execution_count > 0).then_some(snapshot.average_execution_duration),
            ),
            execution_count: snapshot.execution_count,
            failure_count: snapshot.failure_count,
            schedule: agent.schedule_description(),
            next_execution: agent.next_execution().map(|d| format_date(Some(d))),
        }
    }
}

impl fmt::Display for StatusReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "name: {}", self.name)?;
        writeln!(f, "type: {}", self.kind)?;
        writeln!(f, "state: {}", self.state)?;
        if let Some(description) = &self.description {
            writeln!(f, "description: {description}")?;
        }
        writeln!(f, "start date: {}", self.start_date)?;
        writeln!(f, "last execution date: {}", self.last_execution_date)?;
        writeln!(f, "last execution duration: {}", self.last_execution_duration)?;
        writeln!(f, "average execution duration: {}", self.average_execution_duration)?;
        writeln!(f, "executions: {}", self.execution_count)?;
        writeln!(f, "failures: {}", self.failure_count)?;
        write!(f, "schedule: {}", self.schedule)?;
        if let Some(next) = &self.next_execution {
            write!(f, "\nnext execution: {next}")?;
        }
        Ok(())
    }
}

/// `yyyy-MM-dd HH:mm:ss` in local time, or `"null"`.
pub fn format_date(date: Option<DateTime<Local>>) -> String {
    match date {
        Some(d) => d.format(DATE_FORMAT).to_string(),
        None => NULL.to_string(),
    }
}

/// Short duration string in the largest whole unit, or `"null"`.
pub fn format_duration(duration: Option<Duration>) -> String {
    let Some(duration) = duration else {
        return NULL.to_string();
    };
    let secs = duration.as_secs();
    match secs {
        0 => format!("{} millisecond(s)", duration.as_millis()),
        1..=59 => format!("{secs} second(s)"),
        60..=3599 => format!("{} minute(s)", secs / 60),
        _ => format!("{} hour(s)", secs / 3600),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn durations_use_largest_whole_unit() {
        assert_eq!(format_duration(None), "null");
        assert_eq!(format_duration(Some(Duration::ZERO)), "0 millisecond(s)");
        assert_eq!(format_duration(Some(Duration::from_millis(250))), "250 millisecond(s)");
        assert_eq!(format_duration(Some(Duration::from_millis(5_900))), "5 second(s)");
        assert_eq!(format_duration(Some(Duration::from_secs(125))), "2 minute(s)");
        assert_eq!(format_duration(Some(Duration::from_secs(7_300))), "2 hour(s)");
    }

    #[test]
    fn dates_render_or_null() {
        assert_eq!(format_date(None), "null");
        let date = Local.with_ymd_and_hms(2024, 3, 9, 7, 5, 3).single().unwrap();
        assert_eq!(format_date(Some(date)), "2024-03-09 07:05:03");
    }

    #[test]
    fn summary_serializes_type_and_state() {
        let summary = AgentSummary {
            name: "cleanup".to_string(),
            kind: "timer".to_string(),
            state: AgentState::Started,
            hidden: false,
        };
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["type"], "timer");
        assert_eq!(json["state"], "STARTED");
        assert_eq!(json["hidden"], false);
    }
}
