use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Result, TickworkError};

/// Discriminator of the built-in fixed-interval agent type.
pub const TIMER_TYPE: &str = "timer";
/// Discriminator of the built-in cron agent type.
pub const CRON_TYPE: &str = "cron";

pub const DEFAULT_TIMER_SCHEDULE: &str = "1 minute";
pub const DEFAULT_CRON_SCHEDULE: &str = "* * * * *";
pub const DEFAULT_STOP_TIMEOUT_SECS: i64 = 60;

/// Schedule used when a configuration of `kind` does not name one.
///
/// Types registered outside this crate have no default and must always
/// carry an explicit schedule.
pub fn default_schedule(kind: &str) -> Option<&'static str> {
    match kind {
        TIMER_TYPE => Some(DEFAULT_TIMER_SCHEDULE),
        CRON_TYPE => Some(DEFAULT_CRON_SCHEDULE),
        _ => None,
    }
}

/// Lifecycle state of an agent.
///
/// `Set` → `Started` → `Running` → (back to the state held before running)
/// → `Stopped`. `Error` is terminal and only entered when arming a scheduler
/// fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AgentState {
    Set,
    Started,
    Running,
    Stopped,
    Error,
}

impl fmt::Display for AgentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AgentState::Set => "SET",
            AgentState::Started => "STARTED",
            AgentState::Running => "RUNNING",
            AgentState::Stopped => "STOPPED",
            AgentState::Error => "ERROR",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for AgentState {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "SET" => Ok(AgentState::Set),
            "STARTED" => Ok(AgentState::Started),
            "RUNNING" => Ok(AgentState::Running),
            "STOPPED" => Ok(AgentState::Stopped),
            "ERROR" => Ok(AgentState::Error),
            other => Err(format!("unknown agent state: {other}")),
        }
    }
}

/// Immutable description of one agent, produced once at load time.
///
/// Build it with [`AgentConfiguration::builder`] or deserialize it from a
/// descriptor `[[agents]]` table; both paths run the same validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawAgentConfiguration")]
pub struct AgentConfiguration {
    name: String,
    #[serde(rename = "type")]
    kind: String,
    task: String,
    schedule: String,
    auto_start: bool,
    stop_timeout_secs: i64,
    hidden: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
}

impl AgentConfiguration {
    pub fn builder(name: impl Into<String>, kind: impl Into<String>) -> AgentConfigurationBuilder {
        AgentConfigurationBuilder::new(name, kind)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Type discriminator used by the agent factory (`"timer"`, `"cron"`, …).
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Reference resolved to a callable by a task resolver.
    pub fn task(&self) -> &str {
        &self.task
    }

    /// Interval string or cron expression, depending on [`Self::kind`].
    pub fn schedule(&self) -> &str {
        &self.schedule
    }

    pub fn auto_start(&self) -> bool {
        self.auto_start
    }

    /// Seconds `stop` waits for an in-flight run; negative waits forever.
    pub fn stop_timeout_secs(&self) -> i64 {
        self.stop_timeout_secs
    }

    pub fn hidden(&self) -> bool {
        self.hidden
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }
}

/// Validating builder for [`AgentConfiguration`].
#[derive(Debug, Clone)]
pub struct AgentConfigurationBuilder {
    name: String,
    kind: String,
    task: Option<String>,
    schedule: Option<String>,
    auto_start: bool,
    stop_timeout_secs: i64,
    hidden: bool,
    description: Option<String>,
}

impl AgentConfigurationBuilder {
    pub fn new(name: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: kind.into(),
            task: None,
            schedule: None,
            auto_start: true,
            stop_timeout_secs: DEFAULT_STOP_TIMEOUT_SECS,
            hidden: false,
            description: None,
        }
    }

    pub fn task(mut self, task: impl Into<String>) -> Self {
        self.task = Some(task.into());
        self
    }

    pub fn schedule(mut self, schedule: impl Into<String>) -> Self {
        self.schedule = Some(schedule.into());
        self
    }

    pub fn auto_start(mut self, auto_start: bool) -> Self {
        self.auto_start = auto_start;
        self
    }

    pub fn stop_timeout_secs(mut self, secs: i64) -> Self {
        self.stop_timeout_secs = secs;
        self
    }

    pub fn hidden(mut self, hidden: bool) -> Self {
        self.hidden = hidden;
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn build(self) -> Result<AgentConfiguration> {
        let name = self.name.trim().to_string();
        if name.is_empty() {
            return Err(invalid("agent name must not be empty"));
        }

        let kind = self.kind.trim().to_ascii_lowercase();
        if kind.is_empty() {
            return Err(invalid(format!("agent '{name}' has no type")));
        }

        let task = self.task.map(|t| t.trim().to_string()).unwrap_or_default();
        if task.is_empty() {
            return Err(invalid(format!("agent '{name}' has no task reference")));
        }

        let schedule = match self.schedule.map(|s| s.trim().to_string()) {
            Some(s) if !s.is_empty() => s,
            _ => default_schedule(&kind)
                .map(String::from)
                .ok_or_else(|| {
                    invalid(format!("agent '{name}' of type '{kind}' needs a schedule"))
                })?,
        };

        Ok(AgentConfiguration {
            name,
            kind,
            task,
            schedule,
            auto_start: self.auto_start,
            stop_timeout_secs: self.stop_timeout_secs,
            hidden: self.hidden,
            description: self.description.filter(|d| !d.trim().is_empty()),
        })
    }
}

fn invalid(reason: impl Into<String>) -> TickworkError {
    TickworkError::InvalidConfiguration {
        reason: reason.into(),
    }
}

/// Wire shape of a descriptor entry before validation.
#[derive(Debug, Deserialize)]
struct RawAgentConfiguration {
    name: String,
    #[serde(rename = "type")]
    kind: String,
    task: Option<String>,
    schedule: Option<String>,
    #[serde(default = "bool_true")]
    auto_start: bool,
    #[serde(default = "default_stop_timeout")]
    stop_timeout_secs: i64,
    #[serde(default)]
    hidden: bool,
    description: Option<String>,
}

impl TryFrom<RawAgentConfiguration> for AgentConfiguration {
    type Error = TickworkError;

    fn try_from(raw: RawAgentConfiguration) -> Result<Self> {
        let mut builder = AgentConfigurationBuilder::new(raw.name, raw.kind)
            .auto_start(raw.auto_start)
            .stop_timeout_secs(raw.stop_timeout_secs)
            .hidden(raw.hidden);
        if let Some(task) = raw.task {
            builder = builder.task(task);
        }
        if let Some(schedule) = raw.schedule {
            builder = builder.schedule(schedule);
        }
        if let Some(description) = raw.description {
            builder = builder.description(description);
        }
        builder.build()
    }
}

fn bool_true() -> bool {
    true
}

fn default_stop_timeout() -> i64 {
    DEFAULT_STOP_TIMEOUT_SECS
}
