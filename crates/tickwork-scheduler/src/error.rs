use thiserror::Error;

/// Caller-facing failure classes, used by adapters to pick a rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Unknown agent name or agent type.
    InvalidArgument,
    /// The operation does not fit the agent's current lifecycle state.
    InvalidState,
    /// `stop` gave up waiting for an in-flight run.
    Timeout,
    /// Malformed schedule, task reference or task binding.
    Configuration,
}

/// Errors that can occur within the scheduler subsystem.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("Unknown agent: {name}")]
    UnknownAgent { name: String },

    #[error("Unknown agent type: {kind}")]
    UnknownAgentType { kind: String },

    #[error("Agent already registered: {name}")]
    AgentExists { name: String },

    #[error("Agent {name} is already started")]
    AlreadyStarted { name: String },

    #[error("Agent {name} is already stopped")]
    AlreadyStopped { name: String },

    #[error("Agent {name} is already running")]
    AlreadyRunning { name: String },

    #[error("Agent {name}: {reason}")]
    IllegalState { name: String, reason: String },

    /// The agent is still running; `stop` may be retried.
    #[error("Agent {name} did not finish its run within {secs}s")]
    Timeout { name: String, secs: i64 },

    /// The provided schedule, task reference or binding is invalid.
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl AgentError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AgentError::UnknownAgent { .. } | AgentError::UnknownAgentType { .. } => {
                ErrorKind::InvalidArgument
            }
            AgentError::AgentExists { .. }
            | AgentError::AlreadyStarted { .. }
            | AgentError::AlreadyStopped { .. }
            | AgentError::AlreadyRunning { .. }
            | AgentError::IllegalState { .. } => ErrorKind::InvalidState,
            AgentError::Timeout { .. } => ErrorKind::Timeout,
            AgentError::Configuration(_) => ErrorKind::Configuration,
        }
    }

    /// Short error code string sent to console/RPC clients.
    pub fn code(&self) -> &'static str {
        match self {
            AgentError::UnknownAgent { .. } => "UNKNOWN_AGENT",
            AgentError::UnknownAgentType { .. } => "UNKNOWN_AGENT_TYPE",
            AgentError::AgentExists { .. } => "AGENT_EXISTS",
            AgentError::AlreadyStarted { .. } => "ALREADY_STARTED",
            AgentError::AlreadyStopped { .. } => "ALREADY_STOPPED",
            AgentError::AlreadyRunning { .. } => "ALREADY_RUNNING",
            AgentError::IllegalState { .. } => "ILLEGAL_STATE",
            AgentError::Timeout { .. } => "TIMEOUT",
            AgentError::Configuration(_) => "CONFIGURATION_ERROR",
        }
    }
}

impl From<tickwork_core::TickworkError> for AgentError {
    fn from(e: tickwork_core::TickworkError) -> Self {
        AgentError::Configuration(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AgentError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_follow_taxonomy() {
        let unknown = AgentError::UnknownAgent { name: "a".into() };
        assert_eq!(unknown.kind(), ErrorKind::InvalidArgument);
        assert_eq!(unknown.code(), "UNKNOWN_AGENT");

        let started = AgentError::AlreadyStarted { name: "a".into() };
        assert_eq!(started.kind(), ErrorKind::InvalidState);

        let timeout = AgentError::Timeout {
            name: "a".into(),
            secs: 4,
        };
        assert_eq!(timeout.kind(), ErrorKind::Timeout);
        assert_eq!(timeout.to_string(), "Agent a did not finish its run within 4s");

        let cfg = AgentError::Configuration("bad".into());
        assert_eq!(cfg.kind(), ErrorKind::Configuration);
    }
}
