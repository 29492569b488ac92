use thiserror::Error;

#[derive(Debug, Error)]
pub enum TickworkError {
    #[error("Configuration error: {0}")]
    Config(String),

    /// An agent configuration failed validation (empty name, missing task, …).
    #[error("Invalid agent configuration: {reason}")]
    InvalidConfiguration { reason: String },
}

impl TickworkError {
    /// Short error code string rendered by console and RPC adapters.
    pub fn code(&self) -> &'static str {
        match self {
            TickworkError::Config(_) => "CONFIG_ERROR",
            TickworkError::InvalidConfiguration { .. } => "INVALID_CONFIGURATION",
        }
    }
}

pub type Result<T> = std::result::Result<T, TickworkError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        assert_eq!(TickworkError::Config("x".into()).code(), "CONFIG_ERROR");
        let invalid = TickworkError::InvalidConfiguration {
            reason: "agent name must not be empty".into(),
        };
        assert_eq!(invalid.code(), "INVALID_CONFIGURATION");
        assert!(invalid.to_string().contains("must not be empty"));
    }
}
