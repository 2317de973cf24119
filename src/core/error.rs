use std::error::Error;
use std::fmt::{self, Display};

/// Error type for agent operations
#[derive(Debug, Clone, PartialEq)]
pub enum AgentError {
    /// Bad input rejected before it reaches the queue (priority, schedule, type)
    ValidationError(String),
    /// The live task queue is full
    CapacityError(String),
    /// The executor threw or returned an error payload
    ExecutionError(String),
    /// The task exceeded the maximum working duration
    TimeoutError(String),
    /// The requested lifecycle or status transition is not allowed
    StateTransitionError(String),
    /// The durable store could not be read or written
    PersistenceError(String),
    /// Unknown task, trigger or history entry
    NotFound(String),
    /// Configuration could not be loaded or is invalid
    ConfigError(String),
}

impl AgentError {
    /// Stable machine-readable code used in API responses
    pub fn error_code(&self) -> &'static str {
        match self {
            AgentError::ValidationError(_) => "validation_error",
            AgentError::CapacityError(_) => "capacity_error",
            AgentError::ExecutionError(_) => "execution_error",
            AgentError::TimeoutError(_) => "timeout_error",
            AgentError::StateTransitionError(_) => "state_transition_error",
            AgentError::PersistenceError(_) => "persistence_error",
            AgentError::NotFound(_) => "not_found",
            AgentError::ConfigError(_) => "config_error",
        }
    }
}

impl Display for AgentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AgentError::ValidationError(msg) => write!(f, "Validation error: {}", msg),
            AgentError::CapacityError(msg) => write!(f, "Capacity error: {}", msg),
            AgentError::ExecutionError(msg) => write!(f, "Execution error: {}", msg),
            AgentError::TimeoutError(msg) => write!(f, "Timeout error: {}", msg),
            AgentError::StateTransitionError(msg) => write!(f, "Invalid state transition: {}", msg),
            AgentError::PersistenceError(msg) => write!(f, "Persistence error: {}", msg),
            AgentError::NotFound(msg) => write!(f, "Not found: {}", msg),
            AgentError::ConfigError(msg) => write!(f, "Configuration error: {}", msg),
        }
    }
}

impl Error for AgentError {}

impl From<rusqlite::Error> for AgentError {
    fn from(err: rusqlite::Error) -> Self {
        AgentError::PersistenceError(err.to_string())
    }
}

impl From<std::io::Error> for AgentError {
    fn from(err: std::io::Error) -> Self {
        AgentError::PersistenceError(err.to_string())
    }
}

impl From<prometheus::Error> for AgentError {
    fn from(err: prometheus::Error) -> Self {
        AgentError::ConfigError(format!("metrics registry: {}", err))
    }
}

/// Result alias used across the crate
pub type AgentResult<T> = Result<T, AgentError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_tags_each_kind() {
        let timeout = AgentError::TimeoutError("took too long".to_string());
        let failed = AgentError::ExecutionError("boom".to_string());

        assert_eq!(timeout.to_string(), "Timeout error: took too long");
        assert_eq!(failed.to_string(), "Execution error: boom");
        assert_ne!(timeout.error_code(), failed.error_code());
    }

    #[test]
    fn test_sqlite_errors_become_persistence_errors() {
        let err: AgentError = rusqlite::Error::InvalidQuery.into();
        assert_eq!(err.error_code(), "persistence_error");
    }
}
