// Error types for the lumibeat engine
//
// Configuration errors abort session construction before any device I/O
// happens; bridge and orchestrator errors are absorbed by the update queue
// and effect pipeline, never crossing the tick boundary into the caller.

use std::fmt;

/// Configuration validation errors, raised fail-fast at session construction.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// A numeric setting is outside its permitted range
    OutOfRange {
        field: &'static str,
        value: i64,
        min: i64,
        max: i64,
    },

    /// Brightness minimum is not below brightness maximum
    InvertedBrightnessBounds { min: u8, max: u8 },

    /// A custom color set was selected but contains no colors
    EmptyColorSet,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::OutOfRange {
                field,
                value,
                min,
                max,
            } => write!(f, "{} must be within [{}, {}] (got {})", field, min, max, value),
            ConfigError::InvertedBrightnessBounds { min, max } => write!(
                f,
                "brightness minimum {} must be below brightness maximum {}",
                min, max
            ),
            ConfigError::EmptyColorSet => {
                write!(f, "custom color set must contain at least one color")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Errors reported by the bridge client for a single state write.
#[derive(Debug, Clone, PartialEq)]
pub enum BridgeError {
    /// The bridge is not reachable at all
    NotConnected,

    /// The bridge rejected or failed a single write
    WriteFailed { light: String, reason: String },
}

impl fmt::Display for BridgeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BridgeError::NotConnected => write!(f, "bridge is not connected"),
            BridgeError::WriteFailed { light, reason } => {
                write!(f, "state write for light {} failed: {}", light, reason)
            }
        }
    }
}

impl std::error::Error for BridgeError {}

/// Errors from the task orchestrator's scheduling operations.
#[derive(Debug, Clone, PartialEq)]
pub enum OrchestratorError {
    /// Shutdown was initiated; no new work is accepted
    ShutdownInProgress,
}

impl fmt::Display for OrchestratorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrchestratorError::ShutdownInProgress => {
                write!(f, "task orchestrator is shutting down")
            }
        }
    }
}

impl std::error::Error for OrchestratorError {}

/// Errors raised inside a light effect during one pipeline tick.
///
/// Caught at the pipeline boundary: the failing tick skips its flush but the
/// session continues with the next tick.
#[derive(Debug, Clone, PartialEq)]
pub enum EffectError {
    /// A timer or periodic task could not be scheduled
    ScheduleFailed(OrchestratorError),
}

impl fmt::Display for EffectError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EffectError::ScheduleFailed(inner) => {
                write!(f, "effect could not schedule a task: {}", inner)
            }
        }
    }
}

impl std::error::Error for EffectError {}

impl From<OrchestratorError> for EffectError {
    fn from(err: OrchestratorError) -> Self {
        EffectError::ScheduleFailed(err)
    }
}

/// Errors raised while constructing or stopping a session.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineError {
    /// The session configuration failed validation
    Config(ConfigError),

    /// The session task could not be spawned
    Orchestrator(OrchestratorError),

    /// The bridge was not connected at session start
    BridgeUnavailable,
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::Config(inner) => write!(f, "invalid session configuration: {}", inner),
            EngineError::Orchestrator(inner) => write!(f, "session task failed: {}", inner),
            EngineError::BridgeUnavailable => write!(f, "bridge is not connected"),
        }
    }
}

impl std::error::Error for EngineError {}

impl From<ConfigError> for EngineError {
    fn from(err: ConfigError) -> Self {
        EngineError::Config(err)
    }
}

impl From<OrchestratorError> for EngineError {
    fn from(err: OrchestratorError) -> Self {
        EngineError::Orchestrator(err)
    }
}
