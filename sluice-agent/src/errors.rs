//! Errors that stop the agent before or while starting its controller.

use sluice_core::ConfigError;

/// An error that prevents the agent from running.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    /// The controller configuration was rejected
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    /// A duration flag could not be converted
    #[error("invalid duration for {flag}: {value}")]
    InvalidDuration {
        /// The offending flag
        flag: &'static str,
        /// The value it was given
        value: String,
    },
    /// Logging could not be set up
    #[error("failed to configure telemetry: {0}")]
    Telemetry(String),
}
