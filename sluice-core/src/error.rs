//! Error types shared across the controller and its collaborators.

use crate::domain::backend::Backend;

/// A configuration that cannot be used to start a controller.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    /// No backends were configured
    #[error("at least one backend must be configured")]
    NoBackends,
    /// The same backend was listed more than once
    #[error("backend {0} is configured more than once")]
    DuplicateBackend(Backend),
    /// The control period was zero
    #[error("control period must be greater than zero")]
    ZeroPeriod,
    /// The probe timeout was zero
    #[error("probe timeout must be greater than zero")]
    ZeroProbeTimeout,
    /// No probes would be taken per cycle
    #[error("samples per cycle must be at least 1")]
    NoSamples,
    /// The smoothing factor is outside `(0, 1]`
    #[error("alpha must be in (0, 1], got {0}")]
    InvalidAlpha(f64),
    /// The score denominator floor is not a positive finite number
    #[error("epsilon must be positive and finite, got {0}")]
    InvalidEpsilon(f64),
    /// The starting latency estimate is not a positive finite number
    #[error("initial estimate must be positive and finite, got {0}")]
    InvalidInitialEstimate(f64),
    /// The weight bounds are inverted
    #[error("weight_min ({min}) must not exceed weight_max ({max})")]
    InvertedWeightBounds {
        /// The configured lower bound
        min: u32,
        /// The configured upper bound
        max: u32,
    },
}

/// A failure reported by a routing table store.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// The store could not be reached at all
    #[error("routing store unreachable: {0}")]
    Unreachable(String),
    /// The store was reached but refused the operation
    #[error("routing store rejected the operation: {0}")]
    Rejected(String),
}

impl StoreError {
    /// Create a new unreachable error
    pub fn unreachable<T: ToString>(msg: T) -> Self {
        Self::Unreachable(msg.to_string())
    }

    /// Create a new rejected error
    pub fn rejected<T: ToString>(msg: T) -> Self {
        Self::Rejected(msg.to_string())
    }
}

/// A backend address that could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackendParseError {
    /// The host part was empty
    #[error("backend address has an empty host: {0:?}")]
    EmptyHost(String),
    /// The port part was not a valid port number
    #[error("backend address has an invalid port: {0:?}")]
    InvalidPort(String),
}
