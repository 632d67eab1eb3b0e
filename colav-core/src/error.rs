//! Error types for configuration loading and per-target geometry

use thiserror::Error;

use crate::encounter::EncounterState;

/// Configuration errors. These are detected when a configuration is loaded
/// and are fatal: a pipeline refuses to start with an invalid configuration.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// Sector thresholds must satisfy 0 < θ1 < θ2 < π
    #[error("Invalid sector thresholds: theta1 = {theta1}, theta2 = {theta2} (need 0 < theta1 < theta2 < pi)")]
    InvalidSectors { theta1: f64, theta2: f64 },

    /// A tuning constant that must be strictly positive is not
    #[error("Parameter '{name}' must be > 0, got {value}")]
    NotPositive { name: &'static str, value: f64 },

    /// A parameter is outside of its allowed open interval
    #[error("Parameter '{name}' must lie in ({low}, {high}), got {value}")]
    OutOfRange {
        name: &'static str,
        value: f64,
        low: f64,
        high: f64,
    },

    /// Entry/exit gates contradict each other
    #[error("Inconsistent CPA gates: {0}")]
    InconsistentGates(String),

    /// No critical area template for an encounter state
    #[error("Missing critical area template for {0}")]
    MissingTemplate(EncounterState),

    /// Critical area template does not describe a closed convex polygon
    #[error("Critical area for {state} is invalid: {reason}")]
    InvalidTemplate {
        state: EncounterState,
        reason: String,
    },

    /// Configuration file could not be parsed
    #[error("Cannot parse configuration: {0}")]
    Parse(String),
}

impl From<serde_json::Error> for ConfigError {
    fn from(e: serde_json::Error) -> Self {
        ConfigError::Parse(e.to_string())
    }
}

/// Geometry that leaves the classification or the CPA undefined.
///
/// These never abort a cycle: the target is reported as SAFE with the
/// `degraded` flag set.
#[derive(Error, Debug, Clone, Copy, PartialEq)]
pub enum GeometryError {
    /// Target position coincides with own ship
    #[error("Target position coincides with own ship")]
    CoincidentPositions,

    /// Relative velocity is zero, CPA is not defined
    #[error("Relative velocity is zero, CPA is undefined")]
    UndefinedCpa,

    /// NaN or infinite kinematic input
    #[error("Non-finite kinematic input")]
    NonFiniteInput,
}
