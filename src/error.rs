//! Error types for AFQMC calculations.
//!
//! Setup failures (bad configuration, unreadable orbitals, a trial
//! wavefunction that never converges) are fatal for a run. Numerical
//! trouble inside the random walk is handled by deactivating walkers and
//! only surfaces here when the whole population collapses.

use thiserror::Error;

/// Result type alias for AFQMC operations
pub type Result<T> = std::result::Result<T, AfqmcError>;

#[derive(Error, Debug)]
pub enum AfqmcError {
    /// File could not be opened, read or written
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Run configuration (or native orbital file) is not valid YAML
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Estimator output file is not valid JSON
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Legacy text data could not be parsed
    #[error("Parse error in {file}: {message}")]
    Parse { file: String, message: String },

    /// Configuration is self-inconsistent
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Self-consistent trial wavefunction search failed
    #[error("Trial wavefunction did not converge after {attempts} attempts (last dE = {delta_e:.3e})")]
    TrialNotConverged { attempts: usize, delta_e: f64 },

    /// Every walker has zero weight, population control has nothing to sample
    #[error("Population collapsed at step {0}: total weight is zero")]
    PopulationCollapse(usize),

    /// A matrix that must be inverted is singular
    #[error("Singular matrix: {0}")]
    Singular(String),
}

impl AfqmcError {
    pub fn parse(file: &str, message: impl Into<String>) -> Self {
        AfqmcError::Parse {
            file: file.to_string(),
            message: message.into(),
        }
    }
}
