//! Error types.
//!
//! Two layers:
//!
//! - [`FitError`]: the typed failures of the regression core (design matrix,
//!   solver, sigma clipping, Monte Carlo).
//! - [`AppError`]: what the binary reports, an exit code plus a message.
//!
//! Non-convergence of sigma clipping is not a `FitError`:
//! it produces a usable fit flagged with `converged = false`.

use thiserror::Error;

/// Failures raised by the regression core.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FitError {
    #[error("Shape mismatch: {0}")]
    ShapeMismatch(String),

    #[error("Singular value decomposition failed: {0}")]
    SingularSystem(String),

    #[error("Invalid photometric error for star {star}, band {band}: {value} (must be finite and >= 0)")]
    InvalidErrorInput { star: usize, band: usize, value: f64 },

    #[error("Unsupported distance unit '{0}' (expected modulus, pc or kpc)")]
    UnsupportedUnit(String),

    #[error("Sigma clipping excluded every star at iteration {iteration}")]
    AllStarsExcluded { iteration: usize },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl FitError {
    /// Process exit code used when this error reaches the binary.
    pub fn exit_code(&self) -> u8 {
        match self {
            FitError::ShapeMismatch(_)
            | FitError::InvalidErrorInput { .. }
            | FitError::UnsupportedUnit(_)
            | FitError::InvalidConfig(_) => 2,
            FitError::AllStarsExcluded { .. } => 3,
            FitError::SingularSystem(_) => 4,
        }
    }
}

#[derive(Clone)]
pub struct AppError {
    exit_code: u8,
    message: String,
}

impl AppError {
    pub fn new(exit_code: u8, message: impl Into<String>) -> Self {
        Self {
            exit_code,
            message: message.into(),
        }
    }

    pub fn exit_code(&self) -> u8 {
        self.exit_code
    }
}

impl From<FitError> for AppError {
    fn from(err: FitError) -> Self {
        AppError::new(err.exit_code(), err.to_string())
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::fmt::Debug for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppError")
            .field("exit_code", &self.exit_code)
            .field("message", &self.message)
            .finish()
    }
}

impl std::error::Error for AppError {}
