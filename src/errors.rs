// src/errors.rs

//! Crate-wide error types.
//!
//! The coordination core uses the structured [`JobCntrlError`] so callers
//! can tell configuration problems apart from misuse of an already-disposed
//! object. The application boundary (config file loading, the demo binary)
//! wraps these with `anyhow` context like the rest of the crate's tooling.

use thiserror::Error;

/// Errors raised by the job-control core.
#[derive(Debug, Error)]
pub enum JobCntrlError {
    /// Invalid or incomplete configuration (missing property, bad value, ...).
    ///
    /// Raised at template construction or starter/job initialization time;
    /// the runtime never starts in a partially-valid state.
    #[error("configuration error: {0}")]
    Config(String),

    /// A master template names an implementation type key that was never
    /// registered with the corresponding registry.
    #[error("unknown {kind} type '{key}' (not registered)")]
    UnknownType {
        /// `"starter"` or `"job"`.
        kind: &'static str,
        key: String,
    },

    /// A starter name could not be resolved from the runtime's starter map
    /// (unknown name, or the runtime has already been stopped).
    #[error("unknown starter '{0}'")]
    UnknownStarter(String),

    /// Programming error: an operation on an object in the wrong state
    /// (double init, use after dispose, ...). Never silently ignored.
    #[error("invalid operation: {0}")]
    InvalidOp(String),
}

/// Convenience alias used throughout the core modules.
pub type Result<T, E = JobCntrlError> = std::result::Result<T, E>;
