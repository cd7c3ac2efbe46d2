//! Error types for the image runner pipeline
//!
//! Each stage of a run has its own variant so a failure can be traced back to
//! the step that produced it. A child process exiting with a non-zero code is
//! not an error; it is reported through [`crate::runtime::ExitOutcome`].

pub mod handlers;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, RunnerError>;

#[derive(Error, Debug)]
pub enum RunnerError {
    /// Token issuance failed
    #[error("Authentication error: {0}")]
    Auth(String),

    /// Manifest fetch or decode failed
    #[error("Manifest error: {0}")]
    Manifest(String),

    /// Blob fetch, decompression or unpack failed
    #[error("Layer error: {0}")]
    Layer(String),

    /// Blob content does not hash to the digest in the manifest
    #[error("Layer error: digest mismatch for {digest}: computed {computed}")]
    DigestMismatch { digest: String, computed: String },

    /// Staging the command binary into the root failed
    #[error("Copy error: {0}")]
    Copy(String),

    /// Namespace setup failed before any child existed
    #[error("Isolation error: {0}")]
    Isolation(String),

    /// The child could not be spawned or waited on
    #[error("Exec error: {0}")]
    Exec(String),

    #[error("Invalid image reference: {0}")]
    InvalidReference(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl RunnerError {
    /// Short name of the stage that failed, used in diagnostics
    pub fn stage(&self) -> &'static str {
        match self {
            RunnerError::Auth(_) => "auth",
            RunnerError::Manifest(_) => "manifest",
            RunnerError::Layer(_) | RunnerError::DigestMismatch { .. } => "layer",
            RunnerError::Copy(_) => "copy",
            RunnerError::Isolation(_) => "isolation",
            RunnerError::Exec(_) => "exec",
            RunnerError::InvalidReference(_) | RunnerError::Config(_) => "setup",
        }
    }
}

impl From<url::ParseError> for RunnerError {
    fn from(err: url::ParseError) -> Self {
        RunnerError::Config(err.to_string())
    }
}
