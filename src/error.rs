//! Error handling for the workflow wrapper
//!
//! One error type covers every fatal failure category of a run. Non-fatal
//! outcomes (an unresolved execution name, a failed log upload) are not
//! errors at the run level; they are reported through
//! [`crate::driver::LogUpload`] instead.

use thiserror::Error;

/// Main error type for the workflow wrapper
#[derive(Error, Debug)]
pub enum WorkflowError {
    /// IO errors (file operations, process spawning)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Parameter values that do not satisfy the schema
    #[error("Parameter error: {0}")]
    Parameter(String),

    /// The execution token variable is not set
    #[error("failed to get execution token: {0} is not set")]
    MissingToken(String),

    /// Shared storage could not be provisioned
    #[error("Provisioning failed: {0}")]
    Provisioning(String),

    /// The working directory could not be staged
    #[error("Staging failed: {0}")]
    Staging(String),

    /// The pipeline runner could not be spawned or exited unsuccessfully
    #[error("Execution failed: {0}")]
    Execution(String),

    /// The pipeline runner was terminated because this process received a signal
    #[error("Execution interrupted by signal {0}")]
    Interrupted(i32),

    /// Platform API errors (execution lookup, uploads)
    #[error("Platform error: {0}")]
    Platform(String),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for workflow operations
pub type Result<T> = std::result::Result<T, WorkflowError>;

impl WorkflowError {
    /// Create a parameter error
    pub fn parameter(msg: impl Into<String>) -> Self {
        Self::Parameter(msg.into())
    }

    /// Create a provisioning error
    pub fn provisioning(msg: impl Into<String>) -> Self {
        Self::Provisioning(msg.into())
    }

    /// Create a staging error
    pub fn staging(msg: impl Into<String>) -> Self {
        Self::Staging(msg.into())
    }

    /// Create an execution error
    pub fn execution(msg: impl Into<String>) -> Self {
        Self::Execution(msg.into())
    }

    /// Create a platform error
    pub fn platform(msg: impl Into<String>) -> Self {
        Self::Platform(msg.into())
    }

    /// Exit code the binary should use for this error.
    ///
    /// Signal interruptions follow the shell convention of `128 + signal`.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Interrupted(sig) => 128 + sig,
            _ => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = WorkflowError::provisioning("HTTP 503");
        assert_eq!(err.to_string(), "Provisioning failed: HTTP 503");

        let err = WorkflowError::MissingToken("FLYTE_INTERNAL_EXECUTION_ID".into());
        assert_eq!(
            err.to_string(),
            "failed to get execution token: FLYTE_INTERNAL_EXECUTION_ID is not set"
        );
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: WorkflowError = io_err.into();
        assert!(matches!(err, WorkflowError::Io(_)));
    }

    #[test]
    fn test_error_constructors() {
        let err = WorkflowError::execution("exit code 1");
        assert!(matches!(err, WorkflowError::Execution(_)));

        let err = WorkflowError::staging("permission denied");
        assert!(matches!(err, WorkflowError::Staging(_)));
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(WorkflowError::execution("boom").exit_code(), 1);
        assert_eq!(WorkflowError::Interrupted(15).exit_code(), 143);
    }
}
