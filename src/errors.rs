//! Structured error kinds surfaced to the host UI.
//!
//! Each variant corresponds to one of the error kinds distinguished in the
//! interpreter's failure-handling design: preparation failures stop the flow,
//! HTTP failures are gated by a step's `onFailure` policy, and extraction
//! failures are accumulated without ever stopping anything.

use std::fmt;

use thiserror::Error;

use crate::model::ValidationIssue;

/// Closed set of error kinds a caller needs to distinguish in the UI.
#[derive(Debug, Error)]
pub enum FlowError {
    /// The flow file is not valid JSON, or is missing required fields, or
    /// names a step type the codec does not recognize.
    #[error("invalid flow model: {0}")]
    Model(String),

    /// One or more problems collected by `validate_flow`. Non-fatal: gates
    /// save, never mutates the model.
    #[error("{} validation issue(s)", .0.len())]
    Validation(Vec<ValidationIssue>),

    /// Body-marker substitution or post-substitution JSON re-parse failed.
    /// Surfaces as a step `error` before any network I/O is attempted.
    #[error("variable substitution failed: {0}")]
    Substitution(String),

    /// Network, DNS, connection-refused, TLS, timeout, or user-abort.
    #[error("request failed: {0}")]
    Request(String),

    /// The condition evaluator raised on an unknown operator.
    #[error("condition evaluation failed: {0}")]
    Condition(String),

    /// The loop `source` did not resolve to an array, or evaluation failed.
    #[error("loop evaluation failed: {0}")]
    Loop(String),

    /// File I/O failure reported by the host bridge.
    #[error("host I/O error ({code}): {message}")]
    Host { code: HostErrorCode, message: String },
}

impl FlowError {
    /// A short, stable code for log correlation. Unlike the numbered-code
    /// scheme of UTDL-flavored runners, this only needs to distinguish
    /// kinds, not individual causes within a kind.
    pub fn code(&self) -> &'static str {
        match self {
            FlowError::Model(_) => "model",
            FlowError::Validation(_) => "validation",
            FlowError::Substitution(_) => "substitution",
            FlowError::Request(_) => "request",
            FlowError::Condition(_) => "condition",
            FlowError::Loop(_) => "loop",
            FlowError::Host { .. } => "host",
        }
    }
}

/// Per-variable extraction failure. Never fatal; attached to the owning
/// step's result.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionFailure {
    pub var_name: String,
    pub path: String,
    pub reason: String,
}

/// Host-bridge file I/O failure, mapped from `std::io::ErrorKind` the way a
/// production runner maps OS errors to user-facing messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostErrorCode {
    NotFound,
    PermissionDenied,
    IsADirectory,
    StorageFull,
    ReadOnlyFilesystem,
    Other,
}

impl HostErrorCode {
    pub fn from_io_error(err: &std::io::Error) -> Self {
        use std::io::ErrorKind;
        match err.kind() {
            ErrorKind::NotFound => Self::NotFound,
            ErrorKind::PermissionDenied => Self::PermissionDenied,
            _ => match err.raw_os_error() {
                Some(21) => Self::IsADirectory,  // EISDIR
                Some(28) => Self::StorageFull,   // ENOSPC
                Some(30) => Self::ReadOnlyFilesystem, // EROFS
                _ => Self::Other,
            },
        }
    }
}

impl fmt::Display for HostErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::NotFound => "ENOENT",
            Self::PermissionDenied => "EACCES",
            Self::IsADirectory => "EISDIR",
            Self::StorageFull => "ENOSPC",
            Self::ReadOnlyFilesystem => "EROFS",
            Self::Other => "EUNKNOWN",
        };
        write!(f, "{label}")
    }
}

/// Raised at window-close/quit; answered by the user through a modal. Not an
/// error in the `std::error::Error` sense — it is a question, not a failure —
/// so it is kept outside `FlowError` and routed through the host bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnsavedChangesIntent {
    Cancel,
    Discard,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_error_code_maps_common_kinds() {
        let err = std::io::Error::new(std::io::ErrorKind::NotFound, "nope");
        assert_eq!(HostErrorCode::from_io_error(&err), HostErrorCode::NotFound);
        assert_eq!(HostErrorCode::NotFound.to_string(), "ENOENT");
    }

    #[test]
    fn flow_error_code_is_stable() {
        assert_eq!(FlowError::Model("x".into()).code(), "model");
        assert_eq!(
            FlowError::Host {
                code: HostErrorCode::PermissionDenied,
                message: "nope".into()
            }
            .code(),
            "host"
        );
    }
}
