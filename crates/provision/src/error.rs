//! Error types for operation submission.
//!
//! Validation errors are raised synchronously by
//! [`crate::Orchestrator::submit`] and never reach the background worker.
//! Failures of the running program are not errors at this level: they
//! resolve to an unsuccessful [`crate::OperationOutcome`].

use std::path::PathBuf;
use thiserror::Error;

/// A malformed or incomplete operation request
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// No target disk was given
    #[error("no target disk selected")]
    MissingDisk,

    /// Disk name is not a plain kernel device name
    #[error("invalid disk name: {0:?}")]
    InvalidDiskName(String),

    /// Only one of vendor key / vendor certificate was supplied
    #[error("custom EFI signing needs both a vendor key and a vendor certificate")]
    IncompleteKeyPair,

    /// Vendor key does not exist or cannot be read
    #[error("vendor key file not found or unreadable: {0}")]
    KeyNotReadable(PathBuf),

    /// Vendor certificate does not exist or cannot be read
    #[error("vendor certificate file not found or unreadable: {0}")]
    CertNotReadable(PathBuf),

    /// Owner GUID is not in 8-4-4-4-12 hex form
    #[error("invalid owner GUID: {0:?}")]
    InvalidOwnerGuid(String),
}

/// Errors returned by the orchestrator's synchronous surface
#[derive(Debug, Error)]
pub enum Error {
    /// Request rejected before any privileged action
    #[error("invalid request: {0}")]
    Validation(#[from] ValidationError),

    /// Another operation is in flight
    #[error("an operation is already running")]
    Busy,

    /// The previous outcome has not been acknowledged yet
    #[error("the previous operation has finished but was not acknowledged")]
    AwaitingAcknowledgement,

    /// Acknowledge called with nothing to acknowledge
    #[error("no completed operation to acknowledge")]
    NothingToAcknowledge,

    /// Acknowledge called while the operation is still running
    #[error("the operation is still running")]
    StillRunning,

    /// The background worker could not be started
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for orchestrator calls
pub type Result<T> = std::result::Result<T, Error>;
