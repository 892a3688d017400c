//! # provision
//!
//! Privileged install and erase operations for bootable USB drives.
//!
//! A request goes through three steps:
//!
//! 1. [`compose`] turns a validated [`OperationRequest`] into a
//!    [`ComposedProgram`]: ordered shell stages, each with a
//!    [`FailurePolicy`]. Nothing runs and nothing elevates here.
//! 2. [`ProcessRunner`] renders the program to one script and runs it
//!    through a single [`Launcher`] (pkexec, sudo, or none), streaming
//!    every output line as a [`ProgressEvent`].
//! 3. [`Orchestrator`] owns the single-flight state machine: one operation
//!    at a time, run on a background thread, finished by an
//!    [`OperationOutcome`] that must be acknowledged before the next
//!    submission.
//!
//! ## Example
//!
//! ```no_run
//! use provision::{Elevation, EraseRequest, OperationRequest, Orchestrator, ProcessRunner};
//!
//! let orchestrator = Orchestrator::new(ProcessRunner::new(Elevation::Pkexec));
//! let handle = orchestrator.submit(OperationRequest::Erase(EraseRequest::new("sdb", false)))?;
//! let outcome = handle.wait(|event| println!("{}", event.line));
//! orchestrator.acknowledge()?;
//! assert_eq!(outcome.success, outcome.exit_code == Some(0));
//! # Ok::<(), provision::Error>(())
//! ```

pub mod compose;
pub mod error;
pub mod event;
pub mod keys;
pub mod orchestrator;
pub mod request;
pub mod runner;

pub use compose::{
    ComposeOptions, ComposedProgram, FailurePolicy, Stage, StageKind, compose, compose_with,
};
pub use error::{Error, Result, ValidationError};
pub use event::{ProgressEvent, Severity};
pub use keys::{DetectedKeys, detect_signing_keys, machine_owner_guid};
pub use orchestrator::{OperationEvent, OperationHandle, OperationState, Orchestrator};
pub use request::{
    EraseRequest, InstallRequest, OperationKind, OperationRequest, PartitionStyle, SigningKeys,
};
pub use runner::{Elevation, Launcher, OperationOutcome, ProcessRunner, render};
