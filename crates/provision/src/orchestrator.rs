//! Operation orchestrator - single-flight state machine
//!
//! ```text
//! Idle --submit--> Running --process exit--> Completed --acknowledge--> Idle
//! ```
//!
//! Submission validates and composes synchronously, then hands the program
//! to one background worker thread. Progress and the final outcome travel
//! back over one ordered channel. A new operation can only start after the
//! previous outcome has been acknowledged.

use crate::compose::{ComposeOptions, ComposedProgram, compose_with};
use crate::error::{Error, Result};
use crate::event::ProgressEvent;
use crate::request::{OperationKind, OperationRequest};
use crate::runner::{OperationOutcome, ProcessRunner};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::Duration;

/// Where the orchestrator is in its lifecycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationState {
    Idle,
    Running { kind: OperationKind, disk: String },
    /// Finished, waiting for the caller to acknowledge
    Completed(OperationOutcome),
}

/// Message from the worker, in emission order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationEvent {
    Progress(ProgressEvent),
    /// Always the last message
    Finished(OperationOutcome),
}

/// Accepts operation requests and runs them one at a time
pub struct Orchestrator {
    runner: Arc<ProcessRunner>,
    options: ComposeOptions,
    state: Arc<Mutex<OperationState>>,
}

impl Orchestrator {
    pub fn new(runner: ProcessRunner) -> Self {
        Self {
            runner: Arc::new(runner),
            options: ComposeOptions::default(),
            state: Arc::new(Mutex::new(OperationState::Idle)),
        }
    }

    pub fn with_options(mut self, options: ComposeOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &ComposeOptions {
        &self.options
    }

    /// Snapshot of the current state
    pub fn state(&self) -> OperationState {
        lock(&self.state).clone()
    }

    pub fn is_idle(&self) -> bool {
        matches!(*lock(&self.state), OperationState::Idle)
    }

    /// Validate and compose without running anything
    pub fn prepare(&self, request: &OperationRequest) -> Result<ComposedProgram> {
        let request = request.validated()?;
        Ok(compose_with(&request, &self.options))
    }

    /// Start an operation in the background.
    ///
    /// Fails without touching the state if the request is invalid, if an
    /// operation is running, or if the last outcome is unacknowledged.
    pub fn submit(&self, request: OperationRequest) -> Result<OperationHandle> {
        let program = self.prepare(&request)?;
        let kind = request.kind();
        let disk = request.disk().to_string();

        {
            let mut state = lock(&self.state);
            match *state {
                OperationState::Idle => {}
                OperationState::Running { .. } => return Err(Error::Busy),
                OperationState::Completed(_) => return Err(Error::AwaitingAcknowledgement),
            }
            *state = OperationState::Running {
                kind,
                disk: disk.clone(),
            };
        }
        log::info!("Starting {} on {}", kind.title(), program.device);

        let (tx, rx) = mpsc::channel();
        let runner = Arc::clone(&self.runner);
        let guard = RunGuard {
            state: Arc::clone(&self.state),
        };

        let spawned = std::thread::Builder::new()
            .name(format!("usbforge-{disk}"))
            .spawn(move || {
                let outcome = runner.run(&program, |event| {
                    // A dropped receiver does not stop the operation
                    let _ = tx.send(OperationEvent::Progress(event));
                });
                log::info!("{} on {} {}", program.kind.title(), program.device, outcome.summary());
                guard.complete(outcome.clone());
                let _ = tx.send(OperationEvent::Finished(outcome));
            });

        match spawned {
            Ok(worker) => Ok(OperationHandle {
                kind,
                disk,
                events: rx,
                worker: Some(worker),
            }),
            Err(e) => {
                // The closure (and its guard) was dropped unrun
                *lock(&self.state) = OperationState::Idle;
                Err(Error::Io(e))
            }
        }
    }

    /// Consume the finished outcome and return to idle
    pub fn acknowledge(&self) -> Result<OperationOutcome> {
        let mut state = lock(&self.state);
        match &*state {
            OperationState::Idle => Err(Error::NothingToAcknowledge),
            OperationState::Running { .. } => Err(Error::StillRunning),
            OperationState::Completed(outcome) => {
                let outcome = outcome.clone();
                *state = OperationState::Idle;
                Ok(outcome)
            }
        }
    }
}

fn lock(state: &Mutex<OperationState>) -> MutexGuard<'_, OperationState> {
    match state.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Moves the slot out of `Running` even if the worker dies
struct RunGuard {
    state: Arc<Mutex<OperationState>>,
}

impl RunGuard {
    fn complete(&self, outcome: OperationOutcome) {
        *lock(&self.state) = OperationState::Completed(outcome);
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        let mut state = lock(&self.state);
        if matches!(*state, OperationState::Running { .. }) && std::thread::panicking() {
            *state = OperationState::Completed(OperationOutcome::transport_failure(
                "operation worker stopped unexpectedly",
                String::new(),
            ));
        }
    }
}

/// Caller side of one submitted operation
pub struct OperationHandle {
    kind: OperationKind,
    disk: String,
    events: Receiver<OperationEvent>,
    worker: Option<JoinHandle<()>>,
}

impl OperationHandle {
    pub fn kind(&self) -> OperationKind {
        self.kind
    }

    pub fn disk(&self) -> &str {
        &self.disk
    }

    /// Next event, blocking. `None` once the worker is gone.
    pub fn recv(&self) -> Option<OperationEvent> {
        self.events.recv().ok()
    }

    /// Next event, waiting at most `timeout`
    pub fn recv_timeout(
        &self,
        timeout: Duration,
    ) -> std::result::Result<OperationEvent, RecvTimeoutError> {
        self.events.recv_timeout(timeout)
    }

    /// Blocking iterator over the remaining events
    pub fn events(&self) -> impl Iterator<Item = OperationEvent> + '_ {
        self.events.iter()
    }

    /// Relay progress to `on_progress` until the operation finishes
    pub fn wait(mut self, mut on_progress: impl FnMut(&ProgressEvent)) -> OperationOutcome {
        let mut finished = None;
        for event in self.events.iter() {
            match event {
                OperationEvent::Progress(progress) => on_progress(&progress),
                OperationEvent::Finished(outcome) => {
                    finished = Some(outcome);
                    break;
                }
            }
        }

        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }

        finished.unwrap_or_else(|| {
            OperationOutcome::transport_failure(
                "operation worker stopped without an outcome",
                String::new(),
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ValidationError;
    use crate::request::{EraseRequest, InstallRequest};
    use crate::runner::Launcher;
    use std::path::Path;
    use std::process::Command;
    use std::sync::mpsc::Sender;

    struct Snippet(&'static str);

    impl Launcher for Snippet {
        fn command(&self, _artifact: &Path) -> Command {
            let mut cmd = Command::new("sh");
            cmd.arg("-c").arg(self.0);
            cmd
        }
    }

    /// Holds the worker inside the launcher until the test opens the gate
    struct Gated(Mutex<Receiver<()>>);

    impl Launcher for Gated {
        fn command(&self, _artifact: &Path) -> Command {
            let _ = self.0.lock().unwrap().recv();
            let mut cmd = Command::new("sh");
            cmd.arg("-c").arg("echo released");
            cmd
        }
    }

    fn gated() -> (Orchestrator, Sender<()>) {
        let (tx, rx) = mpsc::channel();
        (
            Orchestrator::new(ProcessRunner::new(Gated(Mutex::new(rx)))),
            tx,
        )
    }

    fn erase(disk: &str) -> OperationRequest {
        OperationRequest::Erase(EraseRequest::new(disk, false))
    }

    #[test]
    fn test_starts_idle() {
        let orchestrator = Orchestrator::new(ProcessRunner::new(Snippet("true")));
        assert!(orchestrator.is_idle());
        assert!(matches!(
            orchestrator.acknowledge(),
            Err(Error::NothingToAcknowledge)
        ));
    }

    #[test]
    fn test_invalid_request_never_starts() {
        let orchestrator = Orchestrator::new(ProcessRunner::new(Snippet("true")));
        let err = orchestrator.submit(erase("")).err().unwrap();
        assert!(matches!(err, Error::Validation(ValidationError::MissingDisk)));
        assert_eq!(orchestrator.state(), OperationState::Idle);
    }

    #[cfg(unix)]
    #[test]
    fn test_events_then_outcome() {
        let orchestrator = Orchestrator::new(ProcessRunner::new(Snippet("printf 'A\\nB\\nC\\n'")));
        let handle = orchestrator.submit(erase("sdb")).unwrap();
        assert_eq!(handle.disk(), "sdb");
        assert_eq!(handle.kind(), OperationKind::Erase);

        let events: Vec<OperationEvent> = handle.events().collect();
        assert_eq!(events.len(), 4);
        let lines: Vec<&str> = events[..3]
            .iter()
            .map(|e| match e {
                OperationEvent::Progress(p) => p.line.as_str(),
                OperationEvent::Finished(_) => panic!("finished early"),
            })
            .collect();
        assert_eq!(lines, vec!["A", "B", "C"]);

        let OperationEvent::Finished(outcome) = &events[3] else {
            panic!("last event is not the outcome");
        };
        assert!(outcome.success);
        assert_eq!(outcome.exit_code, Some(0));

        assert_eq!(orchestrator.state(), OperationState::Completed(outcome.clone()));
        assert_eq!(orchestrator.acknowledge().unwrap(), *outcome);
        assert!(orchestrator.is_idle());
    }

    #[cfg(unix)]
    #[test]
    fn test_wait_relays_progress() {
        let orchestrator =
            Orchestrator::new(ProcessRunner::new(Snippet("echo boom; exit 5")));
        let handle = orchestrator.submit(erase("sdb")).unwrap();

        let mut lines = Vec::new();
        let outcome = handle.wait(|event| lines.push(event.line.clone()));

        assert_eq!(lines, vec!["boom"]);
        assert!(!outcome.success);
        assert_eq!(outcome.exit_code, Some(5));
        assert_eq!(outcome.output, "boom\n");
    }

    #[cfg(unix)]
    #[test]
    fn test_second_submit_is_rejected_while_running() {
        let (orchestrator, gate) = gated();
        let handle = orchestrator.submit(erase("sdb")).unwrap();

        let err = orchestrator.submit(erase("sdc")).err().unwrap();
        assert!(matches!(err, Error::Busy));
        assert_eq!(
            orchestrator.state(),
            OperationState::Running {
                kind: OperationKind::Erase,
                disk: "sdb".to_string()
            }
        );
        assert!(matches!(orchestrator.acknowledge(), Err(Error::StillRunning)));

        gate.send(()).unwrap();
        let outcome = handle.wait(|_| {});
        assert!(outcome.success);
    }

    #[cfg(unix)]
    #[test]
    fn test_submit_requires_acknowledgement() {
        let orchestrator = Orchestrator::new(ProcessRunner::new(Snippet("true")));
        orchestrator.submit(erase("sdb")).unwrap().wait(|_| {});

        let err = orchestrator.submit(erase("sdb")).err().unwrap();
        assert!(matches!(err, Error::AwaitingAcknowledgement));

        orchestrator.acknowledge().unwrap();
        let outcome = orchestrator.submit(erase("sdb")).unwrap().wait(|_| {});
        assert!(outcome.success);
    }

    #[test]
    fn test_transport_failure_completes() {
        struct Missing;
        impl Launcher for Missing {
            fn command(&self, _artifact: &Path) -> Command {
                Command::new("/nonexistent/elevation-front-end")
            }
        }

        let orchestrator = Orchestrator::new(ProcessRunner::new(Missing));
        let outcome = orchestrator.submit(erase("sdb")).unwrap().wait(|_| {});
        assert!(!outcome.success);
        assert_eq!(outcome.exit_code, None);
        assert!(matches!(orchestrator.state(), OperationState::Completed(_)));
    }

    #[test]
    fn test_prepare_uses_options() {
        let options = ComposeOptions {
            min_free_kib: 4096,
            ..ComposeOptions::default()
        };
        let orchestrator =
            Orchestrator::new(ProcessRunner::new(Snippet("true"))).with_options(options);
        let program = orchestrator
            .prepare(&OperationRequest::Install(InstallRequest::new("sdb")))
            .unwrap();
        assert_eq!(program.device, "/dev/sdb");
        assert!(program.stages.iter().any(|s| s.script.contains("-gt 4096")));
        assert!(orchestrator.is_idle());
    }

    #[test]
    fn test_prepare_signs_with_absolute_key_paths() {
        let dir = tempfile::Builder::new()
            .prefix("usbforge-sign")
            .tempdir_in(".")
            .unwrap();
        let key = dir.path().join("db.key");
        let cert = dir.path().join("db.crt");
        std::fs::write(&key, "key").unwrap();
        std::fs::write(&cert, "cert").unwrap();

        let mut install = InstallRequest::new("sdb");
        install.efi_signing = true;
        install.signing.vendor_key = Some(key.clone());
        install.signing.vendor_cert = Some(cert.clone());

        let orchestrator = Orchestrator::new(ProcessRunner::new(Snippet("true")));
        let program = orchestrator
            .prepare(&OperationRequest::Install(install))
            .unwrap();
        let sign = program
            .stages
            .iter()
            .find(|s| s.script.contains("sbsign"))
            .unwrap();

        let abs_key = std::path::absolute(&key).unwrap();
        let abs_cert = std::path::absolute(&cert).unwrap();
        assert!(sign.script.contains(&format!("--key '{}'", abs_key.display())));
        assert!(sign.script.contains(&format!("--cert '{}'", abs_cert.display())));
    }

    #[test]
    fn test_poisoned_state_is_recovered() {
        let state = Arc::new(Mutex::new(OperationState::Idle));
        let poisoned = Arc::clone(&state);
        let _ = std::thread::spawn(move || {
            let _guard = poisoned.lock().unwrap();
            panic!("intentional poison");
        })
        .join();

        assert_eq!(*lock(&state), OperationState::Idle);
    }
}
