//! Process runner - executes a composed program under one elevation
//!
//! The program is rendered to a bash script, written to a private
//! temporary file and started through a [`Launcher`] exactly once.
//! Stdout and stderr share one pipe so lines arrive in the order the
//! child wrote them.

use crate::compose::{ComposedProgram, FailurePolicy, shell_quote};
use crate::event::ProgressEvent;
use serde::{Deserialize, Serialize};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tempfile::TempPath;

/// Builds the command that starts the rendered program.
///
/// This is the only place privilege elevation happens.
pub trait Launcher: Send + Sync {
    /// Command running `artifact` (a bash script)
    fn command(&self, artifact: &Path) -> Command;
}

/// Privilege-elevation front-ends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Elevation {
    /// Graphical polkit prompt
    #[default]
    Pkexec,
    Sudo,
    /// Run directly; the caller is already privileged
    None,
    /// `None` when running as root, otherwise `Pkexec`
    Auto,
}

impl Elevation {
    /// Resolve `Auto` against the current effective uid
    pub fn resolve(self) -> Self {
        match self {
            Self::Auto if is_root() => Self::None,
            Self::Auto => Self::Pkexec,
            other => other,
        }
    }

    /// Front-end binary, if any
    pub fn front_end(self) -> Option<&'static str> {
        match self.resolve() {
            Self::Pkexec => Some("pkexec"),
            Self::Sudo => Some("sudo"),
            Self::None | Self::Auto => None,
        }
    }
}

impl std::fmt::Display for Elevation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pkexec => write!(f, "pkexec"),
            Self::Sudo => write!(f, "sudo"),
            Self::None => write!(f, "none"),
            Self::Auto => write!(f, "auto"),
        }
    }
}

impl Launcher for Elevation {
    fn command(&self, artifact: &Path) -> Command {
        let mut cmd = match self.front_end() {
            Some(front_end) => {
                let mut cmd = Command::new(front_end);
                cmd.arg("bash");
                cmd
            }
            None => Command::new("bash"),
        };
        cmd.arg(artifact);
        cmd
    }
}

#[allow(unsafe_code)]
fn is_root() -> bool {
    // SAFETY: geteuid has no preconditions and cannot fail
    unsafe { libc::geteuid() == 0 }
}

/// Terminal result of one operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationOutcome {
    /// True only when the program exited with code 0
    pub success: bool,
    /// `None` if the process never started or was killed by a signal
    pub exit_code: Option<i32>,
    /// Every line the program produced, newline terminated
    pub output: String,
    /// Set when the elevated process could not be launched at all
    pub transport_error: Option<String>,
}

impl OperationOutcome {
    fn exited(exit_code: Option<i32>, output: String) -> Self {
        Self {
            success: exit_code == Some(0),
            exit_code,
            output,
            transport_error: None,
        }
    }

    pub(crate) fn transport_failure(error: impl std::fmt::Display, output: String) -> Self {
        Self {
            success: false,
            exit_code: None,
            output,
            transport_error: Some(error.to_string()),
        }
    }

    /// One-line description for logs and status displays
    pub fn summary(&self) -> String {
        match (&self.transport_error, self.exit_code) {
            (Some(err), _) => format!("could not launch: {err}"),
            (None, Some(0)) => "completed successfully".to_string(),
            (None, Some(code)) => format!("failed with exit code {code}"),
            (None, None) => "terminated by a signal".to_string(),
        }
    }
}

/// Render a program to the script the runner executes.
///
/// Each stage body runs in its own subshell. Abort stages exit the script
/// with the stage's code; warn-and-continue stages print a warning.
pub fn render(program: &ComposedProgram) -> String {
    let title = program.kind.title();
    let total = program.stages.len();

    let mut script = String::from("#!/bin/bash\n");
    script.push_str(&format!("echo {}\n", shell_quote(&format!("=== {title} ==="))));
    script.push_str(&format!(
        "echo {}\n",
        shell_quote(&format!("Target device: {}", program.device))
    ));
    script.push_str("echo\n");

    for (i, stage) in program.stages.iter().enumerate() {
        script.push_str(&format!(
            "\n# stage: {:?}\necho {}\n(\n{}\n)\nrc=$?\n",
            stage.kind,
            shell_quote(&format!("Step {}/{total}: {}", i + 1, stage.label)),
            stage.script.trim_end()
        ));
        match stage.policy {
            FailurePolicy::Abort => script.push_str(&format!(
                "if [ \"$rc\" -ne 0 ]; then\n    echo {}\"$rc\"\n    exit \"$rc\"\nfi\n",
                shell_quote(&format!("ERROR: {} failed with exit code ", stage.label))
            )),
            FailurePolicy::WarnAndContinue => script.push_str(&format!(
                "if [ \"$rc\" -ne 0 ]; then\n    echo {}\"$rc\"{}\nfi\n",
                shell_quote(&format!("Warning: {} did not complete (exit code ", stage.label)),
                shell_quote("), continuing")
            )),
        }
    }

    script.push_str(&format!(
        "\necho\necho {}\nexit 0\n",
        shell_quote(&format!("=== {title} completed successfully ==="))
    ));
    script
}

/// Runs composed programs through a launcher
pub struct ProcessRunner {
    launcher: Box<dyn Launcher>,
    scratch_dir: Option<PathBuf>,
}

impl ProcessRunner {
    pub fn new(launcher: impl Launcher + 'static) -> Self {
        Self {
            launcher: Box::new(launcher),
            scratch_dir: None,
        }
    }

    /// Write program artifacts under `dir` instead of the system temp dir
    pub fn with_scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scratch_dir = Some(dir.into());
        self
    }

    /// Run a program to completion, handing every output line to
    /// `on_event` in order. Blocks for the lifetime of the child.
    pub fn run(
        &self,
        program: &ComposedProgram,
        mut on_event: impl FnMut(ProgressEvent),
    ) -> OperationOutcome {
        let script = render(program);

        let artifact = match self.write_artifact(&script) {
            Ok(path) => path,
            Err(e) => {
                log::warn!("Could not write program artifact: {e}");
                return OperationOutcome::transport_failure(
                    format!("could not write program: {e}"),
                    String::new(),
                );
            }
        };
        log::debug!("Program artifact: {}", artifact.display());

        let mut output = String::new();
        let outcome = match self.execute(&artifact, &mut output, &mut on_event) {
            Ok(code) => OperationOutcome::exited(code, output),
            Err(e) => {
                log::warn!("Could not launch program: {e}");
                OperationOutcome::transport_failure(e, output)
            }
        };

        if let Err(e) = artifact.close() {
            log::debug!("Could not remove program artifact: {e}");
        }

        log::debug!("Program finished: {}", outcome.summary());
        outcome
    }

    fn write_artifact(&self, script: &str) -> io::Result<TempPath> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("usbforge_").suffix(".sh");
        let mut file = match &self.scratch_dir {
            Some(dir) => builder.tempfile_in(dir)?,
            None => builder.tempfile()?,
        };

        file.write_all(script.as_bytes())?;
        file.flush()?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            file.as_file()
                .set_permissions(std::fs::Permissions::from_mode(0o700))?;
        }

        // Close our handle; the path stays until dropped
        Ok(file.into_temp_path())
    }

    fn execute(
        &self,
        artifact: &Path,
        output: &mut String,
        on_event: &mut impl FnMut(ProgressEvent),
    ) -> io::Result<Option<i32>> {
        let (reader, writer) = io::pipe()?;

        let mut cmd = self.launcher.command(artifact);
        cmd.stdin(Stdio::null())
            .stdout(writer.try_clone()?)
            .stderr(writer);
        log::debug!("Launching {cmd:?}");

        let mut child = cmd.spawn()?;
        // Drop our copies of the write end so the reader sees EOF
        drop(cmd);

        let mut seq = 0u64;
        let mut emit = |line: String| {
            output.push_str(&line);
            output.push('\n');
            on_event(ProgressEvent::new(seq, line));
            seq += 1;
        };

        let mut reader = BufReader::new(reader);
        let mut splitter = LineSplitter::default();
        loop {
            let chunk = match reader.fill_buf() {
                Ok([]) => break,
                Ok(chunk) => chunk,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    log::warn!("Error reading program output: {e}");
                    break;
                }
            };
            let len = chunk.len();
            for line in splitter.push(chunk) {
                emit(line);
            }
            reader.consume(len);
        }
        if let Some(line) = splitter.finish() {
            emit(line);
        }

        let status = child.wait()?;
        Ok(status.code())
    }
}

/// Cuts program output into display lines as bytes arrive.
///
/// Both `\n` and `\r` end a line, so progress meters that only rewrite
/// the current line still produce one line per update. Empty pieces
/// left by a carriage return (including the `\r\n` pair) are skipped;
/// a bare blank line is kept.
#[derive(Debug, Default)]
struct LineSplitter {
    pending: Vec<u8>,
    after_cr: bool,
}

impl LineSplitter {
    fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        let mut lines = Vec::new();
        for &byte in chunk {
            match byte {
                b'\r' => {
                    if !self.pending.is_empty() {
                        lines.push(self.take());
                    }
                    self.after_cr = true;
                }
                b'\n' => {
                    if !(self.after_cr && self.pending.is_empty()) {
                        lines.push(self.take());
                    }
                    self.after_cr = false;
                }
                _ => {
                    self.pending.push(byte);
                    self.after_cr = false;
                }
            }
        }
        lines
    }

    /// Unterminated tail left at end of output
    fn finish(mut self) -> Option<String> {
        (!self.pending.is_empty()).then(|| self.take())
    }

    fn take(&mut self) -> String {
        let line = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        line
    }
}
