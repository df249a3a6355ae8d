//! Runs external tools with captured output and marker checks.
//!
//! Every external step (archive extraction, cmake, make, ssh/scp, helper scripts) goes through
//! [Invocation::run]. The process is spawned synchronously with stdout and stderr redirected into
//! files, then judged on its exit status and on substrings of the captured text.

use std::{
    fmt,
    fs::File,
    path::{Path, PathBuf},
    process::{Command, Stdio},
};

use thiserror::Error;

use crate::logging::{events::ToolInvocation, record_with};

/// Output captured from a finished process.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CapturedOutput {
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

/// The first check a finished process did not satisfy.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum CheckFailure {
    #[error("exited with status {}", describe_status(.0))]
    NonZeroExit(Option<i32>),

    #[error("stdout does not contain {0:?}")]
    MissingStdout(String),

    #[error("stdout contains {0:?}")]
    ForbiddenStdout(String),

    #[error("stderr contains {0:?}")]
    ForbiddenStderr(String),
}

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Empty command line")]
    EmptyCommand,

    #[error("Could not spawn `{command}`: {source}")]
    Spawn {
        command: String,
        source: std::io::Error,
    },

    #[error("Could not use capture file {path:?}: {source}")]
    Sink {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("`{command}` failed: {reason}")]
    Check {
        command: String,
        reason: CheckFailure,
        output: CapturedOutput,
    },
}

fn describe_status(code: &Option<i32>) -> String {
    match code {
        Some(code) => code.to_string(),
        None => "<signal>".to_string(),
    }
}

impl ToolError {
    /// Captured output, when the process got far enough to produce any.
    pub fn output(&self) -> Option<&CapturedOutput> {
        match self {
            ToolError::Check { output, .. } => Some(output),
            _ => None,
        }
    }
}

/// One external command plus the checks that decide whether it passed.
#[derive(Clone, Debug)]
pub struct Invocation {
    argv: Vec<String>,
    working_dir: PathBuf,
    stdout_path: PathBuf,
    stderr_path: PathBuf,
    stdout_include: Vec<String>,
    stdout_block: Vec<String>,
    stderr_block: Vec<String>,
    keep_outputs: bool,
}

impl Invocation {
    pub fn new<I, S>(argv: I, working_dir: impl Into<PathBuf>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let working_dir = working_dir.into();
        Self {
            argv: argv.into_iter().map(Into::into).collect(),
            stdout_path: working_dir.join("stdout.log"),
            stderr_path: working_dir.join("stderr.log"),
            working_dir,
            stdout_include: vec![],
            stdout_block: vec![],
            stderr_block: vec![],
            keep_outputs: true,
        }
    }

    /// Captures into `{dir}/{step}.out` and `{dir}/{step}.err`.
    pub fn capture_as(mut self, dir: &Path, step: &str) -> Self {
        self.stdout_path = dir.join(format!("{step}.out"));
        self.stderr_path = dir.join(format!("{step}.err"));
        self
    }

    pub fn sinks(mut self, stdout: impl Into<PathBuf>, stderr: impl Into<PathBuf>) -> Self {
        self.stdout_path = stdout.into();
        self.stderr_path = stderr.into();
        self
    }

    pub fn require_stdout(mut self, marker: impl Into<String>) -> Self {
        self.stdout_include.push(marker.into());
        self
    }

    pub fn block_stdout(mut self, marker: impl Into<String>) -> Self {
        self.stdout_block.push(marker.into());
        self
    }

    pub fn block_stderr(mut self, marker: impl Into<String>) -> Self {
        self.stderr_block.push(marker.into());
        self
    }

    /// When false, capture files of a passing run are deleted afterwards.
    pub fn keep_outputs(mut self, keep: bool) -> Self {
        self.keep_outputs = keep;
        self
    }

    pub fn argv(&self) -> &[String] {
        &self.argv
    }

    pub fn stdout_path(&self) -> &Path {
        &self.stdout_path
    }

    pub fn stderr_path(&self) -> &Path {
        &self.stderr_path
    }

    pub fn command_line(&self) -> String {
        self.argv.join(" ")
    }

    /// Blocks until the process exits, then applies the checks.
    /// The exit status is checked on its own: markers cannot rescue a failing process.
    pub fn run(&self) -> Result<CapturedOutput, ToolError> {
        let (program, args) = self.argv.split_first().ok_or(ToolError::EmptyCommand)?;

        let stdout_file = create_sink(&self.stdout_path)?;
        let stderr_file = create_sink(&self.stderr_path)?;

        let status = Command::new(program)
            .args(args)
            .current_dir(&self.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout_file))
            .stderr(Stdio::from(stderr_file))
            .status()
            .map_err(|source| ToolError::Spawn {
                command: self.command_line(),
                source,
            })?;

        let output = CapturedOutput {
            exit_code: status.code(),
            stdout: read_sink(&self.stdout_path)?,
            stderr: read_sink(&self.stderr_path)?,
        };

        let verdict = if status.success() {
            self.check(&output)
        } else {
            Err(CheckFailure::NonZeroExit(status.code()))
        };

        record_with(|| ToolInvocation {
            argv: self.argv.clone(),
            working_dir: self.working_dir.display().to_string(),
            exit_code: output.exit_code,
            passed: verdict.is_ok(),
        });

        match verdict {
            Ok(()) => {
                if !self.keep_outputs {
                    remove_sink(&self.stdout_path);
                    remove_sink(&self.stderr_path);
                }
                Ok(output)
            }
            Err(reason) => {
                println!("{}", output.stdout);
                eprintln!("{}", output.stderr);
                Err(ToolError::Check {
                    command: self.command_line(),
                    reason,
                    output,
                })
            }
        }
    }

    fn check(&self, output: &CapturedOutput) -> Result<(), CheckFailure> {
        if let Some(missing) = self
            .stdout_include
            .iter()
            .find(|marker| !output.stdout.contains(marker.as_str()))
        {
            return Err(CheckFailure::MissingStdout(missing.clone()));
        }
        if let Some(blocked) = self
            .stdout_block
            .iter()
            .find(|marker| output.stdout.contains(marker.as_str()))
        {
            return Err(CheckFailure::ForbiddenStdout(blocked.clone()));
        }
        if let Some(blocked) = self
            .stderr_block
            .iter()
            .find(|marker| output.stderr.contains(marker.as_str()))
        {
            return Err(CheckFailure::ForbiddenStderr(blocked.clone()));
        }
        Ok(())
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (in {})", self.command_line(), self.working_dir.display())
    }
}

fn create_sink(path: &Path) -> Result<File, ToolError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|source| ToolError::Sink {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    File::create(path).map_err(|source| ToolError::Sink {
        path: path.to_path_buf(),
        source,
    })
}

fn read_sink(path: &Path) -> Result<String, ToolError> {
    std::fs::read(path)
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
        .map_err(|source| ToolError::Sink {
            path: path.to_path_buf(),
            source,
        })
}

fn remove_sink(path: &Path) {
    if let Err(err) = std::fs::remove_file(path) {
        if err.kind() != std::io::ErrorKind::NotFound {
            eprintln!("Could not remove {}: {err}", path.display());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh(script: &str, dir: &Path) -> Invocation {
        Invocation::new(["sh", "-c", script], dir).capture_as(dir, "step")
    }

    #[test]
    fn passing_run_captures_both_streams() {
        let dir = tempfile::tempdir().unwrap();
        let output = sh("echo Building lib; echo warning >&2", dir.path())
            .require_stdout("Building")
            .block_stderr("error: ")
            .run()
            .unwrap();
        assert_eq!(output.exit_code, Some(0));
        assert!(output.stdout.contains("Building lib"));
        assert!(output.stderr.contains("warning"));
        assert!(dir.path().join("step.out").exists());
    }

    #[test]
    fn non_zero_exit_fails_even_with_required_markers() {
        let dir = tempfile::tempdir().unwrap();
        let err = sh("echo 'Generating done'; exit 3", dir.path())
            .require_stdout("Generating done")
            .run()
            .unwrap_err();
        match err {
            ToolError::Check { reason, output, .. } => {
                assert_eq!(reason, CheckFailure::NonZeroExit(Some(3)));
                assert!(output.stdout.contains("Generating done"));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn marker_checks() {
        let dir = tempfile::tempdir().unwrap();
        let missing = sh("echo nothing", dir.path())
            .require_stdout("Generating done")
            .run()
            .unwrap_err();
        assert!(matches!(
            missing,
            ToolError::Check { reason: CheckFailure::MissingStdout(_), .. }
        ));

        let blocked = sh("echo 'CMake Error at x'", dir.path())
            .block_stdout("CMake Error")
            .run()
            .unwrap_err();
        assert!(matches!(
            blocked,
            ToolError::Check { reason: CheckFailure::ForbiddenStdout(_), .. }
        ));

        let stderr_blocked = sh("echo Building; echo 'x.c:1: error: boom' >&2", dir.path())
            .require_stdout("Building")
            .block_stderr("error: ")
            .run()
            .unwrap_err();
        assert!(matches!(
            stderr_blocked,
            ToolError::Check { reason: CheckFailure::ForbiddenStderr(_), .. }
        ));
    }

    #[test]
    fn outputs_are_removed_unless_kept() {
        let dir = tempfile::tempdir().unwrap();
        sh("echo hi", dir.path()).keep_outputs(false).run().unwrap();
        assert!(!dir.path().join("step.out").exists());
        assert!(!dir.path().join("step.err").exists());
    }

    #[test]
    fn missing_program_is_a_spawn_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = Invocation::new(["/definitely/not/a/program"], dir.path())
            .capture_as(dir.path(), "x")
            .run()
            .unwrap_err();
        assert!(matches!(err, ToolError::Spawn { .. }));
        assert!(matches!(
            Invocation::new(Vec::<String>::new(), dir.path()).run(),
            Err(ToolError::EmptyCommand)
        ));
    }
}
