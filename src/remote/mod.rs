//! Validation on the target board over ssh.
//!
//! The board's work directory is one shared resource. It is wiped at the start of every remote
//! validation, which is only safe because cases run one after another.

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::{
    build::BuildArtifact,
    config::RemoteSection,
    context::RunContext,
    logging::{events::RemoteParseFallback, record},
    process::{Invocation, ToolError},
    validation::{ToleranceVerdict, Validate, ValidationError},
};

/// Shipped next to the library on every run; prints the mismatch percentage.
pub const REMOTE_SCRIPT_NAME: &str = "remote_compare.py";
pub const REMOTE_SCRIPT: &str = include_str!("../../scripts/remote_compare.py");

pub const DEFAULT_USER: &str = "root";
pub const DEFAULT_WORK_DIR: &str = "~/automated_testing";

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("No remote host configured for a target that cannot run locally")]
    NoHost,

    #[error("Remote {step} failed: {source}")]
    Tool {
        step: &'static str,
        #[source]
        source: ToolError,
    },

    #[error("Could not write {path:?}: {source}")]
    ScriptWrite {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Remote output {0:?} is not a number")]
    Unparsable(String),
}

/// Where and how to reach the board.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RemoteTarget {
    pub host: Option<String>,
    pub user: String,
    pub work_dir: String,
    pub python: String,
    pub ssh: String,
    pub scp: String,
}

impl Default for RemoteTarget {
    fn default() -> Self {
        Self {
            host: None,
            user: DEFAULT_USER.to_string(),
            work_dir: DEFAULT_WORK_DIR.to_string(),
            python: "python".to_string(),
            ssh: "ssh".to_string(),
            scp: "scp".to_string(),
        }
    }
}

impl RemoteTarget {
    pub fn from_section(section: &RemoteSection) -> Self {
        let defaults = Self::default();
        Self {
            host: section.host.clone(),
            user: section.user.clone().unwrap_or(defaults.user),
            work_dir: section.work_dir.clone().unwrap_or(defaults.work_dir),
            python: section.python.clone().unwrap_or(defaults.python),
            ssh: section.ssh.clone().unwrap_or(defaults.ssh),
            scp: section.scp.clone().unwrap_or(defaults.scp),
        }
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    /// `user@host`
    pub fn login(&self) -> Result<String, RemoteError> {
        self.host
            .as_deref()
            .map(|host| format!("{}@{host}", self.user))
            .ok_or(RemoteError::NoHost)
    }
}

fn tool_step(step: &'static str) -> impl FnOnce(ToolError) -> RemoteError {
    move |source| RemoteError::Tool { step, source }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Reads the remote script's stdout as a percentage.
pub fn try_parse_remote_output(raw: &str) -> Result<ToleranceVerdict, RemoteError> {
    raw.trim()
        .parse::<f64>()
        .map(ToleranceVerdict::from_percent)
        .map_err(|_| RemoteError::Unparsable(raw.to_string()))
}

/// Like [try_parse_remote_output], but unparsable output counts as every value mismatched.
/// The substitution is reported on stderr and recorded as its own event.
pub fn parse_remote_output(host: &str, raw: &str) -> ToleranceVerdict {
    match try_parse_remote_output(raw) {
        Ok(verdict) => verdict,
        Err(err) => {
            eprintln!("{err}; counting every value on {host} as mismatched");
            record(&RemoteParseFallback {
                host: host.to_string(),
                raw_output: raw.to_string(),
                substituted: ToleranceVerdict::WORST.percent_failed(),
            });
            ToleranceVerdict::WORST
        }
    }
}

#[derive(Clone, Debug)]
pub struct RemoteValidator {
    target: RemoteTarget,
    nnlib_source: PathBuf,
    keep_outputs: bool,
}

impl RemoteValidator {
    pub fn new(ctx: &RunContext) -> Self {
        Self {
            target: ctx.remote.clone(),
            nnlib_source: ctx.in_dlk_root(&ctx.nnlib_source),
            keep_outputs: ctx.keep_outputs,
        }
    }

    pub fn target(&self) -> &RemoteTarget {
        &self.target
    }

    pub fn clean_invocation(&self, out_dir: &Path) -> Result<Invocation, RemoteError> {
        Ok(Invocation::new(
            [
                self.target.ssh.clone(),
                self.target.login()?,
                format!("rm -rf {}/*", self.target.work_dir),
            ],
            out_dir,
        )
        .capture_as(out_dir, "clean")
        .keep_outputs(self.keep_outputs))
    }

    pub fn copy_invocation(&self, out_dir: &Path, files: &[&Path]) -> Result<Invocation, RemoteError> {
        let mut argv = vec![self.target.scp.clone()];
        argv.extend(files.iter().map(|file| file.display().to_string()));
        argv.push(format!("{}:{}/", self.target.login()?, self.target.work_dir));
        Ok(Invocation::new(argv, out_dir)
            .capture_as(out_dir, "scp")
            .keep_outputs(self.keep_outputs))
    }

    /// The remote command names every file by basename, relative to the work directory.
    pub fn run_invocation(
        &self,
        out_dir: &Path,
        library: &Path,
        input: &Path,
        golden: &Path,
    ) -> Result<Invocation, RemoteError> {
        let command = format!(
            "cd {}/; {} {REMOTE_SCRIPT_NAME} ./{} ./{} ./{}",
            self.target.work_dir,
            self.target.python,
            file_name(library),
            file_name(input),
            file_name(golden),
        );
        Ok(Invocation::new([self.target.ssh.clone(), self.target.login()?, command], out_dir)
            .capture_as(out_dir, "remote")
            .keep_outputs(true))
    }

    pub fn validate_remote(
        &self,
        out_dir: &Path,
        library: &Path,
        input: &Path,
        golden: &Path,
    ) -> Result<ToleranceVerdict, RemoteError> {
        self.clean_invocation(out_dir)?.run().map_err(tool_step("clean"))?;

        let script = out_dir.join(REMOTE_SCRIPT_NAME);
        std::fs::write(&script, REMOTE_SCRIPT).map_err(|source| RemoteError::ScriptWrite {
            path: script.clone(),
            source,
        })?;

        let files = [
            library,
            input,
            golden,
            self.nnlib_source.as_path(),
            script.as_path(),
        ];
        self.copy_invocation(out_dir, &files)?
            .run()
            .map_err(tool_step("copy"))?;

        let output = self
            .run_invocation(out_dir, library, input, golden)?
            .run()
            .map_err(tool_step("execution"))?;

        let host = self.target.host.as_deref().unwrap_or_default();
        Ok(parse_remote_output(host, &output.stdout))
    }
}

impl Validate for RemoteValidator {
    fn validate(&self, artifact: &BuildArtifact) -> Result<ToleranceVerdict, ValidationError> {
        let paths = &artifact.paths;
        Ok(self.validate_remote(
            &paths.artifact_dir,
            &paths.library,
            &paths.input_tensor,
            &paths.golden_tensor,
        )?)
    }
}
