use std::path::{Path, PathBuf};

use crate::{build::BuildArtifact, context::RunContext, process::Invocation};

use super::{ToleranceVerdict, ValidationError, Validate};

/// Delegates the whole comparison to the toolchain's inference script.
/// The script prints the mismatch percentage as the last line of its stdout.
#[derive(Clone, Debug)]
pub struct ScriptValidator {
    python: String,
    script: PathBuf,
    working_dir: PathBuf,
    from_npy: bool,
    keep_outputs: bool,
}

impl ScriptValidator {
    pub fn new(ctx: &RunContext, from_npy: bool) -> Self {
        Self {
            python: ctx.python.clone(),
            script: ctx.in_dlk_root(&ctx.run_test_script),
            working_dir: ctx.dlk_root.clone(),
            from_npy,
            keep_outputs: ctx.keep_outputs,
        }
    }

    pub fn invocation(&self, library: &Path, input: &Path, golden: &Path, capture_dir: &Path) -> Invocation {
        let mut argv = vec![
            self.python.clone(),
            self.script.display().to_string(),
            "-i".to_string(),
            input.display().to_string(),
            "-l".to_string(),
            library.display().to_string(),
            "-e".to_string(),
            golden.display().to_string(),
        ];
        if self.from_npy {
            argv.push("--from_npy".to_string());
        }
        Invocation::new(argv, &self.working_dir)
            .capture_as(capture_dir, "run_test")
            .keep_outputs(self.keep_outputs)
    }
}

/// The last non-empty line of `stdout`, read as a percentage.
pub fn parse_script_output(stdout: &str) -> Result<ToleranceVerdict, ValidationError> {
    let last = stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .last()
        .unwrap_or_default();
    last.parse::<f64>()
        .map(ToleranceVerdict::from_percent)
        .map_err(|_| ValidationError::ScriptOutput(last.to_string()))
}

impl Validate for ScriptValidator {
    fn validate(&self, artifact: &BuildArtifact) -> Result<ToleranceVerdict, ValidationError> {
        let paths = &artifact.paths;
        let output = self
            .invocation(&paths.library, &paths.input_tensor, &paths.golden_tensor, &paths.artifact_dir)
            .run()?;
        parse_script_output(&output.stdout)
    }
}
