//! Numeric validation of a built library against its golden output.
//!
//! There are three ways to obtain a [ToleranceVerdict], selected per configuration by [Validator::select]:
//! load the library in-process ([LocalValidator]), hand everything to the toolchain's inference script
//! ([ScriptValidator]), or ship the files to the target board ([crate::remote::RemoteValidator]).
//! All three report the same quantity: the percentage of golden elements not reproduced within tolerance.

use std::path::{Path, PathBuf};

use enum_dispatch::enum_dispatch;
use ndarray::{ArrayD, Axis};
use thiserror::Error;

use crate::{
    build::BuildArtifact,
    configuration::TestConfiguration,
    context::RunContext,
    process::ToolError,
    remote::{RemoteError, RemoteValidator},
};

pub mod nnlib;
pub mod npy;

mod script;
pub use script::{parse_script_output, ScriptValidator};

mod tolerance;
pub use tolerance::*;

use nnlib::{InferenceLibrary, NnLib};
use npy::NpyError;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error(transparent)]
    Npy(#[from] NpyError),

    #[error("Could not load {path:?}: {source}")]
    LibraryLoad {
        path: PathBuf,
        source: libloading::Error,
    },

    #[error("{path:?} does not export {name}: {source}")]
    MissingSymbol {
        path: PathBuf,
        name: &'static str,
        source: libloading::Error,
    },

    #[error("network_create returned null in {0:?}")]
    NetworkCreate(PathBuf),

    #[error("Network in {0:?} is not initialized")]
    NetworkInit(PathBuf),

    #[error("Tensor buffer is not contiguous")]
    NonContiguous,

    #[error("Produced tensor has {produced} elements, golden tensor has {golden}")]
    ElementCountMismatch { produced: usize, golden: usize },

    #[error("Inference script printed {0:?} instead of a percentage")]
    ScriptOutput(String),

    #[error(transparent)]
    Tool(#[from] ToolError),

    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error("Test failed: {verdict} of the values does not match")]
    ToleranceExceeded {
        verdict: ToleranceVerdict,
        threshold: f64,
    },
}

#[enum_dispatch(Validator)]
pub trait Validate {
    fn validate(&self, artifact: &BuildArtifact) -> Result<ToleranceVerdict, ValidationError>;
}

#[enum_dispatch]
#[derive(Clone, Debug)]
pub enum Validator {
    Local(LocalValidator),
    Script(ScriptValidator),
    Remote(RemoteValidator),
}

impl Validator {
    /// The inference script wins when requested; otherwise only x86_64 libraries run in-process.
    pub fn select(ctx: &RunContext, config: &TestConfiguration) -> Self {
        if config.use_run_test_script {
            ScriptValidator::new(ctx, config.from_npy).into()
        } else if config.cpu_name.runs_locally() {
            LocalValidator::default().into()
        } else {
            RemoteValidator::new(ctx).into()
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Validator::Local(_) => "local",
            Validator::Script(_) => "script",
            Validator::Remote(_) => "remote",
        }
    }
}

/// Turns a verdict into a pass or a [ValidationError::ToleranceExceeded].
pub fn judge(verdict: ToleranceVerdict, threshold: f64) -> Result<ToleranceVerdict, ValidationError> {
    if verdict.passes(threshold) {
        Ok(verdict)
    } else {
        Err(ValidationError::ToleranceExceeded { verdict, threshold })
    }
}

/// Runs `library` on `input` with a leading batch axis of 1 and compares against `golden`.
pub fn compare_with<L: InferenceLibrary>(
    library: &mut L,
    input: ArrayD<f32>,
    golden: &ArrayD<f32>,
    tolerance: &Tolerance,
) -> Result<ToleranceVerdict, ValidationError> {
    library.init()?;
    let batched = input.insert_axis(Axis(0));
    let output = library.run(&batched)?;

    let output = output.as_standard_layout();
    let golden = golden.as_standard_layout();
    match (output.as_slice(), golden.as_slice()) {
        (Some(output), Some(golden)) => percent_mismatched(output, golden, tolerance),
        _ => Err(ValidationError::NonContiguous),
    }
}

/// Loads the generated library into this process.
#[derive(Clone, Debug, Default)]
pub struct LocalValidator {
    pub tolerance: Tolerance,
}

impl LocalValidator {
    pub fn run_library(
        &self,
        library: &Path,
        input: &Path,
        golden: &Path,
    ) -> Result<ToleranceVerdict, ValidationError> {
        let input = npy::read(input)?;
        let golden = npy::read(golden)?;
        let mut nn = NnLib::load(library)?;
        compare_with(&mut nn, input, &golden, &self.tolerance)
    }
}

impl Validate for LocalValidator {
    fn validate(&self, artifact: &BuildArtifact) -> Result<ToleranceVerdict, ValidationError> {
        let paths = &artifact.paths;
        self.run_library(&paths.library, &paths.input_tensor, &paths.golden_tensor)
    }
}
