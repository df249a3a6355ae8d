use std::path::{Path, PathBuf};

use crate::{context::RunContext, process::Invocation};

use super::BuildError;

/// Everything the code generator is told about one configuration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CodegenRequest {
    pub input_path: PathBuf,
    pub dest_dir: PathBuf,
    pub project_name: String,
    pub activate_hard_quantization: bool,
    pub threshold_skipping: bool,
    pub cache_dma: bool,
    pub num_pe: u32,
    pub debug: bool,
}

/// The external tool turning a frozen graph into a C/C++ project on disk.
pub trait CodeGenerator {
    fn generate(&self, request: &CodegenRequest) -> Result<(), BuildError>;
}

/// Runs the generator script through the configured Python interpreter.
#[derive(Clone, Debug)]
pub struct ScriptCodeGenerator {
    python: String,
    script: PathBuf,
    working_dir: PathBuf,
    keep_outputs: bool,
}

impl ScriptCodeGenerator {
    pub fn new(python: impl Into<String>, script: impl Into<PathBuf>, working_dir: &Path) -> Self {
        Self {
            python: python.into(),
            script: script.into(),
            working_dir: working_dir.to_path_buf(),
            keep_outputs: true,
        }
    }

    pub fn from_context(ctx: &RunContext) -> Self {
        let mut generator = Self::new(
            ctx.python.clone(),
            ctx.in_dlk_root(&ctx.codegen_script),
            &ctx.dlk_root,
        );
        generator.keep_outputs = ctx.keep_outputs;
        generator
    }

    pub fn invocation(&self, request: &CodegenRequest) -> Invocation {
        let mut argv = vec![
            self.python.clone(),
            self.script.display().to_string(),
            "--input_path".to_string(),
            request.input_path.display().to_string(),
            "--output_path".to_string(),
            request.dest_dir.display().to_string(),
            "--project_name".to_string(),
            request.project_name.clone(),
            "--num_pe".to_string(),
            request.num_pe.to_string(),
        ];
        let flags = [
            (request.activate_hard_quantization, "--activate_hard_quantization"),
            (request.threshold_skipping, "--threshold_skipping"),
            (request.cache_dma, "--cache_dma"),
            (request.debug, "--debug"),
        ];
        argv.extend(
            flags
                .into_iter()
                .filter(|(enabled, _)| *enabled)
                .map(|(_, flag)| flag.to_string()),
        );

        Invocation::new(argv, &self.working_dir)
            .capture_as(&request.dest_dir, "codegen")
            .keep_outputs(self.keep_outputs)
    }
}

impl CodeGenerator for ScriptCodeGenerator {
    fn generate(&self, request: &CodegenRequest) -> Result<(), BuildError> {
        std::fs::create_dir_all(&request.dest_dir).map_err(|source| BuildError::Io {
            path: request.dest_dir.clone(),
            source,
        })?;
        self.invocation(request)
            .run()
            .map(|_| ())
            .map_err(BuildError::Codegen)
    }
}
