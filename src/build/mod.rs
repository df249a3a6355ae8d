//! Turns one configuration into a compiled inference library.
//!
//! The steps are typestates: [BuildPlan] -> [Generated] -> [Extracted] -> [Configured] -> [BuildArtifact].
//! A failing step consumes its state and returns a [BuildError], so later steps cannot run.
//! The artifact directory is left as-is for inspection. Nothing is retried or rolled back.

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::{
    configuration::TestConfiguration,
    context::RunContext,
    logging::{events::BuildStageEvent, record},
    process::{Invocation, ToolError},
};

mod codegen;
pub use codegen::*;

mod paths;
pub use paths::*;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ArtifactKind {
    ProjectDirectory,
    SharedLibrary,
}

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("Code generation failed: {0}")]
    Codegen(#[source] ToolError),

    #[error("{step} failed: {source}")]
    Tool {
        step: &'static str,
        #[source]
        source: ToolError,
    },

    #[error("Expected {kind:?} at {path:?} does not exist")]
    ArtifactMissing { kind: ArtifactKind, path: PathBuf },

    #[error("I/O error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

fn tool_step(step: &'static str) -> impl FnOnce(ToolError) -> BuildError {
    move |source| BuildError::Tool { step, source }
}

/// Resolved paths for one configuration, before anything has run.
pub struct BuildPlan<'a> {
    ctx: &'a RunContext,
    test_id: usize,
    config: &'a TestConfiguration,
    paths: ArtifactPaths,
}

pub struct Generated<'a> {
    plan: BuildPlan<'a>,
}

pub struct Extracted<'a> {
    plan: BuildPlan<'a>,
}

pub struct Configured<'a> {
    plan: BuildPlan<'a>,
}

/// A successfully built configuration: the library exists and the golden data is extracted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BuildArtifact {
    pub test_id: usize,
    pub paths: ArtifactPaths,
}

impl BuildArtifact {
    pub fn library(&self) -> &Path {
        &self.paths.library
    }
}

impl<'a> BuildPlan<'a> {
    pub fn new(
        ctx: &'a RunContext,
        suite_dir: &Path,
        test_id: usize,
        config: &'a TestConfiguration,
    ) -> Self {
        Self {
            ctx,
            test_id,
            config,
            paths: ArtifactPaths::resolve(ctx, suite_dir, test_id, config),
        }
    }

    pub fn paths(&self) -> &ArtifactPaths {
        &self.paths
    }

    fn stage_done(&self, stage: &'static str) {
        record(&BuildStageEvent::new(self.test_id, stage, &self.paths.artifact_dir));
    }

    pub fn codegen_request(&self) -> CodegenRequest {
        CodegenRequest {
            input_path: self.paths.input_graph.clone(),
            dest_dir: self.paths.artifact_dir.clone(),
            project_name: self.ctx.project_name.clone(),
            activate_hard_quantization: self.config.hard_quantize,
            threshold_skipping: self.config.threshold_skipping,
            cache_dma: self.config.cache_dma,
            num_pe: self.ctx.num_pe,
            debug: false,
        }
    }

    pub fn generate(self, generator: &dyn CodeGenerator) -> Result<Generated<'a>, BuildError> {
        generator.generate(&self.codegen_request())?;
        self.stage_done("generated");
        Ok(Generated { plan: self })
    }
}

impl<'a> Generated<'a> {
    pub fn extraction(&self) -> Invocation {
        let plan = &self.plan;
        let paths = &plan.paths;
        Invocation::new(
            [
                plan.ctx.tar.clone(),
                "xvzf".to_string(),
                paths.golden_archive.display().to_string(),
                "-C".to_string(),
                paths.artifact_dir.display().to_string(),
            ],
            &paths.model_dir,
        )
        .capture_as(&paths.artifact_dir, "tar_xvzf")
        .require_stdout(ArtifactPaths::golden_marker(plan.config))
        .keep_outputs(plan.ctx.keep_outputs)
    }

    /// Unpacks the golden data, then checks the generator actually produced the project directory.
    pub fn extract_golden(self) -> Result<Extracted<'a>, BuildError> {
        self.extraction().run().map_err(tool_step("golden data extraction"))?;

        let project_dir = &self.plan.paths.project_dir;
        if !project_dir.is_dir() {
            return Err(BuildError::ArtifactMissing {
                kind: ArtifactKind::ProjectDirectory,
                path: project_dir.clone(),
            });
        }
        self.plan.stage_done("extracted");
        Ok(Extracted { plan: self.plan })
    }
}

impl<'a> Extracted<'a> {
    pub fn cmake_invocation(&self) -> Invocation {
        let plan = &self.plan;
        let mut argv = vec![plan.ctx.cmake.clone()];
        argv.extend(
            plan.config
                .cpu_name
                .cmake_definitions(plan.config.use_avx)
                .into_iter()
                .map(str::to_string),
        );
        argv.push(".".to_string());

        Invocation::new(argv, &plan.paths.project_dir)
            .capture_as(&plan.paths.artifact_dir, "cmake")
            .require_stdout("Generating done")
            .block_stdout("CMake Error")
            .keep_outputs(plan.ctx.keep_outputs)
    }

    pub fn configure(self) -> Result<Configured<'a>, BuildError> {
        self.cmake_invocation().run().map_err(tool_step("cmake"))?;
        self.plan.stage_done("configured");
        Ok(Configured { plan: self.plan })
    }
}

impl Configured<'_> {
    pub fn make_invocation(&self) -> Invocation {
        let plan = &self.plan;
        Invocation::new(
            [
                plan.ctx.make.clone(),
                "VERBOSE=1".to_string(),
                "lib".to_string(),
                format!("-j{}", plan.ctx.make_jobs),
            ],
            &plan.paths.project_dir,
        )
        .capture_as(&plan.paths.artifact_dir, "make")
        .require_stdout("Building")
        .block_stderr("error: ")
        .keep_outputs(plan.ctx.keep_outputs)
    }

    pub fn compile(self) -> Result<BuildArtifact, BuildError> {
        self.make_invocation().run().map_err(tool_step("make"))?;

        let library = &self.plan.paths.library;
        if !library.is_file() {
            return Err(BuildError::ArtifactMissing {
                kind: ArtifactKind::SharedLibrary,
                path: library.clone(),
            });
        }
        self.plan.stage_done("built");
        Ok(BuildArtifact {
            test_id: self.plan.test_id,
            paths: self.plan.paths,
        })
    }
}

/// Runs every build step for one configuration.
pub struct BuildDriver<'a> {
    ctx: &'a RunContext,
    generator: &'a dyn CodeGenerator,
}

impl<'a> BuildDriver<'a> {
    pub fn new(ctx: &'a RunContext, generator: &'a dyn CodeGenerator) -> Self {
        Self { ctx, generator }
    }

    pub fn build(
        &self,
        suite_dir: &Path,
        test_id: usize,
        config: &TestConfiguration,
    ) -> Result<BuildArtifact, BuildError> {
        BuildPlan::new(self.ctx, suite_dir, test_id, config)
            .generate(self.generator)?
            .extract_golden()?
            .configure()?
            .compile()
    }
}
