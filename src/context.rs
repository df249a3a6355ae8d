//! The immutable per-run context and the suite-scoped build directory.

use std::path::{Path, PathBuf};

use derive_builder::Builder;
use tempfile::TempDir;
use thiserror::Error;

use crate::{
    config::{HarnessConfig, LogInfo},
    logging::{events::SuiteScopeEvent, record},
    remote::RemoteTarget,
};

pub const DEFAULT_PROJECT_NAME: &str = "code_generation";
pub const DEFAULT_PROJECT_TAG: &str = "dlk";
pub const DEFAULT_CURRENT_TEST_LEVEL: u32 = 1;
/// Level given to cases that cannot run yet; above any level a run is configured with in practice.
pub const TEST_LEVEL_FUTURE_TARGET: u32 = 512;
pub const DEFAULT_NUM_PE: u32 = 16;
pub const DEFAULT_MAKE_JOBS: u32 = 8;

/// Everything a run needs to know, fixed for the lifetime of the run.
/// Components receive it by reference instead of consulting globals.
#[derive(Clone, Debug, Builder)]
#[builder(pattern = "owned")]
pub struct RunContext {
    /// Parent of every suite directory. When unset, suites use `{cwd}/outputs`,
    /// or a temporary directory if `cleanup` is requested.
    #[builder(default, setter(strip_option))]
    pub build_root: Option<PathBuf>,

    #[builder(default = "DEFAULT_PROJECT_TAG.to_string()", setter(into))]
    pub project_tag: String,

    /// Remove a previous suite directory before the suite starts.
    #[builder(default = "true")]
    pub cleanup_old_build: bool,

    /// Remove the suite directory once the suite is finished.
    #[builder(default = "false")]
    pub cleanup: bool,

    #[builder(default = "DEFAULT_CURRENT_TEST_LEVEL")]
    pub current_test_level: u32,

    /// Keep stdout/stderr capture files of passing tool runs.
    #[builder(default = "false")]
    pub keep_outputs: bool,

    /// Root of the code generator checkout. Model paths and scripts resolve against it.
    #[builder(default = "PathBuf::from(\".\")", setter(into))]
    pub dlk_root: PathBuf,

    #[builder(default = "\"python3\".to_string()", setter(into))]
    pub python: String,

    #[builder(default = "PathBuf::from(\"scripts/generate_project.py\")", setter(into))]
    pub codegen_script: PathBuf,

    #[builder(default = "PathBuf::from(\"utils/run_test.py\")", setter(into))]
    pub run_test_script: PathBuf,

    /// Python module wrapping the generated library, shipped to remote hosts.
    #[builder(default = "PathBuf::from(\"scripts/pylib/nnlib.py\")", setter(into))]
    pub nnlib_source: PathBuf,

    #[builder(default = "DEFAULT_PROJECT_NAME.to_string()", setter(into))]
    pub project_name: String,

    #[builder(default = "DEFAULT_NUM_PE")]
    pub num_pe: u32,

    #[builder(default = "DEFAULT_MAKE_JOBS")]
    pub make_jobs: u32,

    #[builder(default = "\"tar\".to_string()", setter(into))]
    pub tar: String,

    #[builder(default = "\"cmake\".to_string()", setter(into))]
    pub cmake: String,

    #[builder(default = "\"make\".to_string()", setter(into))]
    pub make: String,

    #[builder(default)]
    pub remote: RemoteTarget,

    #[builder(default, setter(strip_option))]
    pub board_provision: Option<Vec<String>>,

    /// Hardware files handed to the provisioning command, relative to the dlk root.
    #[builder(default = "PathBuf::from(\"../fpga\")", setter(into))]
    pub fpga_files: PathBuf,

    #[builder(default)]
    pub log: LogInfo,
}

impl RunContext {
    pub fn builder() -> RunContextBuilder {
        RunContextBuilder::default()
    }

    /// A builder pre-populated from every value the config sets. Callers may still override fields.
    pub fn builder_from_config(config: &HarnessConfig) -> RunContextBuilder {
        let mut builder = RunContextBuilder::default().log(config.log_info());

        let run = &config.run;
        if let Some(root) = &run.build_root {
            builder = builder.build_root(root.clone());
        }
        if let Some(tag) = &run.project_tag {
            builder = builder.project_tag(tag.clone());
        }
        if let Some(v) = run.cleanup_old_build {
            builder = builder.cleanup_old_build(v);
        }
        if let Some(v) = run.cleanup {
            builder = builder.cleanup(v);
        }
        if let Some(v) = run.current_test_level {
            builder = builder.current_test_level(v);
        }
        if let Some(v) = run.keep_outputs {
            builder = builder.keep_outputs(v);
        }

        let toolchain = &config.toolchain;
        if let Some(v) = &toolchain.dlk_root {
            builder = builder.dlk_root(v.clone());
        }
        if let Some(v) = &toolchain.python {
            builder = builder.python(v.clone());
        }
        if let Some(v) = &toolchain.codegen_script {
            builder = builder.codegen_script(v.clone());
        }
        if let Some(v) = &toolchain.run_test_script {
            builder = builder.run_test_script(v.clone());
        }
        if let Some(v) = &toolchain.nnlib_source {
            builder = builder.nnlib_source(v.clone());
        }
        if let Some(v) = toolchain.num_pe {
            builder = builder.num_pe(v);
        }
        if let Some(v) = toolchain.make_jobs {
            builder = builder.make_jobs(v);
        }
        if let Some(v) = &toolchain.tar {
            builder = builder.tar(v.clone());
        }
        if let Some(v) = &toolchain.cmake {
            builder = builder.cmake(v.clone());
        }
        if let Some(v) = &toolchain.make {
            builder = builder.make(v.clone());
        }

        builder = builder.remote(RemoteTarget::from_section(&config.remote));

        if let Some(v) = &config.board.provision {
            builder = builder.board_provision(v.clone());
        }
        if let Some(v) = &config.board.fpga_files {
            builder = builder.fpga_files(v.clone());
        }
        builder
    }

    /// Resolves a path relative to the dlk root, leaving absolute paths alone.
    pub fn in_dlk_root(&self, path: impl AsRef<Path>) -> PathBuf {
        self.dlk_root.join(path)
    }

    /// `test-{tag}-{suite}`
    pub fn suite_dir_name(&self, suite_name: &str) -> String {
        ["test", &self.project_tag, suite_name].join("-")
    }
}

#[derive(Debug, Error)]
#[error("Could not prepare suite directory {path:?}: {source}")]
pub struct ScopeError {
    pub path: PathBuf,
    pub source: std::io::Error,
}

enum ScopeDir {
    Persistent { path: PathBuf, remove_on_drop: bool },
    Temporary(TempDir),
}

/// The build directory shared by every configuration of one suite.
/// Each configuration owns a disjoint subdirectory of it.
/// Removal at the end of the suite happens on drop, so early returns and panics are covered too.
pub struct SuiteScope {
    dir: ScopeDir,
}

fn remove_dir_if_present(path: &Path) -> std::io::Result<bool> {
    match std::fs::remove_dir_all(path) {
        Ok(()) => Ok(true),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(err) => Err(err),
    }
}

impl SuiteScope {
    pub fn open(ctx: &RunContext, suite_name: &str) -> Result<Self, ScopeError> {
        let dir_name = ctx.suite_dir_name(suite_name);
        let root = match (&ctx.build_root, ctx.cleanup) {
            (Some(root), _) => root.clone(),
            (None, true) => {
                let temp = tempfile::Builder::new()
                    .prefix(&format!("{dir_name}-"))
                    .tempdir()
                    .map_err(|source| ScopeError {
                        path: std::env::temp_dir(),
                        source,
                    })?;
                record(&SuiteScopeEvent {
                    dir: temp.path().display().to_string(),
                    action: "created-temporary",
                });
                return Ok(Self {
                    dir: ScopeDir::Temporary(temp),
                });
            }
            (None, false) => std::env::current_dir()
                .map_err(|source| ScopeError {
                    path: PathBuf::from("."),
                    source,
                })?
                .join("outputs"),
        };

        let path = root.join(dir_name);
        if ctx.cleanup_old_build {
            let removed = remove_dir_if_present(&path).map_err(|source| ScopeError {
                path: path.clone(),
                source,
            })?;
            if removed {
                println!("Old directory {} deleted", path.display());
                record(&SuiteScopeEvent {
                    dir: path.display().to_string(),
                    action: "removed-old-build",
                });
            }
        }
        std::fs::create_dir_all(&path).map_err(|source| ScopeError {
            path: path.clone(),
            source,
        })?;
        record(&SuiteScopeEvent {
            dir: path.display().to_string(),
            action: "created",
        });

        Ok(Self {
            dir: ScopeDir::Persistent {
                path,
                remove_on_drop: ctx.cleanup,
            },
        })
    }

    pub fn path(&self) -> &Path {
        match &self.dir {
            ScopeDir::Persistent { path, .. } => path,
            ScopeDir::Temporary(temp) => temp.path(),
        }
    }
}

impl Drop for SuiteScope {
    fn drop(&mut self) {
        if let ScopeDir::Persistent {
            path,
            remove_on_drop: true,
        } = &self.dir
        {
            match remove_dir_if_present(path) {
                Ok(_) => record(&SuiteScopeEvent {
                    dir: path.display().to_string(),
                    action: "removed",
                }),
                Err(err) => eprintln!("Failed to remove {}: {err}", path.display()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_policy() {
        let ctx = RunContext::builder().build().unwrap();
        assert_eq!(ctx.current_test_level, DEFAULT_CURRENT_TEST_LEVEL);
        assert_eq!(ctx.project_name, "code_generation");
        assert_eq!(ctx.num_pe, 16);
        assert_eq!(ctx.make_jobs, 8);
        assert!(ctx.cleanup_old_build);
        assert!(!ctx.cleanup);
        assert_eq!(ctx.suite_dir_name("X86_64"), "test-dlk-X86_64");
    }

    #[test]
    fn persistent_scope_clears_old_build_and_removes_on_drop() {
        let root = tempfile::tempdir().unwrap();
        let ctx = RunContext::builder()
            .build_root(root.path().to_path_buf())
            .cleanup(true)
            .build()
            .unwrap();

        let stale = root.path().join("test-dlk-Suite").join("stale.txt");
        std::fs::create_dir_all(stale.parent().unwrap()).unwrap();
        std::fs::write(&stale, "old").unwrap();

        let scope = SuiteScope::open(&ctx, "Suite").unwrap();
        assert!(scope.path().is_dir());
        assert!(!stale.exists());

        let dir = scope.path().to_path_buf();
        drop(scope);
        assert!(!dir.exists());
    }

    #[test]
    fn scope_is_kept_without_cleanup() {
        let root = tempfile::tempdir().unwrap();
        let ctx = RunContext::builder()
            .build_root(root.path().to_path_buf())
            .build()
            .unwrap();
        let dir = SuiteScope::open(&ctx, "Keep").unwrap().path().to_path_buf();
        assert!(dir.is_dir());
    }

    #[test]
    fn temporary_scope_without_build_root() {
        let ctx = RunContext::builder().cleanup(true).build().unwrap();
        let scope = SuiteScope::open(&ctx, "Temp").unwrap();
        let dir = scope.path().to_path_buf();
        assert!(dir.is_dir());
        drop(scope);
        assert!(!dir.exists());
    }
}
