// This file defines the harness config that we'll be fetching from:
// $HOME
// $PWD
// $DLK_HARNESS_CONFIG_PATH (if set)
// Later files update earlier ones.

use std::{
    fs,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use thiserror::Error;

mod log_config;
pub use log_config::{LogConfig, LogInfo};

pub const FILE_NAME: &str = "dlk-harness.toml";
pub const CONFIG_PATH_VAR: &str = "DLK_HARNESS_CONFIG_PATH";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Could not read {path:?}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid input read from {path:?} -- {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Invalid log config in {0:?}: options must be booleans naming registered events")]
    InvalidLogConfig(PathBuf),
}

fn overwrite<T>(slot: &mut Option<T>, other: Option<T>) {
    if other.is_some() {
        *slot = other;
    }
}

/// Build directory and test selection policy.
#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq)]
pub struct RunSection {
    pub build_root: Option<PathBuf>,
    pub project_tag: Option<String>,
    pub cleanup_old_build: Option<bool>,
    pub cleanup: Option<bool>,
    pub current_test_level: Option<u32>,
    pub keep_outputs: Option<bool>,
}

impl RunSection {
    fn update(&mut self, other: RunSection) {
        overwrite(&mut self.build_root, other.build_root);
        overwrite(&mut self.project_tag, other.project_tag);
        overwrite(&mut self.cleanup_old_build, other.cleanup_old_build);
        overwrite(&mut self.cleanup, other.cleanup);
        overwrite(&mut self.current_test_level, other.current_test_level);
        overwrite(&mut self.keep_outputs, other.keep_outputs);
    }
}

/// Where the external code generator and its helper scripts live.
#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq)]
pub struct ToolchainSection {
    pub dlk_root: Option<PathBuf>,
    pub python: Option<String>,
    pub codegen_script: Option<PathBuf>,
    pub run_test_script: Option<PathBuf>,
    pub nnlib_source: Option<PathBuf>,
    pub num_pe: Option<u32>,
    pub make_jobs: Option<u32>,
    pub tar: Option<String>,
    pub cmake: Option<String>,
    pub make: Option<String>,
}

impl ToolchainSection {
    fn update(&mut self, other: ToolchainSection) {
        overwrite(&mut self.dlk_root, other.dlk_root);
        overwrite(&mut self.python, other.python);
        overwrite(&mut self.codegen_script, other.codegen_script);
        overwrite(&mut self.run_test_script, other.run_test_script);
        overwrite(&mut self.nnlib_source, other.nnlib_source);
        overwrite(&mut self.num_pe, other.num_pe);
        overwrite(&mut self.make_jobs, other.make_jobs);
        overwrite(&mut self.tar, other.tar);
        overwrite(&mut self.cmake, other.cmake);
        overwrite(&mut self.make, other.make);
    }
}

#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq)]
pub struct RemoteSection {
    pub host: Option<String>,
    pub user: Option<String>,
    pub work_dir: Option<String>,
    pub python: Option<String>,
    pub ssh: Option<String>,
    pub scp: Option<String>,
}

impl RemoteSection {
    fn update(&mut self, other: RemoteSection) {
        overwrite(&mut self.host, other.host);
        overwrite(&mut self.user, other.user);
        overwrite(&mut self.work_dir, other.work_dir);
        overwrite(&mut self.python, other.python);
        overwrite(&mut self.ssh, other.ssh);
        overwrite(&mut self.scp, other.scp);
    }
}

#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq)]
pub struct BoardSection {
    /// Command (argv) run once before an FPGA suite; must exit zero when a board is available.
    pub provision: Option<Vec<String>>,
    pub fpga_files: Option<PathBuf>,
}

impl BoardSection {
    fn update(&mut self, other: BoardSection) {
        overwrite(&mut self.provision, other.provision);
        overwrite(&mut self.fpga_files, other.fpga_files);
    }
}

#[derive(Serialize, Deserialize, Debug, Default, Clone)]
#[serde(default)]
pub struct HarnessConfig {
    pub run: RunSection,
    pub toolchain: ToolchainSection,
    pub remote: RemoteSection,
    pub board: BoardSection,
    #[serde(rename = "log")]
    pub log_config: LogConfig,
}

impl HarnessConfig {
    pub fn update(&mut self, other: HarnessConfig) {
        self.run.update(other.run);
        self.toolchain.update(other.toolchain);
        self.remote.update(other.remote);
        self.board.update(other.board);
        self.log_config.update(other.log_config);
    }

    pub fn from_toml_str(contents: &str, origin: &Path) -> Result<Self, ConfigError> {
        let config = toml::from_str::<HarnessConfig>(contents).map_err(|source| {
            ConfigError::Parse {
                path: origin.to_path_buf(),
                source,
            }
        })?;
        if !config.log_config.validate() {
            return Err(ConfigError::InvalidLogConfig(origin.to_path_buf()));
        }
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&contents, path)
    }

    /// Merges every config file found in the search directories. Missing files are skipped.
    pub fn discover() -> Result<Self, ConfigError> {
        let mut paths_to_check = vec![
            // Check $HOME
            home::home_dir(),
            // Check $PWD
            std::env::current_dir().ok(),
        ];

        if let Ok(path) = std::env::var(CONFIG_PATH_VAR) {
            paths_to_check.push(Some(PathBuf::from(path)));
        }

        Self::discover_in(paths_to_check.into_iter().flatten())
    }

    pub fn discover_in(dirs: impl IntoIterator<Item = PathBuf>) -> Result<Self, ConfigError> {
        let mut config = HarnessConfig::default();
        for dir in dirs {
            let path = dir.join(FILE_NAME);
            if path.is_file() {
                config.update(Self::from_file(&path)?);
            }
        }
        Ok(config)
    }

    pub fn log_info(&self) -> LogInfo {
        self.log_config.clone().into()
    }
}

#[cfg(test)]
mod tests {
    use std::path::{Path, PathBuf};

    use super::{ConfigError, HarnessConfig, FILE_NAME};

    #[test]
    fn later_files_override_earlier_ones() {
        let home = tempfile::tempdir().unwrap();
        let pwd = tempfile::tempdir().unwrap();
        std::fs::write(
            home.path().join(FILE_NAME),
            "[run]\ncurrent_test_level = 3\nproject_tag = 'home'\n[remote]\nhost = '10.0.0.1'\n",
        )
        .unwrap();
        std::fs::write(pwd.path().join(FILE_NAME), "[run]\nproject_tag = 'pwd'\n").unwrap();

        let config = HarnessConfig::discover_in([
            home.path().to_path_buf(),
            pwd.path().to_path_buf(),
            PathBuf::from("/does/not/exist"),
        ])
        .unwrap();

        assert_eq!(config.run.current_test_level, Some(3));
        assert_eq!(config.run.project_tag.as_deref(), Some("pwd"));
        assert_eq!(config.remote.host.as_deref(), Some("10.0.0.1"));
    }

    #[test]
    fn malformed_file_is_a_parse_error() {
        let err = HarnessConfig::from_toml_str("[run\n", Path::new("bad.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn log_section_is_validated() {
        let err = HarnessConfig::from_toml_str("[log.log_options]\nnope = true\n", Path::new("x"))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidLogConfig(_)));
    }
}
