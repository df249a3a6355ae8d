//! Typed test configurations and the matrix that enumerates them.
//!
//! A [TestConfiguration] is always built through [TestConfigurationBuilder], which enforces the
//! required fields. Per-case variation is expressed as a [FlagOverlay]: every field optional,
//! merged shallowly over a base configuration with the overlay taking precedence.

use std::path::PathBuf;

use derive_builder::{Builder, UninitializedFieldError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

mod cpu;
pub use cpu::*;

pub mod matrix;
pub mod models;

pub use matrix::ConfigurationMatrix;
pub use models::ModelCategory;

pub const DEFAULT_MAX_PERCENT_INCORRECT: f64 = 0.1;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigurationError {
    #[error("Configuration is missing required field `{0}`")]
    MissingField(&'static str),

    #[error("Configuration field `{field}` must not be empty")]
    EmptyField { field: &'static str },

    #[error("max_percent_incorrect_values must be within 0..=100, got {0}")]
    ThresholdOutOfRange(f64),

    #[error("Unknown cpu name {0:?}")]
    UnknownCpu(String),
}

impl From<UninitializedFieldError> for ConfigurationError {
    fn from(err: UninitializedFieldError) -> Self {
        ConfigurationError::MissingField(err.field_name())
    }
}

/// One named set of test parameters.
#[derive(Clone, Debug, PartialEq, Builder, Serialize, Deserialize)]
#[builder(build_fn(validate = "Self::validate", error = "ConfigurationError"))]
pub struct TestConfiguration {
    /// Model directory, relative to the dlk root.
    #[builder(setter(into))]
    pub model_path: PathBuf,

    /// Name of the golden-data archive (without `.tar.gz`) and of the directory it extracts to.
    #[builder(setter(into))]
    pub expected_output_set_name: String,

    #[builder(setter(into))]
    pub prefix: String,

    #[builder(setter(into))]
    pub input_name: String,

    #[builder(setter(into))]
    pub output_npy_name: String,

    #[builder(default)]
    pub cpu_name: CpuName,

    #[builder(default = "true")]
    pub hard_quantize: bool,

    #[builder(default)]
    pub threshold_skipping: bool,

    #[builder(default)]
    pub cache_dma: bool,

    #[builder(default)]
    pub use_avx: bool,

    #[builder(default)]
    pub use_run_test_script: bool,

    /// The script-driven validator is told its input is an already preprocessed .npy.
    #[builder(default)]
    pub from_npy: bool,

    #[builder(default)]
    pub need_arm_compiler: bool,

    #[builder(default = "DEFAULT_MAX_PERCENT_INCORRECT")]
    pub max_percent_incorrect_values: f64,

    #[builder(default, setter(strip_option))]
    pub test_level: Option<u32>,
}

impl TestConfigurationBuilder {
    fn validate(&self) -> Result<(), ConfigurationError> {
        let required = [
            ("model_path", self.model_path.as_ref().map(|p| p.as_os_str().is_empty())),
            (
                "expected_output_set_name",
                self.expected_output_set_name.as_ref().map(String::is_empty),
            ),
            ("prefix", self.prefix.as_ref().map(String::is_empty)),
            ("input_name", self.input_name.as_ref().map(String::is_empty)),
            ("output_npy_name", self.output_npy_name.as_ref().map(String::is_empty)),
        ];
        for (field, empty) in required {
            match empty {
                None => return Err(ConfigurationError::MissingField(field)),
                Some(true) => return Err(ConfigurationError::EmptyField { field }),
                Some(false) => {}
            }
        }
        if let Some(threshold) = self.max_percent_incorrect_values {
            if !(0.0..=100.0).contains(&threshold) {
                return Err(ConfigurationError::ThresholdOutOfRange(threshold));
            }
        }
        Ok(())
    }
}

impl TestConfiguration {
    pub fn builder() -> TestConfigurationBuilder {
        TestConfigurationBuilder::default()
    }

    /// Level used by the skip gate. Configurations without one are level 0.
    pub fn effective_test_level(&self) -> u32 {
        self.test_level.unwrap_or(0)
    }

    /// Cases at or above the run's level are skipped, never failed.
    pub fn is_gated_by(&self, current_test_level: u32) -> bool {
        self.effective_test_level() >= current_test_level
    }

    /// Shallow merge: every field the overlay sets replaces the base value.
    pub fn merged(&self, overlay: &FlagOverlay) -> Result<TestConfiguration, ConfigurationError> {
        FlagOverlay::from(self.clone())
            .merge(overlay.clone())
            .into_configuration()
    }
}

/// A partial configuration. Fields left as `None` keep the base value when merged.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FlagOverlay {
    pub model_path: Option<PathBuf>,
    pub expected_output_set_name: Option<String>,
    pub prefix: Option<String>,
    pub input_name: Option<String>,
    pub output_npy_name: Option<String>,
    pub cpu_name: Option<CpuName>,
    pub hard_quantize: Option<bool>,
    pub threshold_skipping: Option<bool>,
    pub cache_dma: Option<bool>,
    pub use_avx: Option<bool>,
    pub use_run_test_script: Option<bool>,
    pub from_npy: Option<bool>,
    pub need_arm_compiler: Option<bool>,
    pub max_percent_incorrect_values: Option<f64>,
    pub test_level: Option<u32>,
}

macro_rules! merge_fields {
    ($base:ident, $other:ident, $($field:ident),+ $(,)?) => {
        FlagOverlay {
            $($field: $other.$field.or($base.$field),)+
        }
    };
}

impl FlagOverlay {
    /// Keys set in `other` take precedence; keys only in `self` are kept.
    pub fn merge(self, other: FlagOverlay) -> FlagOverlay {
        merge_fields!(
            self,
            other,
            model_path,
            expected_output_set_name,
            prefix,
            input_name,
            output_npy_name,
            cpu_name,
            hard_quantize,
            threshold_skipping,
            cache_dma,
            use_avx,
            use_run_test_script,
            from_npy,
            need_arm_compiler,
            max_percent_incorrect_values,
            test_level,
        )
    }

    /// Validates the overlay as a complete configuration, applying defaults for unset flags.
    pub fn into_configuration(self) -> Result<TestConfiguration, ConfigurationError> {
        let mut builder = TestConfiguration::builder();
        if let Some(v) = self.model_path {
            builder.model_path(v);
        }
        if let Some(v) = self.expected_output_set_name {
            builder.expected_output_set_name(v);
        }
        if let Some(v) = self.prefix {
            builder.prefix(v);
        }
        if let Some(v) = self.input_name {
            builder.input_name(v);
        }
        if let Some(v) = self.output_npy_name {
            builder.output_npy_name(v);
        }
        if let Some(v) = self.cpu_name {
            builder.cpu_name(v);
        }
        if let Some(v) = self.hard_quantize {
            builder.hard_quantize(v);
        }
        if let Some(v) = self.threshold_skipping {
            builder.threshold_skipping(v);
        }
        if let Some(v) = self.cache_dma {
            builder.cache_dma(v);
        }
        if let Some(v) = self.use_avx {
            builder.use_avx(v);
        }
        if let Some(v) = self.use_run_test_script {
            builder.use_run_test_script(v);
        }
        if let Some(v) = self.from_npy {
            builder.from_npy(v);
        }
        if let Some(v) = self.need_arm_compiler {
            builder.need_arm_compiler(v);
        }
        if let Some(v) = self.max_percent_incorrect_values {
            builder.max_percent_incorrect_values(v);
        }
        if let Some(v) = self.test_level {
            builder.test_level(v);
        }
        builder.build()
    }
}

impl From<TestConfiguration> for FlagOverlay {
    fn from(value: TestConfiguration) -> Self {
        FlagOverlay {
            model_path: Some(value.model_path),
            expected_output_set_name: Some(value.expected_output_set_name),
            prefix: Some(value.prefix),
            input_name: Some(value.input_name),
            output_npy_name: Some(value.output_npy_name),
            cpu_name: Some(value.cpu_name),
            hard_quantize: Some(value.hard_quantize),
            threshold_skipping: Some(value.threshold_skipping),
            cache_dma: Some(value.cache_dma),
            use_avx: Some(value.use_avx),
            use_run_test_script: Some(value.use_run_test_script),
            from_npy: Some(value.from_npy),
            need_arm_compiler: Some(value.need_arm_compiler),
            max_percent_incorrect_values: Some(value.max_percent_incorrect_values),
            test_level: value.test_level,
        }
    }
}
