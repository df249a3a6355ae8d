use std::{fmt, str::FromStr};

use crate::{
    configuration::{
        ConfigurationError, ConfigurationMatrix, CpuName, FlagOverlay, ModelCategory,
        TestConfiguration,
    },
    context::TEST_LEVEL_FUTURE_TARGET,
};

use super::HarnessError;

/// The stages one case goes through. Each one is gated separately by the test level.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Codegen,
    BinaryExec,
}

/// One enumerated configuration and its position in the suite.
#[derive(Clone, Debug, PartialEq)]
pub struct TestCase {
    pub index: usize,
    pub configuration: TestConfiguration,
}

/// The fixed per-architecture suites.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Suite {
    X86_64,
    Aarch64,
    ArmFpga,
}

fn flags(
    use_avx: Option<bool>,
    hard_quantize: Option<bool>,
    threshold_skipping: Option<bool>,
    cache_dma: Option<bool>,
) -> FlagOverlay {
    FlagOverlay {
        use_avx,
        hard_quantize,
        threshold_skipping,
        cache_dma,
        ..Default::default()
    }
}

impl Suite {
    pub const ALL: [Suite; 3] = [Suite::X86_64, Suite::Aarch64, Suite::ArmFpga];

    pub fn cpu_name(self) -> CpuName {
        match self {
            Suite::X86_64 => CpuName::X86_64,
            Suite::Aarch64 => CpuName::Aarch64,
            Suite::ArmFpga => CpuName::ArmFpga,
        }
    }

    /// Used in the suite directory name: `test-{tag}-{name}`.
    pub fn name(self) -> &'static str {
        match self {
            Suite::X86_64 => "CodeGenerationX8664",
            Suite::Aarch64 => "CodeGenerationAarch64",
            Suite::ArmFpga => "CodeGenerationArmFpga",
        }
    }

    pub fn phases(self) -> &'static [Phase] {
        match self {
            Suite::X86_64 | Suite::ArmFpga => &[Phase::Codegen, Phase::BinaryExec],
            Suite::Aarch64 => &[Phase::Codegen],
        }
    }

    /// FPGA suites need a provisioned board before any case runs.
    pub fn requires_board(self) -> bool {
        self == Suite::ArmFpga
    }

    /// Flag overlays applied to every model category.
    pub fn overlays(self) -> Vec<FlagOverlay> {
        let (t, f) = (Some(true), Some(false));
        match self {
            Suite::X86_64 => vec![
                flags(t, t, t, None),
                flags(t, t, f, None),
                flags(t, f, f, None),
                flags(f, t, t, None),
                flags(f, t, f, None),
                flags(f, f, f, None),
            ],
            Suite::Aarch64 => vec![
                flags(None, None, t, t),
                flags(None, None, f, t),
                flags(None, None, t, f),
                flags(None, None, f, f),
            ],
            Suite::ArmFpga => [t, f]
                .into_iter()
                .flat_map(|cache| {
                    [t, f].into_iter().map(move |skip| FlagOverlay {
                        need_arm_compiler: t,
                        ..flags(None, t, skip, cache)
                    })
                })
                .collect(),
        }
    }

    /// Classification cases driven through the inference script. Only x86_64 has them.
    fn script_cases(self) -> Vec<FlagOverlay> {
        if self != Suite::X86_64 {
            return vec![];
        }
        [true, false]
            .into_iter()
            .flat_map(|use_avx| {
                [
                    FlagOverlay {
                        use_avx: Some(use_avx),
                        input_name: Some("raw_image.png".to_string()),
                        test_level: Some(TEST_LEVEL_FUTURE_TARGET),
                        ..Default::default()
                    },
                    FlagOverlay {
                        use_avx: Some(use_avx),
                        input_name: Some("preprocessed_image.npy".to_string()),
                        from_npy: Some(true),
                        ..Default::default()
                    },
                ]
            })
            .collect()
    }

    /// Every case of the suite in run order: the category matrix, then any script cases.
    pub fn configurations(self) -> Result<Vec<TestCase>, ConfigurationError> {
        let cpu_name = self.cpu_name();
        let mut configurations = ConfigurationMatrix::build(&self.overlays(), cpu_name)?;

        let script_base = ModelCategory::Classification
            .base_configuration(cpu_name)
            .merged(&FlagOverlay {
                hard_quantize: Some(true),
                use_run_test_script: Some(true),
                ..Default::default()
            })?;
        configurations.extend(ConfigurationMatrix::by_overlays(
            &self.script_cases(),
            &script_base,
        )?);

        Ok(configurations
            .into_iter()
            .enumerate()
            .map(|(index, configuration)| TestCase {
                index,
                configuration,
            })
            .collect())
    }
}

impl fmt::Display for Suite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.cpu_name().as_str())
    }
}

impl FromStr for Suite {
    type Err = HarnessError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Suite::ALL
            .into_iter()
            .find(|suite| suite.cpu_name().as_str() == s || suite.name() == s)
            .ok_or_else(|| HarnessError::UnknownSuite(s.to_string()))
    }
}
