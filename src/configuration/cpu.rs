use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use super::ConfigurationError;

/// Target CPUs the code generator can emit a project for.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CpuName {
    #[default]
    #[serde(rename = "x86_64")]
    X86_64,
    Arm,
    Aarch64,
    ArmFpga,
}

pub const CMAKE_USE_AARCH64: &str = "-DTOOLCHAIN_NAME=linux_aarch64";
pub const CMAKE_USE_ARM: &str = "-DTOOLCHAIN_NAME=linux_arm";
pub const CMAKE_USE_NEON: &str = "-DUSE_NEON=1";
pub const CMAKE_USE_FPGA: &str = "-DRUN_ON_FPGA=1";
pub const CMAKE_USE_AVX: &str = "-DUSE_AVX=1";

/// Every target toolchain produces an ELF shared object.
pub const SHARED_LIBRARY_EXTENSION: &str = "so";

impl CpuName {
    pub const ALL: [CpuName; 4] = [
        CpuName::X86_64,
        CpuName::Arm,
        CpuName::Aarch64,
        CpuName::ArmFpga,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            CpuName::X86_64 => "x86_64",
            CpuName::Arm => "arm",
            CpuName::Aarch64 => "aarch64",
            CpuName::ArmFpga => "arm_fpga",
        }
    }

    /// The generated library can only be executed in-process on the host for x86_64.
    pub fn runs_locally(self) -> bool {
        self == CpuName::X86_64
    }

    /// `lib_{cpu}.so`
    pub fn library_file_name(self) -> String {
        format!("lib_{}.{SHARED_LIBRARY_EXTENSION}", self.as_str())
    }

    /// Definitions passed to the cmake configure step.
    /// arm_fpga also carries the arm toolchain and NEON flags.
    pub fn cmake_definitions(self, use_avx: bool) -> Vec<&'static str> {
        let mut defs = vec![];
        match self {
            CpuName::X86_64 => {}
            CpuName::Aarch64 => defs.extend([CMAKE_USE_AARCH64, CMAKE_USE_NEON]),
            CpuName::Arm => defs.extend([CMAKE_USE_ARM, CMAKE_USE_NEON]),
            CpuName::ArmFpga => defs.extend([CMAKE_USE_ARM, CMAKE_USE_NEON, CMAKE_USE_FPGA]),
        }
        if use_avx {
            defs.push(CMAKE_USE_AVX);
        }
        defs
    }
}

impl fmt::Display for CpuName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CpuName {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CpuName::ALL
            .into_iter()
            .find(|cpu| cpu.as_str() == s)
            .ok_or_else(|| ConfigurationError::UnknownCpu(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fpga_flags_include_arm_and_neon() {
        assert_eq!(
            CpuName::ArmFpga.cmake_definitions(false),
            vec![CMAKE_USE_ARM, CMAKE_USE_NEON, CMAKE_USE_FPGA]
        );
        assert_eq!(
            CpuName::Aarch64.cmake_definitions(true),
            vec![CMAKE_USE_AARCH64, CMAKE_USE_NEON, CMAKE_USE_AVX]
        );
        assert!(CpuName::X86_64.cmake_definitions(false).is_empty());
        assert_eq!(CpuName::X86_64.cmake_definitions(true), vec![CMAKE_USE_AVX]);
    }

    #[test]
    fn names_roundtrip_through_serde_and_from_str() {
        for cpu in CpuName::ALL {
            assert_eq!(cpu.as_str().parse::<CpuName>().unwrap(), cpu);
            let json = serde_json::to_string(&cpu).unwrap();
            assert_eq!(json, format!("\"{}\"", cpu.as_str()));
        }
        assert!("sparc".parse::<CpuName>().is_err());
    }

    #[test]
    fn library_name_follows_cpu() {
        assert_eq!(CpuName::ArmFpga.library_file_name(), "lib_arm_fpga.so");
    }
}
