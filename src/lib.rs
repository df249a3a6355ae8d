//! Test harness for the DLK code generator.
//!
//! For every architecture suite the harness enumerates a matrix of configurations, drives the
//! external code generator and native build for each, and checks the resulting inference library
//! against golden tensors, locally or on a target board.

pub mod build;
pub mod config;
pub mod configuration;
pub mod context;
pub mod harness;
pub mod logging;
pub mod process;
pub mod remote;
pub mod validation;

// Re-exports the types most callers need to run a suite.
pub mod prelude {
    pub use crate::build::{BuildDriver, CodeGenerator, ScriptCodeGenerator};
    pub use crate::config::HarnessConfig;
    pub use crate::configuration::{ConfigurationMatrix, CpuName, FlagOverlay, TestConfiguration};
    pub use crate::context::{RunContext, SuiteScope};
    pub use crate::harness::{
        BoardProvisioner, CaseOutcome, CommandProvisioner, Harness, HarnessError, Suite,
        SuiteReport,
    };
    pub use crate::validation::{ToleranceVerdict, Validator};
}
