mod common;

use std::cell::Cell;

use dlk_harness::{
    build::{BuildError, CodeGenerator, CodegenRequest},
    context::RunContext,
    harness::{BoardProvisioner, CaseOutcome, Harness, HarnessError, Suite},
    validation::ValidationError,
};

use common::{install_model, FakeToolchain};

/// Lays out an empty project directory and counts how often it was asked to.
#[derive(Default)]
struct CountingGenerator {
    calls: Cell<usize>,
}

impl CodeGenerator for CountingGenerator {
    fn generate(&self, request: &CodegenRequest) -> Result<(), BuildError> {
        self.calls.set(self.calls.get() + 1);
        std::fs::create_dir_all(request.dest_dir.join(format!("{}.prj", request.project_name)))
            .map_err(|source| BuildError::Io {
                path: request.dest_dir.clone(),
                source,
            })
    }
}

struct FixedBoard(bool);

impl BoardProvisioner for FixedBoard {
    fn provision(&self, _: &RunContext, _: &std::path::Path) -> Result<bool, HarnessError> {
        Ok(self.0)
    }
}

fn install_suite_models(dlk_root: &std::path::Path, suite: Suite) {
    for case in suite.configurations().unwrap() {
        install_model(dlk_root, &case.configuration);
    }
}

#[test]
fn gated_cases_never_reach_the_build() {
    let out = tempfile::tempdir().unwrap();
    let ctx = RunContext::builder()
        .build_root(out.path().to_path_buf())
        .current_test_level(0)
        .tar("/definitely/not/tar")
        .build()
        .unwrap();
    let generator = CountingGenerator::default();

    let report = Harness::new(&ctx, &generator, &FixedBoard(true))
        .run_suite(Suite::X86_64)
        .unwrap();

    assert_eq!(generator.calls.get(), 0);
    assert_eq!(report.skipped_count(), 28);
    assert!(report.passed());
    assert!(report
        .cases
        .iter()
        .all(|case| matches!(case.outcome, CaseOutcome::Skipped { current: 0, .. })));
}

#[test]
fn codegen_only_suite_passes_with_working_tools() {
    let tools = tempfile::tempdir().unwrap();
    let dlk = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    install_suite_models(dlk.path(), Suite::Aarch64);

    let ctx = FakeToolchain::install(tools.path(), "lib_aarch64.so").context(dlk.path(), out.path());
    let generator = CountingGenerator::default();
    let report = Harness::new(&ctx, &generator, &FixedBoard(false))
        .run_suite(Suite::Aarch64)
        .unwrap();

    assert_eq!(generator.calls.get(), 16);
    assert_eq!(report.passed_count(), 16, "{}", report.summary());
    assert!(out
        .path()
        .join("test-dlk-CodeGenerationAarch64/15_seg_lm_segnet_v1_quantize_camvid_aarch64/code_generation.prj/lib_aarch64.so")
        .is_file());
}

#[test]
fn failures_are_recorded_without_stopping_the_suite() {
    let tools = tempfile::tempdir().unwrap();
    let dlk = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    install_suite_models(dlk.path(), Suite::X86_64);

    // The fake library is an empty file, so every in-process validation fails to load it.
    let ctx = FakeToolchain::install(tools.path(), "lib_x86_64.so").context(dlk.path(), out.path());
    let generator = CountingGenerator::default();
    let report = Harness::new(&ctx, &generator, &FixedBoard(true))
        .run_suite(Suite::X86_64)
        .unwrap();

    // Two script cases sit at the future level.
    assert_eq!(report.skipped_count(), 2);
    assert_eq!(report.failed_count(), 26);
    assert_eq!(generator.calls.get(), 26);
    assert!(!report.passed());
    assert!(matches!(
        report.cases[0].outcome,
        CaseOutcome::Failed(HarnessError::Validation(ValidationError::Npy(_)))
    ));
}

#[test]
fn fpga_suite_needs_a_board() {
    let out = tempfile::tempdir().unwrap();
    let ctx = RunContext::builder()
        .build_root(out.path().to_path_buf())
        .build()
        .unwrap();
    let generator = CountingGenerator::default();

    let err = Harness::new(&ctx, &generator, &FixedBoard(false))
        .run_suite(Suite::ArmFpga)
        .unwrap_err();
    assert!(matches!(err, HarnessError::BoardUnavailable));
    assert_eq!(err.to_string(), "Not FPGA found: cannot test");
    assert_eq!(generator.calls.get(), 0);
}
