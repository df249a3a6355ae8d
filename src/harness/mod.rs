//! Runs whole suites: provisioning, the suite directory, then every case in order.
//!
//! A suite goes through [Harness::initialize] (log session, suite directory, board) and then
//! [InitializedSuite::run], which produces a [SuiteReport]. Cases never abort each other: a failing
//! case is recorded and the next one starts.

use thiserror::Error;

use crate::{
    build::{ArtifactPaths, BuildArtifact, BuildDriver, BuildError, CodeGenerator},
    config::ConfigError,
    configuration::ConfigurationError,
    context::{RunContext, ScopeError, SuiteScope},
    logging::{
        events::{CaseOutcomeEvent, VerdictEvent},
        record, LogError, LogSession,
    },
    process::ToolError,
    validation::{judge, ToleranceVerdict, Validate, ValidationError, Validator},
};

mod board;
pub use board::*;

mod outcome;
pub use outcome::*;

mod suite;
pub use suite::*;

#[derive(Debug, Error)]
pub enum HarnessError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Build(#[from] BuildError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Tool(#[from] ToolError),

    #[error(transparent)]
    Scope(#[from] ScopeError),

    #[error(transparent)]
    Log(#[from] LogError),

    #[error("Not FPGA found: cannot test")]
    BoardUnavailable,

    #[error("Unknown suite {0:?}; expected one of x86_64, aarch64, arm_fpga")]
    UnknownSuite(String),
}

pub struct Harness<'a> {
    ctx: &'a RunContext,
    generator: &'a dyn CodeGenerator,
    provisioner: &'a dyn BoardProvisioner,
}

impl<'a> Harness<'a> {
    pub fn new(
        ctx: &'a RunContext,
        generator: &'a dyn CodeGenerator,
        provisioner: &'a dyn BoardProvisioner,
    ) -> Self {
        Self {
            ctx,
            generator,
            provisioner,
        }
    }

    /// Everything that has to hold before the first case: a valid matrix, a writable suite
    /// directory and, for FPGA suites, a board.
    pub fn initialize(&self, suite: Suite) -> Result<InitializedSuite<'_>, HarnessError> {
        let cases = suite.configurations()?;
        let log = LogSession::start(suite.name(), &self.ctx.log)?;
        let scope = SuiteScope::open(self.ctx, suite.name())?;

        if suite.requires_board() && !self.provisioner.provision(self.ctx, scope.path())? {
            return Err(HarnessError::BoardUnavailable);
        }

        Ok(InitializedSuite {
            harness: self,
            suite,
            cases,
            scope,
            log,
        })
    }

    pub fn run_suite(&self, suite: Suite) -> Result<SuiteReport, HarnessError> {
        Ok(self.initialize(suite)?.run())
    }
}

pub struct InitializedSuite<'a> {
    harness: &'a Harness<'a>,
    suite: Suite,
    cases: Vec<TestCase>,
    scope: SuiteScope,
    log: LogSession,
}

impl InitializedSuite<'_> {
    pub fn cases(&self) -> &[TestCase] {
        &self.cases
    }

    pub fn suite_dir(&self) -> &std::path::Path {
        self.scope.path()
    }

    pub fn run(self) -> SuiteReport {
        let mut report = SuiteReport::new(self.suite);
        for case in &self.cases {
            let outcome = self.run_case(case);
            record(&CaseOutcomeEvent {
                test_id: case.index,
                prefix: case.configuration.prefix.clone(),
                outcome: outcome.label(),
                detail: outcome.detail(),
            });
            if let CaseOutcome::Failed(err) = &outcome {
                eprintln!("Case {} failed: {err}", case.index);
            }
            report.cases.push(CaseRecord {
                index: case.index,
                prefix: case.configuration.prefix.clone(),
                outcome,
            });
        }

        let Self { scope, log, .. } = self;
        // The scope logs its own removal.
        drop(scope);
        log.finish();
        report
    }

    pub fn run_case(&self, case: &TestCase) -> CaseOutcome {
        println!(
            "\nCode generation test: ID: {}, Testcase: {:?}",
            case.index, case.configuration
        );
        match self.execute(case) {
            Ok(outcome) => outcome,
            Err(err) => CaseOutcome::Failed(err),
        }
    }

    fn execute(&self, case: &TestCase) -> Result<CaseOutcome, HarnessError> {
        let ctx = self.harness.ctx;
        let config = &case.configuration;
        let mut verdict = None;

        for phase in self.suite.phases() {
            if config.is_gated_by(ctx.current_test_level) {
                let outcome = CaseOutcome::Skipped {
                    level: config.effective_test_level(),
                    current: ctx.current_test_level,
                };
                if let Some(detail) = outcome.detail() {
                    println!("Skipped: {detail}");
                }
                return Ok(outcome);
            }

            match phase {
                Phase::Codegen => {
                    BuildDriver::new(ctx, self.harness.generator).build(
                        self.scope.path(),
                        case.index,
                        config,
                    )?;
                }
                Phase::BinaryExec => {
                    verdict = Some(self.binary_exec(case)?);
                }
            }
        }
        Ok(CaseOutcome::Passed { verdict })
    }

    fn binary_exec(&self, case: &TestCase) -> Result<ToleranceVerdict, HarnessError> {
        let ctx = self.harness.ctx;
        let config = &case.configuration;
        let artifact = BuildArtifact {
            test_id: case.index,
            paths: ArtifactPaths::resolve(ctx, self.scope.path(), case.index, config),
        };

        let verdict = Validator::select(ctx, config).validate(&artifact)?;
        let threshold = config.max_percent_incorrect_values;
        record(&VerdictEvent {
            test_id: case.index,
            percent_failed: verdict.percent_failed(),
            threshold,
            passed: verdict.passes(threshold),
        });

        let verdict = judge(verdict, threshold)?;
        println!(
            "Binary exec test {}: passed!  {:.3}% of the output values are correct\n\
             [hard quantize == {}, threshold skipping == {}, cache == {}]",
            config.prefix,
            verdict.percent_correct(),
            config.hard_quantize,
            config.threshold_skipping,
            config.cache_dma
        );
        Ok(verdict)
    }
}
