use crate::validation::ToleranceVerdict;

use super::{HarnessError, Suite};

/// The terminal state of one case. Skipping is not a failure.
#[derive(Debug)]
pub enum CaseOutcome {
    /// `verdict` is `None` for suites that only generate and build.
    Passed { verdict: Option<ToleranceVerdict> },
    Failed(HarnessError),
    Skipped { level: u32, current: u32 },
}

impl CaseOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            CaseOutcome::Passed { .. } => "passed",
            CaseOutcome::Failed(_) => "failed",
            CaseOutcome::Skipped { .. } => "skipped",
        }
    }

    pub fn detail(&self) -> Option<String> {
        match self {
            CaseOutcome::Passed { verdict } => verdict.map(|v| v.to_string()),
            CaseOutcome::Failed(err) => Some(err.to_string()),
            CaseOutcome::Skipped { level, current } => Some(format!(
                "test level of this test: {level}, current test level: {current}"
            )),
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, CaseOutcome::Failed(_))
    }
}

#[derive(Debug)]
pub struct CaseRecord {
    pub index: usize,
    pub prefix: String,
    pub outcome: CaseOutcome,
}

/// Outcomes of every case of one suite, in run order.
#[derive(Debug)]
pub struct SuiteReport {
    pub suite: Suite,
    pub cases: Vec<CaseRecord>,
}

impl SuiteReport {
    pub fn new(suite: Suite) -> Self {
        Self {
            suite,
            cases: vec![],
        }
    }

    fn count(&self, label: &str) -> usize {
        self.cases
            .iter()
            .filter(|case| case.outcome.label() == label)
            .count()
    }

    pub fn passed_count(&self) -> usize {
        self.count("passed")
    }

    pub fn failed_count(&self) -> usize {
        self.count("failed")
    }

    pub fn skipped_count(&self) -> usize {
        self.count("skipped")
    }

    /// True when no case failed. Skipped cases do not count against the suite.
    pub fn passed(&self) -> bool {
        self.failed_count() == 0
    }

    pub fn failures(&self) -> impl Iterator<Item = &CaseRecord> {
        self.cases.iter().filter(|case| case.outcome.is_failure())
    }

    pub fn dump_failures(&self) {
        for case in self.failures() {
            if let CaseOutcome::Failed(err) = &case.outcome {
                eprintln!("[{}] case {} ({}): {err}", self.suite, case.index, case.prefix);
            }
        }
    }

    pub fn summary(&self) -> String {
        format!(
            "{}: {} passed, {} failed, {} skipped",
            self.suite,
            self.passed_count(),
            self.failed_count(),
            self.skipped_count()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skipped_cases_do_not_fail_the_suite() {
        let mut report = SuiteReport::new(Suite::Aarch64);
        report.cases.push(CaseRecord {
            index: 0,
            prefix: "cls".into(),
            outcome: CaseOutcome::Passed { verdict: None },
        });
        report.cases.push(CaseRecord {
            index: 1,
            prefix: "cls".into(),
            outcome: CaseOutcome::Skipped { level: 512, current: 1 },
        });
        assert!(report.passed());
        assert_eq!(report.summary(), "aarch64: 1 passed, 0 failed, 1 skipped");

        report.cases.push(CaseRecord {
            index: 2,
            prefix: "det".into(),
            outcome: CaseOutcome::Failed(HarnessError::BoardUnavailable),
        });
        assert!(!report.passed());
        assert_eq!(report.failures().count(), 1);
    }
}
