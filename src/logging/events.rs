//! Event types emitted by the harness. Each registers its name in [METRICS] so log filters can be validated.

use std::path::Path;

use serde::Serialize;

use super::{
    registry::{distributed_slice, METRICS},
    LogEvent,
};

#[distributed_slice(METRICS)]
static TOOL_INVOCATION: &'static str = ToolInvocation::NAME;

#[distributed_slice(METRICS)]
static BUILD_STAGE: &'static str = BuildStageEvent::NAME;

#[distributed_slice(METRICS)]
static VERDICT: &'static str = VerdictEvent::NAME;

#[distributed_slice(METRICS)]
static REMOTE_PARSE_FALLBACK: &'static str = RemoteParseFallback::NAME;

#[distributed_slice(METRICS)]
static CASE_OUTCOME: &'static str = CaseOutcomeEvent::NAME;

#[distributed_slice(METRICS)]
static SUITE_SCOPE: &'static str = SuiteScopeEvent::NAME;

/// One external process run through the process runner.
#[derive(Serialize, Debug, Clone)]
pub struct ToolInvocation {
    pub argv: Vec<String>,
    pub working_dir: String,
    pub exit_code: Option<i32>,
    pub passed: bool,
}

impl LogEvent for ToolInvocation {
    const NAME: &'static str = "tool-invocation";
}

/// A build driver step completing for a single configuration.
#[derive(Serialize, Debug, Clone)]
pub struct BuildStageEvent {
    pub test_id: usize,
    pub stage: &'static str,
    pub artifact_dir: String,
}

impl BuildStageEvent {
    pub fn new(test_id: usize, stage: &'static str, artifact_dir: &Path) -> Self {
        Self {
            test_id,
            stage,
            artifact_dir: artifact_dir.display().to_string(),
        }
    }
}

impl LogEvent for BuildStageEvent {
    const NAME: &'static str = "build-stage";
}

#[derive(Serialize, Debug, Clone)]
pub struct VerdictEvent {
    pub test_id: usize,
    pub percent_failed: f64,
    pub threshold: f64,
    pub passed: bool,
}

impl LogEvent for VerdictEvent {
    const NAME: &'static str = "verdict";
}

/// Remote output that could not be read as a number and was replaced with the worst-case verdict.
#[derive(Serialize, Debug, Clone)]
pub struct RemoteParseFallback {
    pub host: String,
    pub raw_output: String,
    pub substituted: f64,
}

impl LogEvent for RemoteParseFallback {
    const NAME: &'static str = "remote-parse-fallback";
}

#[derive(Serialize, Debug, Clone)]
pub struct CaseOutcomeEvent {
    pub test_id: usize,
    pub prefix: String,
    pub outcome: &'static str,
    pub detail: Option<String>,
}

impl LogEvent for CaseOutcomeEvent {
    const NAME: &'static str = "case-outcome";
}

#[derive(Serialize, Debug, Clone)]
pub struct SuiteScopeEvent {
    pub dir: String,
    pub action: &'static str,
}

impl LogEvent for SuiteScopeEvent {
    const NAME: &'static str = "suite-scope";
}
