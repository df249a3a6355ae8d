use std::path::Path;

use crate::{
    context::RunContext,
    process::{CheckFailure, Invocation, ToolError},
};

use super::HarnessError;

/// Prepares the target board before an FPGA suite runs.
pub trait BoardProvisioner {
    /// `Ok(false)` means no board answered; the suite must not run.
    fn provision(&self, ctx: &RunContext, out_dir: &Path) -> Result<bool, HarnessError>;
}

/// Runs the `[board] provision` command with the hardware directory and `out_dir` appended.
/// Exit status zero means the board is ready.
#[derive(Clone, Debug, Default)]
pub struct CommandProvisioner;

impl CommandProvisioner {
    pub fn invocation(&self, ctx: &RunContext, command: &[String], out_dir: &Path) -> Invocation {
        let mut argv = command.to_vec();
        argv.push(ctx.in_dlk_root(&ctx.fpga_files).display().to_string());
        argv.push(out_dir.display().to_string());
        Invocation::new(argv, &ctx.dlk_root)
            .capture_as(out_dir, "provision")
            .keep_outputs(ctx.keep_outputs)
    }
}

impl BoardProvisioner for CommandProvisioner {
    fn provision(&self, ctx: &RunContext, out_dir: &Path) -> Result<bool, HarnessError> {
        // Nothing to run: the board is assumed to be set up out of band.
        let Some(command) = &ctx.board_provision else {
            return Ok(true);
        };
        match self.invocation(ctx, command, out_dir).run() {
            Ok(_) => Ok(true),
            Err(ToolError::Check {
                reason: CheckFailure::NonZeroExit(_),
                ..
            }) => Ok(false),
            Err(err) => Err(err.into()),
        }
    }
}
