//! Spawning pt-online-schema-change.

use std::process::Command;

use crate::command::PerconaCommand;
use crate::error::{OscError, OscResult};

/// Runs the external tool.
///
/// Implementations block until the process exits.
pub trait ToolRunner {
    /// Run a rendered command; `Ok(false)` means the tool exited non-zero.
    fn run(&self, command: &PerconaCommand) -> OscResult<bool>;

    /// Run `args` and return its standard output.
    fn capture(&self, args: &[String]) -> OscResult<String>;
}

/// Executes argv directly, without a shell.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl SystemRunner {
    pub fn new() -> Self {
        Self
    }
}

fn split_program(args: &[String]) -> OscResult<(&String, &[String])> {
    args.split_first()
        .ok_or_else(|| OscError::Configuration("empty command line".into()))
}

impl ToolRunner for SystemRunner {
    fn run(&self, command: &PerconaCommand) -> OscResult<bool> {
        let (program, args) = split_program(command.args())?;
        let status = Command::new(program).args(args).status()?;
        tracing::debug!(target: "pt-osc", ?status, "pt-online-schema-change exited");
        Ok(status.success())
    }

    fn capture(&self, args: &[String]) -> OscResult<String> {
        let (program, rest) = split_program(args)?;
        let output = Command::new(program).args(rest).output()?;
        if !output.status.success() {
            return Err(OscError::VersionQuery(format!(
                "{} exited with {}: {}",
                program,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}
