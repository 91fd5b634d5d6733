//! Rendering pt-online-schema-change command lines.
//!
//! A command is built as a list of argument tokens and only joined into a
//! shell line for display, so values with spaces or quotes always reach
//! the tool as single arguments.

use std::fmt;
use std::path::Path;

use crate::config::{DatabaseConfig, FlagValue};
use crate::error::OscResult;
use crate::flags::{Flag, FlagOptions, FlagSpecTable, MutatorContext};
use crate::log::redact_args;
use crate::shell;
use crate::version::ToolVersion;

pub const PROGRAM: &str = "pt-online-schema-change";

/// One rendered invocation of the tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PerconaCommand {
    args: Vec<String>,
    execute: bool,
    secret_flags: Vec<String>,
}

impl PerconaCommand {
    /// Wrap a pre-built argv. `--password` is treated as secret.
    pub fn from_args(args: Vec<String>) -> Self {
        let execute = args.iter().any(|a| a == "--execute");
        Self {
            args,
            execute,
            secret_flags: vec![format!("--{}", Flag::Password)],
        }
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// `true` for the real run, `false` for the dry run.
    pub fn is_execute(&self) -> bool {
        self.execute
    }

    /// Shell line with every token escaped. Contains secrets.
    pub fn line(&self) -> String {
        shell::join(&self.args)
    }

    /// Shell line with secret flag values replaced.
    pub fn sanitized(&self) -> String {
        let secrets: Vec<&str> = self.secret_flags.iter().map(String::as_str).collect();
        shell::join(&redact_args(&self.args, &secrets))
    }
}

impl fmt::Display for PerconaCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.sanitized())
    }
}

/// Resolves options and renders command lines for one database config.
///
/// Caller options outrank `[percona]` overrides, which outrank flag
/// defaults. Flags outside `specs` are never rendered.
pub struct CommandBuilder<'a> {
    specs: &'a FlagSpecTable,
    config: &'a DatabaseConfig,
    cwd: &'a Path,
    version: &'a dyn Fn() -> OscResult<ToolVersion>,
}

impl<'a> CommandBuilder<'a> {
    /// `version` is only called when a version-gated flag has something
    /// to render.
    pub fn new(
        specs: &'a FlagSpecTable,
        config: &'a DatabaseConfig,
        cwd: &'a Path,
        version: &'a dyn Fn() -> OscResult<ToolVersion>,
    ) -> Self {
        Self {
            specs,
            config,
            cwd,
            version,
        }
    }

    /// Merge caller options with config overrides and defaults.
    pub fn resolve_options(&self, options: &FlagOptions) -> FlagOptions {
        let mut resolved = self.specs.whitelist(options);
        for (flag, value) in self.config.percona.flag_overrides(self.specs).iter() {
            if !resolved.contains(flag) {
                resolved.set(flag, value.clone());
            }
        }
        for (flag, spec) in self.specs.iter() {
            if resolved.contains(flag) {
                continue;
            }
            if let Some(default) = &spec.default {
                resolved.set(flag, default.clone());
            }
        }
        resolved
    }

    /// Render the command for `alter` on `database`.`table`.
    pub fn build(
        &self,
        alter: &str,
        database: &str,
        table: &str,
        options: &FlagOptions,
    ) -> OscResult<PerconaCommand> {
        let resolved = self.resolve_options(options);
        let execute = resolved.is_execute();

        let mut args = vec![
            PROGRAM.to_string(),
            "--alter".to_string(),
            alter.to_string(),
            format!("D={},t={}", database, table),
            if execute { "--execute" } else { "--dry-run" }.to_string(),
        ];

        let mut version: Option<ToolVersion> = None;
        for (flag, spec) in self.specs.iter() {
            if flag == Flag::Execute {
                continue;
            }
            let value = resolved.get(flag).cloned();
            if value.is_none() && spec.mutator.is_none() {
                continue;
            }

            if let Some(requirement) = &spec.version {
                let installed = match &version {
                    Some(v) => v.clone(),
                    None => {
                        let v = (self.version)()?;
                        version = Some(v.clone());
                        v
                    }
                };
                if !requirement.is_satisfied_by(&installed) {
                    tracing::debug!(
                        target: "pt-osc",
                        %flag, %requirement, %installed,
                        "skipping flag unsupported by installed tool"
                    );
                    continue;
                }
            }

            let value = match &spec.mutator {
                Some(mutator) => {
                    let ctx = MutatorContext {
                        flag,
                        spec,
                        options: &resolved,
                        config: self.config,
                        cwd: self.cwd,
                    };
                    mutator.apply(value, &ctx)
                }
                None => value,
            };
            let Some(value) = value else {
                continue;
            };

            if spec.boolean {
                args.push(boolean_flag(flag, &value));
            } else {
                args.push(format!("--{}", flag));
                args.push(value.to_string());
            }
        }

        let secret_flags = self
            .specs
            .secret_flags()
            .map(|flag| format!("--{}", flag))
            .collect();
        Ok(PerconaCommand {
            args,
            execute,
            secret_flags,
        })
    }
}

fn boolean_flag(flag: Flag, value: &FlagValue) -> String {
    if value.is_truthy() {
        format!("--{}", flag)
    } else {
        format!("--no-{}", flag)
    }
}
