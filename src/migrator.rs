//! Running a migration through pt-online-schema-change.
//!
//! [`PtOscMigrator::migrate`] replays the migration body into a
//! [`PtOscAdapter`], then either prints the dry-run and execute command
//! lines for every touched table or runs them.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::adapter::PtOscAdapter;
use crate::command::{CommandBuilder, PerconaCommand};
use crate::config::{DatabaseConfig, RunMode};
use crate::ddl::schema::Schema;
use crate::ddl::{DdlGenerator, MysqlDdl};
use crate::error::{OscError, OscResult, Phase};
use crate::flags::{make_path_absolute, Flag, FlagOptions, FlagSpecTable};
use crate::log::OscLog;
use crate::migration::{reject_raw_sql, Direction, Migration};
use crate::output::{announcement, Output};
use crate::runner::ToolRunner;
use crate::version::{ToolVersion, VersionSource};

/// Called after a migration's ALTERs were dispatched successfully.
pub type PostMigrationHook = Box<dyn FnMut(&Migration, Direction) -> OscResult<()>>;

/// What happened to one table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableReport {
    pub table: String,
    pub alter: String,
    /// Dry-run then execute, redacted.
    pub commands: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MigrationReport {
    pub version: String,
    pub name: String,
    pub direction: Direction,
    pub run_mode: RunMode,
    pub tables: Vec<TableReport>,
    pub elapsed: Duration,
    /// The migration defines nothing for this direction.
    pub skipped: bool,
}

impl MigrationReport {
    fn skipped(migration: &Migration, direction: Direction, run_mode: RunMode) -> Self {
        Self {
            version: migration.version.clone(),
            name: migration.name.clone(),
            direction,
            run_mode,
            tables: Vec::new(),
            elapsed: Duration::ZERO,
            skipped: true,
        }
    }
}

pub struct PtOscMigrator<R, O, D = MysqlDdl> {
    config: DatabaseConfig,
    specs: FlagSpecTable,
    runner: R,
    output: O,
    version: VersionSource,
    options: FlagOptions,
    adapter: PtOscAdapter<D>,
    log: Option<OscLog>,
    cwd: Option<PathBuf>,
    hooks: Vec<PostMigrationHook>,
    /// Migration and direction whose fragments are still pending.
    pending: Option<(String, Direction)>,
}

impl<R: ToolRunner, O: Output> PtOscMigrator<R, O, MysqlDdl> {
    pub fn new(config: DatabaseConfig, runner: R, output: O) -> Self {
        Self {
            config,
            specs: FlagSpecTable::standard(),
            runner,
            output,
            version: VersionSource::default(),
            options: FlagOptions::new(),
            adapter: PtOscAdapter::new(),
            log: None,
            cwd: None,
            hooks: Vec::new(),
            pending: None,
        }
    }

    /// Column definitions used by `rename_column`.
    pub fn with_schema(self, schema: Schema) -> Self {
        self.with_ddl(MysqlDdl::with_schema(schema))
    }
}

impl<R: ToolRunner, O: Output, D: DdlGenerator> PtOscMigrator<R, O, D> {
    /// Swap the DDL generator. Pending fragments are discarded.
    pub fn with_ddl<D2: DdlGenerator>(self, ddl: D2) -> PtOscMigrator<R, O, D2> {
        PtOscMigrator {
            config: self.config,
            specs: self.specs,
            runner: self.runner,
            output: self.output,
            version: self.version,
            options: self.options,
            adapter: PtOscAdapter::with_ddl(ddl),
            log: self.log,
            cwd: self.cwd,
            hooks: self.hooks,
            pending: None,
        }
    }

    pub fn with_flag_specs(mut self, specs: FlagSpecTable) -> Self {
        self.specs = specs;
        self
    }

    /// Caller flag options; they outrank `[percona]` overrides. `execute`
    /// is always set per phase.
    pub fn with_options(mut self, options: FlagOptions) -> Self {
        self.options = options;
        self
    }

    /// Use a known tool version instead of asking the installed tool.
    pub fn with_tool_version(mut self, version: ToolVersion) -> Self {
        self.version = VersionSource::Fixed(version);
        self
    }

    /// Write log lines here instead of the configured log file.
    pub fn with_log(mut self, log: OscLog) -> Self {
        self.log = Some(log);
        self
    }

    /// Base directory for relative paths. Defaults to the process working
    /// directory, read when first needed.
    pub fn with_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    pub fn on_migrated(
        mut self,
        hook: impl FnMut(&Migration, Direction) -> OscResult<()> + 'static,
    ) -> Self {
        self.hooks.push(Box::new(hook));
        self
    }

    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    pub fn output(&self) -> &O {
        &self.output
    }

    pub fn adapter(&self) -> &PtOscAdapter<D> {
        &self.adapter
    }

    /// Direct access for hosts that issue schema calls themselves.
    pub fn adapter_mut(&mut self) -> &mut PtOscAdapter<D> {
        &mut self.adapter
    }

    /// Base directory for relative paths.
    pub fn cwd(&self) -> OscResult<PathBuf> {
        match &self.cwd {
            Some(cwd) => Ok(cwd.clone()),
            None => Ok(std::env::current_dir()?),
        }
    }

    /// Render one command line for `alter` on `database`.`table`.
    pub fn percona_command(
        &self,
        alter: &str,
        database: &str,
        table: &str,
        options: &FlagOptions,
    ) -> OscResult<PerconaCommand> {
        let cwd = self.cwd()?;
        let version = || self.version.resolve(&self.runner);
        CommandBuilder::new(&self.specs, &self.config, &cwd, &version)
            .build(alter, database, table, options)
    }

    /// Build and dispatch `migration` in `direction`.
    ///
    /// Tables whose ALTER ran (or was printed) are cleared from the
    /// accumulator; on failure the failing table and everything after it
    /// stay pending. Calling `migrate` again with the same migration and
    /// direction resumes from there instead of rebuilding the body.
    pub fn migrate(
        &mut self,
        migration: &Migration,
        direction: Direction,
    ) -> OscResult<MigrationReport> {
        let run_mode = self.config.percona.run_mode()?;

        let Some(body) = migration.commands(direction)? else {
            tracing::debug!(target: "pt-osc", %migration, %direction, "nothing to run");
            return Ok(MigrationReport::skipped(migration, direction, run_mode));
        };
        reject_raw_sql(&body)?;

        let key = (migration.version.clone(), direction);
        let resume =
            self.pending.as_ref() == Some(&key) && !self.adapter.commanded_tables().is_empty();
        if !resume && !self.adapter.commanded_tables().is_empty() {
            tracing::warn!(
                target: "pt-osc",
                tables = ?self.adapter.commanded_tables(),
                "discarding ALTERs left over from a previous migration"
            );
            self.adapter.clear();
        }
        self.pending = None;

        let verb = match direction {
            Direction::Up => "migrating",
            Direction::Down => "reverting",
        };
        self.announce(migration, verb);

        let started = Instant::now();
        if resume {
            tracing::info!(
                target: "pt-osc",
                %migration,
                tables = ?self.adapter.commanded_tables(),
                "resuming pending ALTERs"
            );
        } else {
            for command in &body {
                if let Err(e) = command.apply(&mut self.adapter) {
                    self.adapter.clear();
                    return Err(e);
                }
            }
        }

        self.pending = Some(key);
        let tables = self.dispatch(run_mode)?;
        self.pending = None;

        for hook in self.hooks.iter_mut() {
            hook(migration, direction)?;
        }

        let elapsed = started.elapsed();
        let done = match direction {
            Direction::Up => "migrated",
            Direction::Down => "reverted",
        };
        self.announce(
            migration,
            &format!("{} ({:.4}s)", done, elapsed.as_secs_f64()),
        );
        self.output.write("");

        Ok(MigrationReport {
            version: migration.version.clone(),
            name: migration.name.clone(),
            direction,
            run_mode,
            tables,
            elapsed,
            skipped: false,
        })
    }

    /// Dispatch whatever is still pending, e.g. after a failed run.
    pub fn dispatch_pending(&mut self) -> OscResult<Vec<TableReport>> {
        let run_mode = self.config.percona.run_mode()?;
        let tables = self.dispatch(run_mode)?;
        self.pending = None;
        Ok(tables)
    }

    fn dispatch(&mut self, run_mode: RunMode) -> OscResult<Vec<TableReport>> {
        let tables: Vec<String> = self.adapter.commanded_tables().to_vec();
        let mut reports = Vec::with_capacity(tables.len());
        for table in tables {
            let report = match run_mode {
                RunMode::Print => self.print_table(&table)?,
                RunMode::Execute => self.execute_table(&table)?,
            };
            self.adapter.clear_table(&table);
            reports.push(report);
        }
        Ok(reports)
    }

    fn print_table(&mut self, table: &str) -> OscResult<TableReport> {
        let database = self.config.database.clone();
        let alter = self.adapter.joined_commands_for(table);

        self.output.announce("Run the following commands:");
        let mut commands = Vec::with_capacity(Phase::ALL.len());
        for phase in Phase::ALL {
            let options = self.phase_options(phase);
            let command = self.percona_command(&alter, &database, table, &options)?;
            self.output.write(&command.line());
            commands.push(command.sanitized());
        }

        Ok(TableReport {
            table: table.to_string(),
            alter,
            commands,
        })
    }

    fn execute_table(&mut self, table: &str) -> OscResult<TableReport> {
        let database = self.config.database.clone();
        let alter = self.adapter.joined_commands_for(table);

        self.log()?
            .info(&format!("Running on {}|{}: {}", database, table, alter))?;
        self.output.announce("running pt-online-schema-change");

        let mut commands = Vec::with_capacity(Phase::ALL.len());
        for phase in Phase::ALL {
            let options = self.phase_options(phase);
            let command = self.percona_command(&alter, &database, table, &options)?;
            let sanitized = command.sanitized();
            self.log()?.info(&format!("Command is {}", sanitized))?;

            if !self.runner.run(&command)? {
                self.log()?.error(&format!(
                    "Unable to {} query on {}|{}: {}",
                    phase, database, table, alter
                ))?;
                return Err(OscError::ExternalToolFailure {
                    database,
                    table: table.to_string(),
                    phase,
                    command: sanitized,
                });
            }

            self.log()?.info(&format!(
                "Successfully {} on {}|{}: {}",
                phase.past_tense(),
                database,
                table,
                alter
            ))?;
            commands.push(sanitized);
        }

        Ok(TableReport {
            table: table.to_string(),
            alter,
            commands,
        })
    }

    fn phase_options(&self, phase: Phase) -> FlagOptions {
        self.options.clone().with(Flag::Execute, phase.is_execute())
    }

    /// Configured log, opened on first use.
    fn log(&mut self) -> OscResult<&mut OscLog> {
        if self.log.is_none() {
            let configured = self.config.percona.log_path().to_string_lossy().into_owned();
            let path = make_path_absolute(&configured, &self.cwd()?);
            self.log = Some(OscLog::open(path)?);
        }
        match self.log.as_mut() {
            Some(log) => Ok(log),
            None => Err(OscError::Configuration("log unavailable".into())),
        }
    }

    fn announce(&mut self, migration: &Migration, message: &str) {
        let line = announcement(&migration.version, &migration.name, message);
        self.output.announce(&line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::SchemaStatements;
    use crate::config::PerconaConfig;
    use crate::migration::SchemaCommand;
    use crate::output::RecordingOutput;
    use std::cell::RefCell;
    use std::rc::Rc;

    /// Records commands; fails the `fail_at`-th run (0-based).
    #[derive(Default)]
    struct StubRunner {
        runs: RefCell<Vec<PerconaCommand>>,
        fail_at: Option<usize>,
    }

    impl ToolRunner for StubRunner {
        fn run(&self, command: &PerconaCommand) -> OscResult<bool> {
            let mut runs = self.runs.borrow_mut();
            let index = runs.len();
            runs.push(command.clone());
            Ok(self.fail_at != Some(index))
        }

        fn capture(&self, _args: &[String]) -> OscResult<String> {
            Err(OscError::VersionQuery("not installed".into()))
        }
    }

    fn drop_columns(tables: &[&str]) -> Migration {
        Migration::new("20240101000000", "DropLegacy").with_up(
            tables
                .iter()
                .map(|t| SchemaCommand::RemoveColumn {
                    table: t.to_string(),
                    columns: vec!["legacy".into()],
                })
                .collect(),
        )
    }

    fn migrator(mode: RunMode, runner: StubRunner) -> PtOscMigrator<StubRunner, RecordingOutput> {
        let config = DatabaseConfig::new("app")
            .password("s3cret")
            .percona(PerconaConfig::default().with_run_mode(mode));
        PtOscMigrator::new(config, runner, RecordingOutput::new())
            .with_tool_version(ToolVersion::new(&[3, 5, 0]))
            .with_log(OscLog::discard())
            .with_cwd("/srv/app")
    }

    #[test]
    fn test_print_mode_writes_both_commands() {
        let mut m = migrator(RunMode::Print, StubRunner::default());
        let report = m.migrate(&drop_columns(&["users"]), Direction::Up).unwrap();

        assert!(m.runner().runs.borrow().is_empty());
        let written = &m.output().written;
        assert!(written[0].contains("--dry-run"));
        assert!(written[1].contains("--execute"));
        assert!(written[1].contains("--password s3cret"));
        assert_eq!(report.tables[0].commands.len(), 2);
        assert!(report.tables[0].commands[1].contains("--password _hidden_"));
        assert!(m.adapter().commanded_tables().is_empty());

        let announced = &m.output().announcements;
        assert!(announced[0].contains("DropLegacy: migrating"));
        assert_eq!(announced[1], "Run the following commands:");
        assert!(announced[2].contains("DropLegacy: migrated ("));
    }

    #[test]
    fn test_caller_options_reach_both_phases() {
        let options = FlagOptions::new()
            .with(Flag::ChunkSize, 500)
            .with(Flag::Execute, true);
        let mut m = migrator(RunMode::Execute, StubRunner::default()).with_options(options);
        m.migrate(&drop_columns(&["users"]), Direction::Up).unwrap();

        let runs = m.runner().runs.borrow();
        assert!(!runs[0].is_execute());
        assert!(runs[1].is_execute());
        assert!(runs.iter().all(|c| c.line().contains("--chunk-size 500")));
    }

    #[test]
    fn test_report_serializes_to_json() {
        let mut m = migrator(RunMode::Print, StubRunner::default());
        let report = m.migrate(&drop_columns(&["users"]), Direction::Up).unwrap();
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["direction"], "up");
        assert_eq!(json["run_mode"], "print");
        assert_eq!(json["tables"][0]["alter"], "DROP COLUMN `legacy`");
    }

    #[test]
    fn test_execute_runs_dry_run_then_execute_per_table() {
        let mut m = migrator(RunMode::Execute, StubRunner::default());
        m.migrate(&drop_columns(&["users", "orders"]), Direction::Up)
            .unwrap();

        let runs = m.runner().runs.borrow();
        let phases: Vec<(bool, bool)> = runs
            .iter()
            .map(|c| (c.is_execute(), c.args()[3].ends_with("users")))
            .collect();
        assert_eq!(
            phases,
            vec![(false, true), (true, true), (false, false), (true, false)]
        );
        assert!(m.adapter().commanded_tables().is_empty());
    }

    #[test]
    fn test_dry_run_failure_halts_and_keeps_pending() {
        let runner = StubRunner {
            fail_at: Some(0),
            ..StubRunner::default()
        };
        let mut m = migrator(RunMode::Execute, runner);
        let err = m
            .migrate(&drop_columns(&["users", "orders"]), Direction::Up)
            .unwrap_err();

        match err {
            OscError::ExternalToolFailure {
                table,
                phase,
                command,
                ..
            } => {
                assert_eq!(table, "users");
                assert_eq!(phase, Phase::DryRun);
                assert!(command.contains("_hidden_"));
                assert!(!command.contains("s3cret"));
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(m.runner().runs.borrow().len(), 1);
        assert_eq!(m.adapter().commanded_tables(), ["users", "orders"]);
    }

    #[test]
    fn test_second_table_failure_clears_only_the_first() {
        let runner = StubRunner {
            fail_at: Some(3),
            ..StubRunner::default()
        };
        let mut m = migrator(RunMode::Execute, runner);
        let err = m
            .migrate(&drop_columns(&["users", "orders", "items"]), Direction::Up)
            .unwrap_err();
        assert!(matches!(
            err,
            OscError::ExternalToolFailure {
                phase: Phase::Execute,
                ..
            }
        ));
        assert_eq!(m.adapter().commanded_tables(), ["orders", "items"]);
        assert_eq!(
            m.adapter().joined_commands_for("orders"),
            "DROP COLUMN `legacy`"
        );

        let tables = m.dispatch_pending().unwrap();
        assert_eq!(tables.len(), 2);
        assert!(m.adapter().commanded_tables().is_empty());
    }

    #[test]
    fn test_migrate_again_resumes_after_failure() {
        let runner = StubRunner {
            fail_at: Some(3),
            ..StubRunner::default()
        };
        let mut m = migrator(RunMode::Execute, runner);
        let migration = drop_columns(&["users", "orders", "items"]);
        assert!(m.migrate(&migration, Direction::Up).is_err());

        let report = m.migrate(&migration, Direction::Up).unwrap();
        let tables: Vec<&str> = report.tables.iter().map(|t| t.table.as_str()).collect();
        assert_eq!(tables, ["orders", "items"]);

        let runs = m.runner().runs.borrow();
        let targets: Vec<&str> = runs.iter().map(|c| c.args()[3].as_str()).collect();
        assert_eq!(
            targets,
            [
                "D=app,t=users",
                "D=app,t=users",
                "D=app,t=orders",
                "D=app,t=orders",
                "D=app,t=orders",
                "D=app,t=orders",
                "D=app,t=items",
                "D=app,t=items",
            ]
        );
        assert!(m.adapter().commanded_tables().is_empty());
    }

    #[test]
    fn test_other_migration_discards_pending_fragments() {
        let mut m = migrator(RunMode::Print, StubRunner::default());
        m.adapter_mut().remove_column("stale", &["gone"]).unwrap();
        let report = m.migrate(&drop_columns(&["users"]), Direction::Up).unwrap();
        assert_eq!(report.tables.len(), 1);
        assert_eq!(report.tables[0].table, "users");
        assert!(m.adapter().commanded_tables().is_empty());
    }

    #[test]
    fn test_reverting_raw_sql_change_is_unsupported() {
        let migration = Migration::new("1", "Raw").with_change(vec![
            SchemaCommand::RemoveColumn {
                table: "users".into(),
                columns: vec!["x".into()],
            },
            SchemaCommand::Execute {
                sql: "UPDATE users SET x = 1".into(),
            },
        ]);
        let mut m = migrator(RunMode::Execute, StubRunner::default());
        for direction in [Direction::Up, Direction::Down] {
            let err = m.migrate(&migration, direction).unwrap_err();
            assert!(matches!(err, OscError::UnsupportedOperation(_)), "{:?}", err);
        }
        assert!(m.runner().runs.borrow().is_empty());
        assert!(m.output().announcements.is_empty());
    }

    #[test]
    fn test_cwd_defaults_to_process_directory() {
        let m = PtOscMigrator::new(
            DatabaseConfig::new("app"),
            StubRunner::default(),
            RecordingOutput::new(),
        );
        assert_eq!(m.cwd().unwrap(), std::env::current_dir().unwrap());
        assert_eq!(
            migrator(RunMode::Print, StubRunner::default()).cwd().unwrap(),
            PathBuf::from("/srv/app")
        );
    }

    #[test]
    fn test_invalid_run_mode_fails_before_work() {
        let mut config = DatabaseConfig::new("app");
        config.percona.run_mode = Some("yolo".into());
        let mut m = PtOscMigrator::new(config, StubRunner::default(), RecordingOutput::new())
            .with_log(OscLog::discard());
        let err = m.migrate(&drop_columns(&["users"]), Direction::Up).unwrap_err();
        assert!(matches!(err, OscError::Configuration(_)));
        assert!(m.output().announcements.is_empty());
        assert!(m.adapter().commanded_tables().is_empty());
    }

    #[test]
    fn test_raw_sql_rejected_before_any_process() {
        let migration = Migration::new("1", "Raw").with_up(vec![
            SchemaCommand::RemoveColumn {
                table: "users".into(),
                columns: vec!["x".into()],
            },
            SchemaCommand::Execute {
                sql: "UPDATE users SET x = 1".into(),
            },
        ]);
        let mut m = migrator(RunMode::Execute, StubRunner::default());
        let err = m.migrate(&migration, Direction::Up).unwrap_err();
        assert!(matches!(err, OscError::UnsupportedOperation(_)));
        assert!(m.runner().runs.borrow().is_empty());
        assert!(m.adapter().commanded_tables().is_empty());
    }

    #[test]
    fn test_missing_direction_is_a_silent_noop() {
        let mut m = migrator(RunMode::Execute, StubRunner::default());
        let report = m.migrate(&drop_columns(&["users"]), Direction::Down).unwrap();
        assert!(report.skipped);
        assert!(m.output().announcements.is_empty());
        assert!(m.runner().runs.borrow().is_empty());
    }

    #[test]
    fn test_hooks_run_after_successful_dispatch() {
        let calls = Rc::new(RefCell::new(Vec::new()));
        let seen = Rc::clone(&calls);
        let mut m = migrator(RunMode::Execute, StubRunner::default()).on_migrated(
            move |migration, direction| {
                seen.borrow_mut()
                    .push(format!("{} {}", migration.version, direction));
                Ok(())
            },
        );
        m.migrate(&drop_columns(&["users"]), Direction::Up).unwrap();
        assert_eq!(*calls.borrow(), vec!["20240101000000 up".to_string()]);

        let failing = StubRunner {
            fail_at: Some(0),
            ..StubRunner::default()
        };
        let calls = Rc::new(RefCell::new(0));
        let seen = Rc::clone(&calls);
        let mut m = migrator(RunMode::Execute, failing).on_migrated(move |_, _| {
            *seen.borrow_mut() += 1;
            Ok(())
        });
        assert!(m.migrate(&drop_columns(&["users"]), Direction::Up).is_err());
        assert_eq!(*calls.borrow(), 0);
    }
}
