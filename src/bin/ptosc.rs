//! ptosc - run MySQL migrations through pt-online-schema-change.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow, bail};
use clap::{Parser, Subcommand};
use colored::*;
use tracing_subscriber::EnvFilter;

use ptosc::config::DEFAULT_CONFIG_PATH;
use ptosc::ddl::schema::Schema;
use ptosc::output::ConsoleOutput;
use ptosc::runner::SystemRunner;
use ptosc::version::tool_version;
use ptosc::{
    DatabaseConfig, Direction, Flag, FlagOptions, FlagValue, Migration, PtOscMigrator, RunMode,
    sanitize_command,
};

#[derive(Parser, Debug)]
#[command(name = "ptosc")]
#[command(version, about = "Defer blocking ALTER TABLE migrations to pt-online-schema-change", long_about = None)]
struct Cli {
    /// Database config file
    #[arg(long, global = true, env = "PTOSC_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Override `percona.run_mode` (print or execute)
    #[arg(long, global = true)]
    run_mode: Option<String>,

    /// Pass a pt-online-schema-change flag, e.g. `--set chunk-size=500`
    #[arg(long = "set", value_name = "FLAG=VALUE", global = true)]
    set: Vec<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a migration file
    Migrate {
        /// Migration TOML file
        file: PathBuf,

        /// Revert instead of apply
        #[arg(long)]
        down: bool,

        /// Known column definitions, needed by rename_column
        #[arg(long)]
        schema: Option<PathBuf>,

        /// Print the migration report as JSON; command lines go to stderr
        #[arg(long)]
        json: bool,
    },
    /// Print the command line for one ALTER clause
    Render {
        #[arg(long)]
        table: String,

        #[arg(long)]
        alter: String,

        /// Render the real run instead of the dry run
        #[arg(long)]
        execute: bool,
    },
    /// Show the installed pt-online-schema-change version
    ToolVersion,
    /// Redact secrets from a command line
    Sanitize { command: String },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(Cli::parse()) {
        eprintln!("{} {:#}", "error:".red().bold(), e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    match &cli.command {
        Commands::Migrate {
            file,
            down,
            schema,
            json,
        } => migrate(&cli, file, *down, schema.as_deref(), *json),
        Commands::Render {
            table,
            alter,
            execute,
        } => render(&cli, table, alter, *execute),
        Commands::ToolVersion => {
            let version = tool_version(&SystemRunner::new())?;
            println!("{} {}", "pt-online-schema-change".cyan(), version);
            Ok(())
        }
        Commands::Sanitize { command } => {
            println!("{}", sanitize_command(command));
            Ok(())
        }
    }
}

fn load_config(cli: &Cli) -> Result<DatabaseConfig> {
    let mut config = DatabaseConfig::load(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    if let Some(mode) = &cli.run_mode {
        let mode: RunMode = mode.parse()?;
        config.percona = config.percona.with_run_mode(mode);
    }
    Ok(config)
}

fn caller_options(cli: &Cli) -> Result<FlagOptions> {
    let mut options = FlagOptions::new();
    for pair in &cli.set {
        let (key, value) = pair
            .split_once('=')
            .ok_or_else(|| anyhow!("expected FLAG=VALUE, got '{}'", pair))?;
        let flag: Flag = key.parse().map_err(|e: String| anyhow!(e))?;
        options.set(flag, FlagValue::parse(value));
    }
    Ok(options)
}

fn migrate(
    cli: &Cli,
    file: &Path,
    down: bool,
    schema: Option<&Path>,
    json: bool,
) -> Result<()> {
    let config = load_config(cli)?;
    let migration =
        Migration::load(file).with_context(|| format!("loading migration {}", file.display()))?;
    let direction = if down { Direction::Down } else { Direction::Up };

    let output = if json {
        ConsoleOutput::new().quiet()
    } else {
        ConsoleOutput::new()
    };
    let mut migrator =
        PtOscMigrator::new(config, SystemRunner::new(), output).with_options(caller_options(cli)?);
    if let Some(path) = schema {
        let schema =
            Schema::load(path).with_context(|| format!("loading schema {}", path.display()))?;
        migrator = migrator.with_schema(schema);
    }

    let report = migrator.migrate(&migration, direction)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else if report.skipped {
        println!("{} {} has no {} body", "Skipped:".yellow(), migration, direction);
    } else if report.run_mode == RunMode::Execute {
        println!(
            "{} {} table(s) altered",
            "✓".green(),
            report.tables.len()
        );
    }
    Ok(())
}

fn render(cli: &Cli, table: &str, alter: &str, execute: bool) -> Result<()> {
    if alter.trim().is_empty() {
        bail!("--alter must not be empty");
    }
    let config = load_config(cli)?;
    let database = config.database.clone();
    let migrator = PtOscMigrator::new(config, SystemRunner::new(), ConsoleOutput::new());
    let options = caller_options(cli)?.with(Flag::Execute, execute);
    let command = migrator.percona_command(alter, &database, table, &options)?;
    println!("{}", command.line());
    Ok(())
}
