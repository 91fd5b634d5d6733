//! Error types for the pt-osc migration engine.

use thiserror::Error;

/// Errors raised while accumulating, rendering or dispatching ALTER commands.
#[derive(Debug, Error)]
pub enum OscError {
    /// Invalid or missing configuration (e.g. an unknown `run_mode`).
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Operation that cannot be deferred to pt-online-schema-change.
    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    /// A schema call was made with arguments it cannot work with.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// pt-online-schema-change exited unsuccessfully.
    ///
    /// `command` is always the redacted command line.
    #[error("Unable to {phase} query on {database}|{table}: {command}")]
    ExternalToolFailure {
        database: String,
        table: String,
        phase: Phase,
        command: String,
    },

    /// The tool could not be invoked to report its version.
    #[error("Unable to query tool version: {0}")]
    VersionQuery(String),

    /// A version or version requirement could not be parsed.
    #[error("Invalid version: {0}")]
    VersionParse(String),

    /// A `change` body contains a command with no inverse.
    #[error("Irreversible migration: {0}")]
    Irreversible(String),

    /// A column was referenced that the schema does not know about.
    #[error("Unknown column {table}.{column}")]
    UnknownColumn { table: String, column: String },

    /// Unbalanced quoting while splitting a command line.
    #[error("Shell tokenizing error: {0}")]
    Shell(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Which of the two pt-online-schema-change invocations a table is in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    DryRun,
    Execute,
}

impl Phase {
    /// Both phases in dispatch order.
    pub const ALL: [Phase; 2] = [Phase::DryRun, Phase::Execute];

    pub fn is_execute(self) -> bool {
        self == Phase::Execute
    }

    /// Past tense used in success log lines.
    pub fn past_tense(self) -> &'static str {
        match self {
            Phase::DryRun => "dry ran",
            Phase::Execute => "executed",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::DryRun => write!(f, "dry run"),
            Phase::Execute => write!(f, "execute"),
        }
    }
}

/// Result type for engine operations.
pub type OscResult<T> = Result<T, OscError>;
