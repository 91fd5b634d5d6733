//! Defer blocking MySQL `ALTER TABLE` migrations to pt-online-schema-change.
//!
//! Schema calls made by a migration are captured as ALTER fragments per
//! table instead of being run. At the end of the migration the fragments
//! are joined into one `--alter` clause per table and either printed as
//! ready-to-run `pt-online-schema-change` commands or executed, dry run
//! first.
//!
//! # Example
//! ```
//! use ptosc::prelude::*;
//!
//! let mut adapter = PtOscAdapter::new();
//! adapter.add_column("users", "age", "integer", &ColumnOptions::new().null(false)).unwrap();
//! adapter.remove_column("users", &["legacy"]).unwrap();
//!
//! assert_eq!(
//!     adapter.joined_commands_for("users"),
//!     "ADD `age` int(11) NOT NULL,DROP COLUMN `legacy`"
//! );
//! ```

pub mod adapter;
pub mod command;
pub mod commands;
pub mod config;
pub mod ddl;
pub mod error;
pub mod flags;
pub mod log;
pub mod migration;
pub mod migrator;
pub mod output;
pub mod runner;
pub mod shell;
pub mod version;

pub use adapter::{PtOscAdapter, SchemaStatements};
pub use command::{CommandBuilder, PerconaCommand, PROGRAM};
pub use config::{DatabaseConfig, FlagValue, PerconaConfig, RunMode};
pub use error::{OscError, OscResult, Phase};
pub use flags::{Flag, FlagOptions, FlagSpec, FlagSpecTable, Mutator};
pub use log::{sanitize_command, OscLog};
pub use migration::{CommandRecorder, Direction, Migration, SchemaCommand};
pub use migrator::{MigrationReport, PtOscMigrator, TableReport};
pub use version::{ToolVersion, VersionRequirement};

/// Common imports.
pub mod prelude {
    pub use crate::adapter::{PtOscAdapter, SchemaStatements};
    pub use crate::config::{DatabaseConfig, PerconaConfig, RunMode};
    pub use crate::ddl::schema::{ColumnDef, Schema, TableDef};
    pub use crate::ddl::{ColumnOptions, IndexOptions};
    pub use crate::error::{OscError, OscResult};
    pub use crate::flags::{Flag, FlagOptions};
    pub use crate::migration::{Direction, Migration, SchemaCommand};
    pub use crate::migrator::PtOscMigrator;
    pub use crate::output::{ConsoleOutput, Output};
    pub use crate::runner::{SystemRunner, ToolRunner};
}
