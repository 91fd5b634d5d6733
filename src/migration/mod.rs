//! Migration definitions.
//!
//! A migration body is a replayable log of [`SchemaCommand`]s. Bodies are
//! written as TOML:
//!
//! ```toml
//! version = "20240101120000"
//! name = "AddAgeToUsers"
//!
//! [[change]]
//! op = "add_column"
//! table = "users"
//! column = "age"
//! type = "integer"
//! options = { null = false, default = 0 }
//! ```
//!
//! `change` bodies are reverted automatically; `up`/`down` pairs are
//! replayed as written.

mod recorder;

pub use recorder::CommandRecorder;

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::adapter::SchemaStatements;
use crate::ddl::{default_index_name, ColumnOptions, IndexOptions};
use crate::error::{OscError, OscResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Up => write!(f, "up"),
            Direction::Down => write!(f, "down"),
        }
    }
}

/// One recorded schema operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum SchemaCommand {
    RenameTable {
        table: String,
        new_name: String,
    },
    AddColumn {
        table: String,
        column: String,
        #[serde(rename = "type")]
        column_type: String,
        #[serde(default)]
        options: ColumnOptions,
    },
    ChangeColumn {
        table: String,
        column: String,
        #[serde(rename = "type")]
        column_type: String,
        #[serde(default)]
        options: ColumnOptions,
    },
    RenameColumn {
        table: String,
        column: String,
        new_column: String,
    },
    RemoveColumn {
        table: String,
        columns: Vec<String>,
    },
    AddIndex {
        table: String,
        columns: Vec<String>,
        #[serde(default)]
        options: IndexOptions,
    },
    /// Drop by explicit `name`, or by the default name for `columns`.
    RemoveIndex {
        table: String,
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        columns: Vec<String>,
    },
    Execute {
        sql: String,
    },
}

fn as_strs(values: &[String]) -> Vec<&str> {
    values.iter().map(String::as_str).collect()
}

impl SchemaCommand {
    /// Replay this command against `target`.
    pub fn apply(&self, target: &mut dyn SchemaStatements) -> OscResult<()> {
        match self {
            SchemaCommand::RenameTable { table, new_name } => target.rename_table(table, new_name),
            SchemaCommand::AddColumn {
                table,
                column,
                column_type,
                options,
            } => target.add_column(table, column, column_type, options),
            SchemaCommand::ChangeColumn {
                table,
                column,
                column_type,
                options,
            } => target.change_column(table, column, column_type, options),
            SchemaCommand::RenameColumn {
                table,
                column,
                new_column,
            } => target.rename_column(table, column, new_column),
            SchemaCommand::RemoveColumn { table, columns } => {
                target.remove_column(table, &as_strs(columns))
            }
            SchemaCommand::AddIndex {
                table,
                columns,
                options,
            } => target.add_index(table, &as_strs(columns), options),
            SchemaCommand::RemoveIndex { .. } => {
                let (table, name) = self.index_to_remove()?;
                target.remove_index(table, &name)
            }
            SchemaCommand::Execute { sql } => target.execute(sql),
        }
    }

    /// Table and resolved index name of a `remove_index`.
    fn index_to_remove(&self) -> OscResult<(&str, String)> {
        match self {
            SchemaCommand::RemoveIndex {
                table,
                name: Some(name),
                ..
            } => Ok((table, name.clone())),
            SchemaCommand::RemoveIndex { table, columns, .. } if !columns.is_empty() => {
                Ok((table, default_index_name(table, &as_strs(columns))))
            }
            SchemaCommand::RemoveIndex { table, .. } => Err(OscError::InvalidArgument(format!(
                "remove_index on {} needs a name or columns",
                table
            ))),
            other => Err(OscError::InvalidArgument(format!(
                "{} is not a remove_index",
                other.op_name()
            ))),
        }
    }

    pub fn op_name(&self) -> &'static str {
        match self {
            SchemaCommand::RenameTable { .. } => "rename_table",
            SchemaCommand::AddColumn { .. } => "add_column",
            SchemaCommand::ChangeColumn { .. } => "change_column",
            SchemaCommand::RenameColumn { .. } => "rename_column",
            SchemaCommand::RemoveColumn { .. } => "remove_column",
            SchemaCommand::AddIndex { .. } => "add_index",
            SchemaCommand::RemoveIndex { .. } => "remove_index",
            SchemaCommand::Execute { .. } => "execute",
        }
    }

    pub fn is_raw_sql(&self) -> bool {
        matches!(self, SchemaCommand::Execute { .. })
    }
}

/// A versioned migration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Migration {
    pub version: String,
    pub name: String,
    /// Reversible body.
    #[serde(default)]
    pub change: Option<Vec<SchemaCommand>>,
    #[serde(default)]
    pub up: Option<Vec<SchemaCommand>>,
    #[serde(default)]
    pub down: Option<Vec<SchemaCommand>>,
}

impl Migration {
    pub fn new(version: &str, name: &str) -> Self {
        Self {
            version: version.to_string(),
            name: name.to_string(),
            ..Self::default()
        }
    }

    pub fn with_change(mut self, commands: Vec<SchemaCommand>) -> Self {
        self.change = Some(commands);
        self
    }

    pub fn with_up(mut self, commands: Vec<SchemaCommand>) -> Self {
        self.up = Some(commands);
        self
    }

    pub fn with_down(mut self, commands: Vec<SchemaCommand>) -> Self {
        self.down = Some(commands);
        self
    }

    pub fn from_toml(content: &str) -> OscResult<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn load(path: impl AsRef<Path>) -> OscResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            OscError::Configuration(format!("Failed to read migration {}: {}", path.display(), e))
        })?;
        Self::from_toml(&content)
    }

    /// The body to replay for `direction`, or `None` when the migration
    /// defines nothing for it.
    ///
    /// `change` wins over `up`/`down`; going down it is inverted.
    pub fn commands(&self, direction: Direction) -> OscResult<Option<Vec<SchemaCommand>>> {
        match (direction, &self.change) {
            (Direction::Up, Some(change)) => Ok(Some(change.clone())),
            (Direction::Down, Some(change)) => {
                reject_raw_sql(change)?;
                let mut recorder = CommandRecorder::new();
                for command in change {
                    command.apply(&mut recorder)?;
                }
                recorder.inverse().map(Some)
            }
            (Direction::Up, None) => Ok(self.up.clone()),
            (Direction::Down, None) => Ok(self.down.clone()),
        }
    }
}

/// Raw SQL cannot go through pt-online-schema-change.
pub fn reject_raw_sql(commands: &[SchemaCommand]) -> OscResult<()> {
    match commands.iter().find(|c| c.is_raw_sql()) {
        Some(raw) => Err(OscError::UnsupportedOperation(format!(
            "{} cannot run through pt-online-schema-change",
            raw.op_name()
        ))),
        None => Ok(()),
    }
}

impl fmt::Display for Migration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.version, self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::PtOscAdapter;

    const MIGRATION: &str = r#"
version = "20240101120000"
name = "TidyUsers"

[[change]]
op = "add_column"
table = "users"
column = "age"
type = "integer"
options = { null = false, default = 0 }

[[change]]
op = "add_index"
table = "users"
columns = ["age", "email"]
options = { unique = true }

[[change]]
op = "rename_table"
table = "users"
new_name = "people"
"#;

    #[test]
    fn test_parse_migration_file() {
        let m = Migration::from_toml(MIGRATION).unwrap();
        assert_eq!(m.to_string(), "20240101120000 TidyUsers");
        let change = m.change.as_ref().unwrap();
        assert_eq!(change.len(), 3);
        assert_eq!(change[0].op_name(), "add_column");
        match &change[1] {
            SchemaCommand::AddIndex { options, .. } => assert!(options.unique),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_up_replays_change_in_order() {
        let m = Migration::from_toml(MIGRATION).unwrap();
        let mut adapter = PtOscAdapter::new();
        for command in m.commands(Direction::Up).unwrap().unwrap() {
            command.apply(&mut adapter).unwrap();
        }
        assert_eq!(
            adapter.commands_for("users"),
            [
                "ADD `age` int(11) DEFAULT 0 NOT NULL",
                "ADD UNIQUE INDEX `users_age_email_index` (`age`, `email`)",
                "RENAME TO `people`",
            ]
        );
    }

    #[test]
    fn test_down_inverts_change() {
        let m = Migration::from_toml(MIGRATION).unwrap();
        let down = m.commands(Direction::Down).unwrap().unwrap();
        assert_eq!(
            down,
            vec![
                SchemaCommand::RenameTable {
                    table: "people".into(),
                    new_name: "users".into()
                },
                SchemaCommand::RemoveIndex {
                    table: "users".into(),
                    name: Some("users_age_email_index".into()),
                    columns: vec![],
                },
                SchemaCommand::RemoveColumn {
                    table: "users".into(),
                    columns: vec!["age".into()]
                },
            ]
        );
    }

    #[test]
    fn test_missing_direction_is_none() {
        let m = Migration::new("1", "UpOnly").with_up(vec![SchemaCommand::RemoveColumn {
            table: "t".into(),
            columns: vec!["c".into()],
        }]);
        assert!(m.commands(Direction::Up).unwrap().is_some());
        assert!(m.commands(Direction::Down).unwrap().is_none());
    }

    #[test]
    fn test_remove_index_by_columns() {
        let mut adapter = PtOscAdapter::new();
        SchemaCommand::RemoveIndex {
            table: "accounts".into(),
            name: None,
            columns: vec!["party_id".into(), "branch_id".into()],
        }
        .apply(&mut adapter)
        .unwrap();
        assert_eq!(
            adapter.commands_for("accounts"),
            ["DROP INDEX `accounts_branch_id_party_id_index`"]
        );

        let bad = SchemaCommand::RemoveIndex {
            table: "accounts".into(),
            name: None,
            columns: vec![],
        };
        assert!(matches!(
            bad.apply(&mut adapter),
            Err(OscError::InvalidArgument(_))
        ));
    }
}
