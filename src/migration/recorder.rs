//! Records schema calls so a `change` body can be played backwards.

use crate::adapter::SchemaStatements;
use crate::ddl::{ColumnOptions, DdlGenerator, IndexOptions, MysqlDdl};
use crate::error::{OscError, OscResult};

use super::SchemaCommand;

/// A [`SchemaStatements`] sink that keeps every call as a [`SchemaCommand`].
#[derive(Debug, Clone, Default)]
pub struct CommandRecorder {
    commands: Vec<SchemaCommand>,
}

impl CommandRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn commands(&self) -> &[SchemaCommand] {
        &self.commands
    }

    pub fn into_commands(self) -> Vec<SchemaCommand> {
        self.commands
    }

    /// The recorded calls undone, last call first.
    ///
    /// Fails on the first call that has no inverse.
    pub fn inverse(&self) -> OscResult<Vec<SchemaCommand>> {
        self.commands.iter().rev().map(invert).collect()
    }
}

fn invert(command: &SchemaCommand) -> OscResult<SchemaCommand> {
    match command {
        SchemaCommand::RenameTable { table, new_name } => Ok(SchemaCommand::RenameTable {
            table: new_name.clone(),
            new_name: table.clone(),
        }),
        SchemaCommand::AddColumn { table, column, .. } => Ok(SchemaCommand::RemoveColumn {
            table: table.clone(),
            columns: vec![column.clone()],
        }),
        SchemaCommand::RenameColumn {
            table,
            column,
            new_column,
        } => Ok(SchemaCommand::RenameColumn {
            table: table.clone(),
            column: new_column.clone(),
            new_column: column.clone(),
        }),
        SchemaCommand::AddIndex {
            table,
            columns,
            options,
        } => {
            let columns: Vec<&str> = columns.iter().map(String::as_str).collect();
            Ok(SchemaCommand::RemoveIndex {
                table: table.clone(),
                name: Some(MysqlDdl::new().index_name(table, &columns, options)),
                columns: Vec::new(),
            })
        }
        other => Err(OscError::Irreversible(other.op_name().to_string())),
    }
}

impl SchemaStatements for CommandRecorder {
    fn rename_table(&mut self, table: &str, new_name: &str) -> OscResult<()> {
        self.commands.push(SchemaCommand::RenameTable {
            table: table.to_string(),
            new_name: new_name.to_string(),
        });
        Ok(())
    }

    fn add_column(
        &mut self,
        table: &str,
        column: &str,
        column_type: &str,
        options: &ColumnOptions,
    ) -> OscResult<()> {
        self.commands.push(SchemaCommand::AddColumn {
            table: table.to_string(),
            column: column.to_string(),
            column_type: column_type.to_string(),
            options: options.clone(),
        });
        Ok(())
    }

    fn change_column(
        &mut self,
        table: &str,
        column: &str,
        column_type: &str,
        options: &ColumnOptions,
    ) -> OscResult<()> {
        self.commands.push(SchemaCommand::ChangeColumn {
            table: table.to_string(),
            column: column.to_string(),
            column_type: column_type.to_string(),
            options: options.clone(),
        });
        Ok(())
    }

    fn rename_column(&mut self, table: &str, column: &str, new_column: &str) -> OscResult<()> {
        self.commands.push(SchemaCommand::RenameColumn {
            table: table.to_string(),
            column: column.to_string(),
            new_column: new_column.to_string(),
        });
        Ok(())
    }

    fn remove_column(&mut self, table: &str, columns: &[&str]) -> OscResult<()> {
        self.commands.push(SchemaCommand::RemoveColumn {
            table: table.to_string(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
        });
        Ok(())
    }

    fn add_index(&mut self, table: &str, columns: &[&str], options: &IndexOptions) -> OscResult<()> {
        self.commands.push(SchemaCommand::AddIndex {
            table: table.to_string(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
            options: options.clone(),
        });
        Ok(())
    }

    fn remove_index(&mut self, table: &str, index_name: &str) -> OscResult<()> {
        self.commands.push(SchemaCommand::RemoveIndex {
            table: table.to_string(),
            name: Some(index_name.to_string()),
            columns: Vec::new(),
        });
        Ok(())
    }

    fn execute(&mut self, sql: &str) -> OscResult<()> {
        self.commands.push(SchemaCommand::Execute {
            sql: sql.to_string(),
        });
        Ok(())
    }
}
