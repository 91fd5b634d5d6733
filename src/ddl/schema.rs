//! Known table definitions for DDL generation.
//!
//! `rename_column` must restate a column's current definition, so the
//! generator needs to know it. Definitions are supplied up front instead
//! of being read from a live database.
//!
//! # Example
//! ```
//! use ptosc::ddl::schema::Schema;
//!
//! let toml = r#"
//! [[tables]]
//! name = "users"
//! columns = [
//!     { name = "id", type = "int(11)", nullable = false },
//!     { name = "email", type = "varchar(255)" },
//! ]
//! "#;
//!
//! let schema = Schema::from_toml(toml).unwrap();
//! assert!(schema.column("users", "email").is_some());
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{OscError, OscResult};

/// Known tables.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    #[serde(default)]
    pub tables: Vec<TableDef>,
}

/// Table definition with columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableDef {
    pub name: String,
    #[serde(default)]
    pub columns: Vec<ColumnDef>,
}

/// Column as it currently exists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDef {
    pub name: String,
    /// Full SQL type, e.g. `varchar(255)`.
    #[serde(rename = "type", alias = "typ")]
    pub sql_type: String,
    #[serde(default = "default_nullable")]
    pub nullable: bool,
    #[serde(default)]
    pub default: Option<String>,
}

fn default_nullable() -> bool {
    true
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_table(&mut self, table: TableDef) {
        self.tables.retain(|t| t.name != table.name);
        self.tables.push(table);
    }

    /// Builder form of [`Schema::add_table`].
    pub fn table(mut self, table: TableDef) -> Self {
        self.add_table(table);
        self
    }

    pub fn column(&self, table: &str, column: &str) -> Option<&ColumnDef> {
        self.tables
            .iter()
            .find(|t| t.name == table)
            .and_then(|t| t.columns.iter().find(|c| c.name == column))
    }

    pub fn from_toml(content: &str) -> OscResult<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn load(path: impl AsRef<Path>) -> OscResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            OscError::Configuration(format!("Failed to read schema {}: {}", path.display(), e))
        })?;
        Self::from_toml(&content)
    }
}

impl TableDef {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            columns: Vec::new(),
        }
    }

    /// Builder: add a nullable column with no default.
    pub fn column(mut self, name: &str, sql_type: &str) -> Self {
        self.columns.push(ColumnDef::new(name, sql_type));
        self
    }

    /// Builder: add a fully specified column.
    pub fn with(mut self, column: ColumnDef) -> Self {
        self.columns.push(column);
        self
    }
}

impl ColumnDef {
    pub fn new(name: &str, sql_type: &str) -> Self {
        Self {
            name: name.to_string(),
            sql_type: sql_type.to_string(),
            nullable: true,
            default: None,
        }
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn default(mut self, value: &str) -> Self {
        self.default = Some(value.to_string());
        self
    }
}
