//! MySQL DDL fragments.
//!
//! The accumulator only captures and orders ALTER fragments; the text of a
//! column definition, an index column list or a quoted identifier comes
//! from a [`DdlGenerator`]. [`MysqlDdl`] is the stock implementation.

pub mod schema;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{OscError, OscResult};
use schema::Schema;

/// Literal column default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ColumnDefault {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    /// Explicit `DEFAULT NULL`.
    #[serde(skip)]
    Null,
}

impl From<&str> for ColumnDefault {
    fn from(s: &str) -> Self {
        ColumnDefault::Text(s.to_string())
    }
}

impl From<i64> for ColumnDefault {
    fn from(i: i64) -> Self {
        ColumnDefault::Int(i)
    }
}

impl From<i32> for ColumnDefault {
    fn from(i: i32) -> Self {
        ColumnDefault::Int(i64::from(i))
    }
}

impl From<bool> for ColumnDefault {
    fn from(b: bool) -> Self {
        ColumnDefault::Bool(b)
    }
}

/// Options accepted by `add_column` and `change_column`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnOptions {
    pub default: Option<ColumnDefault>,
    pub null: Option<bool>,
    pub limit: Option<u32>,
    pub precision: Option<u32>,
    pub scale: Option<u32>,
    pub comment: Option<String>,
    pub after: Option<String>,
    pub first: bool,
}

impl ColumnOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn default_value(mut self, value: impl Into<ColumnDefault>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn null(mut self, null: bool) -> Self {
        self.null = Some(null);
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn precision(mut self, precision: u32, scale: u32) -> Self {
        self.precision = Some(precision);
        self.scale = Some(scale);
        self
    }

    pub fn after(mut self, column: &str) -> Self {
        self.after = Some(column.to_string());
        self
    }

    pub fn first(mut self) -> Self {
        self.first = true;
        self
    }

    pub fn comment(mut self, comment: &str) -> Self {
        self.comment = Some(comment.to_string());
        self
    }
}

/// Key prefix length for an index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum IndexLength {
    /// Applied to every column.
    All(u32),
    PerColumn(BTreeMap<String, u32>),
}

impl IndexLength {
    fn for_column(&self, column: &str) -> Option<u32> {
        match self {
            IndexLength::All(n) => Some(*n),
            IndexLength::PerColumn(map) => map.get(column).copied(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexOrder {
    Asc,
    Desc,
}

impl IndexOrder {
    pub fn as_sql(self) -> &'static str {
        match self {
            IndexOrder::Asc => "ASC",
            IndexOrder::Desc => "DESC",
        }
    }
}

/// Options accepted by `add_index`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexOptions {
    pub name: Option<String>,
    pub unique: bool,
    pub length: Option<IndexLength>,
    pub order: BTreeMap<String, IndexOrder>,
}

impl IndexOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn length(mut self, length: IndexLength) -> Self {
        self.length = Some(length);
        self
    }

    pub fn order(mut self, column: &str, order: IndexOrder) -> Self {
        self.order.insert(column.to_string(), order);
        self
    }
}

/// Produces the SQL text the accumulator stores.
pub trait DdlGenerator {
    fn quote_table_name(&self, name: &str) -> String;

    fn quote_column_name(&self, name: &str) -> String;

    /// Type and options of a column, e.g. `varchar(255) DEFAULT '0' NOT NULL`.
    fn column_ddl(&self, table: &str, column: &str, column_type: &str, options: &ColumnOptions) -> String;

    /// Current definition of an existing column.
    fn existing_column_ddl(&self, table: &str, column: &str) -> OscResult<String>;

    /// Parenthesized-list body of an index, e.g. `` `a`(10) DESC, `b` ``.
    fn index_columns(&self, columns: &[&str], options: &IndexOptions) -> String;

    /// Index name: explicit `name` option or `<table>_<sorted columns>_index`.
    fn index_name(&self, table: &str, columns: &[&str], options: &IndexOptions) -> String {
        match &options.name {
            Some(name) => name.clone(),
            None => default_index_name(table, columns),
        }
    }
}

/// `<table>_<sorted columns joined by _>_index`
pub fn default_index_name(table: &str, columns: &[&str]) -> String {
    let mut sorted = columns.to_vec();
    sorted.sort_unstable();
    format!("{}_{}_index", table, sorted.join("_"))
}

/// MySQL flavour of [`DdlGenerator`].
#[derive(Debug, Clone, Default)]
pub struct MysqlDdl {
    schema: Schema,
}

impl MysqlDdl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_schema(schema: Schema) -> Self {
        Self { schema }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Map a migration type name to a MySQL column type.
    pub fn native_type(&self, column_type: &str, options: &ColumnOptions) -> String {
        let limit = options.limit;
        match column_type {
            "primary_key" => "int(11) auto_increment PRIMARY KEY".to_string(),
            "string" => format!("varchar({})", limit.unwrap_or(255)),
            "text" => "text".to_string(),
            "integer" => match limit {
                Some(1) => "tinyint".to_string(),
                Some(2) => "smallint".to_string(),
                Some(3) => "mediumint".to_string(),
                None | Some(4) => "int(11)".to_string(),
                Some(5..=8) => "bigint".to_string(),
                Some(n) => format!("int({})", n),
            },
            "bigint" => "bigint".to_string(),
            "float" => "float".to_string(),
            "decimal" => match (options.precision, options.scale) {
                (Some(p), Some(s)) => format!("decimal({},{})", p, s),
                (Some(p), None) => format!("decimal({})", p),
                _ => "decimal".to_string(),
            },
            "datetime" => "datetime".to_string(),
            "timestamp" => "timestamp".to_string(),
            "time" => "time".to_string(),
            "date" => "date".to_string(),
            "binary" => "blob".to_string(),
            "boolean" => "tinyint(1)".to_string(),
            "json" => "json".to_string(),
            other => match limit {
                Some(n) => format!("{}({})", other, n),
                None => other.to_string(),
            },
        }
    }

    fn quote_default(&self, value: &ColumnDefault, sql_type: &str) -> String {
        let numeric = is_numeric_type(sql_type);
        match value {
            ColumnDefault::Null => "NULL".to_string(),
            ColumnDefault::Bool(b) => {
                let n = if *b { "1" } else { "0" };
                if numeric { n.to_string() } else { quote_string(n) }
            }
            ColumnDefault::Int(i) if numeric => i.to_string(),
            ColumnDefault::Float(f) if numeric => f.to_string(),
            ColumnDefault::Int(i) => quote_string(&i.to_string()),
            ColumnDefault::Float(f) => quote_string(&f.to_string()),
            ColumnDefault::Text(s) if numeric && s.parse::<f64>().is_ok() => s.clone(),
            ColumnDefault::Text(s) => quote_string(s),
        }
    }
}

fn is_numeric_type(sql_type: &str) -> bool {
    let lower = sql_type.to_ascii_lowercase();
    [
        "tinyint", "smallint", "mediumint", "int", "bigint", "float", "double", "decimal",
        "numeric", "bit",
    ]
    .iter()
    .any(|prefix| lower.starts_with(prefix))
}

/// Single-quoted SQL string literal with MySQL escaping.
pub fn quote_string(s: &str) -> String {
    format!("'{}'", s.replace('\\', "\\\\").replace('\'', "''"))
}

impl DdlGenerator for MysqlDdl {
    fn quote_table_name(&self, name: &str) -> String {
        name.split('.')
            .map(|part| self.quote_column_name(part))
            .collect::<Vec<_>>()
            .join(".")
    }

    fn quote_column_name(&self, name: &str) -> String {
        format!("`{}`", name.replace('`', "``"))
    }

    fn column_ddl(&self, _table: &str, _column: &str, column_type: &str, options: &ColumnOptions) -> String {
        let sql_type = self.native_type(column_type, options);
        let mut sql = sql_type.clone();
        if let Some(default) = &options.default {
            sql.push_str(" DEFAULT ");
            sql.push_str(&self.quote_default(default, &sql_type));
        }
        if options.null == Some(false) {
            sql.push_str(" NOT NULL");
        }
        if let Some(comment) = &options.comment {
            sql.push_str(" COMMENT ");
            sql.push_str(&quote_string(comment));
        }
        if options.first {
            sql.push_str(" FIRST");
        } else if let Some(after) = &options.after {
            sql.push_str(" AFTER ");
            sql.push_str(&self.quote_column_name(after));
        }
        sql
    }

    fn existing_column_ddl(&self, table: &str, column: &str) -> OscResult<String> {
        let def = self
            .schema
            .column(table, column)
            .ok_or_else(|| OscError::UnknownColumn {
                table: table.to_string(),
                column: column.to_string(),
            })?;

        let mut sql = def.sql_type.clone();
        match &def.default {
            Some(value) => {
                sql.push_str(" DEFAULT ");
                sql.push_str(&self.quote_default(&ColumnDefault::Text(value.clone()), &def.sql_type));
            }
            None if def.nullable => sql.push_str(" DEFAULT NULL"),
            None => {}
        }
        if !def.nullable {
            sql.push_str(" NOT NULL");
        }
        Ok(sql)
    }

    fn index_columns(&self, columns: &[&str], options: &IndexOptions) -> String {
        columns
            .iter()
            .map(|column| {
                let mut part = self.quote_column_name(column);
                if let Some(n) = options.length.as_ref().and_then(|l| l.for_column(column)) {
                    part.push_str(&format!("({})", n));
                }
                if let Some(order) = options.order.get(*column) {
                    part.push(' ');
                    part.push_str(order.as_sql());
                }
                part
            })
            .collect::<Vec<_>>()
            .join(", ")
    }
}
