//! Schema-mutation interception.
//!
//! [`SchemaStatements`] is the surface a migration body talks to. The
//! [`PtOscAdapter`] implements it by turning every call into an ALTER
//! fragment for pt-online-schema-change instead of touching the database.

use crate::commands::CommandSet;
use crate::ddl::{ColumnOptions, DdlGenerator, IndexOptions, MysqlDdl};
use crate::error::{OscError, OscResult};

/// Schema operations a migration body may issue.
pub trait SchemaStatements {
    fn rename_table(&mut self, table: &str, new_name: &str) -> OscResult<()>;

    fn add_column(
        &mut self,
        table: &str,
        column: &str,
        column_type: &str,
        options: &ColumnOptions,
    ) -> OscResult<()>;

    fn change_column(
        &mut self,
        table: &str,
        column: &str,
        column_type: &str,
        options: &ColumnOptions,
    ) -> OscResult<()>;

    fn rename_column(&mut self, table: &str, column: &str, new_column: &str) -> OscResult<()>;

    /// Remove one or more columns.
    fn remove_column(&mut self, table: &str, columns: &[&str]) -> OscResult<()>;

    fn add_index(&mut self, table: &str, columns: &[&str], options: &IndexOptions) -> OscResult<()>;

    fn remove_index(&mut self, table: &str, index_name: &str) -> OscResult<()>;

    /// Raw SQL.
    fn execute(&mut self, sql: &str) -> OscResult<()>;
}

/// Accumulates ALTER fragments per table.
#[derive(Debug, Clone, Default)]
pub struct PtOscAdapter<D = MysqlDdl> {
    ddl: D,
    commands: CommandSet,
}

impl PtOscAdapter<MysqlDdl> {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<D: DdlGenerator> PtOscAdapter<D> {
    pub fn with_ddl(ddl: D) -> Self {
        Self {
            ddl,
            commands: CommandSet::new(),
        }
    }

    pub fn ddl(&self) -> &D {
        &self.ddl
    }

    pub fn commands(&self) -> &CommandSet {
        &self.commands
    }

    pub fn commands_for(&self, table: &str) -> &[String] {
        self.commands.commands_for(table)
    }

    pub fn joined_commands_for(&self, table: &str) -> String {
        self.commands.joined_commands_for(table)
    }

    pub fn commanded_tables(&self) -> &[String] {
        self.commands.commanded_tables()
    }

    /// Forget a single table once its ALTER has been applied.
    pub fn clear_table(&mut self, table: &str) {
        self.commands.remove(table);
    }

    pub fn clear(&mut self) {
        self.commands.clear();
    }

    fn add_command(&mut self, table: &str, fragment: String) {
        tracing::trace!(target: "pt-osc", table, fragment = %fragment, "queued ALTER fragment");
        self.commands.add(table, fragment);
    }
}

impl<D: DdlGenerator> SchemaStatements for PtOscAdapter<D> {
    fn rename_table(&mut self, table: &str, new_name: &str) -> OscResult<()> {
        let fragment = format!("RENAME TO {}", self.ddl.quote_table_name(new_name));
        self.add_command(table, fragment);
        Ok(())
    }

    fn add_column(
        &mut self,
        table: &str,
        column: &str,
        column_type: &str,
        options: &ColumnOptions,
    ) -> OscResult<()> {
        let fragment = format!(
            "ADD {} {}",
            self.ddl.quote_column_name(column),
            self.ddl.column_ddl(table, column, column_type, options)
        );
        self.add_command(table, fragment);
        Ok(())
    }

    fn change_column(
        &mut self,
        table: &str,
        column: &str,
        column_type: &str,
        options: &ColumnOptions,
    ) -> OscResult<()> {
        let quoted = self.ddl.quote_column_name(column);
        let fragment = format!(
            "CHANGE {} {} {}",
            quoted,
            quoted,
            self.ddl.column_ddl(table, column, column_type, options)
        );
        self.add_command(table, fragment);
        Ok(())
    }

    fn rename_column(&mut self, table: &str, column: &str, new_column: &str) -> OscResult<()> {
        let fragment = format!(
            "CHANGE {} {} {}",
            self.ddl.quote_column_name(column),
            self.ddl.quote_column_name(new_column),
            self.ddl.existing_column_ddl(table, column)?
        );
        self.add_command(table, fragment);
        Ok(())
    }

    fn remove_column(&mut self, table: &str, columns: &[&str]) -> OscResult<()> {
        if columns.is_empty() {
            return Err(OscError::InvalidArgument(format!(
                "remove_column on {} requires at least one column",
                table
            )));
        }
        for column in columns {
            let fragment = format!("DROP COLUMN {}", self.ddl.quote_column_name(column));
            self.add_command(table, fragment);
        }
        Ok(())
    }

    fn add_index(&mut self, table: &str, columns: &[&str], options: &IndexOptions) -> OscResult<()> {
        let name = self.ddl.index_name(table, columns, options);
        let kind = if options.unique { "UNIQUE INDEX" } else { "INDEX" };
        let fragment = format!(
            "ADD {} {} ({})",
            kind,
            self.ddl.quote_column_name(&name),
            self.ddl.index_columns(columns, options)
        );
        self.add_command(table, fragment);
        Ok(())
    }

    fn remove_index(&mut self, table: &str, index_name: &str) -> OscResult<()> {
        let fragment = format!("DROP INDEX {}", self.ddl.quote_column_name(index_name));
        self.add_command(table, fragment);
        Ok(())
    }

    fn execute(&mut self, sql: &str) -> OscResult<()> {
        Err(OscError::UnsupportedOperation(format!(
            "raw SQL cannot be run through pt-online-schema-change: {}",
            sql
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ddl::schema::{Schema, TableDef};
    use crate::ddl::{IndexLength, IndexOrder};
    use pretty_assertions::assert_eq;

    fn adapter() -> PtOscAdapter {
        PtOscAdapter::with_ddl(MysqlDdl::with_schema(
            Schema::new().table(TableDef::new("lorem").column("foobar", "varchar(255)")),
        ))
    }

    #[test]
    fn test_rename_table() {
        let mut a = adapter();
        a.rename_table("lorem", "ipsum").unwrap();
        assert_eq!(a.commands_for("lorem"), ["RENAME TO `ipsum`"]);
    }

    #[test]
    fn test_add_column() {
        let mut a = adapter();
        a.add_column(
            "lorem",
            "foobar",
            "string",
            &ColumnOptions::new().default_value(0).null(false),
        )
        .unwrap();
        assert_eq!(
            a.commands_for("lorem"),
            ["ADD `foobar` varchar(255) DEFAULT '0' NOT NULL"]
        );
    }

    #[test]
    fn test_change_column() {
        let mut a = adapter();
        a.change_column(
            "lorem",
            "foobar",
            "string",
            &ColumnOptions::new().default_value(0).null(false),
        )
        .unwrap();
        assert_eq!(
            a.commands_for("lorem"),
            ["CHANGE `foobar` `foobar` varchar(255) DEFAULT '0' NOT NULL"]
        );
    }

    #[test]
    fn test_rename_column_uses_existing_definition() {
        let mut a = adapter();
        a.rename_column("lorem", "foobar", "bazqux").unwrap();
        assert_eq!(
            a.commands_for("lorem"),
            ["CHANGE `foobar` `bazqux` varchar(255) DEFAULT NULL"]
        );
    }

    #[test]
    fn test_rename_unknown_column_fails_without_fragment() {
        let mut a = adapter();
        assert!(a.rename_column("lorem", "missing", "x").is_err());
        assert!(a.commanded_tables().is_empty());
    }

    #[test]
    fn test_remove_column_one_fragment_per_column() {
        let mut a = adapter();
        a.remove_column("lorem", &["foo", "bar", "baz"]).unwrap();
        assert_eq!(
            a.commands_for("lorem"),
            ["DROP COLUMN `foo`", "DROP COLUMN `bar`", "DROP COLUMN `baz`"]
        );
        assert!(matches!(
            a.remove_column("lorem", &[]),
            Err(OscError::InvalidArgument(_))
        ));
        assert_eq!(a.commands_for("lorem").len(), 3);
    }

    #[test]
    fn test_add_index_variants() {
        let mut a = adapter();
        a.add_index("lorem", &["foo"], &IndexOptions::new().name("idx_one"))
            .unwrap();
        a.add_index("lorem", &["foo"], &IndexOptions::new().unique().name("idx_two"))
            .unwrap();
        a.add_index("lorem", &["foo", "bar", "baz"], &IndexOptions::new().name("idx_three"))
            .unwrap();
        a.add_index("lorem", &["foo", "bar"], &IndexOptions::new()).unwrap();
        a.add_index(
            "lorem",
            &["name"],
            &IndexOptions::new()
                .length(IndexLength::All(10))
                .order("name", IndexOrder::Desc),
        )
        .unwrap();

        assert_eq!(
            a.commands_for("lorem"),
            [
                "ADD INDEX `idx_one` (`foo`)",
                "ADD UNIQUE INDEX `idx_two` (`foo`)",
                "ADD INDEX `idx_three` (`foo`, `bar`, `baz`)",
                "ADD INDEX `lorem_bar_foo_index` (`foo`, `bar`)",
                "ADD INDEX `lorem_name_index` (`name`(10) DESC)",
            ]
        );
    }

    #[test]
    fn test_remove_index() {
        let mut a = adapter();
        a.remove_index("lorem", "some_index").unwrap();
        assert_eq!(a.commands_for("lorem"), ["DROP INDEX `some_index`"]);
    }

    #[test]
    fn test_execute_is_unsupported() {
        let mut a = adapter();
        assert!(matches!(
            a.execute("SELECT 1"),
            Err(OscError::UnsupportedOperation(_))
        ));
        assert!(a.commanded_tables().is_empty());
    }

    #[test]
    fn test_tables_are_independent() {
        let mut a = adapter();
        a.remove_column("a", &["x"]).unwrap();
        a.remove_column("b", &["y"]).unwrap();
        a.remove_column("a", &["z"]).unwrap();
        assert_eq!(a.joined_commands_for("a"), "DROP COLUMN `x`,DROP COLUMN `z`");
        assert_eq!(a.commanded_tables(), ["a", "b"]);

        a.clear_table("a");
        assert_eq!(a.commanded_tables(), ["b"]);
        a.clear();
        assert!(a.commanded_tables().is_empty());
    }
}
