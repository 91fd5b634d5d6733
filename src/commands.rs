//! Per-table ALTER fragment storage.

use std::collections::HashMap;

/// Table name → ordered ALTER fragments.
///
/// Tables are reported in the order they first received a fragment, and
/// only once they have at least one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandSet {
    order: Vec<String>,
    fragments: HashMap<String, Vec<String>>,
}

impl CommandSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one fragment to `table`.
    pub fn add(&mut self, table: &str, fragment: impl Into<String>) {
        match self.fragments.get_mut(table) {
            Some(list) => list.push(fragment.into()),
            None => {
                self.order.push(table.to_string());
                self.fragments.insert(table.to_string(), vec![fragment.into()]);
            }
        }
    }

    /// Fragments for `table` in call order; empty for unseen tables.
    pub fn commands_for(&self, table: &str) -> &[String] {
        self.fragments.get(table).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Fragments joined with `,` into one ALTER clause.
    pub fn joined_commands_for(&self, table: &str) -> String {
        self.commands_for(table).join(",")
    }

    /// Tables with at least one fragment, first-seen order.
    pub fn commanded_tables(&self) -> &[String] {
        &self.order
    }

    /// Drop everything recorded for one table.
    pub fn remove(&mut self, table: &str) -> Option<Vec<String>> {
        self.order.retain(|t| t != table);
        self.fragments.remove(table)
    }

    pub fn clear(&mut self) {
        self.order.clear();
        self.fragments.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}
