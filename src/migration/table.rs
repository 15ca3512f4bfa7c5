//! Operations on the schema history table

use crate::error::MigrationError;
use crate::executor::SqlExecutor;
use crate::migration::state_table::{CreateScript, TableRef};

/// The schema history table of one schema
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaHistoryTable {
    table: TableRef,
}

impl SchemaHistoryTable {
    pub fn new(table: TableRef) -> Self {
        Self { table }
    }

    pub fn table(&self) -> &TableRef {
        &self.table
    }

    /// Named-lock discriminator shared with JVM Flyway runners
    ///
    /// Java's `String.hashCode` of the quoted table name, so both runtimes
    /// contend for the same `Flyway-<n>` lock.
    pub fn lock_discriminator(&self) -> i32 {
        self.table
            .quoted()
            .encode_utf16()
            .fold(0i32, |hash, unit| hash.wrapping_mul(31).wrapping_add(i32::from(unit)))
    }

    /// Whether the table exists, checked through `information_schema`
    pub fn exists(&self, executor: &dyn SqlExecutor) -> Result<bool, MigrationError> {
        let found = match &self.table.schema {
            Some(schema) => executor.query_scalar(
                "SELECT 1 FROM information_schema.tables WHERE table_schema = ? AND table_name = ?",
                &[schema.as_str(), self.table.name.as_str()],
            )?,
            None => executor.query_scalar(
                "SELECT 1 FROM information_schema.tables WHERE table_schema = DATABASE() AND table_name = ?",
                &[self.table.name.as_str()],
            )?,
        };
        Ok(found.is_some())
    }

    pub fn drop(&self, executor: &dyn SqlExecutor) -> Result<(), MigrationError> {
        executor.execute(&format!("DROP TABLE {}", self.table))?;
        Ok(())
    }

    /// Row-lock the whole table for the rest of the current transaction
    pub fn lock(&self, executor: &dyn SqlExecutor) -> Result<(), MigrationError> {
        executor.execute(&format!("SELECT * FROM {} FOR UPDATE", self.table))?;
        Ok(())
    }

    /// Run `script` statement by statement
    ///
    /// Stops at the first failing statement. DDL is not transactional, so
    /// statements before it stay applied.
    pub fn create(&self, executor: &dyn SqlExecutor, script: &CreateScript) -> Result<(), MigrationError> {
        log::info!("Creating Schema History table {}...", self.table);
        for statement in script.statements() {
            executor.execute(statement)?;
        }
        Ok(())
    }
}
