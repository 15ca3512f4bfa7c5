//! Schema history table DDL
//!
//! The history table layout is fixed and shared with Flyway, so a database
//! migrated by either tool can be picked up by the other.

use crate::dialect::capabilities::DialectCapabilities;
use crate::dialect::quoting::{quote_identifier, quote_qualified, string_literal};
use std::fmt;

/// Default name of the schema history table
pub const DEFAULT_TABLE: &str = "flyway_schema_history";

/// `type` recorded for the baseline row
pub const BASELINE_TYPE: &str = "BASELINE";

/// Default baseline version
pub const DEFAULT_BASELINE_VERSION: &str = "1";

/// Default baseline description, also stored as its `script`
pub const DEFAULT_BASELINE_DESCRIPTION: &str = "<< Flyway Baseline >>";

/// A possibly schema-qualified table name
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableRef {
    pub schema: Option<String>,
    pub name: String,
}

impl TableRef {
    /// A table in the connection's current schema
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            schema: None,
            name: name.into(),
        }
    }

    pub fn in_schema(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            schema: Some(schema.into()),
            name: name.into(),
        }
    }

    /// Backtick-quoted, schema-qualified when a schema is set
    pub fn quoted(&self) -> String {
        match &self.schema {
            Some(schema) => quote_qualified(&[schema, &self.name]),
            None => quote_identifier(&self.name),
        }
    }

    /// Primary key constraint name, `` `<table>_pk` ``
    pub fn primary_key_name(&self) -> String {
        quote_identifier(&format!("{}_pk", self.name))
    }

    /// Index on `success`, `` `<table>_s_idx` ``
    pub fn success_index_name(&self) -> String {
        quote_identifier(&format!("{}_s_idx", self.name))
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.quoted())
    }
}

/// The sentinel history row marking a pre-existing schema as the starting point
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BaselineRow {
    pub version: String,
    pub description: String,
    pub installed_by: String,
}

impl BaselineRow {
    pub fn new(version: impl Into<String>, description: impl Into<String>, installed_by: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            description: description.into(),
            installed_by: installed_by.into(),
        }
    }
}

/// Ordered statements that create the history table
///
/// Run them one at a time, or use [`CreateScript::to_sql`] for a
/// `;`-separated script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateScript {
    statements: Vec<String>,
}

impl CreateScript {
    pub fn statements(&self) -> &[String] {
        &self.statements
    }

    /// The `CREATE TABLE` statement
    pub fn create_table(&self) -> &str {
        &self.statements[0]
    }

    /// Whether the baseline row is inserted by the `CREATE TABLE` itself
    pub fn has_atomic_baseline(&self) -> bool {
        self.create_table().contains(" AS SELECT")
    }

    pub fn to_sql(&self) -> String {
        let mut sql = self.statements.join(";\n");
        sql.push(';');
        sql
    }
}

impl fmt::Display for CreateScript {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_sql())
    }
}

/// Render the statements creating `table`
///
/// With a baseline row and `supports_atomic_baseline_insert`, the row is
/// inserted by `CREATE TABLE ... AS SELECT`. Otherwise a separate `INSERT`
/// follows the `CREATE TABLE`. That fallback is not safe under concurrent
/// runs: DDL commits implicitly, so another session can see the empty table
/// before the row lands.
pub fn build_create_statement(
    table: &TableRef,
    baseline: Option<&BaselineRow>,
    capabilities: &DialectCapabilities,
    tablespace: Option<&str>,
) -> CreateScript {
    let tablespace = tablespace
        .map(|name| format!(" TABLESPACE {}", quote_identifier(name)))
        .unwrap_or_default();

    let mut create = format!(
        "CREATE TABLE {table} (\n\
         \x20   `installed_rank` INT NOT NULL,\n\
         \x20   `version` VARCHAR(50),\n\
         \x20   `description` VARCHAR(200) NOT NULL,\n\
         \x20   `type` VARCHAR(20) NOT NULL,\n\
         \x20   `script` VARCHAR(1000) NOT NULL,\n\
         \x20   `checksum` INT,\n\
         \x20   `installed_by` VARCHAR(100) NOT NULL,\n\
         \x20   `installed_on` TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,\n\
         \x20   `execution_time` INT NOT NULL,\n\
         \x20   `success` BOOL NOT NULL,\n\
         \x20   CONSTRAINT {pk} PRIMARY KEY (`installed_rank`)\n\
         ){tablespace} ENGINE=InnoDB",
        pk = table.primary_key_name(),
    );

    let mut statements = Vec::with_capacity(3);
    match baseline {
        Some(row) if capabilities.supports_atomic_baseline_insert => {
            create.push_str(&baseline_select(row));
            statements.push(create);
        }
        Some(row) => {
            statements.push(create);
            statements.push(baseline_insert_statement(table, row));
        }
        None => statements.push(create),
    }

    statements.push(format!(
        "CREATE INDEX {} ON {table} (`success`)",
        table.success_index_name()
    ));

    CreateScript { statements }
}

fn baseline_select(row: &BaselineRow) -> String {
    format!(
        " AS SELECT\n\
         \x20   1 AS `installed_rank`,\n\
         \x20   {version} AS `version`,\n\
         \x20   {description} AS `description`,\n\
         \x20   {kind} AS `type`,\n\
         \x20   {description} AS `script`,\n\
         \x20   NULL AS `checksum`,\n\
         \x20   {installed_by} AS `installed_by`,\n\
         \x20   CURRENT_TIMESTAMP AS `installed_on`,\n\
         \x20   0 AS `execution_time`,\n\
         \x20   TRUE AS `success`",
        version = string_literal(&row.version),
        description = string_literal(&row.description),
        kind = string_literal(BASELINE_TYPE),
        installed_by = string_literal(&row.installed_by),
    )
}

/// `INSERT` of the baseline row into an existing history table
pub fn baseline_insert_statement(table: &TableRef, row: &BaselineRow) -> String {
    format!(
        "INSERT INTO {table} (`installed_rank`, `version`, `description`, `type`, `script`, \
         `checksum`, `installed_by`, `execution_time`, `success`) \
         VALUES (1, {version}, {description}, {kind}, {description}, NULL, {installed_by}, 0, 1)",
        version = string_literal(&row.version),
        description = string_literal(&row.description),
        kind = string_literal(BASELINE_TYPE),
        installed_by = string_literal(&row.installed_by),
    )
}
