//! Identifier and literal quoting for the MySQL dialect family

/// Quote an identifier with backticks, doubling embedded backticks
pub fn quote_identifier(identifier: &str) -> String {
    format!("`{}`", identifier.replace('`', "``"))
}

/// Quote each part and join with `.`, e.g. `` `app`.`flyway_schema_history` ``
pub fn quote_qualified(parts: &[&str]) -> String {
    parts.iter().map(|part| quote_identifier(part)).collect::<Vec<_>>().join(".")
}

/// Render a single-quoted string literal
///
/// Quotes are doubled and backslashes escaped for the server's default
/// `sql_mode`. The literal cannot break out of its quotes in either mode, but
/// under `NO_BACKSLASH_ESCAPES` each backslash is stored twice.
pub fn string_literal(value: &str) -> String {
    format!("'{}'", value.replace('\\', "\\\\").replace('\'', "''"))
}
