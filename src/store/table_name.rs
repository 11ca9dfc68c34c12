//! Validated, quoting-safe table identifiers.
//!
//! Every statement issued by the stores references its table through a
//! [`TableName`], so identifier quoting happens in exactly one place.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Schema used when a table reference carries no qualifier.
pub const DEFAULT_SCHEMA: &str = "public";

/// Longest identifier `PostgreSQL` stores without truncation (`NAMEDATALEN - 1`).
const MAX_IDENTIFIER_LENGTH: usize = 63;

/// Errors raised when a table reference cannot be used safely.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TableNameError {
    /// The table part is empty or whitespace-only.
    #[error("table name must not be empty")]
    EmptyName,

    /// The schema part is empty or whitespace-only.
    #[error("schema name must not be empty")]
    EmptySchema,

    /// An identifier would be silently truncated by the server.
    #[error("identifier '{0}' exceeds {MAX_IDENTIFIER_LENGTH} bytes")]
    TooLong(String),

    /// An identifier contains a NUL character, which no quoting can carry.
    #[error("identifier contains a NUL character")]
    ContainsNul,

    /// The raw reference could not be split into schema and table parts.
    #[error("malformed table reference '{0}'")]
    Malformed(String),
}

/// Immutable, schema-qualified table reference.
///
/// Two identifiers are equal when schema and table match case-sensitively,
/// which is also exactly when their quoted forms match.
///
/// # Examples
///
/// ```
/// use quay::store::TableName;
///
/// let table = TableName::parse("audit.\"Saga Snapshots\"").expect("valid reference");
/// assert_eq!(table.schema(), "audit");
/// assert_eq!(table.name(), "Saga Snapshots");
/// assert_eq!(table.qualified(), "\"audit\".\"Saga Snapshots\"");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TableName {
    schema: String,
    name: String,
}

impl TableName {
    /// Creates a table reference from explicit schema and table parts.
    ///
    /// # Errors
    ///
    /// Returns [`TableNameError`] when either part is empty, too long, or
    /// contains a NUL character.
    pub fn new(schema: impl Into<String>, name: impl Into<String>) -> Result<Self, TableNameError> {
        let schema_part = schema.into();
        let name_part = name.into();
        validate_identifier(&schema_part, TableNameError::EmptySchema)?;
        validate_identifier(&name_part, TableNameError::EmptyName)?;
        Ok(Self {
            schema: schema_part,
            name: name_part,
        })
    }

    /// Creates a table reference in the [`DEFAULT_SCHEMA`].
    ///
    /// # Errors
    ///
    /// Returns [`TableNameError`] when the name is not a usable identifier.
    pub fn with_default_schema(name: impl Into<String>) -> Result<Self, TableNameError> {
        Self::new(DEFAULT_SCHEMA, name)
    }

    /// Parses `table`, `schema.table`, or their double-quoted forms.
    ///
    /// Quoted parts may contain dots and use `""` for an embedded quote.
    ///
    /// # Errors
    ///
    /// Returns [`TableNameError::Malformed`] for unbalanced quotes or more than
    /// two parts, and the validation errors of [`TableName::new`] otherwise.
    pub fn parse(raw: &str) -> Result<Self, TableNameError> {
        let mut parts = split_parts(raw.trim())
            .ok_or_else(|| TableNameError::Malformed(raw.to_owned()))?
            .into_iter();
        match (parts.next(), parts.next(), parts.next()) {
            (Some(name), None, None) => Self::with_default_schema(name),
            (Some(schema), Some(name), None) => Self::new(schema, name),
            _ => Err(TableNameError::Malformed(raw.to_owned())),
        }
    }

    /// Builds a sibling identifier in the same schema, named `<table>_<suffix>`.
    ///
    /// Used for index names.
    ///
    /// # Errors
    ///
    /// Returns [`TableNameError::TooLong`] when the combined name no longer
    /// fits in an identifier.
    pub fn derived(&self, suffix: &str) -> Result<Self, TableNameError> {
        Self::new(self.schema.clone(), format!("{}_{suffix}", self.name))
    }

    /// Returns the unquoted schema part.
    #[must_use]
    pub fn schema(&self) -> &str {
        &self.schema
    }

    /// Returns the unquoted table part.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the quoted table part alone, e.g. `"deferred_messages"`.
    #[must_use]
    pub fn quoted_name(&self) -> String {
        quote_identifier(&self.name)
    }

    /// Returns the fully qualified, quoted reference used in statements.
    #[must_use]
    pub fn qualified(&self) -> String {
        format!(
            "{}.{}",
            quote_identifier(&self.schema),
            quote_identifier(&self.name)
        )
    }

    /// Builds a reference from literals known to be valid identifiers.
    pub(crate) fn from_trusted(schema: &str, name: &str) -> Self {
        debug_assert!(
            validate_identifier(schema, TableNameError::EmptySchema).is_ok()
                && validate_identifier(name, TableNameError::EmptyName).is_ok(),
            "trusted table name literal must be a valid identifier"
        );
        Self {
            schema: schema.to_owned(),
            name: name.to_owned(),
        }
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.qualified())
    }
}

impl TryFrom<String> for TableName {
    type Error = TableNameError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<TableName> for String {
    fn from(value: TableName) -> Self {
        value.qualified()
    }
}

fn validate_identifier(value: &str, empty: TableNameError) -> Result<(), TableNameError> {
    if value.trim().is_empty() {
        return Err(empty);
    }
    if value.contains('\0') {
        return Err(TableNameError::ContainsNul);
    }
    if value.len() > MAX_IDENTIFIER_LENGTH {
        return Err(TableNameError::TooLong(value.to_owned()));
    }
    Ok(())
}

fn quote_identifier(value: &str) -> String {
    format!("\"{}\"", value.replace('"', "\"\""))
}

/// Splits a dotted reference, honouring double-quoted parts.
///
/// Returns `None` for unbalanced quotes or text trailing a closing quote.
fn split_parts(raw: &str) -> Option<Vec<String>> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut closed_quote = false;
    let mut chars = raw.chars().peekable();

    while let Some(ch) = chars.next() {
        if in_quotes {
            if ch != '"' {
                current.push(ch);
            } else if chars.peek() == Some(&'"') {
                chars.next();
                current.push('"');
            } else {
                in_quotes = false;
                closed_quote = true;
            }
            continue;
        }

        match ch {
            '.' => {
                parts.push(std::mem::take(&mut current));
                closed_quote = false;
            }
            '"' if current.is_empty() && !closed_quote => in_quotes = true,
            _ if closed_quote || ch == '"' => return None,
            _ => current.push(ch),
        }
    }

    if in_quotes {
        return None;
    }
    parts.push(current);
    Some(parts)
}
