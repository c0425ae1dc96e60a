//! Validated SQL identifiers for datasets and tables.
//!
//! Table and schema names cannot be bound as query parameters, so every name
//! that reaches a DDL statement goes through [`Identifier::parse`] first.

use std::fmt::{Display, Formatter};

use crate::WarehouseError;

const MAX_IDENTIFIER_LEN: usize = 63;

/// A bare SQL identifier matching `[A-Za-z_][A-Za-z0-9_]*`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identifier(String);

impl Identifier {
    /// Parse an identifier, rejecting anything that would need quoting.
    pub fn parse(input: &str) -> Result<Self, WarehouseError> {
        let trimmed = input.trim();
        let mut chars = trimmed.chars();
        let valid_start = chars
            .next()
            .is_some_and(|ch| ch.is_ascii_alphabetic() || ch == '_');
        let valid_rest = chars.all(|ch| ch.is_ascii_alphanumeric() || ch == '_');

        if !valid_start || !valid_rest || trimmed.len() > MAX_IDENTIFIER_LEN {
            return Err(WarehouseError::InvalidIdentifier {
                value: input.to_owned(),
            });
        }

        Ok(Self(trimmed.to_owned()))
    }

    /// Wrap a name known at compile time to be a valid identifier.
    pub(crate) fn from_static(name: &'static str) -> Self {
        Self(name.to_owned())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Double-quoted form for embedding in SQL text.
    pub fn quoted(&self) -> String {
        format!("\"{}\"", self.0)
    }
}

impl Display for Identifier {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A dataset-qualified table reference (`dataset.table`).
///
/// The dataset maps onto a `DuckDB` schema inside the warehouse file.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableRef {
    pub dataset: Identifier,
    pub table: Identifier,
}

impl TableRef {
    pub fn new(dataset: Identifier, table: Identifier) -> Self {
        Self { dataset, table }
    }

    pub fn parse(dataset: &str, table: &str) -> Result<Self, WarehouseError> {
        Ok(Self::new(Identifier::parse(dataset)?, Identifier::parse(table)?))
    }

    /// Another table in the same dataset.
    pub fn sibling(&self, table: Identifier) -> Self {
        Self::new(self.dataset.clone(), table)
    }

    /// Fully quoted `"dataset"."table"` form for SQL text.
    pub fn qualified(&self) -> String {
        format!("{}.{}", self.dataset.quoted(), self.table.quoted())
    }
}

impl Display for TableRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.dataset, self.table)
    }
}
