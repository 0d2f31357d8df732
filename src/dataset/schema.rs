//! Dataset schemas and column-name sanitization

use super::ValueType;
use crate::error::{Result, StageError};
use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;

static DISALLOWED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^A-Za-z0-9_\s]").expect("static regex"));

/// Turn an arbitrary header into a literal SQL identifier
///
/// Surrounding whitespace is trimmed, every character outside
/// `[A-Za-z0-9_]` and whitespace is removed, and each remaining whitespace
/// character becomes `_`. `"Purchase Amount (USD)"` becomes
/// `"Purchase_Amount_USD"`. The function is idempotent.
pub fn sanitize_column_name(name: &str) -> String {
    DISALLOWED
        .replace_all(name.trim(), "")
        .trim()
        .chars()
        .map(|c| if c.is_whitespace() { '_' } else { c })
        .collect()
}

/// True if `name` would pass through [`sanitize_column_name`] unchanged
pub fn is_sanitized(name: &str) -> bool {
    !name.is_empty() && sanitize_column_name(name) == name
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub name: String,
    pub value_type: ValueType,
}

impl Column {
    pub fn new(name: impl Into<String>, value_type: ValueType) -> Self {
        Self {
            name: name.into(),
            value_type,
        }
    }
}

/// Ordered column list of a dataset
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Schema {
    columns: Vec<Column>,
}

impl Schema {
    /// Build a schema, rejecting duplicate column names
    pub fn new(columns: Vec<Column>) -> Result<Self> {
        let mut seen = HashSet::new();
        for column in &columns {
            if !seen.insert(column.name.as_str()) {
                return Err(StageError::SchemaConflict(format!(
                    "duplicate column '{}'",
                    column.name
                )));
            }
        }
        Ok(Self { columns })
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub(crate) fn set_type(&mut self, index: usize, value_type: ValueType) {
        self.columns[index].value_type = value_type;
    }

    /// Sanitize every column name
    ///
    /// # Errors
    /// `SchemaConflict` if a name sanitizes to nothing or two names collide.
    pub fn sanitized(&self) -> Result<Self> {
        let mut columns = Vec::with_capacity(self.columns.len());
        let mut seen = HashSet::new();
        for column in &self.columns {
            let name = sanitize_column_name(&column.name);
            if name.is_empty() {
                return Err(StageError::SchemaConflict(format!(
                    "column '{}' has no identifier characters",
                    column.name
                )));
            }
            if !seen.insert(name.clone()) {
                return Err(StageError::SchemaConflict(format!(
                    "column '{}' collides with another column as '{}'",
                    column.name, name
                )));
            }
            columns.push(Column::new(name, column.value_type));
        }
        Ok(Self { columns })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_shopping_headers() {
        assert_eq!(sanitize_column_name("Customer ID"), "Customer_ID");
        assert_eq!(sanitize_column_name("Purchase Amount (USD)"), "Purchase_Amount_USD");
        assert_eq!(sanitize_column_name("Review Rating"), "Review_Rating");
        assert_eq!(sanitize_column_name(" Frequency of Purchases "), "Frequency_of_Purchases");
        assert_eq!(sanitize_column_name("Größe"), "Gre");
    }

    #[test]
    fn test_sanitize_is_idempotent() {
        let names = [
            "Customer ID",
            "Purchase Amount (USD)",
            "a-b c.d",
            "  spaced\tout  ",
            "Item ( Purchased )",
            "already_clean",
            "ünïcödé name",
            "",
        ];
        for name in names {
            let once = sanitize_column_name(name);
            assert_eq!(sanitize_column_name(&once), once, "not idempotent for {:?}", name);
        }
    }

    #[test]
    fn test_sanitized_detects_collisions() {
        let schema = Schema::new(vec![
            Column::new("Item Purchased", ValueType::Text),
            Column::new("Item_Purchased", ValueType::Text),
        ])
        .unwrap();
        let err = schema.sanitized().unwrap_err();
        assert_eq!(err.code(), "SchemaConflict");
    }

    #[test]
    fn test_sanitized_rejects_empty_names() {
        let schema = Schema::new(vec![Column::new("(%)", ValueType::Text)]).unwrap();
        assert_eq!(schema.sanitized().unwrap_err().code(), "SchemaConflict");
    }

    #[test]
    fn test_duplicate_columns_rejected() {
        let err = Schema::new(vec![
            Column::new("a", ValueType::Integer),
            Column::new("a", ValueType::Text),
        ])
        .unwrap_err();
        assert_eq!(err.code(), "SchemaConflict");
    }

    #[test]
    fn test_is_sanitized() {
        assert!(is_sanitized("default_schema"));
        assert!(!is_sanitized("bad name"));
        assert!(!is_sanitized(""));
    }
}
