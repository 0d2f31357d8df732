//! In-memory tabular data
//!
//! A [`Dataset`] is the unit every stage consumes and produces: an ordered
//! list of positional records sharing one [`Schema`].

mod schema;
mod table;
mod value;

pub use schema::{Column, Schema, is_sanitized, sanitize_column_name};
pub use table::{ColumnDef, SqlDialect, SqlType, TableDefinition, TableRef, quote};
pub use value::{MISSING_MARKERS, Value, ValueType, format_float, is_missing_marker};

use crate::error::{Result, StageError};

/// One row, positionally ordered to the dataset's schema
pub type Record = Vec<Value>;

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Dataset {
    schema: Schema,
    records: Vec<Record>,
}

impl Dataset {
    /// Build a dataset, checking that every record matches the schema width
    pub fn new(schema: Schema, records: Vec<Record>) -> Result<Self> {
        if let Some((row, record)) = records
            .iter()
            .enumerate()
            .find(|(_, r)| r.len() != schema.len())
        {
            return Err(StageError::SchemaConflict(format!(
                "row {} has {} fields, schema has {} columns",
                row,
                record.len(),
                schema.len()
            )));
        }
        Ok(Self { schema, records })
    }

    /// Build a dataset from raw text fields, inferring each column's type
    ///
    /// `None` fields are null. A column is `Integer` if every non-null field
    /// parses as an integer, `Float` if every non-null field is numeric, and
    /// `Text` otherwise (text columns keep the raw field verbatim). Columns
    /// with no non-null fields are `Text`.
    pub fn infer(names: Vec<String>, rows: Vec<Vec<Option<String>>>) -> Result<Self> {
        let mut types: Vec<Option<ValueType>> = vec![None; names.len()];
        for row in &rows {
            for (slot, raw) in types.iter_mut().zip(row) {
                if let Some(t) = raw.as_deref().and_then(|r| Value::parse_field(r).value_type()) {
                    *slot = Some(slot.map_or(t, |s| s.unify(t)));
                }
            }
        }
        let types: Vec<ValueType> = types
            .into_iter()
            .map(|t| t.unwrap_or(ValueType::Text))
            .collect();

        let records = rows
            .into_iter()
            .map(|row| {
                row.into_iter()
                    .zip(&types)
                    .map(|(raw, ty)| match raw {
                        None => Value::Null,
                        Some(raw) => match ty {
                            ValueType::Text => Value::Text(raw),
                            _ => Value::parse_field(&raw)
                                .coerce(*ty)
                                .unwrap_or(Value::Text(raw)),
                        },
                    })
                    .collect()
            })
            .collect();

        let columns = names
            .into_iter()
            .zip(types)
            .map(|(name, t)| Column::new(name, t))
            .collect();
        Self::new(Schema::new(columns)?, records)
    }

    /// Build a dataset from raw text fields without interpreting them
    ///
    /// Every column is `Text`; `None` fields are null.
    pub fn from_text(names: Vec<String>, rows: Vec<Vec<Option<String>>>) -> Result<Self> {
        let columns = names
            .into_iter()
            .map(|name| Column::new(name, ValueType::Text))
            .collect();
        let records = rows
            .into_iter()
            .map(|row| row.into_iter().map(Value::from).collect())
            .collect();
        Self::new(Schema::new(columns)?, records)
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub(crate) fn records_mut(&mut self) -> &mut Vec<Record> {
        &mut self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn into_records(self) -> Vec<Record> {
        self.records
    }

    /// Value of `column` in row `row`
    pub fn get(&self, row: usize, column: &str) -> Option<&Value> {
        let index = self.schema.index_of(column)?;
        self.records.get(row).map(|r| &r[index])
    }

    /// All values of one column, in row order
    pub fn column(&self, name: &str) -> Option<Vec<&Value>> {
        let index = self.schema.index_of(name)?;
        Some(self.records.iter().map(|r| &r[index]).collect())
    }

    /// Replace the schema with one of identical width (e.g. renamed columns)
    pub fn with_schema(self, schema: Schema) -> Result<Self> {
        Self::new(schema, self.records)
    }

    /// Change a column's type, converting its values
    ///
    /// Only used with widening conversions (see [`ValueType::unify`]), which
    /// never fail; a value that cannot be converted becomes text.
    pub(crate) fn cast_column(&mut self, index: usize, target: ValueType) {
        self.schema.set_type(index, target);
        for record in &mut self.records {
            let value = &mut record[index];
            if value.value_type().is_some_and(|t| t != target) {
                let converted = value
                    .coerce(target)
                    .unwrap_or_else(|| Value::Text(value.to_string()));
                *value = converted;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn row(fields: &[Option<&str>]) -> Vec<Option<String>> {
        fields.iter().map(|f| f.map(str::to_string)).collect()
    }

    #[test]
    fn test_infer_types() {
        let dataset = Dataset::infer(
            names(&["id", "rating", "gender", "empty"]),
            vec![
                row(&[Some("1"), Some("4"), Some("Male"), None]),
                row(&[Some("2"), Some("3.5"), Some("Female"), None]),
                row(&[Some("3"), None, Some("Male"), None]),
            ],
        )
        .unwrap();

        let types: Vec<ValueType> = dataset.schema().columns().iter().map(|c| c.value_type).collect();
        assert_eq!(
            types,
            vec![ValueType::Integer, ValueType::Float, ValueType::Text, ValueType::Text]
        );
        // Integers in a float column are widened
        assert_eq!(dataset.get(0, "rating"), Some(&Value::Float(4.0)));
        assert_eq!(dataset.get(2, "rating"), Some(&Value::Null));
    }

    #[test]
    fn test_mixed_numeric_and_text_keeps_raw_text() {
        let dataset = Dataset::infer(
            names(&["size"]),
            vec![row(&[Some("007")]), row(&[Some("XL")])],
        )
        .unwrap();
        assert_eq!(dataset.schema().columns()[0].value_type, ValueType::Text);
        assert_eq!(dataset.get(0, "size"), Some(&Value::Text("007".into())));
    }

    #[test]
    fn test_width_mismatch_rejected() {
        let schema = Schema::new(vec![Column::new("a", ValueType::Integer)]).unwrap();
        let err = Dataset::new(schema, vec![vec![Value::Int(1), Value::Int(2)]]).unwrap_err();
        assert_eq!(err.code(), "SchemaConflict");
    }

    #[test]
    fn test_column_access() {
        let dataset = Dataset::infer(
            names(&["a", "b"]),
            vec![row(&[Some("1"), Some("x")]), row(&[Some("2"), Some("y")])],
        )
        .unwrap();
        assert_eq!(
            dataset.column("a").unwrap(),
            vec![&Value::Int(1), &Value::Int(2)]
        );
        assert!(dataset.column("missing").is_none());
    }
}
