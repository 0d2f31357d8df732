//! Staging table definitions
//!
//! The staging table's shape is declared once, as a versioned value, and
//! rendered to DDL per SQL dialect. It is never inferred from the file.

use super::{Record, Schema, Value, ValueType, is_sanitized};
use crate::error::{Result, StageError};
use std::fmt;

/// A `(schema, table)` address in the relational store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRef {
    schema: String,
    table: String,
}

impl TableRef {
    /// # Errors
    /// `SchemaConflict` if either part is not a sanitized identifier
    pub fn new(schema: impl Into<String>, table: impl Into<String>) -> Result<Self> {
        let schema = schema.into();
        let table = table.into();
        for part in [&schema, &table] {
            if !is_sanitized(part) {
                return Err(StageError::SchemaConflict(format!(
                    "'{}' is not a valid identifier",
                    part
                )));
            }
        }
        Ok(Self { schema, table })
    }

    pub fn schema(&self) -> &str {
        &self.schema
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// `"schema"."table"`
    pub fn quoted(&self) -> String {
        format!("{}.{}", quote(&self.schema), quote(&self.table))
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.schema, self.table)
    }
}

/// Double-quote an identifier so its case survives
pub fn quote(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlType {
    Integer,
    Float,
    Varchar(u16),
}

impl SqlType {
    pub fn value_type(self) -> ValueType {
        match self {
            Self::Integer => ValueType::Integer,
            Self::Float => ValueType::Float,
            Self::Varchar(_) => ValueType::Text,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlDialect {
    Postgres,
    Sqlite,
}

impl SqlDialect {
    fn render(self, ty: SqlType) -> String {
        match (self, ty) {
            (Self::Postgres, SqlType::Integer) => "INTEGER".to_string(),
            (Self::Postgres, SqlType::Float) => "FLOAT".to_string(),
            (Self::Postgres, SqlType::Varchar(n)) => format!("VARCHAR({})", n),
            (Self::Sqlite, SqlType::Integer) => "INTEGER".to_string(),
            (Self::Sqlite, SqlType::Float) => "REAL".to_string(),
            (Self::Sqlite, SqlType::Varchar(_)) => "TEXT".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDef {
    pub name: &'static str,
    pub sql_type: SqlType,
}

const fn col(name: &'static str, sql_type: SqlType) -> ColumnDef {
    ColumnDef { name, sql_type }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableDefinition {
    pub name: &'static str,
    pub version: u32,
    pub columns: Vec<ColumnDef>,
}

impl TableDefinition {
    /// Customer shopping-behaviour staging table, version 1
    pub fn shopping_behavior() -> Self {
        use SqlType::*;
        Self {
            name: "shopping_behavior",
            version: 1,
            columns: vec![
                col("Customer_ID", Integer),
                col("Age", Integer),
                col("Gender", Varchar(10)),
                col("Item_Purchased", Varchar(255)),
                col("Category", Varchar(50)),
                col("Purchase_Amount_USD", Integer),
                col("Location", Varchar(100)),
                col("Size", Varchar(10)),
                col("Color", Varchar(50)),
                col("Season", Varchar(50)),
                col("Review_Rating", Float),
                col("Subscription_Status", Varchar(10)),
                col("Payment_Method", Varchar(20)),
                col("Shipping_Type", Varchar(20)),
                col("Discount_Applied", Varchar(10)),
                col("Promo_Code_Used", Varchar(10)),
                col("Previous_Purchases", Integer),
                col("Preferred_Payment_Method", Varchar(20)),
                col("Frequency_of_Purchases", Varchar(20)),
            ],
        }
    }

    pub fn column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// `CREATE TABLE IF NOT EXISTS` statement for `table`
    pub fn create_table_sql(&self, table: &TableRef, dialect: SqlDialect) -> String {
        let columns = self
            .columns
            .iter()
            .map(|c| format!("    {} {}", quote(c.name), dialect.render(c.sql_type)))
            .collect::<Vec<_>>()
            .join(",\n");
        let strict = match dialect {
            SqlDialect::Sqlite => " STRICT",
            SqlDialect::Postgres => "",
        };
        format!(
            "CREATE TABLE IF NOT EXISTS {} (\n{}\n){};",
            table.quoted(),
            columns,
            strict
        )
    }

    /// Check a dataset's columns against this definition before any insert
    ///
    /// Returns the declared column for each dataset column, in dataset order.
    ///
    /// # Errors
    /// `SchemaConflict` naming the first column the table does not declare
    pub fn bind(&self, schema: &Schema) -> Result<Vec<&ColumnDef>> {
        schema
            .names()
            .map(|name| {
                self.column(name).ok_or_else(|| {
                    StageError::SchemaConflict(format!(
                        "column '{}' is not declared by table definition {} v{}",
                        name, self.name, self.version
                    ))
                })
            })
            .collect()
    }

    /// Coerce one record to the bound column types
    ///
    /// # Errors
    /// `InsertFailure` for the first field that does not fit its column
    pub fn coerce_record(&self, bound: &[&ColumnDef], record: &Record, row: usize) -> Result<Record> {
        bound
            .iter()
            .zip(record)
            .map(|(def, value)| {
                let coerced = value.coerce(def.sql_type.value_type()).ok_or_else(|| {
                    StageError::InsertFailure {
                        row,
                        reason: format!("{} value '{}' is not {}", def.name, value, def.sql_type.value_type()),
                    }
                })?;
                if let (SqlType::Varchar(n), Value::Text(s)) = (def.sql_type, &coerced) {
                    if s.chars().count() > n as usize {
                        return Err(StageError::InsertFailure {
                            row,
                            reason: format!("{} value exceeds VARCHAR({})", def.name, n),
                        });
                    }
                }
                Ok(coerced)
            })
            .collect()
    }
}
