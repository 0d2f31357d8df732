//! SQLite staging store
//!
//! Each schema namespace is its own database file, `<root>/<schema>.db`,
//! attached to an in-memory connection under the schema's name. Tables are
//! created `STRICT` so column types are enforced by the engine.

use super::{StagingConnection, StagingStore};
use crate::dataset::{
    Column, Dataset, Record, Schema, SqlDialect, TableDefinition, TableRef, Value, ValueType, quote,
};
use crate::error::{Result, StageError};
use rusqlite::types::Value as SqlValue;
use rusqlite::{Connection, OptionalExtension, params_from_iter};
use std::path::{Path, PathBuf};

/// Database names every SQLite connection already owns
const RESERVED_SCHEMAS: [&str; 2] = ["main", "temp"];

/// Staging store rooted at a directory of SQLite files
#[derive(Debug, Clone)]
pub struct SqliteStore {
    root: PathBuf,
}

impl SqliteStore {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl StagingStore for SqliteStore {
    type Connection = SqliteConnection;

    fn dialect(&self) -> SqlDialect {
        SqlDialect::Sqlite
    }

    async fn connect(&self) -> Result<SqliteConnection> {
        std::fs::create_dir_all(&self.root).map_err(|e| {
            StageError::connection(format!("{}: {}", self.root.display(), e))
        })?;
        let conn = Connection::open_in_memory().map_err(StageError::connection)?;
        log::debug!("Opened SQLite staging store at {}", self.root.display());
        Ok(SqliteConnection {
            conn,
            root: self.root.clone(),
        })
    }
}

/// Open SQLite staging connection
pub struct SqliteConnection {
    conn: Connection,
    root: PathBuf,
}

impl SqliteConnection {
    fn schema_file(&self, schema: &str) -> PathBuf {
        self.root.join(format!("{}.db", schema))
    }

    fn is_attached(&self, schema: &str) -> Result<bool> {
        let mut stmt = self
            .conn
            .prepare("SELECT name FROM pragma_database_list")
            .map_err(StageError::connection)?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(StageError::connection)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(StageError::connection)?;
        Ok(names.iter().any(|name| name == schema))
    }

    /// Attach the schema's database file. Without `create`, a missing file
    /// means the schema does not exist.
    fn attach(&self, table: &TableRef, create: bool) -> Result<()> {
        if RESERVED_SCHEMAS
            .iter()
            .any(|reserved| table.schema().eq_ignore_ascii_case(reserved))
        {
            return Err(StageError::SchemaConflict(format!(
                "{}: schema name '{}' is reserved by SQLite",
                table,
                table.schema()
            )));
        }
        if self.is_attached(table.schema())? {
            return Ok(());
        }
        let file = self.schema_file(table.schema());
        if !create && !file.exists() {
            return Err(StageError::TableNotFound(format!(
                "{} (schema '{}' does not exist)",
                table,
                table.schema()
            )));
        }
        let file_name = file.to_string_lossy().into_owned();
        self.conn
            .execute(
                &format!("ATTACH DATABASE ?1 AS {}", quote(table.schema())),
                [file_name],
            )
            .map_err(|e| StageError::connection(format!("{}: {}", file.display(), e)))?;
        Ok(())
    }

    fn table_exists(&self, table: &TableRef) -> Result<bool> {
        let sql = format!(
            "SELECT 1 FROM {}.sqlite_master WHERE type = 'table' AND name = ?1",
            quote(table.schema())
        );
        let found = self
            .conn
            .query_row(&sql, [table.table()], |_| Ok(()))
            .optional()
            .map_err(StageError::connection)?;
        Ok(found.is_some())
    }

    fn require_table(&self, table: &TableRef) -> Result<()> {
        self.attach(table, false)?;
        if !self.table_exists(table)? {
            return Err(StageError::TableNotFound(table.to_string()));
        }
        Ok(())
    }

    fn ensure_table_sync(&self, table: &TableRef, definition: &TableDefinition) -> Result<()> {
        self.attach(table, true)?;
        let ddl = definition.create_table_sql(table, SqlDialect::Sqlite);
        self.conn
            .execute_batch(&ddl)
            .map_err(|e| StageError::SchemaConflict(format!("cannot create {}: {}", table, e)))
    }

    fn insert_all_sync(
        &mut self,
        table: &TableRef,
        definition: &TableDefinition,
        dataset: &Dataset,
    ) -> Result<usize> {
        self.require_table(table)?;
        let bound = definition.bind(dataset.schema())?;
        let columns = dataset.schema().names().map(quote).collect::<Vec<_>>();
        let placeholders = (1..=columns.len()).map(|i| format!("?{}", i)).collect::<Vec<_>>();
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            table.quoted(),
            columns.join(", "),
            placeholders.join(", ")
        );

        // Dropping an uncommitted transaction rolls it back
        let tx = self.conn.transaction().map_err(StageError::connection)?;
        {
            let mut stmt = tx
                .prepare(&sql)
                .map_err(|e| StageError::SchemaConflict(format!("{}: {}", table, e)))?;
            for (row, record) in dataset.records().iter().enumerate() {
                let coerced = definition.coerce_record(&bound, record, row)?;
                stmt.execute(params_from_iter(coerced.into_iter().map(to_sql)))
                    .map_err(|e| StageError::InsertFailure {
                        row,
                        reason: e.to_string(),
                    })?;
            }
        }
        tx.commit().map_err(|e| StageError::InsertFailure {
            row: dataset.len(),
            reason: format!("commit failed: {}", e),
        })?;
        Ok(dataset.len())
    }

    fn select_all_sync(&self, table: &TableRef) -> Result<Dataset> {
        self.require_table(table)?;

        let mut stmt = self
            .conn
            .prepare("SELECT name, type FROM pragma_table_info(?1, ?2) ORDER BY cid")
            .map_err(StageError::connection)?;
        let columns = stmt
            .query_map([table.table(), table.schema()], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })
            .map_err(StageError::connection)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(StageError::connection)?
            .into_iter()
            .map(|(name, declared)| Column::new(name, declared_type(&declared)))
            .collect::<Vec<_>>();
        let schema = Schema::new(columns)?;

        let sql = format!("SELECT * FROM {} ORDER BY rowid", table.quoted());
        let mut stmt = self.conn.prepare(&sql).map_err(StageError::connection)?;
        let width = schema.len();
        let records = stmt
            .query_map([], |row| {
                (0..width)
                    .map(|i| row.get::<_, SqlValue>(i).map(from_sql))
                    .collect::<rusqlite::Result<Record>>()
            })
            .map_err(StageError::connection)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(StageError::connection)?;

        Dataset::new(schema, records)
    }

    fn row_count_sync(&self, table: &TableRef) -> Result<u64> {
        self.require_table(table)?;
        let count: i64 = self
            .conn
            .query_row(&format!("SELECT COUNT(*) FROM {}", table.quoted()), [], |row| row.get(0))
            .map_err(StageError::connection)?;
        Ok(count.max(0) as u64)
    }
}

impl StagingConnection for SqliteConnection {
    async fn ensure_table(&mut self, table: &TableRef, definition: &TableDefinition) -> Result<()> {
        self.ensure_table_sync(table, definition)
    }

    async fn insert_all(
        &mut self,
        table: &TableRef,
        definition: &TableDefinition,
        dataset: &Dataset,
    ) -> Result<usize> {
        self.insert_all_sync(table, definition, dataset)
    }

    async fn select_all(&mut self, table: &TableRef) -> Result<Dataset> {
        self.select_all_sync(table)
    }

    async fn row_count(&mut self, table: &TableRef) -> Result<u64> {
        self.row_count_sync(table)
    }
}

fn declared_type(declared: &str) -> ValueType {
    match declared.to_ascii_uppercase().as_str() {
        "INTEGER" | "INT" | "BIGINT" => ValueType::Integer,
        "REAL" | "FLOAT" | "DOUBLE" => ValueType::Float,
        _ => ValueType::Text,
    }
}

fn to_sql(value: Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Int(i) => SqlValue::Integer(i),
        Value::Float(f) => SqlValue::Real(f),
        Value::Text(s) => SqlValue::Text(s),
    }
}

fn from_sql(value: SqlValue) -> Value {
    match value {
        SqlValue::Null => Value::Null,
        SqlValue::Integer(i) => Value::Int(i),
        SqlValue::Real(f) => Value::Float(f),
        SqlValue::Text(s) => Value::Text(s),
        SqlValue::Blob(b) => Value::Text(String::from_utf8_lossy(&b).into_owned()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::read_csv;
    use tempfile::TempDir;

    const CSV: &str = "Customer_ID,Age,Gender,Review_Rating\n1,55,Male,3.1\n2,19,Female,\n";

    #[tokio::test]
    async fn test_insert_then_select_round_trip() {
        let temp = TempDir::new().unwrap();
        let store = SqliteStore::new(temp.path());
        let table = TableRef::new("retail", "shopping").unwrap();
        let definition = TableDefinition::shopping_behavior();
        let dataset = read_csv(CSV.as_bytes(), "test.csv").unwrap();

        let mut conn = store.connect().await.unwrap();
        conn.ensure_table(&table, &definition).await.unwrap();
        assert_eq!(conn.insert_all(&table, &definition, &dataset).await.unwrap(), 2);

        let selected = conn.select_all(&table).await.unwrap();
        // All 19 declared columns come back in declaration order
        assert_eq!(selected.schema().len(), 19);
        assert_eq!(selected.schema().columns()[0].name, "Customer_ID");
        assert_eq!(selected.get(0, "Customer_ID"), Some(&Value::Int(1)));
        assert_eq!(selected.get(0, "Review_Rating"), Some(&Value::Float(3.1)));
        assert_eq!(selected.get(1, "Review_Rating"), Some(&Value::Null));
        assert_eq!(selected.get(1, "Gender"), Some(&Value::Text("Female".into())));
        assert_eq!(selected.get(1, "Location"), Some(&Value::Null));
        assert!(temp.path().join("retail.db").exists());
    }

    #[tokio::test]
    async fn test_rejected_row_rolls_back_everything() {
        let temp = TempDir::new().unwrap();
        let store = SqliteStore::new(temp.path());
        let table = TableRef::new("retail", "shopping").unwrap();
        let definition = TableDefinition::shopping_behavior();

        let mut conn = store.connect().await.unwrap();
        conn.ensure_table(&table, &definition).await.unwrap();
        let good = read_csv(CSV.as_bytes(), "good.csv").unwrap();
        conn.insert_all(&table, &definition, &good).await.unwrap();

        let bad = read_csv(b"Customer_ID,Age\n3,40\n4,forty\n5,41\n", "bad.csv").unwrap();
        let err = conn.insert_all(&table, &definition, &bad).await.unwrap_err();
        assert!(matches!(err, StageError::InsertFailure { row: 1, .. }));
        assert_eq!(conn.row_count(&table).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_undeclared_column_is_schema_conflict() {
        let temp = TempDir::new().unwrap();
        let store = SqliteStore::new(temp.path());
        let table = TableRef::new("retail", "shopping").unwrap();
        let definition = TableDefinition::shopping_behavior();
        let dataset = read_csv(b"Customer_ID,Loyalty\n1,gold\n", "extra.csv").unwrap();

        let mut conn = store.connect().await.unwrap();
        conn.ensure_table(&table, &definition).await.unwrap();
        let err = conn.insert_all(&table, &definition, &dataset).await.unwrap_err();
        assert_eq!(err.code(), "SchemaConflict");
        assert_eq!(conn.row_count(&table).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_missing_schema_or_table_is_not_found() {
        let temp = TempDir::new().unwrap();
        let store = SqliteStore::new(temp.path());
        let definition = TableDefinition::shopping_behavior();
        let mut conn = store.connect().await.unwrap();

        let missing_schema = TableRef::new("nowhere", "shopping").unwrap();
        let err = conn.select_all(&missing_schema).await.unwrap_err();
        assert_eq!(err.code(), "TableNotFound");

        let present = TableRef::new("retail", "shopping").unwrap();
        conn.ensure_table(&present, &definition).await.unwrap();
        let missing_table = TableRef::new("retail", "other").unwrap();
        let err = conn.select_all(&missing_table).await.unwrap_err();
        assert_eq!(err.code(), "TableNotFound");
    }

    #[tokio::test]
    async fn test_builtin_database_names_are_rejected() {
        let temp = TempDir::new().unwrap();
        let store = SqliteStore::new(temp.path());
        let definition = TableDefinition::shopping_behavior();
        let dataset = read_csv(CSV.as_bytes(), "test.csv").unwrap();
        let mut conn = store.connect().await.unwrap();

        for schema in ["main", "temp", "MAIN"] {
            let table = TableRef::new(schema, "shopping").unwrap();
            let err = conn.ensure_table(&table, &definition).await.unwrap_err();
            assert_eq!(err.code(), "SchemaConflict", "schema {}", schema);
            let err = conn.insert_all(&table, &definition, &dataset).await.unwrap_err();
            assert_eq!(err.code(), "SchemaConflict", "schema {}", schema);
            let err = conn.select_all(&table).await.unwrap_err();
            assert_eq!(err.code(), "SchemaConflict", "schema {}", schema);
        }
        assert!(!temp.path().join("main.db").exists());
    }

    #[tokio::test]
    async fn test_ensure_table_is_idempotent_across_connections() {
        let temp = TempDir::new().unwrap();
        let store = SqliteStore::new(temp.path());
        let table = TableRef::new("retail", "shopping").unwrap();
        let definition = TableDefinition::shopping_behavior();
        let dataset = read_csv(CSV.as_bytes(), "test.csv").unwrap();

        for _ in 0..2 {
            let mut conn = store.connect().await.unwrap();
            conn.ensure_table(&table, &definition).await.unwrap();
            conn.insert_all(&table, &definition, &dataset).await.unwrap();
        }

        let mut conn = store.connect().await.unwrap();
        assert_eq!(conn.row_count(&table).await.unwrap(), 4);
    }
}
