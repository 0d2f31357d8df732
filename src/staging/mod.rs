//! Relational staging store
//!
//! The staging table is the Loader's write target and the Extractor's read
//! source. A store hands out connections; a connection is owned by exactly
//! one stage call and dropped (closed) on every exit path.

mod postgres;
mod sqlite;

pub use postgres::{PostgresConnection, PostgresStore};
pub use sqlite::{SqliteConnection, SqliteStore};

use crate::dataset::{Dataset, SqlDialect, TableDefinition, TableRef};
use crate::error::Result;
use crate::etl::{Extractor, Loader};
use std::future::Future;

/// Source of staging connections
pub trait StagingStore: Send + Sync {
    type Connection: StagingConnection;

    /// SQL dialect used to render table definitions
    fn dialect(&self) -> SqlDialect;

    /// Open a connection
    ///
    /// # Errors
    /// `ConnectionFailure` if the store is unreachable. No connection state
    /// exists after a failed connect.
    fn connect(&self) -> impl Future<Output = Result<Self::Connection>> + Send;
}

/// One open connection to the staging store
pub trait StagingConnection: Send {
    /// Create the schema namespace and the table if they are absent
    fn ensure_table(
        &mut self,
        table: &TableRef,
        definition: &TableDefinition,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Insert every record in one transaction
    ///
    /// The dataset's columns are checked against `definition` before the
    /// transaction starts. If any row is rejected the transaction is rolled
    /// back, leaving the table exactly as it was.
    ///
    /// # Errors
    /// `SchemaConflict` for undeclared columns, `InsertFailure` for a
    /// rejected row
    fn insert_all(
        &mut self,
        table: &TableRef,
        definition: &TableDefinition,
        dataset: &Dataset,
    ) -> impl Future<Output = Result<usize>> + Send;

    /// Read the whole table, columns in store-reported order
    ///
    /// # Errors
    /// `TableNotFound` if the schema or table does not exist
    fn select_all(&mut self, table: &TableRef) -> impl Future<Output = Result<Dataset>> + Send;

    /// Number of rows currently in the table
    fn row_count(&mut self, table: &TableRef) -> impl Future<Output = Result<u64>> + Send;
}

/// Write a dataset into the staging table, creating it if needed
pub struct StagingTableWriter<'a, S> {
    store: &'a S,
    table: TableRef,
    definition: &'a TableDefinition,
}

impl<'a, S: StagingStore> StagingTableWriter<'a, S> {
    pub fn new(store: &'a S, table: TableRef, definition: &'a TableDefinition) -> Self {
        Self {
            store,
            table,
            definition,
        }
    }
}

impl<S: StagingStore> Loader for StagingTableWriter<'_, S> {
    async fn load(&self, dataset: Dataset) -> Result<usize> {
        let mut conn = self.store.connect().await?;
        conn.ensure_table(&self.table, self.definition).await?;
        let inserted = conn.insert_all(&self.table, self.definition, &dataset).await?;
        log::info!("Inserted {} rows into {}", inserted, self.table);
        Ok(inserted)
    }
}

/// Read the whole staging table
pub struct StagingTableReader<'a, S> {
    store: &'a S,
    table: TableRef,
}

impl<'a, S: StagingStore> StagingTableReader<'a, S> {
    pub fn new(store: &'a S, table: TableRef) -> Self {
        Self { store, table }
    }
}

impl<S: StagingStore> Extractor for StagingTableReader<'_, S> {
    async fn extract(&self) -> Result<Dataset> {
        let mut conn = self.store.connect().await?;
        let dataset = conn.select_all(&self.table).await?;
        log::debug!("Selected {} rows from {}", dataset.len(), self.table);
        Ok(dataset)
    }
}

/// Staging store selected at run time
pub enum AnyStagingStore {
    Postgres(PostgresStore),
    Sqlite(SqliteStore),
}

pub enum AnyStagingConnection {
    Postgres(PostgresConnection),
    Sqlite(SqliteConnection),
}

impl StagingStore for AnyStagingStore {
    type Connection = AnyStagingConnection;

    fn dialect(&self) -> SqlDialect {
        match self {
            Self::Postgres(store) => store.dialect(),
            Self::Sqlite(store) => store.dialect(),
        }
    }

    async fn connect(&self) -> Result<Self::Connection> {
        Ok(match self {
            Self::Postgres(store) => AnyStagingConnection::Postgres(store.connect().await?),
            Self::Sqlite(store) => AnyStagingConnection::Sqlite(store.connect().await?),
        })
    }
}

impl StagingConnection for AnyStagingConnection {
    async fn ensure_table(&mut self, table: &TableRef, definition: &TableDefinition) -> Result<()> {
        match self {
            Self::Postgres(conn) => conn.ensure_table(table, definition).await,
            Self::Sqlite(conn) => conn.ensure_table(table, definition).await,
        }
    }

    async fn insert_all(
        &mut self,
        table: &TableRef,
        definition: &TableDefinition,
        dataset: &Dataset,
    ) -> Result<usize> {
        match self {
            Self::Postgres(conn) => conn.insert_all(table, definition, dataset).await,
            Self::Sqlite(conn) => conn.insert_all(table, definition, dataset).await,
        }
    }

    async fn select_all(&mut self, table: &TableRef) -> Result<Dataset> {
        match self {
            Self::Postgres(conn) => conn.select_all(table).await,
            Self::Sqlite(conn) => conn.select_all(table).await,
        }
    }

    async fn row_count(&mut self, table: &TableRef) -> Result<u64> {
        match self {
            Self::Postgres(conn) => conn.row_count(table).await,
            Self::Sqlite(conn) => conn.row_count(table).await,
        }
    }
}
