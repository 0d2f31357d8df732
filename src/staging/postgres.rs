//! PostgreSQL staging store

use super::{StagingConnection, StagingStore};
use crate::dataset::{
    Column, ColumnDef, Dataset, Record, Schema, SqlDialect, SqlType, TableDefinition, TableRef,
    Value, ValueType, quote,
};
use crate::error::{Result, StageError};
use tokio_postgres::error::SqlState;
use tokio_postgres::types::{ToSql, Type};
use tokio_postgres::{Client, Config, NoTls, Row, Statement, Transaction};

type Param = Box<dyn ToSql + Sync + Send>;

/// Staging store backed by a PostgreSQL server
#[derive(Clone)]
pub struct PostgresStore {
    config: Config,
}

impl PostgresStore {
    pub fn new(host: &str, port: u16, dbname: &str, user: &str, password: &str) -> Self {
        let mut config = Config::new();
        config
            .host(host)
            .port(port)
            .dbname(dbname)
            .user(user)
            .password(password)
            .application_name(env!("CARGO_PKG_NAME"));
        Self { config }
    }
}

impl std::fmt::Debug for PostgresStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Config's Debug redacts the password
        f.debug_struct("PostgresStore")
            .field("config", &self.config)
            .finish()
    }
}

impl StagingStore for PostgresStore {
    type Connection = PostgresConnection;

    fn dialect(&self) -> SqlDialect {
        SqlDialect::Postgres
    }

    async fn connect(&self) -> Result<PostgresConnection> {
        let (client, connection) = self
            .config
            .connect(NoTls)
            .await
            .map_err(|e| StageError::connection(format!("cannot connect to staging database: {}", e)))?;

        // The connection task ends once the client is dropped
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                log::warn!("Staging database connection error: {}", e);
            }
        });

        log::debug!("Connected to staging database {:?}", self.config.get_dbname());
        Ok(PostgresConnection { client })
    }
}

/// Open PostgreSQL staging connection
pub struct PostgresConnection {
    client: Client,
}

impl PostgresConnection {
    async fn require_table(&self, table: &TableRef) -> Result<()> {
        let found = self
            .client
            .query_opt(
                "SELECT 1 FROM information_schema.tables WHERE table_schema = $1 AND table_name = $2",
                &[&table.schema(), &table.table()],
            )
            .await
            .map_err(|e| classify(e, table))?;
        match found {
            Some(_) => Ok(()),
            None => Err(StageError::TableNotFound(table.to_string())),
        }
    }
}

impl StagingConnection for PostgresConnection {
    async fn ensure_table(&mut self, table: &TableRef, definition: &TableDefinition) -> Result<()> {
        let ddl = format!(
            "CREATE SCHEMA IF NOT EXISTS {};\n{}",
            quote(table.schema()),
            definition.create_table_sql(table, SqlDialect::Postgres)
        );
        log::trace!("{}", ddl);
        self.client.batch_execute(&ddl).await.map_err(|e| {
            if e.is_closed() || e.code().is_none() {
                StageError::connection(e)
            } else {
                StageError::SchemaConflict(format!("cannot create {}: {}", table, e))
            }
        })
    }

    async fn insert_all(
        &mut self,
        table: &TableRef,
        definition: &TableDefinition,
        dataset: &Dataset,
    ) -> Result<usize> {
        let bound = definition.bind(dataset.schema())?;
        let columns = dataset.schema().names().map(quote).collect::<Vec<_>>();
        let placeholders = (1..=columns.len()).map(|i| format!("${}", i)).collect::<Vec<_>>();
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            table.quoted(),
            columns.join(", "),
            placeholders.join(", ")
        );

        let tx = self.client.transaction().await.map_err(StageError::connection)?;
        let result = insert_rows(&tx, &sql, definition, &bound, dataset).await;
        match result {
            Ok(inserted) => {
                tx.commit().await.map_err(|e| StageError::InsertFailure {
                    row: dataset.len(),
                    reason: format!("commit failed: {}", e),
                })?;
                Ok(inserted)
            }
            Err(e) => {
                if let Err(rollback) = tx.rollback().await {
                    log::warn!("Rollback of {} failed: {}", table, rollback);
                }
                Err(e)
            }
        }
    }

    async fn select_all(&mut self, table: &TableRef) -> Result<Dataset> {
        self.require_table(table).await?;

        let statement = self
            .client
            .prepare(&format!("SELECT * FROM {}", table.quoted()))
            .await
            .map_err(|e| classify(e, table))?;
        let schema = Schema::new(
            statement
                .columns()
                .iter()
                .map(|c| Ok(Column::new(c.name(), column_type(c.name(), c.type_())?)))
                .collect::<Result<Vec<_>>>()?,
        )?;

        let rows = self
            .client
            .query(&statement, &[])
            .await
            .map_err(|e| classify(e, table))?;
        let records = rows
            .iter()
            .map(|row| read_row(row, &statement))
            .collect::<Result<Vec<_>>>()?;

        Dataset::new(schema, records)
    }

    async fn row_count(&mut self, table: &TableRef) -> Result<u64> {
        self.require_table(table).await?;
        let row = self
            .client
            .query_one(&format!("SELECT COUNT(*) FROM {}", table.quoted()), &[])
            .await
            .map_err(|e| classify(e, table))?;
        let count: i64 = row.get(0);
        Ok(count.max(0) as u64)
    }
}

async fn insert_rows(
    tx: &Transaction<'_>,
    sql: &str,
    definition: &TableDefinition,
    bound: &[&ColumnDef],
    dataset: &Dataset,
) -> Result<usize> {
    let statement: Statement = tx
        .prepare(sql)
        .await
        .map_err(|e| StageError::SchemaConflict(format!("{}", e)))?;

    for (row, record) in dataset.records().iter().enumerate() {
        let coerced = definition.coerce_record(bound, record, row)?;
        let params = bound
            .iter()
            .zip(coerced)
            .map(|(def, value)| to_param(def, value, row))
            .collect::<Result<Vec<Param>>>()?;
        let refs = params
            .iter()
            .map(|p| p.as_ref() as &(dyn ToSql + Sync))
            .collect::<Vec<_>>();
        tx.execute(&statement, &refs)
            .await
            .map_err(|e| StageError::InsertFailure {
                row,
                reason: e.to_string(),
            })?;
    }
    Ok(dataset.len())
}

/// Typed parameter for one coerced value. Nulls carry the column's type so
/// the server accepts them.
fn to_param(def: &ColumnDef, value: Value, row: usize) -> Result<Param> {
    let param: Param = match (def.sql_type, value) {
        (SqlType::Integer, Value::Int(i)) => {
            let narrowed = i32::try_from(i).map_err(|_| StageError::InsertFailure {
                row,
                reason: format!("{} value {} is out of INTEGER range", def.name, i),
            })?;
            Box::new(narrowed)
        }
        (SqlType::Integer, _) => Box::new(None::<i32>),
        (SqlType::Float, Value::Float(f)) => Box::new(f),
        (SqlType::Float, _) => Box::new(None::<f64>),
        (SqlType::Varchar(_), Value::Text(s)) => Box::new(s),
        (SqlType::Varchar(_), _) => Box::new(None::<String>),
    };
    Ok(param)
}

fn column_type(name: &str, ty: &Type) -> Result<ValueType> {
    if [Type::INT2, Type::INT4, Type::INT8].contains(ty) {
        Ok(ValueType::Integer)
    } else if [Type::FLOAT4, Type::FLOAT8].contains(ty) {
        Ok(ValueType::Float)
    } else if [Type::TEXT, Type::VARCHAR, Type::BPCHAR, Type::NAME].contains(ty) {
        Ok(ValueType::Text)
    } else {
        Err(StageError::SchemaConflict(format!(
            "column '{}' has unsupported type {}",
            name, ty
        )))
    }
}

fn read_row(row: &Row, statement: &Statement) -> Result<Record> {
    statement
        .columns()
        .iter()
        .enumerate()
        .map(|(i, column)| {
            let ty = column.type_();
            let value = if *ty == Type::INT2 {
                row.try_get::<_, Option<i16>>(i).map(|v| Value::from(v.map(i64::from)))
            } else if *ty == Type::INT4 {
                row.try_get::<_, Option<i32>>(i).map(|v| Value::from(v.map(i64::from)))
            } else if *ty == Type::INT8 {
                row.try_get::<_, Option<i64>>(i).map(Value::from)
            } else if *ty == Type::FLOAT4 {
                row.try_get::<_, Option<f32>>(i).map(|v| Value::from(v.map(f64::from)))
            } else if *ty == Type::FLOAT8 {
                row.try_get::<_, Option<f64>>(i).map(Value::from)
            } else {
                row.try_get::<_, Option<String>>(i).map(Value::from)
            };
            value.map_err(StageError::connection)
        })
        .collect()
}

/// Missing schema or table is `TableNotFound`; anything else is the
/// connection's fault.
fn classify(e: tokio_postgres::Error, table: &TableRef) -> StageError {
    match e.code() {
        Some(code) if *code == SqlState::UNDEFINED_TABLE || *code == SqlState::INVALID_SCHEMA_NAME => {
            StageError::TableNotFound(table.to_string())
        }
        _ => StageError::connection(e),
    }
}
