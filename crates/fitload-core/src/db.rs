// crates/fitload-core/src/db.rs

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::query_builder::Separated;
use sqlx::{PgConnection, PgPool, Postgres, QueryBuilder};
use tracing::debug;

use crate::loader::{validate_identifier, Destination, LoadError, TableName};
use crate::table::{Cell, CleanTable, ColumnDef, ColumnType};

pub type DbPool = PgPool;

/// Postgres caps a single statement at this many bind parameters.
pub const MAX_BIND_PARAMETERS: usize = 65_535;

/// Establish a Postgres connection pool for the loader.
pub async fn connect(database_url: &str, max_connections: u32) -> Result<DbPool> {
    PgPoolOptions::new()
        .max_connections(max_connections.max(1))
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url)
        .await
        .with_context(|| "failed to connect to Postgres")
}

/// Rows per `INSERT`, never more than `batch_size` and never more than the
/// bind parameter limit allows for `columns` columns.
pub fn rows_per_statement(batch_size: usize, columns: usize) -> usize {
    (MAX_BIND_PARAMETERS / columns.max(1)).min(batch_size).max(1)
}

#[derive(Debug, Clone)]
pub struct PgDestination {
    pool: DbPool,
}

impl PgDestination {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn write(
        &self,
        table: &TableName,
        rows: &CleanTable,
        batch_size: usize,
        truncate: bool,
    ) -> Result<u64, LoadError> {
        let mut db_tx = self.pool.begin().await?;

        // Any early return drops the transaction, which rolls it back.
        ensure_table(&mut db_tx, table, rows.columns()).await?;
        if truncate {
            sqlx::query(&format!("TRUNCATE TABLE {}", table.quoted()))
                .execute(&mut *db_tx)
                .await?;
        }
        let inserted = insert_rows(&mut db_tx, table, rows, batch_size).await?;

        db_tx.commit().await?;
        Ok(inserted)
    }
}

#[async_trait]
impl Destination for PgDestination {
    async fn replace_table(
        &self,
        table: &TableName,
        rows: &CleanTable,
        batch_size: usize,
    ) -> Result<u64, LoadError> {
        self.write(table, rows, batch_size, true).await
    }

    async fn append_rows(
        &self,
        table: &TableName,
        rows: &CleanTable,
        batch_size: usize,
    ) -> Result<u64, LoadError> {
        self.write(table, rows, batch_size, false).await
    }

    async fn row_count(&self, table: &TableName) -> Result<u64, LoadError> {
        let count: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", table.quoted()))
            .fetch_one(&self.pool)
            .await?;
        Ok(count.max(0) as u64)
    }

    async fn test_connection(&self) -> Result<String, LoadError> {
        let version: String = sqlx::query_scalar("SELECT version()")
            .fetch_one(&self.pool)
            .await?;
        Ok(version)
    }
}

/// Creates the schema and table when missing and adds any column the table
/// lacks, so a reload never fails on a first run or a newly derived column.
async fn ensure_table(
    conn: &mut PgConnection,
    table: &TableName,
    columns: &[ColumnDef],
) -> Result<(), LoadError> {
    for column in columns {
        validate_identifier(&column.name)?;
    }

    if let Some(schema) = &table.schema {
        sqlx::query(&format!("CREATE SCHEMA IF NOT EXISTS \"{schema}\""))
            .execute(&mut *conn)
            .await?;
    }

    let definitions = columns
        .iter()
        .map(|c| format!("\"{}\" {}", c.name, c.column_type.sql_type()))
        .collect::<Vec<_>>()
        .join(", ");
    sqlx::query(&format!(
        "CREATE TABLE IF NOT EXISTS {} ({definitions})",
        table.quoted()
    ))
    .execute(&mut *conn)
    .await?;

    for column in columns {
        sqlx::query(&format!(
            "ALTER TABLE {} ADD COLUMN IF NOT EXISTS \"{}\" {}",
            table.quoted(),
            column.name,
            column.column_type.sql_type()
        ))
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

async fn insert_rows(
    conn: &mut PgConnection,
    table: &TableName,
    rows: &CleanTable,
    batch_size: usize,
) -> Result<u64, LoadError> {
    let columns = rows.columns();
    if rows.is_empty() || columns.is_empty() {
        return Ok(0);
    }

    let column_list = columns
        .iter()
        .map(|c| format!("\"{}\"", c.name))
        .collect::<Vec<_>>()
        .join(", ");
    let per_statement = rows_per_statement(batch_size, columns.len());
    let all_rows = rows.rows()?;

    let mut inserted = 0u64;
    for (batch_index, batch) in all_rows.chunks(per_statement).enumerate() {
        let mut builder: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("INSERT INTO {} ({column_list}) ", table.quoted()));
        builder.push_values(batch, |mut values, row| {
            for (cell, def) in row.iter().zip(columns) {
                bind_cell(&mut values, cell, def.column_type);
            }
        });
        let outcome = builder.build().execute(&mut *conn).await?;
        inserted += outcome.rows_affected();
        debug!(table = %table, batch = batch_index, rows = batch.len(), "inserted batch");
    }
    Ok(inserted)
}

/// Nulls are bound with the column's SQL type so Postgres never has to guess.
fn bind_cell(values: &mut Separated<'_, '_, Postgres, &'static str>, cell: &Cell, column_type: ColumnType) {
    match (cell, column_type) {
        (Cell::Text(v), _) => values.push_bind(v.clone()),
        (Cell::Integer(v), _) => values.push_bind(*v),
        (Cell::Float(v), _) => values.push_bind(*v),
        (Cell::Boolean(v), _) => values.push_bind(*v),
        (Cell::Timestamp(v), _) => values.push_bind(*v),
        (Cell::Date(v), _) => values.push_bind(*v),
        (Cell::Null, ColumnType::Text) => values.push_bind(None::<String>),
        (Cell::Null, ColumnType::Integer) => values.push_bind(None::<i64>),
        (Cell::Null, ColumnType::Float) => values.push_bind(None::<f64>),
        (Cell::Null, ColumnType::Boolean) => values.push_bind(None::<bool>),
        (Cell::Null, ColumnType::Timestamp) => values.push_bind(None::<chrono::NaiveDateTime>),
        (Cell::Null, ColumnType::Date) => values.push_bind(None::<chrono::NaiveDate>),
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statements_stay_under_bind_limit() {
        assert_eq!(rows_per_statement(5000, 10), 5000);
        assert_eq!(rows_per_statement(5000, 40), 1638);
        assert_eq!(rows_per_statement(0, 3), 1);
        assert!(rows_per_statement(usize::MAX, 70_000) >= 1);
    }
}
