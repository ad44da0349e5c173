// ABOUTME: Table copy from source to destination with schema creation
// ABOUTME: Streams source rows and replays each as a parameterized INSERT

use super::catalog::Catalog;
use super::ddl;
use super::tables::TableSpec;
use crate::error::MigrationError;
use crate::mysql::{bind_value, decode_row};
use crate::utils::{placeholders, quote_ident, quote_list};
use anyhow::{Context, Result};
use futures::TryStreamExt;
use sqlx::mysql::{MySqlPool, MySqlRow};
use sqlx::{Column, Row};

/// Row counters for one table copy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CopyStats {
    pub rows_read: u64,
    pub rows_inserted: u64,
}

/// Create the destination table for `spec` if it does not exist.
///
/// Returns the statement that was executed.
pub async fn create_destination_table<C: Catalog + ?Sized>(
    dest: &MySqlPool,
    catalog: &C,
    spec: &TableSpec,
) -> Result<String> {
    tracing::info!("Retrieving schema for table: {}", spec.source);
    let schema = ddl::destination_schema(catalog, spec).await?;
    let statement = ddl::create_table_statement(spec.destination, &schema);
    tracing::debug!("{}", statement);

    sqlx::query(&statement)
        .execute(dest)
        .await
        .map_err(|source| MigrationError::Ddl {
            table: spec.destination.to_string(),
            source,
        })?;
    Ok(statement)
}

/// Copy one table
///
/// 1. Builds destination DDL from the source catalog and the table's rules
/// 2. Creates the destination table if it does not exist
/// 3. Streams the source projection row by row
/// 4. Inserts each row with destination column names aligned positionally
///
/// # Errors
///
/// Any catalog, DDL, decode, or insert failure aborts the copy. Rows inserted
/// before the failure stay in the destination.
pub async fn copy_table<C: Catalog + ?Sized>(
    source: &MySqlPool,
    dest: &MySqlPool,
    catalog: &C,
    spec: &TableSpec,
) -> Result<CopyStats> {
    create_destination_table(dest, catalog, spec)
        .await
        .with_context(|| format!("Failed to create table {}", spec.destination))?;

    tracing::info!("Migrating data for table: {}", spec.source);
    let select = spec.select_sql();
    let mut rows = sqlx::query(&select).fetch(source);

    let mut stats = CopyStats::default();
    let mut insert_sql: Option<String> = None;

    while let Some(row) = rows.try_next().await.map_err(|source| MigrationError::Decode {
        table: spec.source.to_string(),
        row: stats.rows_read + 1,
        source,
    })? {
        stats.rows_read += 1;

        let values = decode_row(&row).map_err(|source| MigrationError::Decode {
            table: spec.source.to_string(),
            row: stats.rows_read,
            source,
        })?;

        let sql = insert_sql.get_or_insert_with(|| insert_statement(spec, &row));
        let query = values.into_iter().fold(sqlx::query(sql.as_str()), bind_value);
        query
            .execute(dest)
            .await
            .map_err(|source| MigrationError::Insert {
                table: spec.destination.to_string(),
                row: stats.rows_read,
                source,
            })?;
        stats.rows_inserted += 1;
    }

    tracing::info!(
        "Migrated {} records from source table {}.",
        stats.rows_read,
        spec.source
    );
    tracing::info!(
        "Inserted {} records into destination table {}.",
        stats.rows_inserted,
        spec.destination
    );
    Ok(stats)
}

/// Destination column names for a result set, after renames.
pub fn destination_columns<'a, I>(spec: &TableSpec, result_columns: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a str>,
{
    result_columns
        .into_iter()
        .map(|name| spec.rename(name).to_string())
        .collect()
}

fn insert_statement(spec: &TableSpec, row: &MySqlRow) -> String {
    let columns = destination_columns(spec, row.columns().iter().map(|c| c.name()));
    build_insert(spec.destination, &columns)
}

/// `INSERT INTO t (cols) VALUES (?, ...)`.
pub fn build_insert(table: &str, columns: &[String]) -> String {
    format!(
        "INSERT INTO {} ({}) VALUES ({})",
        quote_ident(table),
        quote_list(columns),
        placeholders(columns.len())
    )
}
