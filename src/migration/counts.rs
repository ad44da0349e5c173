// ABOUTME: Row count comparison between source and destination tables
// ABOUTME: Backs the verify command's per-table integrity report

use super::catalog::table_exists_in;
use super::tables::{Projection, RowCheck, TableSpec};
use crate::utils::quote_ident;
use anyhow::{Context, Result};
use sqlx::mysql::MySqlPool;
use sqlx::Row;

/// Result of comparing one migrated table with what it should hold
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowCountResult {
    pub source_table: String,
    pub destination_table: String,
    pub expected_rows: i64,
    /// `None` when the destination table does not exist.
    pub destination_rows: Option<i64>,
}

impl RowCountResult {
    /// Returns true if the destination exists and holds the expected number of rows
    pub fn is_valid(&self) -> bool {
        self.destination_rows == Some(self.expected_rows)
    }
}

/// Where the expected row count of a destination table comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExpectedCount {
    /// Run `sql` on the source.
    Source { sql: String },
    /// Run `sql` on the destination and multiply by `factor`.
    Destination { sql: String, factor: i64 },
}

fn count_sql(table: &str) -> String {
    format!("SELECT COUNT(*) AS n FROM {}", quote_ident(table))
}

/// Count query for the rows `spec` should leave in its destination table.
///
/// A fixed projection is counted as a derived table, since a join can return
/// more or fewer rows than its driving table holds.
pub fn expected_count(spec: &TableSpec) -> ExpectedCount {
    match spec.row_check {
        RowCheck::SourceRows => {
            let sql = match spec.projection {
                Projection::AllColumns => count_sql(spec.source),
                Projection::Query(select) => {
                    format!("SELECT COUNT(*) AS n FROM ({}) AS projected", select)
                }
            };
            ExpectedCount::Source { sql }
        }
        RowCheck::PerDestinationRow { table, factor } => ExpectedCount::Destination {
            sql: count_sql(table),
            factor,
        },
    }
}

async fn fetch_count(pool: &MySqlPool, sql: &str) -> Result<i64> {
    let row = sqlx::query(sql)
        .fetch_one(pool)
        .await
        .with_context(|| format!("Failed to run count query: {}", sql))?;
    Ok(row.try_get("n")?)
}

/// `SELECT COUNT(*)` on a table.
pub async fn count_rows(pool: &MySqlPool, table: &str) -> Result<i64> {
    fetch_count(pool, &count_sql(table))
        .await
        .with_context(|| format!("Failed to count rows in {}", table))
}

/// Compare a destination table's row count with what the migration should
/// have written into it.
pub async fn compare_row_counts(
    source: &MySqlPool,
    dest: &MySqlPool,
    spec: &TableSpec,
) -> Result<RowCountResult> {
    tracing::debug!("Comparing {} -> {}", spec.source, spec.destination);

    let expected_rows = match expected_count(spec) {
        ExpectedCount::Source { sql } => fetch_count(source, &sql).await?,
        ExpectedCount::Destination { sql, factor } => fetch_count(dest, &sql).await? * factor,
    };

    let exists = table_exists_in(dest, spec.destination)
        .await
        .with_context(|| format!("Failed to check existence of {}", spec.destination))?;
    let destination_rows = if exists {
        Some(count_rows(dest, spec.destination).await?)
    } else {
        None
    };

    Ok(RowCountResult {
        source_table: spec.source.to_string(),
        destination_table: spec.destination.to_string(),
        expected_rows,
        destination_rows,
    })
}
