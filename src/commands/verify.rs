// ABOUTME: Verify command implementation - compares row counts after a migration
// ABOUTME: Reports per-table source and destination counts with a progress bar

use crate::config::ConnectionSettings;
use crate::migration::{compare_row_counts, RowCountResult, TABLES};
use crate::mysql;
use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};

/// Verify that every migrated table holds the rows the migration wrote into it
///
/// 1. Connects to both databases
/// 2. Counts the rows each destination table should hold and the rows it holds
/// 3. Reports missing destination tables and count mismatches
///
/// Tables are checked one at a time.
///
/// # Errors
///
/// Returns an error if a connection or count query fails, or if any table
/// fails verification.
pub async fn verify(settings: &ConnectionSettings) -> Result<Vec<RowCountResult>> {
    tracing::info!("Starting row count verification...");

    let source = mysql::connect("source", &settings.source_url).await?;
    let dest = mysql::connect("destination", &settings.dest_url).await?;

    let progress = ProgressBar::new(TABLES.len() as u64);
    progress.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")
            .context("Invalid progress bar template")?
            .progress_chars("##-"),
    );

    let mut results = Vec::with_capacity(TABLES.len());
    for spec in TABLES {
        progress.set_message(format!("Counting {}", spec.source));
        let result = compare_row_counts(&source, &dest, spec).await;
        progress.inc(1);
        results.push(result?);
    }
    progress.finish_with_message("Verification complete");

    source.close().await;
    dest.close().await;

    let mut mismatches = 0;
    for result in &results {
        if result.is_valid() {
            tracing::info!(
                "  ✓ {}: {} rows",
                result.destination_table,
                result.expected_rows
            );
            continue;
        }
        mismatches += 1;
        match result.destination_rows {
            Some(rows) => tracing::error!(
                "  ✗ {}: MISMATCH: expected {} (from {}), destination={}",
                result.destination_table,
                result.expected_rows,
                result.source_table,
                rows
            ),
            None => tracing::error!("  ✗ {}: missing in destination", result.destination_table),
        }
    }

    tracing::info!("");
    tracing::info!("========================================");
    tracing::info!("Verification Summary");
    tracing::info!("========================================");
    tracing::info!("Total tables: {}", results.len());
    tracing::info!("✓ Matches: {}", results.len() - mismatches);
    tracing::info!("✗ Mismatches: {}", mismatches);
    tracing::info!("========================================");

    if mismatches > 0 {
        anyhow::bail!("{} table(s) failed verification", mismatches);
    }

    tracing::info!("✓ ALL TABLES VERIFIED SUCCESSFULLY!");
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    #[ignore]
    async fn test_verify_command() {
        let source = std::env::var("TEST_SOURCE_URL").unwrap();
        let target = std::env::var("TEST_TARGET_URL").unwrap();
        let settings = ConnectionSettings::new(source, target).unwrap();

        match verify(&settings).await {
            Ok(results) => {
                println!("✓ Verified {} tables", results.len());
                assert_eq!(results.len(), TABLES.len());
            }
            // Mismatches are a valid outcome before a migration has run
            Err(e) => println!("Verify command result: {:?}", e),
        }
    }
}
