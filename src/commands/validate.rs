// ABOUTME: Pre-flight validation command for migration readiness
// ABOUTME: Checks connectivity and that every source table the pipeline reads exists

use crate::config::ConnectionSettings;
use crate::migration::{Catalog, MySqlCatalog, JOIN_ONLY_TABLES, TABLES};
use crate::mysql;
use anyhow::{bail, Result};

/// Source tables read by the migration: every copied table plus the tables
/// only used by projections and the role assignment join.
pub fn required_source_tables() -> Vec<&'static str> {
    let mut tables: Vec<&'static str> = TABLES.iter().map(|t| t.source).collect();
    for extra in ["admins"].iter().chain(JOIN_ONLY_TABLES) {
        if !tables.contains(extra) {
            tables.push(*extra);
        }
    }
    tables
}

pub async fn validate(settings: &ConnectionSettings) -> Result<()> {
    tracing::info!("Starting validation...");

    // Step 1: Connect to both sides
    let source = mysql::connect("source", &settings.source_url).await?;
    let dest = mysql::connect("destination", &settings.dest_url).await?;

    // Step 2: Check source tables
    tracing::info!("Checking source tables...");
    let catalog = MySqlCatalog::new(source.clone());
    let mut missing = Vec::new();
    for table in required_source_tables() {
        if catalog.table_exists(table).await? {
            tracing::info!("  ✓ {}", table);
        } else {
            tracing::error!("  ✗ {} is missing", table);
            missing.push(table);
        }
    }

    source.close().await;
    dest.close().await;

    if !missing.is_empty() {
        bail!(
            "Source database is missing {} table(s): {}",
            missing.len(),
            missing.join(", ")
        );
    }

    tracing::info!("✅ Validation complete - ready for migration");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_required_tables_include_join_only_tables() {
        let tables = required_source_tables();
        assert!(tables.contains(&"users_role"));
        assert!(tables.contains(&"user_team_mapping"));
        assert!(tables.contains(&"admins"));
        assert!(tables.contains(&"audit_logs"));
        assert!(!tables.contains(&"audit_log"));
    }

    #[test]
    fn test_required_tables_have_no_duplicates() {
        let tables = required_source_tables();
        let mut deduped = tables.clone();
        deduped.sort_unstable();
        deduped.dedup();
        assert_eq!(tables.len(), deduped.len());
    }

    #[tokio::test]
    #[ignore]
    async fn test_validate_with_valid_databases_succeeds() {
        let source = std::env::var("TEST_SOURCE_URL").unwrap();
        let target = std::env::var("TEST_TARGET_URL").unwrap();
        let settings = ConnectionSettings::new(source, target).unwrap();

        let result = validate(&settings).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_validate_with_unreachable_source_fails() {
        let settings = ConnectionSettings::new(
            "mysql://u:p@127.0.0.1:1/legacy".to_string(),
            "mysql://u:p@127.0.0.1:1/platform".to_string(),
        )
        .unwrap();
        assert!(validate(&settings).await.is_err());
    }
}
