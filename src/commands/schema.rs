// ABOUTME: Schema command - prints the destination DDL for each table
// ABOUTME: Reads only the source catalog and never writes to either database

use crate::migration::{create_table_statement, destination_schema, tables, MySqlCatalog};
use crate::mysql;
use anyhow::{anyhow, Result};

/// Print the `CREATE TABLE` statement the migration would run for each table,
/// or for `table` alone when given.
pub async fn schema(source_url: &str, table: Option<&str>) -> Result<()> {
    let specs = match table {
        Some(name) => vec![tables::find(name)
            .ok_or_else(|| anyhow!("Unknown table '{}'. Known tables: {}", name, known_tables()))?],
        None => tables::TABLES.iter().collect(),
    };

    let source = mysql::connect("source", source_url).await?;
    let catalog = MySqlCatalog::new(source.clone());

    for spec in specs {
        let schema = destination_schema(&catalog, spec).await?;
        println!("-- {} -> {}", spec.source, spec.destination);
        println!("{};", create_table_statement(spec.destination, &schema));
        println!();
    }

    source.close().await;
    Ok(())
}

fn known_tables() -> String {
    tables::TABLES
        .iter()
        .map(|t| t.source)
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unknown_table_fails_before_connecting() {
        let err = schema("mysql://u:p@127.0.0.1:1/legacy", Some("no_such_table"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Unknown table 'no_such_table'"));
    }

    #[test]
    fn test_known_tables_lists_registry() {
        let listed = known_tables();
        assert!(listed.contains("team"));
        assert!(listed.contains("audit_logs"));
    }

    #[tokio::test]
    #[ignore]
    async fn test_schema_prints_all_tables() {
        let source = std::env::var("TEST_SOURCE_URL").unwrap();
        assert!(schema(&source, None).await.is_ok());
    }
}
