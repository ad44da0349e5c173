// ABOUTME: Typed failure taxonomy for the migration run
// ABOUTME: Variants are wrapped in anyhow::Error with table or stage context

use thiserror::Error;

/// Failures that end a migration run.
///
/// Every variant is fatal. A tuple with no resolvable destination role is not
/// an error and never shows up here (see `migration::mapping::MappingOutcome`).
#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("invalid {side} connection string: {reason}")]
    InvalidConnectionString { side: &'static str, reason: String },

    #[error("could not connect to {side} database")]
    Connect {
        side: &'static str,
        #[source]
        source: sqlx::Error,
    },

    #[error("failed to read {what} metadata for table {table}")]
    Catalog {
        table: String,
        what: &'static str,
        #[source]
        source: sqlx::Error,
    },

    #[error("failed to create table {table} in destination database")]
    Ddl {
        table: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("failed to read row {row} from source table {table}")]
    Decode {
        table: String,
        row: u64,
        #[source]
        source: sqlx::Error,
    },

    #[error("failed to insert row {row} into destination table {table}")]
    Insert {
        table: String,
        row: u64,
        #[source]
        source: sqlx::Error,
    },

    #[error(
        "{count} user_roles_mapping row(s) reference roles that are about to be regenerated; \
         re-run with --reset-mappings to clear them first"
    )]
    MappingsWouldOrphan { count: i64 },

    #[error("stage '{stage}' requires '{requires}', which does not run before it")]
    StageOrder { stage: String, requires: String },

    #[error("stage '{stage}' requires unknown stage '{requires}'")]
    UnknownStage { stage: String, requires: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_order_message_names_both_stages() {
        let err = MigrationError::StageOrder {
            stage: "seed-roles".to_string(),
            requires: "copy:team".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("seed-roles"));
        assert!(msg.contains("copy:team"));
    }

    #[test]
    fn test_orphan_message_mentions_flag() {
        let err = MigrationError::MappingsWouldOrphan { count: 4 };
        assert!(err.to_string().contains("--reset-mappings"));
        assert!(err.to_string().starts_with("4 "));
    }
}
