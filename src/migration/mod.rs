// ABOUTME: Migration building blocks module
// ABOUTME: Catalog introspection, DDL synthesis, table copy, role seeding and mapping

pub mod catalog;
pub mod copy;
pub mod counts;
pub mod ddl;
pub mod ids;
pub mod mapping;
pub mod roles;
pub mod tables;

pub use catalog::{Catalog, MySqlCatalog, TableSchema};
pub use copy::{copy_table, create_destination_table, CopyStats};
pub use counts::{
    compare_row_counts, count_rows, expected_count, ExpectedCount, RowCountResult,
};
pub use ddl::{create_table_statement, destination_schema};
pub use ids::{IdGenerator, UuidGenerator};
pub use mapping::{reconcile_role_mappings, MappingOutcome, ReconcileStats};
pub use roles::{seed_roles, MappingPolicy, MySqlRoleStore, RoleStore, SeedStats};
pub use tables::{RowCheck, TableSpec, JOIN_ONLY_TABLES, TABLES};
