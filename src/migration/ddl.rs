// ABOUTME: Destination DDL synthesis from catalog descriptors and table rules
// ABOUTME: Renders MySQL CREATE TABLE IF NOT EXISTS statements

use super::catalog::{Catalog, Column, ForeignKey, KeyDef, TableSchema};
use super::tables::{TableShape, TableSpec};
use crate::utils::{quote_ident, quote_list};
use anyhow::{Context, Result};

/// Produce the destination schema for `spec`, reading the catalog only when
/// the table's shape is derived from it.
pub async fn destination_schema<C: Catalog + ?Sized>(
    catalog: &C,
    spec: &TableSpec,
) -> Result<TableSchema> {
    match spec.shape {
        TableShape::Replaced { .. } => Ok(apply_overrides(spec, TableSchema::default())),
        TableShape::Introspected { .. } => {
            let schema = catalog
                .introspect(spec.source)
                .await
                .with_context(|| format!("Failed to get schema for table {}", spec.source))?;
            Ok(apply_overrides(spec, schema))
        }
    }
}

/// Apply the table's structural rules to an introspected schema.
///
/// For `Replaced` shapes the introspected schema is discarded entirely.
pub fn apply_overrides(spec: &TableSpec, mut schema: TableSchema) -> TableSchema {
    match spec.shape {
        TableShape::Replaced {
            columns,
            primary_key,
        } => TableSchema {
            columns: columns.iter().map(|c| c.to_column()).collect(),
            primary_key: primary_key.iter().map(|c| c.to_string()).collect(),
            ..TableSchema::default()
        },
        TableShape::Introspected {
            extra_columns,
            extra_foreign_keys,
        } => {
            for (from, to) in spec.renames {
                if let Some(col) = schema.columns.iter_mut().find(|c| c.name == *from) {
                    col.name = to.to_string();
                }
            }
            schema
                .columns
                .extend(extra_columns.iter().map(|c| c.to_column()));
            schema
                .foreign_keys
                .extend(extra_foreign_keys.iter().map(|fk| fk.to_foreign_key()));
            schema
        }
    }
}

/// Render one column definition.
pub fn render_column(column: &Column) -> String {
    let mut def = format!("{} {}", quote_ident(&column.name), column.column_type);
    if !column.nullable {
        def.push_str(" NOT NULL");
    }

    // char(36) ids are UUIDs supplied by the application; a catalog default
    // such as (uuid()) does not survive the trip.
    let is_uuid_id = column.name == "id" && column.column_type.eq_ignore_ascii_case("char(36)");
    if let Some(default) = column.default.as_deref().filter(|_| !is_uuid_id) {
        def.push_str(" DEFAULT ");
        def.push_str(&render_default(default));
    }

    if let Some(extra) = column.extra.as_deref() {
        if !extra.trim().is_empty() && !extra.contains("GENERATED") {
            def.push(' ');
            def.push_str(extra);
        }
    }
    def
}

fn render_default(default: &str) -> String {
    if default.ends_with("()") || default == "CURRENT_TIMESTAMP" {
        default.to_string()
    } else {
        format!("'{}'", default.replace('\'', "''"))
    }
}

fn render_unique(key: &KeyDef) -> String {
    format!(
        "UNIQUE KEY {} ({})",
        quote_ident(&key.name),
        quote_list(&key.columns)
    )
}

fn render_index(key: &KeyDef) -> String {
    format!("KEY {} ({})", quote_ident(&key.name), quote_list(&key.columns))
}

fn render_foreign_key(fk: &ForeignKey) -> String {
    format!(
        "CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({})",
        quote_ident(&fk.name),
        quote_ident(&fk.column),
        quote_ident(&fk.ref_table),
        quote_ident(&fk.ref_column)
    )
}

/// The body between the parentheses of `CREATE TABLE`: columns, primary key,
/// unique keys, indexes, then foreign keys.
pub fn render_body(schema: &TableSchema) -> String {
    let mut parts: Vec<String> = schema.columns.iter().map(render_column).collect();
    if !schema.primary_key.is_empty() {
        parts.push(format!("PRIMARY KEY ({})", quote_list(&schema.primary_key)));
    }
    parts.extend(schema.unique_keys.iter().map(render_unique));
    parts.extend(schema.indexes.iter().map(render_index));
    parts.extend(schema.foreign_keys.iter().map(render_foreign_key));
    parts.join(", ")
}

/// Full `CREATE TABLE IF NOT EXISTS` statement for the destination table.
pub fn create_table_statement(destination: &str, schema: &TableSchema) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {} ({})",
        quote_ident(destination),
        render_body(schema)
    )
}
