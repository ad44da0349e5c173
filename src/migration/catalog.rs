// ABOUTME: Catalog introspection for source tables via information_schema
// ABOUTME: Returns structured column, key, index, and foreign key descriptors

use crate::error::MigrationError;
use anyhow::Result;
use async_trait::async_trait;
use sqlx::mysql::{MySqlPool, MySqlRow};
use sqlx::Row;

/// A column as described by `INFORMATION_SCHEMA.COLUMNS`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub name: String,
    /// Full column type, e.g. `varchar(255)` or `enum('A','B')`.
    pub column_type: String,
    pub nullable: bool,
    pub default: Option<String>,
    /// `EXTRA`, e.g. `auto_increment`. Empty values are stored as `None`.
    pub extra: Option<String>,
}

/// A named unique constraint or secondary index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyDef {
    pub name: String,
    pub columns: Vec<String>,
}

/// One referencing column of a foreign key constraint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKey {
    pub name: String,
    pub column: String,
    pub ref_table: String,
    pub ref_column: String,
}

/// Everything read from the catalog for one table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableSchema {
    pub columns: Vec<Column>,
    pub primary_key: Vec<String>,
    pub unique_keys: Vec<KeyDef>,
    pub indexes: Vec<KeyDef>,
    pub foreign_keys: Vec<ForeignKey>,
}

/// Read access to table metadata of the source database.
#[async_trait]
pub trait Catalog: Send + Sync {
    async fn columns(&self, table: &str) -> Result<Vec<Column>>;
    async fn primary_key(&self, table: &str) -> Result<Vec<String>>;
    async fn unique_keys(&self, table: &str) -> Result<Vec<KeyDef>>;
    /// Non-unique indexes, the primary index excluded.
    async fn indexes(&self, table: &str) -> Result<Vec<KeyDef>>;
    async fn foreign_keys(&self, table: &str) -> Result<Vec<ForeignKey>>;
    async fn table_exists(&self, table: &str) -> Result<bool>;

    /// Read all metadata for `table`. Any failing query fails the whole read.
    async fn introspect(&self, table: &str) -> Result<TableSchema> {
        Ok(TableSchema {
            columns: self.columns(table).await?,
            primary_key: self.primary_key(table).await?,
            unique_keys: self.unique_keys(table).await?,
            indexes: self.indexes(table).await?,
            foreign_keys: self.foreign_keys(table).await?,
        })
    }
}

/// Catalog backed by the current database of a MySQL pool.
#[derive(Debug, Clone)]
pub struct MySqlCatalog {
    pool: MySqlPool,
}

impl MySqlCatalog {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    async fn fetch(&self, query: &str, table: &str, what: &'static str) -> Result<Vec<MySqlRow>> {
        let rows = sqlx::query(query)
            .bind(table)
            .fetch_all(&self.pool)
            .await
            .map_err(|source| MigrationError::Catalog {
                table: table.to_string(),
                what,
                source,
            })?;
        Ok(rows)
    }
}

fn catalog_err<'a>(
    table: &'a str,
    what: &'static str,
) -> impl FnOnce(sqlx::Error) -> MigrationError + 'a {
    move |source| MigrationError::Catalog {
        table: table.to_string(),
        what,
        source,
    }
}

/// Fold `(group name, column)` pairs, already ordered by group then position,
/// into one `KeyDef` per group in first-seen order.
pub(crate) fn group_key_columns(pairs: Vec<(String, String)>) -> Vec<KeyDef> {
    let mut keys: Vec<KeyDef> = Vec::new();
    for (name, column) in pairs {
        match keys.last_mut() {
            Some(last) if last.name == name => last.columns.push(column),
            _ => keys.push(KeyDef {
                name,
                columns: vec![column],
            }),
        }
    }
    keys
}

/// Whether `table` exists in the pool's current database.
pub async fn table_exists_in(pool: &MySqlPool, table: &str) -> Result<bool, sqlx::Error> {
    let row = sqlx::query(
        "SELECT COUNT(*) AS n FROM INFORMATION_SCHEMA.TABLES
         WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = ?",
    )
    .bind(table)
    .fetch_one(pool)
    .await?;
    let n: i64 = row.try_get("n")?;
    Ok(n > 0)
}

// information_schema columns can come back as VARBINARY/LONGTEXT depending on
// server version and collation, hence the CASTs.
#[async_trait]
impl Catalog for MySqlCatalog {
    async fn columns(&self, table: &str) -> Result<Vec<Column>> {
        let query = r#"
            SELECT
                CAST(COLUMN_NAME AS CHAR(255)) AS COLUMN_NAME,
                CAST(COLUMN_TYPE AS CHAR(4096)) AS COLUMN_TYPE,
                CAST(IS_NULLABLE AS CHAR(3)) AS IS_NULLABLE,
                CAST(COLUMN_DEFAULT AS CHAR(4096)) AS COLUMN_DEFAULT,
                CAST(EXTRA AS CHAR(255)) AS EXTRA
            FROM INFORMATION_SCHEMA.COLUMNS
            WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = ?
            ORDER BY ORDINAL_POSITION
        "#;

        let rows = self.fetch(query, table, "column").await?;
        let mut columns = Vec::with_capacity(rows.len());
        for row in rows {
            let is_nullable: String = row
                .try_get("IS_NULLABLE")
                .map_err(catalog_err(table, "column"))?;
            let extra: Option<String> =
                row.try_get("EXTRA").map_err(catalog_err(table, "column"))?;
            columns.push(Column {
                name: row
                    .try_get("COLUMN_NAME")
                    .map_err(catalog_err(table, "column"))?,
                column_type: row
                    .try_get("COLUMN_TYPE")
                    .map_err(catalog_err(table, "column"))?,
                nullable: is_nullable != "NO",
                default: row
                    .try_get("COLUMN_DEFAULT")
                    .map_err(catalog_err(table, "column"))?,
                extra: extra.filter(|e| !e.trim().is_empty()),
            });
        }

        tracing::debug!("Loaded {} columns for {}", columns.len(), table);
        Ok(columns)
    }

    async fn primary_key(&self, table: &str) -> Result<Vec<String>> {
        let query = r#"
            SELECT CAST(COLUMN_NAME AS CHAR(255)) AS COLUMN_NAME
            FROM INFORMATION_SCHEMA.KEY_COLUMN_USAGE
            WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = ? AND CONSTRAINT_NAME = 'PRIMARY'
            ORDER BY ORDINAL_POSITION
        "#;

        let mut columns = Vec::new();
        for row in self.fetch(query, table, "primary key").await? {
            let column: String = row
                .try_get("COLUMN_NAME")
                .map_err(catalog_err(table, "primary key"))?;
            columns.push(column);
        }
        Ok(columns)
    }

    async fn unique_keys(&self, table: &str) -> Result<Vec<KeyDef>> {
        let query = r#"
            SELECT
                CAST(tc.CONSTRAINT_NAME AS CHAR(255)) AS CONSTRAINT_NAME,
                CAST(kcu.COLUMN_NAME AS CHAR(255)) AS COLUMN_NAME
            FROM INFORMATION_SCHEMA.TABLE_CONSTRAINTS AS tc
            JOIN INFORMATION_SCHEMA.KEY_COLUMN_USAGE AS kcu
                ON tc.CONSTRAINT_NAME = kcu.CONSTRAINT_NAME
                AND tc.TABLE_SCHEMA = kcu.TABLE_SCHEMA
                AND tc.TABLE_NAME = kcu.TABLE_NAME
            WHERE tc.TABLE_SCHEMA = DATABASE() AND tc.TABLE_NAME = ?
              AND tc.CONSTRAINT_TYPE = 'UNIQUE'
            ORDER BY tc.CONSTRAINT_NAME, kcu.ORDINAL_POSITION
        "#;

        let mut pairs = Vec::new();
        for row in self.fetch(query, table, "unique key").await? {
            let name: String = row
                .try_get("CONSTRAINT_NAME")
                .map_err(catalog_err(table, "unique key"))?;
            let column: String = row
                .try_get("COLUMN_NAME")
                .map_err(catalog_err(table, "unique key"))?;
            pairs.push((name, column));
        }
        Ok(group_key_columns(pairs))
    }

    async fn indexes(&self, table: &str) -> Result<Vec<KeyDef>> {
        let query = r#"
            SELECT
                CAST(INDEX_NAME AS CHAR(255)) AS INDEX_NAME,
                CAST(COLUMN_NAME AS CHAR(255)) AS COLUMN_NAME
            FROM INFORMATION_SCHEMA.STATISTICS
            WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = ?
              AND NON_UNIQUE = 1
              AND INDEX_NAME <> 'PRIMARY'
            ORDER BY INDEX_NAME, SEQ_IN_INDEX
        "#;

        let mut pairs = Vec::new();
        for row in self.fetch(query, table, "index").await? {
            let name: String = row
                .try_get("INDEX_NAME")
                .map_err(catalog_err(table, "index"))?;
            // Functional index parts have no column name; they cannot be
            // expressed as a plain KEY (...) list.
            let column: Option<String> = row
                .try_get("COLUMN_NAME")
                .map_err(catalog_err(table, "index"))?;
            match column {
                Some(column) => pairs.push((name, column)),
                None => tracing::warn!(
                    "Skipping expression part of index {} on {}",
                    name,
                    table
                ),
            }
        }
        Ok(group_key_columns(pairs))
    }

    async fn foreign_keys(&self, table: &str) -> Result<Vec<ForeignKey>> {
        let query = r#"
            SELECT
                CAST(CONSTRAINT_NAME AS CHAR(255)) AS CONSTRAINT_NAME,
                CAST(COLUMN_NAME AS CHAR(255)) AS COLUMN_NAME,
                CAST(REFERENCED_TABLE_NAME AS CHAR(255)) AS REFERENCED_TABLE_NAME,
                CAST(REFERENCED_COLUMN_NAME AS CHAR(255)) AS REFERENCED_COLUMN_NAME
            FROM INFORMATION_SCHEMA.KEY_COLUMN_USAGE
            WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = ?
              AND REFERENCED_TABLE_NAME IS NOT NULL
            ORDER BY CONSTRAINT_NAME, ORDINAL_POSITION
        "#;

        let mut keys = Vec::new();
        for row in self.fetch(query, table, "foreign key").await? {
            keys.push(ForeignKey {
                name: row
                    .try_get("CONSTRAINT_NAME")
                    .map_err(catalog_err(table, "foreign key"))?,
                column: row
                    .try_get("COLUMN_NAME")
                    .map_err(catalog_err(table, "foreign key"))?,
                ref_table: row
                    .try_get("REFERENCED_TABLE_NAME")
                    .map_err(catalog_err(table, "foreign key"))?,
                ref_column: row
                    .try_get("REFERENCED_COLUMN_NAME")
                    .map_err(catalog_err(table, "foreign key"))?,
            });
        }
        Ok(keys)
    }

    async fn table_exists(&self, table: &str) -> Result<bool> {
        Ok(table_exists_in(&self.pool, table)
            .await
            .map_err(catalog_err(table, "table"))?)
    }
}
