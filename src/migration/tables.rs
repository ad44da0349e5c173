// ABOUTME: Declarative per-table migration rules for the fixed table list
// ABOUTME: Describes projections, renames, structural overrides, and replacement shapes

use super::catalog::{Column, ForeignKey};
use super::roles::ROLES_PER_TEAM;

/// Column definition written into destination DDL without coming from the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnTemplate {
    pub name: &'static str,
    pub column_type: &'static str,
    pub nullable: bool,
    pub default: Option<&'static str>,
    pub extra: Option<&'static str>,
}

impl ColumnTemplate {
    const fn nullable(name: &'static str, column_type: &'static str) -> Self {
        Self {
            name,
            column_type,
            nullable: true,
            default: None,
            extra: None,
        }
    }

    const fn required(name: &'static str, column_type: &'static str) -> Self {
        Self {
            name,
            column_type,
            nullable: false,
            default: None,
            extra: None,
        }
    }

    const fn with_default(self, default: &'static str) -> Self {
        Self {
            default: Some(default),
            ..self
        }
    }

    const fn with_extra(self, extra: &'static str) -> Self {
        Self {
            extra: Some(extra),
            ..self
        }
    }

    pub fn to_column(&self) -> Column {
        Column {
            name: self.name.to_string(),
            column_type: self.column_type.to_string(),
            nullable: self.nullable,
            default: self.default.map(str::to_string),
            extra: self.extra.map(str::to_string),
        }
    }
}

/// Foreign key added to a destination table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForeignKeyTemplate {
    pub name: &'static str,
    pub column: &'static str,
    pub ref_table: &'static str,
    pub ref_column: &'static str,
}

impl ForeignKeyTemplate {
    pub fn to_foreign_key(&self) -> ForeignKey {
        ForeignKey {
            name: self.name.to_string(),
            column: self.column.to_string(),
            ref_table: self.ref_table.to_string(),
            ref_column: self.ref_column.to_string(),
        }
    }
}

/// How rows are read from the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Projection {
    /// `SELECT * FROM <source table>`.
    AllColumns,
    /// A fixed query whose result columns are named after destination columns.
    Query(&'static str),
}

/// How the destination table's structure is derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableShape {
    /// Introspect the source table, then append the listed columns and keys.
    Introspected {
        extra_columns: &'static [ColumnTemplate],
        extra_foreign_keys: &'static [ForeignKeyTemplate],
    },
    /// Ignore the catalog and use exactly this column set and primary key.
    Replaced {
        columns: &'static [ColumnTemplate],
        primary_key: &'static [&'static str],
    },
}

/// What a destination table's row count is checked against after a migration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowCheck {
    /// Rows returned by the source read statement.
    SourceRows,
    /// `factor` rows for every row of another destination table.
    PerDestinationRow {
        table: &'static str,
        factor: i64,
    },
}

/// Migration rules for one table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableSpec {
    pub source: &'static str,
    pub destination: &'static str,
    pub projection: Projection,
    /// `(source column, destination column)`, applied to introspected DDL
    /// and to result-set column names.
    pub renames: &'static [(&'static str, &'static str)],
    pub shape: TableShape,
    /// Source tables that must be copied before this one.
    pub after: &'static [&'static str],
    pub row_check: RowCheck,
}

impl TableSpec {
    const fn plain(name: &'static str) -> Self {
        Self {
            source: name,
            destination: name,
            projection: Projection::AllColumns,
            renames: &[],
            shape: TableShape::Introspected {
                extra_columns: &[],
                extra_foreign_keys: &[],
            },
            after: &[],
            row_check: RowCheck::SourceRows,
        }
    }

    const fn after(self, tables: &'static [&'static str]) -> Self {
        Self {
            after: tables,
            ..self
        }
    }

    /// Source read statement.
    pub fn select_sql(&self) -> String {
        match self.projection {
            Projection::AllColumns => {
                format!("SELECT * FROM {}", crate::utils::quote_ident(self.source))
            }
            Projection::Query(sql) => sql.to_string(),
        }
    }

    /// Destination name for a source column name.
    pub fn rename<'a>(&self, column: &'a str) -> &'a str {
        self.renames
            .iter()
            .find(|(from, _)| *from == column)
            .map(|(_, to)| *to)
            .unwrap_or(column)
    }

    /// Name of the pipeline stage that copies this table.
    pub fn stage_name(&self) -> String {
        copy_stage_name(self.source)
    }
}

pub fn copy_stage_name(table: &str) -> String {
    format!("copy:{}", table)
}

const AUDIT_COLUMNS: &[ColumnTemplate] = &[
    ColumnTemplate::nullable("created_by", "varchar(255)"),
    ColumnTemplate::nullable("updated_by", "varchar(255)"),
];

const TEAM_ID: ColumnTemplate = ColumnTemplate::nullable("team_id", "char(36)");

const ROLE_COLUMNS: &[ColumnTemplate] = &[
    AUDIT_COLUMNS[0],
    AUDIT_COLUMNS[1],
    ColumnTemplate::required("type", "enum('BILLING','STANDARD','CUSTOM')").with_default("STANDARD"),
    TEAM_ID,
    ColumnTemplate::nullable("billing_id", "char(36)"),
];

const APP_GROUP_COLUMNS: &[ColumnTemplate] = &[AUDIT_COLUMNS[0], AUDIT_COLUMNS[1], TEAM_ID];

const AUDIT_LOG_COLUMNS: &[ColumnTemplate] = &[
    ColumnTemplate::required("id", "bigint").with_extra("AUTO_INCREMENT"),
    ColumnTemplate::required("entity_id", "varchar(255)"),
    ColumnTemplate::required("modified_date", "datetime(6)"),
    ColumnTemplate::nullable("new_value", "longtext"),
    ColumnTemplate::nullable("old_value", "longtext"),
    ColumnTemplate::required("actor", "varchar(255)"),
    ColumnTemplate::required("actor_type", "varchar(255)"),
    ColumnTemplate::nullable("entity_info", "varchar(255)"),
    ColumnTemplate::required("entity_type", "varchar(255)"),
    ColumnTemplate::required("operation", "enum('ADD','DELETE','UPDATE')"),
];

const APPS_SELECT: &str = "SELECT id, `key` AS key_value, label AS label_value, group_id, \
     created_at, updated_at FROM apps";

const AUDIT_LOGS_SELECT: &str = "SELECT a.email_id AS actor, al.action AS operation, \
     al.target AS entity_type, 'ADMIN' AS actor_type, al.target_id AS entity_id, \
     al.created_at AS modified_date, al.target_info AS entity_info \
     FROM audit_logs al LEFT JOIN admins a ON a.id = al.admin_id";

const APP_GROUPS_SELECT: &str = "SELECT ag.id, ag.name, ag.user_id, ag.created_at, \
     ag.updated_at, utm.team_id FROM app_groups ag \
     LEFT JOIN user_team_mapping utm ON ag.user_id = utm.user_id";

/// Tables copied by `migrate`, in copy order.
pub const TABLES: &[TableSpec] = &[
    TableSpec::plain("timezones"),
    TableSpec::plain("admins"),
    TableSpec::plain("billing_account"),
    TableSpec::plain("team"),
    TableSpec::plain("users").after(&["billing_account"]),
    TableSpec {
        shape: TableShape::Introspected {
            extra_columns: ROLE_COLUMNS,
            extra_foreign_keys: &[ForeignKeyTemplate {
                name: "fk_roles_team_id",
                column: "team_id",
                ref_table: "team",
                ref_column: "id",
            }],
        },
        // seed-roles replaces the copied rows with a fixed set per team
        row_check: RowCheck::PerDestinationRow {
            table: "team",
            factor: ROLES_PER_TEAM as i64,
        },
        ..TableSpec::plain("roles").after(&["team"])
    },
    TableSpec::plain("master_encryption_keys"),
    TableSpec::plain("license_table"),
    TableSpec::plain("tenant_encryption_keys"),
    TableSpec::plain("master_plan_table"),
    TableSpec::plain("tenant_plan_table"),
    TableSpec::plain("license_store_table"),
    TableSpec {
        projection: Projection::Query(APP_GROUPS_SELECT),
        shape: TableShape::Introspected {
            extra_columns: APP_GROUP_COLUMNS,
            extra_foreign_keys: &[ForeignKeyTemplate {
                name: "fk_app_groups_team_id",
                column: "team_id",
                ref_table: "team",
                ref_column: "id",
            }],
        },
        ..TableSpec::plain("app_groups").after(&["team"])
    },
    TableSpec {
        projection: Projection::Query(APPS_SELECT),
        renames: &[("key", "key_value"), ("label", "label_value")],
        shape: TableShape::Introspected {
            extra_columns: AUDIT_COLUMNS,
            extra_foreign_keys: &[],
        },
        ..TableSpec::plain("apps").after(&["app_groups"])
    },
    TableSpec {
        destination: "audit_log",
        projection: Projection::Query(AUDIT_LOGS_SELECT),
        shape: TableShape::Replaced {
            columns: AUDIT_LOG_COLUMNS,
            primary_key: &["id"],
        },
        ..TableSpec::plain("audit_logs")
    },
];

/// Look up the rules for a source table name.
pub fn find(source: &str) -> Option<&'static TableSpec> {
    TABLES.iter().find(|t| t.source == source)
}

/// Source tables read by the role-mapping join but not copied themselves.
pub const JOIN_ONLY_TABLES: &[&str] = &["users_role", "user_team_mapping"];
