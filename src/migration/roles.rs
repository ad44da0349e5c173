// ABOUTME: Per-team role generation in the destination database
// ABOUTME: Defines the destination role store and regenerates the three roles of every team

use super::catalog::table_exists_in;
use super::ids::IdGenerator;
use crate::error::MigrationError;
use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::mysql::MySqlPool;
use sqlx::Row;
use std::fmt;

pub const BI_ADMIN: &str = "BI_ADMIN";
pub const PLATFORM_ADMIN: &str = "PLATFORM_ADMIN";
pub const PLATFORM_READ_ONLY: &str = "PLATFORM_READ_ONLY";

/// Roles generated for every team.
pub const ROLES_PER_TEAM: usize = 3;

/// Destination name of the user-to-role mapping table.
pub const MAPPING_TABLE: &str = "user_roles_mapping";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoleType {
    Billing,
    Standard,
    Custom,
}

impl RoleType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoleType::Billing => "BILLING",
            RoleType::Standard => "STANDARD",
            RoleType::Custom => "CUSTOM",
        }
    }
}

impl fmt::Display for RoleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A row of the destination `roles` table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Role {
    pub id: String,
    pub name: String,
    pub role_type: RoleType,
    /// `None` for billing-scoped roles.
    pub team_id: Option<String>,
    pub billing_id: String,
}

/// A row of the destination `team` table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Team {
    pub id: String,
    pub billing_id: String,
}

/// Destination-side operations needed by role seeding and mapping reconciliation.
#[async_trait]
pub trait RoleStore: Send + Sync {
    async fn teams(&self) -> Result<Vec<Team>>;
    /// Delete every role. Returns the number of rows removed.
    async fn clear_roles(&self) -> Result<u64>;
    async fn insert_role(&self, role: &Role) -> Result<()>;
    /// Rows in the mapping table; 0 when the table does not exist yet.
    async fn mapping_count(&self) -> Result<i64>;
    async fn clear_mappings(&self) -> Result<u64>;
    async fn ensure_mapping_table(&self) -> Result<()>;
    /// Id of the role with this name and billing account, restricted to
    /// `team_id` when one is given.
    async fn find_role_id(
        &self,
        name: &str,
        billing_id: &str,
        team_id: Option<&str>,
    ) -> Result<Option<String>>;
    /// Insert a mapping pair, ignoring duplicates. Returns `true` if a row was added.
    async fn insert_mapping(&self, user_id: &str, role_id: &str) -> Result<bool>;
}

/// What to do with existing mapping rows when roles are regenerated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MappingPolicy {
    /// Refuse to regenerate roles while mappings reference them.
    #[default]
    Preserve,
    /// Delete mapping rows before regenerating roles.
    Reset,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeedStats {
    pub teams: u64,
    pub roles_removed: u64,
    pub roles_inserted: u64,
    pub mappings_removed: u64,
}

/// The three roles every team receives, in insertion order.
pub fn roles_for_team(team: &Team, ids: &mut dyn IdGenerator) -> [Role; ROLES_PER_TEAM] {
    [
        Role {
            id: ids.next_id(),
            name: BI_ADMIN.to_string(),
            role_type: RoleType::Billing,
            team_id: None,
            billing_id: team.billing_id.clone(),
        },
        Role {
            id: ids.next_id(),
            name: PLATFORM_ADMIN.to_string(),
            role_type: RoleType::Standard,
            team_id: Some(team.id.clone()),
            billing_id: team.billing_id.clone(),
        },
        Role {
            id: ids.next_id(),
            name: PLATFORM_READ_ONLY.to_string(),
            role_type: RoleType::Standard,
            team_id: Some(team.id.clone()),
            billing_id: team.billing_id.clone(),
        },
    ]
}

/// Regenerate the roles table
///
/// Deletes every existing role, then inserts BI_ADMIN, PLATFORM_ADMIN and
/// PLATFORM_READ_ONLY for each team, each with a fresh id.
///
/// Existing mapping rows point at role ids that this function destroys. With
/// [`MappingPolicy::Preserve`] the call fails before touching anything; with
/// [`MappingPolicy::Reset`] the mapping rows are deleted first.
///
/// # Errors
///
/// The first failing insert stops seeding. Teams processed before it keep
/// their roles.
pub async fn seed_roles<S: RoleStore + ?Sized>(
    store: &S,
    ids: &mut dyn IdGenerator,
    policy: MappingPolicy,
) -> Result<SeedStats> {
    let mut stats = SeedStats::default();

    let existing = store.mapping_count().await?;
    if existing > 0 {
        match policy {
            MappingPolicy::Preserve => {
                return Err(MigrationError::MappingsWouldOrphan { count: existing }.into())
            }
            MappingPolicy::Reset => {
                tracing::warn!(
                    "⚠ Deleting {} existing {} row(s) before regenerating roles",
                    existing,
                    MAPPING_TABLE
                );
                stats.mappings_removed = store.clear_mappings().await?;
            }
        }
    }

    stats.roles_removed = store.clear_roles().await.context("Error clearing roles table")?;

    tracing::info!("Fetching all team IDs from the team table...");
    let teams = store.teams().await.context("Error fetching team ids")?;

    for team in &teams {
        tracing::info!("Inserting roles for team ID: {}", team.id);
        for role in roles_for_team(team, ids) {
            store
                .insert_role(&role)
                .await
                .with_context(|| format!("Error inserting role {} for team {}", role.name, team.id))?;
            tracing::debug!(
                "Inserted role: {}, Type: {}, Team ID: {}",
                role.name,
                role.role_type,
                role.team_id.as_deref().unwrap_or("<nil>")
            );
            stats.roles_inserted += 1;
        }
        stats.teams += 1;
    }

    tracing::info!(
        "Inserted a total of {} roles for {} teams.",
        stats.roles_inserted,
        stats.teams
    );
    Ok(stats)
}

/// Role store over the destination MySQL database.
#[derive(Debug, Clone)]
pub struct MySqlRoleStore {
    pool: MySqlPool,
}

impl MySqlRoleStore {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RoleStore for MySqlRoleStore {
    async fn teams(&self) -> Result<Vec<Team>> {
        let rows = sqlx::query("SELECT id, billing_id FROM team")
            .fetch_all(&self.pool)
            .await?;
        rows.iter()
            .map(|row| {
                Ok(Team {
                    id: row.try_get("id").context("Error scanning team id")?,
                    billing_id: row
                        .try_get("billing_id")
                        .context("Error scanning team billing_id")?,
                })
            })
            .collect()
    }

    async fn clear_roles(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM roles").execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    async fn insert_role(&self, role: &Role) -> Result<()> {
        sqlx::query(
            "INSERT INTO roles (id, name, type, team_id, billing_id) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&role.id)
        .bind(&role.name)
        .bind(role.role_type.as_str())
        .bind(role.team_id.as_deref())
        .bind(&role.billing_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn mapping_count(&self) -> Result<i64> {
        let exists = table_exists_in(&self.pool, MAPPING_TABLE)
            .await
            .context("Failed to check for mapping table")?;
        if !exists {
            return Ok(0);
        }
        let row = sqlx::query("SELECT COUNT(*) AS n FROM user_roles_mapping")
            .fetch_one(&self.pool)
            .await
            .context("Failed to count mapping rows")?;
        Ok(row.try_get("n")?)
    }

    async fn clear_mappings(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM user_roles_mapping")
            .execute(&self.pool)
            .await
            .context("Failed to clear mapping rows")?;
        Ok(result.rows_affected())
    }

    async fn ensure_mapping_table(&self) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS user_roles_mapping (
                user_id CHAR(36) NOT NULL,
                role_id CHAR(36) NOT NULL,
                PRIMARY KEY (user_id, role_id),
                FOREIGN KEY (user_id) REFERENCES users(id),
                FOREIGN KEY (role_id) REFERENCES roles(id)
            ) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4",
        )
        .execute(&self.pool)
        .await
        .map_err(|source| MigrationError::Ddl {
            table: MAPPING_TABLE.to_string(),
            source,
        })?;
        Ok(())
    }

    async fn find_role_id(
        &self,
        name: &str,
        billing_id: &str,
        team_id: Option<&str>,
    ) -> Result<Option<String>> {
        let row = match team_id {
            None => {
                sqlx::query("SELECT id FROM roles WHERE name = ? AND billing_id = ?")
                    .bind(name)
                    .bind(billing_id)
                    .fetch_optional(&self.pool)
                    .await?
            }
            Some(team_id) => {
                sqlx::query(
                    "SELECT id FROM roles WHERE name = ? AND billing_id = ? AND team_id = ?",
                )
                .bind(name)
                .bind(billing_id)
                .bind(team_id)
                .fetch_optional(&self.pool)
                .await?
            }
        };
        row.map(|r| r.try_get("id").map_err(Into::into)).transpose()
    }

    async fn insert_mapping(&self, user_id: &str, role_id: &str) -> Result<bool> {
        let result =
            sqlx::query("INSERT IGNORE INTO user_roles_mapping (user_id, role_id) VALUES (?, ?)")
                .bind(user_id)
                .bind(role_id)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
pub(crate) mod memory {
    //! In-memory role store for unit tests.

    use super::*;
    use std::collections::BTreeSet;
    use std::sync::Mutex;

    #[derive(Default)]
    pub struct MemoryRoleStore {
        pub teams: Vec<Team>,
        pub roles: Mutex<Vec<Role>>,
        pub mappings: Mutex<BTreeSet<(String, String)>>,
        pub mapping_table: Mutex<bool>,
        /// Fail the n-th role insert (1-based).
        pub fail_insert_at: Option<usize>,
        pub inserts_attempted: Mutex<usize>,
    }

    impl MemoryRoleStore {
        pub fn with_teams(teams: &[(&str, &str)]) -> Self {
            Self {
                teams: teams
                    .iter()
                    .map(|(id, billing)| Team {
                        id: id.to_string(),
                        billing_id: billing.to_string(),
                    })
                    .collect(),
                ..Self::default()
            }
        }

        pub fn roles(&self) -> Vec<Role> {
            self.roles.lock().unwrap().clone()
        }

        pub fn mappings(&self) -> Vec<(String, String)> {
            self.mappings.lock().unwrap().iter().cloned().collect()
        }
    }

    #[async_trait]
    impl RoleStore for MemoryRoleStore {
        async fn teams(&self) -> Result<Vec<Team>> {
            Ok(self.teams.clone())
        }

        async fn clear_roles(&self) -> Result<u64> {
            let mut roles = self.roles.lock().unwrap();
            let n = roles.len() as u64;
            roles.clear();
            Ok(n)
        }

        async fn insert_role(&self, role: &Role) -> Result<()> {
            let mut attempted = self.inserts_attempted.lock().unwrap();
            *attempted += 1;
            if self.fail_insert_at == Some(*attempted) {
                anyhow::bail!("simulated insert failure");
            }
            self.roles.lock().unwrap().push(role.clone());
            Ok(())
        }

        async fn mapping_count(&self) -> Result<i64> {
            Ok(self.mappings.lock().unwrap().len() as i64)
        }

        async fn clear_mappings(&self) -> Result<u64> {
            let mut mappings = self.mappings.lock().unwrap();
            let n = mappings.len() as u64;
            mappings.clear();
            Ok(n)
        }

        async fn ensure_mapping_table(&self) -> Result<()> {
            *self.mapping_table.lock().unwrap() = true;
            Ok(())
        }

        async fn find_role_id(
            &self,
            name: &str,
            billing_id: &str,
            team_id: Option<&str>,
        ) -> Result<Option<String>> {
            Ok(self
                .roles
                .lock()
                .unwrap()
                .iter()
                .find(|r| {
                    r.name == name
                        && r.billing_id == billing_id
                        && team_id.map_or(true, |t| r.team_id.as_deref() == Some(t))
                })
                .map(|r| r.id.clone()))
        }

        async fn insert_mapping(&self, user_id: &str, role_id: &str) -> Result<bool> {
            Ok(self
                .mappings
                .lock()
                .unwrap()
                .insert((user_id.to_string(), role_id.to_string())))
        }
    }

    /// Deterministic ids: `id-1`, `id-2`, ...
    #[derive(Default)]
    pub struct SequentialIds(pub usize);

    impl IdGenerator for SequentialIds {
        fn next_id(&mut self) -> String {
            self.0 += 1;
            format!("id-{}", self.0)
        }
    }
}
