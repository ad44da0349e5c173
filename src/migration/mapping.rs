// ABOUTME: Rebuilds user-to-role assignments against the regenerated roles
// ABOUTME: Translates legacy role names and inserts mapping rows idempotently

use super::roles::{RoleStore, BI_ADMIN, PLATFORM_ADMIN, PLATFORM_READ_ONLY};
use anyhow::{Context, Result};
use futures::{Stream, TryStreamExt};
use sqlx::mysql::MySqlPool;
use sqlx::Row;

const ASSIGNMENTS_QUERY: &str = "SELECT u.id AS user_id, ba.id AS billing_id, \
     utm.team_id AS team_id, r.name AS role_name \
     FROM users u \
     JOIN billing_account ba ON u.billing_id = ba.id \
     JOIN users_role ur ON u.id = ur.user_id \
     JOIN roles r ON ur.role_id = r.id \
     JOIN user_team_mapping utm ON u.id = utm.user_id";

/// Destination role name for a legacy source role name.
pub fn translate_role_name(name: &str) -> &str {
    match name {
        "USER" => PLATFORM_READ_ONLY,
        "TEAM_ADMIN" => PLATFORM_ADMIN,
        other => other,
    }
}

/// One (user, billing account, team, role) tuple from the source join.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleAssignment {
    pub user_id: String,
    pub billing_id: String,
    pub team_id: String,
    pub role_name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MappingOutcome {
    Inserted,
    /// The pair already existed.
    Duplicate,
    /// No destination role matched; nothing was written.
    NoRole,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileStats {
    pub assignments: u64,
    pub inserted: u64,
    pub duplicates: u64,
    pub skipped: u64,
}

impl ReconcileStats {
    fn record(&mut self, outcome: MappingOutcome) {
        self.assignments += 1;
        match outcome {
            MappingOutcome::Inserted => self.inserted += 1,
            MappingOutcome::Duplicate => self.duplicates += 1,
            MappingOutcome::NoRole => self.skipped += 1,
        }
    }
}

/// Map a single assignment onto a destination role.
///
/// BI_ADMIN is billing-scoped, so its lookup ignores the team.
pub async fn reconcile_assignment<S: RoleStore + ?Sized>(
    store: &S,
    assignment: &RoleAssignment,
) -> Result<MappingOutcome> {
    let role_name = translate_role_name(&assignment.role_name);
    let team_id = (role_name != BI_ADMIN).then_some(assignment.team_id.as_str());

    let role_id = store
        .find_role_id(role_name, &assignment.billing_id, team_id)
        .await
        .with_context(|| format!("Error looking up role {}", role_name))?;

    let Some(role_id) = role_id else {
        tracing::warn!(
            "No role found for Role Name: {}, Billing ID: {}, Team ID: {}. Skipping insertion.",
            role_name,
            assignment.billing_id,
            assignment.team_id
        );
        return Ok(MappingOutcome::NoRole);
    };

    let inserted = store
        .insert_mapping(&assignment.user_id, &role_id)
        .await
        .with_context(|| {
            format!(
                "Error inserting into user_roles_mapping for user {}",
                assignment.user_id
            )
        })?;

    if inserted {
        tracing::debug!("Mapped user {} to role {}", assignment.user_id, role_id);
        Ok(MappingOutcome::Inserted)
    } else {
        Ok(MappingOutcome::Duplicate)
    }
}

/// Reconcile every assignment from `assignments`, stopping at the first error.
pub async fn reconcile_assignments<S, A>(store: &S, assignments: A) -> Result<ReconcileStats>
where
    S: RoleStore + ?Sized,
    A: Stream<Item = Result<RoleAssignment>>,
{
    futures::pin_mut!(assignments);
    let mut stats = ReconcileStats::default();
    while let Some(assignment) = assignments.try_next().await? {
        let outcome = reconcile_assignment(store, &assignment).await?;
        stats.record(outcome);
    }
    Ok(stats)
}

/// Read role assignments from the source and insert matching mapping rows
/// into the destination.
pub async fn reconcile_role_mappings<S: RoleStore + ?Sized>(
    source: &MySqlPool,
    store: &S,
) -> Result<ReconcileStats> {
    tracing::info!("Migrating user role assignments...");
    let assignments = sqlx::query(ASSIGNMENTS_QUERY)
        .fetch(source)
        .map_err(|e| anyhow::Error::new(e).context("Error querying source role assignments"))
        .and_then(|row| async move {
            Ok::<_, anyhow::Error>(RoleAssignment {
                user_id: row.try_get("user_id")?,
                billing_id: row.try_get("billing_id")?,
                team_id: row.try_get("team_id")?,
                role_name: row.try_get("role_name")?,
            })
        });

    let stats = reconcile_assignments(store, assignments).await?;
    tracing::info!(
        "Processed {} role assignments: {} inserted, {} already present, {} skipped.",
        stats.assignments,
        stats.inserted,
        stats.duplicates,
        stats.skipped
    );
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migration::roles::memory::{MemoryRoleStore, SequentialIds};
    use crate::migration::roles::{seed_roles, MappingPolicy};

    fn assignment(user: &str, billing: &str, team: &str, role: &str) -> RoleAssignment {
        RoleAssignment {
            user_id: user.to_string(),
            billing_id: billing.to_string(),
            team_id: team.to_string(),
            role_name: role.to_string(),
        }
    }

    async fn seeded_store(teams: &[(&str, &str)]) -> MemoryRoleStore {
        let store = MemoryRoleStore::with_teams(teams);
        seed_roles(&store, &mut SequentialIds::default(), MappingPolicy::Preserve)
            .await
            .unwrap();
        store
    }

    fn role_id(store: &MemoryRoleStore, name: &str, team: Option<&str>) -> String {
        store
            .roles()
            .into_iter()
            .find(|r| r.name == name && r.team_id.as_deref() == team)
            .map(|r| r.id)
            .unwrap()
    }

    #[test]
    fn test_translate_role_name() {
        assert_eq!(translate_role_name("USER"), "PLATFORM_READ_ONLY");
        assert_eq!(translate_role_name("TEAM_ADMIN"), "PLATFORM_ADMIN");
        assert_eq!(translate_role_name("BI_ADMIN"), "BI_ADMIN");
        assert_eq!(translate_role_name("AUDITOR"), "AUDITOR");
    }

    #[tokio::test]
    async fn test_user_maps_to_team_read_only_role() {
        let store = seeded_store(&[("T1", "B1")]).await;

        let outcome = reconcile_assignment(&store, &assignment("U1", "B1", "T1", "USER"))
            .await
            .unwrap();

        assert_eq!(outcome, MappingOutcome::Inserted);
        let expected = role_id(&store, PLATFORM_READ_ONLY, Some("T1"));
        assert_eq!(store.mappings(), vec![("U1".to_string(), expected)]);
    }

    #[tokio::test]
    async fn test_bi_admin_lookup_ignores_team() {
        let store = seeded_store(&[("T1", "B1")]).await;

        let outcome =
            reconcile_assignment(&store, &assignment("U2", "B1", "some-other-team", "BI_ADMIN"))
                .await
                .unwrap();

        assert_eq!(outcome, MappingOutcome::Inserted);
        let expected = role_id(&store, BI_ADMIN, None);
        assert_eq!(store.mappings(), vec![("U2".to_string(), expected)]);
    }

    #[tokio::test]
    async fn test_unknown_role_is_skipped() {
        let store = seeded_store(&[("T1", "B1")]).await;

        let outcome = reconcile_assignment(&store, &assignment("U3", "B1", "T1", "AUDITOR"))
            .await
            .unwrap();

        assert_eq!(outcome, MappingOutcome::NoRole);
        assert!(store.mappings().is_empty());
    }

    #[tokio::test]
    async fn test_team_from_other_billing_account_is_skipped() {
        let store = seeded_store(&[("T1", "B1"), ("T2", "B2")]).await;

        let outcome = reconcile_assignment(&store, &assignment("U4", "B1", "T2", "TEAM_ADMIN"))
            .await
            .unwrap();

        assert_eq!(outcome, MappingOutcome::NoRole);
    }

    #[tokio::test]
    async fn test_stream_counts_outcomes_and_is_idempotent() {
        let store = seeded_store(&[("T1", "B1")]).await;
        let input = vec![
            assignment("U1", "B1", "T1", "USER"),
            assignment("U1", "B1", "T1", "USER"),
            assignment("U2", "B1", "T1", "TEAM_ADMIN"),
            assignment("U3", "B1", "T1", "AUDITOR"),
        ];

        let stream = futures::stream::iter(input.clone().into_iter().map(Ok));
        let stats = reconcile_assignments(&store, stream).await.unwrap();
        assert_eq!(
            stats,
            ReconcileStats {
                assignments: 4,
                inserted: 2,
                duplicates: 1,
                skipped: 1,
            }
        );
        let first_pass = store.mappings();

        let stream = futures::stream::iter(input.into_iter().map(Ok));
        let rerun = reconcile_assignments(&store, stream).await.unwrap();
        assert_eq!(rerun.inserted, 0);
        assert_eq!(rerun.duplicates, 3);
        assert_eq!(store.mappings(), first_pass);
    }

    #[tokio::test]
    async fn test_stream_error_aborts() {
        let store = seeded_store(&[("T1", "B1")]).await;
        let input: Vec<Result<RoleAssignment>> = vec![
            Ok(assignment("U1", "B1", "T1", "USER")),
            Err(anyhow::anyhow!("unexpected NULL in team_id")),
            Ok(assignment("U2", "B1", "T1", "USER")),
        ];

        let result = reconcile_assignments(&store, futures::stream::iter(input)).await;
        assert!(result.is_err());
        assert_eq!(store.mappings().len(), 1);
    }

    #[tokio::test]
    #[ignore]
    async fn test_reconcile_against_live_databases() {
        let source_url = std::env::var("TEST_SOURCE_URL").unwrap();
        let target_url = std::env::var("TEST_TARGET_URL").unwrap();
        let source = crate::mysql::connect("source", &source_url).await.unwrap();
        let dest = crate::mysql::connect("destination", &target_url).await.unwrap();
        let store = crate::migration::roles::MySqlRoleStore::new(dest);

        store.ensure_mapping_table().await.unwrap();
        let first = reconcile_role_mappings(&source, &store).await.unwrap();
        let second = reconcile_role_mappings(&source, &store).await.unwrap();

        assert_eq!(first.assignments, second.assignments);
        assert_eq!(second.inserted, 0);
    }
}
