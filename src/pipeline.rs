// ABOUTME: Ordered migration stages with declared prerequisites
// ABOUTME: Validates stage ordering up front and runs stages sequentially

use crate::error::MigrationError;
use crate::migration::catalog::Catalog;
use crate::migration::copy::{copy_table, CopyStats};
use crate::migration::ids::IdGenerator;
use crate::migration::mapping::{reconcile_role_mappings, ReconcileStats};
use crate::migration::roles::{seed_roles, MappingPolicy, RoleStore, SeedStats};
use crate::migration::tables::{self, copy_stage_name, TableSpec};
use anyhow::{Context, Result};
use sqlx::mysql::MySqlPool;

pub const SEED_ROLES: &str = "seed-roles";
pub const ENSURE_MAPPING_TABLE: &str = "ensure-mapping-table";
pub const RECONCILE_MAPPINGS: &str = "reconcile-mappings";

/// What a stage does when it runs.
#[derive(Debug, Clone, Copy)]
pub enum StageKind {
    CopyTable(&'static TableSpec),
    SeedRoles,
    EnsureMappingTable,
    ReconcileMappings,
}

#[derive(Debug, Clone)]
pub struct Stage {
    pub name: String,
    pub requires: Vec<String>,
    pub kind: StageKind,
}

impl Stage {
    pub fn copy(spec: &'static TableSpec) -> Self {
        Self {
            name: spec.stage_name(),
            requires: spec.after.iter().map(|t| copy_stage_name(t)).collect(),
            kind: StageKind::CopyTable(spec),
        }
    }

    fn fixed(name: &str, requires: &[&str], kind: StageKind) -> Self {
        Self {
            name: name.to_string(),
            requires: requires.iter().map(|r| r.to_string()).collect(),
            kind,
        }
    }
}

/// Everything a stage may touch while it runs.
pub struct MigrationContext<'a> {
    pub source: &'a MySqlPool,
    pub dest: &'a MySqlPool,
    pub catalog: &'a dyn Catalog,
    pub store: &'a dyn RoleStore,
    pub ids: &'a mut dyn IdGenerator,
    pub mapping_policy: MappingPolicy,
}

/// Outcome of a completed run.
#[derive(Debug, Clone, Default)]
pub struct PipelineReport {
    pub copies: Vec<(String, CopyStats)>,
    pub seed: Option<SeedStats>,
    pub reconcile: Option<ReconcileStats>,
}

/// Stages in execution order. Every prerequisite is guaranteed to run earlier.
#[derive(Debug, Clone)]
pub struct Pipeline {
    stages: Vec<Stage>,
}

impl Pipeline {
    /// Build a pipeline, rejecting any stage whose prerequisite is missing or
    /// scheduled at or after it.
    pub fn new(stages: Vec<Stage>) -> Result<Self, MigrationError> {
        for (i, stage) in stages.iter().enumerate() {
            for required in &stage.requires {
                match stages.iter().position(|s| &s.name == required) {
                    Some(j) if j < i => {}
                    Some(_) => {
                        return Err(MigrationError::StageOrder {
                            stage: stage.name.clone(),
                            requires: required.clone(),
                        })
                    }
                    None => {
                        return Err(MigrationError::UnknownStage {
                            stage: stage.name.clone(),
                            requires: required.clone(),
                        })
                    }
                }
            }
        }
        Ok(Self { stages })
    }

    /// The full migration: every table copy in registry order, then role
    /// seeding and mapping reconciliation.
    pub fn standard() -> Result<Self, MigrationError> {
        let mut stages: Vec<Stage> = tables::TABLES.iter().map(Stage::copy).collect();
        stages.push(Stage::fixed(
            SEED_ROLES,
            &["copy:team", "copy:roles"],
            StageKind::SeedRoles,
        ));
        stages.push(Stage::fixed(
            ENSURE_MAPPING_TABLE,
            &["copy:users", SEED_ROLES],
            StageKind::EnsureMappingTable,
        ));
        stages.push(Stage::fixed(
            RECONCILE_MAPPINGS,
            &[ENSURE_MAPPING_TABLE],
            StageKind::ReconcileMappings,
        ));
        Self::new(stages)
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    /// Run every stage in order. The first failure ends the run; work done by
    /// earlier stages stays in the destination.
    pub async fn run(&self, ctx: &mut MigrationContext<'_>) -> Result<PipelineReport> {
        let mut report = PipelineReport::default();
        let total = self.stages.len();

        for (i, stage) in self.stages.iter().enumerate() {
            tracing::info!("[{}/{}] {}", i + 1, total, stage.name);
            match stage.kind {
                StageKind::CopyTable(spec) => {
                    let stats = copy_table(ctx.source, ctx.dest, ctx.catalog, spec)
                        .await
                        .with_context(|| format!("Failed to migrate table {}", spec.source))?;
                    report.copies.push((spec.source.to_string(), stats));
                }
                StageKind::SeedRoles => {
                    let stats = seed_roles(ctx.store, &mut *ctx.ids, ctx.mapping_policy)
                        .await
                        .context("Error inserting roles")?;
                    report.seed = Some(stats);
                }
                StageKind::EnsureMappingTable => {
                    ctx.store
                        .ensure_mapping_table()
                        .await
                        .context("Error creating user_roles_mapping table")?;
                    tracing::info!("Ensured user_roles_mapping table exists.");
                }
                StageKind::ReconcileMappings => {
                    let stats = reconcile_role_mappings(ctx.source, ctx.store)
                        .await
                        .context("Error migrating user roles")?;
                    report.reconcile = Some(stats);
                }
            }
        }

        Ok(report)
    }
}
