//! Audience directory: resolves which contestants an event concerns.

use async_trait::async_trait;
use sqlx::PgPool;

use portal_common::error::AppError;
use portal_common::types::{AudienceMember, BenchmarkJob, Clarification};

#[async_trait]
pub trait ContestantDirectory: Send + Sync {
    /// Every contestant currently assigned to a team.
    async fn list_teamed(&self) -> Result<Vec<AudienceMember>, AppError>;

    /// The contestants of one team.
    async fn list_by_team(&self, team_id: i64) -> Result<Vec<AudienceMember>, AppError>;
}

/// PostgreSQL-backed contestant directory.
#[derive(Clone)]
pub struct PgContestantDirectory {
    pool: PgPool,
}

impl PgContestantDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ContestantDirectory for PgContestantDirectory {
    async fn list_teamed(&self) -> Result<Vec<AudienceMember>, AppError> {
        let members: Vec<AudienceMember> = sqlx::query_as(
            "SELECT id, team_id FROM contestants WHERE team_id IS NOT NULL ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(members)
    }

    async fn list_by_team(&self, team_id: i64) -> Result<Vec<AudienceMember>, AppError> {
        let members: Vec<AudienceMember> =
            sqlx::query_as("SELECT id, team_id FROM contestants WHERE team_id = $1 ORDER BY id")
                .bind(team_id)
                .fetch_all(&self.pool)
                .await?;

        Ok(members)
    }
}

/// Loads the event rows that trigger notifications.
#[derive(Clone)]
pub struct EventLookup {
    pool: PgPool,
}

impl EventLookup {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn clarification(&self, id: i64) -> Result<Clarification, AppError> {
        sqlx::query_as("SELECT * FROM clarifications WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Clarification {} not found", id)))
    }

    pub async fn benchmark_job(&self, id: i64) -> Result<BenchmarkJob, AppError> {
        sqlx::query_as("SELECT * FROM benchmark_jobs WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Benchmark job {} not found", id)))
    }
}
