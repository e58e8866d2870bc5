//! Job row model for the durable queue.
//!
//! A row of the `jobs` table is one persisted unit of work. Rows form a
//! forest via `parent_id`; a row with no parent is a root. In-memory job
//! values are transient views, the store owns the rows.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgExecutor, PgPool};
use uuid::Uuid;

use crate::common::Record;

// ============================================================================
// Enums
// ============================================================================

/// Lifecycle of a job row.
///
/// Transitions only move forward: new → queued → {processing, done, failed},
/// processing → {done, failed}. Terminal states never change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    #[default]
    New,
    Queued,
    Processing,
    Done,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::New => "new",
            JobStatus::Queued => "queued",
            JobStatus::Processing => "processing",
            JobStatus::Done => "done",
            JobStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "new" => Some(JobStatus::New),
            "queued" => Some(JobStatus::Queued),
            "processing" => Some(JobStatus::Processing),
            "done" => Some(JobStatus::Done),
            "failed" => Some(JobStatus::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Done | JobStatus::Failed)
    }

    /// Whether `next` is a legal successor of `self`.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (self, next),
            (New, Queued) | (Queued, Processing) | (Queued, Done) | (Queued, Failed)
                | (Processing, Done)
                | (Processing, Failed)
        )
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Scheduling priority. Lower integer value is leased first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobPriority {
    Critical,
    High,
    #[default]
    Normal,
    Low,
}

impl JobPriority {
    /// Convert to integer for DB ordering (lower = higher priority).
    pub fn as_i16(&self) -> i16 {
        match self {
            JobPriority::Critical => 0,
            JobPriority::High => 1,
            JobPriority::Normal => 2,
            JobPriority::Low => 3,
        }
    }

    /// Inverse of [`as_i16`](Self::as_i16). `None` for out-of-range values.
    pub fn from_i16(value: i16) -> Option<Self> {
        match value {
            0 => Some(JobPriority::Critical),
            1 => Some(JobPriority::High),
            2 => Some(JobPriority::Normal),
            3 => Some(JobPriority::Low),
            _ => None,
        }
    }
}

// ============================================================================
// Row model
// ============================================================================

/// A raw row of the `jobs` table.
#[derive(FromRow, Debug, Clone)]
pub struct JobRow {
    pub id: Uuid,
    pub parent_id: Option<Uuid>,
    pub priority: i16,
    pub payload_type: String,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub status: String,
    pub child_jobs_count: i32,
    pub child_jobs_completed: i32,
    pub child_jobs_failed: i32,
}

impl JobRow {
    /// Build a fresh `new`-status row ready for insertion.
    pub fn pending(
        id: Uuid,
        parent_id: Option<Uuid>,
        priority: JobPriority,
        payload_type: &str,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            id,
            parent_id,
            priority: priority.as_i16(),
            payload_type: payload_type.to_string(),
            payload,
            created_at: Utc::now(),
            status: JobStatus::New.as_str().to_string(),
            child_jobs_count: 0,
            child_jobs_completed: 0,
            child_jobs_failed: 0,
        }
    }

    /// Insert on any executor (pool or open transaction).
    ///
    /// Ids are client-generated, so `ON CONFLICT DO NOTHING` makes a retry
    /// after a prior partial success idempotent. Returns rows written (0 on
    /// conflict).
    pub async fn insert_with<'e, E: PgExecutor<'e>>(&self, db: E) -> Result<u64> {
        let result = sqlx::query(
            r#"
            INSERT INTO jobs (id, parent_id, priority, payload_type, payload, created_at, status)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(self.id)
        .bind(self.parent_id)
        .bind(self.priority)
        .bind(&self.payload_type)
        .bind(&self.payload)
        .bind(self.created_at)
        .bind(&self.status)
        .execute(db)
        .await?;

        Ok(result.rows_affected())
    }

    /// Fetch the parent id of a row. Outer `None` when the row is missing,
    /// inner `None` when the row is a root.
    pub async fn parent_of(id: Uuid, db: &PgPool) -> Result<Option<Option<Uuid>>> {
        let row = sqlx::query_scalar::<_, Option<Uuid>>(
            "SELECT parent_id FROM jobs WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(db)
        .await?;

        Ok(row)
    }
}

#[async_trait]
impl Record for JobRow {
    const TABLE: &'static str = "jobs";
    type Id = Uuid;

    async fn find_by_id(id: Uuid, db: &PgPool) -> Result<Option<Self>> {
        let row = sqlx::query_as::<_, Self>(
            r#"
            SELECT id, parent_id, priority, payload_type, payload, created_at, status,
                   child_jobs_count, child_jobs_completed, child_jobs_failed
            FROM jobs
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(db)
        .await?;

        Ok(row)
    }

    async fn insert(&self, db: &PgPool) -> Result<u64> {
        self.insert_with(db).await
    }
}
