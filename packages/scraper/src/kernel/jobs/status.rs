//! Transactional job status transitions and parent counter rollup.
//!
//! All writes to `status` funnel through here. The rollup runs inside the
//! same transaction as the child's terminal flip, so readers never observe
//! a parent whose counters say "complete" while its status lags, and the
//! root-completion notification is queued exactly once, at the flip site.

use std::sync::Arc;

use anyhow::{Context, Result};
use serde_json::Value;
use sqlx::{PgPool, Postgres, Transaction};
use tracing::info;
use uuid::Uuid;

use super::row::JobStatus;
use crate::domains::gmaps::CrawlJob;
use crate::kernel::api_client::ApiClient;

pub struct StatusManager {
    db: PgPool,
    api: Arc<ApiClient>,
}

impl StatusManager {
    pub fn new(db: PgPool, api: Arc<ApiClient>) -> Self {
        Self { db, api }
    }

    /// Mark a successfully processed job.
    ///
    /// With no children created the job is terminal: flip to `done` and roll
    /// the completion up the tree. With children pending the job parks in
    /// `processing` until its subtree closes the budget.
    pub async fn mark_done(&self, job: &CrawlJob, children_created: usize) -> Result<()> {
        let mut tx = self.db.begin().await?;

        if children_created == 0 {
            sqlx::query("UPDATE jobs SET status = $1 WHERE id = $2")
                .bind(JobStatus::Done.as_str())
                .bind(job.id())
                .execute(&mut *tx)
                .await
                .context("failed to mark job done")?;

            // A root leaf completes its whole tree right here.
            let row: Option<(Option<Uuid>, i32, Value)> = sqlx::query_as(
                "SELECT parent_id, child_jobs_count, payload FROM jobs WHERE id = $1",
            )
            .bind(job.id())
            .fetch_optional(&mut *tx)
            .await?;

            if let Some((None, 0, payload)) = row {
                self.api.notify_job_completion(job.id(), payload);
            }

            self.rollup(&mut tx, job.id()).await?;
        } else {
            sqlx::query("UPDATE jobs SET status = $1 WHERE id = $2")
                .bind(JobStatus::Processing.as_str())
                .bind(job.id())
                .execute(&mut *tx)
                .await
                .context("failed to mark job processing")?;
        }

        tx.commit().await.context("failed to commit status update")?;
        Ok(())
    }

    /// Mark a failed job and advance the parent's failed counter.
    ///
    /// A failed leaf counts toward "processed" but never toward
    /// "completed"; siblings and ancestors proceed normally.
    pub async fn mark_failed(&self, job: &CrawlJob) -> Result<()> {
        let mut tx = self.db.begin().await?;

        info!(job_id = %job.id(), job_type = job.job_type(), "marking job failed");
        sqlx::query("UPDATE jobs SET status = $1 WHERE id = $2")
            .bind(JobStatus::Failed.as_str())
            .bind(job.id())
            .execute(&mut *tx)
            .await
            .context("failed to mark job failed")?;

        let parent_id: Option<Uuid> =
            sqlx::query_scalar("SELECT parent_id FROM jobs WHERE id = $1")
                .bind(job.id())
                .fetch_optional(&mut *tx)
                .await?
                .flatten();

        if let Some(parent_id) = parent_id {
            sqlx::query(
                "UPDATE jobs SET child_jobs_failed = child_jobs_failed + 1 WHERE id = $1",
            )
            .bind(parent_id)
            .execute(&mut *tx)
            .await?;
        }

        self.rollup(&mut tx, job.id()).await?;

        tx.commit().await.context("failed to commit failure update")?;
        Ok(())
    }

    /// Walk up the tree from a just-terminated child, inside the caller's
    /// transaction.
    ///
    /// This is the only site that increments `child_jobs_completed`; a child
    /// transitions to `done` exactly once, so the increment happens at most
    /// once per (child, parent) pair. A parent whose budget is met flips to
    /// `done` and the walk continues; when that parent is a root, the
    /// completion notification is queued and the walk stops.
    async fn rollup(&self, tx: &mut Transaction<'_, Postgres>, child_id: Uuid) -> Result<()> {
        let mut current = child_id;

        loop {
            let parent_id: Option<Uuid> =
                sqlx::query_scalar("SELECT parent_id FROM jobs WHERE id = $1")
                    .bind(current)
                    .fetch_optional(&mut **tx)
                    .await?
                    .flatten();

            let Some(parent_id) = parent_id else {
                return Ok(());
            };

            let status: Option<String> =
                sqlx::query_scalar("SELECT status FROM jobs WHERE id = $1")
                    .bind(current)
                    .fetch_optional(&mut **tx)
                    .await?;

            if status.as_deref() == Some(JobStatus::Done.as_str()) {
                sqlx::query(
                    "UPDATE jobs SET child_jobs_completed = child_jobs_completed + 1 WHERE id = $1",
                )
                .bind(parent_id)
                .execute(&mut **tx)
                .await?;
            }

            let (count, completed, failed): (i32, i32, i32) = sqlx::query_as(
                "SELECT child_jobs_count, child_jobs_completed, child_jobs_failed \
                 FROM jobs WHERE id = $1",
            )
            .bind(parent_id)
            .fetch_one(&mut **tx)
            .await?;

            if completed + failed >= count && count > 0 {
                sqlx::query("UPDATE jobs SET status = $1 WHERE id = $2")
                    .bind(JobStatus::Done.as_str())
                    .bind(parent_id)
                    .execute(&mut **tx)
                    .await?;

                let grandparent: Option<Uuid> =
                    sqlx::query_scalar("SELECT parent_id FROM jobs WHERE id = $1")
                        .bind(parent_id)
                        .fetch_optional(&mut **tx)
                        .await?
                        .flatten();

                if grandparent.is_none() {
                    // parent_id is the root of the tree and just finished.
                    let payload: Option<Value> =
                        sqlx::query_scalar("SELECT payload FROM jobs WHERE id = $1")
                            .bind(parent_id)
                            .fetch_optional(&mut **tx)
                            .await?;
                    if let Some(payload) = payload {
                        info!(job_id = %parent_id, "root job finished");
                        self.api.notify_job_completion(parent_id, payload);
                    }
                    return Ok(());
                }

                current = parent_id;
                continue;
            }

            return Ok(());
        }
    }
}
