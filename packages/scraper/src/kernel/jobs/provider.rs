//! Persistent job queue on PostgreSQL.
//!
//! The provider presents the `jobs` table as a stream of leased work units
//! to any number of workers across any number of processes. Correctness
//! across processes rests on one primitive: the atomic `new` → `queued`
//! flip under `FOR UPDATE SKIP LOCKED`, which hands out disjoint leases
//! without head-of-line blocking.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};
use serde_json::Value;
use sqlx::{PgPool, Postgres, Transaction};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};
use uuid::Uuid;

use super::codec::CodecRegistry;
use super::row::{JobRow, JobStatus};
use super::status::StatusManager;
use super::wrapper::WrappedJob;
use crate::common::Record;
use crate::domains::gmaps::CrawlJob;
use crate::kernel::api_client::ApiClient;

/// Rows claimed per poll.
const LEASE_BATCH_SIZE: i64 = 50;

/// In-memory delivery buffer; bounds per-process lookahead.
const JOB_CHANNEL_CAPACITY: usize = 100;

const BASE_POLL_DELAY: Duration = Duration::from_secs(1);
const MAX_POLL_DELAY: Duration = Duration::from_secs(60);

pub struct JobProvider {
    db: PgPool,
    codecs: Arc<CodecRegistry>,
    status: StatusManager,
    api: Arc<ApiClient>,
    started: Mutex<bool>,
    errors: Mutex<Option<mpsc::Sender<anyhow::Error>>>,
}

impl JobProvider {
    pub fn new(
        db: PgPool,
        codecs: Arc<CodecRegistry>,
        status: StatusManager,
        api: Arc<ApiClient>,
    ) -> Arc<Self> {
        Arc::new(Self {
            db,
            codecs,
            status,
            api,
            started: Mutex::new(false),
            errors: Mutex::new(None),
        })
    }

    pub fn db(&self) -> &PgPool {
        &self.db
    }

    pub fn status(&self) -> &StatusManager {
        &self.status
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    pub fn codecs(&self) -> &CodecRegistry {
        &self.codecs
    }

    /// Insert a job as `new`. Client-generated UUIDs plus
    /// `ON CONFLICT DO NOTHING` make retries after partial success
    /// idempotent.
    pub async fn push(&self, job: &CrawlJob) -> Result<()> {
        let (envelope, tag) = self.codecs.encode(job)?;
        let row = JobRow::pending(
            job.id(),
            job.parent_id(),
            job.priority(),
            tag,
            envelope.to_value()?,
        );
        row.insert(&self.db).await.context("failed to push job")?;
        Ok(())
    }

    /// Start the lease loop and return the delivery channels.
    ///
    /// The loop is kicked at most once per provider; workers consume the
    /// job channel, and anything on the error channel is fatal for this
    /// process (leases already in `queued` survive a restart).
    pub fn jobs(
        self: &Arc<Self>,
        cancel: CancellationToken,
    ) -> (mpsc::Receiver<WrappedJob>, mpsc::Receiver<anyhow::Error>) {
        let (job_tx, job_rx) = mpsc::channel(JOB_CHANNEL_CAPACITY);
        let (err_tx, err_rx) = mpsc::channel(1);

        let mut started = self.started.lock().expect("provider mutex poisoned");
        if *started {
            warn!("provider lease loop already started; returning idle channels");
            return (job_rx, err_rx);
        }
        *started = true;
        *self.errors.lock().expect("provider mutex poisoned") = Some(err_tx.clone());
        drop(started);

        let provider = Arc::clone(self);
        tokio::spawn(async move {
            provider.lease_loop(cancel, job_tx, err_tx).await;
        });

        (job_rx, err_rx)
    }

    /// Surface a scheduler-internal failure on the error channel.
    pub fn report_error(&self, err: anyhow::Error) {
        let sender = self
            .errors
            .lock()
            .expect("provider mutex poisoned")
            .clone();
        match sender {
            Some(sender) => {
                let _ = sender.try_send(err);
            }
            None => error!(error = %err, "scheduler error before lease loop start"),
        }
    }

    async fn lease_loop(
        self: Arc<Self>,
        cancel: CancellationToken,
        job_tx: mpsc::Sender<WrappedJob>,
        err_tx: mpsc::Sender<anyhow::Error>,
    ) {
        let mut delay = BASE_POLL_DELAY;

        loop {
            if cancel.is_cancelled() {
                return;
            }

            let rows = match self.lease_batch().await {
                Ok(rows) => rows,
                Err(err) => {
                    let _ = err_tx.send(err).await;
                    return;
                }
            };

            if rows.is_empty() {
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = tokio::time::sleep(delay) => {}
                }
                delay = (delay * 2).min(MAX_POLL_DELAY);
                continue;
            }

            delay = BASE_POLL_DELAY;
            debug!(count = rows.len(), "leased job batch");

            for (payload_type, payload) in rows {
                let job = match self.codecs.decode(&payload_type, &payload) {
                    Ok(job) => job,
                    Err(err) => {
                        // Poisoned row: it stays `queued` until removed
                        // administratively. The loop must survive it.
                        warn!(
                            payload_type = %payload_type,
                            error = %err,
                            "leased row does not decode; skipping"
                        );
                        continue;
                    }
                };

                let wrapped = WrappedJob::new(job, Arc::clone(&self));
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    sent = job_tx.send(wrapped) => {
                        if sent.is_err() {
                            return;
                        }
                    }
                }
            }
        }
    }

    /// Atomically claim a batch: flip `new` rows to `queued` under
    /// `FOR UPDATE SKIP LOCKED`, ordered by (priority, created_at).
    async fn lease_batch(&self) -> Result<Vec<(String, Value)>> {
        let rows = sqlx::query_as::<_, (String, Value)>(
            r#"
            WITH batch AS (
                UPDATE jobs SET status = $1
                WHERE id IN (
                    SELECT id FROM jobs
                    WHERE status = $2
                    ORDER BY priority ASC, created_at ASC
                    FOR UPDATE SKIP LOCKED
                    LIMIT $3
                )
                RETURNING payload_type, payload, priority, created_at
            )
            SELECT payload_type, payload FROM batch
            ORDER BY priority ASC, created_at ASC
            "#,
        )
        .bind(JobStatus::Queued.as_str())
        .bind(JobStatus::New.as_str())
        .bind(LEASE_BATCH_SIZE)
        .fetch_all(&self.db)
        .await
        .context("lease poll failed")?;

        Ok(rows)
    }

    // ------------------------------------------------------------------
    // Child fan-out
    // ------------------------------------------------------------------

    /// Insert children and bump the parent's budget in one transaction.
    pub async fn push_child_jobs(&self, parent_id: Uuid, children: &[CrawlJob]) -> Result<()> {
        if children.is_empty() {
            return Ok(());
        }

        let mut tx = self.db.begin().await?;

        sqlx::query("UPDATE jobs SET child_jobs_count = child_jobs_count + $1 WHERE id = $2")
            .bind(children.len() as i32)
            .bind(parent_id)
            .execute(&mut *tx)
            .await
            .context("failed to bump parent child count")?;

        for child in children {
            self.insert_child(&mut tx, parent_id, child).await?;
        }

        tx.commit().await.context("failed to commit child jobs")?;
        Ok(())
    }

    /// Fully detached push: counter and rows in one transaction on a
    /// background task. Used for variants whose children are only ever
    /// fetched via the durable queue.
    pub fn push_child_jobs_detached(self: &Arc<Self>, parent_id: Uuid, children: Vec<CrawlJob>) {
        if children.is_empty() {
            return;
        }

        let provider = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(err) = provider.push_child_jobs(parent_id, &children).await {
                error!(parent_id = %parent_id, error = %err, "detached child push failed");
            }
        });
    }

    /// Commit the parent's counter bump first, then insert the child rows
    /// on a background task in their own transaction. The parent's own
    /// `mark_done` can commit without waiting for the rows.
    pub async fn push_child_jobs_count_first(
        self: &Arc<Self>,
        parent_id: Uuid,
        children: Vec<CrawlJob>,
    ) -> Result<()> {
        if children.is_empty() {
            return Ok(());
        }

        let mut tx = self.db.begin().await?;
        sqlx::query("UPDATE jobs SET child_jobs_count = child_jobs_count + $1 WHERE id = $2")
            .bind(children.len() as i32)
            .bind(parent_id)
            .execute(&mut *tx)
            .await
            .context("failed to bump parent child count")?;
        tx.commit().await.context("failed to commit child count")?;

        let provider = Arc::clone(self);
        tokio::spawn(async move {
            let outcome: Result<()> = async {
                let mut tx = provider.db.begin().await?;
                for child in &children {
                    provider.insert_child(&mut tx, parent_id, child).await?;
                }
                tx.commit().await?;
                Ok(())
            }
            .await;

            if let Err(err) = outcome {
                error!(parent_id = %parent_id, error = %err, "async child insert failed");
            }
        });

        Ok(())
    }

    async fn insert_child(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        parent_id: Uuid,
        child: &CrawlJob,
    ) -> Result<()> {
        let (mut envelope, tag) = self.codecs.encode(child)?;
        envelope.parent_id = Some(parent_id.to_string());

        let row = JobRow::pending(
            child.id(),
            Some(parent_id),
            child.priority(),
            tag,
            envelope.to_value()?,
        );

        let written = row.insert_with(&mut **tx).await?;
        if written == 0 {
            // The child id already exists; count it failed so the parent's
            // budget still closes.
            sqlx::query(
                "UPDATE jobs SET child_jobs_failed = child_jobs_failed + 1 WHERE id = $1",
            )
            .bind(parent_id)
            .execute(&mut **tx)
            .await?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_and_caps() {
        let mut delay = BASE_POLL_DELAY;
        let mut seen = Vec::new();
        for _ in 0..8 {
            seen.push(delay);
            delay = (delay * 2).min(MAX_POLL_DELAY);
        }

        assert_eq!(seen[0], Duration::from_secs(1));
        assert_eq!(seen[1], Duration::from_secs(2));
        assert_eq!(seen[5], Duration::from_secs(32));
        assert_eq!(seen[6], Duration::from_secs(60));
        assert_eq!(seen[7], Duration::from_secs(60));
    }

    #[test]
    fn lease_constants_match_contract() {
        assert_eq!(LEASE_BATCH_SIZE, 50);
        assert_eq!(JOB_CHANNEL_CAPACITY, 100);
    }
}
