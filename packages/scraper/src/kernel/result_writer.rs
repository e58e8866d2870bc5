//! Batched, deduplicated persistence of extracted records.
//!
//! A single consumer drains an unbounded channel, buffers up to 50 records
//! or 5 seconds of idleness, suppresses repeat (link, tenant) pairs before
//! insert, writes each batch in one transaction, and fires a revalidation
//! notification per distinct tenant after commit.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use uuid::Uuid;

use super::api_client::ApiClient;
use super::queries::DuplicateUrlQuery;
use crate::common::Tenant;
use crate::domains::gmaps::{CompanyInfo, CrawlJob, Entry};
use crate::kernel::jobs::JobRow;
use sqlx::PgPool;

const MAX_BATCH_SIZE: usize = 50;
const IDLE_FLUSH: Duration = Duration::from_secs(5);
const FINAL_FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

/// One extracted record together with the job that produced it.
pub struct ScrapeResult {
    pub job: CrawlJob,
    pub entry: Entry,
}

#[derive(Debug, Clone)]
struct ResultRow {
    parent_id: Option<Uuid>,
    tenant: Tenant,
    link: String,
    payload_type: String,
    title: String,
    category: String,
    address: String,
    website: String,
    phone: String,
    emails: Vec<String>,
    company: CompanyInfo,
}

pub struct ResultWriter {
    db: PgPool,
    api: Arc<ApiClient>,
}

impl ResultWriter {
    pub fn new(db: PgPool, api: Arc<ApiClient>) -> Self {
        Self { db, api }
    }

    /// Consume results until the channel closes or the token cancels.
    ///
    /// On cancellation a final flush runs under a fresh 5-second budget so a
    /// cancelled parent does not truncate its own durable output, then the
    /// cancellation surfaces as an error.
    pub async fn run(
        &self,
        cancel: CancellationToken,
        mut rx: mpsc::UnboundedReceiver<ScrapeResult>,
    ) -> Result<()> {
        let mut buffer: Vec<ResultRow> = Vec::with_capacity(MAX_BATCH_SIZE);
        let mut last_save = Instant::now();

        let mut ticker = tokio::time::interval(Duration::from_secs(1));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                received = rx.recv() => match received {
                    Some(result) => {
                        match self.prepare(result).await {
                            Ok(Some(row)) => buffer.push(row),
                            Ok(None) => {}
                            Err(err) => {
                                error!(error = %err, "dropping result");
                            }
                        }

                        if buffer.len() >= MAX_BATCH_SIZE {
                            self.batch_save(&buffer).await?;
                            buffer.clear();
                            last_save = Instant::now();
                        }
                    }
                    None => {
                        if !buffer.is_empty() {
                            self.batch_save(&buffer).await?;
                        }
                        return Ok(());
                    }
                },
                _ = ticker.tick() => {
                    if !buffer.is_empty() && last_save.elapsed() >= IDLE_FLUSH {
                        self.batch_save(&buffer).await?;
                        buffer.clear();
                        last_save = Instant::now();
                    }
                },
                _ = cancel.cancelled() => {
                    if !buffer.is_empty() {
                        let _ = tokio::time::timeout(
                            FINAL_FLUSH_TIMEOUT,
                            self.batch_save(&buffer),
                        )
                        .await;
                    }
                    bail!("result writer cancelled");
                }
            }
        }
    }

    /// Resolve tenant and root lineage, suppress duplicates, and shape the
    /// record for insertion. `Ok(None)` means the record was skipped.
    async fn prepare(&self, result: ScrapeResult) -> Result<Option<ResultRow>> {
        let ScrapeResult { job, entry } = result;

        let owner_id = job.owner_id().to_string();
        let organization_id = job.organization_id().to_string();

        // Results hang off the root of the lineage that produced them.
        let parent_id = match self.root_lineage(job.id()).await {
            Ok(root) => Some(root),
            Err(err) => {
                error!(job_id = %job.id(), error = %err, "failed to resolve root job");
                Some(job.id())
            }
        };

        if let Some((sql, args)) =
            DuplicateUrlQuery::new(&entry.link, &owner_id, &organization_id).build()
        {
            let mut query = sqlx::query_scalar::<_, i64>(&sql);
            for arg in &args {
                query = query.bind(arg);
            }
            let count = query
                .fetch_one(&self.db)
                .await
                .context("duplicate URL check failed")?;

            if count > 0 {
                info!(link = %entry.link, user_id = %owner_id, "skipping duplicate result");
                return Ok(None);
            }
        }

        Ok(Some(ResultRow {
            parent_id,
            tenant: Tenant::from_owner(&owner_id, &organization_id),
            link: entry.link,
            payload_type: job.job_type().to_string(),
            title: entry.title,
            category: entry.category,
            address: entry.address,
            website: entry.website,
            phone: entry.phone,
            emails: entry.emails,
            company: entry.company,
        }))
    }

    /// Walk `parent_id` links up to the root. A visited set guards against
    /// cycles; a missing row ends the walk at the last known id.
    async fn root_lineage(&self, job_id: Uuid) -> Result<Uuid> {
        let mut current = job_id;
        let mut visited = HashSet::new();

        loop {
            if !visited.insert(current) {
                bail!("circular reference detected in job lineage");
            }

            match JobRow::parent_of(current, &self.db).await? {
                Some(Some(parent)) => current = parent,
                Some(None) | None => return Ok(current),
            }
        }
    }

    async fn batch_save(&self, rows: &[ResultRow]) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }

        info!(count = rows.len(), "saving result batch");

        let mut tx = self.db.begin().await?;

        for row in rows {
            sqlx::query(
                r#"
                INSERT INTO results (
                    parent_id, user_id, organization_id, link, payload_type,
                    title, category, address, website, phone, emails,
                    company_directors, company_legal_form, company_created,
                    company_closed, company_national_id, company_link, company_diffusion
                ) VALUES (
                    $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11,
                    $12, $13, $14, $15, $16, $17, $18
                )
                "#,
            )
            .bind(row.parent_id)
            .bind(&row.tenant.user_id)
            .bind(&row.tenant.organization_id)
            .bind(&row.link)
            .bind(&row.payload_type)
            .bind(&row.title)
            .bind(&row.category)
            .bind(&row.address)
            .bind(&row.website)
            .bind(&row.phone)
            .bind(&row.emails)
            .bind(&row.company.directors)
            .bind(&row.company.legal_form)
            .bind(&row.company.created)
            .bind(&row.company.closed)
            .bind(&row.company.national_id)
            .bind(&row.company.registry_link)
            .bind(row.company.diffusion)
            .execute(&mut *tx)
            .await
            .context("failed to insert result")?;
        }

        tx.commit().await.context("failed to commit result batch")?;

        // At most one revalidation per tenant per committed batch.
        let mut notified = HashSet::new();
        for row in rows {
            if let Some(user_id) = &row.tenant.user_id {
                if notified.insert(user_id.clone()) {
                    self.api.notify_revalidation(user_id);
                }
            }
        }

        Ok(())
    }
}
