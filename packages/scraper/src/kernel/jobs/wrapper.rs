//! Glue between business `process` and the durable queue.
//!
//! Every job handed to a worker is wrapped. After the variant's business
//! logic runs, the wrapper owns the state protocol: insert returned
//! children transactionally, transition the parent's status, fire the
//! revalidation side-channel for root searches, and re-wrap children for
//! in-process delivery so the same protocol applies recursively.

use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use tracing::debug;

use super::provider::JobProvider;
use crate::domains::gmaps::{CrawlJob, Entry};
use crate::kernel::fetch::PageResponse;
use crate::kernel::ProcessDeps;

/// Outcome of a wrapped processing round.
///
/// A business failure is a normal outcome (the job was marked failed and
/// the tree keeps moving); an `Err` from [`WrappedJob::process`] is a
/// scheduler-internal failure and fatal for the process.
pub enum Processed {
    Success {
        data: Option<Entry>,
        next: Vec<WrappedJob>,
    },
    Failed {
        error: anyhow::Error,
    },
}

pub struct WrappedJob {
    job: CrawlJob,
    provider: Arc<JobProvider>,
}

impl WrappedJob {
    pub fn new(job: CrawlJob, provider: Arc<JobProvider>) -> Self {
        Self { job, provider }
    }

    pub fn job(&self) -> &CrawlJob {
        &self.job
    }

    pub fn into_job(self) -> CrawlJob {
        self.job
    }

    pub async fn process(&self, deps: &ProcessDeps, resp: &PageResponse) -> Result<Processed> {
        debug!(job_id = %self.job.id(), job_type = self.job.job_type(), "processing job");

        // A fetch that stayed failed after retries fails the job, unless
        // the variant opts into processing the error response.
        if let Some(fetch_err) = &resp.error {
            if !self.job.process_on_fetch_error() {
                self.provider
                    .status()
                    .mark_failed(&self.job)
                    .await
                    .context("failed to record job failure")?;
                return Ok(Processed::Failed {
                    error: anyhow!("fetch failed: {fetch_err}"),
                });
            }
        }

        let (data, next_jobs) = match self.job.process(deps, resp).await {
            Ok(outcome) => outcome,
            Err(error) => {
                self.provider
                    .status()
                    .mark_failed(&self.job)
                    .await
                    .context("failed to record job failure")?;
                return Ok(Processed::Failed { error });
            }
        };

        let children_created = next_jobs.len();
        let is_bodacc = matches!(self.job, CrawlJob::Bodacc(_));
        let is_place = matches!(self.job, CrawlJob::Place(_));

        if !next_jobs.is_empty() {
            if is_bodacc {
                self.provider
                    .push_child_jobs_detached(self.job.id(), next_jobs.clone());
            } else if is_place {
                self.provider
                    .push_child_jobs_count_first(self.job.id(), next_jobs.clone())
                    .await
                    .context("while pushing place child jobs")?;
            } else {
                self.provider
                    .push_child_jobs(self.job.id(), &next_jobs)
                    .await
                    .context("while pushing child jobs")?;
            }
        }

        self.provider
            .status()
            .mark_done(&self.job, children_created)
            .await?;

        // Data became visible to downstream consumers: poke their cache.
        if matches!(self.job, CrawlJob::Search(_)) && self.job.is_root() {
            self.provider.api().notify_revalidation(self.job.owner_id());
        }

        // Bodacc children are only fetched through the durable queue, so
        // they are not re-wrapped for in-process delivery.
        let next = if is_bodacc {
            Vec::new()
        } else {
            next_jobs
                .into_iter()
                .map(|job| WrappedJob::new(job, Arc::clone(&self.provider)))
                .collect()
        };

        Ok(Processed::Success { data, next })
    }
}
