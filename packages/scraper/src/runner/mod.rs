//! Database runner: wires the provider, worker pool, and result writer.
//!
//! One runner per process. Workers pull wrapped jobs off the provider's
//! delivery channel, fetch, process, feed extracted records to the result
//! writer, and push re-wrapped children back onto their local stack.
//! Scheduler-internal errors are fatal for the process; rows already
//! leased stay `queued` and are recoverable after restart.

pub mod seeds;

use std::fs::File;
use std::io::BufReader;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::kernel::jobs::{CodecRegistry, JobProvider, Processed, StatusManager, WrappedJob};
use crate::kernel::{
    ApiClient, BodaccClient, Fetcher, HttpFetcher, PageResponse, PgCompanyDataCache, ProcessDeps,
    ResultWriter, ScrapeResult,
};

pub struct DatabaseRunner {
    cfg: Config,
    db: PgPool,
    provider: Arc<JobProvider>,
    writer: Arc<ResultWriter>,
    deps: ProcessDeps,
    fetcher: Arc<dyn Fetcher>,
}

impl DatabaseRunner {
    pub async fn new(cfg: Config) -> Result<Self> {
        let db = PgPoolOptions::new()
            .max_connections((cfg.concurrency as u32 + 2).max(5))
            .connect(&cfg.dsn)
            .await
            .context("failed to connect to database")?;

        sqlx::migrate!()
            .run(&db)
            .await
            .context("failed to run migrations")?;

        let api = Arc::new(ApiClient::new(
            &cfg.revalidation_api,
            &cfg.job_completion_api,
        )?);

        let codecs = Arc::new(CodecRegistry::new());
        let status = StatusManager::new(db.clone(), Arc::clone(&api));
        let provider = JobProvider::new(db.clone(), codecs, status, Arc::clone(&api));
        let writer = Arc::new(ResultWriter::new(db.clone(), Arc::clone(&api)));

        let deps = ProcessDeps::builder()
            .company_cache(Arc::new(PgCompanyDataCache::new(db.clone())))
            .directory(Arc::new(BodaccClient::new()?))
            .build();

        let fetcher: Arc<dyn Fetcher> = Arc::new(HttpFetcher::new()?);

        Ok(Self {
            cfg,
            db,
            provider,
            writer,
            deps,
            fetcher,
        })
    }

    pub async fn run(&self, cancel: CancellationToken) -> Result<()> {
        if self.cfg.produce {
            self.produce_seeds().await
        } else {
            self.crawl(cancel).await
        }
    }

    pub async fn close(&self) {
        self.db.close().await;
    }

    /// Produce mode: push one root search job per seed query and exit.
    async fn produce_seeds(&self) -> Result<()> {
        let input = self
            .cfg
            .input
            .as_ref()
            .context("produce mode requires an input file")?;
        let reader = BufReader::new(
            File::open(input).with_context(|| format!("failed to open {}", input.display()))?,
        );

        let jobs = seeds::create_seed_jobs(&self.cfg, reader)?;
        for job in &jobs {
            self.provider.push(job).await?;
        }

        info!(count = jobs.len(), "seed jobs produced");
        Ok(())
    }

    async fn crawl(&self, cancel: CancellationToken) -> Result<()> {
        let (results_tx, results_rx) = mpsc::unbounded_channel();

        let writer = Arc::clone(&self.writer);
        let writer_cancel = cancel.child_token();
        let writer_handle =
            tokio::spawn(async move { writer.run(writer_cancel, results_rx).await });

        let (jobs_rx, mut err_rx) = self.provider.jobs(cancel.child_token());
        let jobs_rx = Arc::new(Mutex::new(jobs_rx));

        // Anything on the error channel kills the process; leased rows
        // survive in `queued` for a restart to reclaim.
        {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                if let Some(err) = err_rx.recv().await {
                    error!(error = %err, "scheduler error, shutting down");
                    cancel.cancel();
                }
            });
        }

        let activity = Arc::new(StdMutex::new(Instant::now()));
        if let Some(window) = self.cfg.exit_on_inactivity {
            spawn_inactivity_monitor(window, Arc::clone(&activity), cancel.clone());
        }

        info!(concurrency = self.cfg.concurrency, "starting workers");

        let mut handles = Vec::with_capacity(self.cfg.concurrency);
        for worker_id in 0..self.cfg.concurrency {
            handles.push(tokio::spawn(worker_loop(
                worker_id,
                Arc::clone(&jobs_rx),
                Arc::clone(&self.fetcher),
                self.deps.clone(),
                Arc::clone(&self.provider),
                results_tx.clone(),
                cancel.clone(),
                Arc::clone(&activity),
            )));
        }
        drop(results_tx);

        futures::future::join_all(handles).await;
        debug!("workers stopped");

        let writer_result = writer_handle
            .await
            .context("result writer task panicked")?;

        if let Err(err) = writer_result {
            if !cancel.is_cancelled() {
                return Err(err);
            }
            debug!(error = %err, "result writer ended with cancellation");
        }

        Ok(())
    }
}

fn spawn_inactivity_monitor(
    window: Duration,
    activity: Arc<StdMutex<Instant>>,
    cancel: CancellationToken,
) {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(Duration::from_secs(1)) => {}
            }

            let idle = activity
                .lock()
                .map(|last| last.elapsed())
                .unwrap_or_default();
            if idle >= window {
                info!(idle_secs = idle.as_secs(), "inactivity window elapsed, exiting");
                cancel.cancel();
                return;
            }
        }
    });
}

fn touch(activity: &StdMutex<Instant>) {
    if let Ok(mut last) = activity.lock() {
        *last = Instant::now();
    }
}

#[allow(clippy::too_many_arguments)]
async fn worker_loop(
    worker_id: usize,
    jobs_rx: Arc<Mutex<mpsc::Receiver<WrappedJob>>>,
    fetcher: Arc<dyn Fetcher>,
    deps: ProcessDeps,
    provider: Arc<JobProvider>,
    results_tx: mpsc::UnboundedSender<ScrapeResult>,
    cancel: CancellationToken,
    activity: Arc<StdMutex<Instant>>,
) {
    debug!(worker_id, "worker started");

    loop {
        let received = tokio::select! {
            _ = cancel.cancelled() => return,
            job = async { jobs_rx.lock().await.recv().await } => job,
        };

        let Some(wrapped) = received else {
            return;
        };
        touch(&activity);

        // Children delivered in-process extend this local stack; the same
        // state protocol applies to them recursively.
        let mut pending = vec![wrapped];
        while let Some(wrapped) = pending.pop() {
            if cancel.is_cancelled() {
                return;
            }

            let resp = fetch_with_retries(fetcher.as_ref(), &wrapped).await;

            match wrapped.process(&deps, &resp).await {
                Ok(Processed::Success { data, next }) => {
                    pending.extend(next);
                    if let Some(entry) = data {
                        let _ = results_tx.send(ScrapeResult {
                            job: wrapped.into_job(),
                            entry,
                        });
                    }
                    touch(&activity);
                }
                Ok(Processed::Failed { error }) => {
                    warn!(worker_id, error = %error, "job failed");
                    touch(&activity);
                }
                Err(err) => {
                    provider.report_error(err);
                    cancel.cancel();
                    return;
                }
            }
        }
    }
}

/// Retry transient fetch failures up to the variant's `max_retries`.
async fn fetch_with_retries(fetcher: &dyn Fetcher, wrapped: &WrappedJob) -> PageResponse {
    let job = wrapped.job();
    let mut resp = fetcher.fetch(job).await;

    for attempt in 1..=job.max_retries() {
        if resp.is_ok() {
            break;
        }
        debug!(job_id = %job.id(), attempt, "retrying fetch");
        resp = fetcher.fetch(job).await;
    }

    resp
}

pub use seeds::{create_seed_jobs, parse_seed_queries, SeedQuery};
