//! Job variants for the mapping-service crawl.
//!
//! Variants form a sum type keyed by `payload_type`. The codec registry in
//! `kernel::jobs` maps each tag to its envelope representation; here lives
//! the shared accessor surface and the per-variant `process` dispatch.
//!
//! The fetch tree per seed query: search → place → optional website/email →
//! optional company-registry enrichment (bodacc, then pappers).

pub mod bodacc;
pub mod email;
pub mod entry;
pub mod pappers;
pub mod place;
pub mod search;

use std::collections::HashMap;

use anyhow::Result;
use uuid::Uuid;

pub use bodacc::BodaccJob;
pub use email::EmailJob;
pub use entry::{CompanyInfo, Entry};
pub use pappers::PappersJob;
pub use place::PlaceJob;
pub use search::SearchJob;

use crate::kernel::fetch::PageResponse;
use crate::kernel::jobs::JobPriority;
use crate::kernel::ProcessDeps;

/// Fields every variant shares. The embedded core of each job struct.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobCore {
    pub id: Uuid,
    pub parent_id: Option<Uuid>,
    pub url: String,
    pub url_params: HashMap<String, String>,
    pub max_retries: u32,
    pub priority: JobPriority,
}

impl JobCore {
    pub fn new(url: String, priority: JobPriority, max_retries: u32) -> Self {
        Self {
            id: Uuid::new_v4(),
            parent_id: None,
            url,
            url_params: HashMap::new(),
            max_retries,
            priority,
        }
    }

    pub fn with_parent(mut self, parent_id: Uuid) -> Self {
        self.parent_id = Some(parent_id);
        self
    }

    pub fn with_param(mut self, key: &str, value: &str) -> Self {
        self.url_params.insert(key.to_string(), value.to_string());
        self
    }
}

/// A unit of crawl work, one of the five payload types.
#[derive(Debug, Clone, PartialEq)]
pub enum CrawlJob {
    Search(SearchJob),
    Place(PlaceJob),
    Email(EmailJob),
    Bodacc(BodaccJob),
    Pappers(PappersJob),
}

impl CrawlJob {
    pub fn core(&self) -> &JobCore {
        match self {
            CrawlJob::Search(j) => &j.core,
            CrawlJob::Place(j) => &j.core,
            CrawlJob::Email(j) => &j.core,
            CrawlJob::Bodacc(j) => &j.core,
            CrawlJob::Pappers(j) => &j.core,
        }
    }

    pub fn id(&self) -> Uuid {
        self.core().id
    }

    pub fn parent_id(&self) -> Option<Uuid> {
        self.core().parent_id
    }

    pub fn is_root(&self) -> bool {
        self.parent_id().is_none()
    }

    pub fn url(&self) -> &str {
        &self.core().url
    }

    pub fn url_params(&self) -> &HashMap<String, String> {
        &self.core().url_params
    }

    pub fn priority(&self) -> JobPriority {
        self.core().priority
    }

    pub fn max_retries(&self) -> u32 {
        self.core().max_retries
    }

    /// The `payload_type` discriminator tag.
    pub fn job_type(&self) -> &'static str {
        match self {
            CrawlJob::Search(_) => SearchJob::JOB_TYPE,
            CrawlJob::Place(_) => PlaceJob::JOB_TYPE,
            CrawlJob::Email(_) => EmailJob::JOB_TYPE,
            CrawlJob::Bodacc(_) => BodaccJob::JOB_TYPE,
            CrawlJob::Pappers(_) => PappersJob::JOB_TYPE,
        }
    }

    pub fn owner_id(&self) -> &str {
        match self {
            CrawlJob::Search(j) => &j.owner_id,
            CrawlJob::Place(j) => &j.owner_id,
            CrawlJob::Email(j) => &j.owner_id,
            CrawlJob::Bodacc(j) => &j.owner_id,
            CrawlJob::Pappers(j) => &j.owner_id,
        }
    }

    pub fn organization_id(&self) -> &str {
        match self {
            CrawlJob::Search(j) => &j.organization_id,
            CrawlJob::Place(j) => &j.organization_id,
            CrawlJob::Email(j) => &j.organization_id,
            CrawlJob::Bodacc(j) => &j.organization_id,
            CrawlJob::Pappers(j) => &j.organization_id,
        }
    }

    /// Email and pappers fetches run `process` even when the fetch itself
    /// failed, so the entry travelling inside the job still reaches the
    /// result writer. The wrapper fails every other variant outright on a
    /// fetch error.
    pub fn process_on_fetch_error(&self) -> bool {
        matches!(self, CrawlJob::Email(_) | CrawlJob::Pappers(_))
    }

    /// Run the variant's business logic.
    ///
    /// Returns the extracted record (if any) and the child jobs to fan out.
    /// A returned error always causes the wrapper to mark the job failed.
    pub async fn process(
        &self,
        deps: &ProcessDeps,
        resp: &PageResponse,
    ) -> Result<(Option<Entry>, Vec<CrawlJob>)> {
        match self {
            CrawlJob::Search(j) => j.process(resp),
            CrawlJob::Place(j) => j.process(resp),
            CrawlJob::Email(j) => Ok(j.process(resp)),
            CrawlJob::Bodacc(j) => j.process(deps).await,
            CrawlJob::Pappers(j) => Ok(j.process(resp)),
        }
    }
}
